static EXIT_OK: i32 = 0;

/// Configuration is unreadable or invalid, the logger cannot be set up, or
/// the server list cannot be loaded.
static EXIT_ERR_PRECONDITION: i32 = 2;

/// The requested operation failed.
static EXIT_ERR_OPERATION: i32 = 3;

fn main() {
    let cli: paperctl::args::Cli = clap::Parser::parse();

    let config: paperctl::config::Config =
        match paperctl::config::Config::get_from_fs(cli.config.as_deref()) {
            Ok(n) => n,
            Err(err) => {
                eprintln!("{}", paperctl::util::aggregate_error_tree(&err, 2));
                std::process::exit(EXIT_ERR_PRECONDITION);
            }
        };

    let level: &str = cli.log_level.as_deref().unwrap_or(&config.log_level);
    let _logger: log4rs::Handle = match paperctl::logging::parse_level(level)
        .and_then(paperctl::logging::init_logger)
    {
        Ok(n) => n,
        Err(err) => {
            eprintln!("{}", paperctl::util::aggregate_error_tree(&err, 2));
            std::process::exit(EXIT_ERR_PRECONDITION);
        }
    };

    let manager: paperctl::manager::Manager = match init_manager(&config) {
        Ok(n) => n,
        Err(err) => {
            log::error!(
                "Unrecoverable error: {}",
                paperctl::util::aggregate_error_tree(&err, 2)
            );
            std::process::exit(EXIT_ERR_PRECONDITION);
        }
    };

    let code: i32 = match cli.cmd {
        paperctl::args::Cmd::Versions => {
            for label in manager.versions() {
                println!("{label}");
            }
            EXIT_OK
        }
        paperctl::args::Cmd::List { json } => {
            let summaries: Vec<paperctl::registry::EntrySummary> = manager.list();
            if json {
                match serde_json::to_string_pretty(&summaries) {
                    Ok(n) => println!("{n}"),
                    Err(err) => {
                        log::error!("Cannot serialize server list: {err}");
                        std::process::exit(EXIT_ERR_OPERATION);
                    }
                }
            } else if summaries.is_empty() {
                println!("No servers.");
            } else {
                for summary in summaries {
                    println!("{summary}");
                }
            }
            EXIT_OK
        }
        paperctl::args::Cmd::Create(args) => one_shot(
            manager,
            &config,
            paperctl::dispatch::Request::Create(args.into()),
        ),
        paperctl::args::Cmd::Delete { selector } => one_shot(
            manager,
            &config,
            paperctl::dispatch::Request::Delete {
                selector,
                policy: None,
            },
        ),
        paperctl::args::Cmd::Console => {
            let dispatcher: paperctl::dispatch::Dispatcher = paperctl::dispatch::Dispatcher::new(
                std::sync::Arc::new(manager),
                config.workers,
                config.queue_capacity,
            );
            let console = paperctl::console::Console::new(dispatcher, std::io::stdout());
            match console.run(std::io::stdin().lock()) {
                Ok(()) => EXIT_OK,
                Err(err) => {
                    log::error!("Console failed: {err}");
                    EXIT_ERR_OPERATION
                }
            }
        }
    };
    std::process::exit(code);
}

fn init_manager(
    config: &paperctl::config::Config,
) -> Result<paperctl::manager::Manager, paperctl::error::Error> {
    let fetcher: paperctl::http::HttpFetcher =
        paperctl::http::HttpFetcher::new(config.download_timeout())?;
    let provisioner: paperctl::provision::Provisioner = paperctl::provision::Provisioner::new(
        std::sync::Arc::new(config.catalog()),
        Box::new(fetcher),
        config.launcher(),
        config.properties.clone(),
        config.first_run_timeout(),
    );
    let manager: paperctl::manager::Manager = paperctl::manager::Manager::new(
        provisioner,
        paperctl::store::Store::new(config.store_path()),
        config.manager_settings(),
    );
    manager.load()?;
    return Ok(manager);
}

/// Run a single request through a one worker dispatcher and report it.
fn one_shot(
    manager: paperctl::manager::Manager,
    config: &paperctl::config::Config,
    request: paperctl::dispatch::Request,
) -> i32 {
    let dispatcher: paperctl::dispatch::Dispatcher =
        paperctl::dispatch::Dispatcher::new(std::sync::Arc::new(manager), 1, config.queue_capacity);
    let notification: paperctl::dispatch::Notification = dispatcher.submit_and_wait(request);
    dispatcher.shutdown();
    println!("{notification}");
    return match notification.is_error() {
        true => EXIT_ERR_OPERATION,
        false => EXIT_OK,
    };
}
