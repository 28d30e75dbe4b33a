//! Abstractions related to the inputs of the CLI program.

#[derive(clap::Parser)]
#[command(
    name = env!("CARGO_PKG_NAME"),
    version,
    about = "Tooling for provisioning and running PaperMC servers."
)]
pub struct Cli {
    /// Configuration file to use instead of the default one.
    #[arg(long, short, value_name = "PATH", global = true)]
    pub config: Option<std::path::PathBuf>,

    /// Log level (off, error, warn, info, debug, trace). Overrides the
    /// configuration.
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(clap::Subcommand)]
pub enum Cmd {
    #[command(about = "List the versions that can be installed.")]
    Versions,

    #[command(about = "List the known servers.")]
    List {
        #[arg(long, help = "Print as JSON.")]
        json: bool,
    },

    #[command(about = "Download, set up and register a new server.")]
    Create(CreateArgs),

    #[command(about = "Forget a server. Its directory is left alone.")]
    Delete {
        /// Server name, or `#<id>`.
        selector: String,
    },

    #[command(about = "Interactive session for starting and stopping servers.")]
    Console,
}

#[derive(clap::Args, Debug, Clone)]
pub struct CreateArgs {
    /// Display name of the server.
    #[arg(long, short)]
    pub name: String,

    /// Directory to set the server up in. Created if missing.
    #[arg(long, short, value_name = "PATH")]
    pub dir: std::path::PathBuf,

    /// Version label, see `versions`. Defaults to the first one listed.
    #[arg(long = "game-version", short = 'g', value_name = "LABEL")]
    pub version: Option<String>,

    /// Game port. The next port is used for RCON. Random in [25000, 35000)
    /// if not given.
    #[arg(long, short)]
    pub port: Option<u16>,
}

impl From<CreateArgs> for crate::manager::NewServer {
    fn from(value: CreateArgs) -> Self {
        return Self {
            name: value.name,
            directory: value.dir,
            version: value.version,
            port: value.port,
        };
    }
}

/// One line typed into the interactive console.
#[derive(clap::Parser, Debug)]
#[command(
    no_binary_name = true,
    name = "console",
    override_usage = "<COMMAND> [ARGS]",
    disable_version_flag = true,
    disable_help_flag = true
)]
pub struct ConsoleLine {
    #[command(subcommand)]
    pub cmd: ConsoleCmd,
}

#[derive(clap::Subcommand, Debug)]
pub enum ConsoleCmd {
    #[command(about = "Download, set up and register a new server (in the background).")]
    Create(CreateArgs),
    #[command(about = "Start a server.")]
    Start { selector: String },
    #[command(about = "Stop a server gracefully.")]
    Stop { selector: String },
    #[command(about = "Stop a server, then start it again.")]
    Restart { selector: String },
    #[command(about = "Forcefully end a server process.")]
    Kill { selector: String },
    #[command(about = "Forget a server.")]
    Delete {
        selector: String,
        #[arg(long, help = "Leave a running server running instead of stopping it.")]
        orphan: bool,
    },
    #[command(about = "Abort the operation in progress on a server.")]
    Cancel { selector: String },
    #[command(about = "List the known servers.")]
    List,
    #[command(about = "List the versions that can be installed.")]
    Versions,
    #[command(about = "Stop all servers and leave.", alias = "exit")]
    Quit,
}

impl ConsoleCmd {
    /// The request this line stands for, `None` for `quit`.
    pub fn into_request(self) -> Option<crate::dispatch::Request> {
        use crate::dispatch::Request;
        let request: Request = match self {
            ConsoleCmd::Create(args) => Request::Create(args.into()),
            ConsoleCmd::Start { selector } => Request::Start { selector },
            ConsoleCmd::Stop { selector } => Request::Stop { selector },
            ConsoleCmd::Restart { selector } => Request::Restart { selector },
            ConsoleCmd::Kill { selector } => Request::Kill { selector },
            ConsoleCmd::Delete { selector, orphan } => Request::Delete {
                selector,
                policy: match orphan {
                    true => Some(crate::manager::DeletePolicy::Orphan),
                    false => None,
                },
            },
            ConsoleCmd::Cancel { selector } => Request::Cancel { selector },
            ConsoleCmd::List => Request::List,
            ConsoleCmd::Versions => Request::Versions,
            ConsoleCmd::Quit => return None,
        };
        return Some(request);
    }
}
