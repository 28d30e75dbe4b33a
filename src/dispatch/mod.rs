//! Single entry point for user actions.
//!
//! Front ends turn user input into [`Request`]s and [`Dispatcher::submit`]
//! them. Slow requests are queued for a fixed pool of worker threads; quick
//! ones (listing, cancellation) are answered right away so they work even
//! when every worker is busy. Each request yields exactly one
//! [`Notification`].

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Create(crate::manager::NewServer),
    Start { selector: String },
    Stop { selector: String },
    Restart { selector: String },
    Kill { selector: String },
    Delete {
        selector: String,
        policy: Option<crate::manager::DeletePolicy>,
    },
    Cancel { selector: String },
    List,
    Versions,
}

impl Request {
    /// Whether the request may block for a long time and thus goes through
    /// the worker queue.
    fn is_slow(&self) -> bool {
        return !matches!(self, Request::Cancel { .. } | Request::List | Request::Versions);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Error,
}

/// Human readable outcome of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: Level,
    pub title: String,
    pub message: String,
}

impl Notification {
    pub fn info(title: &str, message: impl Into<String>) -> Self {
        return Self {
            level: Level::Info,
            title: title.into(),
            message: message.into(),
        };
    }

    pub fn error(err: &crate::error::Error) -> Self {
        return Self {
            level: Level::Error,
            title: err.category().into(),
            message: crate::util::aggregate_error_tree(err, 2).trim_end().to_string(),
        };
    }

    pub fn is_error(&self) -> bool {
        return self.level == Level::Error;
    }
}

impl std::fmt::Display for Notification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.title, self.message)
    }
}

struct Job {
    request: Request,
    reply: std::sync::mpsc::Sender<Notification>,
}

pub struct Dispatcher {
    manager: std::sync::Arc<crate::manager::Manager>,
    queue: Option<std::sync::mpsc::SyncSender<Job>>,
    workers: Vec<std::thread::JoinHandle<()>>,
}

impl Dispatcher {
    /// Spawn `workers` threads sharing a queue of at most `queue_capacity`
    /// pending requests.
    pub fn new(
        manager: std::sync::Arc<crate::manager::Manager>,
        workers: usize,
        queue_capacity: usize,
    ) -> Self {
        let (tx, rx) = std::sync::mpsc::sync_channel::<Job>(queue_capacity);
        let rx: std::sync::Arc<std::sync::Mutex<std::sync::mpsc::Receiver<Job>>> =
            std::sync::Arc::new(std::sync::Mutex::new(rx));

        let workers: Vec<std::thread::JoinHandle<()>> = (0..workers.max(1))
            .map(|n| {
                let rx = std::sync::Arc::clone(&rx);
                let manager = std::sync::Arc::clone(&manager);
                std::thread::Builder::new()
                    .name(format!("worker-{n}"))
                    .spawn(move || work(&manager, &rx))
            })
            .filter_map(|spawned| match spawned {
                Ok(handle) => Some(handle),
                Err(err) => {
                    log::error!("Cannot spawn worker thread: {err}");
                    None
                }
            })
            .collect();

        return Self {
            manager,
            queue: Some(tx),
            workers,
        };
    }

    pub fn manager(&self) -> &crate::manager::Manager {
        return &self.manager;
    }

    /// Hand a request over. The notification arrives on the returned
    /// receiver once the request is done.
    pub fn submit(
        &self,
        request: Request,
    ) -> Result<std::sync::mpsc::Receiver<Notification>, crate::error::Error> {
        let (reply, receiver) = std::sync::mpsc::channel::<Notification>();
        if !request.is_slow() {
            let _ = reply.send(execute(&self.manager, request));
            return Ok(receiver);
        }

        let queue: &std::sync::mpsc::SyncSender<Job> = match (&self.queue, self.workers.is_empty()) {
            (Some(n), false) => n,
            _ => return Err(crate::error::Error::Shutdown),
        };
        log::debug!("Queueing {request:?}");
        match queue.try_send(Job { request, reply }) {
            Ok(()) => return Ok(receiver),
            Err(std::sync::mpsc::TrySendError::Full(_)) => {
                return Err(crate::error::Error::QueueFull)
            }
            Err(std::sync::mpsc::TrySendError::Disconnected(_)) => {
                return Err(crate::error::Error::Shutdown)
            }
        }
    }

    /// Submit and wait for the outcome. Submission failures come back as an
    /// error notification.
    pub fn submit_and_wait(&self, request: Request) -> Notification {
        return match self.submit(request) {
            Ok(receiver) => match receiver.recv() {
                Ok(n) => n,
                Err(_) => Notification::error(&crate::error::Error::Shutdown),
            },
            Err(err) => Notification::error(&err),
        };
    }

    /// Let queued requests finish, then join the workers.
    pub fn shutdown(mut self) {
        self.close();
    }

    fn close(&mut self) {
        self.queue = None;
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                log::error!("A worker thread panicked");
            }
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.close();
    }
}

fn work(
    manager: &crate::manager::Manager,
    rx: &std::sync::Mutex<std::sync::mpsc::Receiver<Job>>,
) {
    loop {
        let job: Job = {
            let rx = rx.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            match rx.recv() {
                Ok(n) => n,
                // Queue closed and drained.
                Err(_) => break,
            }
        };
        let notification: Notification = execute(manager, job.request);
        let _ = job.reply.send(notification);
    }
}

/// Carry out one request against the manager.
pub fn execute(manager: &crate::manager::Manager, request: Request) -> Notification {
    log::debug!("Executing {request:?}");
    let outcome: Result<Notification, crate::error::Error> = match request {
        Request::Create(new_server) => manager.create(new_server).map(|entry| {
            let record: &crate::record::ServerRecord = entry.record();
            Notification::info(
                "Server Created",
                format!(
                    "Server {} is set up on port {} (control port {}).",
                    record.name,
                    record.port,
                    record.control_port()
                ),
            )
        }),
        Request::Start { selector } => manager.start(&selector).map(|(record, transition)| {
            match transition {
                crate::supervisor::Transition::Changed => {
                    Notification::info("Server Started", format!("Server {} started.", record.name))
                }
                crate::supervisor::Transition::Unchanged => Notification::info(
                    "Server Started",
                    format!("Server {} is already running.", record.name),
                ),
            }
        }),
        Request::Stop { selector } => manager.stop(&selector).map(|(record, transition)| {
            match transition {
                crate::supervisor::Transition::Changed => {
                    Notification::info("Server Stopped", format!("Server {} stopped.", record.name))
                }
                crate::supervisor::Transition::Unchanged => Notification::info(
                    "Server Stopped",
                    format!("Server {} is not running.", record.name),
                ),
            }
        }),
        Request::Restart { selector } => manager.restart(&selector).map(|record| {
            Notification::info("Server Restarted", format!("Server {} restarted.", record.name))
        }),
        Request::Kill { selector } => manager.kill(&selector).map(|(record, transition)| {
            match transition {
                crate::supervisor::Transition::Changed => {
                    Notification::info("Server Killed", format!("Server {} killed.", record.name))
                }
                crate::supervisor::Transition::Unchanged => Notification::info(
                    "Server Killed",
                    format!("Server {} is not running.", record.name),
                ),
            }
        }),
        Request::Delete { selector, policy } => manager.delete(&selector, policy).map(|record| {
            Notification::info("Server Deleted", format!("Server {} deleted.", record.name))
        }),
        Request::Cancel { selector } => manager.cancel(&selector).map(|record| {
            Notification::info(
                "Cancellation Requested",
                format!("Asked the running operation on {} to stop.", record.name),
            )
        }),
        Request::List => {
            let summaries: Vec<crate::registry::EntrySummary> = manager.list();
            let message: String = match summaries.is_empty() {
                true => "No servers.".to_string(),
                false => summaries
                    .iter()
                    .map(|s| s.to_string())
                    .collect::<Vec<String>>()
                    .join("\n"),
            };
            Ok(Notification::info("Servers", message))
        }
        Request::Versions => Ok(Notification::info("Versions", manager.versions().join("\n"))),
    };

    return match outcome {
        Ok(notification) => {
            log::info!("{notification}");
            notification
        }
        Err(err) => {
            log::error!("{}: {}", err.category(), err);
            Notification::error(&err)
        }
    };
}
