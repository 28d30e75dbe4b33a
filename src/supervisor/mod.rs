//! Start/stop lifecycle of one server's child process.

/// What is written to the server console to make it shut down.
static STOP_COMMAND: &[u8] = b"stop\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Stopped,
    Running,
}
impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg: &str = match self {
            Status::Stopped => "Stopped",
            Status::Running => "Running",
        };
        write!(f, "{msg}")
    }
}

/// Whether a lifecycle call actually did something.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Changed,
    /// The server already was in the requested state.
    Unchanged,
}

struct RunningServer {
    child: std::process::Child,
    stdin: std::process::ChildStdin,
    output_threads: (std::thread::JoinHandle<()>, std::thread::JoinHandle<()>),
}

impl RunningServer {
    fn reap(self) {
        let _ = self.output_threads.0.join();
        let _ = self.output_threads.1.join();
    }
}

/// Owner of at most one live server process.
pub struct Supervisor {
    launcher: crate::proc::Launcher,
    directory: std::path::PathBuf,
    log_label: String,
    running: Option<RunningServer>,
}

impl Supervisor {
    pub fn new(record: &crate::record::ServerRecord, launcher: crate::proc::Launcher) -> Self {
        return Self {
            launcher,
            directory: record.directory.clone(),
            log_label: record.name.clone(),
            running: None,
        };
    }

    pub fn status(&self) -> Status {
        return match self.running {
            Some(_) => Status::Running,
            None => Status::Stopped,
        };
    }

    pub fn pid(&self) -> Option<u32> {
        return self.running.as_ref().map(|r| r.child.id());
    }

    /// Spawn the server with its console attached to us. Does nothing if it
    /// is already running.
    pub fn start(&mut self) -> Result<Transition, crate::proc::ProcessError> {
        if self.running.is_some() {
            log::debug!("{} is already running -- Not starting again", self.log_label);
            return Ok(Transition::Unchanged);
        }

        let mut command: std::process::Command = self.launcher.command(&self.directory);
        command.stdin(std::process::Stdio::piped());
        command.stdout(std::process::Stdio::piped());
        command.stderr(std::process::Stdio::piped());

        let mut child: std::process::Child = match command.spawn() {
            Ok(n) => n,
            Err(source) => {
                return Err(crate::proc::ProcessError::Spawn {
                    command: self.launcher.describe(),
                    source,
                })
            }
        };
        let stdin: std::process::ChildStdin = match child.stdin.take() {
            Some(n) => n,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(crate::proc::ProcessError::StdinUnavailable);
            }
        };
        let output_threads = crate::proc::trace_log_child_output(&mut child, &self.log_label);

        log::info!("Started {} as PID {}", self.log_label, child.id());
        self.running = Some(RunningServer {
            child,
            stdin,
            output_threads,
        });
        return Ok(Transition::Changed);
    }

    /// Ask the server to shut down via its console and wait for it to exit.
    /// Does nothing if it is not running.
    ///
    /// On failure the handle is kept: the server still counts as running and
    /// the caller may retry or [`Supervisor::kill`] it.
    pub fn stop(
        &mut self,
        timeout: std::time::Duration,
        cancel: &crate::util::CancelToken,
    ) -> Result<Transition, crate::proc::ProcessError> {
        let running: &mut RunningServer = match self.running.as_mut() {
            Some(n) => n,
            None => {
                log::debug!("{} is not running -- Nothing to stop", self.log_label);
                return Ok(Transition::Unchanged);
            }
        };

        use std::io::Write;
        running
            .stdin
            .write_all(STOP_COMMAND)
            .and_then(|_| running.stdin.flush())
            .map_err(crate::proc::ProcessError::WriteCommand)?;
        log::debug!(
            "Sent stop command to {} (PID {}) -- Waiting for it to exit...",
            self.log_label,
            running.child.id()
        );

        match crate::proc::wait_bounded(&mut running.child, timeout, Some(cancel)) {
            Ok(crate::proc::Waited::Exited(status)) => {
                log::info!("{} exited: {status}", self.log_label);
            }
            Ok(crate::proc::Waited::TimedOut) => {
                return Err(crate::proc::ProcessError::TimedOut(timeout));
            }
            Ok(crate::proc::Waited::Cancelled) => {
                return Err(crate::proc::ProcessError::Cancelled);
            }
            Err(err) => return Err(crate::proc::ProcessError::Wait(err)),
        }

        if let Some(running) = self.running.take() {
            running.reap();
        }
        return Ok(Transition::Changed);
    }

    /// Stop, then start again. A stopped server is simply started.
    pub fn restart(
        &mut self,
        timeout: std::time::Duration,
        cancel: &crate::util::CancelToken,
    ) -> Result<(), crate::proc::ProcessError> {
        self.stop(timeout, cancel)?;
        self.start()?;
        return Ok(());
    }

    /// Forcefully end the server process and forget about it.
    pub fn kill(
        &mut self,
        grace: std::time::Duration,
    ) -> Result<Transition, crate::proc::ProcessError> {
        let mut running: RunningServer = match self.running.take() {
            Some(n) => n,
            None => return Ok(Transition::Unchanged),
        };
        match crate::proc::terminate(&mut running.child, grace) {
            Ok(status) => {
                log::warn!("Killed {}: {status}", self.log_label);
                running.reap();
                return Ok(Transition::Changed);
            }
            Err(err) => {
                self.running = Some(running);
                return Err(crate::proc::ProcessError::Wait(err));
            }
        }
    }

    /// Let go of the process without stopping it. Returns its PID if there
    /// was one.
    pub fn detach(&mut self) -> Option<u32> {
        let running: RunningServer = self.running.take()?;
        let pid: u32 = running.child.id();
        log::warn!(
            "Detached from {} (PID {}) -- It keeps running unsupervised",
            self.log_label,
            pid
        );
        return Some(pid);
    }
}
