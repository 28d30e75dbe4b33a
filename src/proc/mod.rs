//! Abstractions related to handling processes on the system.

/// How often a bounded wait checks whether the child has exited.
static WAIT_POLL_INTERVAL: std::time::Duration = std::time::Duration::from_millis(50);

/// Failures related to spawning, talking to or waiting on a child process.
#[derive(Debug)]
pub enum ProcessError {
    Spawn {
        command: String,
        source: std::io::Error,
    },
    Wait(std::io::Error),
    /// The child was spawned without a writable standard input.
    StdinUnavailable,
    /// Writing a command to the child's standard input failed, e.g. because
    /// it has already exited.
    WriteCommand(std::io::Error),
    TimedOut(std::time::Duration),
    Cancelled,
}
impl std::error::Error for ProcessError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProcessError::Spawn { source, .. } => Some(source),
            ProcessError::Wait(err) => Some(err),
            ProcessError::WriteCommand(err) => Some(err),
            ProcessError::StdinUnavailable
            | ProcessError::TimedOut(_)
            | ProcessError::Cancelled => None,
        }
    }
}
impl std::fmt::Display for ProcessError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessError::Spawn { command, .. } => write!(f, "cannot spawn '{command}'"),
            ProcessError::Wait(_) => write!(f, "cannot wait for child process"),
            ProcessError::StdinUnavailable => {
                write!(f, "standard input of child process is not available")
            }
            ProcessError::WriteCommand(_) => {
                write!(f, "cannot write command to standard input of child process")
            }
            ProcessError::TimedOut(after) => {
                write!(f, "child process did not exit within {} s", after.as_secs())
            }
            ProcessError::Cancelled => write!(f, "waiting for child process was cancelled"),
        }
    }
}

/// The command line that runs a server jar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Launcher {
    program: String,
    args: Vec<String>,
}

impl Launcher {
    /// `<java> <java_args...> -jar server.jar`
    pub fn java(java: &str, java_args: &[String]) -> Self {
        let mut args: Vec<String> = java_args.to_vec();
        args.push("-jar".into());
        args.push(crate::record::SERVER_JAR.into());
        return Self {
            program: java.into(),
            args,
        };
    }

    /// Arbitrary command line, e.g. a wrapper script.
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        return Self {
            program: program.into(),
            args,
        };
    }

    pub fn command(&self, work_dir: &std::path::Path) -> std::process::Command {
        let mut command: std::process::Command = std::process::Command::new(&self.program);
        command.current_dir(work_dir);
        command.args(&self.args);
        return command;
    }

    pub fn describe(&self) -> String {
        return std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(String::as_str)
            .collect::<Vec<&str>>()
            .join(" ");
    }
}

/// Outcome of waiting on a child with a deadline.
#[derive(Debug)]
pub enum Waited {
    Exited(std::process::ExitStatus),
    TimedOut,
    Cancelled,
}

/// Wait for `child` to exit, giving up after `timeout` or as soon as `cancel`
/// is tripped. The child is left alone when giving up.
pub fn wait_bounded(
    child: &mut std::process::Child,
    timeout: std::time::Duration,
    cancel: Option<&crate::util::CancelToken>,
) -> Result<Waited, std::io::Error> {
    let deadline: std::time::Instant = std::time::Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Waited::Exited(status));
        }
        if cancel.map_or(false, |c| c.is_cancelled()) {
            return Ok(Waited::Cancelled);
        }
        let now: std::time::Instant = std::time::Instant::now();
        if now >= deadline {
            return Ok(Waited::TimedOut);
        }
        std::thread::sleep(std::cmp::min(WAIT_POLL_INTERVAL, deadline - now));
    }
}

/// Ask the child to terminate, then kill it if it is still around after
/// `grace`. Reaps the child.
pub fn terminate(
    child: &mut std::process::Child,
    grace: std::time::Duration,
) -> Result<std::process::ExitStatus, std::io::Error> {
    #[cfg(unix)]
    {
        let pid: nix::unistd::Pid = nix::unistd::Pid::from_raw(child.id() as i32);
        match nix::sys::signal::kill(pid, nix::sys::signal::Signal::SIGTERM) {
            Ok(()) => {
                if let Waited::Exited(status) = wait_bounded(child, grace, None)? {
                    return Ok(status);
                }
                log::warn!(
                    "Process {} ignored SIGTERM for {} s -- Killing it",
                    child.id(),
                    grace.as_secs()
                );
            }
            // Already gone but not yet reaped.
            Err(nix::errno::Errno::ESRCH) => return child.wait(),
            Err(errno) => log::warn!("Cannot send SIGTERM to process {}: {errno}", child.id()),
        }
    }
    #[cfg(not(unix))]
    let _ = grace;

    match child.kill() {
        Ok(()) => {}
        // Exited in the meantime.
        Err(err) if err.kind() == std::io::ErrorKind::InvalidInput => {}
        Err(err) => return Err(err),
    }
    return child.wait();
}

/// Run the launcher in `work_dir` until it exits on its own, with output
/// trace logged. On timeout or cancellation the child is killed.
pub fn run_to_end(
    launcher: &Launcher,
    work_dir: &std::path::Path,
    timeout: std::time::Duration,
    cancel: &crate::util::CancelToken,
    log_label: &str,
) -> Result<std::process::ExitStatus, ProcessError> {
    let mut command: std::process::Command = launcher.command(work_dir);
    command.stdin(std::process::Stdio::null());
    command.stdout(std::process::Stdio::piped());
    command.stderr(std::process::Stdio::piped());

    let mut child: std::process::Child = match command.spawn() {
        Ok(n) => n,
        Err(source) => {
            return Err(ProcessError::Spawn {
                command: launcher.describe(),
                source,
            })
        }
    };
    log::debug!(
        "Spawned '{}' as PID {} in {}",
        launcher.describe(),
        child.id(),
        work_dir.to_string_lossy()
    );

    let (stdout_thread, stderr_thread) = trace_log_child_output(&mut child, log_label);

    let waited: Result<Waited, std::io::Error> = wait_bounded(&mut child, timeout, Some(cancel));
    let outcome: Result<std::process::ExitStatus, ProcessError> = match waited {
        Ok(Waited::Exited(status)) => Ok(status),
        Ok(Waited::TimedOut) => {
            let _ = child.kill();
            let _ = child.wait();
            Err(ProcessError::TimedOut(timeout))
        }
        Ok(Waited::Cancelled) => {
            let _ = child.kill();
            let _ = child.wait();
            Err(ProcessError::Cancelled)
        }
        Err(err) => Err(ProcessError::Wait(err)),
    };

    let _ = stdout_thread.join();
    let _ = stderr_thread.join();

    return outcome;
}

/// Forward the child's standard output and error to the trace log line by
/// line, each on its own thread. Threads end when the streams close.
pub fn trace_log_child_output(
    child: &mut std::process::Child,
    log_label: &str,
) -> (std::thread::JoinHandle<()>, std::thread::JoinHandle<()>) {
    let stdout: Option<std::process::ChildStdout> = child.stdout.take();
    let stderr: Option<std::process::ChildStderr> = child.stderr.take();

    let label: String = log_label.to_string();
    let stdout_thread: std::thread::JoinHandle<()> = std::thread::spawn(move || {
        if let Some(n) = stdout {
            let reader: std::io::BufReader<std::process::ChildStdout> = std::io::BufReader::new(n);
            for line in std::io::BufRead::lines(reader).flatten() {
                log::trace!("[{label}] {line}");
            }
        }
    });

    let label: String = log_label.to_string();
    let stderr_thread: std::thread::JoinHandle<()> = std::thread::spawn(move || {
        if let Some(n) = stderr {
            let reader: std::io::BufReader<std::process::ChildStderr> = std::io::BufReader::new(n);
            for line in std::io::BufRead::lines(reader).flatten() {
                log::trace!("[{label}] {line}");
            }
        }
    });

    return (stdout_thread, stderr_thread);
}
