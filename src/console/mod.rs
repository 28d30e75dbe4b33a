//! Interactive line-based front end.
//!
//! Every line is a command for the [`crate::dispatch::Dispatcher`]. Outcomes
//! of slow commands are printed whenever they arrive so the prompt stays
//! usable while a server downloads or stops.

use std::io::Write;

pub const PROMPT: &str = "> ";

#[derive(Debug, PartialEq, Eq)]
pub enum TokenizeError {
    UnterminatedQuote,
}
impl std::error::Error for TokenizeError {}
impl std::fmt::Display for TokenizeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenizeError::UnterminatedQuote => write!(f, "missing closing quote"),
        }
    }
}

/// Split a line on whitespace. Double quotes group words, and inside them
/// `\"` and `\\` stand for a literal quote and backslash.
pub fn tokenize(line: &str) -> Result<Vec<String>, TokenizeError> {
    let mut tokens: Vec<String> = Vec::new();
    let mut current: Option<String> = None;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                let token: &mut String = current.get_or_insert_with(String::new);
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(escaped @ ('"' | '\\')) => token.push(escaped),
                            Some(other) => {
                                token.push('\\');
                                token.push(other);
                            }
                            None => return Err(TokenizeError::UnterminatedQuote),
                        },
                        Some(other) => token.push(other),
                        None => return Err(TokenizeError::UnterminatedQuote),
                    }
                }
            }
            c if c.is_whitespace() => {
                if let Some(token) = current.take() {
                    tokens.push(token);
                }
            }
            c => current.get_or_insert_with(String::new).push(c),
        }
    }
    if let Some(token) = current {
        tokens.push(token);
    }
    return Ok(tokens);
}

/// What a single input line asks for.
#[derive(Debug)]
pub enum Line {
    Empty,
    Quit,
    Request(crate::dispatch::Request),
    /// Help text or a usage error to show as is.
    Message(String),
}

pub fn parse_line(line: &str) -> Line {
    let tokens: Vec<String> = match tokenize(line) {
        Ok(n) => n,
        Err(err) => return Line::Message(format!("error: {err}")),
    };
    if tokens.is_empty() {
        return Line::Empty;
    }
    let parsed: crate::args::ConsoleLine = match clap::Parser::try_parse_from(tokens) {
        Ok(n) => n,
        Err(err) => return Line::Message(err.render().to_string().trim_end().to_string()),
    };
    return match parsed.cmd.into_request() {
        Some(request) => Line::Request(request),
        None => Line::Quit,
    };
}

pub struct Console<W: std::io::Write + Send + 'static> {
    dispatcher: crate::dispatch::Dispatcher,
    output: std::sync::Arc<std::sync::Mutex<W>>,
    printers: Vec<std::thread::JoinHandle<()>>,
}

impl<W: std::io::Write + Send + 'static> Console<W> {
    pub fn new(dispatcher: crate::dispatch::Dispatcher, output: W) -> Self {
        return Self {
            dispatcher,
            output: std::sync::Arc::new(std::sync::Mutex::new(output)),
            printers: Vec::new(),
        };
    }

    /// Read commands until `quit` or end of input. All running servers are
    /// stopped before returning.
    pub fn run<R: std::io::BufRead>(mut self, input: R) -> std::io::Result<()> {
        self.write(PROMPT, false)?;
        for line in input.lines() {
            let line: String = line?;
            match parse_line(&line) {
                Line::Empty => {}
                Line::Quit => break,
                Line::Message(text) => self.write(&text, true)?,
                Line::Request(request) => self.submit(request)?,
            }
            self.printers.retain(|printer| !printer.is_finished());
            self.write(PROMPT, false)?;
        }

        self.write("Stopping servers...", true)?;
        let stopped: usize = self.dispatcher.manager().shutdown();
        log::info!("Console closed, {stopped} server(s) stopped");
        for printer in self.printers.drain(..) {
            let _ = printer.join();
        }
        self.dispatcher.shutdown();
        return Ok(());
    }

    fn submit(&mut self, request: crate::dispatch::Request) -> std::io::Result<()> {
        let background: bool = matches!(request, crate::dispatch::Request::Create(_));
        let receiver = match self.dispatcher.submit(request) {
            Ok(n) => n,
            Err(err) => {
                let notification = crate::dispatch::Notification::error(&err);
                return self.write(&notification.to_string(), true);
            }
        };

        if !background {
            return match receiver.recv() {
                Ok(notification) => self.write(&notification.to_string(), true),
                Err(_) => Ok(()),
            };
        }

        self.write("Working on it in the background.", true)?;
        let output = std::sync::Arc::clone(&self.output);
        let printer = std::thread::Builder::new()
            .name("notifier".into())
            .spawn(move || {
                if let Ok(notification) = receiver.recv() {
                    let mut out = output.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                    let _ = writeln!(out, "\n{notification}");
                    let _ = out.flush();
                }
            })?;
        self.printers.push(printer);
        return Ok(());
    }

    fn write(&self, text: &str, newline: bool) -> std::io::Result<()> {
        let mut out = self
            .output
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        match newline {
            true => writeln!(out, "{text}")?,
            false => write!(out, "{text}")?,
        }
        return out.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize() {
        assert_eq!(tokenize("  start   S1 ").unwrap(), vec!["start", "S1"]);
        assert_eq!(
            tokenize(r#"create -n "My Server" -d "/srv/my server""#).unwrap(),
            vec!["create", "-n", "My Server", "-d", "/srv/my server"]
        );
        assert_eq!(tokenize(r#"a"b c"d"#).unwrap(), vec!["ab cd"]);
        assert_eq!(tokenize(r#""say \"hi\" \\ \n""#).unwrap(), vec![r#"say "hi" \ \n"#]);
        assert_eq!(tokenize(r#""""#).unwrap(), vec![""]);
        assert!(tokenize("").unwrap().is_empty());
        assert_eq!(tokenize(r#"stop "S1"#), Err(TokenizeError::UnterminatedQuote));
    }

    #[test]
    fn test_parse_line() {
        assert!(matches!(parse_line("   "), Line::Empty));
        assert!(matches!(parse_line("quit"), Line::Quit));
        assert!(matches!(
            parse_line("stop \"My Server\""),
            Line::Request(crate::dispatch::Request::Stop { selector }) if selector == "My Server"
        ));
        match parse_line("help") {
            Line::Message(text) => assert!(text.contains("create"), "{text}"),
            other => panic!("expected help text, got {other:?}"),
        }
        assert!(matches!(parse_line("start"), Line::Message(_)));
        assert!(matches!(parse_line("stop \"S1"), Line::Message(_)));
    }

    #[derive(Clone, Default)]
    struct SharedBuffer(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);
    impl std::io::Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
    impl SharedBuffer {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    /// Input that holds back its next line until a condition holds.
    enum Step {
        Line(String),
        WaitFor(Box<dyn Fn() -> bool>),
    }
    struct Scripted(std::collections::VecDeque<Step>);
    impl std::io::Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            loop {
                match self.0.pop_front() {
                    None => return Ok(0),
                    Some(Step::WaitFor(ready)) => {
                        while !ready() {
                            std::thread::sleep(std::time::Duration::from_millis(20));
                        }
                    }
                    Some(Step::Line(line)) => {
                        let bytes = line.as_bytes();
                        let n = bytes.len().min(buf.len());
                        buf[..n].copy_from_slice(&bytes[..n]);
                        if n < bytes.len() {
                            let rest = String::from_utf8(bytes[n..].to_vec()).unwrap();
                            self.0.push_front(Step::Line(rest));
                        }
                        return Ok(n);
                    }
                }
            }
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_session() {
        use crate::manager::DeletePolicy;
        use crate::provision::testing::FakeFetch;

        let data = tempfile::tempdir().unwrap();
        let servers = tempfile::tempdir().unwrap();
        let manager = std::sync::Arc::new(crate::manager::testing::manager(
            data.path(),
            FakeFetch::ok(),
            DeletePolicy::StopFirst,
        ));
        let dispatcher = crate::dispatch::Dispatcher::new(std::sync::Arc::clone(&manager), 2, 4);
        let output = SharedBuffer::default();

        let dir = servers.path().join("my server");
        let watched = std::sync::Arc::clone(&manager);
        let input = Scripted(std::collections::VecDeque::from([
            Step::Line("versions\nlaunch S1\n".into()),
            Step::Line(format!(
                "create --name \"My Server\" --dir \"{}\" --port 30000\n",
                dir.display()
            )),
            Step::WaitFor(Box::new(move || {
                watched
                    .list()
                    .iter()
                    .any(|s| s.state == crate::registry::State::Stopped)
            })),
            Step::Line("list\n".into()),
        ]));
        Console::new(dispatcher, output.clone())
            .run(std::io::BufReader::new(input))
            .unwrap();

        let text = output.text();
        assert!(text.contains("[Versions] 1.21.1"), "{text}");
        assert!(text.contains("unrecognized subcommand"), "{text}");
        assert!(text.contains("Working on it in the background."), "{text}");
        assert!(
            text.contains("[Server Created] Server My Server is set up on port 30000 (control port 30001)."),
            "{text}"
        );
        assert!(text.contains("My Server (Port: 30000, Version: 1.21.1) Stopped"), "{text}");
        assert!(text.contains("Stopping servers..."), "{text}");
        assert!(dir.join(crate::properties::PROPERTIES_FILE).is_file());
    }

    #[cfg(unix)]
    #[test]
    fn test_quit_stops_running_servers() {
        use crate::provision::testing::FakeFetch;

        let data = tempfile::tempdir().unwrap();
        let servers = tempfile::tempdir().unwrap();
        let manager = std::sync::Arc::new(crate::manager::testing::manager(
            data.path(),
            FakeFetch::ok(),
            crate::manager::DeletePolicy::StopFirst,
        ));
        let dispatcher = crate::dispatch::Dispatcher::new(std::sync::Arc::clone(&manager), 1, 4);
        assert_eq!(
            dispatcher
                .submit_and_wait(crate::dispatch::Request::Create(
                    crate::manager::testing::new_server("S1", &servers.path().join("s1"))
                ))
                .title,
            "Server Created"
        );
        let output = SharedBuffer::default();

        Console::new(dispatcher, output.clone())
            .run(std::io::Cursor::new("start S1\nlist\nquit\nstart S1\n"))
            .unwrap();

        let text = output.text();
        assert!(text.contains("[Server Started] Server S1 started."), "{text}");
        assert!(text.contains("Running as PID"), "{text}");
        assert_eq!(text.matches("[Server Started]").count(), 1, "{text}");
        assert_eq!(manager.list()[0].state, crate::registry::State::Stopped);
    }
}
