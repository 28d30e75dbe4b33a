//! HTTP stuff.

/// Failures related to HTTP operations.
pub enum HttpError {
    /// Server answered with something else than _200 OK_.
    BadStatus(u16),
    Transport(reqwest::Error),
    IO(std::io::Error),
    EmptyPayload,
    Cancelled,
}
impl std::fmt::Debug for HttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadStatus(arg0) => f.debug_tuple("BadStatus").field(arg0).finish(),
            Self::Transport(arg0) => f.debug_tuple("Transport").field(arg0).finish(),
            Self::IO(arg0) => f.debug_tuple("IO").field(&arg0.kind()).finish(),
            Self::EmptyPayload => f.debug_tuple("EmptyPayload").finish(),
            Self::Cancelled => f.debug_tuple("Cancelled").finish(),
        }
    }
}
impl std::fmt::Display for HttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadStatus(code) => write!(f, "unexpected response status {code}"),
            Self::Transport(_) => write!(f, "request failed"),
            Self::IO(_) => write!(f, "cannot write payload to disk"),
            Self::EmptyPayload => write!(f, "response had an empty payload"),
            Self::Cancelled => write!(f, "download cancelled"),
        }
    }
}
impl std::error::Error for HttpError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(err) => Some(err),
            Self::IO(err) => Some(err),
            Self::BadStatus(_) | Self::EmptyPayload | Self::Cancelled => None,
        }
    }
}
impl From<std::io::Error> for HttpError {
    fn from(err: std::io::Error) -> Self {
        return Self::IO(err);
    }
}
impl From<reqwest::Error> for HttpError {
    fn from(err: reqwest::Error) -> Self {
        return Self::Transport(err);
    }
}

/// Something that can put the body of a URL into a file.
pub trait Fetch {
    /// Download `url` into `target_path`, returning the number of payload
    /// bytes written.
    fn fetch(
        &self,
        url: &str,
        target_path: &std::path::Path,
        cancel: &crate::util::CancelToken,
    ) -> Result<u64, HttpError>;
}

/// Blocking HTTP client with an overall per-request timeout.
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new(timeout: std::time::Duration) -> Result<Self, HttpError> {
        let client: reqwest::blocking::Client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        return Ok(Self { client });
    }

    /// Use a preconfigured client, e.g. one that bypasses proxies.
    pub fn with_client(client: reqwest::blocking::Client) -> Self {
        return Self { client };
    }
}

impl Fetch for HttpFetcher {
    fn fetch(
        &self,
        url: &str,
        target_path: &std::path::Path,
        cancel: &crate::util::CancelToken,
    ) -> Result<u64, HttpError> {
        log::debug!("GET {url}");
        let response: reqwest::blocking::Response = self.client.get(url).send()?;
        let status: reqwest::StatusCode = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(HttpError::BadStatus(status.as_u16()));
        }
        let written: u64 = stream_to_disk(response, target_path, cancel)?;
        log::debug!(
            "Downloaded {} bytes from {} to {}",
            written,
            url,
            target_path.to_string_lossy()
        );
        return Ok(written);
    }
}

/// Stream an HTTP response payload to disk.
///
/// The cancellation token is checked between chunks. A partially written
/// file is left in place on failure.
pub fn stream_to_disk<R: std::io::Read>(
    mut stream: R,
    target_path: &std::path::Path,
    cancel: &crate::util::CancelToken,
) -> std::result::Result<u64, HttpError> {
    use std::io::Write;
    let mut buffer: [u8; 8192] = [0; 8192];
    let mut file_out: std::fs::File = std::fs::File::create(target_path)?;
    let mut total_bytes_written: u64 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(HttpError::Cancelled);
        }
        let bytes_read: usize = match stream.read(&mut buffer) {
            Ok(n) => n,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(HttpError::IO(err)),
        };
        if bytes_read == 0 {
            break;
        }
        file_out.write_all(&buffer[..bytes_read])?;
        total_bytes_written += bytes_read as u64;
    }

    file_out.flush()?;

    if total_bytes_written < 1 {
        return Err(HttpError::EmptyPayload);
    } else {
        return Ok(total_bytes_written);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    struct MockStream {
        data: Vec<u8>,
        position: usize,
        chunk: usize,
    }
    impl MockStream {
        fn new(data: &[u8], chunk: usize) -> Self {
            return Self {
                data: data.to_vec(),
                position: 0,
                chunk,
            };
        }
    }
    impl std::io::Read for MockStream {
        fn read(&mut self, buf: &mut [u8]) -> Result<usize, std::io::Error> {
            if self.position >= self.data.len() {
                return Ok(0);
            }
            let bytes_to_read: usize = std::cmp::min(
                std::cmp::min(buf.len(), self.chunk),
                self.data.len() - self.position,
            );
            buf[..bytes_to_read]
                .copy_from_slice(&self.data[self.position..self.position + bytes_to_read]);
            self.position += bytes_to_read;
            return Ok(bytes_to_read);
        }
    }

    /// Serve exactly one canned HTTP response on a loopback port.
    fn serve_once(response: &'static [u8]) -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            if let Ok((mut sock, _)) = listener.accept() {
                use std::io::{Read, Write};
                let mut request = [0u8; 4096];
                let _ = sock.read(&mut request);
                let _ = sock.write_all(response);
            }
        });
        return format!("http://{addr}/paper.jar");
    }

    fn loopback_fetcher() -> HttpFetcher {
        let client = reqwest::blocking::Client::builder()
            .no_proxy()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap();
        return HttpFetcher::with_client(client);
    }

    #[test]
    fn test_stream_to_disk_ok() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.jar");
        let payload: Vec<u8> = (0..20000u32).map(|n| (n % 251) as u8).collect();
        let stream = MockStream::new(&payload, 3000);
        let result = stream_to_disk(stream, &path, &crate::util::CancelToken::new());
        match result {
            Ok(written) => assert_eq!(written, 20000),
            Err(err) => panic!("expected bytes written, got {err:?}"),
        }
        assert_eq!(std::fs::read(&path).unwrap(), payload);
    }

    #[test]
    fn test_stream_to_disk_empty_payload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.jar");
        let stream = MockStream::new(b"", 10);
        match stream_to_disk(stream, &path, &crate::util::CancelToken::new()) {
            Err(HttpError::EmptyPayload) => {}
            other => panic!("expected error EmptyPayload, got {other:?}"),
        }
    }

    #[test]
    fn test_stream_to_disk_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.jar");
        let cancel = crate::util::CancelToken::new();
        cancel.cancel();
        let stream = MockStream::new(b"abc", 10);
        match stream_to_disk(stream, &path, &cancel) {
            Err(HttpError::Cancelled) => {}
            other => panic!("expected error Cancelled, got {other:?}"),
        }
    }

    #[test]
    fn test_fetch_not_found_is_bad_status() {
        let url = serve_once(
            b"HTTP/1.1 404 Not Found\r\nContent-Length: 9\r\nConnection: close\r\n\r\nnot found",
        );
        let dir = tempfile::tempdir().unwrap();
        let fetcher = loopback_fetcher();
        let result = fetcher.fetch(
            &url,
            &dir.path().join("server.jar"),
            &crate::util::CancelToken::new(),
        );
        match result {
            Err(HttpError::BadStatus(404)) => {}
            other => panic!("expected BadStatus(404), got {other:?}"),
        }
        assert!(!dir.path().join("server.jar").exists());
    }

    #[test]
    fn test_fetch_ok_writes_body() {
        let url = serve_once(
            b"HTTP/1.1 200 OK\r\nContent-Length: 4\r\nConnection: close\r\n\r\nPK\x03\x04",
        );
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.jar");
        let fetcher = loopback_fetcher();
        let written = fetcher
            .fetch(&url, &path, &crate::util::CancelToken::new())
            .unwrap();
        assert_eq!(written, 4);
        assert_eq!(std::fs::read(&path).unwrap(), b"PK\x03\x04");
    }
}
