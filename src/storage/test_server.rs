//! Minimal HTTP server for download tests

use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// How the server answers
#[derive(Debug, Clone, Copy)]
pub enum Mode {
    /// Serve the body, honoring `Range: bytes=N-` (416 past the end)
    Normal,
    /// Always send the full body with 200
    IgnoreRange,
    /// Advertise the full length but hang up after this many bytes
    Truncate(usize),
    /// Reply with an empty body and this status
    Status(u16),
}

/// A running server and the raw requests it has seen
pub struct TestServer {
    pub url: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl TestServer {
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    /// The `Range` header value of request `i`, lowercased
    pub fn range_of(&self, i: usize) -> Option<String> {
        self.requests()[i]
            .lines()
            .map(str::to_ascii_lowercase)
            .find_map(|l| l.strip_prefix("range: ").map(str::to_string))
    }
}

fn range_start(request: &str) -> Option<usize> {
    request.lines().find_map(|line| {
        line.to_ascii_lowercase()
            .strip_prefix("range: bytes=")
            .and_then(|r| r.trim().trim_end_matches('-').parse::<usize>().ok())
    })
}

/// Serve `body` at `/<name>` on a random local port
pub async fn serve(body: Vec<u8>, name: &str, mode: Mode) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&requests);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let mut request = Vec::new();
            let mut chunk = [0u8; 1024];
            loop {
                let n = socket.read(&mut chunk).await.unwrap_or(0);
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&chunk[..n]);
                if request.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
            let request = String::from_utf8_lossy(&request).into_owned();
            let start = range_start(&request);
            log.lock().unwrap().push(request);

            let (code, reason, length, payload): (u16, &str, usize, &[u8]) = match (mode, start) {
                (Mode::Status(code), _) => (code, "Error", 0, &[]),
                (Mode::Truncate(cut), _) => (200, "OK", body.len(), &body[..cut]),
                (Mode::Normal, Some(start)) if start >= body.len() => {
                    (416, "Range Not Satisfiable", 0, &[])
                }
                (Mode::Normal, Some(start)) => {
                    (206, "Partial Content", body.len() - start, &body[start..])
                }
                (Mode::Normal, None) | (Mode::IgnoreRange, _) => (200, "OK", body.len(), &body[..]),
            };
            let head = format!(
                "HTTP/1.1 {code} {reason}\r\nContent-Length: {length}\r\nConnection: close\r\n\r\n"
            );
            let _ = socket.write_all(head.as_bytes()).await;
            let _ = socket.write_all(payload).await;
            let _ = socket.shutdown().await;
        }
    });

    TestServer {
        url: format!("http://{addr}/{name}"),
        requests,
    }
}

/// Client that never routes through a proxy
pub fn local_client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}
