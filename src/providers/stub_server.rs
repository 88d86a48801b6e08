//! Loopback HTTP/1.1 server for driving the live clients in tests.

use reqwest::ClientBuilder;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

pub struct StubReply {
    delay: Duration,
    raw: String,
}

impl StubReply {
    /// Hold the response back; used to push a client past its timeout.
    pub fn delayed(self, delay: Duration) -> Self {
        Self { delay, ..self }
    }
}

/// A complete response. `status` is the status line tail, e.g. `"404 Not Found"`.
pub fn reply(status: &str, headers: &[(&str, &str)], body: &str) -> StubReply {
    let extra: String = headers
        .iter()
        .map(|(name, value)| format!("{name}: {value}\r\n"))
        .collect();
    StubReply {
        delay: Duration::ZERO,
        raw: format!(
            "HTTP/1.1 {status}\r\n{extra}Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        ),
    }
}

pub fn request_path(raw: &str) -> &str {
    raw.split_whitespace().nth(1).unwrap_or("/")
}

pub fn request_body(raw: &str) -> &str {
    raw.split_once("\r\n\r\n").map(|(_, body)| body).unwrap_or("")
}

/// Client settings shared by the tests: short timeout, never via a proxy.
pub fn client_builder(timeout: Duration) -> ClientBuilder {
    reqwest::Client::builder().timeout(timeout).no_proxy()
}

fn content_length(head: &str) -> usize {
    head.lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse().ok())
        .unwrap_or(0)
}

async fn read_request(sock: &mut TcpStream) -> Option<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = sock.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_string();
            let want = end + 4 + content_length(&head);
            while buf.len() < want {
                let n = sock.read(&mut chunk).await.ok()?;
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            return Some(String::from_utf8_lossy(&buf).to_string());
        }
    }
}

/// Serve every connection with `route(raw_request)`. Returns the base URL.
pub async fn serve<F>(route: F) -> String
where
    F: Fn(&str) -> StubReply + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let route = Arc::new(route);
    tokio::spawn(async move {
        while let Ok((mut sock, _)) = listener.accept().await {
            let route = Arc::clone(&route);
            tokio::spawn(async move {
                let Some(request) = read_request(&mut sock).await else {
                    return;
                };
                let reply = route(&request);
                if !reply.delay.is_zero() {
                    tokio::time::sleep(reply.delay).await;
                }
                let _ = sock.write_all(reply.raw.as_bytes()).await;
                let _ = sock.shutdown().await;
            });
        }
    });
    format!("http://{addr}")
}
