//! Shared test fixture: a minimal HTTP stub server.
//!
//! Serves a fixed sequence of canned responses over real TCP, one per
//! connection, and records every request body so tests can assert on
//! what the client actually sent. Responses close the connection
//! (`Connection: close`), which keeps the protocol handling trivial.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// One canned response.
pub enum StubResponse {
    /// Plain JSON body with the given status code.
    Json(u16, String),
    /// An SSE stream; frames are written with small pauses between them
    /// so mid-stream behavior (like aborts) is observable.
    Sse(Vec<String>),
}

pub struct StubServer {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<String>>>,
}

impl StubServer {
    pub async fn start(responses: Vec<StubResponse>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));

        let recorded = requests.clone();
        tokio::spawn(async move {
            let mut remaining = responses.into_iter();
            while let Ok((mut socket, _)) = listener.accept().await {
                let Some(response) = remaining.next() else {
                    break;
                };
                let body = read_request(&mut socket).await;
                recorded.lock().unwrap().push(body);
                serve(&mut socket, response).await;
            }
        });

        Self { addr, requests }
    }

    /// Base URL for client configuration.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Request bodies received so far, in arrival order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

/// Read one HTTP request (headers + content-length body) and return the
/// body as a string.
async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let n = socket.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            return String::new();
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let headers = String::from_utf8_lossy(&buf[..header_end]).to_lowercase();
    let content_length: usize = headers
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        let n = socket.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    String::from_utf8_lossy(&buf[header_end..]).to_string()
}

async fn serve(socket: &mut TcpStream, response: StubResponse) {
    match response {
        StubResponse::Json(status, body) => {
            let head = format!(
                "HTTP/1.1 {status} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                reason(status),
                body.len(),
            );
            let _ = socket.write_all(head.as_bytes()).await;
            let _ = socket.write_all(body.as_bytes()).await;
            let _ = socket.flush().await;
        }
        StubResponse::Sse(frames) => {
            let head = "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nConnection: close\r\n\r\n";
            if socket.write_all(head.as_bytes()).await.is_err() {
                return;
            }
            for frame in frames {
                // Client may have torn the stream down mid-transfer.
                if socket.write_all(frame.as_bytes()).await.is_err() {
                    return;
                }
                let _ = socket.flush().await;
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        }
    }
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        401 => "Unauthorized",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

/// `data:`-framed SSE line for chat-completions stubs.
pub fn sse_data(json: &str) -> String {
    format!("data: {json}\n\n")
}

/// `event:` + `data:` framed SSE line for Anthropic stubs.
pub fn sse_event(event: &str, json: &str) -> String {
    format!("event: {event}\ndata: {json}\n\n")
}
