//! Raw TCP HTTP mock: one spawned handler per connection, replies served by
//! connection order, every request captured for assertions.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub request_line: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl CapturedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).unwrap()
    }

    /// The prompt of an OpenAI-style body (last message).
    pub fn user_prompt(&self) -> String {
        let body = self.json();
        let messages = body["messages"].as_array().unwrap();
        messages.last().unwrap()["content"].as_str().unwrap().to_string()
    }
}

#[derive(Debug, Clone)]
pub struct MockReply {
    pub status: u16,
    pub body: String,
    pub delay: Duration,
    /// Advertise a body far larger than `body`, send `body`, then keep the
    /// socket open. Only a client that stops reading early gets an answer.
    pub endless: bool,
}

impl MockReply {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            delay: Duration::ZERO,
            endless: false,
        }
    }

    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            delay: Duration::ZERO,
            endless: false,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn endless(mut self) -> Self {
        self.endless = true;
        self
    }
}

pub struct MockServer {
    pub port: u16,
    accepted: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<(usize, CapturedRequest)>>>,
    handle: tokio::task::JoinHandle<()>,
}

impl MockServer {
    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}/v1", self.port)
    }

    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Captured requests in connection order.
    pub fn requests(&self) -> Vec<CapturedRequest> {
        let mut all = self.requests.lock().unwrap().clone();
        all.sort_by_key(|(i, _)| *i);
        all.into_iter().map(|(_, r)| r).collect()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Serve `replies[i]` to the i-th connection. Extra connections get a 500.
pub async fn serve(replies: Vec<MockReply>) -> MockServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let accepted = Arc::new(AtomicUsize::new(0));
    let requests = Arc::new(Mutex::new(Vec::new()));

    let handle = {
        let accepted = accepted.clone();
        let requests = requests.clone();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let index = accepted.fetch_add(1, Ordering::SeqCst);
                let reply = replies
                    .get(index)
                    .cloned()
                    .unwrap_or_else(|| MockReply::status(500, "unexpected request"));
                let requests = requests.clone();
                tokio::spawn(async move {
                    if let Some(req) = read_request(&mut socket).await {
                        requests.lock().unwrap().push((index, req));
                    }
                    if !reply.delay.is_zero() {
                        tokio::time::sleep(reply.delay).await;
                    }
                    if reply.endless {
                        let head = http_head(reply.status, ENDLESS_CONTENT_LENGTH);
                        let _ = socket.write_all(head.as_bytes()).await;
                        let _ = socket.write_all(reply.body.as_bytes()).await;
                        let _ = socket.flush().await;
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        return;
                    }
                    let _ = socket
                        .write_all(http_response(reply.status, &reply.body).as_bytes())
                        .await;
                    let _ = socket.shutdown().await;
                });
            }
        })
    };

    MockServer {
        port,
        accepted,
        requests,
        handle,
    }
}

/// Content-Length advertised by endless replies (1 GiB).
const ENDLESS_CONTENT_LENGTH: usize = 1 << 30;

pub fn http_head(status: u16, content_length: usize) -> String {
    let reason = if status < 400 { "OK" } else { "Error" };
    format!(
        "HTTP/1.1 {status} {reason}\r\n\
         Content-Type: application/json\r\n\
         Content-Length: {content_length}\r\n\
         Connection: close\r\n\r\n"
    )
}

pub fn http_response(status: u16, body: &str) -> String {
    format!("{}{body}", http_head(status, body.len()))
}

/// Read one request: headers, then `Content-Length` bytes of body.
pub async fn read_request(socket: &mut TcpStream) -> Option<CapturedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);

        let Some(head_end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
        let mut lines = head.split("\r\n");
        let request_line = lines.next().unwrap_or_default().to_string();
        let headers: Vec<(String, String)> = lines
            .filter_map(|line| line.split_once(':'))
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .collect();
        let content_length = headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
            .and_then(|(_, v)| v.parse::<usize>().ok())
            .unwrap_or(0);

        let body_start = head_end + 4;
        if buf.len() >= body_start + content_length {
            let body = String::from_utf8_lossy(&buf[body_start..body_start + content_length]).to_string();
            return Some(CapturedRequest {
                request_line,
                headers,
                body,
            });
        }
    }
}

/// An OpenAI-style completion whose message content is `content`.
pub fn openai_reply(content: &str) -> String {
    serde_json::json!({
        "id": "chatcmpl-test",
        "choices": [{"index": 0, "message": {"role": "assistant", "content": content}}]
    })
    .to_string()
}

/// An Anthropic-style message whose first text block is `content`.
pub fn anthropic_reply(content: &str) -> String {
    serde_json::json!({
        "id": "msg_test",
        "type": "message",
        "content": [{"type": "text", "text": content}]
    })
    .to_string()
}

/// `{"results": [...]}` with one entry per `(index, tags)`.
pub fn batch_results(entries: &[(usize, &[&str])]) -> String {
    let results: Vec<serde_json::Value> = entries
        .iter()
        .map(|(index, tags)| serde_json::json!({"index": index, "tags": tags}))
        .collect();
    serde_json::json!({ "results": results }).to_string()
}
