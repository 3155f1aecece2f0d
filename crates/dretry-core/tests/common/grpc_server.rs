//! Minimal HTTP/1.1 server that answers POSTs like a gRPC endpoint.
//!
//! Each connection serves one request. Responses come from a script indexed by
//! request count (the last entry repeats), so tests can fail a few attempts
//! and then succeed.

use std::io::{Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// How the server answers one request.
#[derive(Debug, Clone)]
pub enum Reply {
    /// HTTP 200 with a framed message and no status metadata.
    Message(Vec<u8>),
    /// HTTP 200 with the given `grpc-status` header and optional `grpc-message`.
    Status(String, Option<String>),
    /// Bare HTTP status without gRPC metadata.
    Http(u16),
    /// Read the request and never answer.
    Hang,
}

pub struct ServerHandle {
    pub url: String,
    requests: Arc<AtomicUsize>,
}

impl ServerHandle {
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

/// Starts a server in a background thread. It runs until the process exits.
pub fn start(script: Vec<Reply>) -> ServerHandle {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let script = Arc::new(script);
    let requests = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&requests);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            let reply = script
                .get(n)
                .or_else(|| script.last())
                .cloned()
                .unwrap_or(Reply::Http(500));
            thread::spawn(move || handle(stream, reply));
        }
    });
    ServerHandle {
        url: format!("http://127.0.0.1:{}", port),
        requests,
    }
}

/// A local address with nothing listening on it.
pub fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{}", port)
}

fn handle(mut stream: TcpStream, reply: Reply) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(2)));
    if read_request(&mut stream).is_none() {
        return;
    }
    let response = match reply {
        Reply::Hang => {
            thread::sleep(Duration::from_secs(5));
            return;
        }
        Reply::Message(msg) => {
            let mut body = vec![0u8];
            body.extend_from_slice(&(msg.len() as u32).to_be_bytes());
            body.extend_from_slice(&msg);
            let mut head = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/grpc\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
                body.len()
            )
            .into_bytes();
            head.extend_from_slice(&body);
            head
        }
        Reply::Status(status, message) => {
            let message = message
                .map(|m| format!("grpc-message: {}\r\n", m))
                .unwrap_or_default();
            format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/grpc\r\ngrpc-status: {}\r\n{}content-length: 0\r\nconnection: close\r\n\r\n",
                status, message
            )
            .into_bytes()
        }
        Reply::Http(code) => format!(
            "HTTP/1.1 {} Error\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
            code
        )
        .into_bytes(),
    };
    let _ = stream.write_all(&response);
    let _ = stream.flush();
    let _ = stream.shutdown(Shutdown::Write);
}

/// Read headers plus `content-length` bytes of body.
fn read_request(stream: &mut TcpStream) -> Option<Vec<u8>> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = stream.read(&mut chunk).ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(end) = find_header_end(&buf) {
            let body_len = content_length(&buf[..end]);
            if buf.len() >= end + body_len {
                return Some(buf);
            }
        }
    }
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4)
}

fn content_length(head: &[u8]) -> usize {
    let head = String::from_utf8_lossy(head);
    head.lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse().ok())
        .unwrap_or(0)
}
