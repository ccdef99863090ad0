//! Minimal HTTP/1.1 server speaking the resumable upload protocol for integration tests.
//!
//! One request per connection (`Connection: close`). Handles session open,
//! chunk PUTs with `Content-Range`, session DELETE, the token endpoint and
//! the two quota endpoints. Failures can be queued for upcoming PUTs.

use std::collections::VecDeque;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

const UPLOAD_PATH: &str = "/api/v1/videos/upload-resumable";
const SESSION_PATH: &str = "/api/v1/videos/upload-resumable?upload_id=it-1";

#[derive(Debug, Default)]
pub struct ServerState {
    pub total: u64,
    pub received: Vec<u8>,
    pub metadata: String,
    /// Status codes returned (without storing bytes) by the next PUTs.
    pub fail_puts: VecDeque<u16>,
    pub put_auth: Vec<Option<String>>,
    pub deleted: bool,
    pub token_refreshes: usize,
}

#[derive(Clone)]
pub struct UploadServer {
    pub base_url: String,
    pub state: Arc<Mutex<ServerState>>,
}

impl UploadServer {
    pub fn fail_next_puts(&self, status: u16, times: usize) {
        let mut st = self.state.lock().unwrap();
        for _ in 0..times {
            st.fail_puts.push_back(status);
        }
    }
}

/// Start the server on an ephemeral port. Runs until the process exits.
pub fn start() -> UploadServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let state = Arc::new(Mutex::new(ServerState::default()));
    let shared = Arc::clone(&state);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let state = Arc::clone(&shared);
            thread::spawn(move || handle(stream, &state));
        }
    });
    UploadServer {
        base_url: format!("http://127.0.0.1:{}", port),
        state,
    }
}

struct Request {
    method: String,
    target: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Request {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

fn read_request(stream: &mut TcpStream) -> Option<Request> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    let head_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        let n = stream.read(&mut chunk).ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    };
    let head = std::str::from_utf8(&buf[..head_end]).ok()?.to_string();
    let mut lines = head.lines();
    let mut start = lines.next()?.split_whitespace();
    let method = start.next()?.to_string();
    let target = start.next()?.to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|l| l.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();
    let length: usize = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("Content-Length"))
        .and_then(|(_, v)| v.parse().ok())
        .unwrap_or(0);
    let mut body = buf[head_end + 4..].to_vec();
    while body.len() < length {
        let n = stream.read(&mut chunk).ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }
    Some(Request {
        method,
        target,
        headers,
        body,
    })
}

fn respond(stream: &mut TcpStream, status: &str, headers: &[(&str, String)], body: &[u8]) {
    let mut out = format!("HTTP/1.1 {}\r\nConnection: close\r\nContent-Length: {}\r\n", status, body.len());
    for (k, v) in headers {
        out.push_str(&format!("{}: {}\r\n", k, v));
    }
    out.push_str("\r\n");
    let _ = stream.write_all(out.as_bytes());
    let _ = stream.write_all(body);
}

/// `bytes s-e/total` -> s; `bytes */total` -> 0.
fn range_start(value: &str) -> u64 {
    value
        .trim_start_matches("bytes ")
        .split(|c: char| c == '-' || c == '/')
        .next()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}

fn handle(mut stream: TcpStream, state: &Mutex<ServerState>) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(5)));
    let Some(req) = read_request(&mut stream) else {
        return;
    };
    let mut st = state.lock().unwrap();
    match (req.method.as_str(), req.target.as_str()) {
        ("POST", UPLOAD_PATH) => {
            st.total = req
                .header("X-Upload-Content-Length")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0);
            st.received.clear();
            st.metadata = String::from_utf8_lossy(&req.body).into_owned();
            respond(&mut stream, "201 Created", &[("Location", SESSION_PATH.to_string())], b"");
        }
        ("PUT", SESSION_PATH) => {
            st.put_auth.push(req.header("Authorization").map(str::to_string));
            if let Some(code) = st.fail_puts.pop_front() {
                respond(&mut stream, &format!("{} Scripted", code), &[], b"");
                return;
            }
            let start = range_start(req.header("Content-Range").unwrap_or(""));
            if start == st.received.len() as u64 {
                st.received.extend_from_slice(&req.body);
            }
            if st.received.len() as u64 >= st.total {
                let body = br#"{"video":{"id":42,"uuid":"9c9de5e8-0a1b-4b1f-8a33-6d2f2d5b1c7e","shortUUID":"kBXd4rzR"}}"#;
                respond(&mut stream, "200 OK", &[("Content-Type", "application/json".into())], body);
            } else {
                let range = format!("bytes=0-{}", st.received.len().saturating_sub(1));
                respond(&mut stream, "308 Resume Incomplete", &[("Range", range)], b"");
            }
        }
        ("DELETE", SESSION_PATH) => {
            st.deleted = true;
            respond(&mut stream, "204 No Content", &[], b"");
        }
        ("POST", "/api/v1/users/token") => {
            st.token_refreshes += 1;
            let body = br#"{"access_token":"new-access","refresh_token":"new-refresh","token_type":"Bearer"}"#;
            respond(&mut stream, "200 OK", &[], body);
        }
        ("GET", "/api/v1/users/me/video-quota-used") => {
            let body = br#"{"videoQuotaUsed":1000,"videoQuotaUsedDaily":10}"#;
            respond(&mut stream, "200 OK", &[], body);
        }
        ("GET", "/api/v1/users/me") => {
            let body = br#"{"id":1,"videoQuota":50000,"videoQuotaDaily":-1}"#;
            respond(&mut stream, "200 OK", &[], body);
        }
        _ => respond(&mut stream, "404 Not Found", &[], b""),
    }
}
