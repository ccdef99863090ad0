//! libcurl-backed transport.
//!
//! Each exchange runs a fresh `curl::easy::Easy` inside `spawn_blocking`, so
//! the controller's task is suspended (never blocked) while bytes move.
//! Redirects are NOT followed: `308 Resume Incomplete` and `Location` are part
//! of the upload protocol and must reach the transmitter untouched.

use async_trait::async_trait;
use std::str;
use std::time::Duration;

use super::{HttpRequest, HttpResponse, HttpTransport, Method, TransportError};

/// Timeouts applied to every exchange.
#[derive(Debug, Clone, Copy)]
pub struct CurlOptions {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    /// Abort if throughput stays below 1 KiB/s for this long.
    pub low_speed_time: Duration,
}

impl Default for CurlOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(600),
            low_speed_time: Duration::from_secs(60),
        }
    }
}

impl From<&crate::config::VidupConfig> for CurlOptions {
    fn from(cfg: &crate::config::VidupConfig) -> Self {
        Self {
            connect_timeout: Duration::from_secs(cfg.connect_timeout_secs),
            request_timeout: Duration::from_secs(cfg.request_timeout_secs),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CurlTransport {
    opts: CurlOptions,
}

impl CurlTransport {
    pub fn new(opts: CurlOptions) -> Self {
        Self { opts }
    }
}

#[async_trait]
impl HttpTransport for CurlTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let opts = self.opts;
        tokio::task::spawn_blocking(move || perform(&request, &opts))
            .await
            .map_err(|e| TransportError::Other(format!("transfer task join: {}", e)))?
    }
}

/// Map a curl error onto the transport taxonomy used by the retry policy.
pub fn classify_curl_error(e: &curl::Error) -> TransportError {
    if e.is_operation_timedout() {
        return TransportError::Timeout(e.to_string());
    }
    if e.is_couldnt_connect()
        || e.is_couldnt_resolve_host()
        || e.is_couldnt_resolve_proxy()
        || e.is_read_error()
        || e.is_recv_error()
        || e.is_send_error()
        || e.is_got_nothing()
    {
        return TransportError::Connection(e.to_string());
    }
    TransportError::Other(e.to_string())
}

fn perform(request: &HttpRequest, opts: &CurlOptions) -> Result<HttpResponse, TransportError> {
    perform_inner(request, opts).map_err(|e| classify_curl_error(&e))
}

fn perform_inner(request: &HttpRequest, opts: &CurlOptions) -> Result<HttpResponse, curl::Error> {
    let mut easy = curl::easy::Easy::new();
    easy.url(&request.url)?;
    easy.follow_location(false)?;
    easy.connect_timeout(opts.connect_timeout)?;
    easy.low_speed_limit(1024)?;
    easy.low_speed_time(opts.low_speed_time)?;
    easy.timeout(opts.request_timeout)?;

    match request.method {
        Method::Get => easy.get(true)?,
        Method::Post => {
            easy.post(true)?;
            easy.post_fields_copy(&request.body)?;
        }
        Method::Put => {
            easy.custom_request("PUT")?;
            easy.post_fields_copy(&request.body)?;
        }
        Method::Delete => easy.custom_request("DELETE")?,
    }

    let mut list = curl::easy::List::new();
    for (k, v) in &request.headers {
        list.append(&format!("{}: {}", k.trim(), v.trim()))?;
    }
    // Chunks can be large; skip the 100-continue round trip.
    list.append("Expect:")?;
    easy.http_headers(list)?;

    let mut header_lines: Vec<String> = Vec::new();
    let mut body: Vec<u8> = Vec::new();
    {
        let mut transfer = easy.transfer();
        transfer.header_function(|data| {
            if let Ok(s) = str::from_utf8(data) {
                let line = s.trim_end();
                // A new status line starts a new header block (e.g. after 100 Continue).
                if line.starts_with("HTTP/") {
                    header_lines.clear();
                } else if !line.is_empty() {
                    header_lines.push(line.to_string());
                }
            }
            true
        })?;
        transfer.write_function(|data| {
            body.extend_from_slice(data);
            Ok(data.len())
        })?;
        transfer.perform()?;
    }

    let status = easy.response_code()? as u16;
    Ok(HttpResponse {
        status,
        headers: parse_header_lines(&header_lines),
        body,
    })
}

/// Split raw `Name: value` lines into pairs; malformed lines are dropped.
pub(crate) fn parse_header_lines(lines: &[String]) -> Vec<(String, String)> {
    lines
        .iter()
        .filter_map(|line| {
            let (name, value) = line.split_once(':')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some((name.to_string(), value.trim().to_string()))
        })
        .collect()
}
