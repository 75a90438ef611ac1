use crate::consent::{ConsentCell, ConsentDecision};
use crate::error::BootstrapError;
use std::collections::BTreeMap;
use std::io::{self, Read, Write};
use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub const INSTALL_PROMPT_PATH: &str = "/install-prompt";
pub const USER_RESPONSE_PATH: &str = "/user-response";

const MAX_HEADER_BYTES: usize = 64 * 1024;

const INSTALL_PROMPT_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Install AOG</title></head>
<body style="padding:20px;font-family:Arial">
    <h2>Installation required</h2>
    <p>This application needs the AOG service to continue. Install it now?</p>
    <button onclick="respond(true)">Accept</button>
    <button onclick="respond(false)">Cancel</button>
    <p id="status"></p>
    <script>
        function respond(choice) {
            fetch('/user-response?choice=' + choice)
                .then(() => {
                    document.getElementById('status').textContent =
                        choice ? 'Installing AOG, you can close this page.' : 'Installation cancelled.';
                    window.close();
                });
        }
    </script>
</body>
</html>
"#;

#[derive(Debug)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub query: BTreeMap<String, String>,
}

pub fn parse_query_map(query: &str) -> BTreeMap<String, String> {
    let mut result = BTreeMap::new();
    for pair in query.split('&') {
        if pair.trim().is_empty() {
            continue;
        }
        if let Some((key, value)) = pair.split_once('=') {
            result.insert(key.to_string(), value.to_string());
        } else {
            result.insert(pair.to_string(), String::new());
        }
    }
    result
}

/// Reads up to the end of the headers and parses the request line. Header
/// values and request bodies are not consumed; every route served here is
/// a GET.
pub fn read_http_request<S: Read>(stream: &mut S) -> Result<Option<HttpRequest>, BootstrapError> {
    let mut buf = Vec::new();
    let mut header_end: Option<usize> = None;
    let mut chunk = [0u8; 1024];
    while header_end.is_none() {
        let read = stream.read(&mut chunk)?;
        if read == 0 {
            if buf.is_empty() {
                return Ok(None);
            }
            break;
        }
        buf.extend_from_slice(&chunk[..read]);
        if let Some(pos) = buf.windows(4).position(|window| window == b"\r\n\r\n") {
            header_end = Some(pos);
        }
        if buf.len() > MAX_HEADER_BYTES {
            return Err(BootstrapError::ConsentServer(
                "request headers too large".to_string(),
            ));
        }
    }
    let header_end = header_end.ok_or_else(|| {
        BootstrapError::ConsentServer("request missing header delimiter".to_string())
    })?;
    let header_text = String::from_utf8_lossy(&buf[..header_end]);
    let request_line = header_text
        .lines()
        .next()
        .ok_or_else(|| BootstrapError::ConsentServer("request missing request line".to_string()))?;
    let mut request_parts = request_line.split_whitespace();
    let method = request_parts
        .next()
        .ok_or_else(|| BootstrapError::ConsentServer("request missing method".to_string()))?
        .to_string();
    let target = request_parts
        .next()
        .ok_or_else(|| BootstrapError::ConsentServer("request missing target".to_string()))?;
    let (path, query) = if let Some((path, query)) = target.split_once('?') {
        (path.to_string(), parse_query_map(query))
    } else {
        (target.to_string(), BTreeMap::new())
    };
    Ok(Some(HttpRequest {
        method,
        path,
        query,
    }))
}

pub fn write_response<S: Write>(
    stream: &mut S,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<(), BootstrapError> {
    let status_text = match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "OK",
    };
    let header = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
        status,
        status_text,
        content_type,
        body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    stream.flush()?;
    Ok(())
}

/// Loopback HTTP server that serves the install prompt and records the
/// user's answer in a [`ConsentCell`].
#[derive(Debug)]
pub struct ConsentServer {
    addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ConsentServer {
    /// Binds `127.0.0.1:<port>` before returning, so the prompt URL is
    /// reachable as soon as this succeeds. Port 0 picks a free port.
    pub fn start(port: u16, cell: ConsentCell) -> Result<Self, BootstrapError> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, port)).map_err(|err| {
            BootstrapError::ConsentServer(format!(
                "failed to bind consent server on 127.0.0.1:{port}: {err}"
            ))
        })?;
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;
        let shutdown = Arc::new(AtomicBool::new(false));
        let loop_shutdown = Arc::clone(&shutdown);
        let handle = thread::Builder::new()
            .name("aog-consent-server".to_string())
            .spawn(move || accept_loop(listener, cell, loop_shutdown))?;
        tracing::info!(%addr, "consent server listening");
        Ok(Self {
            addr,
            shutdown,
            handle: Some(handle),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn prompt_url(&self) -> String {
        format!("http://{}{}", self.addr, INSTALL_PROMPT_PATH)
    }

    /// Stops accepting connections and joins the accept thread.
    pub fn shutdown(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
            tracing::debug!(addr = %self.addr, "consent server stopped");
        }
    }
}

impl Drop for ConsentServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn accept_loop(listener: TcpListener, cell: ConsentCell, shutdown: Arc<AtomicBool>) {
    while !shutdown.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                let cell = cell.clone();
                thread::spawn(move || {
                    if let Err(err) = handle_connection(stream, &cell) {
                        tracing::debug!(%peer, error = %err, "consent request failed");
                    }
                });
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(50));
            }
            Err(err) => {
                tracing::warn!(error = %err, "consent server accept failed");
                thread::sleep(Duration::from_millis(250));
            }
        }
    }
}

fn handle_connection(mut stream: TcpStream, cell: &ConsentCell) -> Result<(), BootstrapError> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(Duration::from_secs(10)))?;
    let Some(request) = read_http_request(&mut stream)? else {
        return Ok(());
    };
    if request.method != "GET" {
        return write_response(&mut stream, 405, "text/plain; charset=utf-8", b"");
    }
    match request.path.as_str() {
        INSTALL_PROMPT_PATH => write_response(
            &mut stream,
            200,
            "text/html; charset=utf-8",
            INSTALL_PROMPT_HTML.as_bytes(),
        ),
        USER_RESPONSE_PATH => {
            let decision =
                ConsentDecision::from_choice(request.query.get("choice").map(String::as_str));
            // Reply before waking the waiter; the process may exit right after.
            let written = write_response(&mut stream, 200, "text/plain; charset=utf-8", b"");
            if cell.record(decision) {
                tracing::info!(?decision, "installation decision recorded");
            } else {
                tracing::debug!(
                    ?decision,
                    kept = ?cell.current(),
                    "installation decision already recorded; ignoring"
                );
            }
            written
        }
        _ => write_response(&mut stream, 404, "text/plain; charset=utf-8", b""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn get(addr: SocketAddr, target: &str) -> (u16, String) {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream
            .write_all(format!("GET {target} HTTP/1.1\r\nHost: localhost\r\n\r\n").as_bytes())
            .unwrap();
        let mut raw = String::new();
        stream.read_to_string(&mut raw).unwrap();
        let status = raw
            .split_whitespace()
            .nth(1)
            .and_then(|s| s.parse::<u16>().ok())
            .unwrap();
        let body = raw
            .split_once("\r\n\r\n")
            .map(|(_, body)| body.to_string())
            .unwrap_or_default();
        (status, body)
    }

    #[test]
    fn parses_request_line_and_query() {
        let raw = b"GET /user-response?choice=true&x HTTP/1.1\r\nHost: localhost:5000\r\nAccept: */*\r\n\r\n";
        let request = read_http_request(&mut Cursor::new(raw.to_vec()))
            .unwrap()
            .unwrap();
        assert_eq!(request.method, "GET");
        assert_eq!(request.path, "/user-response");
        assert_eq!(request.query.get("choice").map(String::as_str), Some("true"));
        assert_eq!(request.query.get("x").map(String::as_str), Some(""));
    }

    #[test]
    fn empty_stream_yields_no_request() {
        let request = read_http_request(&mut Cursor::new(Vec::new())).unwrap();
        assert!(request.is_none());
    }

    #[test]
    fn serves_prompt_page() {
        let cell = ConsentCell::new();
        let server = ConsentServer::start(0, cell.clone()).unwrap();
        let (status, body) = get(server.local_addr(), INSTALL_PROMPT_PATH);
        assert_eq!(status, 200);
        assert!(body.contains("respond(true)"));
        assert!(body.contains("/user-response?choice="));
        assert_eq!(cell.current(), ConsentDecision::Unknown);
        assert!(server.prompt_url().ends_with("/install-prompt"));
    }

    #[test]
    fn records_first_response_only() {
        let cell = ConsentCell::new();
        let server = ConsentServer::start(0, cell.clone()).unwrap();
        let (status, body) = get(server.local_addr(), "/user-response?choice=true");
        assert_eq!(status, 200);
        assert!(body.is_empty());
        assert_eq!(cell.wait(Duration::from_secs(5)), ConsentDecision::Granted);

        let (status, _) = get(server.local_addr(), "/user-response?choice=false");
        assert_eq!(status, 200);
        assert_eq!(cell.current(), ConsentDecision::Granted);
    }

    #[test]
    fn reply_is_sent_before_decision_is_visible() {
        for choice in ["true", "false"] {
            let cell = ConsentCell::new();
            let server = ConsentServer::start(0, cell.clone()).unwrap();
            let mut stream = TcpStream::connect(server.local_addr()).unwrap();
            stream
                .write_all(
                    format!("GET /user-response?choice={choice} HTTP/1.1\r\nHost: localhost\r\n\r\n")
                        .as_bytes(),
                )
                .unwrap();

            assert!(cell.wait(Duration::from_secs(5)).is_decided());

            // The reply must already be queued on the socket by now.
            stream.set_nonblocking(true).unwrap();
            let mut buf = [0u8; 64];
            let read = stream.read(&mut buf).expect("reply queued before decision");
            assert!(String::from_utf8_lossy(&buf[..read]).starts_with("HTTP/1.1 200"));
        }
    }

    #[test]
    fn missing_choice_denies() {
        let cell = ConsentCell::new();
        let server = ConsentServer::start(0, cell.clone()).unwrap();
        let (status, _) = get(server.local_addr(), "/user-response");
        assert_eq!(status, 200);
        assert_eq!(cell.wait(Duration::from_secs(5)), ConsentDecision::Denied);
    }

    #[test]
    fn unknown_route_is_not_found() {
        let cell = ConsentCell::new();
        let server = ConsentServer::start(0, cell.clone()).unwrap();
        let (status, _) = get(server.local_addr(), "/favicon.ico");
        assert_eq!(status, 404);
        assert_eq!(cell.current(), ConsentDecision::Unknown);
    }

    #[test]
    fn shutdown_releases_the_port() {
        let cell = ConsentCell::new();
        let mut server = ConsentServer::start(0, cell).unwrap();
        let addr = server.local_addr();
        server.shutdown();
        let rebound = TcpListener::bind(addr);
        assert!(rebound.is_ok());
    }

    #[test]
    fn bind_conflict_is_reported() {
        let occupied = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = occupied.local_addr().unwrap().port();
        let err = ConsentServer::start(port, ConsentCell::new()).expect_err("port in use");
        assert!(matches!(err, BootstrapError::ConsentServer(_)));
    }
}
