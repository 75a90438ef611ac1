#![allow(dead_code)]

use aog_checker::consent_server::read_http_request;
use std::fs;
use std::io::Write;
use std::net::{Shutdown, SocketAddr, TcpListener};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

/// Serves one response that advertises the full `Content-Length` but closes
/// the connection after `sent` bytes, which `httpmock` cannot express.
pub struct TruncatedServer {
    addr: SocketAddr,
}

impl TruncatedServer {
    pub fn start(body: Vec<u8>, sent: usize) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            let Ok((mut stream, _)) = listener.accept() else {
                return;
            };
            let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
            if !matches!(read_http_request(&mut stream), Ok(Some(_))) {
                return;
            }
            let header = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            let _ = stream.write_all(header.as_bytes());
            let _ = stream.write_all(&body[..sent.min(body.len())]);
            let _ = stream.flush();
            let _ = stream.shutdown(Shutdown::Both);
        });
        Self { addr }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }
}

/// URL on a port nothing listens on.
pub fn unused_local_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

/// Settings file pointing the checker at test-controlled endpoints.
pub fn write_settings(
    path: &Path,
    runtime_url: &str,
    download_url: &str,
    install_folder: &Path,
) -> PathBuf {
    fs::write(
        path,
        format!(
            "version: 1\nruntime:\n  base_url: {runtime_url}\n  probe_timeout_ms: 500\n  executable_name: aog\nconsent:\n  port: 0\n  timeout_sec: 2\n  open_browser: false\ninstall:\n  download_url: {download_url}\n  folder: {}\n  register_search_path: false\nlaunch:\n  ready_timeout_sec: 1\n  poll_interval_ms: 50\n",
            install_folder.display()
        ),
    )
    .unwrap();
    path.to_path_buf()
}
