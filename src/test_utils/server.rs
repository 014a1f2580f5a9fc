//! Minimal HTTP/1.1 server for download and release feed tests.
//!
//! Each connection serves one `GET` and closes. A route can send its full
//! body, close the connection part-way (`cut_after`), or send part of the
//! body and then hold the connection open (`stall_after`).

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Response served for one path.
#[derive(Debug, Clone)]
pub struct TestRoute {
    status: u16,
    content_type: &'static str,
    body: Vec<u8>,
    cut_after: Option<usize>,
    stall_after: Option<usize>,
}

impl TestRoute {
    /// `200 OK` with a binary body.
    pub fn ok(body: Vec<u8>) -> Self {
        Self {
            status: 200,
            content_type: "application/octet-stream",
            body,
            cut_after: None,
            stall_after: None,
        }
    }

    /// `200 OK` with a JSON body.
    pub fn json(value: &serde_json::Value) -> Self {
        Self {
            content_type: "application/json",
            ..Self::ok(value.to_string().into_bytes())
        }
    }

    /// An empty response with `status`.
    pub fn status(status: u16) -> Self {
        Self {
            status,
            ..Self::ok(Vec::new())
        }
    }

    /// Close the connection after `bytes` of the body.
    ///
    /// `content-length` still announces the full body.
    pub fn cut_after(mut self, bytes: usize) -> Self {
        self.cut_after = Some(bytes);
        self
    }

    /// Send `bytes` of the body, then keep the connection open forever.
    pub fn stall_after(mut self, bytes: usize) -> Self {
        self.stall_after = Some(bytes);
        self
    }
}

/// Local HTTP server bound to an ephemeral port.
///
/// The accept loop is aborted when the server is dropped.
pub struct TestServer {
    addr: SocketAddr,
    routes: Arc<Mutex<HashMap<String, TestRoute>>>,
    requests: Arc<AtomicUsize>,
    stalled: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl TestServer {
    /// Bind to `127.0.0.1:0` and start serving.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("Failed to bind test server");
        let addr = listener.local_addr().expect("Failed to read test server address");

        let routes: Arc<Mutex<HashMap<String, TestRoute>>> = Arc::default();
        let requests = Arc::new(AtomicUsize::new(0));
        let stalled = Arc::new(Notify::new());

        let handle = {
            let routes = Arc::clone(&routes);
            let requests = Arc::clone(&requests);
            let stalled = Arc::clone(&stalled);
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    requests.fetch_add(1, Ordering::SeqCst);
                    tokio::spawn(serve(stream, Arc::clone(&routes), Arc::clone(&stalled)));
                }
            })
        };

        Self {
            addr,
            routes,
            requests,
            stalled,
            handle,
        }
    }

    /// Serve `route` for requests to `path`.
    pub fn add_route(&self, path: &str, route: TestRoute) {
        self.routes.lock().expect("route table poisoned").insert(path.to_string(), route);
    }

    /// Absolute URL for `path`.
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Number of connections accepted.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Notified each time a `stall_after` route stops sending.
    pub fn stalled(&self) -> Arc<Notify> {
        Arc::clone(&self.stalled)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve(
    mut stream: TcpStream,
    routes: Arc<Mutex<HashMap<String, TestRoute>>>,
    stalled: Arc<Notify>,
) {
    let mut buf = vec![0u8; 8192];
    let mut read = 0;
    loop {
        match stream.read(&mut buf[read..]).await {
            Ok(0) | Err(_) => return,
            Ok(n) => read += n,
        }
        if buf[..read].windows(4).any(|w| w == b"\r\n\r\n") || read == buf.len() {
            break;
        }
    }

    let request = String::from_utf8_lossy(&buf[..read]);
    let path = request.split_whitespace().nth(1).unwrap_or("/").to_string();
    let route = routes
        .lock()
        .ok()
        .and_then(|routes| routes.get(&path).cloned())
        .unwrap_or_else(|| TestRoute::status(404));

    let head = format!(
        "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nContent-Type: {}\r\nConnection: close\r\n\r\n",
        route.status,
        reason_phrase(route.status),
        route.body.len(),
        route.content_type
    );
    if stream.write_all(head.as_bytes()).await.is_err() {
        return;
    }

    let sent = route.cut_after.or(route.stall_after).unwrap_or(route.body.len()).min(route.body.len());
    if stream.write_all(&route.body[..sent]).await.is_err() {
        return;
    }
    let _ = stream.flush().await;

    if route.stall_after.is_some() {
        stalled.notify_one();
        std::future::pending::<()>().await;
    }

    let _ = stream.shutdown().await;
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        403 => "Forbidden",
        404 => "Not Found",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Status",
    }
}
