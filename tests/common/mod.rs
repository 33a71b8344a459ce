//! Purpose: Loopback fixture HTTP server for integration tests.
//! Exports: `FixtureServer`, `Route`.
//! Role: Serves canned JSON/binary responses so client behavior is tested
//! Role: end-to-end over real sockets without an upstream instance.
//! Invariants: Requests with a wrong API key get 401; unmatched routes 404.
//! Invariants: The accept loop shuts down when the server is dropped.
#![allow(dead_code)]

use elabclient::api::{ElabClient, Session, TlsPolicy};
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

pub const API_KEY: &str = "test-api-key";

pub struct Route {
    method: &'static str,
    path: String,
    query: Vec<(String, String)>,
    status: u16,
    content_type: &'static str,
    body: Vec<u8>,
}

impl Route {
    pub fn json(
        method: &'static str,
        path: &str,
        query: &[(&str, &str)],
        body: serde_json::Value,
    ) -> Self {
        Self::with_status(method, path, query, 200, body)
    }

    pub fn with_status(
        method: &'static str,
        path: &str,
        query: &[(&str, &str)],
        status: u16,
        body: serde_json::Value,
    ) -> Self {
        Self {
            method,
            path: path.to_string(),
            query: owned_pairs(query),
            status,
            content_type: "application/json",
            body: body.to_string().into_bytes(),
        }
    }

    pub fn bytes(
        method: &'static str,
        path: &str,
        query: &[(&str, &str)],
        content_type: &'static str,
        body: Vec<u8>,
    ) -> Self {
        Self {
            method,
            path: path.to_string(),
            query: owned_pairs(query),
            status: 200,
            content_type,
            body,
        }
    }
}

fn owned_pairs(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    let mut owned: Vec<(String, String)> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    owned.sort();
    owned
}

pub struct FixtureServer {
    addr: SocketAddr,
    hits: Arc<Mutex<Vec<String>>>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl FixtureServer {
    pub fn start(routes: Vec<Route>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
        let addr = listener.local_addr().expect("local addr");
        let hits = Arc::new(Mutex::new(Vec::new()));
        let stop = Arc::new(AtomicBool::new(false));

        let thread_hits = Arc::clone(&hits);
        let thread_stop = Arc::clone(&stop);
        let handle = std::thread::spawn(move || {
            for stream in listener.incoming() {
                if thread_stop.load(Ordering::SeqCst) {
                    break;
                }
                let Ok(stream) = stream else { continue };
                handle_connection(stream, &routes, &thread_hits);
            }
        });

        Self {
            addr,
            hits,
            stop,
            handle: Some(handle),
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}/api/v2/", self.addr)
    }

    pub fn session(&self) -> Session {
        Session::new(
            self.base_url(),
            API_KEY,
            TlsPolicy::DangerouslyDisableVerification,
        )
        .expect("session")
    }

    pub fn client(&self) -> ElabClient {
        ElabClient::new(self.session()).expect("client")
    }

    pub fn client_with_key(&self, api_key: &str) -> ElabClient {
        let session = Session::new(
            self.base_url(),
            api_key,
            TlsPolicy::DangerouslyDisableVerification,
        )
        .expect("session");
        ElabClient::new(session).expect("client")
    }

    /// Request lines observed so far, as `"METHOD target"` (plus the body
    /// for requests that carried one).
    pub fn hits(&self) -> Vec<String> {
        self.hits.lock().expect("hits lock").clone()
    }

    pub fn hit_count(&self) -> usize {
        self.hits.lock().expect("hits lock").len()
    }
}

impl Drop for FixtureServer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        // Wake the accept loop so the thread can observe the stop flag.
        let _ = TcpStream::connect(self.addr);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn handle_connection(stream: TcpStream, routes: &[Route], hits: &Arc<Mutex<Vec<String>>>) {
    let mut reader = BufReader::new(stream);

    let mut request_line = String::new();
    if reader.read_line(&mut request_line).is_err() {
        return;
    }
    let mut parts = request_line.split_whitespace();
    let (Some(method), Some(target)) = (parts.next(), parts.next()) else {
        return;
    };
    let method = method.to_string();
    let target = target.to_string();

    let mut authorization = None;
    let mut content_length = 0usize;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).is_err() {
            return;
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            let value = value.trim();
            match name.to_ascii_lowercase().as_str() {
                "authorization" => authorization = Some(value.to_string()),
                "content-length" => content_length = value.parse().unwrap_or(0),
                _ => {}
            }
        }
    }

    let mut body = vec![0u8; content_length];
    if content_length > 0 && reader.read_exact(&mut body).is_err() {
        return;
    }
    let body_text = String::from_utf8_lossy(&body).to_string();

    {
        let mut hits = hits.lock().expect("hits lock");
        if body_text.is_empty() {
            hits.push(format!("{method} {target}"));
        } else {
            hits.push(format!("{method} {target} {body_text}"));
        }
    }

    let mut stream = reader.into_inner();
    if authorization.as_deref() != Some(API_KEY) {
        respond(
            &mut stream,
            401,
            "application/json",
            br#"{"code":401,"message":"Unauthorized"}"#,
        );
        return;
    }

    let (path, raw_query) = match target.split_once('?') {
        Some((path, raw_query)) => (path, raw_query),
        None => (target.as_str(), ""),
    };
    let mut query: Vec<(String, String)> = url::form_urlencoded::parse(raw_query.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    query.sort();

    let matched = routes
        .iter()
        .find(|route| route.method == method && route.path == path && route.query == query);
    match matched {
        Some(route) => respond(&mut stream, route.status, route.content_type, &route.body),
        None => respond(
            &mut stream,
            404,
            "application/json",
            br#"{"code":404,"message":"Resource not found"}"#,
        ),
    }
}

fn respond(stream: &mut TcpStream, status: u16, content_type: &str, body: &[u8]) {
    let reason = match status {
        200 => "OK",
        401 => "Unauthorized",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "Error",
    };
    let head = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    let _ = stream.write_all(head.as_bytes());
    let _ = stream.write_all(body);
    let _ = stream.flush();
}
