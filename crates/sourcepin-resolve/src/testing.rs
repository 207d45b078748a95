//! In-process HTTP server for resolver tests.
//!
//! Speaks just enough HTTP/1.1 over a raw `TcpListener`: one request per
//! connection, `Connection: close`, canned responses per method and path.
//! A response can declare a `Content-Length` that differs from the body it
//! actually sends, and can stall before its headers or its body. Unrouted
//! requests get a 404.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

/// A request as the server saw it. Header names are lowercase.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct MockResponse {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    declared_length: Option<u64>,
    header_delay: Option<Duration>,
    body_delay: Option<Duration>,
}

impl MockResponse {
    pub fn ok(body: Vec<u8>) -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body,
            declared_length: None,
            header_delay: None,
            body_delay: None,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            ..Self::ok(Vec::new())
        }
    }

    pub fn json(body: &str) -> Self {
        Self::ok(body.as_bytes().to_vec()).header("Content-Type", "application/json")
    }

    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    /// Advertise `len` as the `Content-Length` regardless of the body sent.
    #[must_use]
    pub fn declared_length(mut self, len: u64) -> Self {
        self.declared_length = Some(len);
        self
    }

    /// Accept the request but wait `delay` before answering at all.
    #[must_use]
    pub fn header_delay(mut self, delay: Duration) -> Self {
        self.header_delay = Some(delay);
        self
    }

    /// Send the status line and headers, then wait `delay` before the body.
    #[must_use]
    pub fn body_delay(mut self, delay: Duration) -> Self {
        self.body_delay = Some(delay);
        self
    }
}

type Routes = Arc<Mutex<HashMap<(String, String), MockResponse>>>;

pub struct MockHttpServer {
    addr: String,
    routes: Routes,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    _handle: JoinHandle<()>,
}

impl MockHttpServer {
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = format!("http://{}", listener.local_addr().unwrap());
        let routes: Routes = Arc::new(Mutex::new(HashMap::new()));
        let requests = Arc::new(Mutex::new(Vec::new()));

        let routes_clone = Arc::clone(&routes);
        let requests_clone = Arc::clone(&requests);
        let handle = std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                let routes = Arc::clone(&routes_clone);
                let requests = Arc::clone(&requests_clone);
                std::thread::spawn(move || serve(stream, &routes, &requests));
            }
        });

        Self {
            addr,
            routes,
            requests,
            _handle: handle,
        }
    }

    pub fn route(&self, method: &str, path: &str, response: MockResponse) {
        self.routes
            .lock()
            .unwrap()
            .insert((method.to_owned(), path.to_owned()), response);
    }

    pub fn base_url(&self) -> &str {
        &self.addr
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.addr)
    }

    /// Requests received so far, in arrival order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

fn serve(stream: TcpStream, routes: &Routes, requests: &Mutex<Vec<RecordedRequest>>) {
    let Ok(read_half) = stream.try_clone() else {
        return;
    };
    let mut reader = BufReader::new(read_half);
    let mut request_line = String::new();
    if reader.read_line(&mut request_line).is_err() {
        return;
    }
    let mut parts = request_line.split_whitespace();
    let (Some(method), Some(path)) = (parts.next(), parts.next()) else {
        return;
    };
    let (method, path) = (method.to_owned(), path.to_owned());

    let mut headers = HashMap::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).is_err() || line.trim().is_empty() {
            break;
        }
        if let Some((name, value)) = line.trim_end().split_once(':') {
            headers.insert(name.trim().to_lowercase(), value.trim().to_owned());
        }
    }

    let response = routes
        .lock()
        .unwrap()
        .get(&(method.clone(), path.clone()))
        .cloned()
        .unwrap_or_else(|| MockResponse::status(404));

    requests.lock().unwrap().push(RecordedRequest {
        method: method.clone(),
        path,
        headers,
    });

    let length = response
        .declared_length
        .unwrap_or(response.body.len() as u64);
    let mut head = format!(
        "HTTP/1.1 {} {}\r\nContent-Length: {length}\r\nConnection: close\r\n",
        response.status,
        reason_phrase(response.status)
    );
    for (name, value) in &response.headers {
        head.push_str(&format!("{name}: {value}\r\n"));
    }
    head.push_str("\r\n");

    if let Some(delay) = response.header_delay {
        std::thread::sleep(delay);
    }
    let mut stream = stream;
    let _ = stream.write_all(head.as_bytes());
    let _ = stream.flush();
    if method != "HEAD" {
        if let Some(delay) = response.body_delay {
            std::thread::sleep(delay);
        }
        let _ = stream.write_all(&response.body);
    }
    let _ = stream.flush();
    let _ = stream.shutdown(Shutdown::Both);
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}
