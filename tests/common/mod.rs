// tests/common/mod.rs
// Shared fakes and a minimal HTTP stub server for integration tests.
#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use avito_relay::avito::MessageApi;
use avito_relay::channel::NotificationChannel;
use avito_relay::credentials::Token;
use avito_relay::error::{RelayError, Result};
use avito_relay::message::{CanonicalMessage, RawMessage, Thread};
use avito_relay::relay::StopSignal;

// --- HTTP stub ---

/// One request as the stub server saw it.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    /// Path including the query string.
    pub target: String,
    pub body: String,
}

impl Recorded {
    pub fn path(&self) -> &str {
        self.target.split('?').next().unwrap_or("")
    }
}

/// Serves every connection on a background thread, answering with whatever
/// `handler` returns for the request.
pub struct StubServer {
    pub url: String,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl StubServer {
    pub fn start<F>(handler: F) -> Self
    where
        F: Fn(&Recorded) -> (u16, String) + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&requests);

        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { continue };
                let Some(request) = read_request(&mut stream) else {
                    continue;
                };
                let (status, body) = handler(&request);
                log.lock().unwrap().push(request);
                let response = format!(
                    "HTTP/1.1 {status} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    if status < 400 { "OK" } else { "Error" },
                    body.len()
                );
                let _ = stream.write_all(response.as_bytes());
                let _ = stream.flush();
            }
        });

        Self {
            url: format!("http://127.0.0.1:{port}"),
            requests,
        }
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self, path: &str) -> usize {
        self.requests().iter().filter(|r| r.path() == path).count()
    }
}

fn read_request(stream: &mut std::net::TcpStream) -> Option<Recorded> {
    let mut reader = BufReader::new(stream.try_clone().ok()?);
    let mut line = String::new();
    reader.read_line(&mut line).ok()?;
    let mut parts = line.split_whitespace();
    let method = parts.next()?.to_string();
    let target = parts.next()?.to_string();

    let mut content_length = 0usize;
    loop {
        let mut header = String::new();
        reader.read_line(&mut header).ok()?;
        let header = header.trim_end();
        if header.is_empty() {
            break;
        }
        if let Some((name, value)) = header.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().unwrap_or(0);
            }
        }
    }

    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).ok()?;
    Some(Recorded {
        method,
        target,
        body: String::from_utf8_lossy(&body).to_string(),
    })
}

// --- Message fixtures ---

pub fn raw(id: &str, author: &str, text: &str) -> RawMessage {
    RawMessage {
        id: id.to_string(),
        author_id: author.to_string(),
        text: text.to_string(),
        created: None,
        thread_id: String::new(),
    }
}

pub fn canonical(id: &str, text: &str) -> CanonicalMessage {
    CanonicalMessage {
        id: id.to_string(),
        sender: "buyer-7".to_string(),
        text: text.to_string(),
        timestamp: None,
        thread_id: "chat-1".to_string(),
        thread_title: "Mountain bike".to_string(),
        thread_url: "https://www.avito.ru/items/1".to_string(),
    }
}

// --- Fake message API ---

#[derive(Debug, Default)]
pub struct ApiCalls {
    pub token: usize,
    pub list_threads: usize,
    pub list_messages: Vec<String>,
    pub marked: Vec<(String, String)>,
}

pub struct FakeApi {
    pub configured: bool,
    pub token_error: bool,
    pub threads_error: bool,
    pub fail_mark_read: bool,
    /// Panic inside the first `list_threads` call.
    pub panic_once: bool,
    threads: Vec<Thread>,
    messages: HashMap<String, Vec<RawMessage>>,
    failing_threads: HashSet<String>,
    calls: Rc<RefCell<ApiCalls>>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self {
            configured: true,
            token_error: false,
            threads_error: false,
            fail_mark_read: false,
            panic_once: false,
            threads: Vec::new(),
            messages: HashMap::new(),
            failing_threads: HashSet::new(),
            calls: Rc::new(RefCell::new(ApiCalls::default())),
        }
    }

    pub fn with_thread(mut self, id: &str, title: &str, messages: Vec<RawMessage>) -> Self {
        self.threads.push(Thread {
            id: id.to_string(),
            title: title.to_string(),
            url: format!("https://www.avito.ru/items/{id}"),
        });
        let messages = messages
            .into_iter()
            .map(|mut m| {
                m.thread_id = id.to_string();
                m
            })
            .collect();
        self.messages.insert(id.to_string(), messages);
        self
    }

    /// Listing this thread's messages fails with a 500.
    pub fn with_failing_thread(mut self, id: &str) -> Self {
        self.threads.push(Thread {
            id: id.to_string(),
            title: "Broken".to_string(),
            url: String::new(),
        });
        self.failing_threads.insert(id.to_string());
        self
    }

    pub fn calls(&self) -> Rc<RefCell<ApiCalls>> {
        Rc::clone(&self.calls)
    }
}

impl MessageApi for FakeApi {
    fn is_configured(&self) -> bool {
        self.configured
    }

    fn acquire_token(&mut self) -> Result<Token> {
        self.calls.borrow_mut().token += 1;
        if self.token_error {
            return Err(RelayError::AuthRejected {
                status: 401,
                body: "invalid_client".to_string(),
            });
        }
        Ok(Token::new("fake-token"))
    }

    fn list_threads(&mut self, _token: &Token) -> Result<Vec<Thread>> {
        let n = {
            let mut calls = self.calls.borrow_mut();
            calls.list_threads += 1;
            calls.list_threads
        };
        if self.panic_once && n == 1 {
            panic!("simulated bug in thread listing");
        }
        if self.threads_error {
            return Err(RelayError::Status {
                endpoint: "/chats".to_string(),
                status: 503,
                body: String::new(),
            });
        }
        Ok(self.threads.clone())
    }

    fn list_messages(&mut self, _token: &Token, thread_id: &str) -> Result<Vec<RawMessage>> {
        self.calls
            .borrow_mut()
            .list_messages
            .push(thread_id.to_string());
        if self.failing_threads.contains(thread_id) {
            return Err(RelayError::Status {
                endpoint: format!("/chats/{thread_id}/messages"),
                status: 500,
                body: "boom".to_string(),
            });
        }
        Ok(self.messages.get(thread_id).cloned().unwrap_or_default())
    }

    fn mark_read(&mut self, _token: &Token, thread_id: &str, message_id: &str) -> Result<()> {
        if self.fail_mark_read {
            return Err(RelayError::Status {
                endpoint: "read".to_string(),
                status: 500,
                body: String::new(),
            });
        }
        self.calls
            .borrow_mut()
            .marked
            .push((thread_id.to_string(), message_id.to_string()));
        Ok(())
    }
}

// --- Fake notification channel ---

pub struct FakeChannel {
    failing: HashSet<String>,
    attempts: Rc<RefCell<Vec<(String, String)>>>,
    stop_after: Option<(usize, StopSignal)>,
    delivered: Rc<RefCell<usize>>,
}

impl FakeChannel {
    pub fn new() -> Self {
        Self {
            failing: HashSet::new(),
            attempts: Rc::new(RefCell::new(Vec::new())),
            stop_after: None,
            delivered: Rc::new(RefCell::new(0)),
        }
    }

    pub fn failing_for(mut self, recipient: &str) -> Self {
        self.failing.insert(recipient.to_string());
        self
    }

    /// Request a stop once `n` sends have succeeded.
    pub fn stop_after(mut self, n: usize, stop: &StopSignal) -> Self {
        self.stop_after = Some((n, stop.clone()));
        self
    }

    /// Every (recipient, text) pair `send` was called with, in order.
    pub fn attempts(&self) -> Rc<RefCell<Vec<(String, String)>>> {
        Rc::clone(&self.attempts)
    }
}

impl NotificationChannel for FakeChannel {
    fn send(&self, recipient: &str, text: &str) -> Result<()> {
        self.attempts
            .borrow_mut()
            .push((recipient.to_string(), text.to_string()));
        if self.failing.contains(recipient) {
            return Err(RelayError::Status {
                endpoint: "sendMessage".to_string(),
                status: 500,
                body: "Internal Server Error".to_string(),
            });
        }
        let mut delivered = self.delivered.borrow_mut();
        *delivered += 1;
        if let Some((n, stop)) = &self.stop_after {
            if *delivered >= *n {
                stop.stop();
            }
        }
        Ok(())
    }
}
