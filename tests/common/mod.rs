//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use integration_resilience::normalize::RawResponse;
use integration_resilience::IntegrationError;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Canned reply of the mock backend.
#[derive(Debug, Clone)]
pub struct MockReply {
    pub status: u16,
    pub headers: Vec<(&'static str, String)>,
    pub body: String,
}

impl MockReply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }
}

/// Start a programmable mock backend on an ephemeral port.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = MockReply> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let f = f.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;

                let reply = f().await;
                let mut response = format!("HTTP/1.1 {} Mock\r\n", reply.status);
                for (name, value) in &reply.headers {
                    response.push_str(&format!("{}: {}\r\n", name, value));
                }
                response.push_str(&format!(
                    "Content-Length: {}\r\nConnection: close\r\n\r\n{}",
                    reply.body.len(),
                    reply.body
                ));
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
                tokio::time::sleep(Duration::from_millis(10)).await;
            });
        }
    });

    addr
}

/// Start a mock backend that always returns the same reply.
pub async fn start_mock_backend(reply: MockReply) -> SocketAddr {
    start_programmable_backend(move || {
        let reply = reply.clone();
        async move { reply }
    })
    .await
}

/// GET `url` and capture the response as a `RawResponse`.
pub async fn fetch_raw(client: &reqwest::Client, url: &str) -> Result<RawResponse, IntegrationError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| IntegrationError::connection("request_failed", e.to_string()))?;
    let status = response.status().as_u16();
    let headers = response.headers().clone();
    let body = response
        .bytes()
        .await
        .map_err(|e| IntegrationError::connection("body_read_failed", e.to_string()))?;
    Ok(RawResponse {
        status,
        headers,
        body: body.to_vec(),
    })
}

/// Operation that replays a fixed script of outcomes, one per call.
#[derive(Clone)]
pub struct ScriptedOperation<T> {
    script: Arc<Mutex<VecDeque<Result<T, IntegrationError>>>>,
    calls: Arc<Mutex<u32>>,
}

impl<T: Clone> ScriptedOperation<T> {
    pub fn new(script: Vec<Result<T, IntegrationError>>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into())),
            calls: Arc::new(Mutex::new(0)),
        }
    }

    /// Next scripted outcome; the last one repeats once the script runs out.
    pub fn call(&self) -> impl Future<Output = Result<T, IntegrationError>> {
        *self.calls.lock().unwrap() += 1;
        let mut script = self.script.lock().unwrap();
        let outcome = if script.len() > 1 {
            script.pop_front().unwrap()
        } else {
            script.front().cloned().expect("empty script")
        };
        async move { outcome }
    }

    pub fn calls(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

pub fn connection_error() -> IntegrationError {
    IntegrationError::connection("connection_reset", "connection reset by peer")
}
