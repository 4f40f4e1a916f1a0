//! Shared test doubles.
#![allow(dead_code)]

use async_trait::async_trait;
use bitsave_proxy::http::headers::HeaderMap;
use bitsave_proxy::proxy::{ForwardRequest, ForwardResult, Transport, TransportError};
use bytes::Bytes;
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

/// What the fake upstream does on one call.
#[derive(Debug, Clone)]
pub enum Scripted {
    Respond {
        status: u16,
        headers: Vec<(&'static str, &'static str)>,
        body: &'static str,
    },
    Fail(&'static str),
    /// Never answers; only the forwarder's deadline ends the call.
    Hang,
}

impl Scripted {
    pub fn status(status: u16) -> Self {
        Scripted::Respond {
            status,
            headers: vec![],
            body: "",
        }
    }
}

/// Transport that replays a script and records every call.
///
/// Once the script is exhausted it keeps answering 200.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Scripted>>,
    calls: Mutex<Vec<(Instant, ForwardRequest)>>,
}

impl ScriptedTransport {
    pub fn new(script: impl IntoIterator<Item = Scripted>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<(Instant, ForwardRequest)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &ForwardRequest) -> Result<ForwardResult, TransportError> {
        self.calls
            .lock()
            .unwrap()
            .push((Instant::now(), request.clone()));

        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Scripted::status(200));

        match step {
            Scripted::Respond {
                status,
                headers,
                body,
            } => Ok(ForwardResult {
                status,
                status_text: String::new(),
                headers: headers
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect::<HeaderMap>(),
                body: Bytes::from_static(body.as_bytes()),
            }),
            Scripted::Fail(message) => Err(TransportError::Network(message.to_string())),
            Scripted::Hang => std::future::pending().await,
        }
    }
}

/// Formatted log output collected by [`capture_logs`].
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Routes events on the current thread into a buffer until the guard drops.
pub fn capture_logs() -> (tracing::subscriber::DefaultGuard, LogBuffer) {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();

    (tracing::subscriber::set_default(subscriber), buffer)
}
