use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

use crate::http::parser::{ParseError, parse_http_request_with_limit};
use crate::http::request::{Method, Request};
use crate::http::response::{Response, StatusCode};
use crate::http::writer::ResponseWriter;
use crate::server::router::Router;

pub struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    router: Arc<Router>,
    max_body: usize,
    buffer: Vec<u8>,
    state: ConnectionState,
}

pub enum ConnectionState {
    Reading,
    Processing(Request),
    Writing(ResponseWriter, bool), // bool = keep_alive?
    Closed,
}

impl Connection {
    pub fn new(stream: TcpStream, peer: SocketAddr, router: Arc<Router>, max_body: usize) -> Self {
        Self {
            stream,
            peer,
            router,
            max_body,
            buffer: Vec::with_capacity(4096),
            state: ConnectionState::Reading,
        }
    }

    pub async fn run(&mut self) -> anyhow::Result<()> {
        loop {
            match &mut self.state {
                ConnectionState::Reading => match self.read_request().await {
                    Ok(Some(req)) => {
                        self.state = ConnectionState::Processing(req);
                    }
                    Ok(None) => {
                        self.state = ConnectionState::Closed;
                    }
                    Err(ReadError::Malformed(e)) => {
                        tracing::debug!(peer = %self.peer, error = ?e, "Malformed request");
                        let mut response = Response::json(
                            status_for(&e),
                            &serde_json::json!({ "error": "Malformed request" }),
                        );
                        response.headers.insert("Connection", "close");
                        self.state = ConnectionState::Writing(ResponseWriter::new(&response), false);
                    }
                    Err(ReadError::Io(e)) => return Err(e.into()),
                },

                ConnectionState::Processing(req) => {
                    let keep_alive = req.keep_alive();
                    let head = req.method == Method::HEAD;

                    let mut response = tokio::select! {
                        response = self.router.handle(req, self.peer) => response,
                        _ = client_gone(&self.stream, !self.buffer.is_empty()) => {
                            tracing::info!(
                                peer = %self.peer,
                                method = %req.method,
                                "Client disconnected, abandoning request"
                            );
                            self.state = ConnectionState::Closed;
                            continue;
                        }
                    };

                    response
                        .headers
                        .insert("Connection", if keep_alive { "keep-alive" } else { "close" });
                    // Headers describe the body a GET would get; none is sent.
                    if head {
                        response.body = Bytes::new();
                    }

                    let writer = ResponseWriter::new(&response);
                    self.state = ConnectionState::Writing(writer, keep_alive);
                }

                ConnectionState::Writing(writer, keep_alive) => {
                    writer.write_to_stream(&mut self.stream).await?;

                    if *keep_alive {
                        self.state = ConnectionState::Reading; // go back for next request
                    } else {
                        self.state = ConnectionState::Closed;
                    }
                }

                ConnectionState::Closed => {
                    break;
                }
            }
        }

        Ok(())
    }

    async fn read_request(&mut self) -> Result<Option<Request>, ReadError> {
        loop {
            // Try parsing whatever we already have
            match parse_http_request_with_limit(&self.buffer, self.max_body) {
                Ok((request, consumed)) => {
                    self.buffer.drain(..consumed);
                    return Ok(Some(request));
                }

                Err(ParseError::Incomplete) => {
                    // Need more data → fall through to read
                }

                Err(e) => return Err(ReadError::Malformed(e)),
            }

            let mut temp = [0u8; 8192];
            let n = self.stream.read(&mut temp).await.map_err(ReadError::Io)?;

            if n == 0 {
                // Client closed connection
                return Ok(None);
            }

            self.buffer.extend_from_slice(&temp[..n]);
        }
    }
}

enum ReadError {
    Malformed(ParseError),
    Io(std::io::Error),
}

fn status_for(err: &ParseError) -> StatusCode {
    match err {
        ParseError::BodyTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        _ => StatusCode::BAD_REQUEST,
    }
}

/// Resolves once the client connection is broken (reset or error).
///
/// EOF is a half-close: the client is done sending but still waits for the
/// answer, so it never resolves on EOF. Pipelined bytes (already buffered
/// or waiting on the socket) likewise mean the client is still there.
async fn client_gone(stream: &TcpStream, pipelined: bool) {
    if pipelined {
        return std::future::pending().await;
    }

    let mut peeked = [0u8; 1];
    if stream.peek(&mut peeked).await.is_ok() {
        std::future::pending::<()>().await;
    }
}
