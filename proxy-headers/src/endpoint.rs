// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::config::Timeouts;
use crate::error::{Error, Phase};
use crate::headers::HeaderSet;
use crate::message::{authority, build_connect_request};
use crate::parser::{ConnectResponse, ConnectResponseParser, ParseStatus};
use crate::stream::TunnelStream;
use crate::Result;
use log::{debug, info, warn};
use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout_at, Instant};

const PROXY_AUTHORIZATION: &str = "Proxy-Authorization";
const READ_CHUNK_SIZE: usize = 4096;

/// One tunnel to open: the target and the headers for the proxy.
#[derive(Debug, Clone)]
pub struct TunnelRequest {
    pub host: String,
    pub port: u16,
    /// Headers for the proxy, written on the CONNECT request only.
    pub headers: HeaderSet,
    /// Pre-formed `Proxy-Authorization` value.
    pub credential: Option<String>,
}

impl TunnelRequest {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        TunnelRequest { host: host.into(), port, headers: HeaderSet::new(), credential: None }
    }

    pub fn with_headers(mut self, headers: HeaderSet) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_credential(mut self, credential: Option<String>) -> Self {
        self.credential = credential;
        self
    }

    /// Headers to send on the CONNECT request.
    pub fn connect_headers(&self) -> HeaderSet {
        apply_credential(&self.headers, self.credential.as_deref())
    }
}

/// Adds `credential` as `Proxy-Authorization`, replacing any caller
/// header with the same name in place.
pub(crate) fn apply_credential(headers: &HeaderSet, credential: Option<&str>) -> HeaderSet {
    let mut headers = headers.clone();
    if let Some(credential) = credential {
        if headers.contains(PROXY_AUTHORIZATION) {
            debug!("Caller {} header replaced by configured credential", PROXY_AUTHORIZATION);
        }
        headers.insert(PROXY_AUTHORIZATION, credential.to_string());
    }
    headers
}

/// An established tunnel and the proxy's reply that opened it.
#[derive(Debug)]
pub struct Tunnel<S> {
    pub stream: TunnelStream<S>,
    pub response: ConnectResponse,
}

/// Opens CONNECT tunnels through one proxy.
///
/// The socket is owned by the handshake future, so every failure path
/// (rejection, timeout, malformed reply) drops and closes it.
#[derive(Debug, Clone)]
pub struct TunnelEndpoint {
    host: String,
    port: u16,
    timeouts: Timeouts,
}

impl TunnelEndpoint {
    pub fn new(host: impl Into<String>, port: u16, timeouts: Timeouts) -> Self {
        TunnelEndpoint { host: host.into(), port, timeouts }
    }

    pub fn timeouts(&self) -> &Timeouts {
        &self.timeouts
    }

    /// Dials the proxy and performs the handshake.
    pub async fn connect(&self, request: &TunnelRequest) -> Result<Tunnel<TcpStream>> {
        let deadline = Instant::now() + self.timeouts.handshake;
        let proxy = authority(&self.host, self.port);
        debug!("Dialing proxy {}", proxy);
        let stream = within(
            Phase::Connect,
            self.timeouts.connect,
            deadline,
            TcpStream::connect((self.host.as_str(), self.port)),
        )
        .await?;
        self.handshake_until(stream, request, deadline).await
    }

    /// Performs the handshake over an already open connection to the proxy.
    pub async fn handshake<S>(&self, stream: S, request: &TunnelRequest) -> Result<Tunnel<S>>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let deadline = Instant::now() + self.timeouts.handshake;
        self.handshake_until(stream, request, deadline).await
    }

    async fn handshake_until<S>(
        &self,
        mut stream: S,
        request: &TunnelRequest,
        deadline: Instant,
    ) -> Result<Tunnel<S>>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        // Rejected before any bytes reach the proxy.
        let message = build_connect_request(&request.host, request.port, &request.connect_headers())?;
        let target = authority(&request.host, request.port);
        info!("CONNECT {} via {}", target, authority(&self.host, self.port));

        within(Phase::Write, self.timeouts.write, deadline, async {
            stream.write_all(&message).await?;
            stream.flush().await
        })
        .await?;

        let read_deadline = deadline.min(Instant::now() + self.timeouts.read);
        let mut parser = ConnectResponseParser::new();
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            let n = within(Phase::Read, self.timeouts.read, read_deadline, stream.read(&mut chunk))
                .await?;
            if n == 0 {
                warn!("Proxy closed the connection during CONNECT {}", target);
                return Err(parser.finish());
            }
            match parser.feed(&chunk[..n])? {
                ParseStatus::Partial => continue,
                ParseStatus::Complete { response, remaining } => {
                    if !response.is_success() {
                        warn!("Proxy rejected CONNECT {}: {} {}", target, response.code, response.reason);
                        return Err(Error::TunnelRejected {
                            code: response.code,
                            reason: response.reason,
                        });
                    }
                    debug!(
                        "Tunnel to {} established with {} proxy headers",
                        target,
                        response.headers.len()
                    );
                    return Ok(Tunnel { stream: TunnelStream::new(stream, remaining), response });
                }
            }
        }
    }
}

/// Runs `fut` until the earlier of `limit` from now and `deadline`.
async fn within<F, T>(phase: Phase, limit: Duration, deadline: Instant, fut: F) -> Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    let deadline = deadline.min(Instant::now() + limit);
    match timeout_at(deadline, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) if err.kind() == io::ErrorKind::TimedOut => Err(Error::TunnelTimeout(phase)),
        Ok(Err(err)) => Err(Error::IoError(err)),
        Err(_) => {
            debug!("Tunnel {} phase exceeded its deadline", phase);
            Err(Error::TunnelTimeout(phase))
        }
    }
}
