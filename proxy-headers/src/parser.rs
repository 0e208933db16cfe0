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

// # CONNECT response parser
//
// Accumulates bytes read from the proxy connection until the blank
// line ending the response head arrives. `httparse` is stateless, so
// every `feed` re-parses the buffered head; heads are small and this
// keeps split status lines and split header lines trivially correct.
//
// Bytes that arrive in the same read as the end of the head belong to
// the tunnelled protocol. They are returned untouched alongside the
// parsed response.

use crate::error::Error;
use crate::headers::{is_token, HeaderSet};
use crate::Result;
use bytes::{Bytes, BytesMut};
use log::debug;

/// Largest response head accepted before giving up on the proxy.
pub const MAX_HEAD_BYTES: usize = 64 * 1024;
const MAX_STATUS_LINE_BYTES: usize = 8 * 1024;
const MAX_HEADERS: usize = 128;
const MAX_DETAIL_CHARS: usize = 256;

/// The status line and headers of a proxy's reply to CONNECT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectResponse {
    /// Minor HTTP version, `1` for `HTTP/1.1`.
    pub version: u8,
    pub code: u16,
    pub reason: String,
    pub headers: HeaderSet,
}

impl ConnectResponse {
    /// Any 2xx establishes the tunnel.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }
}

#[derive(Debug)]
pub enum ParseStatus {
    /// More bytes are needed.
    Partial,
    /// The head is complete. `remaining` holds every byte fed after the
    /// terminating blank line.
    Complete { response: ConnectResponse, remaining: Bytes },
}

#[derive(Debug, Default)]
pub struct ConnectResponseParser {
    buf: BytesMut,
}

impl ConnectResponseParser {
    pub fn new() -> Self {
        ConnectResponseParser { buf: BytesMut::with_capacity(1024) }
    }

    /// Appends `data` and tries to complete the response head.
    ///
    /// After `Complete` is returned the parser is empty again.
    pub fn feed(&mut self, data: &[u8]) -> Result<ParseStatus> {
        self.buf.extend_from_slice(data);

        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut response = httparse::Response::new(&mut headers);
        match response.parse(&self.buf) {
            Ok(httparse::Status::Complete(len)) => {
                let parsed = ConnectResponse {
                    version: response.version.unwrap_or(1),
                    code: response.code.unwrap_or_default(),
                    reason: match response.reason {
                        Some(reason) if !reason.is_empty() => reason.to_string(),
                        _ => self.raw_reason(),
                    },
                    headers: response
                        .headers
                        .iter()
                        .map(|h| {
                            (Bytes::copy_from_slice(h.name.as_bytes()), Bytes::copy_from_slice(h.value))
                        })
                        .collect(),
                };
                let mut head = std::mem::take(&mut self.buf);
                let remaining = head.split_off(len).freeze();
                debug!(
                    "Parsed CONNECT response {} {} ({} head bytes, {} trailing)",
                    parsed.code,
                    parsed.reason,
                    len,
                    remaining.len()
                );
                Ok(ParseStatus::Complete { response: parsed, remaining })
            }
            Ok(httparse::Status::Partial) => {
                self.check_limits()?;
                Ok(ParseStatus::Partial)
            }
            Err(err) => Err(self.classify(err)),
        }
    }

    /// Called when the connection closed before `feed` completed.
    pub fn finish(&self) -> Error {
        debug!("CONNECT response truncated after {} bytes", self.buf.len());
        Error::IncompleteResponse
    }

    /// Number of bytes held while waiting for the rest of the head.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    fn check_limits(&self) -> Result<()> {
        if self.status_line_end().is_none() && self.buf.len() > MAX_STATUS_LINE_BYTES {
            return Err(Error::MalformedResponse(format!(
                "status line exceeds {} bytes: {}",
                MAX_STATUS_LINE_BYTES,
                self.status_line()
            )));
        }
        if self.buf.len() > MAX_HEAD_BYTES {
            return Err(Error::MalformedResponse(format!(
                "response head exceeds {} bytes",
                MAX_HEAD_BYTES
            )));
        }
        Ok(())
    }

    fn classify(&self, err: httparse::Error) -> Error {
        match err {
            httparse::Error::HeaderName | httparse::Error::HeaderValue => {
                Error::MalformedHeader(self.offending_header())
            }
            httparse::Error::NewLine if self.has_valid_status_line() => {
                Error::MalformedHeader(self.offending_header())
            }
            httparse::Error::TooManyHeaders => {
                Error::MalformedResponse(format!("more than {} headers", MAX_HEADERS))
            }
            _ => Error::MalformedResponse(self.status_line()),
        }
    }

    fn status_line_end(&self) -> Option<usize> {
        self.buf.iter().position(|b| *b == b'\n')
    }

    /// True once a full `HTTP/1.x ddd` status line has been buffered.
    fn has_valid_status_line(&self) -> bool {
        let Some(end) = self.status_line_end() else {
            return false;
        };
        let line = &self.buf[..end];
        line.len() >= 12
            && line.starts_with(b"HTTP/1.")
            && line[9..12].iter().all(u8::is_ascii_digit)
    }

    /// The reason phrase decoded lossily. `httparse` drops phrases that
    /// are not valid UTF-8.
    fn raw_reason(&self) -> String {
        let end = self.status_line_end().unwrap_or(self.buf.len());
        // "HTTP/1.x ddd"
        let line = self.buf.get(12..end).unwrap_or_default();
        detail(line.strip_prefix(b" ").unwrap_or(line))
    }

    fn status_line(&self) -> String {
        let end = self.status_line_end().unwrap_or(self.buf.len());
        detail(&self.buf[..end])
    }

    /// Finds the first header line that is not `name: value`.
    fn offending_header(&self) -> String {
        let start = self.status_line_end().map_or(0, |end| end + 1);
        let block = &self.buf[start..];
        for line in block.split(|b| *b == b'\n') {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if line.is_empty() {
                break;
            }
            if !is_header_line(line) {
                return detail(line);
            }
        }
        detail(block)
    }
}

fn is_header_line(line: &[u8]) -> bool {
    match line.iter().position(|b| *b == b':') {
        Some(colon) => is_token(&line[..colon]),
        None => false,
    }
}

fn detail(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).chars().take(MAX_DETAIL_CHARS).collect()
}
