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

//! This module defines the tunnel error types.

use std::fmt;
use std::io;

/// The handshake step that ran out of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Connect,
    Write,
    Read,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Phase::Connect => write!(f, "connect"),
            Phase::Write => write!(f, "write"),
            Phase::Read => write!(f, "read"),
        }
    }
}

/// An enumeration of possible errors.
#[derive(Debug)]
pub enum Error {
    IoError(io::Error),
    InvalidHeader(String),
    TunnelTimeout(Phase),
    TunnelRejected { code: u16, reason: String },
    MalformedResponse(String),
    MalformedHeader(String),
    IncompleteResponse,
    MalformedConfigString,
    InvalidPortNumber,
    InvalidHost,
    UnsupportedProtocol(String),
}

impl Error {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::TunnelTimeout(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::IoError(err) => write!(f, "I/O error: {}", err),
            Error::InvalidHeader(header) => write!(f, "Invalid header: {}", header),
            Error::TunnelTimeout(phase) => write!(f, "Tunnel timed out during {}", phase),
            Error::TunnelRejected { code, reason } => {
                write!(f, "Tunnel rejected by proxy: {} {}", code, reason)
            }
            Error::MalformedResponse(line) => write!(f, "Malformed CONNECT response: {}", line),
            Error::MalformedHeader(fragment) => {
                write!(f, "Malformed CONNECT response header: {}", fragment)
            }
            Error::IncompleteResponse => {
                write!(f, "Connection closed before CONNECT response completed")
            }
            Error::MalformedConfigString => {
                write!(f, "Invalid proxy configuration string")
            }
            Error::InvalidPortNumber => write!(f, "Invalid port number"),
            Error::InvalidHost => write!(f, "Invalid host"),
            Error::UnsupportedProtocol(protocol) => {
                write!(f, "Unsupported proxy protocol: {}", protocol)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::IoError(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_chaining() {
        let inner_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let outer_error = Error::IoError(inner_error);

        assert!(outer_error.to_string().contains("file not found"));
        assert!(std::error::Error::source(&outer_error).is_some());
    }

    #[test]
    fn test_rejected_display() {
        let err = Error::TunnelRejected { code: 407, reason: "Proxy Authentication Required".into() };
        assert_eq!(err.to_string(), "Tunnel rejected by proxy: 407 Proxy Authentication Required");
        assert!(!err.is_timeout());
    }

    #[test]
    fn test_timeout_phase() {
        let err = Error::TunnelTimeout(Phase::Read);
        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "Tunnel timed out during read");
    }
}
