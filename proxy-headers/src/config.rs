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

// # Proxy configuration
//
// This module parses proxy URLs into a `ProxyConfig`, derives the
// credential-free `ProxyIdentity` used to key cached proxy headers,
// and holds the handshake `Timeouts`.
//
// Host names are kept as written rather than resolved: the same name is
// both the cache key and the address dialed for every handshake.

use crate::message::authority;
use crate::Error;
use base64::{engine::general_purpose, Engine as _};
use regex::Regex;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;

/// Proxy configuration
#[derive(Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

fn config_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?:(?P<protocol>[A-Za-z][A-Za-z0-9+.-]*)://)?(?:(?P<user>[^:@/\s]+):(?P<pass>[^@/\s]*)@)?(?P<host>[\w\.-]+|\[[^\]]+\])(?::(?P<port>\d+))?/?$",
        )
        .expect("proxy configuration regex is valid")
    })
}

impl ProxyConfig {
    /// Parses a proxy configuration string and returns a `ProxyConfig` struct.
    ///
    /// The function expects the proxy configuration string to be in the following format:
    ///
    /// ```text
    /// [protocol://][username:password@]host[:port]
    /// ```
    ///
    /// where:
    ///
    /// * `protocol`: The network protocol (e.g., `http`, `https`). If not
    ///   provided, defaults to `http`.
    /// * `username`: and `password` are optional credentials for authentication.
    /// * `host`: The hostname or IP address of the proxy server. If
    ///   it's an IPv6 address, it should be enclosed in square brackets
    ///   (e.g., "[::1]").
    /// * `port`: The port number on which the proxy server is
    ///   listening. Defaults to 80 for `http` and 443 for `https`.
    ///
    /// # Errors
    /// Returns a `Error` if the input string is not in a valid format,
    /// the port is out of range, or the host is not a valid address.
    ///
    /// # Limitations
    /// * Usernames cannot contain `@`, `:` or `/`. Passwords cannot contain `@` or `/`.
    pub fn from_string(config_string: &str) -> Result<ProxyConfig, Error> {
        let caps = config_regex().captures(config_string).ok_or(Error::MalformedConfigString)?;

        let protocol = caps
            .name("protocol")
            .map_or_else(|| "http".to_string(), |m| m.as_str().to_ascii_lowercase());
        let username = caps.name("user").map(|m| m.as_str().to_string());
        let password = caps.name("pass").map(|m| m.as_str().to_string());

        let raw_host = caps.name("host").ok_or(Error::MalformedConfigString)?.as_str();
        let host = validate_host(raw_host)?;

        let port = match caps.name("port") {
            Some(m) => m.as_str().parse::<u16>().map_err(|_| Error::InvalidPortNumber)?,
            None => default_port(&protocol).ok_or(Error::InvalidPortNumber)?,
        };

        Ok(ProxyConfig { protocol, host, port, username, password })
    }

    /// The cache key for this proxy. Credentials are not part of it.
    pub fn identity(&self) -> ProxyIdentity {
        ProxyIdentity::new(&self.protocol, &self.host, self.port)
    }

    /// `Proxy-Authorization` value for the embedded credentials, if any.
    pub fn basic_auth(&self) -> Option<String> {
        match (&self.username, &self.password) {
            (Some(username), Some(password)) => {
                let encoded = base64_encode(format!("{}:{}", username, password).as_bytes());
                Some(format!("Basic {}", String::from_utf8_lossy(&encoded)))
            }
            _ => None,
        }
    }
}

impl FromStr for ProxyConfig {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProxyConfig::from_string(s)
    }
}

// Credentials stay out of logs.
impl fmt::Debug for ProxyConfig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ProxyConfig")
            .field("protocol", &self.protocol)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

fn default_port(protocol: &str) -> Option<u16> {
    match protocol {
        "http" => Some(80),
        "https" => Some(443),
        _ => None,
    }
}

/// Strips IPv6 brackets and rejects literals that are not valid addresses.
fn validate_host(raw: &str) -> Result<String, Error> {
    if let Some(inner) = raw.strip_prefix('[').and_then(|h| h.strip_suffix(']')) {
        inner.parse::<Ipv6Addr>().map_err(|_| Error::InvalidHost)?;
        return Ok(inner.to_string());
    }
    if raw.chars().all(|c| c.is_ascii_digit() || c == '.') {
        raw.parse::<Ipv4Addr>().map_err(|_| Error::InvalidHost)?;
    }
    if raw.starts_with('.') || raw.ends_with('-') {
        return Err(Error::InvalidHost);
    }
    Ok(raw.to_ascii_lowercase())
}

fn base64_encode(src: &[u8]) -> Vec<u8> {
    general_purpose::STANDARD.encode(src).into_bytes()
}

/// Identifies a proxy endpoint by scheme, host and port.
///
/// Requests to different origins through the same proxy share one
/// identity, and so do requests made with rotating credentials.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProxyIdentity {
    scheme: String,
    host: String,
    port: u16,
}

impl ProxyIdentity {
    pub fn new(scheme: &str, host: &str, port: u16) -> Self {
        ProxyIdentity {
            scheme: scheme.to_ascii_lowercase(),
            host: host.to_ascii_lowercase(),
            port,
        }
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for ProxyIdentity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, authority(&self.host, self.port))
    }
}

/// Deadlines for one CONNECT handshake.
///
/// `handshake` bounds the whole exchange; the per-phase values bound
/// each suspension point within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub connect: Duration,
    pub write: Duration,
    pub read: Duration,
    pub handshake: Duration,
}

impl Timeouts {
    /// Uses `duration` for every phase and for the overall deadline.
    pub fn uniform(duration: Duration) -> Self {
        Timeouts { connect: duration, write: duration, read: duration, handshake: duration }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Timeouts {
            connect: Duration::from_secs(10),
            write: Duration::from_secs(10),
            read: Duration::from_secs(30),
            handshake: Duration::from_secs(30),
        }
    }
}
