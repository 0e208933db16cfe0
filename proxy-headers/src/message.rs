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

use crate::error::Error;
use crate::headers::{is_token, HeaderSet};
use crate::Result;

const HTTP_VERSION: &str = "1.1";

/// Serializes a CONNECT request for `host:port` carrying `headers`.
///
/// The output is
/// `CONNECT host:port HTTP/1.1\r\nHost: host:port\r\n<headers>\r\n`,
/// with headers written in insertion order. A CR or LF anywhere in a
/// header name or value fails with `Error::InvalidHeader` and nothing is
/// produced, as does a name that is not an HTTP token. Values are
/// written as given; whitespace around a value is not part of it on the
/// reading side.
pub fn build_connect_request(host: &str, port: u16, headers: &HeaderSet) -> Result<Vec<u8>> {
    let authority = authority(host, port);
    if has_line_terminator(authority.as_bytes()) {
        return Err(Error::InvalidHeader(format!("Host: {}", authority.escape_debug())));
    }

    let mut request = Vec::with_capacity(64 + authority.len() * 2);
    request.extend_from_slice(format!("CONNECT {} HTTP/{}\r\n", authority, HTTP_VERSION).as_bytes());
    request.extend_from_slice(format!("Host: {}\r\n", authority).as_bytes());

    for (name, value) in headers.iter() {
        if has_line_terminator(name) || has_line_terminator(value) || !is_token(name) {
            return Err(Error::InvalidHeader(String::from_utf8_lossy(name).escape_debug().to_string()));
        }
        request.extend_from_slice(name);
        request.extend_from_slice(b": ");
        request.extend_from_slice(value);
        request.extend_from_slice(b"\r\n");
    }

    // Add the final CRLF
    request.extend_from_slice(b"\r\n");
    Ok(request)
}

/// Formats the request target, bracketing bare IPv6 literals.
pub(crate) fn authority(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

fn has_line_terminator(bytes: &[u8]) -> bool {
    bytes.iter().any(|b| *b == b'\r' || *b == b'\n')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_without_headers() {
        let request = build_connect_request("example.com", 8080, &HeaderSet::new()).unwrap();
        assert_eq!(
            request,
            b"CONNECT example.com:8080 HTTP/1.1\r\nHost: example.com:8080\r\n\r\n".to_vec()
        );
    }

    #[test]
    fn test_build_with_country_header() {
        let headers: HeaderSet = vec![("X-ProxyMesh-Country", "US")].into();
        let request = build_connect_request("example.com", 8080, &headers).unwrap();
        assert_eq!(
            request,
            b"CONNECT example.com:8080 HTTP/1.1\r\nHost: example.com:8080\r\nX-ProxyMesh-Country: US\r\n\r\n"
                .to_vec()
        );
    }

    #[test]
    fn test_build_keeps_order_and_duplicates() {
        let headers: HeaderSet = vec![("B", "2"), ("A", "1"), ("b", "3")].into();
        let request = build_connect_request("h", 443, &headers).unwrap();
        assert_eq!(
            String::from_utf8(request).unwrap(),
            "CONNECT h:443 HTTP/1.1\r\nHost: h:443\r\nB: 2\r\nA: 1\r\nb: 3\r\n\r\n"
        );
    }

    #[test]
    fn test_build_brackets_ipv6() {
        let request = build_connect_request("::1", 443, &HeaderSet::new()).unwrap();
        assert!(request.starts_with(b"CONNECT [::1]:443 HTTP/1.1\r\nHost: [::1]:443\r\n"));
    }

    #[test]
    fn test_build_rejects_line_terminators() {
        let data = [
            ("X-Evil", "a\r\nInjected: yes"),
            ("X-Evil", "a\nb"),
            ("X-Ev\ril", "a"),
            ("X-Evil\n", "a"),
        ];
        for (name, value) in data {
            let headers: HeaderSet = vec![(name, value)].into();
            let result = build_connect_request("example.com", 443, &headers);
            assert!(
                matches!(result, Err(Error::InvalidHeader(_))),
                "Expected InvalidHeader for {:?}: {:?}",
                (name, value),
                result
            );
        }
    }

    #[test]
    fn test_build_rejects_non_token_names() {
        for name in ["A:B", "", "X Space", "X-Caf\u{e9}"] {
            let headers: HeaderSet = vec![(name.to_string(), "x")].into();
            let result = build_connect_request("example.com", 443, &headers);
            assert!(
                matches!(result, Err(Error::InvalidHeader(_))),
                "Expected InvalidHeader for {:?}: {:?}",
                name,
                result
            );
        }
        let headers: HeaderSet = vec![("Via", "1.1 proxy"), ("X-Empty", "")].into();
        assert!(build_connect_request("example.com", 443, &headers).is_ok());
    }

    #[test]
    fn test_build_rejects_host_with_line_terminator() {
        let result = build_connect_request("example.com\r\nX: y", 443, &HeaderSet::new());
        assert!(matches!(result, Err(Error::InvalidHeader(_))));
    }
}
