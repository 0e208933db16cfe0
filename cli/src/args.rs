// Copyright 2022 Google LLC
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

use clap::Parser;

pub const DEFAULT_TEST_URL: &str = "https://api.ipify.org?format=json";
pub const DEFAULT_PROXY_HEADER: &str = "X-ProxyMesh-IP";

/// Checks that a proxy receives CONNECT headers and returns its own.
#[derive(Debug, Parser)]
#[command(name = "proxy-headers-test")]
pub struct HarnessArgs {
    /// Show header values in output
    #[arg(short, long)]
    pub verbose: bool,
    /// Proxy URL, `[scheme://][user:pass@]host[:port]`
    #[arg(long, env = "PROXY_URL")]
    pub proxy_url: Option<String>,
    #[arg(long, env = "HTTPS_PROXY", hide = true)]
    pub https_proxy: Option<String>,
    /// URL whose host the tunnel is opened to
    #[arg(long, env = "TEST_URL", default_value = DEFAULT_TEST_URL)]
    pub test_url: String,
    /// Response header expected from the proxy
    #[arg(long, env = "PROXY_HEADER", default_value = DEFAULT_PROXY_HEADER)]
    pub proxy_header: String,
    /// Header name to send to the proxy
    #[arg(long, env = "SEND_PROXY_HEADER")]
    pub send_header: Option<String>,
    /// Value for the header sent to the proxy
    #[arg(long, env = "SEND_PROXY_VALUE")]
    pub send_value: Option<String>,
    /// Handshake timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,
}

impl HarnessArgs {
    /// `PROXY_URL`, falling back to `HTTPS_PROXY` when it is unset or empty.
    pub fn proxy(&self) -> Option<&str> {
        let non_empty = |url: &&str| !url.is_empty();
        self.proxy_url
            .as_deref()
            .filter(non_empty)
            .or_else(|| self.https_proxy.as_deref().filter(non_empty))
    }

    /// The header to send, only when both name and value are set.
    pub fn send(&self) -> Option<(&str, &str)> {
        match (self.send_header.as_deref(), self.send_value.as_deref()) {
            (Some(name), Some(value)) if !name.is_empty() && !value.is_empty() => {
                Some((name, value))
            }
            _ => None,
        }
    }
}
