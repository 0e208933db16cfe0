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

//! Live check of a proxy's CONNECT header support.
//!
//! Opens a tunnel to the test URL's host through the proxy, optionally
//! sending one header on the CONNECT request, and reports whether the
//! expected header came back on the proxy's response.

mod args;
mod logger;

use anyhow::{anyhow, Context};
use args::HarnessArgs;
use clap::Parser;
use http::Uri;
use log::{debug, info};
use proxy_headers::{
    merge_proxy_headers, Handshake, HeaderSet, ProxyConfig, ProxyHeaderCache, Timeouts,
    TunnelRequest, TunnelingAgent,
};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

/// Result of a harness run: the header value when it was found.
#[derive(Debug, PartialEq)]
enum Outcome {
    Pass(String),
    Fail(String),
}

/// Host and port to tunnel to for `test_url`.
fn target(test_url: &str) -> anyhow::Result<(String, u16, bool)> {
    let uri: Uri = test_url.parse().with_context(|| format!("Invalid test URL {}", test_url))?;
    let scheme = uri.scheme_str().unwrap_or("https");
    let host = uri.host().ok_or_else(|| anyhow!("Test URL {} has no host", test_url))?;
    let port = uri.port_u16().unwrap_or(if scheme.eq_ignore_ascii_case("http") { 80 } else { 443 });
    let host = host.trim_start_matches('[').trim_end_matches(']').to_string();
    Ok((host, port, TunnelingAgent::needs_tunnel(scheme)))
}

async fn run(args: &HarnessArgs, proxy_url: &str) -> anyhow::Result<Outcome> {
    let config = ProxyConfig::from_string(proxy_url).context("Invalid proxy URL")?;
    let (host, port, tunnelled) = target(&args.test_url)?;
    if !tunnelled {
        info!("{} is not an https URL; opening a tunnel anyway", args.test_url);
    }

    let agent = TunnelingAgent::new(config, Arc::new(ProxyHeaderCache::new()))
        .with_timeouts(Timeouts::uniform(Duration::from_secs(args.timeout)));

    let mut send = HeaderSet::new();
    if let Some((name, value)) = args.send() {
        send.append(name.to_string(), value.to_string());
    }

    let tunnel = match agent.establish(TunnelRequest::new(host, port).with_headers(send)).await {
        Ok(tunnel) => tunnel,
        Err(err) => return Ok(Outcome::Fail(err.to_string())),
    };

    // Speaking TLS to the origin is up to the caller, so the origin
    // response here has no headers of its own.
    let mut response = HeaderSet::new();
    merge_proxy_headers(&mut response, &agent.proxy_headers(Handshake::Fresh(&tunnel.response.headers)));
    drop(tunnel);

    let reused = agent.proxy_headers(Handshake::Reused);
    debug!("Headers for a reused connection to {}: {:?}", agent.identity(), reused);

    Ok(check(&response, &args.proxy_header))
}

/// An empty value counts as missing.
fn check(response: &HeaderSet, name: &str) -> Outcome {
    match response.get(name) {
        Some(value) if !value.is_empty() => {
            Outcome::Pass(String::from_utf8_lossy(value).into_owned())
        }
        _ => Outcome::Fail(format!("Header '{}' not found in response", name)),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = HarnessArgs::parse();
    logger::init("proxy-headers", args.verbose);

    let Some(proxy_url) = args.proxy().map(str::to_string) else {
        println!("Error: PROXY_URL or HTTPS_PROXY environment variable required");
        return ExitCode::FAILURE;
    };

    println!("Testing proxy-headers");
    println!("{}", "=".repeat(21));
    println!("Proxy URL: {}", proxy_url);
    println!("Test URL: {}", args.test_url);
    println!("Checking for header: {}", args.proxy_header);
    if let Some((name, value)) = args.send() {
        println!("Sending header: {}: {}", name, value);
    }
    println!();

    match run(&args, &proxy_url).await {
        Ok(Outcome::Pass(value)) => {
            if args.verbose {
                println!("[PASS] Received header {}: {}", args.proxy_header, value);
            } else {
                println!("[PASS] Received header {}", args.proxy_header);
            }
            ExitCode::SUCCESS
        }
        Ok(Outcome::Fail(reason)) => {
            println!("[FAIL] {}", reason);
            ExitCode::FAILURE
        }
        Err(err) => {
            println!("[FAIL] {:#}", err);
            ExitCode::FAILURE
        }
    }
}
