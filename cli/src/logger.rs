//
//  Copyright 2023 Google, Inc.
//
//  Licensed under the Apache License, Version 2.0 (the "License");
//  you may not use this file except in compliance with the License.
//  You may obtain a copy of the License at:
//
//  http://www.apache.org/licenses/LICENSE-2.0
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.

//! A logger for the proxy header test harness.
//!
//! Uses the env_logger crate that allows control of logging through
//! the RUST_LOG environment variable.

use chrono::Utc;
use env_logger::{Builder, Env};
use log::Record;
use std::{ffi::OsStr, io::Write, path::Path};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Initiating the environment for logging with given prefix
///
/// Only warnings are shown unless `verbose` is set, so the harness's
/// own PASS/FAIL lines stay readable.
pub fn init(prefix: &'static str, verbose: bool) {
    let default_filter = if verbose { "info" } else { "warn" };
    Builder::from_env(Env::default().default_filter_or(default_filter))
        .format(move |buf, record| writeln!(buf, "{}", format_record(prefix, record)))
        .init();
}

/// `<prefix> <level letter> <UTC time> <file>:<line> - <message>`
fn format_record(prefix: &str, record: &Record) -> String {
    format!(
        "{} {} {} {}:{} - {}",
        prefix,
        &record.level().as_str()[..1],
        Utc::now().format(TIME_FORMAT),
        source_file(record),
        record.line().unwrap_or(0),
        record.args()
    )
}

fn source_file<'a>(record: &Record<'a>) -> &'a str {
    record
        .file()
        .and_then(|path| Path::new(path).file_name())
        .and_then(OsStr::to_str)
        .unwrap_or("N/A")
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::Level;

    #[test]
    fn test_format_record() {
        let line = format_record(
            "proxy-headers",
            &Record::builder()
                .args(format_args!("tunnel failed"))
                .level(Level::Warn)
                .file(Some("cli/src/main.rs"))
                .line(Some(42))
                .build(),
        );
        assert!(line.starts_with("proxy-headers W "), "{}", line);
        assert!(line.ends_with(" main.rs:42 - tunnel failed"), "{}", line);
    }

    #[test]
    fn test_format_record_without_location() {
        let line = format_record(
            "proxy-headers",
            &Record::builder().args(format_args!("hello")).level(Level::Trace).build(),
        );
        assert!(line.starts_with("proxy-headers T "), "{}", line);
        assert!(line.ends_with(" N/A:0 - hello"), "{}", line);
    }
}
