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

//! Attaching proxy headers to the response of the tunnelled request.
//!
//! Origin headers always come first. A proxy header whose name the
//! origin also sent is added as an extra value after the origin's, so a
//! single-value lookup still returns what the origin said.

use crate::error::Error;
use crate::headers::HeaderSet;
use crate::Result;
use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use log::debug;

/// Appends `proxy` to the origin response headers.
pub fn merge_proxy_headers(origin: &mut HeaderSet, proxy: &HeaderSet) {
    for (name, value) in proxy.iter() {
        if origin.contains(name) {
            debug!("Proxy header {} also sent by origin", String::from_utf8_lossy(name));
        }
        origin.append(Bytes::copy_from_slice(name), Bytes::copy_from_slice(value));
    }
}

/// Appends `proxy` to an `http::HeaderMap`.
///
/// Every proxy header is validated before the map is touched, so on
/// error the map is unchanged.
pub fn merge_into_header_map(origin: &mut HeaderMap, proxy: &HeaderSet) -> Result<()> {
    let converted = proxy
        .iter()
        .map(|(name, value)| {
            let header_name = HeaderName::from_bytes(name)
                .map_err(|_| Error::InvalidHeader(String::from_utf8_lossy(name).into_owned()))?;
            let header_value = HeaderValue::from_bytes(value)
                .map_err(|_| Error::InvalidHeader(String::from_utf8_lossy(name).into_owned()))?;
            Ok((header_name, header_value))
        })
        .collect::<Result<Vec<_>>>()?;

    for (name, value) in converted {
        if origin.contains_key(&name) {
            debug!("Proxy header {} also sent by origin", name);
        }
        origin.append(name, value);
    }
    Ok(())
}
