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

/// This module keeps the most recent CONNECT response headers seen for
/// each proxy endpoint.
///
/// A request that reuses an already tunnelled connection never sees a
/// CONNECT response of its own. The headers from the handshake that
/// opened the tunnel are looked up here instead.
///
/// Entries are never evicted. There is one entry per proxy endpoint in
/// use, and proxy-assigned values (egress IP, country) are expected to
/// hold for as long as the proxy keeps the assignment.
///
use crate::config::ProxyIdentity;
use crate::headers::HeaderSet;
use log::debug;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

/// Headers stored for one proxy endpoint.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub headers: Arc<HeaderSet>,
    pub updated: Instant,
}

#[derive(Debug, Default)]
pub struct ProxyHeaderCache {
    map: RwLock<HashMap<ProxyIdentity, CacheEntry>>,
}

impl ProxyHeaderCache {
    pub fn new() -> Self {
        ProxyHeaderCache { map: RwLock::new(HashMap::new()) }
    }

    /// Replaces the entry for `identity`.
    ///
    /// The set is built before the lock is taken, so readers see either
    /// the previous set or this one in full.
    pub fn put(&self, identity: ProxyIdentity, headers: HeaderSet) {
        let entry = CacheEntry { headers: Arc::new(headers), updated: Instant::now() };
        debug!("Caching {} proxy headers for {}", entry.headers.len(), identity);
        self.write().insert(identity, entry);
    }

    pub fn get(&self, identity: &ProxyIdentity) -> Option<HeaderSet> {
        self.read().get(identity).map(|entry| entry.headers.as_ref().clone())
    }

    /// Returns the entry with its last-updated time.
    pub fn entry(&self, identity: &ProxyIdentity) -> Option<CacheEntry> {
        self.read().get(identity).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    // A panic while holding the lock cannot leave a partial entry behind,
    // so a poisoned map is still consistent.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<ProxyIdentity, CacheEntry>> {
        self.map.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ProxyIdentity, CacheEntry>> {
        self.map.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
