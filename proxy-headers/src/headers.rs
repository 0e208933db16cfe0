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

use bytes::Bytes;
use std::fmt;

/// An ordered list of header name/value pairs.
///
/// Names compare case-insensitively but keep the casing they were
/// inserted with. Duplicate names are allowed and keep their relative
/// order, so the set can be written back to the wire exactly as it was
/// received.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct HeaderSet {
    entries: Vec<(Bytes, Bytes)>,
}

impl HeaderSet {
    pub fn new() -> Self {
        HeaderSet { entries: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        HeaderSet { entries: Vec::with_capacity(capacity) }
    }

    /// Adds a value after any existing values, even when the name is
    /// already present.
    pub fn append(&mut self, name: impl Into<Bytes>, value: impl Into<Bytes>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Sets the only value for `name`. The first existing entry keeps its
    /// position and later duplicates are dropped.
    pub fn insert(&mut self, name: impl Into<Bytes>, value: impl Into<Bytes>) {
        let name = name.into();
        let value = value.into();
        match self.position(&name) {
            Some(first) => {
                let mut index = 0;
                self.entries.retain(|(existing, _)| {
                    let keep = index <= first || !eq_ignore_case(existing, &name);
                    index += 1;
                    keep
                });
                self.entries[first] = (name, value);
            }
            None => self.entries.push((name, value)),
        }
    }

    /// Returns the first value for `name`.
    pub fn get(&self, name: impl AsRef<[u8]>) -> Option<&[u8]> {
        let name = name.as_ref();
        self.entries.iter().find(|(n, _)| eq_ignore_case(n, name)).map(|(_, v)| v.as_ref())
    }

    /// Returns every value for `name` in insertion order.
    pub fn get_all(&self, name: impl AsRef<[u8]>) -> Vec<&[u8]> {
        let name = name.as_ref();
        self.entries
            .iter()
            .filter(|(n, _)| eq_ignore_case(n, name))
            .map(|(_, v)| v.as_ref())
            .collect()
    }

    pub fn contains(&self, name: impl AsRef<[u8]>) -> bool {
        self.position(name.as_ref()).is_some()
    }

    /// Removes every value for `name` and returns how many were removed.
    pub fn remove(&mut self, name: impl AsRef<[u8]>) -> usize {
        let name = name.as_ref();
        let before = self.entries.len();
        self.entries.retain(|(n, _)| !eq_ignore_case(n, name));
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &[u8])> {
        self.entries.iter().map(|(n, v)| (n.as_ref(), v.as_ref()))
    }

    fn position(&self, name: &[u8]) -> Option<usize> {
        self.entries.iter().position(|(n, _)| eq_ignore_case(n, name))
    }
}

/// ASCII case-insensitive comparison used for header names.
pub(crate) fn eq_ignore_case(a: &[u8], b: &[u8]) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// True for a non-empty header name made of HTTP token characters.
pub(crate) fn is_token(name: &[u8]) -> bool {
    !name.is_empty()
        && name.iter().all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(b))
}

impl fmt::Debug for HeaderSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_list()
            .entries(self.iter().map(|(n, v)| {
                (String::from_utf8_lossy(n).into_owned(), String::from_utf8_lossy(v).into_owned())
            }))
            .finish()
    }
}

impl<N: Into<Bytes>, V: Into<Bytes>> Extend<(N, V)> for HeaderSet {
    fn extend<I: IntoIterator<Item = (N, V)>>(&mut self, iter: I) {
        for (name, value) in iter {
            self.append(name, value);
        }
    }
}

impl<N: Into<Bytes>, V: Into<Bytes>> FromIterator<(N, V)> for HeaderSet {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut headers = HeaderSet::new();
        headers.extend(iter);
        headers
    }
}

impl<N: Into<Bytes>, V: Into<Bytes>> From<Vec<(N, V)>> for HeaderSet {
    fn from(pairs: Vec<(N, V)>) -> Self {
        pairs.into_iter().collect()
    }
}
