// Copyright 2017 Dmitry Tantsur <divius.inside@gmail.com>
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Various URL utilities.

use reqwest::Url;

use crate::{Error, ErrorKind, Result};

/// Parse a URL, reporting failures as invalid input.
pub(crate) fn parse_url(value: &str) -> Result<Url> {
    Url::parse(value)
        .map_err(|e| Error::new(ErrorKind::InvalidInput, format!("Invalid URL {}: {}", value, e)))
}

/// Strip trailing slashes, the form used as a cache key.
#[inline]
pub(crate) fn normalize_url(value: &str) -> &str {
    value.trim_end_matches('/')
}

/// Append a relative path to a base URL without losing its last segment.
pub(crate) fn url_join(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        normalize_url(base),
        path.trim_start_matches('/')
    )
}

/// Remove the last path segment of a URL.
///
/// Returns `None` when the URL has no path to trim or cannot be parsed.
pub(crate) fn trim_last_segment(value: &str) -> Option<String> {
    let mut url = Url::parse(normalize_url(value)).ok()?;
    let has_segment = url
        .path_segments()
        .map(|mut segments| segments.any(|s| !s.is_empty()))
        .unwrap_or(false);
    if !has_segment {
        return None;
    }

    {
        let mut segments = url.path_segments_mut().ok()?;
        let _ = segments.pop_if_empty().pop();
    }
    Some(normalize_url(url.as_str()).to_string())
}
