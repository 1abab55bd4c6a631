/*
 * ‌
 * clustrans
 * ​
 * Copyright (C) 2024 The clustrans Authors
 * ​
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 * ‍
 */

use std::collections::HashSet;
use std::time::Duration;

use bytes::Bytes;
use http::Method;

/// A single logical request, immutable after construction.
///
/// Built once by [`crate::transport::Transport`] and threaded through the
/// whole pipeline; the one mutable piece (which node this attempt targets)
/// lives outside this struct, on the pipeline's iteration state, since a
/// single `RequestData` is attempted against many nodes in turn.
#[derive(Debug, Clone)]
pub struct RequestData {
    pub method: Method,
    pub path: String,
    pub body: Option<Bytes>,

    /// Status codes, beyond the default `[200,299]` and HEAD-404, that
    /// count as success for this request. `-1` in this set means "any
    /// status code is acceptable".
    pub allowed_status_codes: HashSet<i32>,

    /// Status codes for which the body should not be run through the
    /// serializer at all (the caller only cares that the call happened).
    pub skip_deserialization_for_status_codes: HashSet<i32>,

    pub request_timeout: Option<Duration>,
    pub max_retries: Option<usize>,
    pub max_retry_timeout: Option<Duration>,
    pub disable_direct_streaming: bool,
    pub ping_timeout: Duration,
    pub sniff_timeout: Duration,
}

impl RequestData {
    /// Start building a request for `method path`, with every option left
    /// at its default.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            allowed_status_codes: HashSet::new(),
            skip_deserialization_for_status_codes: HashSet::new(),
            request_timeout: Some(Duration::from_secs(60)),
            max_retries: None,
            max_retry_timeout: None,
            disable_direct_streaming: false,
            ping_timeout: Duration::from_secs(2),
            sniff_timeout: Duration::from_secs(1),
        }
    }

    /// Set the request body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Whether `status` is accepted as success for this request:
    /// `[200,299]`, HEAD+404, an explicit allow-list entry, or the
    /// wildcard `-1`.
    pub(crate) fn is_success_status(&self, status: http::StatusCode) -> bool {
        let code = i32::from(status.as_u16());

        (200..=299).contains(&code)
            || (self.method == Method::HEAD && code == 404)
            || self.allowed_status_codes.contains(&code)
            || self.allowed_status_codes.contains(&-1)
    }
}
