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

//! The concrete socket-level HTTP transport: an external collaborator,
//! specified only by this trait. No implementation ships in this crate;
//! callers supply their own, or a thin `reqwest`/`hyper`-backed adapter
//! from outside this crate.

use http::{
    HeaderMap,
    StatusCode,
};

use crate::node::Node;
use crate::request::RequestData;
use crate::response::RawStream;

/// A single in-flight call's cancellation signal.
///
/// Modeled as a cooperative flag rather than a future, so it can be
/// checked synchronously at every suspension point.
#[derive(Clone)]
pub struct CancellationToken(std::sync::Arc<std::sync::atomic::AtomicBool>);

impl CancellationToken {
    /// A token that is never cancelled.
    pub fn none() -> Self {
        Self(std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false)))
    }

    /// Signal cancellation to every clone of this token.
    pub fn cancel(&self) {
        self.0.store(true, std::sync::atomic::Ordering::Release);
    }

    /// Whether cancellation has been signalled.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(std::sync::atomic::Ordering::Acquire)
    }
}

/// The raw outcome of one `HttpTransport::call`, before the
/// [`crate::response::ResponseBuilder`] turns it into a typed response.
pub struct RawResponse {
    pub status_code: Option<StatusCode>,
    pub headers: HeaderMap,
    pub body: RawStream,
    pub deprecation_warnings: Vec<String>,
}

/// Transport-level failure: the call never got a status line back.
///
/// `recoverable = true` means "mark the node dead and try another";
/// `recoverable = false` (bad credentials, client-side protocol
/// violation, TLS handshake failure) terminates the request immediately.
#[derive(Debug, thiserror::Error)]
#[error("transport error calling {uri}: {source}")]
pub struct TransportError {
    pub uri: http::Uri,
    pub recoverable: bool,
    #[source]
    pub source: crate::error::BoxStdError,
}

/// Performs the socket-level HTTP exchange for one node attempt.
///
/// Must not return `Err` for ordinary HTTP status codes — only for
/// transport-level failures (connect refused, TLS handshake, timeout).
#[async_trait::async_trait]
pub trait HttpTransport: Send + Sync {
    /// Execute `request` against `node`, honoring `cancellation`.
    async fn call(
        &self,
        request: &RequestData,
        node: &Node,
        cancellation: &CancellationToken,
    ) -> Result<RawResponse, TransportError>;
}
