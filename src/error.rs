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

use std::error::Error as StdError;
use std::result::Result as StdResult;

use crate::audit::AuditTrail;
use crate::response::HttpDetails;

/// `Result<T, PipelineError>`
pub type Result<T> = StdResult<T, PipelineError>;

pub(crate) type BoxStdError = Box<dyn StdError + Send + Sync + 'static>;

/// Everything that can terminate a request pipeline.
///
/// Every variant carries enough context to tell whether another node is
/// worth trying; see [`PipelineError::recoverable`].
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum PipelineError {
    /// The node returned a response the pipeline could not accept as
    /// successful (an unknown 5xx, or a 4xx outside the allow-list).
    #[error("bad response: {0}")]
    BadResponse(#[source] BoxStdError),

    /// The node rejected the request at the transport level in a way that
    /// is never recoverable by trying another node (bad credentials, a TLS
    /// handshake failure, a client-side protocol violation).
    #[error("non-recoverable transport failure: {0}")]
    BadAuthentication(#[source] BoxStdError),

    /// The liveness probe against a node failed.
    #[error("ping failed: {source}")]
    PingFailure {
        /// The underlying failure.
        #[source]
        source: BoxStdError,
        /// Whether another node is still worth trying; mirrors the
        /// recoverability of whatever the probe's own failure was (a
        /// transport-level failure keeps its `recoverable` flag, a bad
        /// response status is always recoverable).
        recoverable: bool,
    },

    /// A sniff request could not refresh the node pool.
    #[error("sniff failed: {0}")]
    SniffFailure(#[source] BoxStdError),

    /// The startup sniff could not complete; the pool was never bootstrapped.
    #[error("could not start sniff on startup: {0}")]
    CouldNotStartSniffOnStartup(#[source] BoxStdError),

    /// The wall-clock `max_retry_timeout` elapsed before a terminal outcome
    /// was reached.
    #[error("exceeded the maximum retry timeout")]
    MaxTimeoutReached,

    /// The retry budget was exhausted without a successful attempt.
    #[error("exceeded the maximum number of retries: {source}")]
    MaxRetriesReached {
        /// The last node attempt's failure.
        #[source]
        source: BoxStdError,
        /// Every pipeline exception seen before the terminal one, in order.
        prior: Vec<PipelineErrorKind>,
    },

    /// The node pool yielded no nodes at all.
    #[error("no nodes were available to attempt this request")]
    NoNodesAttempted,

    /// Any other error, carrying everything seen before it.
    #[error("unexpected error: {source}")]
    Unexpected {
        /// The triggering error.
        #[source]
        source: BoxStdError,
        /// Every pipeline exception recorded before this one, for this request.
        prior: Vec<PipelineErrorKind>,
        /// The partially-built `HttpDetails` for this request, if one existed
        /// at the point of failure. `None` when the failure happened before
        /// any response object could be constructed.
        partial_response: Option<HttpDetails>,
        /// The audit trail recorded so far.
        partial_audit_trail: Option<AuditTrail>,
    },
}

impl PipelineError {
    /// Whether another node is worth trying after this error.
    ///
    /// `true` means "try another node"; `false` terminates the outer loop
    /// immediately.
    pub fn recoverable(&self) -> bool {
        match self {
            PipelineError::BadResponse(_) => true,
            PipelineError::BadAuthentication(_) => false,
            PipelineError::PingFailure { recoverable, .. } => *recoverable,
            PipelineError::SniffFailure(_) => false,
            PipelineError::CouldNotStartSniffOnStartup(_) => false,
            PipelineError::MaxTimeoutReached => false,
            PipelineError::MaxRetriesReached { .. } => false,
            PipelineError::NoNodesAttempted => false,
            PipelineError::Unexpected { .. } => false,
        }
    }

    /// The kind of this error, without its payload; used to build the
    /// `prior` list on [`PipelineError::Unexpected`].
    pub fn kind(&self) -> PipelineErrorKind {
        match self {
            PipelineError::BadResponse(_) => PipelineErrorKind::BadResponse,
            PipelineError::BadAuthentication(_) => PipelineErrorKind::BadAuthentication,
            PipelineError::PingFailure { .. } => PipelineErrorKind::PingFailure,
            PipelineError::SniffFailure(_) => PipelineErrorKind::SniffFailure,
            PipelineError::CouldNotStartSniffOnStartup(_) => {
                PipelineErrorKind::CouldNotStartSniffOnStartup
            }
            PipelineError::MaxTimeoutReached => PipelineErrorKind::MaxTimeoutReached,
            PipelineError::MaxRetriesReached { .. } => PipelineErrorKind::MaxRetriesReached,
            PipelineError::NoNodesAttempted => PipelineErrorKind::NoNodesAttempted,
            PipelineError::Unexpected { .. } => PipelineErrorKind::Unexpected,
        }
    }
}

/// The kind of a [`PipelineError`], without its payload.
///
/// Used to record "everything seen before" a terminal error without
/// cloning the underlying (possibly non-`Clone`) source errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum PipelineErrorKind {
    /// See [`PipelineError::BadResponse`].
    BadResponse,
    /// See [`PipelineError::BadAuthentication`].
    BadAuthentication,
    /// See [`PipelineError::PingFailure`].
    PingFailure,
    /// See [`PipelineError::SniffFailure`].
    SniffFailure,
    /// See [`PipelineError::CouldNotStartSniffOnStartup`].
    CouldNotStartSniffOnStartup,
    /// See [`PipelineError::MaxTimeoutReached`].
    MaxTimeoutReached,
    /// See [`PipelineError::MaxRetriesReached`].
    MaxRetriesReached,
    /// See [`PipelineError::NoNodesAttempted`].
    NoNodesAttempted,
    /// See [`PipelineError::Unexpected`].
    Unexpected,
}
