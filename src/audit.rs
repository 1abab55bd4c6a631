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

use std::time::Instant;

use http::Uri;

use crate::error::PipelineErrorKind;

/// The kind of event recorded in an [`AuditTrail`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum AuditEventKind {
    /// A sniff performed because the pool had never been used.
    SniffOnStartup,
    /// A sniff completed successfully.
    SniffSuccess,
    /// A sniff failed.
    SniffFailure,
    /// A liveness probe succeeded.
    PingSuccess,
    /// A liveness probe failed.
    PingFailure,
    /// The main call returned a response accepted as healthy.
    HealthyResponse,
    /// The main call returned a response rejected as unhealthy.
    BadResponse,
    /// The retry budget was exhausted.
    MaxRetriesReached,
    /// The wall-clock retry deadline elapsed before a terminal outcome.
    MaxTimeoutReached,
    /// The node pool yielded no nodes.
    NoNodesAttempted,
    /// Cancellation was observed at a suspension point.
    CancellationRequested,
    /// A node was marked alive.
    MarkAlive,
    /// A node was marked dead.
    MarkDead,
}

/// A single entry in a request's [`AuditTrail`].
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub kind: AuditEventKind,
    pub node: Option<Uri>,
    pub timestamp: Instant,
    pub error_kind: Option<PipelineErrorKind>,
}

impl AuditEvent {
    pub(crate) fn new(kind: AuditEventKind, node: Option<Uri>) -> Self {
        Self { kind, node, timestamp: Instant::now(), error_kind: None }
    }

    pub(crate) fn with_error(mut self, error_kind: PipelineErrorKind) -> Self {
        self.error_kind = Some(error_kind);
        self
    }
}

/// The ordered, append-only log of pipeline events attached to every
/// response. Timestamp-monotonic within one request.
#[derive(Debug, Clone, Default)]
pub struct AuditTrail(Vec<AuditEvent>);

impl AuditTrail {
    pub(crate) fn new() -> Self {
        Self(Vec::new())
    }

    pub(crate) fn push(&mut self, event: AuditEvent) {
        self.0.push(event);
    }

    /// The events recorded so far, in order.
    pub fn events(&self) -> &[AuditEvent] {
        &self.0
    }

    /// Whether any events have been recorded.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
