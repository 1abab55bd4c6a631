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

//! The request pipeline: `Fresh -> Bootstrapped -> Iterating(k) -> {Succeeded | Failed}`.
//!
//! The retry budget is a single bounded pass over the node pool with
//! immediate failover on each attempt, never a sleeping resweep. Dead-node
//! revival timing is computed inline by `pool.rs` instead, since it is a
//! pure function of `(now, dead_until)` rather than an operation worth
//! retrying.

use std::time::Instant;

use crate::audit::{
    AuditEvent,
    AuditEventKind,
    AuditTrail,
};
use crate::error::PipelineError;
use crate::http_transport::{
    CancellationToken,
    HttpTransport,
    RawResponse,
};
use crate::node::Node;
use crate::pinger::Pinger;
use crate::pool::NodePool;
use crate::request::RequestData;
use crate::response::HttpDetails;
use crate::sniffer::{
    SniffReason,
    Sniffer,
    SniffSource,
};

/// The terminal, successful outcome of running a pipeline: the raw
/// response plus the node that produced it and the request's audit trail.
pub(crate) struct PipelineSuccess {
    pub(crate) raw: RawResponse,
    pub(crate) node: Node,
    pub(crate) audit_trail: AuditTrail,
}

/// Everything that can end a pipeline run other than success.
pub(crate) enum PipelineFailure {
    /// A terminal [`PipelineError`], with the audit trail recorded so far.
    Error(PipelineError, AuditTrail),
    /// Cancellation was observed at a suspension point. Surfaced
    /// distinctly — never wrapped as `PipelineError::Unexpected`.
    Cancelled(AuditTrail),
}

pub(crate) struct RequestPipeline<'a, S> {
    pool: &'a NodePool,
    sniffer: &'a Sniffer<S>,
    pinger: &'a Pinger,
    transport: &'a dyn HttpTransport,
    ping_enabled: bool,
    epoch: Instant,
}

impl<'a, S: SniffSource> RequestPipeline<'a, S> {
    pub(crate) fn new(
        pool: &'a NodePool,
        sniffer: &'a Sniffer<S>,
        pinger: &'a Pinger,
        transport: &'a dyn HttpTransport,
        ping_enabled: bool,
        epoch: Instant,
    ) -> Self {
        Self { pool, sniffer, pinger, transport, ping_enabled, epoch }
    }

    /// Run the full state machine for one [`RequestData`].
    pub(crate) async fn run(
        &self,
        request: &RequestData,
        cancellation: &CancellationToken,
    ) -> Result<PipelineSuccess, PipelineFailure> {
        let mut audit = AuditTrail::new();

        // Fresh -> Bootstrapped.
        let seed = self.pool.nodes().into_iter().next();
        if let Some(seed) = &seed {
            match self.sniffer.ensure_bootstrapped(self.pool, seed, self.epoch).await {
                Ok(()) => audit.push(AuditEvent::new(AuditEventKind::SniffOnStartup, Some(seed.uri().clone()))),
                Err(e) => {
                    log::warn!("startup sniff against {} failed: {e}", seed.uri());
                    audit.push(AuditEvent::new(AuditEventKind::SniffFailure, Some(seed.uri().clone())).with_error(e.kind()));
                    return Err(PipelineFailure::Error(e, audit));
                }
            }
        }

        // Bootstrapped -> Iterating(0).
        let now = Instant::now();
        let handles = self.pool.next_nodes(now, request.max_retries);

        if handles.is_empty() {
            audit.push(AuditEvent::new(AuditEventKind::NoNodesAttempted, None));
            return Err(PipelineFailure::Error(PipelineError::NoNodesAttempted, audit));
        }

        let sniffable = self.pool.kind().is_sniffable();
        let mut sniffed_on_failure = false;
        let mut errors: Vec<PipelineError> = Vec::new();
        let deadline = request.max_retry_timeout.map(|timeout| now + timeout);

        for handle in &handles {
            log::debug!("attempting request against node {}", handle.node.uri());

            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    log::warn!("max retry timeout reached before a terminal outcome");
                    audit.push(AuditEvent::new(AuditEventKind::MaxTimeoutReached, Some(handle.node.uri().clone())));
                    return Err(PipelineFailure::Error(PipelineError::MaxTimeoutReached, audit));
                }
            }

            if cancellation.is_cancelled() {
                audit.push(AuditEvent::new(AuditEventKind::CancellationRequested, Some(handle.node.uri().clone())));
                return Err(PipelineFailure::Cancelled(audit));
            }

            if sniffable && self.sniffer.is_stale(Instant::now(), self.epoch) {
                match self.sniffer.sniff(SniffReason::Stale, self.pool, &handle.node, self.epoch).await {
                    Ok(()) => audit.push(AuditEvent::new(AuditEventKind::SniffSuccess, Some(handle.node.uri().clone()))),
                    Err(e) => audit.push(
                        AuditEvent::new(AuditEventKind::SniffFailure, Some(handle.node.uri().clone()))
                            .with_error(e.kind()),
                    ),
                }
            }

            if cancellation.is_cancelled() {
                audit.push(AuditEvent::new(AuditEventKind::CancellationRequested, Some(handle.node.uri().clone())));
                return Err(PipelineFailure::Cancelled(audit));
            }

            if self.ping_enabled {
                if let Err(ping_error) =
                    self.pinger.ping(self.transport, &handle.node, request.ping_timeout, cancellation).await
                {
                    audit.push(
                        AuditEvent::new(AuditEventKind::PingFailure, Some(handle.node.uri().clone()))
                            .with_error(ping_error.kind()),
                    );

                    if !ping_error.recoverable() {
                        return Err(PipelineFailure::Error(ping_error, audit));
                    }

                    // A recoverable ping failure still drives mark-dead and
                    // sniff-on-failure, exactly as a failed main call would.
                    log::warn!("ping against {} failed: {ping_error}", handle.node.uri());
                    self.pool.mark_dead(handle.node_index, Instant::now());
                    audit.push(AuditEvent::new(AuditEventKind::MarkDead, Some(handle.node.uri().clone())));

                    if sniffable && self.sniffer.sniffs_on_failure() && !sniffed_on_failure {
                        sniffed_on_failure = true;
                        let _ = self.sniffer.sniff(SniffReason::Failure, self.pool, &handle.node, self.epoch).await;
                    }

                    errors.push(ping_error);
                    continue;
                }
                audit.push(AuditEvent::new(AuditEventKind::PingSuccess, Some(handle.node.uri().clone())));
            }

            if cancellation.is_cancelled() {
                audit.push(AuditEvent::new(AuditEventKind::CancellationRequested, Some(handle.node.uri().clone())));
                return Err(PipelineFailure::Cancelled(audit));
            }

            match self.transport.call(request, &handle.node, cancellation).await {
                Ok(raw) => {
                    let success = HttpDetails::success_for(request, raw.status_code);
                    let known_error = !success && HttpDetails::is_known_error(raw.status_code);

                    if success || known_error {
                        log::debug!("node {} returned a healthy response", handle.node.uri());
                        self.pool.mark_alive(handle.node_index);
                        audit.push(AuditEvent::new(
                            if success { AuditEventKind::HealthyResponse } else { AuditEventKind::BadResponse },
                            Some(handle.node.uri().clone()),
                        ));
                        audit.push(AuditEvent::new(AuditEventKind::MarkAlive, Some(handle.node.uri().clone())));

                        return Ok(PipelineSuccess { raw, node: handle.node.clone(), audit_trail: audit });
                    }

                    // An unknown/malformed server-side outcome: mark dead,
                    // sniff-on-failure, advance to the next node.
                    log::warn!("node {} returned an unrecognized error status", handle.node.uri());
                    self.pool.mark_dead(handle.node_index, Instant::now());
                    audit.push(AuditEvent::new(AuditEventKind::BadResponse, Some(handle.node.uri().clone())));
                    audit.push(AuditEvent::new(AuditEventKind::MarkDead, Some(handle.node.uri().clone())));

                    if sniffable && self.sniffer.sniffs_on_failure() && !sniffed_on_failure {
                        sniffed_on_failure = true;
                        let _ = self.sniffer.sniff(SniffReason::Failure, self.pool, &handle.node, self.epoch).await;
                    }

                    errors.push(PipelineError::BadResponse(format!(
                        "node {} returned an unrecognized error status",
                        handle.node.uri()
                    )
                    .into()));
                }
                Err(transport_error) => {
                    log::warn!("transport call to {} failed: {transport_error}", handle.node.uri());
                    self.pool.mark_dead(handle.node_index, Instant::now());
                    audit.push(AuditEvent::new(AuditEventKind::MarkDead, Some(handle.node.uri().clone())));

                    if !transport_error.recoverable {
                        return Err(PipelineFailure::Error(
                            PipelineError::BadAuthentication(transport_error.source),
                            audit,
                        ));
                    }

                    if sniffable && self.sniffer.sniffs_on_failure() && !sniffed_on_failure {
                        sniffed_on_failure = true;
                        let _ = self.sniffer.sniff(SniffReason::Failure, self.pool, &handle.node, self.epoch).await;
                    }

                    errors.push(PipelineError::BadResponse(transport_error.source));
                }
            }
        }

        log::warn!("retry budget of {} node(s) exhausted with no healthy response", handles.len());
        audit.push(AuditEvent::new(AuditEventKind::MaxRetriesReached, None));

        let terminal = errors.pop().expect("at least one node was attempted");
        let prior: Vec<_> = errors.iter().map(PipelineError::kind).collect();

        Err(PipelineFailure::Error(
            PipelineError::MaxRetriesReached { source: Box::new(terminal), prior },
            audit,
        ))
    }
}

/// Default ping-enablement: on iff the pool is sniffable or has more
/// than one node.
pub(crate) fn default_ping_enabled(pool: &NodePool) -> bool {
    pool.kind().is_sniffable() || pool.len() > 1
}
