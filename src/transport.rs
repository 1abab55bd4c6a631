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

//! The outer orchestration loop: one request in, many node attempts,
//! exactly one pair of callback invocations out.
//!
//! The thing callers hold and issue calls through, wrapping a `NodePool` +
//! `Sniffer` + `Pinger` + `HttpTransport`.

use std::sync::Arc;
use std::time::Instant;

use crate::audit::{
    AuditEvent,
    AuditEventKind,
    AuditTrail,
};
use crate::config::Config;
use crate::error::PipelineError;
use crate::http_transport::{
    CancellationToken,
    HttpTransport,
};
use crate::pinger::Pinger;
use crate::pipeline::{
    self,
    PipelineFailure,
    RequestPipeline,
};
use crate::pool::NodePool;
use crate::request::RequestData;
use crate::response::{
    HttpDetails,
    Response,
    ResponseBuilder,
    ResponseKind,
};
use crate::serializer::Serializer;
use crate::sniffer::{
    Sniffer,
    SniffSource,
};

/// Everything [`Transport::execute`] can return other than a response.
///
/// Cancellation is kept distinct from [`PipelineError`] on purpose: it is
/// its own variant, carrying whatever audit trail had been recorded, so it
/// can never be mistaken for an ordinary pipeline failure.
#[derive(Debug, thiserror::Error)]
pub enum ExecuteError {
    /// A terminal pipeline failure.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    /// Cancellation was observed before a terminal outcome was reached.
    #[error("request was cancelled")]
    Cancelled(AuditTrail),
}

/// A thin orchestrator around a scoped [`RequestPipeline`].
///
/// Acquires the pipeline, runs the state machine, invokes
/// `on_request_data_created`/`on_request_completed` exactly once each, and
/// ensures the pipeline's resources (the cancellation token, in
/// particular) are released on every exit path.
pub struct Transport<S> {
    pool: NodePool,
    sniffer: Sniffer<S>,
    pinger: Pinger,
    http: Arc<dyn HttpTransport>,
    config: Config,
    epoch: Instant,
}

impl<S: SniffSource> Transport<S> {
    pub fn new(pool: NodePool, sniffer: Sniffer<S>, http: Arc<dyn HttpTransport>, config: Config) -> Self {
        Self { pool, sniffer, pinger: Pinger, http, config, epoch: Instant::now() }
    }

    /// The node pool backing this transport, for diagnostics.
    pub fn pool(&self) -> &NodePool {
        &self.pool
    }

    /// Issue one request, materializing the response as `kind`.
    ///
    /// Ensures `on_request_data_created` fires before the first attempt and
    /// `on_request_completed` fires exactly once after the terminal state,
    /// on every exit path (success, failure, or cancellation). Equivalent
    /// to [`Transport::execute_cancellable`] with a token that is never
    /// cancelled.
    pub async fn execute<T, Ser>(
        &self,
        request: RequestData,
        kind: ResponseKind,
        serializer: Option<&Ser>,
        custom_converter: Option<&(dyn Fn(&[u8]) -> crate::error::Result<T> + Send + Sync)>,
    ) -> Result<Response<T>, ExecuteError>
    where
        Ser: Serializer<T>,
    {
        self.execute_cancellable(request, kind, serializer, custom_converter, &CancellationToken::none()).await
    }

    /// Like [`Transport::execute`], but honoring `cancellation`: a cancel
    /// signalled by any clone of the token takes effect at the next
    /// suspension point (before a sniff, before a ping, before a call,
    /// before advancing to the next node).
    pub async fn execute_cancellable<T, Ser>(
        &self,
        request: RequestData,
        kind: ResponseKind,
        serializer: Option<&Ser>,
        custom_converter: Option<&(dyn Fn(&[u8]) -> crate::error::Result<T> + Send + Sync)>,
        cancellation: &CancellationToken,
    ) -> Result<Response<T>, ExecuteError>
    where
        Ser: Serializer<T>,
    {
        if let Some(hook) = &self.config.on_request_data_created {
            hook(&request);
        }

        let ping_enabled = self
            .config
            .ping_enabled
            .unwrap_or_else(|| pipeline::default_ping_enabled(&self.pool));

        let pipeline = RequestPipeline::new(
            &self.pool,
            &self.sniffer,
            &self.pinger,
            self.http.as_ref(),
            ping_enabled,
            self.epoch,
        );

        let outcome = pipeline.run(&request, cancellation).await;

        let (raw, node, audit_trail) = match outcome {
            Ok(success) => (success.raw, success.node, success.audit_trail),
            Err(PipelineFailure::Cancelled(audit_trail)) => {
                log::debug!("request cancelled before a terminal outcome");
                let details = HttpDetails {
                    success: false,
                    http_status_code: None,
                    request_body_bytes: request.body.clone(),
                    response_body_bytes: None,
                    uri: http::Uri::from_static("/"),
                    method: request.method.clone(),
                    deprecation_warnings: Vec::new(),
                    audit_trail: audit_trail.clone(),
                };
                self.complete(Some(&details));
                return Err(ExecuteError::Cancelled(audit_trail));
            }
            Err(PipelineFailure::Error(error, audit_trail)) => {
                log::error!("request failed: {error}");
                self.complete_with_error(&request, audit_trail);
                return Err(error.into());
            }
        };

        let uri = node.uri().clone();
        let builder = ResponseBuilder::new(&request, uri);

        let built = builder
            .build(
                kind,
                raw.status_code,
                raw.deprecation_warnings,
                raw.body,
                audit_trail,
                serializer,
                custom_converter,
            )
            .await;

        match built {
            Ok((response, details)) => {
                self.complete(Some(&details));
                Ok(response)
            }
            Err(error) => {
                self.complete(None);
                Err(error.into())
            }
        }
    }

    fn complete(&self, details: Option<&HttpDetails>) {
        if let Some(hook) = &self.config.on_request_completed {
            if let Some(details) = details {
                hook(details);
            }
        }
    }

    fn complete_with_error(&self, request: &RequestData, mut audit_trail: AuditTrail) {
        if audit_trail.is_empty() {
            audit_trail.push(AuditEvent::new(AuditEventKind::NoNodesAttempted, None));
        }

        let details = HttpDetails {
            success: false,
            http_status_code: None,
            request_body_bytes: request.body.clone(),
            response_body_bytes: None,
            uri: http::Uri::from_static("/"),
            method: request.method.clone(),
            deprecation_warnings: Vec::new(),
            audit_trail,
        };

        self.complete(Some(&details));
    }
}
