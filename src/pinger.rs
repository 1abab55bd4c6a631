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

//! A cheap liveness probe performed before the real call.
//!
//! A failed probe feeds back into the same mark-dead accounting as a
//! failed main call, and its recoverability is propagated the same way: a
//! non-recoverable transport failure during the probe aborts the request
//! rather than advancing to the next node.

use std::time::Duration;

use crate::error::PipelineError;
use crate::http_transport::{
    CancellationToken,
    HttpTransport,
};
use crate::node::Node;
use crate::request::RequestData;

/// Issues a minimal HEAD-style probe against a node through the same
/// [`HttpTransport`] the main call uses.
pub struct Pinger;

impl Pinger {
    /// Probe `node` with `timeout`. Returns `Ok(())` on a healthy response,
    /// or the [`PipelineError::PingFailure`]/`recoverable()` classification
    /// of whatever went wrong.
    pub(crate) async fn ping(
        &self,
        transport: &dyn HttpTransport,
        node: &Node,
        timeout: Duration,
        cancellation: &CancellationToken,
    ) -> Result<(), PipelineError> {
        let mut probe = RequestData::new(http::Method::HEAD, "/");
        probe.request_timeout = Some(timeout);

        match transport.call(&probe, node, cancellation).await {
            Ok(raw) => {
                let ok = raw.status_code.map(|s| s.is_success() || s.as_u16() == 404).unwrap_or(false);
                if ok {
                    Ok(())
                } else {
                    log::debug!("ping against {} returned status {:?}", node.uri(), raw.status_code);
                    Err(PipelineError::PingFailure {
                        source: format!("ping returned status {:?}", raw.status_code).into(),
                        recoverable: true,
                    })
                }
            }
            Err(transport_error) => Err(PipelineError::PingFailure {
                recoverable: transport_error.recoverable,
                source: transport_error.source,
            }),
        }
    }
}
