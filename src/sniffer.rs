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

//! Refreshes the [`crate::pool::NodePool`] from the cluster on startup,
//! staleness, or failure.
//!
//! Staleness is checked lazily against the last sniff timestamp rather than
//! through a background task, so a pool that is never used never sniffs.
//! The first-use barrier is a small state-enum guarded by a
//! `tokio::sync::Notify`, ensuring concurrent first callers share one
//! startup sniff instead of racing.

use std::sync::atomic::{
    AtomicU64,
    Ordering,
};
use std::time::{
    Duration,
    Instant,
};

use http::Uri;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::{
    BoxStdError,
    PipelineError,
};
use crate::node::Node;
use crate::pool::NodePool;

/// Why a sniff is being performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SniffReason {
    /// The pool has never been used; gated by the first-use barrier.
    Startup,
    /// `now - last_sniff >= sniff_life_span`.
    Stale,
    /// A request hit a connection-level failure; at most once per request.
    Failure,
}

/// Reads cluster membership from a node via an out-of-band request.
///
/// An external collaborator: parsing the membership response is
/// application-specific, so this crate only defines the shape of "ask this
/// node who else is in the cluster".
#[async_trait::async_trait]
pub trait SniffSource: Send + Sync {
    /// Query `node` for the current cluster membership.
    async fn sniff(&self, node: &Node, timeout: Duration) -> Result<Vec<Uri>, BoxStdError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BootstrapState {
    NotStarted,
    InProgress,
    Done,
}

struct Bootstrap {
    state: Mutex<BootstrapState>,
    notify: Notify,
}

/// Refreshes a [`NodePool`]'s membership on startup, staleness, or
/// connection failure.
pub struct Sniffer<S> {
    source: S,
    sniff_life_span: Option<Duration>,
    sniff_on_startup: bool,
    sniff_on_connection_fault: bool,
    last_sniff_millis: AtomicU64,
    bootstrap: Bootstrap,
}

impl<S: SniffSource> Sniffer<S> {
    pub fn new(
        source: S,
        sniff_life_span: Option<Duration>,
        sniff_on_startup: bool,
        sniff_on_connection_fault: bool,
    ) -> Self {
        Self {
            source,
            sniff_life_span,
            sniff_on_startup,
            sniff_on_connection_fault,
            last_sniff_millis: AtomicU64::new(0),
            bootstrap: Bootstrap {
                state: Mutex::new(BootstrapState::NotStarted),
                notify: Notify::new(),
            },
        }
    }

    /// Whether a stale-triggered sniff is due.
    pub(crate) fn is_stale(&self, now: Instant, epoch: Instant) -> bool {
        let Some(life_span) = self.sniff_life_span else {
            return false;
        };

        let last = self.last_sniff_millis.load(Ordering::Acquire);
        if last == 0 {
            return true;
        }

        let last_instant = epoch + Duration::from_millis(last);
        now.saturating_duration_since(last_instant) >= life_span
    }

    /// Whether a sniff-on-failure should fire for this pool kind and config.
    pub(crate) fn sniffs_on_failure(&self) -> bool {
        self.sniff_on_connection_fault
    }

    /// Run the first-use barrier exactly once across all callers: the
    /// first caller performs the startup sniff while everyone else waits
    /// on the same barrier, then all proceed.
    pub(crate) async fn ensure_bootstrapped(
        &self,
        pool: &NodePool,
        candidate: &Node,
        epoch: Instant,
    ) -> Result<(), PipelineError> {
        loop {
            let mut state = self.bootstrap.state.lock();
            match *state {
                BootstrapState::Done => return Ok(()),
                BootstrapState::InProgress => {
                    drop(state);
                    self.bootstrap.notify.notified().await;
                    continue;
                }
                BootstrapState::NotStarted => {
                    *state = BootstrapState::InProgress;
                    break;
                }
            }
        }

        let result = if self.sniff_on_startup {
            self.sniff(SniffReason::Startup, pool, candidate, epoch).await
        } else {
            Ok(())
        };

        *self.bootstrap.state.lock() = BootstrapState::Done;
        self.bootstrap.notify.notify_waiters();

        result
    }

    /// Perform a sniff against `candidate`, replacing `pool`'s membership
    /// on success.
    pub(crate) async fn sniff(
        &self,
        reason: SniffReason,
        pool: &NodePool,
        candidate: &Node,
        epoch: Instant,
    ) -> Result<(), PipelineError> {
        let timeout = Duration::from_secs(1);

        log::debug!("sniffing against {} ({reason:?})", candidate.uri());

        let uris = self.source.sniff(candidate, timeout).await.map_err(|e| match reason {
            SniffReason::Startup => PipelineError::CouldNotStartSniffOnStartup(e),
            SniffReason::Stale | SniffReason::Failure => PipelineError::SniffFailure(e),
        })?;

        pool.sniff(uris);

        let millis = Instant::now().saturating_duration_since(epoch).as_millis() as u64;
        self.last_sniff_millis.store(millis.max(1), Ordering::Release);

        Ok(())
    }
}
