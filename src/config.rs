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

//! The configuration surface: a builder over an inner, immutable struct.

use std::sync::Arc;
use std::time::Duration;

use crate::pool::DeadTimeout;
use crate::request::RequestData;
use crate::response::HttpDetails;

type RequestCreatedHook = Arc<dyn Fn(&RequestData) + Send + Sync>;
type RequestCompletedHook = Arc<dyn Fn(&HttpDetails) + Send + Sync>;

/// The recognised configuration surface.
pub struct Config {
    pub(crate) sniff_on_startup: bool,
    pub(crate) sniff_on_connection_fault: bool,
    pub(crate) sniff_life_span: Option<Duration>,
    pub(crate) ping_timeout: Duration,
    pub(crate) request_timeout: Duration,
    pub(crate) dead_timeout: Duration,
    pub(crate) max_dead_timeout: Duration,
    pub(crate) disable_direct_streaming: bool,
    /// `None` means "use the default" (on iff the pool
    /// is sniffable or has multiple nodes); `Some` overrides it explicitly.
    pub(crate) ping_enabled: Option<bool>,
    pub(crate) on_request_data_created: Option<RequestCreatedHook>,
    pub(crate) on_request_completed: Option<RequestCompletedHook>,
}

impl Config {
    /// Start building a `Config` with every option at its documented
    /// default.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// The dead-node revival bounds this config specifies, for passing to
    /// [`crate::pool::NodePool::new`].
    pub fn dead_timeout(&self) -> DeadTimeout {
        DeadTimeout { dead_timeout: self.dead_timeout, max_dead_timeout: self.max_dead_timeout }
    }

    /// Whether a sniffable pool performs a startup sniff.
    pub fn sniffs_on_startup(&self) -> bool {
        self.sniff_on_startup
    }

    /// Whether a sniffable pool sniffs after a connection fault.
    pub fn sniffs_on_connection_fault(&self) -> bool {
        self.sniff_on_connection_fault
    }

    /// The configured staleness window, if any.
    pub fn sniff_life_span(&self) -> Option<Duration> {
        self.sniff_life_span
    }
}

/// Builds a [`Config`].
pub struct ConfigBuilder {
    inner: Config,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self {
            inner: Config {
                sniff_on_startup: true,
                sniff_on_connection_fault: true,
                sniff_life_span: None,
                ping_timeout: Duration::from_secs(2),
                request_timeout: Duration::from_secs(60),
                dead_timeout: Duration::from_secs(60),
                max_dead_timeout: Duration::from_secs(30 * 60),
                disable_direct_streaming: false,
                ping_enabled: None,
                on_request_data_created: None,
                on_request_completed: None,
            },
        }
    }
}

impl ConfigBuilder {
    /// Whether the pool performs a startup sniff. Default: `true` for
    /// sniffable pools.
    pub fn sniff_on_startup(mut self, value: bool) -> Self {
        self.inner.sniff_on_startup = value;
        self
    }

    /// Whether a connection fault triggers a sniff. Default: `true` for
    /// sniffable pools.
    pub fn sniff_on_connection_fault(mut self, value: bool) -> Self {
        self.inner.sniff_on_connection_fault = value;
        self
    }

    /// How long before a pool is considered stale and due for a
    /// background refresh. Default: off.
    pub fn sniff_life_span(mut self, value: Duration) -> Self {
        self.inner.sniff_life_span = Some(value);
        self
    }

    /// Timeout for the liveness probe. Default: 2s.
    pub fn ping_timeout(mut self, value: Duration) -> Self {
        self.inner.ping_timeout = value;
        self
    }

    /// Timeout for the main call. Default: 60s.
    pub fn request_timeout(mut self, value: Duration) -> Self {
        self.inner.request_timeout = value;
        self
    }

    /// Base dead-time applied after a node's first failure. Default: 60s.
    pub fn dead_timeout(mut self, value: Duration) -> Self {
        self.inner.dead_timeout = value;
        self
    }

    /// Ceiling on the exponential dead-time backoff. Default: 30 minutes.
    pub fn max_dead_timeout(mut self, value: Duration) -> Self {
        self.inner.max_dead_timeout = value;
        self
    }

    /// Force body buffering for every response, regardless of the
    /// requested [`crate::response::ResponseKind`].
    pub fn disable_direct_streaming(mut self, value: bool) -> Self {
        self.inner.disable_direct_streaming = value;
        self
    }

    /// Override whether the [`crate::pinger::Pinger`] runs before the main
    /// call. Default: on iff the pool is sniffable or has multiple nodes.
    pub fn ping_enabled(mut self, value: bool) -> Self {
        self.inner.ping_enabled = Some(value);
        self
    }

    /// Called once, synchronously, before the first node attempt.
    pub fn on_request_data_created(mut self, hook: impl Fn(&RequestData) + Send + Sync + 'static) -> Self {
        self.inner.on_request_data_created = Some(Arc::new(hook));
        self
    }

    /// Called exactly once, synchronously, after the terminal state.
    pub fn on_request_completed(mut self, hook: impl Fn(&HttpDetails) + Send + Sync + 'static) -> Self {
        self.inner.on_request_completed = Some(Arc::new(hook));
        self
    }

    /// Finish building.
    pub fn build(self) -> Config {
        self.inner
    }
}

#[cfg(feature = "serde")]
mod serde_support {
    use std::time::Duration;

    use serde_derive::Deserialize;

    use super::{
        Config,
        ConfigBuilder,
    };

    /// The subset of [`Config`] that can be deserialized from an external
    /// source (callback hooks are necessarily code, not data).
    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ConfigData {
        #[serde(default = "default_true")]
        pub sniff_on_startup: bool,
        #[serde(default = "default_true")]
        pub sniff_on_connection_fault: bool,
        #[serde(default)]
        pub sniff_life_span_secs: Option<u64>,
        #[serde(default = "default_ping_timeout_secs")]
        pub ping_timeout_secs: u64,
        #[serde(default = "default_request_timeout_secs")]
        pub request_timeout_secs: u64,
        #[serde(default)]
        pub disable_direct_streaming: bool,
    }

    fn default_true() -> bool {
        true
    }

    fn default_ping_timeout_secs() -> u64 {
        2
    }

    fn default_request_timeout_secs() -> u64 {
        60
    }

    impl ConfigData {
        /// Parse a `Config` from a JSON document.
        pub fn from_json(bytes: &[u8]) -> serde_json::Result<Config> {
            let data: ConfigData = serde_json::from_slice(bytes)?;
            Ok(data.into_config())
        }

        fn into_config(self) -> Config {
            let mut builder = ConfigBuilder::default()
                .sniff_on_startup(self.sniff_on_startup)
                .sniff_on_connection_fault(self.sniff_on_connection_fault)
                .ping_timeout(Duration::from_secs(self.ping_timeout_secs))
                .request_timeout(Duration::from_secs(self.request_timeout_secs))
                .disable_direct_streaming(self.disable_direct_streaming);

            if let Some(secs) = self.sniff_life_span_secs {
                builder = builder.sniff_life_span(Duration::from_secs(secs));
            }

            builder.build()
        }
    }
}

#[cfg(feature = "serde")]
pub use serde_support::ConfigData;
