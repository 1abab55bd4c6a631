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

//! A scriptable [`HttpTransport`] for tests, queueing canned
//! responses/errors per node.

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use http::{
    StatusCode,
    Uri,
};
use parking_lot::Mutex;

use crate::http_transport::{
    CancellationToken,
    HttpTransport,
    RawResponse,
    TransportError,
};
use crate::node::Node;
use crate::request::RequestData;
use crate::sniffer::SniffSource;

/// One scripted outcome for a single call against a node.
pub enum ScriptedCall {
    /// Respond with this status and body.
    Response(StatusCode, Bytes),
    /// Fail at the transport level; `recoverable` controls whether the
    /// pipeline should try another node.
    Fail { recoverable: bool, message: String },
}

/// A [`HttpTransport`] whose responses are scripted per node, in call
/// order. Panics if a node is called more times than it has scripts.
#[derive(Default)]
pub struct MockTransport {
    scripts: Mutex<HashMap<Uri, Vec<ScriptedCall>>>,
    calls: Mutex<Vec<Uri>>,
}

impl MockTransport {
    /// Build an empty mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `call` as the next scripted outcome for `uri`.
    pub fn push(&self, uri: Uri, call: ScriptedCall) {
        self.scripts.lock().entry(uri).or_default().push(call);
    }

    /// The URIs called so far, in order.
    pub fn calls(&self) -> Vec<Uri> {
        self.calls.lock().clone()
    }
}

#[async_trait::async_trait]
impl HttpTransport for MockTransport {
    async fn call(
        &self,
        _request: &RequestData,
        node: &Node,
        _cancellation: &CancellationToken,
    ) -> Result<RawResponse, TransportError> {
        self.calls.lock().push(node.uri().clone());

        let next = self
            .scripts
            .lock()
            .get_mut(node.uri())
            .and_then(|scripts| (!scripts.is_empty()).then(|| scripts.remove(0)));

        match next {
            Some(ScriptedCall::Response(status, body)) => Ok(RawResponse {
                status_code: Some(status),
                headers: http::HeaderMap::new(),
                body: Box::pin(futures_util::stream::once(async move { Ok(body) })),
                deprecation_warnings: Vec::new(),
            }),
            Some(ScriptedCall::Fail { recoverable, message }) => {
                Err(TransportError { uri: node.uri().clone(), recoverable, source: message.into() })
            }
            None => panic!("no scripted call left for node {}", node.uri()),
        }
    }
}

/// A [`SniffSource`] that always returns a fixed membership list.
pub struct FixedSniffSource(pub Vec<Uri>);

#[async_trait::async_trait]
impl SniffSource for FixedSniffSource {
    async fn sniff(&self, _node: &Node, _timeout: Duration) -> Result<Vec<Uri>, crate::error::BoxStdError> {
        Ok(self.0.clone())
    }
}
