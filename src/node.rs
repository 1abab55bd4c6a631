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

/// A single addressable instance in the cluster, as tracked by a
/// [`crate::pool::NodePool`].
///
/// Created once per cluster-membership snapshot; mutated only by the
/// pipeline's mark-alive/mark-dead calls, and destroyed wholesale when a
/// sniff replaces the snapshot.
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) uri: Uri,
    pub(crate) is_alive: bool,
    pub(crate) dead_until: Option<Instant>,
    pub(crate) failed_attempts: u32,
}

impl Node {
    pub(crate) fn new(uri: Uri) -> Self {
        Self { uri, is_alive: true, dead_until: None, failed_attempts: 0 }
    }

    /// The node's address.
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Whether the node is currently considered alive.
    pub fn is_alive(&self) -> bool {
        self.is_alive
    }

    /// The number of consecutive failed attempts recorded against this node.
    pub fn failed_attempts(&self) -> u32 {
        self.failed_attempts
    }
}
