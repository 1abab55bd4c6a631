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

//! A client-side request transport core for clustered HTTP services.
//!
//! Given a logical request, [`transport::Transport`] selects a live node
//! from a [`pool::NodePool`], optionally sniffs or pings, performs the HTTP
//! call through a caller-supplied [`http_transport::HttpTransport`], and
//! returns a typed response carrying full audit metadata.

#![forbid(unsafe_op_in_unsafe_fn)]
#![warn(
    absolute_paths_not_starting_with_crate,
    deprecated_in_future,
    future_incompatible,
    missing_docs,
    clippy::cargo_common_metadata,
    clippy::future_not_send,
    clippy::missing_errors_doc,
    clippy::multiple_crate_versions
)]
#![warn(
    clippy::bool_to_int_with_if,
    clippy::checked_conversions,
    clippy::cloned_instead_of_copied,
    clippy::default_trait_access,
    clippy::doc_link_with_quotes,
    clippy::doc_markdown,
    clippy::explicit_deref_methods,
    clippy::explicit_iter_loop,
    clippy::filter_map_next,
    clippy::flat_map_option,
    clippy::if_not_else,
    clippy::implicit_clone,
    clippy::inconsistent_struct_constructor,
    clippy::items_after_statements,
    clippy::manual_assert,
    clippy::manual_let_else,
    clippy::map_unwrap_or,
    clippy::match_same_arms,
    clippy::match_wildcard_for_single_variants,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    clippy::needless_continue,
    clippy::needless_pass_by_value,
    clippy::redundant_closure_for_method_calls,
    clippy::redundant_else,
    clippy::semicolon_if_nothing_returned,
    clippy::similar_names,
    clippy::uninlined_format_args,
    clippy::unnested_or_patterns,
    clippy::unused_async,
    clippy::unused_self
)]
#![allow(clippy::enum_glob_use, clippy::enum_variant_names)]

pub mod audit;
pub mod config;
pub mod error;
pub mod http_transport;
pub mod node;
pub mod pinger;
mod pipeline;
pub mod pool;
pub mod request;
pub mod response;
pub mod serializer;
pub mod sniffer;
pub mod transport;

#[cfg(any(test, feature = "test-support"))]
pub mod mock;

pub use audit::{
    AuditEvent,
    AuditEventKind,
    AuditTrail,
};
pub use config::{
    Config,
    ConfigBuilder,
};
pub use error::{
    PipelineError,
    PipelineErrorKind,
    Result,
};
pub use http_transport::{
    CancellationToken,
    HttpTransport,
    RawResponse,
    TransportError,
};
pub use node::Node;
pub use pinger::Pinger;
pub use pool::{
    DeadTimeout,
    NodePool,
    PoolKind,
};
pub use request::RequestData;
pub use response::{
    HttpDetails,
    RawStream,
    Response,
    ResponseBuilder,
    ResponseKind,
};
pub use serializer::Serializer;
pub use sniffer::{
    SniffReason,
    Sniffer,
    SniffSource,
};
pub use transport::{
    ExecuteError,
    Transport,
};

#[cfg(feature = "serde")]
pub use serializer::JsonSerializer;

/// Like [`arc_swap::ArcSwap`] but with a [`triomphe::Arc`].
pub(crate) type ArcSwap<T> = arc_swap::ArcSwapAny<triomphe::Arc<T>>;
