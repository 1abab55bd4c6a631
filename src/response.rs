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

//! Materialises a typed response from a raw byte stream.
//!
//! The caller picks one closed shape up front via [`ResponseKind`]; the
//! builder dispatches on that tag rather than on runtime type identity.

use std::pin::Pin;

use bytes::{
    Bytes,
    BytesMut,
};
use futures_core::Stream;
use futures_util::{
    stream,
    StreamExt,
};
use http::{
    Method,
    StatusCode,
    Uri,
};

use crate::audit::AuditTrail;
use crate::error::{
    PipelineError,
    Result,
};
use crate::request::RequestData;
use crate::serializer::Serializer;

/// A raw response body as a byte stream, as handed to the
/// [`ResponseBuilder`] by the [`crate::http_transport::HttpTransport`].
pub type RawStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

/// The `ApiCall` attached to every response: everything about the attempt
/// that is not the typed body itself.
#[derive(Debug, Clone)]
pub struct HttpDetails {
    pub success: bool,
    pub http_status_code: Option<u16>,
    pub request_body_bytes: Option<Bytes>,
    pub response_body_bytes: Option<Bytes>,
    pub uri: Uri,
    pub method: Method,
    pub deprecation_warnings: Vec<String>,
    pub audit_trail: AuditTrail,
}

impl HttpDetails {
    /// Whether `status` counts as success.
    pub(crate) fn success_for(request: &RequestData, status: Option<StatusCode>) -> bool {
        match status {
            Some(status) => request.is_success_status(status),
            None => false,
        }
    }

    /// Whether a non-2xx response should still short-circuit the retry
    /// loop as a "known" server-side outcome rather than a connection
    /// failure.
    pub(crate) fn is_known_error(status: Option<StatusCode>) -> bool {
        match status {
            Some(status) => (400..600).contains(&status.as_u16()),
            None => false,
        }
    }
}

/// Which shape the caller wants [`ResponseBuilder::build`] to produce.
///
/// A closed tagged variant, not runtime type identity: the builder
/// dispatches on this tag instead of inspecting `T`.
pub enum ResponseKind {
    /// UTF-8 decode of the buffered body.
    String,
    /// The buffered body, verbatim.
    Bytes,
    /// No body; the stream is drained and discarded.
    Void,
    /// The raw stream, ownership transferred to the caller.
    Stream,
    /// Deserialize the body as `T` via the configured [`Serializer`] (or a
    /// supplied custom converter).
    Typed,
}

/// A materialised response, tagged the same way the caller requested via
/// [`ResponseKind`].
pub enum Response<T> {
    String(String),
    Bytes(Bytes),
    Void,
    Stream(RawStream),
    Typed(T),
}

/// Builds a [`Response`] from the raw output of an [`crate::http_transport::HttpTransport`]
/// call.
pub struct ResponseBuilder<'a> {
    request: &'a RequestData,
    uri: Uri,
}

impl<'a> ResponseBuilder<'a> {
    pub(crate) fn new(request: &'a RequestData, uri: Uri) -> Self {
        Self { request, uri }
    }

    /// Build a typed response. `custom_converter`, if supplied, bypasses
    /// the serializer for the `Typed` kind only.
    pub async fn build<T, S>(
        self,
        kind: ResponseKind,
        status: Option<StatusCode>,
        warnings: Vec<String>,
        mut raw_stream: RawStream,
        audit_trail: AuditTrail,
        serializer: Option<&S>,
        custom_converter: Option<&(dyn Fn(&[u8]) -> Result<T> + Send + Sync)>,
    ) -> Result<(Response<T>, HttpDetails)>
    where
        S: Serializer<T>,
    {
        let success = HttpDetails::success_for(self.request, status);

        // Buffer iff the caller forced it, or the requested kind needs the
        // whole body in memory up front (String/Bytes). `Stream` and `Void`
        // read through `raw_stream` directly below; `Typed` is buffered
        // implicitly since the serializer needs a complete byte slice.
        let needs_buffer = self.request.disable_direct_streaming
            || matches!(kind, ResponseKind::String | ResponseKind::Bytes | ResponseKind::Typed);

        let buffered: Option<Bytes> = if needs_buffer {
            Some(drain_to_bytes(&mut raw_stream).await?)
        } else {
            None
        };

        let mut details = HttpDetails {
            success,
            http_status_code: status.map(|s| s.as_u16()),
            request_body_bytes: self.request.body.clone(),
            response_body_bytes: buffered.clone(),
            uri: self.uri,
            method: self.request.method.clone(),
            deprecation_warnings: warnings,
            audit_trail,
        };

        let response = match kind {
            ResponseKind::String => {
                let bytes = buffered.expect("buffered above");
                let text = String::from_utf8(bytes.to_vec())
                    .map_err(|e| PipelineError::BadResponse(Box::new(e)))?;
                Response::String(text)
            }
            ResponseKind::Bytes => Response::Bytes(buffered.expect("buffered above")),
            ResponseKind::Void => {
                // Drain and discard; no buffering needed, we don't keep the bytes.
                drain_to_bytes(&mut raw_stream).await.ok();
                Response::Void
            }
            ResponseKind::Stream => {
                // Ownership transfers to the caller. If buffering already
                // drained `raw_stream` (forced by `disable_direct_streaming`),
                // hand back a fresh stream replaying the buffered bytes
                // instead of the now-exhausted original.
                let stream = match buffered {
                    Some(bytes) => {
                        let replay: RawStream = Box::pin(stream::once(async move { Ok(bytes) }));
                        replay
                    }
                    None => raw_stream,
                };
                return Ok((Response::Stream(stream), details));
            }
            ResponseKind::Typed => {
                let bytes = buffered.expect("buffered above");

                let status_code = status.map(|s| i32::from(s.as_u16()));
                let skip = status_code
                    .map(|c| self.request.skip_deserialization_for_status_codes.contains(&c))
                    .unwrap_or(false);

                if skip {
                    details.response_body_bytes = Some(bytes);
                    return Ok((Response::Void, details));
                }

                let value = if let Some(convert) = custom_converter {
                    convert(&bytes)?
                } else {
                    let serializer = serializer
                        .expect("a Typed response requires either a serializer or a custom converter");
                    serializer
                        .deserialize(&bytes)
                        .map_err(|e| PipelineError::BadResponse(Box::new(e)))?
                };

                Response::Typed(value)
            }
        };

        Ok((response, details))
    }
}

async fn drain_to_bytes(stream: &mut RawStream) -> Result<Bytes> {
    let mut buf = BytesMut::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| PipelineError::BadResponse(Box::new(e)))?;
        buf.extend_from_slice(&chunk);
    }

    Ok(buf.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serializer::NoopSerializer;

    fn stream_of(bytes: &'static [u8]) -> RawStream {
        Box::pin(stream::once(async move { Ok(Bytes::from_static(bytes)) }))
    }

    #[tokio::test]
    async fn string_round_trip() {
        let request = RequestData::new(Method::GET, "/");
        let builder = ResponseBuilder::new(&request, Uri::from_static("http://a/"));

        let (response, details) = builder
            .build::<(), NoopSerializer>(
                ResponseKind::String,
                Some(StatusCode::OK),
                Vec::new(),
                stream_of(b"hello"),
                AuditTrail::new(),
                None,
                None,
            )
            .await
            .unwrap();

        assert!(details.success);
        match response {
            Response::String(s) => assert_eq!(s, "hello"),
            _ => panic!("expected a string response"),
        }
    }

    #[tokio::test]
    async fn head_404_is_success() {
        let request = RequestData::new(Method::HEAD, "/");
        let builder = ResponseBuilder::new(&request, Uri::from_static("http://a/"));

        let (_, details) = builder
            .build::<(), NoopSerializer>(
                ResponseKind::Void,
                Some(StatusCode::NOT_FOUND),
                Vec::new(),
                stream_of(b""),
                AuditTrail::new(),
                None,
                None,
            )
            .await
            .unwrap();

        assert!(details.success);
    }

    #[tokio::test]
    async fn stream_kind_is_not_buffered() {
        let request = RequestData::new(Method::GET, "/");
        let builder = ResponseBuilder::new(&request, Uri::from_static("http://a/"));

        let (response, details) = builder
            .build::<(), NoopSerializer>(
                ResponseKind::Stream,
                Some(StatusCode::OK),
                Vec::new(),
                stream_of(b"raw"),
                AuditTrail::new(),
                None,
                None,
            )
            .await
            .unwrap();

        assert!(details.response_body_bytes.is_none());
        assert!(matches!(response, Response::Stream(_)));
    }

    #[tokio::test]
    async fn buffered_stream_is_replayable() {
        let mut request = RequestData::new(Method::GET, "/");
        request.disable_direct_streaming = true;
        let builder = ResponseBuilder::new(&request, Uri::from_static("http://a/"));

        let (response, details) = builder
            .build::<(), NoopSerializer>(
                ResponseKind::Stream,
                Some(StatusCode::OK),
                Vec::new(),
                stream_of(b"raw"),
                AuditTrail::new(),
                None,
                None,
            )
            .await
            .unwrap();

        assert_eq!(details.response_body_bytes.as_deref(), Some(&b"raw"[..]));
        match response {
            Response::Stream(mut stream) => {
                let replayed = drain_to_bytes(&mut stream).await.unwrap();
                assert_eq!(replayed.as_ref(), b"raw");
            }
            _ => panic!("expected a stream response"),
        }
    }

    #[tokio::test]
    async fn typed_skip_deserialization_is_a_success_with_no_body() {
        let mut request = RequestData::new(Method::GET, "/");
        request.skip_deserialization_for_status_codes.insert(204);
        let builder = ResponseBuilder::new(&request, Uri::from_static("http://a/"));

        let (response, details) = builder
            .build::<(), NoopSerializer>(
                ResponseKind::Typed,
                Some(StatusCode::NO_CONTENT),
                Vec::new(),
                stream_of(b""),
                AuditTrail::new(),
                None,
                None,
            )
            .await
            .unwrap();

        assert!(details.success);
        assert!(matches!(response, Response::Void));
    }
}
