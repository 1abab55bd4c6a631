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

//! The request/response serializer: an external collaborator, consumed
//! only by [`crate::response::ResponseBuilder`]'s `Typed` path.

/// Turns bytes into a `T` and back. A pure configuration object from the
/// pipeline's point of view; the core never inspects field/index/type-name
/// mapping rules, it only calls through this trait.
pub trait Serializer<T>: Send + Sync {
    /// The error type this serializer's failures are reported as.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Deserialize `bytes` into a `T`.
    fn deserialize(&self, bytes: &[u8]) -> Result<T, Self::Error>;

    /// Serialize `value` into bytes, for request bodies.
    fn serialize(&self, value: &T) -> Result<Vec<u8>, Self::Error>;
}

/// A serializer that never succeeds; used as a type witness in contexts
/// that only ever request `ResponseKind::String`/`Bytes`/`Void`/`Stream`
/// and therefore never actually invoke a serializer.
#[derive(Debug, Default)]
pub struct NoopSerializer;

/// The error type of [`NoopSerializer`]; constructing one is always a bug.
#[derive(Debug, thiserror::Error)]
#[error("NoopSerializer cannot deserialize or serialize anything")]
pub struct NoopSerializerError;

impl<T> Serializer<T> for NoopSerializer {
    type Error = NoopSerializerError;

    fn deserialize(&self, _bytes: &[u8]) -> Result<T, Self::Error> {
        Err(NoopSerializerError)
    }

    fn serialize(&self, _value: &T) -> Result<Vec<u8>, Self::Error> {
        Err(NoopSerializerError)
    }
}

#[cfg(feature = "serde")]
mod json {
    use std::marker::PhantomData;

    use serde::de::DeserializeOwned;
    use serde::Serialize;

    use super::Serializer;

    /// A `Serializer` backed by `serde_json`, for callers whose typed
    /// response bodies are JSON documents.
    pub struct JsonSerializer<T>(PhantomData<fn() -> T>);

    impl<T> Default for JsonSerializer<T> {
        fn default() -> Self {
            Self(PhantomData)
        }
    }

    impl<T: DeserializeOwned + Serialize> Serializer<T> for JsonSerializer<T> {
        type Error = serde_json::Error;

        fn deserialize(&self, bytes: &[u8]) -> Result<T, Self::Error> {
            serde_json::from_slice(bytes)
        }

        fn serialize(&self, value: &T) -> Result<Vec<u8>, Self::Error> {
            serde_json::to_vec(value)
        }
    }
}

#[cfg(feature = "serde")]
pub use json::JsonSerializer;
