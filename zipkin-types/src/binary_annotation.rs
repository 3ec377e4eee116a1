//  Copyright 2017 Palantir Technologies, Inc.
//
//  Licensed under the Apache License, Version 2.0 (the "License");
//  you may not use this file except in compliance with the License.
//  You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.

//! Binary annotations.
use crate::Endpoint;

/// The client address of an RPC, recorded as a binary annotation keyed `"ca"`.
pub const CLIENT_ADDR: &str = "ca";
/// The server address of an RPC, recorded as a binary annotation keyed `"sa"`.
pub const SERVER_ADDR: &str = "sa";

/// The wire type of a [`BinaryAnnotation`]'s value.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Type {
    /// A single boolean byte (`0` or `1`).
    Bool,
    /// UTF-8 encoded text.
    String,
    /// Opaque bytes with no further interpretation.
    Bytes,
    /// A big-endian `i16`.
    I16,
    /// A big-endian `i32`.
    I32,
    /// A big-endian `i64`.
    I64,
    /// A big-endian IEEE-754 `f64`.
    Double,
}

/// A `BinaryAnnotation` represents extra, typed information about a `Span`.
///
/// It consists of a key/value pair of information, a wire type describing how to interpret the
/// value bytes, and an optional `Endpoint` identifying the service the annotation describes.
///
/// Zipkin defines a handful of "standard" keys, including [`CLIENT_ADDR`] and [`SERVER_ADDR`],
/// which the dependency linker uses to recover call edges that the core RPC annotations alone
/// cannot express (e.g. a call into an uninstrumented downstream). Arbitrary user-defined keys are
/// also allowed and are only ever matched literally by query criteria.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct BinaryAnnotation {
    key: String,
    value: Vec<u8>,
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    ty: Type,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    endpoint: Option<Endpoint>,
}

impl BinaryAnnotation {
    /// Returns a builder used to construct a `BinaryAnnotation`.
    pub fn builder() -> Builder {
        Builder { endpoint: None }
    }

    /// Returns the binary annotation's key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the binary annotation's raw value bytes.
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Returns the value decoded as UTF-8 text, if the annotation's type is [`Type::String`].
    pub fn value_as_str(&self) -> Option<&str> {
        if self.ty == Type::String {
            std::str::from_utf8(&self.value).ok()
        } else {
            None
        }
    }

    /// Returns the wire type of the value.
    pub fn ty(&self) -> Type {
        self.ty
    }

    /// Returns the endpoint the binary annotation describes, if any.
    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.as_ref()
    }
}

/// A builder for `BinaryAnnotation`s.
pub struct Builder {
    endpoint: Option<Endpoint>,
}

impl Builder {
    /// Sets the endpoint associated with the binary annotation.
    ///
    /// Defaults to `None`.
    pub fn endpoint(&mut self, endpoint: Endpoint) -> &mut Builder {
        self.endpoint = Some(endpoint);
        self
    }

    /// Constructs a string-typed `BinaryAnnotation`.
    pub fn string(&mut self, key: &str, value: &str) -> BinaryAnnotation {
        self.build(key, value.as_bytes().to_vec(), Type::String)
    }

    /// Constructs a bool-typed `BinaryAnnotation`.
    pub fn bool(&mut self, key: &str, value: bool) -> BinaryAnnotation {
        self.build(key, vec![value as u8], Type::Bool)
    }

    /// Constructs a bytes-typed `BinaryAnnotation`.
    pub fn bytes(&mut self, key: &str, value: Vec<u8>) -> BinaryAnnotation {
        self.build(key, value, Type::Bytes)
    }

    /// Constructs an i16-typed `BinaryAnnotation`.
    pub fn i16(&mut self, key: &str, value: i16) -> BinaryAnnotation {
        self.build(key, value.to_be_bytes().to_vec(), Type::I16)
    }

    /// Constructs an i32-typed `BinaryAnnotation`.
    pub fn i32(&mut self, key: &str, value: i32) -> BinaryAnnotation {
        self.build(key, value.to_be_bytes().to_vec(), Type::I32)
    }

    /// Constructs an i64-typed `BinaryAnnotation`.
    pub fn i64(&mut self, key: &str, value: i64) -> BinaryAnnotation {
        self.build(key, value.to_be_bytes().to_vec(), Type::I64)
    }

    /// Constructs a double-typed `BinaryAnnotation`.
    pub fn double(&mut self, key: &str, value: f64) -> BinaryAnnotation {
        self.build(key, value.to_be_bytes().to_vec(), Type::Double)
    }

    fn build(&mut self, key: &str, value: Vec<u8>, ty: Type) -> BinaryAnnotation {
        BinaryAnnotation {
            key: key.to_string(),
            value,
            ty,
            endpoint: self.endpoint.take(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_round_trips() {
        let ba = BinaryAnnotation::builder().string("http.path", "/x");
        assert_eq!(ba.key(), "http.path");
        assert_eq!(ba.value_as_str(), Some("/x"));
        assert_eq!(ba.ty(), Type::String);
    }

    #[test]
    fn non_string_value_as_str_is_none() {
        let ba = BinaryAnnotation::builder().i32("retries", 3);
        assert_eq!(ba.value_as_str(), None);
    }
}
