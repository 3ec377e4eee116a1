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

//! Record types for a Zipkin-style distributed trace span store.
//!
//! These correspond to the v1 Zipkin wire model: `Span`s identified by 64-bit trace/span IDs,
//! carrying timed `Annotation`s (`cs`/`cr`/`sr`/`ss` and friends) and typed `BinaryAnnotation`s.
//! `QueryRequest` and `DependencyLink` round out the types a span store's read path produces and
//! consumes.
//!
//! # Serialization
//!
//! If the `serde` Cargo feature is enabled, `Annotation`, `BinaryAnnotation`, `Endpoint`, and
//! `Span` implement `Serialize` and `Deserialize` in the standard Zipkin v1 JSON format.
#![doc(html_root_url = "https://docs.rs/zipkin-types/0.4")]
#![warn(missing_docs)]

#[cfg(feature = "serde")]
#[macro_use]
extern crate serde;

use std::error::Error;
use std::fmt;

#[doc(inline)]
pub use annotation::Annotation;
#[doc(inline)]
pub use binary_annotation::BinaryAnnotation;
#[doc(inline)]
pub use dependency::DependencyLink;
#[doc(inline)]
pub use endpoint::Endpoint;
#[doc(inline)]
pub use query::QueryRequest;
#[doc(inline)]
pub use span::Span;

pub mod annotation;
pub mod binary_annotation;
pub mod dependency;
pub mod endpoint;
pub mod query;
pub mod span;

/// An error constructing a record type from a builder with missing or invalid fields.
///
/// Builders in this crate are fallible rather than panicking, since the values they assemble
/// usually originate from untrusted wire data rather than handwritten call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildError(pub(crate) &'static str);

impl fmt::Display for BuildError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(self.0)
    }
}

impl Error for BuildError {}
