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

//! Spans.
use crate::{Annotation, BinaryAnnotation, BuildError};
use std::cmp::Ordering;

/// A `Span` represents a single operation over some range of time.
///
/// Multiple spans make up a single "trace" of a distributed computation, and spans can be
/// nested. A new trace is created with a "root" span, and subsections of that computation are
/// recorded in individual spans.
///
/// For spans tracing a remote service call, two records will typically be generated, one from
/// the client and the other from the server, sharing the same `(trace_id, id)`. Each carries its
/// own annotations; the store merges them together by id rather than requiring a single writer to
/// have the full picture.
///
/// A span is uniquely identified by `(trace_id, id)`: two `Span` values sharing that pair are
/// considered duplicate reports of the same operation, not distinct spans.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct Span {
    trace_id: i64,
    id: i64,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    parent_id: Option<i64>,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    name: Option<String>,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    timestamp: Option<i64>,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    duration: Option<i64>,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    debug: Option<bool>,
    #[cfg_attr(
        feature = "serde",
        serde(skip_serializing_if = "Vec::is_empty", default)
    )]
    annotations: Vec<Annotation>,
    #[cfg_attr(
        feature = "serde",
        serde(skip_serializing_if = "Vec::is_empty", default)
    )]
    binary_annotations: Vec<BinaryAnnotation>,
}

/// Returns `true` if `name` should be treated as "no name" for merge precedence: empty or the
/// literal placeholder `"unknown"`.
pub fn is_unnamed(name: &str) -> bool {
    name.is_empty() || name == "unknown"
}

impl Span {
    /// Returns a builder used to construct a `Span`.
    #[inline]
    pub fn builder() -> Builder {
        Builder {
            trace_id: None,
            id: None,
            parent_id: None,
            name: None,
            timestamp: None,
            duration: None,
            debug: None,
            annotations: vec![],
            binary_annotations: vec![],
        }
    }

    /// The randomly generated, unique identifier for a trace, set on all spans within it.
    #[inline]
    pub fn trace_id(&self) -> i64 {
        self.trace_id
    }

    /// The unique identifier for this operation within the trace.
    #[inline]
    pub fn id(&self) -> i64 {
        self.id
    }

    /// The parent span id, or `None` if this is the root span in a trace.
    #[inline]
    pub fn parent_id(&self) -> Option<i64> {
        self.parent_id
    }

    /// The logical operation this span represents, already lowercased.
    ///
    /// Absent, empty, and `"unknown"` are all treated as "no name" for merge purposes; see
    /// [`is_unnamed`].
    #[inline]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The microsecond timestamp of the start of the span, when known.
    #[inline]
    pub fn timestamp(&self) -> Option<i64> {
        self.timestamp
    }

    /// The duration of the span in microseconds, when known.
    #[inline]
    pub fn duration(&self) -> Option<i64> {
        self.duration
    }

    /// Whether this span was flagged for forced sampling.
    #[inline]
    pub fn debug(&self) -> Option<bool> {
        self.debug
    }

    /// The annotations recorded on this span, sorted by `(timestamp asc, value asc)`.
    #[inline]
    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    /// The binary annotations recorded on this span, sorted by `key asc`.
    #[inline]
    pub fn binary_annotations(&self) -> &[BinaryAnnotation] {
        &self.binary_annotations
    }

    /// Returns the set of distinct, lowercase service names mentioned by this span's annotation
    /// and binary annotation endpoints.
    pub fn service_names(&self) -> impl Iterator<Item = &str> {
        self.annotations
            .iter()
            .filter_map(|a| a.endpoint())
            .chain(self.binary_annotations.iter().filter_map(|b| b.endpoint()))
            .map(|e| e.service_name())
    }

    /// Returns the ordering key used to sort spans within a trace: `(timestamp asc, id asc)`,
    /// with a missing timestamp sorting first.
    pub fn order_key(&self) -> (Option<i64>, i64) {
        (self.timestamp, self.id)
    }
}

/// Orders spans by `(timestamp asc, id asc)` with `None` timestamps sorting first. This is the
/// order spans within a single trace are always returned in.
pub fn cmp_within_trace(a: &Span, b: &Span) -> Ordering {
    a.order_key().cmp(&b.order_key())
}

/// Orders two traces by their root span's `(timestamp desc, id desc)` — the order distinct traces
/// are returned in, most recent first. `root` is expected to be the first span of each trace once
/// sorted by [`cmp_within_trace`].
pub fn cmp_traces_by_root(a_root: &Span, b_root: &Span) -> Ordering {
    cmp_within_trace(a_root, b_root).reverse()
}

/// A builder for `Span`s.
pub struct Builder {
    trace_id: Option<i64>,
    id: Option<i64>,
    parent_id: Option<i64>,
    name: Option<String>,
    timestamp: Option<i64>,
    duration: Option<i64>,
    debug: Option<bool>,
    annotations: Vec<Annotation>,
    binary_annotations: Vec<BinaryAnnotation>,
}

impl From<Span> for Builder {
    #[inline]
    fn from(s: Span) -> Builder {
        Builder {
            trace_id: Some(s.trace_id),
            id: Some(s.id),
            parent_id: s.parent_id,
            name: s.name,
            timestamp: s.timestamp,
            duration: s.duration,
            debug: s.debug,
            annotations: s.annotations,
            binary_annotations: s.binary_annotations,
        }
    }
}

impl Builder {
    /// Sets the trace id of the span.
    #[inline]
    pub fn trace_id(&mut self, trace_id: i64) -> &mut Builder {
        self.trace_id = Some(trace_id);
        self
    }

    /// Sets the id of the span.
    #[inline]
    pub fn id(&mut self, id: i64) -> &mut Builder {
        self.id = Some(id);
        self
    }

    /// Sets the id of the span's parent.
    ///
    /// Defaults to `None`.
    #[inline]
    pub fn parent_id(&mut self, parent_id: i64) -> &mut Builder {
        self.parent_id = Some(parent_id);
        self
    }

    /// Sets the name of the span.
    ///
    /// The name is lowercased, so callers never need to normalize case before searching by span
    /// name. Defaults to `None`.
    #[inline]
    pub fn name(&mut self, name: &str) -> &mut Builder {
        self.name = Some(name.to_ascii_lowercase());
        self
    }

    /// Sets the microsecond timestamp of the span.
    ///
    /// Defaults to `None`; left unset, it may be inferred from annotations by normalization.
    #[inline]
    pub fn timestamp(&mut self, timestamp: i64) -> &mut Builder {
        self.timestamp = Some(timestamp);
        self
    }

    /// Sets the duration of the span in microseconds.
    ///
    /// Defaults to `None`; left unset, it may be inferred from annotations by normalization.
    #[inline]
    pub fn duration(&mut self, duration: i64) -> &mut Builder {
        self.duration = Some(duration);
        self
    }

    /// Sets the debug flag of the span.
    #[inline]
    pub fn debug(&mut self, debug: bool) -> &mut Builder {
        self.debug = Some(debug);
        self
    }

    /// Adds an annotation to the span.
    #[inline]
    pub fn annotation(&mut self, annotation: Annotation) -> &mut Builder {
        self.annotations.push(annotation);
        self
    }

    /// Adds multiple annotations to the span.
    #[inline]
    pub fn annotations<I>(&mut self, annotations: I) -> &mut Builder
    where
        I: IntoIterator<Item = Annotation>,
    {
        self.annotations.extend(annotations);
        self
    }

    /// Adds a binary annotation to the span.
    #[inline]
    pub fn binary_annotation(&mut self, binary_annotation: BinaryAnnotation) -> &mut Builder {
        self.binary_annotations.push(binary_annotation);
        self
    }

    /// Adds multiple binary annotations to the span.
    #[inline]
    pub fn binary_annotations<I>(&mut self, binary_annotations: I) -> &mut Builder
    where
        I: IntoIterator<Item = BinaryAnnotation>,
    {
        self.binary_annotations.extend(binary_annotations);
        self
    }

    /// Constructs a `Span`.
    ///
    /// Annotations are sorted by `(timestamp asc, value asc)` and binary annotations by `key asc`
    /// at construction time, matching the canonical ordering stored spans are expected to have.
    ///
    /// # Errors
    ///
    /// Returns an error if `trace_id` or `id` was not set.
    #[inline]
    pub fn build(&self) -> Result<Span, BuildError> {
        let mut annotations = self.annotations.clone();
        annotations.sort_by(|a, b| {
            a.timestamp()
                .cmp(&b.timestamp())
                .then_with(|| a.value().cmp(b.value()))
        });

        let mut binary_annotations = self.binary_annotations.clone();
        binary_annotations.sort_by(|a, b| a.key().cmp(b.key()));

        Ok(Span {
            trace_id: self.trace_id.ok_or(BuildError("trace id not set"))?,
            id: self.id.ok_or(BuildError("span id not set"))?,
            parent_id: self.parent_id,
            name: self.name.clone(),
            timestamp: self.timestamp,
            duration: self.duration,
            debug: self.debug,
            annotations,
            binary_annotations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Endpoint;

    fn ep(name: &str) -> Endpoint {
        Endpoint::builder().service_name(name).build().unwrap()
    }

    #[test]
    fn builder_requires_trace_id_and_id() {
        assert!(Span::builder().build().is_err());
        assert!(Span::builder().trace_id(1).build().is_err());
        assert!(Span::builder().id(1).build().is_err());
        assert!(Span::builder().trace_id(1).id(1).build().is_ok());
    }

    #[test]
    fn build_sorts_annotations_and_binary_annotations() {
        let span = Span::builder()
            .trace_id(1)
            .id(1)
            .annotation(Annotation::new(200, "b", None))
            .annotation(Annotation::new(100, "a", None))
            .binary_annotation(BinaryAnnotation::builder().string("z", "1"))
            .binary_annotation(BinaryAnnotation::builder().string("a", "1"))
            .build()
            .unwrap();
        assert_eq!(span.annotations()[0].value(), "a");
        assert_eq!(span.annotations()[1].value(), "b");
        assert_eq!(span.binary_annotations()[0].key(), "a");
        assert_eq!(span.binary_annotations()[1].key(), "z");
    }

    #[test]
    fn name_is_lowercased() {
        let span = Span::builder()
            .trace_id(1)
            .id(1)
            .name("GetUser")
            .build()
            .unwrap();
        assert_eq!(span.name(), Some("getuser"));
    }

    #[test]
    fn is_unnamed_matches_empty_and_unknown() {
        assert!(is_unnamed(""));
        assert!(is_unnamed("unknown"));
        assert!(!is_unnamed("get"));
    }

    #[test]
    fn service_names_union_annotation_and_binary_endpoints() {
        let span = Span::builder()
            .trace_id(1)
            .id(1)
            .annotation(Annotation::new(1, "sr", Some(ep("web"))))
            .binary_annotation(BinaryAnnotation::builder().string("ca", "x"))
            .build()
            .unwrap();
        let names: Vec<_> = span.service_names().collect();
        assert_eq!(names, vec!["web"]);
    }

    #[test]
    fn cmp_within_trace_orders_by_timestamp_then_id() {
        let a = Span::builder().trace_id(1).id(1).timestamp(100).build().unwrap();
        let b = Span::builder().trace_id(1).id(2).timestamp(50).build().unwrap();
        let c = Span::builder().trace_id(1).id(0).build().unwrap();
        let mut v = vec![a.clone(), b.clone(), c.clone()];
        v.sort_by(cmp_within_trace);
        assert_eq!(v, vec![c, b, a]);
    }
}
