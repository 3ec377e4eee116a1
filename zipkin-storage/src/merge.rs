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

//! Combining partially-reported copies of the same span into one.
use crate::normalize::apply_timestamp_and_duration;
use std::collections::HashMap;
use zipkin_types::span::{self, is_unnamed};
use zipkin_types::{Annotation, BinaryAnnotation, Span};

/// Combines possibly-duplicate reports of the same `(trace_id, id)` into one span per id.
///
/// Field precedence for spans sharing an id:
/// - `name`: the first non-empty, non-`"unknown"` value in iteration order.
/// - `timestamp`: the minimum of the defined values.
/// - `duration`: the maximum of the defined values.
/// - `debug`: the logical OR of the defined values.
/// - `parent_id`: the first non-null value.
/// - `annotations`/`binary_annotations`: the union, deduplicated and sorted as
///   [`zipkin_types::span::Builder::build`] already does.
///
/// Once fields are combined, [`apply_timestamp_and_duration`] runs once more over the merged
/// span and its now-complete annotation union: a `duration` that stayed unset because no single
/// reporter's own annotations spanned the full range can still be derived once every reporter's
/// annotations are combined (a client that only saw `cs` and a server that only saw `sr`/`ss`/`cr`
/// together cover a wider interval than either saw alone).
///
/// The result is ordered by `(timestamp asc, id asc)` with unset timestamps sorting first.
pub fn merge_by_id(spans: impl IntoIterator<Item = Span>) -> Vec<Span> {
    let mut merged: HashMap<i64, MergeState> = HashMap::new();
    let mut order: Vec<i64> = Vec::new();

    for span in spans {
        match merged.get_mut(&span.id()) {
            Some(state) => state.merge(span),
            None => {
                order.push(span.id());
                merged.insert(span.id(), MergeState::new(span));
            }
        }
    }

    let mut result: Vec<Span> = order
        .into_iter()
        .map(|id| merged.remove(&id).unwrap().finish())
        .collect();
    result.sort_by(span::cmp_within_trace);
    result
}

struct MergeState {
    trace_id: i64,
    id: i64,
    parent_id: Option<i64>,
    name: Option<String>,
    timestamp: Option<i64>,
    duration: Option<i64>,
    debug: bool,
    debug_set: bool,
    annotations: Vec<Annotation>,
    binary_annotations: Vec<BinaryAnnotation>,
}

impl MergeState {
    fn new(span: Span) -> MergeState {
        let mut state = MergeState {
            trace_id: span.trace_id(),
            id: span.id(),
            parent_id: None,
            name: None,
            timestamp: None,
            duration: None,
            debug: false,
            debug_set: false,
            annotations: Vec::new(),
            binary_annotations: Vec::new(),
        };
        state.merge(span);
        state
    }

    fn merge(&mut self, span: Span) {
        if self.parent_id.is_none() {
            self.parent_id = span.parent_id();
        }
        if self.name.is_none() {
            if let Some(name) = span.name() {
                if !is_unnamed(name) {
                    self.name = Some(name.to_string());
                }
            }
        }
        self.timestamp = min_opt(self.timestamp, span.timestamp());
        self.duration = max_opt(self.duration, span.duration());
        if let Some(debug) = span.debug() {
            self.debug = self.debug || debug;
            self.debug_set = true;
        }
        self.annotations.extend(span.annotations().iter().cloned());
        self.binary_annotations
            .extend(span.binary_annotations().iter().cloned());
    }

    fn finish(self) -> Span {
        let mut builder = Span::builder();
        builder.trace_id(self.trace_id).id(self.id);
        if let Some(parent_id) = self.parent_id {
            builder.parent_id(parent_id);
        }
        if let Some(name) = &self.name {
            builder.name(name);
        }
        if let Some(timestamp) = self.timestamp {
            builder.timestamp(timestamp);
        }
        if let Some(duration) = self.duration {
            builder.duration(duration);
        }
        if self.debug_set {
            builder.debug(self.debug);
        }
        dedup_annotations(&mut self.annotations.clone())
            .into_iter()
            .for_each(|a| {
                builder.annotation(a);
            });
        dedup_binary_annotations(&mut self.binary_annotations.clone())
            .into_iter()
            .for_each(|b| {
                builder.binary_annotation(b);
            });
        let span = builder
            .build()
            .expect("trace_id and id are always set from the source spans");
        apply_timestamp_and_duration(span)
    }
}

fn min_opt(a: Option<i64>, b: Option<i64>) -> Option<i64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}

fn max_opt(a: Option<i64>, b: Option<i64>) -> Option<i64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}

fn dedup_annotations(annotations: &mut Vec<Annotation>) -> Vec<Annotation> {
    let mut seen = std::collections::HashSet::new();
    let mut result = Vec::with_capacity(annotations.len());
    for a in annotations.drain(..) {
        let key = (
            a.timestamp(),
            a.value().to_string(),
            a.endpoint().cloned(),
        );
        if seen.insert(key) {
            result.push(a);
        }
    }
    result
}

fn dedup_binary_annotations(annotations: &mut Vec<BinaryAnnotation>) -> Vec<BinaryAnnotation> {
    let mut seen = std::collections::HashSet::new();
    let mut result = Vec::with_capacity(annotations.len());
    for b in annotations.drain(..) {
        let key = (
            b.key().to_string(),
            b.value().to_vec(),
            b.ty(),
            b.endpoint().cloned(),
        );
        if seen.insert(key) {
            result.push(b);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use zipkin_types::Endpoint;

    fn ep(name: &str) -> Endpoint {
        Endpoint::builder().service_name(name).build().unwrap()
    }

    #[test]
    fn merges_spans_sharing_an_id_with_field_precedence() {
        let a = Span::builder()
            .trace_id(2)
            .id(2)
            .annotation(Annotation::new(200, "cs", Some(ep("a"))))
            .build()
            .unwrap();
        let b = Span::builder()
            .trace_id(2)
            .id(2)
            .name("call")
            .annotation(Annotation::new(210, "sr", Some(ep("b"))))
            .annotation(Annotation::new(260, "ss", Some(ep("b"))))
            .annotation(Annotation::new(270, "cr", Some(ep("a"))))
            .build()
            .unwrap();

        let merged = merge_by_id(vec![a, b]);
        assert_eq!(merged.len(), 1);
        let span = &merged[0];
        assert_eq!(span.name(), Some("call"));
        assert_eq!(span.annotations().len(), 4);
    }

    #[test]
    fn duration_is_rederived_from_the_full_merged_annotation_span() {
        // Neither reporter's own annotations span the full 200..270 range, so duration only
        // becomes derivable once both copies' annotations are unioned.
        let a = Span::builder()
            .trace_id(2)
            .id(2)
            .annotation(Annotation::new(200, "cs", Some(ep("a"))))
            .build()
            .unwrap();
        let b = Span::builder()
            .trace_id(2)
            .id(2)
            .name("call")
            .annotation(Annotation::new(210, "sr", Some(ep("b"))))
            .annotation(Annotation::new(260, "ss", Some(ep("b"))))
            .annotation(Annotation::new(270, "cr", Some(ep("a"))))
            .build()
            .unwrap();

        let merged = merge_by_id(vec![a, b]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].timestamp(), Some(200));
        assert_eq!(merged[0].duration(), Some(70));
    }

    #[test]
    fn merge_is_idempotent() {
        let a = Span::builder()
            .trace_id(1)
            .id(1)
            .name("get")
            .timestamp(100)
            .annotation(Annotation::new(100, "sr", Some(ep("web"))))
            .build()
            .unwrap();

        let once = merge_by_id(vec![a.clone()]);
        let twice = merge_by_id(merge_by_id(vec![a.clone(), a]));
        assert_eq!(once, twice);
    }

    #[test]
    fn unnamed_copy_never_overrides_a_named_copy() {
        let named = Span::builder().trace_id(1).id(1).name("get").build().unwrap();
        let unnamed = Span::builder().trace_id(1).id(1).build().unwrap();

        let merged = merge_by_id(vec![unnamed, named]);
        assert_eq!(merged[0].name(), Some("get"));
    }

    #[test]
    fn distinct_ids_remain_distinct_and_are_ordered_by_timestamp() {
        let a = Span::builder().trace_id(1).id(1).timestamp(200).build().unwrap();
        let b = Span::builder().trace_id(1).id(2).timestamp(100).build().unwrap();

        let merged = merge_by_id(vec![a, b]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].id(), 2);
        assert_eq!(merged[1].id(), 1);
    }
}
