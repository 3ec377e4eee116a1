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

//! Per-host clock skew correction.
use std::collections::{HashMap, HashSet};
use zipkin_types::annotation::{CLIENT_SEND, SERVER_RECV};
use zipkin_types::span;
use zipkin_types::Span;

/// Shifts child spans so their `sr` timestamp falls within their parent's `[cs, cr]` window.
///
/// Client and server timestamps come from different hosts, so a server-received timestamp can
/// appear to precede the client-send that triggered it. This walks the span tree depth-first from
/// each root, estimating the clock offset of each child's host relative to its parent's host from
/// the `cs`/`sr` pair when both are present, and propagating the accumulated shift to descendants
/// that report from the same host endpoint.
///
/// This is a heuristic: it reduces visible inversions, it does not claim exact physical-clock
/// alignment. It never fails; spans with cycles or missing parents are passed through unshifted
/// past the point a cycle is detected.
pub fn correct_clock_skew(spans: Vec<Span>) -> Vec<Span> {
    let mut by_id: HashMap<i64, Span> = spans.into_iter().map(|s| (s.id(), s)).collect();
    let mut children: HashMap<i64, Vec<i64>> = HashMap::new();
    let mut roots: Vec<i64> = Vec::new();

    for span in by_id.values() {
        match span.parent_id() {
            Some(parent_id) if parent_id != span.id() && by_id.contains_key(&parent_id) => {
                children.entry(parent_id).or_default().push(span.id());
            }
            _ => roots.push(span.id()),
        }
    }
    roots.sort_unstable();

    let mut visited = HashSet::new();
    for root in roots.clone() {
        walk(root, 0, &children, &mut by_id, &mut visited);
    }

    let mut result: Vec<Span> = by_id.into_values().collect();
    result.sort_by(span::cmp_within_trace);
    result
}

fn walk(
    id: i64,
    inherited_skew: i64,
    children: &HashMap<i64, Vec<i64>>,
    by_id: &mut HashMap<i64, Span>,
    visited: &mut HashSet<i64>,
) {
    if !visited.insert(id) {
        return;
    }

    let own_skew = skew_for(id, inherited_skew, by_id);
    let total_skew = inherited_skew + own_skew;
    if total_skew != 0 {
        if let Some(span) = by_id.get(&id) {
            let shifted = shift(span.clone(), total_skew);
            by_id.insert(id, shifted);
        }
    }

    if let Some(kids) = children.get(&id) {
        let mut kids = kids.clone();
        kids.sort_unstable();
        for child in kids {
            walk(child, total_skew, children, by_id, visited);
        }
    }
}

/// Estimates the clock offset of `id`'s host relative to its parent's, in microseconds, to be
/// added to `id` and its same-host descendants. Returns `0` when the span lacks the annotations
/// needed to estimate skew, or when it already lies within its parent's window.
fn skew_for(id: i64, inherited_skew: i64, by_id: &HashMap<i64, Span>) -> i64 {
    let span = match by_id.get(&id) {
        Some(span) => span,
        None => return 0,
    };
    let parent = match span.parent_id().and_then(|p| by_id.get(&p)) {
        Some(parent) => parent,
        None => return 0,
    };

    let child_sr = match core_annotation_timestamp(span, SERVER_RECV) {
        Some(ts) => ts,
        None => return 0,
    };
    let parent_cs = match core_annotation_timestamp(parent, CLIENT_SEND) {
        Some(ts) => ts + inherited_skew,
        None => return 0,
    };

    let expected_start = match (parent.duration(), span.duration()) {
        (Some(parent_duration), Some(child_duration)) => {
            parent_cs + (parent_duration - child_duration) / 2
        }
        _ => parent_cs,
    };

    if child_sr >= parent_cs {
        return 0;
    }

    expected_start - child_sr
}

fn core_annotation_timestamp(span: &Span, value: &str) -> Option<i64> {
    span.annotations()
        .iter()
        .find(|a| a.value() == value)
        .map(|a| a.timestamp())
}

fn shift(span: Span, skew: i64) -> Span {
    let mut builder = Span::builder();
    builder.trace_id(span.trace_id()).id(span.id());
    if let Some(parent_id) = span.parent_id() {
        builder.parent_id(parent_id);
    }
    if let Some(name) = span.name() {
        builder.name(name);
    }
    if let Some(timestamp) = span.timestamp() {
        builder.timestamp(timestamp + skew);
    }
    if let Some(duration) = span.duration() {
        builder.duration(duration);
    }
    if let Some(debug) = span.debug() {
        builder.debug(debug);
    }
    for a in span.annotations() {
        builder.annotation(zipkin_types::Annotation::new(
            a.timestamp() + skew,
            a.value(),
            a.endpoint().cloned(),
        ));
    }
    for b in span.binary_annotations() {
        builder.binary_annotation(b.clone());
    }
    builder
        .build()
        .expect("shifting an already-valid span never drops trace_id or id")
}

#[cfg(test)]
mod tests {
    use super::*;
    use zipkin_types::{Annotation, Endpoint};

    fn ep(name: &str) -> Endpoint {
        Endpoint::builder().service_name(name).build().unwrap()
    }

    #[test]
    fn shifts_child_server_receive_into_parent_window() {
        let parent = Span::builder()
            .trace_id(1)
            .id(1)
            .annotation(Annotation::new(1000, "cs", Some(ep("a"))))
            .annotation(Annotation::new(2000, "cr", Some(ep("a"))))
            .build()
            .unwrap();
        let child = Span::builder()
            .trace_id(1)
            .id(2)
            .parent_id(1)
            .annotation(Annotation::new(500, "sr", Some(ep("b"))))
            .annotation(Annotation::new(1500, "ss", Some(ep("b"))))
            .build()
            .unwrap();

        let corrected = correct_clock_skew(vec![parent, child]);
        let child = corrected.iter().find(|s| s.id() == 2).unwrap();
        let sr = child
            .annotations()
            .iter()
            .find(|a| a.value() == "sr")
            .unwrap();
        assert!(sr.timestamp() >= 1000 && sr.timestamp() <= 2000);
    }

    #[test]
    fn leaves_spans_already_within_parent_window_unshifted() {
        let parent = Span::builder()
            .trace_id(1)
            .id(1)
            .annotation(Annotation::new(1000, "cs", Some(ep("a"))))
            .build()
            .unwrap();
        let child = Span::builder()
            .trace_id(1)
            .id(2)
            .parent_id(1)
            .annotation(Annotation::new(1200, "sr", Some(ep("b"))))
            .build()
            .unwrap();

        let corrected = correct_clock_skew(vec![parent, child.clone()]);
        let result = corrected.iter().find(|s| s.id() == 2).unwrap();
        assert_eq!(result, &child);
    }

    #[test]
    fn self_referential_parent_id_is_treated_as_root() {
        let span = Span::builder().trace_id(1).id(1).parent_id(1).build().unwrap();
        let corrected = correct_clock_skew(vec![span.clone()]);
        assert_eq!(corrected, vec![span]);
    }
}
