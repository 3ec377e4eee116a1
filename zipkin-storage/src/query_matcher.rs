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

//! Evaluating a [`QueryRequest`] against a reconstructed trace.
use zipkin_types::binary_annotation::Type;
use zipkin_types::{QueryRequest, Span};

/// Returns whether `trace` (a list of merged spans belonging to one trace) satisfies every
/// criterion of `request`.
///
/// Query matching is total: a predicate over absent data (no root timestamp, no matching
/// annotation) simply evaluates to `false` rather than erroring. Matching is total across spans:
/// each atomic criterion (an annotation value, a binary annotation pair) may be satisfied by a
/// different span within the trace.
pub fn matches(request: &QueryRequest, trace: &[Span]) -> bool {
    if trace.is_empty() {
        return false;
    }

    if !root_timestamp_in_window(request, trace) {
        return false;
    }
    if !any_endpoint_service(trace, request.service_name()) {
        return false;
    }
    if let Some(span_name) = request.span_name() {
        if !trace.iter().any(|s| s.name() == Some(span_name)) {
            return false;
        }
    }
    for annotation in request.annotations() {
        if !trace
            .iter()
            .any(|s| s.annotations().iter().any(|a| a.value() == annotation))
        {
            return false;
        }
    }
    for (key, value) in request.binary_annotations() {
        if !trace.iter().any(|s| {
            s.binary_annotations().iter().any(|b| {
                b.ty() == Type::String && b.key() == key && b.value_as_str() == Some(value.as_str())
            })
        }) {
            return false;
        }
    }
    if request.min_duration().is_some() || request.max_duration().is_some() {
        let min = request.min_duration().unwrap_or(i64::MIN);
        let max = request.max_duration().unwrap_or(i64::MAX);
        let matches_duration = trace.iter().any(|s| {
            s.service_names().any(|n| n == request.service_name())
                && s.duration().is_some_and(|d| d >= min && d <= max)
        });
        if !matches_duration {
            return false;
        }
    }

    true
}

fn root_timestamp_in_window(request: &QueryRequest, trace: &[Span]) -> bool {
    let root = &trace[0];
    let timestamp = match root.timestamp() {
        Some(ts) => ts,
        None => return false,
    };
    let (start, end) = request.micros_window();
    timestamp >= start && timestamp <= end
}

fn any_endpoint_service(trace: &[Span], service_name: &str) -> bool {
    trace
        .iter()
        .any(|s| s.service_names().any(|n| n == service_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use zipkin_types::{Annotation, BinaryAnnotation, Endpoint};

    fn ep(name: &str) -> Endpoint {
        Endpoint::builder().service_name(name).build().unwrap()
    }

    fn trace() -> Vec<Span> {
        vec![Span::builder()
            .trace_id(1)
            .id(1)
            .name("get")
            .timestamp(5_000)
            .duration(200)
            .annotation(Annotation::new(5_000, "sr", Some(ep("web"))))
            .binary_annotation(BinaryAnnotation::builder().string("http.path", "/x"))
            .build()
            .unwrap()]
    }

    #[test]
    fn matches_on_service_name_and_window() {
        let request = QueryRequest::builder()
            .service_name("web")
            .end_ts(6)
            .lookback(10)
            .build()
            .unwrap();
        assert!(matches(&request, &trace()));
    }

    #[test]
    fn rejects_trace_outside_window() {
        let request = QueryRequest::builder()
            .service_name("web")
            .end_ts(1)
            .lookback(1)
            .build()
            .unwrap();
        assert!(!matches(&request, &trace()));
    }

    #[test]
    fn rejects_trace_missing_required_binary_annotation() {
        let request = QueryRequest::builder()
            .service_name("web")
            .binary_annotation("http.path", "/y")
            .end_ts(6)
            .lookback(10)
            .build()
            .unwrap();
        assert!(!matches(&request, &trace()));
    }

    #[test]
    fn root_with_no_timestamp_never_matches() {
        let request = QueryRequest::builder()
            .service_name("web")
            .end_ts(6)
            .lookback(10)
            .build()
            .unwrap();
        let trace = vec![Span::builder().trace_id(1).id(1).build().unwrap()];
        assert!(!matches(&request, &trace));
    }
}
