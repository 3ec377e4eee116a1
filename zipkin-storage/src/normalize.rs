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

//! Timestamp and duration inference from annotations.
use zipkin_types::span;
use zipkin_types::Span;

/// Fills in a span's `timestamp` and `duration` from its annotations when they are absent.
///
/// If both fields are already set, or the span has no annotations, the span is returned
/// unchanged. Otherwise `timestamp` becomes the earliest annotation timestamp and `duration`
/// becomes the spread between the earliest and latest annotation timestamps, when that spread is
/// nonzero.
///
/// This never fails: malformed input is passed through best-effort.
pub fn apply_timestamp_and_duration(span: Span) -> Span {
    if span.timestamp().is_some() && span.duration().is_some() {
        return span;
    }
    if span.annotations().is_empty() {
        return span;
    }

    let timestamp_unset = span.timestamp().is_none();
    let duration_unset = span.duration().is_none();

    let mut first = i64::MAX;
    let mut last = i64::MIN;
    for annotation in span.annotations() {
        first = first.min(annotation.timestamp());
        last = last.max(annotation.timestamp());
    }

    let mut builder = span::Builder::from(span);
    if timestamp_unset {
        builder.timestamp(first);
    }
    if duration_unset && last > first {
        builder.duration(last - first);
    }
    builder
        .build()
        .expect("a span rebuilt from a valid span always has trace_id and id set")
}
