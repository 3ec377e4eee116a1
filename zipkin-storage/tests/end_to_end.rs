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

//! End-to-end scenarios against [`InMemoryStorage`] directly, no network or database involved.
use zipkin_storage::{InMemoryStorage, SpanStore};
use zipkin_types::{Annotation, BinaryAnnotation, Endpoint, QueryRequest, Span};

fn ep(name: &str) -> Endpoint {
    Endpoint::builder().service_name(name).build().unwrap()
}

#[tokio::test]
async fn clock_skew_correction_shifts_child_into_parent_window() {
    let store = InMemoryStorage::new();
    let parent = Span::builder()
        .trace_id(1)
        .id(1)
        .annotation(Annotation::new(1_000, "cs", Some(ep("a"))))
        .annotation(Annotation::new(2_000, "cr", Some(ep("a"))))
        .build()
        .unwrap();
    let child = Span::builder()
        .trace_id(1)
        .id(2)
        .parent_id(1)
        .annotation(Annotation::new(500, "sr", Some(ep("b"))))
        .annotation(Annotation::new(1_500, "ss", Some(ep("b"))))
        .build()
        .unwrap();
    store.accept(vec![parent, child]).await.unwrap();

    let trace = store.get_trace(1).await.unwrap().unwrap();
    let child = trace.iter().find(|s| s.id() == 2).unwrap();
    let sr = child
        .annotations()
        .iter()
        .find(|a| a.value() == "sr")
        .unwrap();
    assert!(sr.timestamp() >= 1_000 && sr.timestamp() <= 2_000);
}

#[tokio::test]
async fn raw_trace_is_unmerged_while_get_trace_merges() {
    let store = InMemoryStorage::new();
    let first = Span::builder()
        .trace_id(9)
        .id(9)
        .annotation(Annotation::new(100, "cs", Some(ep("a"))))
        .build()
        .unwrap();
    let second = Span::builder()
        .trace_id(9)
        .id(9)
        .name("call")
        .annotation(Annotation::new(110, "sr", Some(ep("b"))))
        .build()
        .unwrap();
    store.accept(vec![first]).await.unwrap();
    store.accept(vec![second]).await.unwrap();

    let raw = store.get_raw_trace(9).await.unwrap().unwrap();
    assert_eq!(raw.len(), 2);

    let merged = store.get_trace(9).await.unwrap().unwrap();
    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].name(), Some("call"));
}

#[tokio::test]
async fn query_matches_through_different_spans_in_the_same_trace() {
    let store = InMemoryStorage::new();
    let root = Span::builder()
        .trace_id(11)
        .id(11)
        .timestamp(5_000)
        .annotation(Annotation::new(5_000, "sr", Some(ep("web"))))
        .build()
        .unwrap();
    let child = Span::builder()
        .trace_id(11)
        .id(12)
        .parent_id(11)
        .annotation(Annotation::new(5_100, "cache.miss", None))
        .binary_annotation(BinaryAnnotation::builder().string("http.path", "/x"))
        .build()
        .unwrap();
    store.accept(vec![root, child]).await.unwrap();

    let request = QueryRequest::builder()
        .service_name("web")
        .annotation("cache.miss")
        .binary_annotation("http.path", "/x")
        .end_ts(6)
        .lookback(3_600_000)
        .limit(10)
        .build()
        .unwrap();
    let traces = store.get_traces(&request).await.unwrap();
    assert_eq!(traces.len(), 1);
}

#[tokio::test]
async fn missing_trace_id_returns_none() {
    let store = InMemoryStorage::new();
    assert!(store.get_trace(404).await.unwrap().is_none());
    assert!(store.get_raw_trace(404).await.unwrap().is_none());
}

#[tokio::test]
async fn service_names_are_case_insensitive_at_write_and_query() {
    let store = InMemoryStorage::new();
    let span = Span::builder()
        .trace_id(20)
        .id(20)
        .timestamp(1)
        .annotation(Annotation::new(1, "sr", Some(ep("Web-Frontend"))))
        .build()
        .unwrap();
    store.accept(vec![span]).await.unwrap();

    assert_eq!(
        store.get_service_names().await.unwrap(),
        vec!["web-frontend"]
    );
    let request = QueryRequest::builder()
        .service_name("WEB-FRONTEND")
        .end_ts(1)
        .lookback(1)
        .limit(10)
        .build()
        .unwrap();
    assert_eq!(store.get_traces(&request).await.unwrap().len(), 1);
}
