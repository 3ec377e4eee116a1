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

//! Integration tests for the parts of the relational translation that cannot be exercised any
//! other way: the self-join query construction and the upsert-with-duration-refinement policy.
//! Each test gets a freshly created, migration-free database via `#[sqlx::test]`; the schema is
//! bootstrapped in-test since this crate does not ship a `migrations/` directory.
use sqlx::PgPool;
use zipkin_storage::SpanStore;
use zipkin_storage_sql::SqlStorage;
use zipkin_types::{Annotation, BinaryAnnotation, Endpoint, QueryRequest, Span};

fn ep(name: &str) -> Endpoint {
    Endpoint::builder().service_name(name).build().unwrap()
}

#[sqlx::test]
async fn round_trips_a_single_span(pool: PgPool) -> sqlx::Result<()> {
    let store = SqlStorage::from_pool(pool);
    store.bootstrap_schema().await.unwrap();

    let span = Span::builder()
        .trace_id(1)
        .id(1)
        .name("get")
        .timestamp(1_000)
        .duration(500)
        .annotation(Annotation::new(1_000, "sr", Some(ep("web"))))
        .annotation(Annotation::new(1_500, "ss", Some(ep("web"))))
        .build()
        .unwrap();
    store.accept(vec![span]).await.unwrap();

    let trace = store.get_trace(1).await.unwrap().unwrap();
    assert_eq!(trace.len(), 1);
    assert_eq!(trace[0].name(), Some("get"));
    assert_eq!(trace[0].duration(), Some(500));
    assert_eq!(store.get_service_names().await.unwrap(), vec!["web"]);
    assert_eq!(store.get_span_names("web").await.unwrap(), vec!["get"]);

    Ok(())
}

#[sqlx::test]
async fn a_later_report_refines_duration_upward(pool: PgPool) -> sqlx::Result<()> {
    let store = SqlStorage::from_pool(pool);
    store.bootstrap_schema().await.unwrap();

    let first = Span::builder()
        .trace_id(2)
        .id(2)
        .name("call")
        .timestamp(100)
        .duration(50)
        .build()
        .unwrap();
    store.accept(vec![first]).await.unwrap();

    let second = Span::builder()
        .trace_id(2)
        .id(2)
        .name("call")
        .timestamp(100)
        .duration(300)
        .build()
        .unwrap();
    store.accept(vec![second]).await.unwrap();

    let trace = store.get_trace(2).await.unwrap().unwrap();
    assert_eq!(trace[0].duration(), Some(300));

    Ok(())
}

#[sqlx::test]
async fn query_by_string_binary_annotation_uses_a_self_join(pool: PgPool) -> sqlx::Result<()> {
    let store = SqlStorage::from_pool(pool);
    store.bootstrap_schema().await.unwrap();

    let matching = Span::builder()
        .trace_id(3)
        .id(3)
        .timestamp(1_000)
        .annotation(Annotation::new(1_000, "sr", Some(ep("web"))))
        .binary_annotation(BinaryAnnotation::builder().string("http.path", "/x"))
        .build()
        .unwrap();
    let other = Span::builder()
        .trace_id(4)
        .id(4)
        .timestamp(1_000)
        .annotation(Annotation::new(1_000, "sr", Some(ep("web"))))
        .binary_annotation(BinaryAnnotation::builder().string("http.path", "/y"))
        .build()
        .unwrap();
    store.accept(vec![matching, other]).await.unwrap();

    let request = QueryRequest::builder()
        .service_name("web")
        .binary_annotation("http.path", "/x")
        .end_ts(2)
        .lookback(3_600_000)
        .limit(10)
        .build()
        .unwrap();
    let traces = store.get_traces(&request).await.unwrap();
    assert_eq!(traces.len(), 1);
    assert_eq!(traces[0][0].trace_id(), 3);

    Ok(())
}

#[sqlx::test]
async fn unknown_trace_id_is_none(pool: PgPool) -> sqlx::Result<()> {
    let store = SqlStorage::from_pool(pool);
    store.bootstrap_schema().await.unwrap();

    assert!(store.get_trace(999).await.unwrap().is_none());
    Ok(())
}
