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

//! The relational span store.
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};
use zipkin_storage::dependency_linker::link_dependencies;
use zipkin_storage::merge::merge_by_id;
use zipkin_storage::normalize::apply_timestamp_and_duration;
use zipkin_storage::query_matcher;
use zipkin_storage::skew::correct_clock_skew;
use zipkin_storage::{InMemoryStorage, SpanStore, StorageError};
use zipkin_types::binary_annotation::Type;
use zipkin_types::span::is_unnamed;
use zipkin_types::{Annotation, BinaryAnnotation, DependencyLink, Endpoint, QueryRequest, Span};

use crate::schema::{self, ANNOTATION_TYPE, CREATE_ANNOTATIONS_TABLE, CREATE_SPANS_TABLE};
use crate::SqlStorageConfig;

/// A relational implementation of [`SpanStore`], persisting spans across a `spans` table and an
/// `annotations` table and recomposing traces via joins.
///
/// Alongside the pool, `SqlStorage` keeps an [`InMemoryStorage`] as a write-through cache used
/// purely to refine the `duration` column's upsert policy: because a later report of a span may
/// carry a longer duration than an earlier one, the cache's already-merged view (the max of every
/// duration seen for that id) is what gets written, rather than re-deriving the max from a
/// read-modify-write against the database. The cache is updated before the write transaction
/// commits, so it is allowed to run ahead of durable state; nothing reads it for correctness,
/// only for this hint.
pub struct SqlStorage {
    pool: PgPool,
    cache: InMemoryStorage,
}

impl SqlStorage {
    /// Connects to the database described by `config`, building a pool via
    /// [`PgPoolOptions`].
    pub async fn connect(config: &SqlStorageConfig) -> Result<SqlStorage, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.dsn)
            .await
            .map_err(StorageError::from)?;
        Ok(SqlStorage {
            pool,
            cache: InMemoryStorage::new(),
        })
    }

    /// Wraps an already-constructed pool, for callers that manage pool lifecycle themselves (for
    /// example, the `#[sqlx::test]` harness).
    pub fn from_pool(pool: PgPool) -> SqlStorage {
        SqlStorage {
            pool,
            cache: InMemoryStorage::new(),
        }
    }

    /// Creates the `spans` and `annotations` tables if they do not already exist.
    ///
    /// This is a convenience for tests and prototyping, not a migration tool; production
    /// deployments are expected to run their own migrations against the same column shapes.
    pub async fn bootstrap_schema(&self) -> Result<(), StorageError> {
        sqlx::query(CREATE_SPANS_TABLE)
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;
        sqlx::query(CREATE_ANNOTATIONS_TABLE)
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(())
    }

    async fn fetch_spans(&self, trace_ids: &[i64]) -> Result<Vec<Vec<Span>>, StorageError> {
        if trace_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut span_query = QueryBuilder::<Postgres>::new(
            "SELECT trace_id, id, parent_id, name, start_ts, duration, debug FROM spans WHERE trace_id IN (",
        );
        {
            let mut separated = span_query.separated(", ");
            for trace_id in trace_ids {
                separated.push_bind(trace_id);
            }
        }
        span_query.push(")");
        let span_rows = span_query
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;

        let mut by_key: HashMap<(i64, i64), zipkin_types::span::Builder> = HashMap::new();
        let mut order: HashMap<i64, Vec<i64>> = HashMap::new();

        for row in span_rows {
            let trace_id: i64 = row.try_get("trace_id").map_err(StorageError::from)?;
            let id: i64 = row.try_get("id").map_err(StorageError::from)?;
            let parent_id: Option<i64> = row.try_get("parent_id").map_err(StorageError::from)?;
            let name: String = row.try_get("name").map_err(StorageError::from)?;
            let start_ts: Option<i64> = row.try_get("start_ts").map_err(StorageError::from)?;
            let duration: Option<i64> = row.try_get("duration").map_err(StorageError::from)?;
            let debug: Option<bool> = row.try_get("debug").map_err(StorageError::from)?;

            let mut builder = Span::builder();
            builder.trace_id(trace_id).id(id);
            if let Some(parent_id) = parent_id {
                builder.parent_id(parent_id);
            }
            if !is_unnamed(&name) {
                builder.name(&name);
            }
            if let Some(start_ts) = start_ts {
                builder.timestamp(start_ts);
            }
            if let Some(duration) = duration {
                builder.duration(duration);
            }
            if let Some(debug) = debug {
                builder.debug(debug);
            }

            order.entry(trace_id).or_default().push(id);
            by_key.insert((trace_id, id), builder);
        }

        let mut ann_query = QueryBuilder::<Postgres>::new(
            "SELECT trace_id, span_id, a_key, a_value, a_type, a_timestamp, \
             endpoint_service_name, endpoint_ipv4, endpoint_port FROM annotations WHERE trace_id IN (",
        );
        {
            let mut separated = ann_query.separated(", ");
            for trace_id in trace_ids {
                separated.push_bind(trace_id);
            }
        }
        ann_query.push(")");
        let ann_rows = ann_query
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;

        for row in ann_rows {
            let trace_id: i64 = row.try_get("trace_id").map_err(StorageError::from)?;
            let span_id: i64 = row.try_get("span_id").map_err(StorageError::from)?;
            let key: String = row.try_get("a_key").map_err(StorageError::from)?;
            let value: Option<Vec<u8>> = row.try_get("a_value").map_err(StorageError::from)?;
            let a_type: i32 = row.try_get("a_type").map_err(StorageError::from)?;
            let timestamp: i64 = row.try_get("a_timestamp").map_err(StorageError::from)?;
            let endpoint_service: Option<String> =
                row.try_get("endpoint_service_name").map_err(StorageError::from)?;
            let endpoint_ipv4: Option<i32> =
                row.try_get("endpoint_ipv4").map_err(StorageError::from)?;
            let endpoint_port: Option<i16> =
                row.try_get("endpoint_port").map_err(StorageError::from)?;

            let endpoint = endpoint_service.map(|service_name| {
                let mut builder = Endpoint::builder();
                builder.service_name(&service_name);
                if let Some(ipv4) = endpoint_ipv4 {
                    builder.ipv4(ipv4);
                }
                if let Some(port) = endpoint_port {
                    builder.port(port);
                }
                builder
                    .build()
                    .expect("service name was read from a non-null column")
            });

            let builder = match by_key.get_mut(&(trace_id, span_id)) {
                Some(builder) => builder,
                None => {
                    return Err(StorageError::StorageCorrupt(format!(
                        "annotation references missing span ({trace_id}, {span_id})"
                    )))
                }
            };

            if a_type == ANNOTATION_TYPE {
                builder.annotation(Annotation::new(timestamp, &key, endpoint));
            } else {
                let ty = schema::binary_type_from_code(a_type).ok_or_else(|| {
                    StorageError::StorageCorrupt(format!("unrecognized a_type {a_type}"))
                })?;
                let value = value.unwrap_or_default();
                let mut ba_builder = BinaryAnnotation::builder();
                if let Some(endpoint) = endpoint {
                    ba_builder.endpoint(endpoint);
                }
                let ba = match ty {
                    Type::Bool => ba_builder.bool(&key, value.first().copied().unwrap_or(0) != 0),
                    Type::String => {
                        ba_builder.string(&key, &String::from_utf8_lossy(&value))
                    }
                    Type::Bytes => ba_builder.bytes(&key, value),
                    Type::I16 => ba_builder.i16(&key, be_bytes(&value)),
                    Type::I32 => ba_builder.i32(&key, be_bytes(&value)),
                    Type::I64 => ba_builder.i64(&key, be_bytes(&value)),
                    Type::Double => {
                        ba_builder.double(&key, f64::from_be_bytes(pad(&value)))
                    }
                };
                builder.binary_annotation(ba);
            }
        }

        let mut traces = Vec::with_capacity(trace_ids.len());
        for trace_id in trace_ids {
            let ids = match order.get(trace_id) {
                Some(ids) => ids,
                None => continue,
            };
            let mut spans: Vec<Span> = ids
                .iter()
                .filter_map(|id| by_key.remove(&(*trace_id, *id)))
                .map(|b| {
                    b.build()
                        .expect("trace_id and id were set from a non-null primary key")
                })
                .collect();
            spans.sort_by(zipkin_types::span::cmp_within_trace);
            traces.push(spans);
        }
        Ok(traces)
    }
}

fn be_bytes<T>(bytes: &[u8]) -> T
where
    T: BeBytes,
{
    T::from_be(bytes)
}

trait BeBytes {
    fn from_be(bytes: &[u8]) -> Self;
}

impl BeBytes for i16 {
    fn from_be(bytes: &[u8]) -> i16 {
        let mut buf = [0u8; 2];
        let n = bytes.len().min(2);
        buf[2 - n..].copy_from_slice(&bytes[bytes.len() - n..]);
        i16::from_be_bytes(buf)
    }
}

impl BeBytes for i32 {
    fn from_be(bytes: &[u8]) -> i32 {
        let mut buf = [0u8; 4];
        let n = bytes.len().min(4);
        buf[4 - n..].copy_from_slice(&bytes[bytes.len() - n..]);
        i32::from_be_bytes(buf)
    }
}

impl BeBytes for i64 {
    fn from_be(bytes: &[u8]) -> i64 {
        let mut buf = [0u8; 8];
        let n = bytes.len().min(8);
        buf[8 - n..].copy_from_slice(&bytes[bytes.len() - n..]);
        i64::from_be_bytes(buf)
    }
}

fn pad(bytes: &[u8]) -> [u8; 8] {
    let mut buf = [0u8; 8];
    let n = bytes.len().min(8);
    buf[8 - n..].copy_from_slice(&bytes[bytes.len() - n..]);
    buf
}

fn now_micros() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as i64)
        .unwrap_or(0)
}

fn endpoint_columns(endpoint: Option<&Endpoint>) -> (Option<String>, Option<i32>, Option<i16>) {
    match endpoint {
        Some(endpoint) => (
            Some(endpoint.service_name().to_string()),
            Some(endpoint.ipv4()),
            endpoint.port(),
        ),
        None => (None, None, None),
    }
}

#[async_trait]
impl SpanStore for SqlStorage {
    async fn accept(&self, spans: Vec<Span>) -> Result<(), StorageError> {
        if spans.is_empty() {
            return Ok(());
        }
        let spans: Vec<Span> = spans.into_iter().map(apply_timestamp_and_duration).collect();

        self.cache.accept(spans.clone()).await?;

        let mut tx = self.pool.begin().await.map_err(StorageError::from)?;

        for span in &spans {
            let cached_duration = self
                .cache
                .get_trace(span.trace_id())
                .await?
                .and_then(|trace| {
                    trace
                        .into_iter()
                        .find(|s| s.id() == span.id())
                        .and_then(|s| s.duration())
                })
                .or_else(|| span.duration());

            sqlx::query(
                "INSERT INTO spans (trace_id, id, parent_id, name, start_ts, duration, debug)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)
                 ON CONFLICT (trace_id, id) DO UPDATE SET
                   name = CASE WHEN $4 <> '' AND $4 <> 'unknown' THEN $4 ELSE spans.name END,
                   start_ts = COALESCE($5, spans.start_ts),
                   duration = COALESCE($6, spans.duration)",
            )
            .bind(span.trace_id())
            .bind(span.id())
            .bind(span.parent_id())
            .bind(span.name().unwrap_or(""))
            .bind(span.timestamp())
            .bind(cached_duration)
            .bind(span.debug())
            .execute(&mut *tx)
            .await
            .map_err(StorageError::from)?;

            for annotation in span.annotations() {
                let (service, ipv4, port) = endpoint_columns(annotation.endpoint());
                sqlx::query(
                    "INSERT INTO annotations
                       (trace_id, span_id, a_key, a_value, a_type, a_timestamp,
                        endpoint_service_name, endpoint_ipv4, endpoint_port)
                     VALUES ($1, $2, $3, NULL, $4, $5, $6, $7, $8)
                     ON CONFLICT (trace_id, span_id, a_key, a_timestamp) DO NOTHING",
                )
                .bind(span.trace_id())
                .bind(span.id())
                .bind(annotation.value())
                .bind(ANNOTATION_TYPE)
                .bind(annotation.timestamp())
                .bind(service)
                .bind(ipv4)
                .bind(port)
                .execute(&mut *tx)
                .await
                .map_err(StorageError::from)?;
            }

            for binary in span.binary_annotations() {
                let (service, ipv4, port) = endpoint_columns(binary.endpoint());
                let timestamp = span.timestamp().unwrap_or(0).max(now_micros());
                sqlx::query(
                    "INSERT INTO annotations
                       (trace_id, span_id, a_key, a_value, a_type, a_timestamp,
                        endpoint_service_name, endpoint_ipv4, endpoint_port)
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                     ON CONFLICT (trace_id, span_id, a_key, a_timestamp) DO NOTHING",
                )
                .bind(span.trace_id())
                .bind(span.id())
                .bind(binary.key())
                .bind(binary.value())
                .bind(schema::binary_type_code(binary.ty()))
                .bind(timestamp)
                .bind(service)
                .bind(ipv4)
                .bind(port)
                .execute(&mut *tx)
                .await
                .map_err(StorageError::from)?;
            }
        }

        tx.commit().await.map_err(StorageError::from)?;
        log::debug!("committed a batch of {} spans", spans.len());
        Ok(())
    }

    async fn get_traces(&self, request: &QueryRequest) -> Result<Vec<Vec<Span>>, StorageError> {
        let (start, end) = request.micros_window();
        let max_duration = request.max_duration().unwrap_or(i64::MAX);

        let mut query = QueryBuilder::<Postgres>::new(
            "SELECT spans.trace_id, MAX(spans.start_ts) AS start_ts FROM spans
             JOIN annotations ON spans.trace_id = annotations.trace_id
                              AND spans.id = annotations.span_id",
        );

        for (i, name) in request.annotations().iter().enumerate() {
            let alias = format!("a{i}");
            query.push(format!(
                " JOIN annotations {alias} ON spans.trace_id = {alias}.trace_id \
                  AND spans.id = {alias}.span_id AND {alias}.a_type = "
            ));
            query.push_bind(ANNOTATION_TYPE);
            query.push(format!(" AND {alias}.a_key = "));
            query.push_bind(name);
        }
        for (i, (key, value)) in request.binary_annotations().iter().enumerate() {
            let alias = format!("b{i}");
            query.push(format!(
                " JOIN annotations {alias} ON spans.trace_id = {alias}.trace_id \
                  AND spans.id = {alias}.span_id AND {alias}.a_type = "
            ));
            query.push_bind(schema::binary_type_code(Type::String));
            query.push(format!(" AND {alias}.a_key = "));
            query.push_bind(key);
            query.push(format!(" AND {alias}.a_value = "));
            query.push_bind(value.as_bytes().to_vec());
        }

        query.push(" WHERE annotations.endpoint_service_name = ");
        query.push_bind(request.service_name().to_string());
        query.push(" AND spans.start_ts BETWEEN ");
        query.push_bind(start);
        query.push(" AND ");
        query.push_bind(end);

        if let Some(span_name) = request.span_name() {
            query.push(" AND spans.name = ");
            query.push_bind(span_name.to_string());
        }
        if request.min_duration().is_some() || request.max_duration().is_some() {
            query.push(" AND spans.duration BETWEEN ");
            query.push_bind(request.min_duration().unwrap_or(0));
            query.push(" AND ");
            query.push_bind(max_duration);
        }

        query.push(" GROUP BY spans.trace_id ORDER BY MAX(spans.start_ts) DESC LIMIT ");
        query.push_bind(request.limit() as i64);

        let rows = query
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;
        let trace_ids: Vec<i64> = rows
            .into_iter()
            .map(|row| row.try_get::<i64, _>("trace_id"))
            .collect::<Result<_, _>>()
            .map_err(StorageError::from)?;

        let mut traces: Vec<Vec<Span>> = self
            .fetch_spans(&trace_ids)
            .await?
            .into_iter()
            .map(|raw| correct_clock_skew(merge_by_id(raw)))
            .filter(|trace| query_matcher::matches(request, trace))
            .collect();
        traces.sort_by(|a, b| zipkin_types::span::cmp_traces_by_root(&a[0], &b[0]));
        Ok(traces)
    }

    async fn get_trace(&self, trace_id: i64) -> Result<Option<Vec<Span>>, StorageError> {
        let traces = self.fetch_spans(&[trace_id]).await?;
        Ok(traces
            .into_iter()
            .next()
            .map(|raw| correct_clock_skew(merge_by_id(raw))))
    }

    async fn get_raw_trace(&self, trace_id: i64) -> Result<Option<Vec<Span>>, StorageError> {
        let traces = self.fetch_spans(&[trace_id]).await?;
        Ok(traces.into_iter().next())
    }

    async fn get_service_names(&self) -> Result<Vec<String>, StorageError> {
        let rows = sqlx::query(
            "SELECT DISTINCT endpoint_service_name FROM annotations \
             WHERE endpoint_service_name IS NOT NULL AND endpoint_service_name <> ''",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::from)?;
        let mut names: Vec<String> = rows
            .into_iter()
            .map(|row| row.try_get::<String, _>("endpoint_service_name"))
            .collect::<Result<_, _>>()
            .map_err(StorageError::from)?;
        names.sort();
        Ok(names)
    }

    async fn get_span_names(&self, service_name: &str) -> Result<Vec<String>, StorageError> {
        let service_name = service_name.to_ascii_lowercase();
        let rows = sqlx::query(
            "SELECT DISTINCT spans.name FROM spans
             JOIN annotations ON spans.trace_id = annotations.trace_id AND spans.id = annotations.span_id
             WHERE annotations.endpoint_service_name = $1 AND spans.name <> ''",
        )
        .bind(service_name)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::from)?;
        let mut names: Vec<String> = rows
            .into_iter()
            .map(|row| row.try_get::<String, _>("name"))
            .collect::<Result<_, _>>()
            .map_err(StorageError::from)?;
        names.sort();
        Ok(names)
    }

    async fn get_dependencies(
        &self,
        end_ts: i64,
        lookback: Option<i64>,
    ) -> Result<Vec<DependencyLink>, StorageError> {
        let end = end_ts.saturating_mul(1_000);
        let start = match lookback {
            Some(lookback) => end_ts.saturating_sub(lookback).saturating_mul(1_000),
            None => i64::MIN,
        };

        // A coarse SQL-level prefilter: any trace entirely outside the window can be dropped
        // before the (potentially skew-shifting) merge. The definitive root-timestamp check,
        // matching `InMemoryStorage::get_dependencies`, happens below once the full trace is
        // reconstructed — a trace can contain spans outside the window while its root is inside
        // it, or vice versa, so this prefilter must stay a superset, never the final answer.
        let rows = sqlx::query(
            "SELECT DISTINCT trace_id FROM spans WHERE start_ts IS NULL OR start_ts BETWEEN $1 AND $2",
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::from)?;
        let trace_ids: Vec<i64> = rows
            .into_iter()
            .map(|row| row.try_get::<i64, _>("trace_id"))
            .collect::<Result<_, _>>()
            .map_err(StorageError::from)?;

        let traces: Vec<Vec<Span>> = self
            .fetch_spans(&trace_ids)
            .await?
            .into_iter()
            .map(|raw| correct_clock_skew(merge_by_id(raw)))
            .filter(|trace| {
                trace
                    .first()
                    .and_then(Span::timestamp)
                    .is_some_and(|ts| ts >= start && ts <= end)
            })
            .collect();

        Ok(link_dependencies(traces.iter().map(Vec::as_slice)))
    }
}
