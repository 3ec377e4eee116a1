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

//! The two-table schema this store reads and writes.
//!
//! This crate does not own schema migrations for a production deployment; these statements exist
//! so the crate's own integration tests, and anyone prototyping against a scratch database, can
//! stand up the schema without a separate migration tool.

/// `a_type` value denoting a regular (non-binary) annotation row.
pub const ANNOTATION_TYPE: i32 = -1;

/// Creates the `spans` table if it does not already exist.
pub const CREATE_SPANS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS spans (
    trace_id BIGINT NOT NULL,
    id BIGINT NOT NULL,
    parent_id BIGINT,
    name TEXT NOT NULL DEFAULT '',
    start_ts BIGINT,
    duration BIGINT,
    debug BOOLEAN,
    PRIMARY KEY (trace_id, id)
)";

/// Creates the `annotations` table if it does not already exist.
///
/// `a_type` is [`ANNOTATION_TYPE`] (`-1`) for a regular annotation row, or a
/// [`zipkin_types::binary_annotation::Type`] discriminant (`>= 0`) for a binary annotation row.
pub const CREATE_ANNOTATIONS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS annotations (
    trace_id BIGINT NOT NULL,
    span_id BIGINT NOT NULL,
    a_key TEXT NOT NULL,
    a_value BYTEA,
    a_type INTEGER NOT NULL,
    a_timestamp BIGINT NOT NULL,
    endpoint_service_name TEXT,
    endpoint_ipv4 INTEGER,
    endpoint_port SMALLINT,
    PRIMARY KEY (trace_id, span_id, a_key, a_timestamp)
)";

/// Returns the discriminant a [`zipkin_types::binary_annotation::Type`] is stored as in
/// `annotations.a_type`.
pub fn binary_type_code(ty: zipkin_types::binary_annotation::Type) -> i32 {
    use zipkin_types::binary_annotation::Type;
    match ty {
        Type::Bool => 0,
        Type::String => 1,
        Type::Bytes => 2,
        Type::I16 => 3,
        Type::I32 => 4,
        Type::I64 => 5,
        Type::Double => 6,
    }
}

/// Decodes a `annotations.a_type` discriminant back into a
/// [`zipkin_types::binary_annotation::Type`]. Returns `None` for [`ANNOTATION_TYPE`] or any
/// unrecognized code, which the caller treats as storage corruption.
pub fn binary_type_from_code(code: i32) -> Option<zipkin_types::binary_annotation::Type> {
    use zipkin_types::binary_annotation::Type;
    match code {
        0 => Some(Type::Bool),
        1 => Some(Type::String),
        2 => Some(Type::Bytes),
        3 => Some(Type::I16),
        4 => Some(Type::I32),
        5 => Some(Type::I64),
        6 => Some(Type::Double),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_codes_round_trip() {
        use zipkin_types::binary_annotation::Type;
        for ty in [
            Type::Bool,
            Type::String,
            Type::Bytes,
            Type::I16,
            Type::I32,
            Type::I64,
            Type::Double,
        ] {
            assert_eq!(binary_type_from_code(binary_type_code(ty)), Some(ty));
        }
    }

    #[test]
    fn unrecognized_code_is_none() {
        assert_eq!(binary_type_from_code(ANNOTATION_TYPE), None);
        assert_eq!(binary_type_from_code(99), None);
    }
}
