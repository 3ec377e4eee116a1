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

//! Deriving service-to-service call edges from reconstructed traces.
use std::collections::HashMap;
use zipkin_types::annotation::{CLIENT_SEND, ERROR, SERVER_RECV};
use zipkin_types::binary_annotation::{CLIENT_ADDR, SERVER_ADDR};
use zipkin_types::{DependencyLink, Span};

/// Aggregates [`DependencyLink`]s across a collection of traces (each a list of merged spans).
///
/// Each span is classified as a server span (it has an `sr` annotation; its caller is named by
/// the nearest ancestor's `sr`/`ca`/`cs`-derived service), a client-only observation (it has an
/// `sa` binary annotation but no `sr`, with the client side named by `ca` or, failing that, `cs`),
/// or a local span (none of the above, skipped but not pruned: its children's parent resolution
/// walks past it). Spans with `parent_id == id` are ignored outright, as are traces with fewer
/// than two extractable endpoints.
pub fn link_dependencies<'a>(traces: impl IntoIterator<Item = &'a [Span]>) -> Vec<DependencyLink> {
    let mut links: HashMap<(String, String), DependencyLink> = HashMap::new();

    for trace in traces {
        link_trace(trace, &mut links);
    }

    let mut result: Vec<_> = links.into_values().collect();
    result.sort_by(|a, b| a.parent().cmp(b.parent()).then_with(|| a.child().cmp(b.child())));
    result
}

struct SpanInfo {
    parent_id: Option<i64>,
    ca_service: Option<String>,
    sa_service: Option<String>,
    sr_service: Option<String>,
    cs_service: Option<String>,
    is_error: bool,
}

fn extract(span: &Span) -> SpanInfo {
    let ca_service = span
        .binary_annotations()
        .iter()
        .find(|b| b.key() == CLIENT_ADDR)
        .and_then(|b| b.endpoint())
        .map(|e| e.service_name().to_string());
    let sa_service = span
        .binary_annotations()
        .iter()
        .find(|b| b.key() == SERVER_ADDR)
        .and_then(|b| b.endpoint())
        .map(|e| e.service_name().to_string());
    let sr_service = span
        .annotations()
        .iter()
        .find(|a| a.value() == SERVER_RECV)
        .and_then(|a| a.endpoint())
        .map(|e| e.service_name().to_string());
    let cs_service = span
        .annotations()
        .iter()
        .find(|a| a.value() == CLIENT_SEND)
        .and_then(|a| a.endpoint())
        .map(|e| e.service_name().to_string());
    let is_error = span.annotations().iter().any(|a| a.value() == ERROR)
        || span.binary_annotations().iter().any(|b| b.key() == ERROR);

    SpanInfo {
        parent_id: span.parent_id().filter(|&p| p != span.id()),
        ca_service,
        sa_service,
        sr_service,
        cs_service,
        is_error,
    }
}

fn link_trace(trace: &[Span], links: &mut HashMap<(String, String), DependencyLink>) {
    let infos: HashMap<i64, SpanInfo> = trace.iter().map(|s| (s.id(), extract(s))).collect();

    for span in trace {
        let info = &infos[&span.id()];

        let (edge, is_error) = match &info.sr_service {
            Some(sr_service) => {
                let parent_service = resolve_parent_service(info.parent_id, &infos)
                    .or_else(|| info.ca_service.clone());
                match parent_service {
                    Some(parent) if parent != *sr_service => {
                        (Some((parent, sr_service.clone())), info.is_error)
                    }
                    _ => (None, info.is_error),
                }
            }
            None => {
                let client_service = info.ca_service.clone().or_else(|| info.cs_service.clone());
                match (client_service, &info.sa_service) {
                    (Some(client), Some(sa)) if client != *sa => {
                        (Some((client, sa.clone())), info.is_error)
                    }
                    _ => (None, info.is_error),
                }
            }
        };

        if let Some((parent, child)) = edge {
            links
                .entry((parent.clone(), child.clone()))
                .or_insert_with(|| DependencyLink::new(&parent, &child))
                .record_call(is_error);
        }
    }
}

/// Walks up through local spans (no `sr`/`ca`/`cs`) to find the nearest ancestor that names a
/// service, so a local span in the middle of a call chain does not break edge reconstruction.
fn resolve_parent_service(parent_id: Option<i64>, infos: &HashMap<i64, SpanInfo>) -> Option<String> {
    let mut current = parent_id;
    let mut visited = std::collections::HashSet::new();
    while let Some(id) = current {
        if !visited.insert(id) {
            return None;
        }
        let info = infos.get(&id)?;
        if let Some(sr) = &info.sr_service {
            return Some(sr.clone());
        }
        if let Some(ca) = &info.ca_service {
            return Some(ca.clone());
        }
        if let Some(cs) = &info.cs_service {
            return Some(cs.clone());
        }
        current = info.parent_id;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use zipkin_types::annotation::{CLIENT_SEND, SERVER_SEND};
    use zipkin_types::{Annotation, BinaryAnnotation, Endpoint};

    fn ep(name: &str) -> Endpoint {
        Endpoint::builder().service_name(name).build().unwrap()
    }

    #[test]
    fn links_server_span_to_its_client_address_parent() {
        let app1 = Span::builder()
            .trace_id(1)
            .id(1)
            .annotation(Annotation::new(100, CLIENT_SEND, Some(ep("app1"))))
            .annotation(Annotation::new(400, "cr", Some(ep("app1"))))
            .build()
            .unwrap();
        let app2 = Span::builder()
            .trace_id(1)
            .id(2)
            .parent_id(1)
            .annotation(Annotation::new(110, SERVER_RECV, Some(ep("app2"))))
            .annotation(Annotation::new(390, SERVER_SEND, Some(ep("app2"))))
            .build()
            .unwrap();
        let db = Span::builder()
            .trace_id(1)
            .id(3)
            .parent_id(2)
            .annotation(Annotation::new(200, CLIENT_SEND, Some(ep("app2"))))
            .binary_annotation(
                BinaryAnnotation::builder()
                    .endpoint(ep("db"))
                    .string(SERVER_ADDR, "db"),
            )
            .build()
            .unwrap();

        let trace = vec![app1, app2, db];
        let links = link_dependencies(vec![trace.as_slice()]);

        assert_eq!(links.len(), 2);
        assert_eq!(links[0].parent(), "app1");
        assert_eq!(links[0].child(), "app2");
        assert_eq!(links[0].call_count(), 1);
        assert_eq!(links[1].parent(), "app2");
        assert_eq!(links[1].child(), "db");
        assert_eq!(links[1].call_count(), 1);
    }

    #[test]
    fn self_parented_span_is_ignored() {
        let span = Span::builder()
            .trace_id(1)
            .id(1)
            .parent_id(1)
            .annotation(Annotation::new(1, SERVER_RECV, Some(ep("a"))))
            .build()
            .unwrap();
        let trace = vec![span];
        let links = link_dependencies(vec![trace.as_slice()]);
        assert!(links.is_empty());
    }

    #[test]
    fn error_annotation_increments_error_count() {
        let parent = Span::builder()
            .trace_id(1)
            .id(1)
            .binary_annotation(
                BinaryAnnotation::builder().endpoint(ep("a")).string(CLIENT_ADDR, "a"),
            )
            .build()
            .unwrap();
        let child = Span::builder()
            .trace_id(1)
            .id(2)
            .parent_id(1)
            .annotation(Annotation::new(1, SERVER_RECV, Some(ep("b"))))
            .annotation(Annotation::new(2, ERROR, None))
            .build()
            .unwrap();

        let trace = vec![parent, child];
        let links = link_dependencies(vec![trace.as_slice()]);
        assert_eq!(links[0].call_count(), 1);
        assert_eq!(links[0].error_count(), 1);
    }
}
