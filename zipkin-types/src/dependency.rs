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

//! Service dependency edges.

/// A directed edge between two services derived from the spans of one or more traces, with the
/// number of calls observed and how many of those calls were marked as errors.
///
/// Produced by the dependency linker; `parent` and `child` are always lowercase service names.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct DependencyLink {
    parent: String,
    child: String,
    call_count: i64,
    error_count: i64,
}

impl DependencyLink {
    /// Creates a new link with a zero call and error count.
    pub fn new(parent: &str, child: &str) -> DependencyLink {
        DependencyLink {
            parent: parent.to_string(),
            child: child.to_string(),
            call_count: 0,
            error_count: 0,
        }
    }

    /// Returns the upstream service name.
    pub fn parent(&self) -> &str {
        &self.parent
    }

    /// Returns the downstream service name.
    pub fn child(&self) -> &str {
        &self.child
    }

    /// Returns the number of calls observed from `parent` to `child`.
    pub fn call_count(&self) -> i64 {
        self.call_count
    }

    /// Returns how many of those calls were marked as errors.
    pub fn error_count(&self) -> i64 {
        self.error_count
    }

    /// Records one additional call, and one additional error if `is_error` is set.
    pub fn record_call(&mut self, is_error: bool) {
        self.call_count += 1;
        if is_error {
            self.error_count += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_call_tracks_errors_separately() {
        let mut link = DependencyLink::new("web", "db");
        link.record_call(false);
        link.record_call(true);
        assert_eq!(link.call_count(), 2);
        assert_eq!(link.error_count(), 1);
    }
}
