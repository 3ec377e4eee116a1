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

//! Endpoints.
use crate::BuildError;

/// An `Endpoint` identifies the network location of a node participating in a trace.
///
/// It consists of a lowercase service name, an IPv4 address, and an optional port. The service
/// name is lowercased at construction so that writes and queries agree regardless of the case
/// instrumentation happened to use.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct Endpoint {
    service_name: String,
    ipv4: i32,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    port: Option<i16>,
}

impl Endpoint {
    /// Returns a builder used to construct an `Endpoint`.
    #[inline]
    pub fn builder() -> Builder {
        Builder {
            service_name: None,
            ipv4: 0,
            port: None,
        }
    }

    /// Returns the lowercase name of the service at this endpoint.
    #[inline]
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Returns the IPv4 address of the service at this endpoint.
    #[inline]
    pub fn ipv4(&self) -> i32 {
        self.ipv4
    }

    /// Returns the port of the service at this endpoint, if known.
    #[inline]
    pub fn port(&self) -> Option<i16> {
        self.port
    }
}

/// A builder type for `Endpoint`s.
pub struct Builder {
    service_name: Option<String>,
    ipv4: i32,
    port: Option<i16>,
}

impl From<Endpoint> for Builder {
    #[inline]
    fn from(e: Endpoint) -> Builder {
        Builder {
            service_name: Some(e.service_name),
            ipv4: e.ipv4,
            port: e.port,
        }
    }
}

impl Builder {
    /// Sets the service name associated with the endpoint.
    ///
    /// The name is lowercased, matching the write/query normalization applied everywhere else in
    /// the store.
    #[inline]
    pub fn service_name(&mut self, service_name: &str) -> &mut Builder {
        self.service_name = Some(service_name.to_ascii_lowercase());
        self
    }

    /// Sets the IPv4 address associated with the endpoint.
    ///
    /// Defaults to `0`.
    #[inline]
    pub fn ipv4(&mut self, ipv4: i32) -> &mut Builder {
        self.ipv4 = ipv4;
        self
    }

    /// Sets the port associated with the endpoint.
    ///
    /// Defaults to `None`.
    #[inline]
    pub fn port(&mut self, port: i16) -> &mut Builder {
        self.port = Some(port);
        self
    }

    /// Constructs the `Endpoint`.
    ///
    /// # Errors
    ///
    /// Returns an error if no service name was set.
    #[inline]
    pub fn build(&self) -> Result<Endpoint, BuildError> {
        Ok(Endpoint {
            service_name: self
                .service_name
                .clone()
                .ok_or(BuildError("service name not set"))?,
            ipv4: self.ipv4,
            port: self.port,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_service_name() {
        let e = Endpoint::builder()
            .service_name("WEB-Frontend")
            .build()
            .unwrap();
        assert_eq!(e.service_name(), "web-frontend");
    }

    #[test]
    fn requires_service_name() {
        assert!(Endpoint::builder().ipv4(1).build().is_err());
    }
}
