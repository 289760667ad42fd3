//! # Targets
//!
//! A `Target` describes one reachable worker process. Many bindings may
//! resolve to the same target; identity is the worker id alone.

use std::collections::BTreeMap;
use std::hash::Hash;
use std::hash::Hasher;

use serde::Deserialize;
use serde::Serialize;

use crate::transport::Address;

/// One protocol endpoint exposed by a worker.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub protocol: String,
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(protocol: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            protocol: protocol.into(),
            host: host.into(),
            port,
        }
    }

    pub fn address(&self) -> Address {
        Address {
            host: self.host.clone(),
            port: self.port,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Target {
    pub worker_id: String,
    pub host: String,
    pub environment: String,
    pub endpoints: Vec<Endpoint>,
    /// Serialization format codes the worker can decode.
    pub formats: Vec<String>,
    #[serde(default)]
    pub extensions: BTreeMap<String, String>,
}

impl Target {
    pub fn new(
        worker_id: impl Into<String>,
        host: impl Into<String>,
        environment: impl Into<String>,
    ) -> Self {
        Self {
            worker_id: worker_id.into(),
            host: host.into(),
            environment: environment.into(),
            ..Default::default()
        }
    }

    pub fn with_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoints.push(endpoint);
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.formats.push(format.into());
        self
    }

    pub fn with_extension(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extensions.insert(key.into(), value.into());
        self
    }

    pub fn supports_protocol(&self, protocol: &str) -> bool {
        self.endpoints.iter().any(|e| e.protocol == protocol)
    }

    pub fn supports_format(&self, format: &str) -> bool {
        self.formats.iter().any(|f| f == format)
    }
}

impl PartialEq for Target {
    fn eq(&self, other: &Self) -> bool {
        self.worker_id == other.worker_id
    }
}

impl Eq for Target {}

impl Hash for Target {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.worker_id.hash(state);
    }
}

/// Static identity of the current process, taken from configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct WorkerIdentity {
    pub id: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_environment")]
    pub environment: String,
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
    #[serde(default)]
    pub extensions: BTreeMap<String, String>,
}

fn default_host() -> String {
    "localhost".into()
}

fn default_environment() -> String {
    "default".into()
}

impl WorkerIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            host: default_host(),
            environment: default_environment(),
            endpoints: Vec::new(),
            extensions: BTreeMap::new(),
        }
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    pub fn with_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoints.push(endpoint);
        self
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_equality_is_by_worker_id() {
        let a = Target::new("w1", "10.0.0.1", "prod").with_format("json");
        let b = Target::new("w1", "10.0.0.2", "staging");
        assert_eq!(a, b);

        let set: HashSet<Target> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_supports_protocol_and_format() {
        let t = Target::new("w1", "h", "prod")
            .with_endpoint(Endpoint::new("grpc", "h", 9000))
            .with_format("json");
        assert!(t.supports_protocol("grpc"));
        assert!(!t.supports_protocol("http"));
        assert!(t.supports_format("json"));
        assert_eq!(t.endpoints[0].address().to_string(), "h:9000");
    }
}
