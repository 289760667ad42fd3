//! Broker configuration.
//!
//! # Example
//!
//! ```json
//! {
//!   "worker": { "id": "worker-1", "host": "10.0.0.4", "environment": "prod" },
//!   "defaults": { "timeout_ms": 2000, "retries": 1 },
//!   "environment_priority": ["prod", "staging"],
//!   "static_services": [
//!     { "contract_id": "geo.lookup", "contract_version": "1",
//!       "service": "geo-legacy", "formats": ["json"] }
//!   ]
//! }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::error::Error;
use crate::error::Result;
use crate::id::BindingId;
use crate::target::WorkerIdentity;

fn default_timeout_ms() -> u64 {
    3000
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CallDefaults {
    /// Timeout of the remote leg in milliseconds (default: 3000).
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Retry budget; a call is attempted `retries + 1` times.
    #[serde(default)]
    pub retries: u32,
}

impl Default for CallDefaults {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            retries: 0,
        }
    }
}

impl CallDefaults {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// A service resolved through cluster membership instead of the registry.
///
/// Omitted implementation fields match any implementation of the contract.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StaticService {
    pub contract_id: String,
    pub contract_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implementation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implementation_version: Option<String>,
    /// Name the membership provider knows the service by.
    pub service: String,
    /// Formats the service's workers accept.
    #[serde(default)]
    pub formats: Vec<String>,
}

impl StaticService {
    pub fn matches(&self, binding: &BindingId) -> bool {
        self.contract_id == binding.contract.id
            && self.contract_version == binding.contract.version
            && self
                .implementation_id
                .as_ref()
                .is_none_or(|id| *id == binding.implementation)
            && self
                .implementation_version
                .as_ref()
                .is_none_or(|v| *v == binding.implementation_version)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrokerConfig {
    pub worker: WorkerIdentity,
    #[serde(default)]
    pub defaults: CallDefaults,
    /// Default environment preference for the balancer.
    #[serde(default)]
    pub environment_priority: Vec<String>,
    #[serde(default)]
    pub static_services: Vec<StaticService>,
}

impl BrokerConfig {
    /// Minimal configuration for a worker.
    pub fn for_worker(worker: WorkerIdentity) -> Self {
        Self {
            worker,
            ..Default::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.worker.id.trim().is_empty() {
            return Err(Error::Config("worker id must not be blank".into()));
        }
        for entry in &self.static_services {
            if entry.service.trim().is_empty() {
                return Err(Error::Config(format!(
                    "static service for {}@{} has a blank service name",
                    entry.contract_id, entry.contract_version
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::ContractId;

    #[test]
    fn test_parse_with_defaults() {
        let config = BrokerConfig::from_json(r#"{ "worker": { "id": "w1" } }"#).unwrap();
        assert_eq!(config.worker.id, "w1");
        assert_eq!(config.worker.environment, "default");
        assert_eq!(config.defaults.timeout(), Duration::from_millis(3000));
        assert_eq!(config.defaults.retries, 0);
        assert!(config.static_services.is_empty());
    }

    #[test]
    fn test_blank_worker_is_rejected() {
        let err = BrokerConfig::from_json(r#"{ "worker": { "id": "" } }"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_static_service_matching() {
        let entry = StaticService {
            contract_id: "geo".into(),
            contract_version: "1".into(),
            implementation_id: Some("legacy".into()),
            implementation_version: None,
            service: "geo-legacy".into(),
            formats: vec![],
        };
        let contract = ContractId::new("geo", "1");
        assert!(entry.matches(&BindingId::new(contract.clone(), "legacy", "7")));
        assert!(!entry.matches(&BindingId::new(contract, "modern", "7")));
        assert!(!entry.matches(&BindingId::new(ContractId::new("geo", "2"), "legacy", "7")));
    }
}
