//! # Identity types
//!
//! Value objects naming a logical service (`ContractId`) and one concrete
//! implementation of it (`BindingId`). Both are immutable once built and
//! order lexicographically, which gives registries a stable iteration order.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::error::Error;
use crate::error::Result;

/// Identifies a logical, versioned service interface.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContractId {
    pub id: String,
    pub version: String,
}

impl ContractId {
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
        }
    }

    /// Rejects blank identity fields.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::Config("contract id must not be blank".into()));
        }
        if self.version.trim().is_empty() {
            return Err(Error::Config(format!("contract '{}' has a blank version", self.id)));
        }
        Ok(())
    }
}

impl fmt::Display for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.version)
    }
}

/// Identifies one implementation bound to a contract.
///
/// The contract id doubles as the binding's back-reference to its contract.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BindingId {
    pub contract: ContractId,
    pub implementation: String,
    pub implementation_version: String,
}

impl BindingId {
    pub fn new(
        contract: ContractId,
        implementation: impl Into<String>,
        implementation_version: impl Into<String>,
    ) -> Self {
        Self {
            contract,
            implementation: implementation.into(),
            implementation_version: implementation_version.into(),
        }
    }

    pub fn contract(&self) -> &ContractId {
        &self.contract
    }

    pub fn validate(&self) -> Result<()> {
        self.contract.validate()?;
        if self.implementation.trim().is_empty() {
            return Err(Error::Config(format!("binding of {} has a blank implementation id", self.contract)));
        }
        if self.implementation_version.trim().is_empty() {
            return Err(Error::Config(format!(
                "binding '{}' of {} has a blank implementation version",
                self.implementation, self.contract
            )));
        }
        Ok(())
    }
}

impl fmt::Display for BindingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.contract, self.implementation, self.implementation_version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_formats() {
        let contract = ContractId::new("chat.complete", "1.0");
        let binding = BindingId::new(contract.clone(), "openai", "2");
        assert_eq!(contract.to_string(), "chat.complete@1.0");
        assert_eq!(binding.to_string(), "chat.complete@1.0/openai@2");
    }

    #[test]
    fn test_ordering_is_lexicographic() {
        let contract = ContractId::new("svc", "1");
        let a = BindingId::new(contract.clone(), "alpha", "1");
        let b = BindingId::new(contract, "beta", "1");
        assert!(a < b);
    }

    #[test]
    fn test_blank_fields_are_config_errors() {
        let err = ContractId::new(" ", "1").validate().unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let binding = BindingId::new(ContractId::new("svc", "1"), "impl", "");
        let err = binding.validate().unwrap_err();
        assert!(err.to_string().contains("blank implementation version"));
    }
}
