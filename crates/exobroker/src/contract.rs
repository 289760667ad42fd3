//! # Contracts
//!
//! A contract is a named, versioned service interface together with the
//! bindings registered for it. Executing a contract routes to its bindings and
//! runs them through the resilience decorators the context asks for.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::binding::Binding;
use crate::context::InvocationContext;
use crate::error::Error;
use crate::error::Result;
use crate::executor::Degradation;
use crate::executor::Executor;
use crate::executor::Multicast;
use crate::executor::Retry;
use crate::executor::Unicast;
use crate::id::BindingId;
use crate::id::ContractId;
use crate::router::Router;
use crate::signature::MethodSignature;

/// How calls into a contract are dispatched.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractKind {
    /// Arguments are typed by the contract's signature.
    #[default]
    Standard,
    /// Reflective: arguments and results are passed through as-is.
    Generic,
}

pub struct Contract {
    id: ContractId,
    kind: ContractKind,
    signature: MethodSignature,
    default_binding: RwLock<Option<BindingId>>,
    metadata: RwLock<BTreeMap<String, String>>,
    bindings: RwLock<BTreeMap<BindingId, Arc<Binding>>>,
}

impl Contract {
    pub fn new(id: ContractId, kind: ContractKind, signature: MethodSignature) -> Self {
        Self {
            id,
            kind,
            signature,
            default_binding: RwLock::new(None),
            metadata: RwLock::new(BTreeMap::new()),
            bindings: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn id(&self) -> &ContractId {
        &self.id
    }

    pub fn kind(&self) -> ContractKind {
        self.kind
    }

    pub fn signature(&self) -> &MethodSignature {
        &self.signature
    }

    pub fn default_binding(&self) -> Option<BindingId> {
        self.default_binding.read().clone()
    }

    /// Marks a registered binding as the default route.
    ///
    /// Setting the same default twice is a no-op; a different one is a
    /// configuration error.
    pub fn set_default_binding(&self, binding: BindingId) -> Result<()> {
        if !self.bindings.read().contains_key(&binding) {
            return Err(Error::Config(format!("{} is not registered under {}", binding, self.id)));
        }
        let mut current = self.default_binding.write();
        match current.as_ref() {
            Some(existing) if *existing != binding => Err(Error::Config(format!(
                "{} already routes to {} by default, refusing {}",
                self.id, existing, binding
            ))),
            _ => {
                *current = Some(binding);
                Ok(())
            }
        }
    }

    pub fn metadata(&self) -> BTreeMap<String, String> {
        self.metadata.read().clone()
    }

    pub fn set_metadata(&self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.write().insert(key.into(), value.into());
    }

    /// Adds or replaces a binding.
    pub fn insert(&self, binding: Arc<Binding>) {
        self.bindings.write().insert(binding.id().clone(), binding);
    }

    pub fn remove(&self, binding: &BindingId) -> Option<Arc<Binding>> {
        let removed = self.bindings.write().remove(binding);
        let mut default = self.default_binding.write();
        if default.as_ref() == Some(binding) {
            *default = None;
        }
        removed
    }

    /// Bindings in id order.
    pub fn bindings(&self) -> Vec<Arc<Binding>> {
        self.bindings.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.bindings.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.read().is_empty()
    }

    pub fn binding(&self, id: &BindingId) -> Option<Arc<Binding>> {
        self.bindings.read().get(id).cloned()
    }

    pub fn binding_by_alias(&self, alias: &str) -> Option<Arc<Binding>> {
        self.bindings
            .read()
            .values()
            .find(|b| b.aliases().contains(alias))
            .cloned()
    }

    /// Highest version of an implementation.
    pub fn binding_by_implementation(&self, implementation: &str) -> Option<Arc<Binding>> {
        self.bindings
            .read()
            .values()
            .filter(|b| b.id().implementation == implementation)
            .next_back()
            .cloned()
    }

    /// Checks that `other` can be merged with this contract.
    pub fn check_compatible(&self, other: &Contract) -> Result<()> {
        if self.id != other.id {
            return Err(Error::Config(format!("cannot merge {} with {}", self.id, other.id)));
        }
        if self.kind != other.kind {
            return Err(Error::Config(format!(
                "{} is registered as both {:?} and {:?}",
                self.id, self.kind, other.kind
            )));
        }
        if let (Some(a), Some(b)) = (self.default_binding(), other.default_binding()) {
            if a != b {
                return Err(Error::Config(format!(
                    "{} has conflicting default bindings {} and {}",
                    self.id, a, b
                )));
            }
        }
        Ok(())
    }

    /// Combines the same contract as seen by several registries.
    ///
    /// Later entries override earlier ones binding by binding. The first
    /// entry supplies the signature.
    pub fn merge(parts: &[Arc<Contract>]) -> Result<Arc<Contract>> {
        let Some((first, rest)) = parts.split_first() else {
            return Err(Error::IllegalState("nothing to merge".into()));
        };
        if rest.is_empty() {
            return Ok(first.clone());
        }

        let merged = Contract::new(first.id.clone(), first.kind, first.signature.clone());
        for (index, part) in parts.iter().enumerate() {
            for earlier in &parts[..index] {
                earlier.check_compatible(part)?;
            }
            for binding in part.bindings() {
                merged.insert(binding);
            }
            for (key, value) in part.metadata() {
                merged.set_metadata(key, value);
            }
        }
        let default = parts.iter().find_map(|p| p.default_binding());
        if let Some(default) = default {
            merged.set_default_binding(default)?;
        }
        Ok(Arc::new(merged))
    }

    pub async fn execute(&self, ctx: &InvocationContext, args: &[Value]) -> Result<Value> {
        let routed = Router::route(self, ctx, args)?;
        if routed.is_empty() {
            return Err(Error::NoImplementation { contract: self.id.clone() });
        }
        if !ctx.is_multicast() && routed.len() > 1 {
            return Err(Error::TooManyImplementations {
                contract: self.id.clone(),
                found: routed.len(),
            });
        }

        debug!(
            contract = %self.id,
            bindings = routed.len(),
            multicast = ctx.is_multicast(),
            degradation = ctx.is_degradation_enabled(),
            "executing contract"
        );

        let retry = Retry::new(Unicast);
        match (ctx.is_multicast(), ctx.is_degradation_enabled()) {
            (false, false) => retry.execute(&routed, ctx, args).await,
            (false, true) => Degradation::new(self.bindings(), retry).execute(&routed, ctx, args).await,
            (true, false) => Multicast::new(retry).execute(&routed, ctx, args).await,
            (true, true) => {
                Multicast::new(Degradation::new(self.bindings(), retry))
                    .execute(&routed, ctx, args)
                    .await
            }
        }
    }
}

impl fmt::Debug for Contract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bindings: BTreeSet<BindingId> = self.bindings.read().keys().cloned().collect();
        f.debug_struct("Contract")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("default_binding", &self.default_binding())
            .field("bindings", &bindings)
            .finish()
    }
}
