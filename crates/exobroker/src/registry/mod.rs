//! # Registries
//!
//! A `Registry` holds the contracts and bindings one source contributed: the
//! host application (the root registry) or a single plugin. The
//! [`CompositeRegistry`] layers plugin registries over the root and answers
//! lookups by merging every layer that knows a contract.
//!
//! Uses DashMap for the contract table so registrations from several tasks do
//! not contend on a global lock.

mod composite;
mod registration;

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::info;

use crate::binding::Binding;
use crate::binding::LocalImplementation;
use crate::callable::ExecutionContext;
use crate::contract::Contract;
use crate::error::Error;
use crate::error::Result;
use crate::error_table::ErrorCodes;
use crate::id::BindingId;
use crate::id::ContractId;
use crate::runtime::Services;

pub use composite::CompositeRegistry;
pub use registration::Registration;
pub use registration::RegistrationBuilder;

/// Name of the host application's registry.
pub const ROOT: &str = "";

pub struct Registry {
    name: String,
    services: Arc<Services>,
    contracts: DashMap<ContractId, Arc<Contract>>,
    error_codes: RwLock<ErrorCodes>,
    published: AtomicBool,
}

impl Registry {
    pub(crate) fn new(name: impl Into<String>, services: Arc<Services>) -> Self {
        Self {
            name: name.into(),
            services,
            contracts: DashMap::new(),
            error_codes: RwLock::new(ErrorCodes::new()),
            published: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_root(&self) -> bool {
        self.name == ROOT
    }

    fn default_context(&self) -> ExecutionContext {
        if self.is_root() {
            ExecutionContext::root()
        } else {
            ExecutionContext::for_plugin(&self.name)
        }
    }

    pub fn register(&self, registration: Registration) -> Result<Arc<Binding>> {
        let Registration {
            binding: id,
            kind,
            signature,
            callable,
            context,
            hosting,
            aliases,
            tags,
            degrades_to,
            preferred_default,
        } = registration;
        id.validate()?;

        let contract = self
            .contracts
            .entry(id.contract.clone())
            .or_insert_with(|| Arc::new(Contract::new(id.contract.clone(), kind, signature.clone())))
            .value()
            .clone();

        if contract.kind() != kind {
            return Err(Error::Config(format!(
                "{} is registered as {:?}, cannot add {} as {:?}",
                contract.id(),
                contract.kind(),
                id,
                kind
            )));
        }
        if contract.binding(&id).is_some() {
            return Err(Error::Config(format!("{} is already registered", id)));
        }
        if preferred_default {
            if let Some(existing) = contract.default_binding() {
                return Err(Error::Config(format!(
                    "{} already routes to {} by default, refusing {}",
                    contract.id(),
                    existing,
                    id
                )));
            }
        }

        let implementation = callable.map(|callable| LocalImplementation {
            callable,
            context: Arc::new(context.unwrap_or_else(|| self.default_context())),
            hosting,
        });
        let binding = Arc::new(Binding::new(id.clone(), kind, signature, implementation, self.services.clone()));
        for alias in &aliases {
            binding.add_alias(alias);
        }
        for tag in &tags {
            binding.add_tag(tag);
        }
        binding.set_degrades_to(degrades_to);

        contract.insert(binding.clone());
        if preferred_default {
            contract.set_default_binding(id.clone())?;
        }
        if self.published.load(Ordering::Acquire) {
            self.services.catalog().host(id.clone(), &self.name, binding.hosting());
        }

        info!(registry = %self.name, binding = %id, hosting = ?binding.hosting(), "registered binding");
        Ok(binding)
    }

    pub fn unregister(&self, id: &BindingId) -> Option<Arc<Binding>> {
        let contract = self.contract(id.contract())?;
        let removed = contract.remove(id)?;
        if contract.is_empty() {
            self.contracts.remove(id.contract());
        }
        info!(registry = %self.name, binding = %id, "unregistered binding");
        Some(removed)
    }

    pub fn contract(&self, id: &ContractId) -> Option<Arc<Contract>> {
        self.contracts.get(id).map(|entry| entry.value().clone())
    }

    pub fn contracts(&self) -> Vec<Arc<Contract>> {
        self.contracts.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn bindings(&self) -> Vec<Arc<Binding>> {
        self.contracts
            .iter()
            .flat_map(|entry| entry.value().bindings())
            .collect()
    }

    /// Adds response codes this registry's implementations use. They take
    /// effect when the registry is installed.
    pub fn add_error_codes(&self, codes: ErrorCodes) {
        self.error_codes.write().extend(codes);
    }

    /// Parses a JSON error-code resource, e.g.
    /// `{"460": {"name": "QuotaExceeded", "kind": "retryable"}}`.
    pub fn load_error_codes(&self, json: &str) -> Result<()> {
        let codes = crate::error_table::parse_codes(json)?;
        self.add_error_codes(codes);
        Ok(())
    }

    pub fn error_codes(&self) -> ErrorCodes {
        self.error_codes.read().clone()
    }

    /// Makes this registry's local implementations visible to the locator.
    pub(crate) fn publish(&self) {
        self.published.store(true, Ordering::Release);
        let catalog = self.services.catalog();
        for binding in self.bindings() {
            catalog.host(binding.id().clone(), &self.name, binding.hosting());
        }
    }

    pub(crate) fn withdraw(&self) {
        self.published.store(false, Ordering::Release);
        self.services.catalog().release(&self.name);
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("name", &self.name)
            .field("contracts", &self.contracts.len())
            .finish()
    }
}
