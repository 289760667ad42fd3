use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use super::ROOT;
use super::Registry;
use crate::binding::Binding;
use crate::contract::Contract;
use crate::error::Error;
use crate::error::Result;
use crate::id::BindingId;
use crate::id::ContractId;

/// The root registry with plugin registries layered over it.
///
/// Plugins take precedence over the root, and among plugins the one
/// installed first wins. Installing a plugin under a name already in use
/// replaces the old one.
pub struct CompositeRegistry {
    root: Arc<Registry>,
    /// In install order.
    plugins: RwLock<Vec<Arc<Registry>>>,
}

impl CompositeRegistry {
    pub fn new(root: Arc<Registry>) -> Self {
        root.publish();
        Self {
            root,
            plugins: RwLock::new(Vec::new()),
        }
    }

    pub fn root(&self) -> &Arc<Registry> {
        &self.root
    }

    pub fn plugin(&self, name: &str) -> Option<Arc<Registry>> {
        self.plugins.read().iter().find(|p| p.name() == name).cloned()
    }

    pub fn plugin_names(&self) -> Vec<String> {
        self.plugins.read().iter().map(|p| p.name().to_string()).collect()
    }

    /// Installs a plugin registry, returning the one it replaced.
    ///
    /// Every contract the plugin declares must agree in kind and default
    /// binding with the same contract in the other layers.
    pub fn install(&self, registry: Arc<Registry>) -> Result<Option<Arc<Registry>>> {
        let name = registry.name().to_string();
        if name.trim().is_empty() || name == ROOT {
            return Err(Error::Config("plugin registries need a non-blank name".into()));
        }

        let mut plugins = self.plugins.write();
        for contract in registry.contracts() {
            let others = std::iter::once(&self.root).chain(plugins.iter().filter(|p| p.name() != name));
            for other in others {
                if let Some(existing) = other.contract(contract.id()) {
                    existing.check_compatible(&contract)?;
                }
            }
        }

        let replaced = match plugins.iter().position(|p| p.name() == name) {
            Some(index) => {
                let old = plugins.remove(index);
                old.withdraw();
                Some(old)
            }
            None => None,
        };
        plugins.push(registry.clone());
        registry.publish();
        drop(plugins);

        info!(plugin = %name, replaced = replaced.is_some(), contracts = registry.contracts().len(), "installed registry");
        Ok(replaced)
    }

    pub fn uninstall(&self, name: &str) -> Option<Arc<Registry>> {
        let mut plugins = self.plugins.write();
        let index = plugins.iter().position(|p| p.name() == name)?;
        let removed = plugins.remove(index);
        removed.withdraw();
        drop(plugins);

        info!(plugin = %name, "uninstalled registry");
        Some(removed)
    }

    /// Layers from lowest to highest precedence.
    fn layers(&self) -> Vec<Arc<Registry>> {
        let plugins = self.plugins.read();
        std::iter::once(self.root.clone())
            .chain(plugins.iter().rev().cloned())
            .collect()
    }

    /// The contract as seen through every layer.
    pub fn contract(&self, id: &ContractId) -> Result<Option<Arc<Contract>>> {
        let parts: Vec<Arc<Contract>> = self
            .layers()
            .iter()
            .filter_map(|layer| layer.contract(id))
            .collect();
        if parts.is_empty() {
            return Ok(None);
        }
        Contract::merge(&parts).map(Some)
    }

    pub fn binding(&self, id: &BindingId) -> Result<Option<Arc<Binding>>> {
        Ok(self.contract(id.contract())?.and_then(|c| c.binding(id)))
    }

    pub fn contract_ids(&self) -> BTreeSet<ContractId> {
        self.layers()
            .iter()
            .flat_map(|layer| layer.contracts())
            .map(|c| c.id().clone())
            .collect()
    }
}
