use std::collections::BTreeSet;
use std::sync::Arc;

use crate::callable::Callable;
use crate::callable::ExecutionContext;
use crate::contract::ContractKind;
use crate::id::BindingId;
use crate::id::ContractId;
use crate::locator::Hosting;
use crate::signature::MethodSignature;

/// Everything needed to add one binding to a registry.
pub struct Registration {
    pub binding: BindingId,
    pub kind: ContractKind,
    pub signature: MethodSignature,
    /// Absent for bindings that are declared here but served elsewhere.
    pub callable: Option<Arc<dyn Callable>>,
    /// Defaults to the registry's own context.
    pub context: Option<ExecutionContext>,
    pub hosting: Hosting,
    pub aliases: BTreeSet<String>,
    pub tags: BTreeSet<String>,
    pub degrades_to: Option<String>,
    /// Make this binding the contract's default route.
    pub preferred_default: bool,
}

impl Registration {
    pub fn builder(
        contract: ContractId,
        implementation: impl Into<String>,
        implementation_version: impl Into<String>,
    ) -> RegistrationBuilder {
        RegistrationBuilder {
            registration: Registration {
                binding: BindingId::new(contract, implementation, implementation_version),
                kind: ContractKind::Standard,
                signature: MethodSignature::default(),
                callable: None,
                context: None,
                hosting: Hosting::default(),
                aliases: BTreeSet::new(),
                tags: BTreeSet::new(),
                degrades_to: None,
                preferred_default: false,
            },
        }
    }
}

pub struct RegistrationBuilder {
    registration: Registration,
}

impl RegistrationBuilder {
    pub fn kind(mut self, kind: ContractKind) -> Self {
        self.registration.kind = kind;
        self
    }

    pub fn signature(mut self, signature: MethodSignature) -> Self {
        self.registration.signature = signature;
        self
    }

    pub fn callable(mut self, callable: Arc<dyn Callable>) -> Self {
        self.registration.callable = Some(callable);
        self
    }

    pub fn context(mut self, context: ExecutionContext) -> Self {
        self.registration.context = Some(context);
        self
    }

    pub fn hosting(mut self, hosting: Hosting) -> Self {
        self.registration.hosting = hosting;
        self
    }

    /// Shorthand for `hosting(Hosting::InProcess)`.
    pub fn in_process(self) -> Self {
        self.hosting(Hosting::InProcess)
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.registration.aliases.insert(alias.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.registration.tags.insert(tag.into());
        self
    }

    pub fn degrades_to(mut self, implementation: impl Into<String>) -> Self {
        self.registration.degrades_to = Some(implementation.into());
        self
    }

    pub fn preferred_default(mut self) -> Self {
        self.registration.preferred_default = true;
        self
    }

    pub fn build(self) -> Registration {
        self.registration
    }
}
