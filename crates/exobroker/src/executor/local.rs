use serde_json::Value;
use tracing::debug;

use super::Executor;
use super::single;
use crate::binding::Binding;
use crate::context::InvocationContext;
use crate::error::Error;
use crate::error::Result;
use crate::target::Target;

/// Runs a binding's in-process implementation.
///
/// Arguments are checked against the binding's signature, the call runs in
/// the implementation's own execution context, and any failure comes back
/// wrapped in `Error::Invocation` naming the binding.
pub struct LocalExecutor<'a> {
    binding: &'a Binding,
}

impl<'a> LocalExecutor<'a> {
    pub fn new(binding: &'a Binding) -> Self {
        Self { binding }
    }

    pub async fn invoke(&self, args: Vec<Value>) -> Result<Value> {
        let binding = self.binding;
        let Some(implementation) = binding.implementation() else {
            return Err(Error::NotHostedLocally {
                binding: binding.id().clone(),
            });
        };
        binding.signature().validate_args(binding.id(), &args)?;

        debug!(binding = %binding.id(), plugin = ?implementation.context.plugin(), "invoking locally");
        implementation
            .callable
            .call(&implementation.context, args)
            .await
            .map_err(|e| Error::Invocation {
                binding: binding.id().clone(),
                source: Box::new(e),
            })
    }
}

#[async_trait::async_trait]
impl<'a> Executor<Target> for LocalExecutor<'a> {
    async fn execute(&self, candidates: &[Target], _ctx: &InvocationContext, args: &[Value]) -> Result<Value> {
        single(candidates, "target")?;
        self.invoke(args.to_vec()).await
    }
}
