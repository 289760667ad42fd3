use std::sync::Arc;

use serde_json::Value;
use tracing::debug;
use tracing::warn;

use super::Executor;
use crate::binding::Binding;
use crate::context::InvocationContext;
use crate::error::Error;
use crate::error::Result;

/// Re-runs the inner executor on retryable failures.
///
/// A call gets `retries + 1` attempts. Fatal and degradable failures pass
/// through untouched; a retryable failure on the last attempt comes back as
/// `Error::RetriesExhausted` wrapping it.
pub struct Retry<E> {
    inner: E,
}

impl<E> Retry<E> {
    pub fn new(inner: E) -> Self {
        Self { inner }
    }
}

#[async_trait::async_trait]
impl<E: Executor<Arc<Binding>>> Executor<Arc<Binding>> for Retry<E> {
    async fn execute(&self, candidates: &[Arc<Binding>], ctx: &InvocationContext, args: &[Value]) -> Result<Value> {
        let attempts = ctx.retries().saturating_add(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let err = match self.inner.execute(candidates, ctx, args).await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };
            if !err.is_retryable() {
                return Err(err);
            }

            let Some(binding) = candidates.first() else {
                return Err(err);
            };
            if attempt >= attempts {
                warn!(binding = %binding.id(), attempts, error = %err, "retries exhausted");
                return Err(Error::RetriesExhausted {
                    binding: binding.id().clone(),
                    attempts,
                    source: Box::new(err),
                });
            }
            debug!(binding = %binding.id(), attempt, of = attempts, error = %err, "retrying");
        }
    }
}
