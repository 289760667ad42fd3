use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use super::Executor;
use super::single;
use crate::binding::Binding;
use crate::context::InvocationContext;
use crate::error::Result;
use crate::id::BindingId;

/// Falls back along `degrades_to` links when a binding fails degradably.
///
/// The fallback is looked up among the contract's bindings by implementation
/// id and run through the same inner executor. Each binding is tried at most
/// once per call; on a cycle, a missing fallback or a dangling link, the most
/// recent degradable error is returned. For a cycle `a -> b -> a` that is the
/// error `b` raised, not the one `a` raised first.
pub struct Degradation<E> {
    siblings: Vec<Arc<Binding>>,
    inner: E,
}

impl<E> Degradation<E> {
    /// `siblings` are the bindings of the contract being executed.
    pub fn new(siblings: Vec<Arc<Binding>>, inner: E) -> Self {
        Self { siblings, inner }
    }

    fn sibling(&self, implementation: &str) -> Option<Arc<Binding>> {
        self.siblings
            .iter()
            .filter(|b| b.id().implementation == implementation)
            .max_by(|a, b| a.id().cmp(b.id()))
            .cloned()
    }
}

#[async_trait::async_trait]
impl<E: Executor<Arc<Binding>>> Executor<Arc<Binding>> for Degradation<E> {
    async fn execute(&self, candidates: &[Arc<Binding>], ctx: &InvocationContext, args: &[Value]) -> Result<Value> {
        let mut current = single(candidates, "binding")?.clone();
        let mut visited: BTreeSet<BindingId> = BTreeSet::new();

        loop {
            visited.insert(current.id().clone());
            let err = match self.inner.execute(std::slice::from_ref(&current), ctx, args).await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };
            if !err.is_degradable() {
                return Err(err);
            }

            let Some(fallback) = current.degrades_to() else {
                return Err(err);
            };
            let Some(next) = self.sibling(&fallback) else {
                warn!(binding = %current.id(), fallback = %fallback, "degradation target is not registered");
                return Err(err);
            };
            if visited.contains(next.id()) {
                warn!(binding = %current.id(), fallback = %next.id(), "degradation cycle detected");
                return Err(err);
            }

            warn!(binding = %current.id(), fallback = %next.id(), error = %err, "degrading");
            current = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use serde_json::json;

    use super::*;
    use crate::error::Error;
    use crate::testing;

    /// Records every binding it is asked to run; succeeds only for `healthy`.
    struct Recording {
        healthy: Option<&'static str>,
        seen: Mutex<Vec<String>>,
    }

    impl Recording {
        fn new(healthy: Option<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                healthy,
                seen: Mutex::new(Vec::new()),
            })
        }

        fn seen(&self) -> Vec<String> {
            self.seen.lock().clone()
        }
    }

    #[async_trait::async_trait]
    impl Executor<Arc<Binding>> for Recording {
        async fn execute(&self, candidates: &[Arc<Binding>], _ctx: &InvocationContext, _args: &[Value]) -> Result<Value> {
            let binding = single(candidates, "binding")?;
            let name = binding.id().implementation.clone();
            self.seen.lock().push(name.clone());
            if Some(name.as_str()) == self.healthy {
                Ok(json!(name))
            } else {
                Err(Error::degradable(format!("{name} down")))
            }
        }
    }

    fn ctx() -> InvocationContext {
        InvocationContext::builder().degradation(true).build()
    }

    #[tokio::test]
    async fn test_falls_back_once() {
        let (_rt, contract) = testing::contract_with(&["a", "b"]);
        let a = contract.binding_by_implementation("a").unwrap();
        a.set_degrades_to(Some("b".into()));

        let inner = Recording::new(Some("b"));
        let out = Degradation::new(contract.bindings(), inner.clone())
            .execute(&[a], &ctx(), &[])
            .await
            .unwrap();
        assert_eq!(out, json!("b"));
        assert_eq!(inner.seen(), ["a", "b"]);
    }

    #[tokio::test]
    async fn test_cycle_stops_with_latest_error() {
        let (_rt, contract) = testing::contract_with(&["a", "b"]);
        let a = contract.binding_by_implementation("a").unwrap();
        let b = contract.binding_by_implementation("b").unwrap();
        a.set_degrades_to(Some("b".into()));
        b.set_degrades_to(Some("a".into()));

        let inner = Recording::new(None);
        let err = Degradation::new(contract.bindings(), inner.clone())
            .execute(&[a], &ctx(), &[])
            .await
            .unwrap_err();
        assert_eq!(inner.seen(), ["a", "b"]);
        assert_eq!(err.to_string(), "b down");
    }

    #[tokio::test]
    async fn test_dangling_link_returns_original_error() {
        let (_rt, contract) = testing::contract_with(&["a"]);
        let a = contract.binding_by_implementation("a").unwrap();
        a.set_degrades_to(Some("missing".into()));

        let inner = Recording::new(None);
        let err = Degradation::new(contract.bindings(), inner.clone())
            .execute(&[a], &ctx(), &[])
            .await
            .unwrap_err();
        assert_eq!(inner.seen(), ["a"]);
        assert!(err.is_degradable());
    }

    #[tokio::test]
    async fn test_fatal_does_not_degrade() {
        let (_rt, contract) = testing::contract_with(&["a", "b"]);
        let a = contract.binding_by_implementation("a").unwrap();
        a.set_degrades_to(Some("b".into()));

        struct Fatal;

        #[async_trait::async_trait]
        impl Executor<Arc<Binding>> for Fatal {
            async fn execute(&self, _c: &[Arc<Binding>], _ctx: &InvocationContext, _a: &[Value]) -> Result<Value> {
                Err(Error::fatal("nope"))
            }
        }

        let err = Degradation::new(contract.bindings(), Fatal)
            .execute(&[a], &ctx(), &[])
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "nope");
    }
}
