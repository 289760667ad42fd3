//! # Router
//!
//! Narrows the bindings registered under a contract to those eligible for one
//! call. Filters see lightweight `BindingMeta` copies and hand back the ones
//! they keep; the router maps them back to live bindings and refuses any it
//! did not offer.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::binding::Binding;
use crate::context::InvocationContext;
use crate::contract::Contract;
use crate::error::Error;
use crate::error::Result;
use crate::id::BindingId;
use crate::id::ContractId;

/// What a route filter gets to see about a binding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BindingMeta {
    pub id: BindingId,
    pub aliases: BTreeSet<String>,
    pub tags: BTreeSet<String>,
    pub degrades_to: Option<String>,
}

/// Input to a route filter.
pub struct RouteRequest<'a> {
    pub contract: &'a ContractId,
    pub default_binding: Option<&'a BindingId>,
    pub candidates: &'a [BindingMeta],
    pub args: &'a [Value],
    /// Filter-specific extension data from the invocation context.
    pub extensions: &'a BTreeMap<String, String>,
}

pub trait RouteFilter: Send + Sync + 'static {
    /// Returns the candidates to keep, in the order they should be used.
    fn filter(&self, request: &RouteRequest<'_>) -> Vec<BindingMeta>;
}

pub struct Router;

impl Router {
    pub fn route(contract: &Contract, ctx: &InvocationContext, args: &[Value]) -> Result<Vec<Arc<Binding>>> {
        let bindings = contract.bindings();

        let Some(filter) = &ctx.route_filter else {
            return Ok(bindings);
        };

        let metas: Vec<BindingMeta> = bindings.iter().map(|b| b.meta()).collect();
        let default_binding = contract.default_binding();
        let request = RouteRequest {
            contract: contract.id(),
            default_binding: default_binding.as_ref(),
            candidates: &metas,
            args,
            extensions: ctx.extensions(),
        };

        let chosen = filter.filter(&request);
        debug!(contract = %contract.id(), offered = metas.len(), kept = chosen.len(), "routed");

        chosen
            .into_iter()
            .map(|meta| {
                bindings
                    .iter()
                    .find(|b| b.id() == &meta.id)
                    .cloned()
                    .ok_or_else(|| {
                        Error::IllegalState(format!(
                            "route filter returned {} which is not registered under {}",
                            meta.id,
                            contract.id()
                        ))
                    })
            })
            .collect()
    }
}

/// Routes to the contract's default binding when one is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultBindingFilter;

impl RouteFilter for DefaultBindingFilter {
    fn filter(&self, request: &RouteRequest<'_>) -> Vec<BindingMeta> {
        match request.default_binding {
            Some(default) => request
                .candidates
                .iter()
                .filter(|m| &m.id == default)
                .cloned()
                .collect(),
            None => request.candidates.to_vec(),
        }
    }
}

/// Keeps bindings carrying a tag.
#[derive(Clone, Debug)]
pub struct TagFilter(pub String);

impl RouteFilter for TagFilter {
    fn filter(&self, request: &RouteRequest<'_>) -> Vec<BindingMeta> {
        request
            .candidates
            .iter()
            .filter(|m| m.tags.contains(&self.0))
            .cloned()
            .collect()
    }
}

/// Keeps bindings known by an alias.
#[derive(Clone, Debug)]
pub struct AliasFilter(pub String);

impl RouteFilter for AliasFilter {
    fn filter(&self, request: &RouteRequest<'_>) -> Vec<BindingMeta> {
        request
            .candidates
            .iter()
            .filter(|m| m.aliases.contains(&self.0))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    struct Inventing;

    impl RouteFilter for Inventing {
        fn filter(&self, request: &RouteRequest<'_>) -> Vec<BindingMeta> {
            let mut fake = request.candidates[0].clone();
            fake.id.implementation = "ghost".into();
            vec![fake]
        }
    }

    struct Reverse;

    impl RouteFilter for Reverse {
        fn filter(&self, request: &RouteRequest<'_>) -> Vec<BindingMeta> {
            request.candidates.iter().rev().cloned().collect()
        }
    }

    #[test]
    fn test_no_filter_passes_everything_through() {
        let (_rt, contract) = testing::contract_with(&["a", "b"]);
        let routed = Router::route(&contract, &InvocationContext::default(), &[]).unwrap();
        assert_eq!(routed.len(), 2);
    }

    #[test]
    fn test_filter_order_is_kept() {
        let (_rt, contract) = testing::contract_with(&["a", "b", "c"]);
        let ctx = InvocationContext::builder().route_filter(Arc::new(Reverse)).build();
        let routed = Router::route(&contract, &ctx, &[]).unwrap();
        let names: Vec<&str> = routed.iter().map(|b| b.id().implementation.as_str()).collect();
        assert_eq!(names, ["c", "b", "a"]);
    }

    #[test]
    fn test_invented_binding_is_illegal_state() {
        let (_rt, contract) = testing::contract_with(&["a"]);
        let ctx = InvocationContext::builder().route_filter(Arc::new(Inventing)).build();
        let err = Router::route(&contract, &ctx, &[]).unwrap_err();
        assert!(matches!(err, Error::IllegalState(msg) if msg.contains("ghost")));
    }

    #[test]
    fn test_tag_and_alias_filters() {
        let (_rt, contract) = testing::contract_with(&["a", "b"]);
        let b = contract.binding_by_implementation("b").unwrap();
        b.add_tag("gpu");
        b.add_alias("fast");

        let ctx = InvocationContext::builder()
            .route_filter(Arc::new(TagFilter("gpu".into())))
            .build();
        let routed = Router::route(&contract, &ctx, &[]).unwrap();
        assert_eq!(routed.len(), 1);
        assert_eq!(routed[0].id().implementation, "b");

        let ctx = InvocationContext::builder()
            .route_filter(Arc::new(AliasFilter("fast".into())))
            .build();
        assert_eq!(Router::route(&contract, &ctx, &[]).unwrap()[0].id(), b.id());
    }

    #[test]
    fn test_default_binding_filter() {
        let (_rt, contract) = testing::contract_with(&["a", "b"]);
        let ctx = InvocationContext::builder()
            .route_filter(Arc::new(DefaultBindingFilter))
            .build();
        assert_eq!(Router::route(&contract, &ctx, &[]).unwrap().len(), 2);

        let b = contract.binding_by_implementation("b").unwrap();
        contract.set_default_binding(b.id().clone()).unwrap();
        let routed = Router::route(&contract, &ctx, &[]).unwrap();
        assert_eq!(routed.len(), 1);
        assert_eq!(routed[0].id(), b.id());
    }
}
