//! Remote legs.
//!
//! Both executors share one send path: pick an endpoint some transport client
//! speaks, pick a format both sides support, encode the arguments, and wait at
//! most the context timeout for the response. Non-OK responses are translated
//! through the error table.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use super::Executor;
use super::single;
use crate::binding::Binding;
use crate::context::InvocationContext;
use crate::error::Error;
use crate::error::Result;
use crate::runtime::Services;
use crate::signature::TypeDescriptor;
use crate::target::Endpoint;
use crate::target::Target;
use crate::transport::CommunicationMode;
use crate::transport::Request;
use crate::transport::RequestContext;
use crate::transport::RequestMetadata;
use crate::transport::TransportClient;
use crate::transport::TransportError;

/// Typed remote call: declared parameter types go on the wire and the result
/// is checked against the declared return type.
pub struct RemoteExecutor<'a> {
    binding: &'a Binding,
    services: &'a Services,
}

impl<'a> RemoteExecutor<'a> {
    pub fn new(binding: &'a Binding, services: &'a Services) -> Self {
        Self { binding, services }
    }
}

#[async_trait::async_trait]
impl<'a> Executor<Target> for RemoteExecutor<'a> {
    async fn execute(&self, candidates: &[Target], ctx: &InvocationContext, args: &[Value]) -> Result<Value> {
        let target = single(candidates, "target")?;
        let signature = self.binding.signature();
        let value = send(
            self.binding,
            self.services,
            target,
            ctx,
            args,
            signature.params.clone(),
            signature.returns.clone(),
        )
        .await?;
        signature.validate_result(self.binding.id(), &value)?;
        Ok(value)
    }
}

/// Reflective remote call: arguments travel untyped and the raw result is
/// returned as decoded.
pub struct GenericRemoteExecutor<'a> {
    binding: &'a Binding,
    services: &'a Services,
}

impl<'a> GenericRemoteExecutor<'a> {
    pub fn new(binding: &'a Binding, services: &'a Services) -> Self {
        Self { binding, services }
    }
}

#[async_trait::async_trait]
impl<'a> Executor<Target> for GenericRemoteExecutor<'a> {
    async fn execute(&self, candidates: &[Target], ctx: &InvocationContext, args: &[Value]) -> Result<Value> {
        let target = single(candidates, "target")?;
        let arg_types = vec![TypeDescriptor::Any; args.len()];
        send(self.binding, self.services, target, ctx, args, arg_types, TypeDescriptor::Any).await
    }
}

fn invalid(binding: &Binding, target: &Target, reason: &str) -> Error {
    Error::InvalidTarget {
        binding: binding.id().clone(),
        worker: target.worker_id.clone(),
        reason: reason.to_string(),
    }
}

fn validate_target(binding: &Binding, target: &Target) -> Result<()> {
    if target.worker_id.trim().is_empty() {
        return Err(invalid(binding, target, "blank worker id"));
    }
    if target.host.trim().is_empty() {
        return Err(invalid(binding, target, "blank host"));
    }
    if target.environment.trim().is_empty() {
        return Err(invalid(binding, target, "blank environment"));
    }
    if target.endpoints.is_empty() {
        return Err(invalid(binding, target, "no endpoints"));
    }
    if target.formats.is_empty() {
        return Err(invalid(binding, target, "no formats"));
    }
    Ok(())
}

/// First endpoint, in the target's order, that the caller allows and some
/// client speaks.
fn choose_endpoint<'t>(
    services: &Services,
    target: &'t Target,
    ctx: &InvocationContext,
) -> Result<(&'t Endpoint, Arc<dyn TransportClient>)> {
    let allowed = target
        .endpoints
        .iter()
        .filter(|e| ctx.protocols().is_empty() || ctx.protocols().contains(&e.protocol));

    let mut first = None;
    for endpoint in allowed {
        first.get_or_insert(endpoint);
        if let Some(client) = services.transport_for(&endpoint.protocol) {
            return Ok((endpoint, client));
        }
    }

    Err(Error::NoTransport {
        protocol: first
            .or(target.endpoints.first())
            .map(|e| e.protocol.clone())
            .unwrap_or_default(),
    })
}

async fn send(
    binding: &Binding,
    services: &Services,
    target: &Target,
    ctx: &InvocationContext,
    args: &[Value],
    arg_types: Vec<TypeDescriptor>,
    return_type: TypeDescriptor,
) -> Result<Value> {
    validate_target(binding, target)?;
    let (endpoint, client) = choose_endpoint(services, target, ctx)?;

    let format = services
        .format_selector()
        .select(&target.formats, services.serializers(), ctx.formats())
        .ok_or_else(|| invalid(binding, target, "no mutually supported format"))?;
    let serializer = services.serializers().get(&format)?;
    let payload = serializer.encode(&Value::Array(args.to_vec()))?;

    let id = binding.id();
    let request = Request {
        protocol: endpoint.protocol.clone(),
        address: endpoint.address(),
        metadata: RequestMetadata {
            contract: id.contract.clone(),
            implementation: id.implementation.clone(),
            implementation_version: id.implementation_version.clone(),
            format: format.clone(),
            tags: ctx.extensions().clone(),
        },
        arg_types,
        return_type,
        payload,
        context: RequestContext {
            timeout: ctx.timeout(),
            mode: if ctx.is_multicast() {
                CommunicationMode::Multicast
            } else {
                CommunicationMode::Unicast
            },
            extensions: target.extensions.clone(),
        },
    };

    debug!(binding = %id, worker = %target.worker_id, address = %request.address, format = %format, "sending request");
    let response = match tokio::time::timeout(ctx.timeout(), client.request_response(request)).await {
        Ok(response) => response?,
        Err(_) => return Err(TransportError::Timeout.into()),
    };

    if !response.is_ok() {
        let meta = response.metadata;
        debug!(binding = %id, worker = %target.worker_id, code = meta.code, "remote failure");
        return Err(services.error_table().resolve(meta.code, meta.message, id, meta.tags));
    }
    if response.payload.is_empty() {
        return Ok(Value::Null);
    }
    serializer.decode(&response.payload)
}
