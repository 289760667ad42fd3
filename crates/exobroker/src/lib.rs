pub mod balancer;
pub mod binding;
pub mod callable;
pub mod config;
pub mod context;
pub mod contract;
pub mod error;
pub mod error_table;
pub mod executor;
pub mod id;
pub mod lifecycle;
pub mod locator;
pub mod loopback;
pub mod registry;
pub mod router;
pub mod runtime;
pub mod serializer;
pub mod signature;
pub mod target;
pub mod transport;

pub use binding::Binding;
pub use config::BrokerConfig;
pub use context::InvocationContext;
pub use contract::Contract;
pub use contract::ContractKind;
pub use error::Error;
pub use error::FailureKind;
pub use error::Result;
pub use id::BindingId;
pub use id::ContractId;
pub use registry::Registration;
pub use runtime::Runtime;

#[cfg(test)]
mod testing;
