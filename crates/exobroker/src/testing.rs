//! Fixtures shared by the unit tests.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;

use crate::callable::Callable;
use crate::callable::from_fn;
use crate::config::BrokerConfig;
use crate::contract::Contract;
use crate::id::ContractId;
use crate::registry::Registration;
use crate::runtime::Runtime;
use crate::signature::MethodSignature;
use crate::target::WorkerIdentity;

pub const WORKER: &str = "me";

/// Names of the implementations invoked so far, in call order.
pub type Calls = Arc<Mutex<Vec<String>>>;

pub fn contract_id() -> ContractId {
    ContractId::new("svc", "1")
}

pub fn runtime() -> Arc<Runtime> {
    Runtime::builder(BrokerConfig::for_worker(WorkerIdentity::new(WORKER)))
        .build()
        .unwrap()
}

/// Takes no arguments, records the call and answers with `name`.
pub fn recording(name: &str, calls: &Calls) -> Arc<dyn Callable> {
    let name = name.to_string();
    let calls = calls.clone();
    from_fn(move |_ctx, _args| {
        calls.lock().push(name.clone());
        Ok(json!(name))
    })
}

/// Registers one in-process binding per name under `svc@1`.
pub fn contract_recording(names: &[&str]) -> (Arc<Runtime>, Arc<Contract>, Calls) {
    let rt = runtime();
    let calls = Calls::default();
    for name in names {
        let registration = Registration::builder(contract_id(), *name, "1")
            .signature(MethodSignature::untyped("call", 0))
            .callable(recording(name, &calls))
            .in_process()
            .build();
        rt.register(registration).unwrap();
    }
    let contract = rt.contract(&contract_id()).unwrap();
    (rt, contract, calls)
}

pub fn contract_with(names: &[&str]) -> (Arc<Runtime>, Arc<Contract>) {
    let (rt, contract, _) = contract_recording(names);
    (rt, contract)
}
