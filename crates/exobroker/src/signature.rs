//! # Method signatures
//!
//! Explicit type descriptors supplied at registration time. They stand in for
//! reflection: the local executor checks arity and assignability against them,
//! and the remote executors ship them in the request envelope.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::error::Error;
use crate::error::Result;
use crate::id::BindingId;

/// The shape of one argument or return value.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeDescriptor {
    /// Accepts anything, including null.
    #[default]
    Any,
    Null,
    Bool,
    Integer,
    Number,
    String,
    Array,
    Object,
    /// Null or the inner type.
    Optional(Box<TypeDescriptor>),
}

impl TypeDescriptor {
    /// Whether `value` can be passed where this type is expected.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (Self::Any, _) => true,
            (Self::Optional(_), Value::Null) => true,
            (Self::Optional(inner), v) => inner.accepts(v),
            (Self::Null, Value::Null) => true,
            (Self::Bool, Value::Bool(_)) => true,
            (Self::Integer, Value::Number(n)) => n.is_i64() || n.is_u64(),
            (Self::Number, Value::Number(_)) => true,
            (Self::String, Value::String(_)) => true,
            (Self::Array, Value::Array(_)) => true,
            (Self::Object, Value::Object(_)) => true,
            _ => false,
        }
    }

    /// The narrowest descriptor for a concrete value.
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(_) => Self::Bool,
            Value::Number(n) if n.is_i64() || n.is_u64() => Self::Integer,
            Value::Number(_) => Self::Number,
            Value::String(_) => Self::String,
            Value::Array(_) => Self::Array,
            Value::Object(_) => Self::Object,
        }
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "any"),
            Self::Null => write!(f, "null"),
            Self::Bool => write!(f, "bool"),
            Self::Integer => write!(f, "integer"),
            Self::Number => write!(f, "number"),
            Self::String => write!(f, "string"),
            Self::Array => write!(f, "array"),
            Self::Object => write!(f, "object"),
            Self::Optional(inner) => write!(f, "{}?", inner),
        }
    }
}

/// The type signature of an implementation's entry point.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodSignature {
    pub name: String,
    pub params: Vec<TypeDescriptor>,
    #[serde(default)]
    pub returns: TypeDescriptor,
}

impl MethodSignature {
    pub fn new(name: impl Into<String>, params: Vec<TypeDescriptor>, returns: TypeDescriptor) -> Self {
        Self {
            name: name.into(),
            params,
            returns,
        }
    }

    /// Takes `arity` arguments of any type and returns anything.
    pub fn untyped(name: impl Into<String>, arity: usize) -> Self {
        Self::new(name, vec![TypeDescriptor::Any; arity], TypeDescriptor::Any)
    }

    /// Checks arity and assignability, listing expected vs. actual types on mismatch.
    pub fn validate_args(&self, binding: &BindingId, args: &[Value]) -> Result<()> {
        let arity_ok = self.params.len() == args.len();
        let types_ok = arity_ok && self.params.iter().zip(args).all(|(ty, arg)| ty.accepts(arg));
        if types_ok {
            return Ok(());
        }

        Err(Error::ArgumentMismatch {
            binding: binding.clone(),
            expected: join(self.params.iter()),
            actual: join(args.iter().map(TypeDescriptor::of)),
        })
    }

    pub fn validate_result(&self, binding: &BindingId, value: &Value) -> Result<()> {
        if self.returns.accepts(value) {
            return Ok(());
        }
        Err(Error::ResultMismatch {
            binding: binding.clone(),
            expected: self.returns.to_string(),
            actual: TypeDescriptor::of(value).to_string(),
        })
    }
}

fn join<T: fmt::Display>(items: impl Iterator<Item = T>) -> String {
    items.map(|t| t.to_string()).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::id::ContractId;

    fn binding() -> BindingId {
        BindingId::new(ContractId::new("math.add", "1"), "native", "1")
    }

    #[test]
    fn test_accepts_matches_json_shapes() {
        assert!(TypeDescriptor::Integer.accepts(&json!(3)));
        assert!(!TypeDescriptor::Integer.accepts(&json!(3.5)));
        assert!(TypeDescriptor::Number.accepts(&json!(3)));
        assert!(TypeDescriptor::Optional(Box::new(TypeDescriptor::String)).accepts(&Value::Null));
        assert!(!TypeDescriptor::String.accepts(&Value::Null));
        assert!(TypeDescriptor::Any.accepts(&json!({"a": 1})));
    }

    #[test]
    fn test_validate_args_reports_expected_and_actual() {
        let sig = MethodSignature::new(
            "add",
            vec![TypeDescriptor::Integer, TypeDescriptor::Integer],
            TypeDescriptor::Integer,
        );
        assert!(sig.validate_args(&binding(), &[json!(1), json!(2)]).is_ok());

        let err = sig.validate_args(&binding(), &[json!(1), json!("two")]).unwrap_err();
        match err {
            Error::ArgumentMismatch { expected, actual, .. } => {
                assert_eq!(expected, "integer, integer");
                assert_eq!(actual, "integer, string");
            }
            other => panic!("Wrong error type: {other}"),
        }
    }

    #[test]
    fn test_validate_args_rejects_wrong_arity() {
        let sig = MethodSignature::untyped("f", 1);
        let err = sig.validate_args(&binding(), &[]).unwrap_err();
        assert!(err.to_string().contains("expected (any), got ()"));
    }
}
