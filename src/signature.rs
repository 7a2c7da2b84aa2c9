//! Operation Signatures
//!
//! A signature is the dispatch key of a composite: two roles declaring the
//! same name, parameter types and result type share one slot.
//!
//! Signatures can be spelled out with [`Signature::new`] or extracted from
//! Rust types:
//!
//! ```ignore
//! let sig = Signature::of::<(String, i64), bool>("rename");
//! assert_eq!(sig.to_string(), "rename(string, s64) -> bool");
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use rolekit_abi::hash::{hash_signature, TypeHash};
use rolekit_abi::{Value, ValueType};

// ============================================================================
// OpType Trait - Maps Rust types to value types
// ============================================================================

/// Trait for Rust types that can appear in an operation signature.
pub trait OpType {
    fn op_type() -> ValueType;
}

macro_rules! op_types {
    ($($ty:ty => $vt:expr;)*) => {
        $(
            impl OpType for $ty {
                fn op_type() -> ValueType {
                    $vt
                }
            }
        )*
    };
}

op_types! {
    bool => ValueType::Bool;
    u8 => ValueType::U8;
    u16 => ValueType::U16;
    u32 => ValueType::U32;
    u64 => ValueType::U64;
    i8 => ValueType::S8;
    i16 => ValueType::S16;
    i32 => ValueType::S32;
    i64 => ValueType::S64;
    f32 => ValueType::F32;
    f64 => ValueType::F64;
    char => ValueType::Char;
    String => ValueType::String;
    () => ValueType::unit();
    Value => ValueType::Any;
}

impl<T: OpType> OpType for Vec<T> {
    fn op_type() -> ValueType {
        ValueType::List(Box::new(T::op_type()))
    }
}

impl<T: OpType> OpType for Option<T> {
    fn op_type() -> ValueType {
        ValueType::Option(Box::new(T::op_type()))
    }
}

/// Trait for extracting parameter types from a tuple.
pub trait OpParams {
    fn op_types() -> Vec<ValueType>;
}

impl OpParams for () {
    fn op_types() -> Vec<ValueType> {
        vec![]
    }
}

impl<A: OpType> OpParams for (A,) {
    fn op_types() -> Vec<ValueType> {
        vec![A::op_type()]
    }
}

impl<A: OpType, B: OpType> OpParams for (A, B) {
    fn op_types() -> Vec<ValueType> {
        vec![A::op_type(), B::op_type()]
    }
}

impl<A: OpType, B: OpType, C: OpType> OpParams for (A, B, C) {
    fn op_types() -> Vec<ValueType> {
        vec![A::op_type(), B::op_type(), C::op_type()]
    }
}

impl<A: OpType, B: OpType, C: OpType, D: OpType> OpParams for (A, B, C, D) {
    fn op_types() -> Vec<ValueType> {
        vec![A::op_type(), B::op_type(), C::op_type(), D::op_type()]
    }
}

// ============================================================================
// Signature
// ============================================================================

/// An operation signature: name, parameter types, result type.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Signature {
    name: String,
    params: Vec<ValueType>,
    result: ValueType,
}

impl Signature {
    pub fn new(name: impl Into<String>, params: Vec<ValueType>, result: ValueType) -> Self {
        Self {
            name: name.into(),
            params,
            result,
        }
    }

    /// Extract the signature from Rust parameter and result types.
    pub fn of<Args: OpParams, Ret: OpType>(name: impl Into<String>) -> Self {
        Self::new(name, Args::op_types(), Ret::op_type())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[ValueType] {
        &self.params
    }

    pub fn result(&self) -> &ValueType {
        &self.result
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Whether `args` match the parameter list.
    pub fn accepts(&self, args: &[Value]) -> bool {
        self.params.len() == args.len()
            && self.params.iter().zip(args).all(|(ty, arg)| ty.accepts(arg))
    }

    /// Content hash of this signature.
    pub fn hash(&self) -> TypeHash {
        hash_signature(&self.name, &self.params, &self.result)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", param)?;
        }
        write!(f, ") -> {}", self.result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op_type_primitives() {
        assert_eq!(String::op_type(), ValueType::String);
        assert_eq!(i32::op_type(), ValueType::S32);
        assert!(<()>::op_type().is_unit());
    }

    #[test]
    fn test_signature_from_rust_types() {
        let sig = Signature::of::<(String, i64), bool>("rename");
        assert_eq!(sig.name(), "rename");
        assert_eq!(sig.params(), &[ValueType::String, ValueType::S64]);
        assert_eq!(sig.result(), &ValueType::Bool);
        assert_eq!(sig.to_string(), "rename(string, s64) -> bool");
    }

    #[test]
    fn test_signature_hash_deterministic() {
        let a = Signature::of::<(), String>("getName");
        let b = Signature::new("getName", vec![], ValueType::String);
        assert_eq!(a, b);
        assert_eq!(a.hash(), b.hash());

        let c = Signature::of::<(), i64>("getName");
        assert_ne!(a.hash(), c.hash());
    }

    #[test]
    fn test_signature_accepts_checks_arity_and_types() {
        let sig = Signature::of::<(i64,), ()>("setAge");
        assert!(sig.accepts(&[Value::S64(3)]));
        assert!(!sig.accepts(&[Value::String("3".into())]));
        assert!(!sig.accepts(&[]));
    }
}
