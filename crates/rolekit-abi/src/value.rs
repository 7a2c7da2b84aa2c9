//! Operation values

use std::fmt;

use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Static type of an operation parameter or result.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ValueType {
    Bool,
    U8,
    U16,
    U32,
    U64,
    S8,
    S16,
    S32,
    S64,
    F32,
    F64,
    Char,
    String,
    List(Box<ValueType>),
    Option(Box<ValueType>),
    Record(String), // type name
    Tuple(Vec<ValueType>),
    /// Reference to another entity, by identifier.
    Entity,
    /// Dynamic escape hatch: accepts any value.
    Any,
}

impl ValueType {
    /// The unit type (empty tuple).
    pub fn unit() -> Self {
        ValueType::Tuple(Vec::new())
    }

    pub fn is_unit(&self) -> bool {
        matches!(self, ValueType::Tuple(items) if items.is_empty())
    }

    /// Whether `value` may be passed where this type is expected.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (ValueType::Any, _) => true,
            (ValueType::List(elem), Value::List { items, .. }) => {
                items.iter().all(|item| elem.accepts(item))
            }
            (ValueType::Option(inner), Value::Option { value, .. }) => {
                value.as_deref().map_or(true, |v| inner.accepts(v))
            }
            (ValueType::Tuple(types), Value::Tuple(items)) => {
                types.len() == items.len()
                    && types.iter().zip(items).all(|(ty, item)| ty.accepts(item))
            }
            (ValueType::Record(name), Value::Record { type_name, .. }) => name == type_name,
            _ => *self == value.infer_type(),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Bool => f.write_str("bool"),
            ValueType::U8 => f.write_str("u8"),
            ValueType::U16 => f.write_str("u16"),
            ValueType::U32 => f.write_str("u32"),
            ValueType::U64 => f.write_str("u64"),
            ValueType::S8 => f.write_str("s8"),
            ValueType::S16 => f.write_str("s16"),
            ValueType::S32 => f.write_str("s32"),
            ValueType::S64 => f.write_str("s64"),
            ValueType::F32 => f.write_str("f32"),
            ValueType::F64 => f.write_str("f64"),
            ValueType::Char => f.write_str("char"),
            ValueType::String => f.write_str("string"),
            ValueType::List(inner) => write!(f, "list<{}>", inner),
            ValueType::Option(inner) => write!(f, "option<{}>", inner),
            ValueType::Record(name) => f.write_str(name),
            ValueType::Tuple(items) if items.is_empty() => f.write_str("unit"),
            ValueType::Tuple(items) => {
                f.write_str("tuple<")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str(">")
            }
            ValueType::Entity => f.write_str("entity"),
            ValueType::Any => f.write_str("any"),
        }
    }
}

/// A runtime value passed to and returned from role operations
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Value {
    // Primitives
    Bool(bool),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    S8(i8),
    S16(i16),
    S32(i32),
    S64(i64),
    F32(f32),
    F64(f64),
    Char(char),
    String(String),

    // Compound types WITH type info
    List { elem_type: ValueType, items: Vec<Value> },
    Option { inner_type: ValueType, value: Option<Box<Value>> },
    Record { type_name: String, fields: Vec<(String, Value)> },

    // Positional, no type info needed
    Tuple(Vec<Value>),
    /// Identifier of another entity
    Entity(String),
}

impl Value {
    /// The unit value (empty tuple).
    pub fn unit() -> Self {
        Value::Tuple(Vec::new())
    }

    pub fn is_unit(&self) -> bool {
        matches!(self, Value::Tuple(items) if items.is_empty())
    }

    /// Reference to another entity.
    pub fn entity(id: impl Into<String>) -> Self {
        Value::Entity(id.into())
    }

    /// Infer the ValueType from this Value
    pub fn infer_type(&self) -> ValueType {
        match self {
            Value::Bool(_) => ValueType::Bool,
            Value::U8(_) => ValueType::U8,
            Value::U16(_) => ValueType::U16,
            Value::U32(_) => ValueType::U32,
            Value::U64(_) => ValueType::U64,
            Value::S8(_) => ValueType::S8,
            Value::S16(_) => ValueType::S16,
            Value::S32(_) => ValueType::S32,
            Value::S64(_) => ValueType::S64,
            Value::F32(_) => ValueType::F32,
            Value::F64(_) => ValueType::F64,
            Value::Char(_) => ValueType::Char,
            Value::String(_) => ValueType::String,
            Value::List { elem_type, .. } => ValueType::List(Box::new(elem_type.clone())),
            Value::Option { inner_type, .. } => ValueType::Option(Box::new(inner_type.clone())),
            Value::Record { type_name, .. } => ValueType::Record(type_name.clone()),
            Value::Tuple(items) => ValueType::Tuple(items.iter().map(Value::infer_type).collect()),
            Value::Entity(_) => ValueType::Entity,
        }
    }
}

/// Error converting a [`Value`] into a Rust type.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConversionError {
    #[error("expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("expected list, got {0}")]
    ExpectedList(String),

    #[error("expected option, got {0}")]
    ExpectedOption(String),

    #[error("at index {0}: {1}")]
    IndexError(usize, Box<ConversionError>),

    #[error("expected {expected} arguments, got {got}")]
    Arity { expected: usize, got: usize },
}

fn mismatch(expected: &str, got: &Value) -> ConversionError {
    ConversionError::TypeMismatch {
        expected: expected.to_string(),
        got: got.infer_type().to_string(),
    }
}

/// Conversion out of a [`Value`].
///
/// Implemented per type rather than through a blanket `TryFrom` impl so that
/// `Option<T>` and `Vec<T>` can be covered without coherence conflicts.
pub trait FromValue: Sized {
    fn from_value(v: Value) -> Result<Self, ConversionError>;
}

macro_rules! primitive_conversions {
    ($($ty:ty => $variant:ident, $name:literal;)*) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }

            impl TryFrom<Value> for $ty {
                type Error = ConversionError;
                fn try_from(v: Value) -> Result<Self, Self::Error> {
                    match v {
                        Value::$variant(x) => Ok(x),
                        other => Err(mismatch($name, &other)),
                    }
                }
            }

            impl FromValue for $ty {
                fn from_value(v: Value) -> Result<Self, ConversionError> {
                    <$ty>::try_from(v)
                }
            }
        )*
    };
}

primitive_conversions! {
    bool => Bool, "bool";
    u8 => U8, "u8";
    u16 => U16, "u16";
    u32 => U32, "u32";
    u64 => U64, "u64";
    i8 => S8, "s8";
    i16 => S16, "s16";
    i32 => S32, "s32";
    i64 => S64, "s64";
    f32 => F32, "f32";
    f64 => F64, "f64";
    char => Char, "char";
    String => String, "string";
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::unit()
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        let items: Vec<Value> = v.into_iter().map(Into::into).collect();
        let elem_type = items
            .first()
            .map(Value::infer_type)
            .unwrap_or(ValueType::Any);
        Value::List { elem_type, items }
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        let (inner_type, value) = match v {
            Some(x) => {
                let val: Value = x.into();
                (val.infer_type(), Some(Box::new(val)))
            }
            None => (ValueType::Any, None),
        };
        Value::Option { inner_type, value }
    }
}

impl FromValue for Value {
    fn from_value(v: Value) -> Result<Self, ConversionError> {
        Ok(v)
    }
}

impl FromValue for () {
    fn from_value(v: Value) -> Result<Self, ConversionError> {
        if v.is_unit() {
            Ok(())
        } else {
            Err(mismatch("unit", &v))
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(v: Value) -> Result<Self, ConversionError> {
        match v {
            Value::List { items, .. } => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| {
                    T::from_value(item).map_err(|e| ConversionError::IndexError(i, Box::new(e)))
                })
                .collect(),
            other => Err(ConversionError::ExpectedList(other.infer_type().to_string())),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(v: Value) -> Result<Self, ConversionError> {
        match v {
            Value::Option { value: Some(inner), .. } => T::from_value(*inner).map(Some),
            Value::Option { value: None, .. } => Ok(None),
            other => Err(ConversionError::ExpectedOption(other.infer_type().to_string())),
        }
    }
}

/// Conversion of an argument slice into a typed tuple.
pub trait FromArgs: Sized {
    fn from_args(args: &[Value]) -> Result<Self, ConversionError>;
}

impl FromArgs for () {
    fn from_args(args: &[Value]) -> Result<Self, ConversionError> {
        if args.is_empty() {
            Ok(())
        } else {
            Err(ConversionError::Arity { expected: 0, got: args.len() })
        }
    }
}

macro_rules! tuple_args {
    ($len:literal => $($name:ident : $idx:tt),+) => {
        impl<$($name: FromValue),+> FromArgs for ($($name,)+) {
            fn from_args(args: &[Value]) -> Result<Self, ConversionError> {
                if args.len() != $len {
                    return Err(ConversionError::Arity { expected: $len, got: args.len() });
                }
                Ok(($(
                    $name::from_value(args[$idx].clone())
                        .map_err(|e| ConversionError::IndexError($idx, Box::new(e)))?,
                )+))
            }
        }
    };
}

tuple_args!(1 => A: 0);
tuple_args!(2 => A: 0, B: 1);
tuple_args!(3 => A: 0, B: 1, C: 2);
tuple_args!(4 => A: 0, B: 1, C: 2, D: 3);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_round_trip() {
        let v: Value = "Alice".into();
        assert_eq!(String::from_value(v).unwrap(), "Alice");
        assert_eq!(i64::from_value(Value::S64(7)).unwrap(), 7);
    }

    #[test]
    fn test_mismatch_reports_types() {
        let err = i64::from_value(Value::String("x".into())).unwrap_err();
        assert_eq!(
            err,
            ConversionError::TypeMismatch {
                expected: "s64".into(),
                got: "string".into()
            }
        );
    }

    #[test]
    fn test_accepts_any_and_lists() {
        let list: Value = vec![1i64, 2, 3].into();
        assert!(ValueType::List(Box::new(ValueType::S64)).accepts(&list));
        assert!(!ValueType::List(Box::new(ValueType::String)).accepts(&list));
        assert!(ValueType::Any.accepts(&list));
        assert!(ValueType::unit().accepts(&Value::unit()));
    }

    #[test]
    fn test_from_args_checks_arity() {
        let args = [Value::S64(1), Value::String("a".into())];
        let (n, s) = <(i64, String)>::from_args(&args).unwrap();
        assert_eq!((n, s.as_str()), (1, "a"));

        let err = <(i64,)>::from_args(&args).unwrap_err();
        assert_eq!(err, ConversionError::Arity { expected: 1, got: 2 });
    }

    #[test]
    fn test_display_nested_types() {
        let ty = ValueType::Option(Box::new(ValueType::List(Box::new(ValueType::String))));
        assert_eq!(ty.to_string(), "option<list<string>>");
        assert_eq!(ValueType::unit().to_string(), "unit");
    }
}
