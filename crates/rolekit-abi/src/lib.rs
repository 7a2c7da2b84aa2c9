//! Values and hashes shared across the rolekit role boundary.
//!
//! Role operations are called with a slice of [`Value`]s and answer a single
//! [`Value`]. Signatures are described with [`ValueType`]s, and every
//! structural identity (signatures, role sets) is a SHA-256 [`TypeHash`].
//!
//! Behaviour authors only need this crate plus `rolekit` itself.

pub mod hash;
mod value;

pub use hash::TypeHash;
pub use value::{ConversionError, FromArgs, FromValue, Value, ValueType};
