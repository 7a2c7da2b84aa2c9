//! Merkle-tree hashing for signatures and role sets.
//!
//! Value types are hashed structurally. Signatures hash their name together
//! with their parameter and result hashes. A set of named members (for
//! example the normalized roles of a composite) is hashed after sorting, so
//! the result never depends on insertion order.
//!
//! - Primitives have fixed hashes (tag byte in the second position)
//! - Compound types hash their components: `hash(list<T>) = H(tag_list, hash(T))`
//! - Equal structure means equal hash, so identity checks are O(1)

use std::fmt;

use sha2::{Digest, Sha256};

use crate::ValueType;

/// A 256-bit structural hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeHash([u8; 32]);

impl TypeHash {
    /// Create a TypeHash from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Format as hex string.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// Format as short hex (first 8 chars).
    pub fn to_short_hex(&self) -> String {
        self.0.iter().take(4).map(|b| format!("{:02x}", b)).collect()
    }
}

impl fmt::Display for TypeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_short_hex())
    }
}

const fn primitive(tag: u8) -> TypeHash {
    let mut bytes = [0u8; 32];
    bytes[1] = tag;
    TypeHash::from_bytes(bytes)
}

pub const HASH_BOOL: TypeHash = primitive(0x01);
pub const HASH_U8: TypeHash = primitive(0x02);
pub const HASH_U16: TypeHash = primitive(0x03);
pub const HASH_U32: TypeHash = primitive(0x04);
pub const HASH_U64: TypeHash = primitive(0x05);
pub const HASH_S8: TypeHash = primitive(0x06);
pub const HASH_S16: TypeHash = primitive(0x07);
pub const HASH_S32: TypeHash = primitive(0x08);
pub const HASH_S64: TypeHash = primitive(0x09);
pub const HASH_F32: TypeHash = primitive(0x0a);
pub const HASH_F64: TypeHash = primitive(0x0b);
pub const HASH_CHAR: TypeHash = primitive(0x0c);
pub const HASH_STRING: TypeHash = primitive(0x0d);
pub const HASH_ENTITY: TypeHash = primitive(0x0e);
pub const HASH_ANY: TypeHash = primitive(0x0f);

const HASH_TAG_LIST: u8 = 0x10;
const HASH_TAG_OPTION: u8 = 0x11;
const HASH_TAG_RECORD: u8 = 0x12;
const HASH_TAG_TUPLE: u8 = 0x13;
const HASH_TAG_SIGNATURE: u8 = 0x16;
const HASH_TAG_SET: u8 = 0x17;

/// Builder for computing structural hashes.
pub struct TypeHasher {
    hasher: Sha256,
}

impl TypeHasher {
    pub fn new() -> Self {
        Self {
            hasher: Sha256::new(),
        }
    }

    pub fn tag(mut self, tag: u8) -> Self {
        self.hasher.update([tag]);
        self
    }

    /// Length-prefixed string.
    pub fn string(mut self, s: &str) -> Self {
        self.hasher.update((s.len() as u32).to_le_bytes());
        self.hasher.update(s.as_bytes());
        self
    }

    pub fn child(mut self, hash: &TypeHash) -> Self {
        self.hasher.update(hash.as_bytes());
        self
    }

    pub fn count(mut self, n: usize) -> Self {
        self.hasher.update((n as u32).to_le_bytes());
        self
    }

    pub fn finish(self) -> TypeHash {
        TypeHash(self.hasher.finalize().into())
    }
}

impl Default for TypeHasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Hash a value type structurally.
pub fn hash_type(ty: &ValueType) -> TypeHash {
    match ty {
        ValueType::Bool => HASH_BOOL,
        ValueType::U8 => HASH_U8,
        ValueType::U16 => HASH_U16,
        ValueType::U32 => HASH_U32,
        ValueType::U64 => HASH_U64,
        ValueType::S8 => HASH_S8,
        ValueType::S16 => HASH_S16,
        ValueType::S32 => HASH_S32,
        ValueType::S64 => HASH_S64,
        ValueType::F32 => HASH_F32,
        ValueType::F64 => HASH_F64,
        ValueType::Char => HASH_CHAR,
        ValueType::String => HASH_STRING,
        ValueType::Entity => HASH_ENTITY,
        ValueType::Any => HASH_ANY,
        ValueType::List(inner) => TypeHasher::new()
            .tag(HASH_TAG_LIST)
            .child(&hash_type(inner))
            .finish(),
        ValueType::Option(inner) => TypeHasher::new()
            .tag(HASH_TAG_OPTION)
            .child(&hash_type(inner))
            .finish(),
        // Records are nominal here: the fields live with the entity, not the signature
        ValueType::Record(name) => TypeHasher::new().tag(HASH_TAG_RECORD).string(name).finish(),
        ValueType::Tuple(items) => {
            let mut hasher = TypeHasher::new().tag(HASH_TAG_TUPLE).count(items.len());
            for item in items {
                hasher = hasher.child(&hash_type(item));
            }
            hasher.finish()
        }
    }
}

/// Hash an operation signature (name included).
pub fn hash_signature(name: &str, params: &[ValueType], result: &ValueType) -> TypeHash {
    let mut hasher = TypeHasher::new()
        .tag(HASH_TAG_SIGNATURE)
        .string(name)
        .count(params.len());
    for param in params {
        hasher = hasher.child(&hash_type(param));
    }
    hasher.child(&hash_type(result)).finish()
}

/// Hash an unordered set of named members under a domain label.
///
/// Members are sorted and deduplicated first.
pub fn hash_set<'a, I>(domain: &str, members: I) -> TypeHash
where
    I: IntoIterator<Item = &'a str>,
{
    let mut sorted: Vec<&str> = members.into_iter().collect();
    sorted.sort_unstable();
    sorted.dedup();

    let mut hasher = TypeHasher::new()
        .tag(HASH_TAG_SET)
        .string(domain)
        .count(sorted.len());
    for member in sorted {
        hasher = hasher.string(member);
    }
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_type_primitives() {
        assert_eq!(hash_type(&ValueType::Bool), HASH_BOOL);
        assert_eq!(hash_type(&ValueType::String), HASH_STRING);
        assert_ne!(HASH_S32, HASH_S64);
    }

    #[test]
    fn test_hash_signature_includes_name_and_types() {
        let a = hash_signature("getName", &[], &ValueType::String);
        let b = hash_signature("getName", &[], &ValueType::String);
        let c = hash_signature("getLabel", &[], &ValueType::String);
        let d = hash_signature("getName", &[ValueType::S64], &ValueType::String);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn test_hash_set_is_order_independent() {
        let a = hash_set("roles", ["ex:B", "ex:A"]);
        let b = hash_set("roles", ["ex:A", "ex:B", "ex:A"]);
        assert_eq!(a, b);
        assert_ne!(a, hash_set("other", ["ex:A", "ex:B"]));
    }

    #[test]
    fn test_short_hex_is_prefix() {
        let h = hash_set("roles", ["ex:A"]);
        assert_eq!(h.to_short_hex().len(), 8);
        assert!(h.to_hex().starts_with(&h.to_short_hex()));
    }
}
