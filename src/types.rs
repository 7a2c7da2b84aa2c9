//! Role Model
//!
//! Identifiers, type sets and role descriptors shared by every stage of
//! composition:
//! - **TypeSet** is the raw, order-independent input (ontology type ids)
//! - **RoleSet** is the accumulator filled by the registry and the
//!   normalized output of the composer
//! - **Role** is a behavioural contract, either a capability (interface-like)
//!   or a class (concrete, possibly the base spine of a composite)

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::behaviour::{Behaviour, CallContext};
use crate::composite::EntityHandle;
use crate::signature::Signature;
use rolekit_abi::Value;

/// Error type carried across behaviour boundaries unchanged.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A bound operation body.
pub type Handler = Arc<dyn Fn(&CallContext<'_>, &[Value]) -> Result<Value, BoxError> + Send + Sync>;

/// Builds the object answering a role's (or behaviour's) concrete operations
/// for one entity.
pub type Constructor =
    Arc<dyn Fn(&EntityHandle) -> Result<Arc<dyn Behaviour>, BoxError> + Send + Sync>;

macro_rules! identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:?}", self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self::new(id)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

identifier! {
    /// Identifier of an ontology type (e.g. an OWL class IRI).
    TypeId
}

identifier! {
    /// Identifier of a role.
    RoleId
}

identifier! {
    /// Identifier of a managed entity (its subject IRI or blank node label).
    EntityId
}

/// Ordered set of roles.
pub type RoleSet = BTreeSet<RoleId>;

/// Immutable, order-independent set of ontology type identifiers.
///
/// Equality is set equality: `{A, B} == {B, A}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeSet(BTreeSet<TypeId>);

impl TypeSet {
    /// The empty type set (a blank entity).
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, id: &TypeId) -> bool {
        self.0.contains(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TypeId> {
        self.0.iter()
    }
}

impl<T: Into<TypeId>> FromIterator<T> for TypeSet {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl<'a> IntoIterator for &'a TypeSet {
    type Item = &'a TypeId;
    type IntoIter = std::collections::btree_set::Iter<'a, TypeId>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Comma-separated list of identifiers for error messages.
pub(crate) fn join_ids<T: fmt::Display>(ids: impl IntoIterator<Item = T>) -> String {
    ids.into_iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

// ============================================================================
// Roles
// ============================================================================

/// The two kinds of behavioural contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleKind {
    /// Interface-like: any number per composite, never instantiated.
    Capability,
    /// Concrete: may be instantiated, at most one serves as the base spine.
    Class,
}

/// How an operation is implemented by the role declaring it.
#[derive(Clone)]
pub enum OpBody {
    /// Must be answered by some behaviour.
    Abstract,
    /// Answered by the object the role's constructor builds (class roles).
    Concrete,
    /// Fallback used only when no behaviour answers the operation.
    Default(Handler),
}

impl fmt::Debug for OpBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpBody::Abstract => f.write_str("Abstract"),
            OpBody::Concrete => f.write_str("Concrete"),
            OpBody::Default(_) => f.write_str("Default(..)"),
        }
    }
}

/// An operation declared by a role.
#[derive(Debug, Clone)]
pub struct Operation {
    pub signature: Signature,
    pub body: OpBody,
}

impl Operation {
    pub fn required(signature: Signature) -> Self {
        Self {
            signature,
            body: OpBody::Abstract,
        }
    }

    pub fn concrete(signature: Signature) -> Self {
        Self {
            signature,
            body: OpBody::Concrete,
        }
    }

    pub fn with_default(signature: Signature, handler: Handler) -> Self {
        Self {
            signature,
            body: OpBody::Default(handler),
        }
    }

    pub fn is_abstract(&self) -> bool {
        matches!(self.body, OpBody::Abstract)
    }
}

/// A behavioural contract.
pub struct Role {
    id: RoleId,
    kind: RoleKind,
    supers: Vec<RoleId>,
    operations: Vec<Operation>,
    constructor: Option<Constructor>,
}

impl Role {
    /// Start describing a capability role.
    pub fn capability(id: impl Into<RoleId>) -> RoleBuilder {
        RoleBuilder::new(id.into(), RoleKind::Capability)
    }

    /// Start describing a class role.
    pub fn class(id: impl Into<RoleId>) -> RoleBuilder {
        RoleBuilder::new(id.into(), RoleKind::Class)
    }

    pub fn id(&self) -> &RoleId {
        &self.id
    }

    pub fn kind(&self) -> RoleKind {
        self.kind
    }

    pub fn is_capability(&self) -> bool {
        self.kind == RoleKind::Capability
    }

    pub fn is_class(&self) -> bool {
        self.kind == RoleKind::Class
    }

    /// Direct super roles.
    pub fn supers(&self) -> &[RoleId] {
        &self.supers
    }

    /// Operations declared by this role itself (not inherited).
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn constructor(&self) -> Option<&Constructor> {
        self.constructor.as_ref()
    }
}

impl fmt::Debug for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Role")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("supers", &self.supers)
            .field("operations", &self.operations)
            .field("constructor", &self.constructor.is_some())
            .finish()
    }
}

/// Builder for [`Role`].
pub struct RoleBuilder {
    role: Role,
}

impl RoleBuilder {
    fn new(id: RoleId, kind: RoleKind) -> Self {
        Self {
            role: Role {
                id,
                kind,
                supers: Vec::new(),
                operations: Vec::new(),
                constructor: None,
            },
        }
    }

    /// Declare a direct super role (`self is-a parent`).
    pub fn extends(mut self, parent: impl Into<RoleId>) -> Self {
        self.role.supers.push(parent.into());
        self
    }

    pub fn operation(mut self, operation: Operation) -> Self {
        self.role.operations.push(operation);
        self
    }

    /// Declare an abstract operation.
    pub fn requires(self, signature: Signature) -> Self {
        self.operation(Operation::required(signature))
    }

    /// Declare an operation answered by this role's constructed object.
    pub fn provides(self, signature: Signature) -> Self {
        self.operation(Operation::concrete(signature))
    }

    /// Declare an operation with a fallback body.
    pub fn defaults<F>(self, signature: Signature, body: F) -> Self
    where
        F: Fn(&CallContext<'_>, &[Value]) -> Result<Value, BoxError> + Send + Sync + 'static,
    {
        self.operation(Operation::with_default(signature, Arc::new(body)))
    }

    /// Set the constructor used to instantiate this role for an entity.
    pub fn constructor<F>(mut self, f: F) -> Self
    where
        F: Fn(&EntityHandle) -> Result<Arc<dyn Behaviour>, BoxError> + Send + Sync + 'static,
    {
        self.role.constructor = Some(Arc::new(f));
        self
    }

    pub fn build(self) -> Role {
        self.role
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rolekit_abi::ValueType;

    #[test]
    fn test_type_set_is_order_independent() {
        let a: TypeSet = ["ex:A", "ex:B"].into_iter().collect();
        let b: TypeSet = ["ex:B", "ex:A", "ex:B"].into_iter().collect();
        assert_eq!(a, b);
        assert_eq!(a.len(), 2);
        assert!(TypeSet::empty().is_empty());
    }

    #[test]
    fn test_role_builder_collects_declarations() {
        let role = Role::class("ex:Person")
            .extends("ex:Agent")
            .requires(Signature::new("getName", vec![], ValueType::String))
            .provides(Signature::new("greet", vec![], ValueType::String))
            .build();

        assert!(role.is_class());
        assert_eq!(role.supers(), &[RoleId::from("ex:Agent")]);
        assert_eq!(role.operations().len(), 2);
        assert!(role.operations()[0].is_abstract());
        assert!(!role.operations()[1].is_abstract());
        assert!(role.constructor().is_none());
    }

    #[test]
    fn test_identifiers_display_plainly() {
        let id = RoleId::from("ex:Person");
        assert_eq!(id.to_string(), "ex:Person");
        assert_eq!(format!("{:?}", id), "\"ex:Person\"");
        assert_eq!(join_ids([RoleId::from("a"), RoleId::from("b")]), "a, b");
    }
}
