//! Composition plans
//!
//! A plan is everything the composer decided for one normalized role set,
//! in a form a synthesis backend can turn into a type without consulting the
//! registry again.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use rolekit_abi::hash::hash_set;
use rolekit_abi::TypeHash;

use crate::behaviour::BehaviourFactory;
use crate::signature::Signature;
use crate::types::{Handler, RoleId, RoleSet};

const COMPOSITE_DOMAIN: &str = "rolekit.composite";
const BASE_MARKER: &str = "base=";

/// Content-addressed name of a composite type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CompositeName(TypeHash);

impl CompositeName {
    /// Hash of the normalized roles plus the selected base.
    ///
    /// Inputs that normalize to the same roles share a name, whatever their
    /// order or redundancy.
    pub fn of(roles: &RoleSet, base: Option<&RoleId>) -> Self {
        let base_member = base.map(|b| format!("{}{}", BASE_MARKER, b));
        let members = roles
            .iter()
            .map(RoleId::as_str)
            .chain(base_member.as_deref());
        CompositeName(hash_set(COMPOSITE_DOMAIN, members))
    }

    pub fn hash(&self) -> &TypeHash {
        &self.0
    }
}

impl fmt::Display for CompositeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Composite${}", self.0)
    }
}

impl Serialize for CompositeName {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// How a dispatch slot is answered.
#[derive(Clone)]
pub enum BindingPlan {
    /// By `behaviours[index]`, invoked with `target`.
    Behaviour { index: usize, target: Signature },
    /// By the default body declared by `role`.
    Default { role: RoleId, handler: Handler },
}

impl fmt::Debug for BindingPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingPlan::Behaviour { index, target } => f
                .debug_struct("Behaviour")
                .field("index", index)
                .field("target", target)
                .finish(),
            BindingPlan::Default { role, .. } => {
                f.debug_struct("Default").field("role", role).finish_non_exhaustive()
            }
        }
    }
}

/// One operation of the composite.
#[derive(Debug, Clone)]
pub struct SlotPlan {
    pub signature: Signature,
    /// Included roles that declare the operation, sorted.
    pub declared_by: Vec<RoleId>,
    pub binding: BindingPlan,
}

/// A finalized composition, ready for synthesis.
#[derive(Debug, Clone)]
pub struct CompositionPlan {
    pub name: CompositeName,
    /// Normalized roles (base included).
    pub roles: RoleSet,
    /// Normalized roles plus every super role.
    pub interfaces: RoleSet,
    pub base: Option<RoleId>,
    /// Factories bound by at least one slot, in discovery order.
    pub behaviours: Vec<Arc<BehaviourFactory>>,
    /// Slots sorted by signature.
    pub slots: Vec<SlotPlan>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roles(ids: &[&str]) -> RoleSet {
        ids.iter().map(|id| RoleId::from(*id)).collect()
    }

    #[test]
    fn test_name_ignores_order() {
        let a = CompositeName::of(&roles(&["ex:A", "ex:B"]), None);
        let b = CompositeName::of(&roles(&["ex:B", "ex:A"]), None);
        assert_eq!(a, b);
    }

    #[test]
    fn test_name_depends_on_base() {
        let set = roles(&["ex:A", "ex:Base"]);
        let with_base = CompositeName::of(&set, Some(&"ex:Base".into()));
        let without = CompositeName::of(&set, None);
        assert_ne!(with_base, without);
        assert!(with_base.to_string().starts_with("Composite$"));
    }
}
