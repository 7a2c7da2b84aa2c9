//! Error types for role composition.

use thiserror::Error;

use crate::hierarchy::UnknownRole;
use crate::synth::SynthesisError;
use crate::types::{join_ids, BoxError, RoleId};

/// A composition that cannot be carried out.
///
/// Composition is all-or-nothing: when this is returned no type was
/// synthesized and nothing was cached.
#[derive(Debug, Error)]
pub enum CompositionError {
    /// No behaviour answers an operation and no role supplies a default.
    #[error("unresolved operation {operation} declared by {}", join_ids(.roles))]
    UnresolvedMethod {
        operation: String,
        roles: Vec<RoleId>,
    },

    /// Two or more unrelated class roles each want to be the base spine.
    #[error("ambiguous base class: {}", join_ids(.candidates))]
    AmbiguousBaseClass { candidates: Vec<RoleId> },

    /// A behaviour could not be materialized or built for an entity.
    #[error("behaviour '{behaviour}' for role '{role}' could not be constructed: {source}")]
    BehaviourConstruction {
        behaviour: String,
        role: RoleId,
        #[source]
        source: BoxError,
    },

    /// The backend refused the finalized plan.
    #[error("synthesis of composite {name} failed: {source}")]
    Synthesis {
        name: String,
        #[source]
        source: SynthesisError,
    },

    /// A role id reached the composer without a registered descriptor.
    #[error("unknown role '{0}'")]
    UnknownRole(RoleId),
}

/// Which composition rule was violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    UnresolvedMethod,
    AmbiguousBaseClass,
    BehaviourConstruction,
    Synthesis,
    UnknownRole,
}

impl CompositionError {
    pub fn kind(&self) -> ConflictKind {
        match self {
            CompositionError::UnresolvedMethod { .. } => ConflictKind::UnresolvedMethod,
            CompositionError::AmbiguousBaseClass { .. } => ConflictKind::AmbiguousBaseClass,
            CompositionError::BehaviourConstruction { .. } => ConflictKind::BehaviourConstruction,
            CompositionError::Synthesis { .. } => ConflictKind::Synthesis,
            CompositionError::UnknownRole(_) => ConflictKind::UnknownRole,
        }
    }
}

impl From<UnknownRole> for CompositionError {
    fn from(e: UnknownRole) -> Self {
        CompositionError::UnknownRole(e.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_roles() {
        let err = CompositionError::AmbiguousBaseClass {
            candidates: vec!["ex:ConceptA".into(), "ex:ConceptB".into()],
        };
        assert_eq!(err.to_string(), "ambiguous base class: ex:ConceptA, ex:ConceptB");
        assert_eq!(err.kind(), ConflictKind::AmbiguousBaseClass);

        let err = CompositionError::UnresolvedMethod {
            operation: "getName() -> string".into(),
            roles: vec!["ex:Named".into()],
        };
        assert_eq!(
            err.to_string(),
            "unresolved operation getName() -> string declared by ex:Named"
        );
    }

    #[test]
    fn test_unknown_role_converts() {
        let err: CompositionError = UnknownRole("ex:Nope".into()).into();
        assert_eq!(err.kind(), ConflictKind::UnknownRole);
    }
}
