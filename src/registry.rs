//! Role Registry
//!
//! The registry is the boundary to whatever compiled the ontology: it maps
//! type ids and individual entities to roles and hands out role descriptors.
//! [`StaticRoleRegistry`] is the in-memory implementation, validated once at
//! build time and immutable afterwards.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use thiserror::Error;

use crate::hierarchy;
use crate::types::{join_ids, EntityId, OpBody, Role, RoleId, RoleSet, TypeId, TypeSet};

/// Source of roles for type sets and individual entities.
pub trait RoleRegistry: Send + Sync {
    /// Add the roles mapped from every type in `types` to `roles`.
    fn find_roles(&self, types: &TypeSet, roles: &mut RoleSet);

    /// Add the roles attached directly to `entity` to `roles`.
    fn find_individual_roles(&self, entity: &EntityId, roles: &mut RoleSet);

    /// Cheap check run before [`find_individual_roles`](Self::find_individual_roles).
    fn has_individual_roles(&self, entity: &EntityId) -> bool;

    /// Class roles allowed to serve as the base spine of a composite.
    fn base_eligible_roles(&self) -> &RoleSet;

    fn role(&self, id: &RoleId) -> Option<&Arc<Role>>;
}

/// Errors found while validating a registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("role '{0}' registered twice")]
    DuplicateRole(RoleId),

    #[error("role '{role}' extends unknown role '{parent}'")]
    UnknownSuperRole { role: RoleId, parent: RoleId },

    #[error("circular role hierarchy: {}", join_ids(.cycle))]
    CircularHierarchy { cycle: Vec<RoleId> },

    /// Capabilities are never instantiated, so nothing could answer this.
    #[error("capability role '{role}' declares {what}")]
    InstantiableCapability { role: RoleId, what: String },

    #[error("role '{role}' cannot be a base class: {reason}")]
    NotBaseEligible { role: RoleId, reason: &'static str },

    /// A type mapping, individual or base entry names an unregistered role.
    #[error("{context} refers to unknown role '{role}'")]
    UnknownRole { role: RoleId, context: String },
}

/// In-memory registry.
pub struct StaticRoleRegistry {
    roles: BTreeMap<RoleId, Arc<Role>>,
    types: HashMap<TypeId, RoleSet>,
    individuals: HashMap<EntityId, RoleSet>,
    base_eligible: RoleSet,
}

impl StaticRoleRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// All registered roles, ordered by id.
    pub fn roles(&self) -> impl Iterator<Item = &Arc<Role>> {
        self.roles.values()
    }

    /// Roles mapped from a single type id.
    pub fn roles_for_type(&self, ty: &TypeId) -> Option<&RoleSet> {
        self.types.get(ty)
    }

    /// Type ids with a role mapping, sorted.
    pub fn type_ids(&self) -> Vec<&TypeId> {
        let mut ids: Vec<_> = self.types.keys().collect();
        ids.sort();
        ids
    }

    /// Entities with individual roles, sorted.
    pub fn individuals(&self) -> Vec<(&EntityId, &RoleSet)> {
        let mut entries: Vec<_> = self.individuals.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
    }
}

impl RoleRegistry for StaticRoleRegistry {
    fn find_roles(&self, types: &TypeSet, roles: &mut RoleSet) {
        for ty in types {
            if let Some(mapped) = self.types.get(ty) {
                roles.extend(mapped.iter().cloned());
            }
        }
    }

    fn find_individual_roles(&self, entity: &EntityId, roles: &mut RoleSet) {
        if let Some(own) = self.individuals.get(entity) {
            roles.extend(own.iter().cloned());
        }
    }

    fn has_individual_roles(&self, entity: &EntityId) -> bool {
        self.individuals.contains_key(entity)
    }

    fn base_eligible_roles(&self) -> &RoleSet {
        &self.base_eligible
    }

    fn role(&self, id: &RoleId) -> Option<&Arc<Role>> {
        self.roles.get(id)
    }
}

/// Builder for [`StaticRoleRegistry`].
#[derive(Default)]
pub struct RegistryBuilder {
    roles: Vec<Role>,
    types: Vec<(TypeId, RoleId)>,
    individuals: Vec<(EntityId, RoleId)>,
    base_eligible: Vec<RoleId>,
}

impl RegistryBuilder {
    pub fn role(mut self, role: Role) -> Self {
        self.roles.push(role);
        self
    }

    /// Map an ontology type to a role. A type may map to several roles.
    pub fn map_type(mut self, ty: impl Into<TypeId>, role: impl Into<RoleId>) -> Self {
        self.types.push((ty.into(), role.into()));
        self
    }

    /// Attach a role to a single entity.
    pub fn individual(mut self, entity: impl Into<EntityId>, role: impl Into<RoleId>) -> Self {
        self.individuals.push((entity.into(), role.into()));
        self
    }

    /// Allow a class role to be the base spine of composites.
    pub fn base_eligible(mut self, role: impl Into<RoleId>) -> Self {
        self.base_eligible.push(role.into());
        self
    }

    pub fn build(self) -> Result<StaticRoleRegistry, RegistryError> {
        let mut roles = BTreeMap::new();
        for role in self.roles {
            let id = role.id().clone();
            if roles.insert(id.clone(), Arc::new(role)).is_some() {
                return Err(RegistryError::DuplicateRole(id));
            }
        }

        for role in roles.values() {
            for parent in role.supers() {
                if !roles.contains_key(parent) {
                    return Err(RegistryError::UnknownSuperRole {
                        role: role.id().clone(),
                        parent: parent.clone(),
                    });
                }
            }
        }

        for role in roles.values().filter(|r| r.is_capability()) {
            check_capability(role)?;
        }

        check_acyclic(&roles)?;

        let mut types: HashMap<TypeId, RoleSet> = HashMap::new();
        for (ty, role) in self.types {
            known(&roles, &role, || format!("type '{}'", ty))?;
            types.entry(ty).or_default().insert(role);
        }

        let mut individuals: HashMap<EntityId, RoleSet> = HashMap::new();
        for (entity, role) in self.individuals {
            known(&roles, &role, || format!("individual '{}'", entity))?;
            individuals.entry(entity).or_default().insert(role);
        }

        let mut registry = StaticRoleRegistry {
            roles,
            types,
            individuals,
            base_eligible: RoleSet::new(),
        };

        for id in self.base_eligible {
            known(&registry.roles, &id, || "base class list".to_string())?;
            check_base_eligible(&registry, &id)?;
            registry.base_eligible.insert(id);
        }

        Ok(registry)
    }
}

fn known(
    roles: &BTreeMap<RoleId, Arc<Role>>,
    role: &RoleId,
    context: impl FnOnce() -> String,
) -> Result<(), RegistryError> {
    if roles.contains_key(role) {
        Ok(())
    } else {
        Err(RegistryError::UnknownRole {
            role: role.clone(),
            context: context(),
        })
    }
}

fn check_capability(role: &Role) -> Result<(), RegistryError> {
    let instantiable = |what: String| RegistryError::InstantiableCapability {
        role: role.id().clone(),
        what,
    };

    if let Some(op) = role
        .operations()
        .iter()
        .find(|op| matches!(op.body, OpBody::Concrete))
    {
        return Err(instantiable(format!("concrete operation {}", op.signature)));
    }
    if role.constructor().is_some() {
        return Err(instantiable("a constructor".to_string()));
    }
    Ok(())
}

fn check_base_eligible(registry: &StaticRoleRegistry, id: &RoleId) -> Result<(), RegistryError> {
    let not_eligible = |reason| RegistryError::NotBaseEligible {
        role: id.clone(),
        reason,
    };

    let role = registry
        .roles
        .get(id)
        .ok_or_else(|| not_eligible("not registered"))?;
    if !role.is_class() {
        return Err(not_eligible("capability roles are never instantiated"));
    }
    if role.constructor().is_none() {
        return Err(not_eligible("no constructor"));
    }
    let is_abstract = hierarchy::is_abstract(registry, id).map_err(|e| RegistryError::UnknownRole {
        role: e.0,
        context: format!("base class '{}'", id),
    })?;
    if is_abstract {
        return Err(not_eligible("abstract operations remain"));
    }
    Ok(())
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Visiting,
    Done,
}

fn check_acyclic(roles: &BTreeMap<RoleId, Arc<Role>>) -> Result<(), RegistryError> {
    fn visit(
        id: &RoleId,
        roles: &BTreeMap<RoleId, Arc<Role>>,
        marks: &mut HashMap<RoleId, Mark>,
        path: &mut Vec<RoleId>,
    ) -> Result<(), RegistryError> {
        match marks.get(id) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                let start = path.iter().position(|p| p == id).unwrap_or(0);
                let mut cycle = path[start..].to_vec();
                cycle.push(id.clone());
                return Err(RegistryError::CircularHierarchy { cycle });
            }
            None => {}
        }

        marks.insert(id.clone(), Mark::Visiting);
        path.push(id.clone());
        if let Some(role) = roles.get(id) {
            for parent in role.supers() {
                visit(parent, roles, marks, path)?;
            }
        }
        path.pop();
        marks.insert(id.clone(), Mark::Done);
        Ok(())
    }

    let mut marks = HashMap::new();
    let mut path = Vec::new();
    for id in roles.keys() {
        visit(id, roles, &mut marks, &mut path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behaviour::FnBehaviour;
    use crate::signature::Signature;
    use rolekit_abi::{Value, ValueType};

    fn thing() -> Role {
        Role::class("ex:Thing")
            .constructor(|_| Ok(Arc::new(FnBehaviour::new())))
            .build()
    }

    #[test]
    fn test_find_roles_unions_type_mappings() {
        let reg = StaticRoleRegistry::builder()
            .role(Role::capability("ex:A").build())
            .role(Role::capability("ex:B").build())
            .map_type("t:1", "ex:A")
            .map_type("t:2", "ex:A")
            .map_type("t:2", "ex:B")
            .build()
            .unwrap();

        let mut roles = RoleSet::new();
        let types: TypeSet = ["t:1", "t:2", "t:unmapped"].into_iter().collect();
        reg.find_roles(&types, &mut roles);
        assert_eq!(roles, RoleSet::from(["ex:A".into(), "ex:B".into()]));
    }

    #[test]
    fn test_individual_roles() {
        let reg = StaticRoleRegistry::builder()
            .role(Role::capability("ex:A").build())
            .individual("ex:alice", "ex:A")
            .build()
            .unwrap();

        let alice = EntityId::from("ex:alice");
        assert!(reg.has_individual_roles(&alice));
        assert!(!reg.has_individual_roles(&"ex:bob".into()));

        let mut roles = RoleSet::new();
        reg.find_individual_roles(&alice, &mut roles);
        assert!(roles.contains(&RoleId::from("ex:A")));
    }

    #[test]
    fn test_duplicate_role_rejected() {
        let err = StaticRoleRegistry::builder()
            .role(Role::capability("ex:A").build())
            .role(Role::capability("ex:A").build())
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, RegistryError::DuplicateRole(id) if id.as_str() == "ex:A"));
    }

    #[test]
    fn test_unknown_super_rejected() {
        let err = StaticRoleRegistry::builder()
            .role(Role::capability("ex:A").extends("ex:Missing").build())
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, RegistryError::UnknownSuperRole { .. }));
    }

    #[test]
    fn test_cycle_rejected() {
        let err = StaticRoleRegistry::builder()
            .role(Role::capability("ex:A").extends("ex:B").build())
            .role(Role::capability("ex:B").extends("ex:A").build())
            .build()
            .err()
            .unwrap();
        match err {
            RegistryError::CircularHierarchy { cycle } => {
                assert_eq!(cycle.first(), cycle.last());
                assert_eq!(cycle.len(), 3);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_base_eligibility_is_validated() {
        let ok = StaticRoleRegistry::builder()
            .role(thing())
            .base_eligible("ex:Thing")
            .build()
            .unwrap();
        assert!(ok.base_eligible_roles().contains(&RoleId::from("ex:Thing")));

        let err = StaticRoleRegistry::builder()
            .role(Role::capability("ex:Cap").build())
            .base_eligible("ex:Cap")
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, RegistryError::NotBaseEligible { .. }));

        let err = StaticRoleRegistry::builder()
            .role(
                Role::class("ex:Abstract")
                    .requires(Signature::new("f", vec![], ValueType::Bool))
                    .constructor(|_| Ok(Arc::new(FnBehaviour::new())))
                    .build(),
            )
            .base_eligible("ex:Abstract")
            .build()
            .err()
            .unwrap();
        assert!(
            matches!(err, RegistryError::NotBaseEligible { reason, .. } if reason.contains("abstract"))
        );
    }

    #[test]
    fn test_capability_cannot_be_instantiable() {
        let describe = Signature::new("describe", vec![], ValueType::String);
        let err = StaticRoleRegistry::builder()
            .role(Role::capability("ex:Cap").provides(describe).build())
            .map_type("t:Cap", "ex:Cap")
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, RegistryError::InstantiableCapability { ref role, .. } if role.as_str() == "ex:Cap"));
        assert_eq!(
            err.to_string(),
            "capability role 'ex:Cap' declares concrete operation describe() -> string"
        );

        let err = StaticRoleRegistry::builder()
            .role(
                Role::capability("ex:Cap")
                    .constructor(|_| Ok(Arc::new(FnBehaviour::new())))
                    .build(),
            )
            .build()
            .err()
            .unwrap();
        assert_eq!(err.to_string(), "capability role 'ex:Cap' declares a constructor");

        let describe = Signature::new("describe", vec![], ValueType::String);
        assert!(StaticRoleRegistry::builder()
            .role(
                Role::capability("ex:Cap")
                    .defaults(describe, |_, _| Ok(Value::from("plain")))
                    .build(),
            )
            .build()
            .is_ok());
    }

    #[test]
    fn test_mapping_to_unknown_role_rejected() {
        let err = StaticRoleRegistry::builder()
            .map_type("t:1", "ex:Nope")
            .build()
            .err()
            .unwrap();
        assert_eq!(err.to_string(), "type 't:1' refers to unknown role 'ex:Nope'");
    }
}
