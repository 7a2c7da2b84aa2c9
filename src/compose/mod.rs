//! Role Composition
//!
//! Turns a raw type set into a [`CompositionPlan`]: the normalized roles of
//! the composite, its base spine, and one bound implementation per required
//! operation.
//!
//! # How It Works
//!
//! 1. **Expand** the type set (plus per-entity roles) through the registry
//! 2. **Deduplicate** roles implied by a more specific role of the same kind
//! 3. **Partition** into capabilities, base candidates and other classes
//! 4. **Select the base**: at most one, never chosen arbitrarily
//! 5. **Materialize** role and adapter behaviours for class roles
//! 6. **Augment** with provider behaviours
//! 7. **Bind** every required signature, resolving contested slots by
//!    precedence and falling back to default bodies
//!
//! ```ignore
//! let composer = Composer::new(registry, vec![catalog]);
//! let plan = composer.plan(&types, None)?;
//! println!("{} binds {} slots", plan.name, plan.slots.len());
//! ```

mod dispatch;
mod error;
mod plan;

pub use error::{CompositionError, ConflictKind};
pub use plan::{BindingPlan, CompositeName, CompositionPlan, SlotPlan};

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::behaviour::BehaviourFactory;
use crate::discovery::{BehaviourProvider, RoleBehaviours};
use crate::hierarchy;
use crate::registry::RoleRegistry;
use crate::types::{join_ids, RoleId, RoleSet, TypeSet};

/// Plans composites against one registry and an ordered list of providers.
pub struct Composer {
    registry: Arc<dyn RoleRegistry>,
    providers: Vec<Arc<dyn BehaviourProvider>>,
    role_behaviours: RoleBehaviours,
}

impl Composer {
    pub fn new(registry: Arc<dyn RoleRegistry>, providers: Vec<Arc<dyn BehaviourProvider>>) -> Self {
        Self {
            registry,
            providers,
            role_behaviours: RoleBehaviours::new(),
        }
    }

    pub fn registry(&self) -> &dyn RoleRegistry {
        self.registry.as_ref()
    }

    /// Role and adapter factories materialized so far.
    pub fn role_behaviours(&self) -> &RoleBehaviours {
        &self.role_behaviours
    }

    /// Every role mapped from `types`, plus `extra`.
    pub fn expand(&self, types: &TypeSet, extra: Option<&RoleSet>) -> Result<RoleSet, CompositionError> {
        let mut roles = RoleSet::new();
        self.registry.find_roles(types, &mut roles);
        if let Some(extra) = extra {
            roles.extend(extra.iter().cloned());
        }

        if let Some(unknown) = roles.iter().find(|id| self.registry.role(id).is_none()) {
            return Err(CompositionError::UnknownRole(unknown.clone()));
        }
        Ok(roles)
    }

    /// Drop every role that another role of the same kind already implies.
    pub fn normalize(&self, roles: &RoleSet) -> Result<RoleSet, CompositionError> {
        let registry = self.registry();
        let mut normalized = RoleSet::new();

        'roles: for id in roles {
            let role = hierarchy::lookup(registry, id)?;
            for other_id in roles {
                if other_id == id {
                    continue;
                }
                let other = hierarchy::lookup(registry, other_id)?;
                if other.kind() == role.kind() && hierarchy::is_a(registry, other_id, id)? {
                    debug!(dropped = %id, implied_by = %other_id, "redundant role");
                    continue 'roles;
                }
            }
            normalized.insert(id.clone());
        }

        Ok(normalized)
    }

    /// Pick the base spine among base-eligible class roles.
    ///
    /// Candidates come from a normalized set, so any chain has already been
    /// collapsed to its most specific member. Whatever remains beyond one
    /// candidate is unrelated and therefore ambiguous.
    fn select_base(&self, normalized: &RoleSet) -> Result<Option<RoleId>, CompositionError> {
        let eligible = self.registry.base_eligible_roles();
        let mut candidates: Vec<RoleId> = Vec::new();
        for id in normalized.iter().filter(|id| eligible.contains(*id)) {
            if hierarchy::lookup(self.registry(), id)?.is_class() {
                candidates.push(id.clone());
            }
        }

        let registry = self.registry();
        let mut most_specific = Vec::new();
        for id in &candidates {
            let mut implied = false;
            for other in &candidates {
                if other != id && hierarchy::is_a(registry, other, id)? {
                    implied = true;
                    break;
                }
            }
            if !implied {
                most_specific.push(id.clone());
            }
        }

        match most_specific.len() {
            0 => Ok(None),
            1 => Ok(most_specific.pop()),
            _ => Err(CompositionError::AmbiguousBaseClass {
                candidates: most_specific,
            }),
        }
    }

    /// Plan the composite for `types` plus `extra` roles.
    pub fn plan(&self, types: &TypeSet, extra: Option<&RoleSet>) -> Result<CompositionPlan, CompositionError> {
        let registry = self.registry();
        let expanded = self.expand(types, extra)?;
        let normalized = self.normalize(&expanded)?;
        let base = self.select_base(&normalized)?;

        let mut interfaces = normalized.clone();
        for id in &normalized {
            interfaces.extend(hierarchy::ancestors(registry, id)?);
        }

        let mut base_roles = RoleSet::new();
        if let Some(base) = &base {
            base_roles.insert(base.clone());
            base_roles.extend(hierarchy::ancestors(registry, base)?);
        }

        let mut classes = RoleSet::new();
        for id in &normalized {
            if Some(id) != base.as_ref() && hierarchy::lookup(registry, id)?.is_class() {
                classes.insert(id.clone());
            }
        }

        debug!(
            types = types.len(),
            roles = %join_ids(&normalized),
            base = ?base,
            "normalized role set"
        );

        let factories = self.discover(base.as_ref(), &classes, &interfaces, &base_roles)?;
        let (behaviours, slots) = dispatch::build(registry, &normalized, factories)?;
        let name = CompositeName::of(&normalized, base.as_ref());

        debug!(
            name = %name,
            behaviours = behaviours.len(),
            slots = slots.len(),
            "composition planned"
        );

        Ok(CompositionPlan {
            name,
            roles: normalized,
            interfaces,
            base,
            behaviours,
            slots,
        })
    }

    /// Candidate factories in discovery order: the base role's own object,
    /// other class roles by id, then providers in registration order.
    fn discover(
        &self,
        base: Option<&RoleId>,
        classes: &RoleSet,
        interfaces: &RoleSet,
        base_roles: &RoleSet,
    ) -> Result<Vec<Arc<BehaviourFactory>>, CompositionError> {
        let registry = self.registry();
        let mut seen = HashSet::new();
        let mut factories = Vec::new();
        let mut push = |factory: Arc<BehaviourFactory>| {
            if seen.insert(factory.id().to_string()) {
                factories.push(factory);
            }
        };

        for id in base.into_iter().chain(classes) {
            if let Some(factory) = self.role_behaviours.behaviour_for(registry, id)? {
                push(factory);
            }
        }
        for provider in &self.providers {
            for factory in provider.discover(interfaces, base_roles) {
                push(factory);
            }
        }

        Ok(factories)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behaviour::FnBehaviour;
    use crate::discovery::BehaviourCatalog;
    use crate::registry::StaticRoleRegistry;
    use crate::signature::Signature;
    use crate::types::Role;
    use rolekit_abi::ValueType;

    fn class_with_ctor(id: &str) -> crate::types::RoleBuilder {
        Role::class(id).constructor(|_| Ok(Arc::new(FnBehaviour::new())))
    }

    fn composer(providers: Vec<Arc<dyn BehaviourProvider>>) -> Composer {
        let registry = StaticRoleRegistry::builder()
            .role(Role::capability("ex:Agent").build())
            .role(Role::capability("ex:Person").extends("ex:Agent").build())
            .role(
                Role::capability("ex:Named")
                    .requires(Signature::new("getName", vec![], ValueType::String))
                    .build(),
            )
            .role(class_with_ctor("ex:Thing").build())
            .role(class_with_ctor("ex:Document").extends("ex:Thing").build())
            .role(class_with_ctor("ex:ConceptA").build())
            .role(class_with_ctor("ex:ConceptB").build())
            .map_type("t:Agent", "ex:Agent")
            .map_type("t:Person", "ex:Person")
            .map_type("t:Named", "ex:Named")
            .map_type("t:Thing", "ex:Thing")
            .map_type("t:Document", "ex:Document")
            .map_type("t:A", "ex:ConceptA")
            .map_type("t:B", "ex:ConceptB")
            .base_eligible("ex:Thing")
            .base_eligible("ex:Document")
            .base_eligible("ex:ConceptA")
            .base_eligible("ex:ConceptB")
            .build()
            .unwrap();
        Composer::new(Arc::new(registry), providers)
    }

    fn types(ids: &[&str]) -> TypeSet {
        ids.iter().copied().collect()
    }

    #[test]
    fn test_normalize_drops_implied_roles() {
        let composer = composer(vec![]);
        let expanded = composer.expand(&types(&["t:Agent", "t:Person"]), None).unwrap();
        let normalized = composer.normalize(&expanded).unwrap();
        assert_eq!(normalized, RoleSet::from(["ex:Person".into()]));
    }

    #[test]
    fn test_base_chain_picks_most_specific() {
        let composer = composer(vec![]);
        let plan = composer.plan(&types(&["t:Thing", "t:Document"]), None).unwrap();
        assert_eq!(plan.base, Some("ex:Document".into()));
        assert!(plan.interfaces.contains(&RoleId::from("ex:Thing")));
    }

    #[test]
    fn test_unrelated_bases_are_ambiguous() {
        let composer = composer(vec![]);
        let err = composer.plan(&types(&["t:B", "t:A"]), None).unwrap_err();
        match err {
            CompositionError::AmbiguousBaseClass { candidates } => {
                assert_eq!(candidates, vec![RoleId::from("ex:ConceptA"), "ex:ConceptB".into()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_extra_roles_must_be_registered() {
        let composer = composer(vec![]);
        let extra = RoleSet::from(["ex:Ghost".into()]);
        let err = composer.plan(&TypeSet::empty(), Some(&extra)).unwrap_err();
        assert_eq!(err.kind(), ConflictKind::UnknownRole);
    }

    #[test]
    fn test_unanswered_operation_is_unresolved() {
        let composer = composer(vec![]);
        let err = composer.plan(&types(&["t:Named"]), None).unwrap_err();
        match err {
            CompositionError::UnresolvedMethod { operation, roles } => {
                assert_eq!(operation, "getName() -> string");
                assert_eq!(roles, vec![RoleId::from("ex:Named")]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_provider_answers_capability() {
        let named = FnBehaviour::new().typed("getName", |_, (): ()| Ok("Alice".to_string()));
        let catalog = BehaviourCatalog::new()
            .with(BehaviourFactory::builder("name", "ex:Named").behaviour(named).build());
        let composer = composer(vec![Arc::new(catalog)]);

        let plan = composer.plan(&types(&["t:Named", "t:Thing"]), None).unwrap();
        assert_eq!(plan.behaviours.len(), 1);
        assert_eq!(plan.slots.len(), 1);
        assert!(matches!(
            plan.slots[0].binding,
            BindingPlan::Behaviour { index: 0, .. }
        ));
    }

    #[test]
    fn test_plan_name_ignores_redundant_roles() {
        let composer = composer(vec![]);
        let a = composer.plan(&types(&["t:Person"]), None).unwrap();
        let b = composer.plan(&types(&["t:Agent", "t:Person"]), None).unwrap();
        assert_eq!(a.name, b.name);
    }
}
