//! Behaviour Discovery
//!
//! Two sources feed a composition with candidate behaviours:
//! - [`BehaviourProvider`]s, queried in registration order with the
//!   composite's interfaces
//! - [`RoleBehaviours`], which turns class roles into factories of their own
//!   (a plain role factory, or an adapter for abstract roles)

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::behaviour::{BehaviourFactory, FactoryOrigin};
use crate::compose::CompositionError;
use crate::hierarchy;
use crate::registry::RoleRegistry;
use crate::signature::Signature;
use crate::sync;
use crate::types::{OpBody, RoleId, RoleSet};

/// A source of behaviour factories.
pub trait BehaviourProvider: Send + Sync {
    /// Factories implementing any of `roles` (interfaces of the composite,
    /// supers included) or the `base` roles. Order is significant: it is the
    /// discovery order used to break ties.
    fn discover(&self, roles: &RoleSet, base: &RoleSet) -> Vec<Arc<BehaviourFactory>>;
}

/// A fixed list of factories, matched by role and capability.
#[derive(Default)]
pub struct BehaviourCatalog {
    factories: Vec<Arc<BehaviourFactory>>,
}

impl BehaviourCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, factory: Arc<BehaviourFactory>) -> Self {
        self.add(factory);
        self
    }

    pub fn add(&mut self, factory: Arc<BehaviourFactory>) {
        self.factories.push(factory);
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<BehaviourFactory>> {
        self.factories.iter()
    }
}

impl BehaviourProvider for BehaviourCatalog {
    fn discover(&self, roles: &RoleSet, base: &RoleSet) -> Vec<Arc<BehaviourFactory>> {
        self.factories
            .iter()
            .filter(|f| {
                roles.contains(f.role())
                    || base.contains(f.role())
                    || f.capabilities().iter().any(|cap| roles.contains(cap))
            })
            .cloned()
            .collect()
    }
}

/// Role and adapter factories, materialized once per class role.
///
/// The result depends only on the role, never on the type set it appears in,
/// so one factory serves every composite that includes the role.
#[derive(Default)]
pub struct RoleBehaviours {
    cache: RwLock<HashMap<RoleId, Option<Arc<BehaviourFactory>>>>,
}

impl RoleBehaviours {
    pub fn new() -> Self {
        Self::default()
    }

    /// The factory answering `role`'s concrete operations, or `None` when the
    /// role has none.
    pub fn behaviour_for(
        &self,
        registry: &dyn RoleRegistry,
        role: &RoleId,
    ) -> Result<Option<Arc<BehaviourFactory>>, CompositionError> {
        if let Some(cached) = sync::read(&self.cache).get(role) {
            return Ok(cached.clone());
        }

        let materialized = materialize(registry, role)?;
        let mut cache = sync::write(&self.cache);
        Ok(cache.entry(role.clone()).or_insert(materialized).clone())
    }

    /// Number of roles materialized so far.
    pub fn len(&self) -> usize {
        sync::read(&self.cache).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn materialize(
    registry: &dyn RoleRegistry,
    id: &RoleId,
) -> Result<Option<Arc<BehaviourFactory>>, CompositionError> {
    let role = hierarchy::lookup(registry, id)?;
    let ops = hierarchy::class_operations(registry, id)?;

    let concrete: Vec<Signature> = ops
        .values()
        .filter(|eff| matches!(eff.operation.body, OpBody::Concrete))
        .map(|eff| eff.operation.signature.clone())
        .collect();
    if concrete.is_empty() {
        return Ok(None);
    }

    let abstract_ops = ops.values().filter(|eff| eff.operation.is_abstract()).count();

    let (factory_id, origin) = if abstract_ops == 0 {
        (format!("role:{}", id), FactoryOrigin::Role)
    } else {
        (format!("adapter:{}", id), FactoryOrigin::Adapter)
    };

    let constructor = role.constructor().cloned().ok_or_else(|| {
        CompositionError::BehaviourConstruction {
            behaviour: factory_id.clone(),
            role: id.clone(),
            source: "role declares concrete operations but has no constructor".into(),
        }
    })?;

    debug!(
        role = %id,
        factory = %factory_id,
        concrete = concrete.len(),
        left_to_composite = abstract_ops,
        "materialized role behaviour"
    );

    // An adapter answers only the concrete operations. Its abstract ones stay
    // slots of the composite, which the role object reaches through
    // `CallContext::this`.
    let mut builder = BehaviourFactory::builder(factory_id, id.clone())
        .origin(origin)
        .constructor_arc(constructor);
    for sig in concrete {
        builder = builder.answers(sig);
    }

    Ok(Some(builder.build()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behaviour::FnBehaviour;
    use crate::registry::StaticRoleRegistry;
    use crate::types::Role;
    use rolekit_abi::ValueType;

    fn area() -> Signature {
        Signature::new("area", vec![], ValueType::F64)
    }

    fn describe() -> Signature {
        Signature::new("describe", vec![], ValueType::String)
    }

    fn registry() -> StaticRoleRegistry {
        StaticRoleRegistry::builder()
            .role(
                Role::class("ex:Shape")
                    .requires(area())
                    .provides(describe())
                    .constructor(|_| Ok(Arc::new(FnBehaviour::new())))
                    .build(),
            )
            .role(
                Role::class("ex:Square")
                    .extends("ex:Shape")
                    .provides(area())
                    .constructor(|_| Ok(Arc::new(FnBehaviour::new())))
                    .build(),
            )
            .role(Role::class("ex:Marker").build())
            .role(
                Role::class("ex:Broken")
                    .provides(describe())
                    .build(),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_concrete_role_gets_role_factory() {
        let reg = registry();
        let behaviours = RoleBehaviours::new();
        let factory = behaviours
            .behaviour_for(&reg, &"ex:Square".into())
            .unwrap()
            .unwrap();
        assert_eq!(factory.id(), "role:ex:Square");
        assert_eq!(factory.origin(), FactoryOrigin::Role);
        assert!(factory.answers().contains(&area()));
        assert!(factory.answers().contains(&describe()));
    }

    #[test]
    fn test_abstract_role_gets_adapter_that_skips_abstract_ops() {
        let reg = registry();
        let behaviours = RoleBehaviours::new();
        let factory = behaviours
            .behaviour_for(&reg, &"ex:Shape".into())
            .unwrap()
            .unwrap();
        assert_eq!(factory.id(), "adapter:ex:Shape");
        assert_eq!(factory.origin(), FactoryOrigin::Adapter);
        assert_eq!(factory.target_for(&area()), None);
        assert_eq!(factory.target_for(&describe()), Some(describe()));
    }

    #[test]
    fn test_adapter_object_is_the_role_object() {
        let reg = registry();
        let factory = RoleBehaviours::new()
            .behaviour_for(&reg, &"ex:Shape".into())
            .unwrap()
            .unwrap();
        assert_eq!(factory.answers().len(), 1);
        assert!(factory.has_constructor());
        assert!(!factory.is_singleton());
    }

    #[test]
    fn test_factories_cached_by_role() {
        let reg = registry();
        let behaviours = RoleBehaviours::new();
        let a = behaviours.behaviour_for(&reg, &"ex:Square".into()).unwrap().unwrap();
        let b = behaviours.behaviour_for(&reg, &"ex:Square".into()).unwrap().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(behaviours.behaviour_for(&reg, &"ex:Marker".into()).unwrap().is_none());
        assert_eq!(behaviours.len(), 2);
    }

    #[test]
    fn test_concrete_ops_without_constructor_fail() {
        let reg = registry();
        let err = RoleBehaviours::new()
            .behaviour_for(&reg, &"ex:Broken".into())
            .err()
            .unwrap();
        assert!(matches!(err, CompositionError::BehaviourConstruction { .. }));
    }

    #[test]
    fn test_catalog_matches_role_base_and_capability() {
        let catalog = BehaviourCatalog::new()
            .with(BehaviourFactory::builder("by-role", "ex:A").build())
            .with(BehaviourFactory::builder("by-cap", "ex:Other").capability("ex:A").build())
            .with(BehaviourFactory::builder("by-base", "ex:Base").build())
            .with(BehaviourFactory::builder("unrelated", "ex:Z").build());

        let roles = RoleSet::from(["ex:A".into()]);
        let base = RoleSet::from(["ex:Base".into()]);
        let found: Vec<String> = catalog
            .discover(&roles, &base)
            .iter()
            .map(|f| f.id().to_string())
            .collect();
        assert_eq!(found, ["by-role", "by-cap", "by-base"]);
    }
}
