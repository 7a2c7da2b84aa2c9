//! Resolver
//!
//! The entry point for everything above the composition engine. Given the
//! type set of an entity (and optionally its individual roles) it returns
//! the cached composite type, composing and synthesizing it on first use.
//!
//! # Example
//!
//! ```ignore
//! let resolver = Resolver::builder(Arc::new(registry))
//!     .provider(Arc::new(catalog))
//!     .build()?;
//!
//! let alice = resolver.instantiate(&"ex:alice".into(), &types)?;
//! let name: String = alice.call_as("getName", &[])?;
//! ```

use std::sync::Arc;

use tracing::debug;

use crate::cache::{CacheKey, CompositionCache};
use crate::compose::{Composer, CompositionError, CompositionPlan};
use crate::composite::{Composite, CompositeType, EntityHandle};
use crate::discovery::BehaviourProvider;
use crate::registry::RoleRegistry;
use crate::synth::{SynthesisBackend, VtableBackend};
use crate::types::{EntityId, RoleSet, TypeSet};

/// Resolves type sets to composite types.
pub struct Resolver {
    composer: Composer,
    backend: Arc<dyn SynthesisBackend>,
    cache: CompositionCache,
    blank: Arc<CompositeType>,
}

impl Resolver {
    pub fn builder(registry: Arc<dyn RoleRegistry>) -> ResolverBuilder {
        ResolverBuilder {
            registry,
            providers: Vec::new(),
            backend: None,
        }
    }

    /// The composite type for `types` plus `extra` roles.
    ///
    /// Equal inputs always return the same `Arc`. Errors come from the
    /// composer unchanged and are not remembered: the next call retries.
    pub fn resolve(
        &self,
        types: &TypeSet,
        extra: Option<&RoleSet>,
    ) -> Result<Arc<CompositeType>, CompositionError> {
        let individual = extra.cloned().unwrap_or_default();
        if types.is_empty() && individual.is_empty() {
            return Ok(Arc::clone(&self.blank));
        }

        let key = CacheKey::new(types.clone(), individual);
        self.cache
            .get_or_compose(&key, || self.compose(types, extra))
    }

    /// The composite type of an entity known only by its individual roles.
    pub fn resolve_entity(&self, entity: &EntityId) -> Result<Arc<CompositeType>, CompositionError> {
        self.resolve_entity_with(entity, &TypeSet::empty())
    }

    /// The composite type of an entity with `types` and its individual roles.
    pub fn resolve_entity_with(
        &self,
        entity: &EntityId,
        types: &TypeSet,
    ) -> Result<Arc<CompositeType>, CompositionError> {
        let registry = self.composer.registry();
        if !registry.has_individual_roles(entity) {
            return self.resolve(types, None);
        }

        let mut individual = RoleSet::new();
        registry.find_individual_roles(entity, &mut individual);
        self.resolve(types, Some(&individual))
    }

    /// The composite type of entities with no types and no roles.
    pub fn resolve_blank(&self) -> Arc<CompositeType> {
        Arc::clone(&self.blank)
    }

    /// The composite type for `types` alone.
    pub fn resolve_blank_with(&self, types: &TypeSet) -> Result<Arc<CompositeType>, CompositionError> {
        self.resolve(types, None)
    }

    /// Resolve an entity's type and bind it to the entity.
    pub fn instantiate(&self, entity: &EntityId, types: &TypeSet) -> Result<Composite, CompositionError> {
        self.resolve_entity_with(entity, types)?
            .instantiate(EntityHandle::new(entity.clone()))
    }

    /// The plan `resolve` would synthesize, without synthesizing or caching.
    pub fn plan(&self, types: &TypeSet, extra: Option<&RoleSet>) -> Result<CompositionPlan, CompositionError> {
        self.composer.plan(types, extra)
    }

    pub fn registry(&self) -> &dyn RoleRegistry {
        self.composer.registry()
    }

    pub fn cache(&self) -> &CompositionCache {
        &self.cache
    }

    fn compose(&self, types: &TypeSet, extra: Option<&RoleSet>) -> Result<Arc<CompositeType>, CompositionError> {
        compose(&self.composer, self.backend.as_ref(), types, extra)
    }
}

/// Plan, then reuse an equivalent definition or synthesize a new one.
fn compose(
    composer: &Composer,
    backend: &dyn SynthesisBackend,
    types: &TypeSet,
    extra: Option<&RoleSet>,
) -> Result<Arc<CompositeType>, CompositionError> {
    let plan = composer.plan(types, extra)?;
    if let Some(existing) = backend.lookup_existing(&plan.name) {
        debug!(name = %plan.name, "reusing composite defined for an equivalent role set");
        return Ok(existing);
    }

    let name = plan.name;
    backend
        .synthesize(plan)
        .map_err(|source| CompositionError::Synthesis {
            name: name.to_string(),
            source,
        })
}

/// Builder for [`Resolver`].
pub struct ResolverBuilder {
    registry: Arc<dyn RoleRegistry>,
    providers: Vec<Arc<dyn BehaviourProvider>>,
    backend: Option<Arc<dyn SynthesisBackend>>,
}

impl ResolverBuilder {
    /// Add a behaviour provider. Providers are consulted in the order added.
    pub fn provider(mut self, provider: Arc<dyn BehaviourProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Use `backend` instead of a fresh [`VtableBackend`].
    pub fn backend(mut self, backend: Arc<dyn SynthesisBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Build the resolver, composing the blank composite up front.
    pub fn build(self) -> Result<Resolver, CompositionError> {
        let composer = Composer::new(self.registry, self.providers);
        let backend = self
            .backend
            .unwrap_or_else(|| Arc::new(VtableBackend::new()));

        let blank = compose(&composer, backend.as_ref(), &TypeSet::empty(), None)?;
        debug!(name = %blank.name(), "blank composite ready");

        Ok(Resolver {
            composer,
            backend,
            cache: CompositionCache::new(),
            blank,
        })
    }
}
