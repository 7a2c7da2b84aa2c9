//! Class Synthesis
//!
//! A backend turns a finalized [`CompositionPlan`] into an instantiable
//! [`CompositeType`]. Each composite name is defined at most once per
//! backend: concurrent requests for the same name are serialized and the
//! later ones observe the type the first one defined.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use thiserror::Error;
use tracing::{debug, info};

use crate::compose::{BindingPlan, CompositeName, CompositionPlan};
use crate::composite::CompositeType;
use crate::sync;
use crate::types::BoxError;

/// Errors raised while synthesizing a composite type.
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("invalid composition plan: {0}")]
    InvalidPlan(String),

    #[error("synthesis backend failed: {0}")]
    Backend(#[source] BoxError),
}

/// Turns plans into composite types.
pub trait SynthesisBackend: Send + Sync {
    /// A type already defined under `name`, if any.
    fn lookup_existing(&self, name: &CompositeName) -> Option<Arc<CompositeType>>;

    /// Define the type for `plan`, or return the one already defined under
    /// its name.
    fn synthesize(&self, plan: CompositionPlan) -> Result<Arc<CompositeType>, SynthesisError>;
}

/// Slot-table backend: every composite is a [`CompositeType`] whose slots
/// point at bound behaviours, invoked through one shared trampoline.
#[derive(Default)]
pub struct VtableBackend {
    defined: RwLock<HashMap<CompositeName, Arc<CompositeType>>>,
    naming: Mutex<HashMap<CompositeName, Arc<Mutex<()>>>>,
}

impl VtableBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of types defined so far.
    pub fn len(&self) -> usize {
        sync::read(&self.defined).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn name_lock(&self, name: &CompositeName) -> Arc<Mutex<()>> {
        Arc::clone(sync::lock(&self.naming).entry(*name).or_default())
    }
}

impl SynthesisBackend for VtableBackend {
    fn lookup_existing(&self, name: &CompositeName) -> Option<Arc<CompositeType>> {
        sync::read(&self.defined).get(name).cloned()
    }

    fn synthesize(&self, plan: CompositionPlan) -> Result<Arc<CompositeType>, SynthesisError> {
        validate(&plan)?;

        let name = plan.name;
        if let Some(existing) = self.lookup_existing(&name) {
            return Ok(existing);
        }

        let lock = self.name_lock(&name);
        let _guard = sync::lock(&lock);
        if let Some(existing) = self.lookup_existing(&name) {
            debug!(name = %name, "composite defined concurrently");
            return Ok(existing);
        }

        let ty = Arc::new(CompositeType::from_plan(plan));
        sync::write(&self.defined).insert(name, Arc::clone(&ty));
        sync::lock(&self.naming).remove(&name);

        info!(
            name = %name,
            roles = ty.roles().len(),
            slots = ty.slots().len(),
            "synthesized composite type"
        );
        Ok(ty)
    }
}

fn validate(plan: &CompositionPlan) -> Result<(), SynthesisError> {
    let mut seen = HashSet::new();
    for slot in &plan.slots {
        if !seen.insert(&slot.signature) {
            return Err(SynthesisError::InvalidPlan(format!(
                "duplicate slot {}",
                slot.signature
            )));
        }
        if let BindingPlan::Behaviour { index, .. } = slot.binding {
            if index >= plan.behaviours.len() {
                return Err(SynthesisError::InvalidPlan(format!(
                    "slot {} bound to behaviour #{} of {}",
                    slot.signature,
                    index,
                    plan.behaviours.len()
                )));
            }
        }
    }
    Ok(())
}
