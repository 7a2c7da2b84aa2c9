//! Composite types and instances
//!
//! A [`CompositeType`] is the synthesized dispatcher for one normalized role
//! set: a slot table mapping every required signature to a bound behaviour
//! (or a default body). A [`Composite`] is that type bound to one entity,
//! holding the behaviour objects built for it.
//!
//! All calls go through [`Composite::invoke`]: look up the slot, check the
//! arguments, hand them to the bound behaviour untouched, and return its
//! result (or its error) untouched.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use rolekit_abi::{FromValue, Value};

use crate::behaviour::{Behaviour, BehaviourFactory, CallContext};
use crate::compose::{BindingPlan, CompositeName, CompositionError, CompositionPlan, SlotPlan};
use crate::signature::Signature;
use crate::types::{BoxError, EntityId, RoleId, RoleSet};

/// Failures of the dispatch mechanism itself.
///
/// Errors raised by behaviours never take this form; they reach the caller
/// as returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("no operation {operation} on this composite")]
    NoSuchOperation { operation: String },

    #[error("call to '{name}' matches several operations: {}", .candidates.join(", "))]
    AmbiguousOperation { name: String, candidates: Vec<String> },

    #[error("behaviour does not answer {operation}")]
    NotAnswered { operation: String },

    #[error("arguments ({}) do not match {operation}", .got.join(", "))]
    ArgumentMismatch { operation: String, got: Vec<String> },
}

// ============================================================================
// Entity handles
// ============================================================================

/// The entity a composite is bound to: its identifier plus optional backing
/// state supplied by the persistence layer.
#[derive(Clone)]
pub struct EntityHandle {
    id: EntityId,
    backing: Option<Arc<dyn Any + Send + Sync>>,
}

impl EntityHandle {
    pub fn new(id: impl Into<EntityId>) -> Self {
        Self {
            id: id.into(),
            backing: None,
        }
    }

    /// Attach backing state that behaviours can read with [`backing`](Self::backing).
    pub fn with_backing<T: Any + Send + Sync>(id: impl Into<EntityId>, backing: T) -> Self {
        Self {
            id: id.into(),
            backing: Some(Arc::new(backing)),
        }
    }

    pub fn id(&self) -> &EntityId {
        &self.id
    }

    pub fn backing<T: Any>(&self) -> Option<&T> {
        self.backing.as_ref()?.downcast_ref()
    }
}

impl fmt::Debug for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityHandle")
            .field("id", &self.id)
            .field("backed", &self.backing.is_some())
            .finish()
    }
}

// ============================================================================
// CompositeType
// ============================================================================

/// The synthesized dispatcher for one normalized role set.
pub struct CompositeType {
    name: CompositeName,
    roles: RoleSet,
    interfaces: RoleSet,
    base: Option<RoleId>,
    behaviours: Vec<Arc<BehaviourFactory>>,
    slots: Vec<SlotPlan>,
    by_signature: HashMap<Signature, usize>,
    by_name: HashMap<String, Vec<usize>>,
}

impl CompositeType {
    /// Build the slot tables for a validated plan.
    pub fn from_plan(plan: CompositionPlan) -> Self {
        let mut by_signature = HashMap::with_capacity(plan.slots.len());
        let mut by_name: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, slot) in plan.slots.iter().enumerate() {
            by_signature.insert(slot.signature.clone(), i);
            by_name
                .entry(slot.signature.name().to_string())
                .or_default()
                .push(i);
        }

        Self {
            name: plan.name,
            roles: plan.roles,
            interfaces: plan.interfaces,
            base: plan.base,
            behaviours: plan.behaviours,
            slots: plan.slots,
            by_signature,
            by_name,
        }
    }

    pub fn name(&self) -> &CompositeName {
        &self.name
    }

    /// Normalized roles, base included.
    pub fn roles(&self) -> &RoleSet {
        &self.roles
    }

    /// Every role this type can be viewed as, supers included.
    pub fn interfaces(&self) -> &RoleSet {
        &self.interfaces
    }

    pub fn base(&self) -> Option<&RoleId> {
        self.base.as_ref()
    }

    pub fn implements(&self, role: &RoleId) -> bool {
        self.interfaces.contains(role)
    }

    pub fn behaviours(&self) -> &[Arc<BehaviourFactory>] {
        &self.behaviours
    }

    pub fn slots(&self) -> &[SlotPlan] {
        &self.slots
    }

    pub fn slot(&self, signature: &Signature) -> Option<&SlotPlan> {
        self.by_signature.get(signature).map(|&i| &self.slots[i])
    }

    /// Id of the factory bound to `signature`, or `None` for unknown
    /// signatures and default bodies.
    pub fn bound_behaviour(&self, signature: &Signature) -> Option<&str> {
        match &self.slot(signature)?.binding {
            BindingPlan::Behaviour { index, .. } => Some(self.behaviours[*index].id()),
            BindingPlan::Default { .. } => None,
        }
    }

    /// Bind this type to an entity, building every behaviour it needs.
    pub fn instantiate(self: &Arc<Self>, entity: EntityHandle) -> Result<Composite, CompositionError> {
        let behaviours = self
            .behaviours
            .iter()
            .map(|factory| {
                factory
                    .instantiate(&entity)
                    .map_err(|source| CompositionError::BehaviourConstruction {
                        behaviour: factory.id().to_string(),
                        role: factory.role().clone(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Composite {
            ty: Arc::clone(self),
            entity,
            behaviours,
        })
    }

    /// Serializable description of this type.
    pub fn summary(&self) -> CompositeSummary {
        CompositeSummary {
            name: self.name,
            base: self.base.clone(),
            roles: self.roles.clone(),
            interfaces: self.interfaces.clone(),
            slots: self
                .slots
                .iter()
                .map(|slot| SlotSummary {
                    signature: slot.signature.to_string(),
                    key: slot.signature.hash().to_short_hex(),
                    declared_by: slot.declared_by.clone(),
                    bound_to: match &slot.binding {
                        BindingPlan::Behaviour { index, target } if *target == slot.signature => {
                            self.behaviours[*index].id().to_string()
                        }
                        BindingPlan::Behaviour { index, target } => {
                            format!("{} as {}", self.behaviours[*index].id(), target)
                        }
                        BindingPlan::Default { role, .. } => format!("default:{}", role),
                    },
                })
                .collect(),
        }
    }
}

impl fmt::Debug for CompositeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeType")
            .field("name", &self.name)
            .field("roles", &self.roles)
            .field("base", &self.base)
            .field("slots", &self.slots.len())
            .finish()
    }
}

/// Description of a composite type, as printed by the CLI.
#[derive(Debug, Clone, Serialize)]
pub struct CompositeSummary {
    pub name: CompositeName,
    pub base: Option<RoleId>,
    pub roles: RoleSet,
    pub interfaces: RoleSet,
    pub slots: Vec<SlotSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SlotSummary {
    pub signature: String,
    /// Content hash of the signature, stable across processes.
    pub key: String,
    pub declared_by: Vec<RoleId>,
    pub bound_to: String,
}

// ============================================================================
// Composite
// ============================================================================

/// A composite type bound to one entity.
///
/// Equality, hashing and display follow the entity, so two composites of the
/// same entity compare equal even when built from different type sets.
pub struct Composite {
    ty: Arc<CompositeType>,
    entity: EntityHandle,
    behaviours: Vec<Arc<dyn Behaviour>>,
}

impl Composite {
    pub fn composite_type(&self) -> &Arc<CompositeType> {
        &self.ty
    }

    pub fn entity(&self) -> &EntityHandle {
        &self.entity
    }

    pub fn id(&self) -> &EntityId {
        self.entity.id()
    }

    pub fn implements(&self, role: &RoleId) -> bool {
        self.ty.implements(role)
    }

    /// Call the operation with exactly this signature.
    pub fn invoke(&self, signature: &Signature, args: &[Value]) -> Result<Value, BoxError> {
        let index = *self.ty.by_signature.get(signature).ok_or_else(|| {
            DispatchError::NoSuchOperation {
                operation: signature.to_string(),
            }
        })?;
        let slot = &self.ty.slots[index];
        if !slot.signature.accepts(args) {
            return Err(Box::new(mismatch(&slot.signature, args)));
        }
        self.dispatch(slot, args)
    }

    /// Call an operation by name, choosing among overloads by the argument
    /// types.
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value, BoxError> {
        let indices = self
            .ty
            .by_name
            .get(name)
            .ok_or_else(|| DispatchError::NoSuchOperation {
                operation: name.to_string(),
            })?;

        let matching: Vec<&SlotPlan> = indices
            .iter()
            .map(|&i| &self.ty.slots[i])
            .filter(|slot| slot.signature.accepts(args))
            .collect();

        match matching.as_slice() {
            [slot] => self.dispatch(slot, args),
            [] => {
                let slot = &self.ty.slots[indices[0]];
                Err(Box::new(mismatch(&slot.signature, args)))
            }
            many => Err(Box::new(DispatchError::AmbiguousOperation {
                name: name.to_string(),
                candidates: many.iter().map(|s| s.signature.to_string()).collect(),
            })),
        }
    }

    /// [`call`](Self::call), converting the result.
    pub fn call_as<T: FromValue>(&self, name: &str, args: &[Value]) -> Result<T, BoxError> {
        let value = self.call(name, args)?;
        Ok(T::from_value(value)?)
    }

    fn dispatch(&self, slot: &SlotPlan, args: &[Value]) -> Result<Value, BoxError> {
        let cx = CallContext::new(self, &slot.signature);
        match &slot.binding {
            BindingPlan::Behaviour { index, target } => self.behaviours[*index].invoke(target, &cx, args),
            BindingPlan::Default { handler, .. } => handler(&cx, args),
        }
    }
}

fn mismatch(signature: &Signature, args: &[Value]) -> DispatchError {
    DispatchError::ArgumentMismatch {
        operation: signature.to_string(),
        got: args.iter().map(|a| a.infer_type().to_string()).collect(),
    }
}

impl PartialEq for Composite {
    fn eq(&self, other: &Self) -> bool {
        self.entity.id == other.entity.id
    }
}

impl Eq for Composite {}

impl Hash for Composite {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.entity.id.hash(state);
    }
}

impl fmt::Display for Composite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.entity.id, f)
    }
}

impl fmt::Debug for Composite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Composite")
            .field("entity", &self.entity.id)
            .field("type", &self.ty.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behaviour::FnBehaviour;
    use rolekit_abi::ValueType;

    fn greet_s() -> Signature {
        Signature::new("greet", vec![ValueType::String], ValueType::String)
    }

    fn greet_n() -> Signature {
        Signature::new("greet", vec![ValueType::S64], ValueType::String)
    }

    fn composite_type() -> Arc<CompositeType> {
        let behaviour = FnBehaviour::new()
            .typed("greet", |_, (who,): (String,)| Ok(format!("hello {}", who)))
            .typed("greet", |_, (n,): (i64,)| Ok(format!("hello #{}", n)));
        let factory = BehaviourFactory::builder("greeter", "ex:Greeter")
            .behaviour(behaviour)
            .build();
        let roles: RoleSet = ["ex:Greeter".into()].into_iter().collect();

        let slot = |signature: Signature| SlotPlan {
            signature: signature.clone(),
            declared_by: vec!["ex:Greeter".into()],
            binding: BindingPlan::Behaviour {
                index: 0,
                target: signature,
            },
        };

        Arc::new(CompositeType::from_plan(CompositionPlan {
            name: CompositeName::of(&roles, None),
            interfaces: roles.clone(),
            roles,
            base: None,
            behaviours: vec![factory],
            slots: vec![slot(greet_n()), slot(greet_s())],
        }))
    }

    #[test]
    fn test_call_resolves_overloads_by_argument_type() {
        let composite = composite_type().instantiate(EntityHandle::new("ex:a")).unwrap();
        let by_string: String = composite.call_as("greet", &["Bob".into()]).unwrap();
        let by_number: String = composite.call_as("greet", &[Value::S64(7)]).unwrap();
        assert_eq!(by_string, "hello Bob");
        assert_eq!(by_number, "hello #7");
    }

    #[test]
    fn test_dispatch_errors() {
        let composite = composite_type().instantiate(EntityHandle::new("ex:a")).unwrap();

        let err = composite.call("missing", &[]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DispatchError>(),
            Some(DispatchError::NoSuchOperation { .. })
        ));

        let err = composite.invoke(&greet_s(), &[Value::Bool(true)]).unwrap_err();
        assert_eq!(
            err.downcast_ref::<DispatchError>(),
            Some(&DispatchError::ArgumentMismatch {
                operation: "greet(string) -> string".into(),
                got: vec!["bool".into()],
            })
        );
    }

    #[test]
    fn test_identity_follows_entity() {
        let ty = composite_type();
        let a = ty.instantiate(EntityHandle::new("ex:a")).unwrap();
        let a2 = ty.instantiate(EntityHandle::new("ex:a")).unwrap();
        let b = ty.instantiate(EntityHandle::new("ex:b")).unwrap();
        assert_eq!(a, a2);
        assert_ne!(a, b);
        assert_eq!(a.to_string(), "ex:a");
    }

    #[test]
    fn test_backing_state_is_downcast() {
        let handle = EntityHandle::with_backing("ex:a", 42u32);
        assert_eq!(handle.backing::<u32>(), Some(&42));
        assert_eq!(handle.backing::<String>(), None);
    }

    #[test]
    fn test_summary_lists_bindings() {
        let summary = composite_type().summary();
        assert_eq!(summary.slots.len(), 2);
        assert!(summary.slots.iter().all(|s| s.bound_to == "greeter"));
    }
}
