//! Dispatch table construction and precedence resolution.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::behaviour::BehaviourFactory;
use crate::compose::error::CompositionError;
use crate::compose::plan::{BindingPlan, SlotPlan};
use crate::hierarchy;
use crate::registry::RoleRegistry;
use crate::signature::Signature;
use crate::types::{Handler, OpBody, RoleId, RoleSet};

/// A required operation before it is bound.
#[derive(Default)]
struct Requirement {
    declared_by: BTreeSet<RoleId>,
    default: Option<(RoleId, Handler)>,
}

/// Collect every operation of every role in `roles`, own and inherited.
fn requirements(
    registry: &dyn RoleRegistry,
    roles: &RoleSet,
) -> Result<BTreeMap<Signature, Requirement>, CompositionError> {
    let mut required: BTreeMap<Signature, Requirement> = BTreeMap::new();
    for role in roles {
        for (signature, eff) in hierarchy::effective_operations(registry, role)? {
            let req = required.entry(signature).or_default();
            req.declared_by.insert(eff.declared_by.clone());
            if req.default.is_none() {
                if let OpBody::Default(handler) = &eff.operation.body {
                    req.default = Some((eff.declared_by.clone(), Arc::clone(handler)));
                }
            }
        }
    }
    Ok(required)
}

/// Bind every required operation of `roles` to exactly one implementation.
///
/// `factories` is the discovery order. Returns the factories actually bound
/// (order kept, unused ones dropped) and the slots indexing into them.
pub(crate) fn build(
    registry: &dyn RoleRegistry,
    roles: &RoleSet,
    factories: Vec<Arc<BehaviourFactory>>,
) -> Result<(Vec<Arc<BehaviourFactory>>, Vec<SlotPlan>), CompositionError> {
    let mut slots = Vec::new();

    for (signature, req) in requirements(registry, roles)? {
        let mut candidates: Vec<(usize, Signature)> = factories
            .iter()
            .enumerate()
            .filter_map(|(i, f)| f.target_for(&signature).map(|target| (i, target)))
            .collect();

        let binding = match candidates.len() {
            0 => match req.default {
                Some((role, handler)) => {
                    debug!(slot = %signature, role = %role, "bound to default body");
                    BindingPlan::Default { role, handler }
                }
                None => {
                    return Err(CompositionError::UnresolvedMethod {
                        operation: signature.to_string(),
                        roles: req.declared_by.into_iter().collect(),
                    })
                }
            },
            1 => {
                let (index, target) = candidates.swap_remove(0);
                BindingPlan::Behaviour { index, target }
            }
            _ => {
                let winner = select_winner(&signature, &candidates, &factories);
                let (index, target) = candidates[winner].clone();
                debug!(
                    slot = %signature,
                    winner = factories[index].id(),
                    contenders = candidates.len(),
                    "resolved contested slot"
                );
                BindingPlan::Behaviour { index, target }
            }
        };

        slots.push(SlotPlan {
            signature,
            declared_by: req.declared_by.into_iter().collect(),
            binding,
        });
    }

    compact(factories, slots)
}

/// Position in `candidates` of the slot's winner.
///
/// The winner is the first candidate (discovery order) that no other
/// candidate strictly precedes. When every candidate is strictly preceded
/// the relation is cyclic and the first candidate wins.
pub(crate) fn select_winner(
    slot: &Signature,
    candidates: &[(usize, Signature)],
    factories: &[Arc<BehaviourFactory>],
) -> usize {
    let strictly_precedes = |x: usize, y: usize| {
        let (fx, fy) = (&factories[x], &factories[y]);
        fx.precedes(slot, fy) && !fy.precedes(slot, fx)
    };

    let unbeaten = candidates.iter().position(|&(candidate, _)| {
        !candidates
            .iter()
            .any(|&(other, _)| other != candidate && strictly_precedes(other, candidate))
    });

    match unbeaten {
        Some(pos) => pos,
        None => {
            let ids: Vec<&str> = candidates.iter().map(|(i, _)| factories[*i].id()).collect();
            warn!(
                slot = %slot,
                candidates = ?ids,
                "cyclic behaviour precedence, using first discovered"
            );
            0
        }
    }
}

/// Drop unbound factories and renumber slot bindings.
fn compact(
    factories: Vec<Arc<BehaviourFactory>>,
    mut slots: Vec<SlotPlan>,
) -> Result<(Vec<Arc<BehaviourFactory>>, Vec<SlotPlan>), CompositionError> {
    let mut used = vec![false; factories.len()];
    for slot in &slots {
        if let BindingPlan::Behaviour { index, .. } = slot.binding {
            used[index] = true;
        }
    }

    let mut remap = vec![usize::MAX; factories.len()];
    let mut bound = Vec::new();
    for (old, factory) in factories.into_iter().enumerate() {
        if !used[old] {
            continue;
        }
        if !factory.has_constructor() {
            return Err(CompositionError::BehaviourConstruction {
                behaviour: factory.id().to_string(),
                role: factory.role().clone(),
                source: "bound behaviour has no constructor".into(),
            });
        }
        remap[old] = bound.len();
        bound.push(factory);
    }

    for slot in &mut slots {
        if let BindingPlan::Behaviour { index, .. } = &mut slot.binding {
            *index = remap[*index];
        }
    }

    Ok((bound, slots))
}
