//! Role hierarchy queries on top of a [`RoleRegistry`].

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Arc;

use thiserror::Error;

use crate::registry::RoleRegistry;
use crate::signature::Signature;
use crate::types::{Operation, Role, RoleId, RoleSet};

/// A role id with no registered descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown role '{0}'")]
pub struct UnknownRole(pub RoleId);

pub(crate) fn lookup(registry: &dyn RoleRegistry, id: &RoleId) -> Result<Arc<Role>, UnknownRole> {
    registry
        .role(id)
        .cloned()
        .ok_or_else(|| UnknownRole(id.clone()))
}

/// The role followed by all of its ancestors, nearest first.
///
/// Breadth-first over declared supers, each role listed once. Terminates on
/// cyclic hierarchies even though registries reject them.
pub fn lineage(registry: &dyn RoleRegistry, id: &RoleId) -> Result<Vec<Arc<Role>>, UnknownRole> {
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([id.clone()]);
    let mut out = Vec::new();

    while let Some(next) = queue.pop_front() {
        if !seen.insert(next.clone()) {
            continue;
        }
        let role = lookup(registry, &next)?;
        queue.extend(role.supers().iter().cloned());
        out.push(role);
    }

    Ok(out)
}

/// All strict ancestors of a role.
pub fn ancestors(registry: &dyn RoleRegistry, id: &RoleId) -> Result<RoleSet, UnknownRole> {
    Ok(lineage(registry, id)?
        .into_iter()
        .skip(1)
        .map(|role| role.id().clone())
        .collect())
}

/// `sub is-a sup` (reflexive).
pub fn is_a(registry: &dyn RoleRegistry, sub: &RoleId, sup: &RoleId) -> Result<bool, UnknownRole> {
    if sub == sup {
        return Ok(true);
    }
    Ok(ancestors(registry, sub)?.contains(sup))
}

/// An operation as seen from a role, with the role that declared it.
#[derive(Debug, Clone)]
pub struct EffectiveOperation {
    pub operation: Operation,
    pub declared_by: RoleId,
}

/// Every operation a role answers for, own and inherited, keyed by signature.
///
/// Lineage order decides overrides: the nearest declaration of a signature
/// wins, so a subclass providing an operation hides its parent's abstract
/// declaration.
pub fn effective_operations(
    registry: &dyn RoleRegistry,
    id: &RoleId,
) -> Result<BTreeMap<Signature, EffectiveOperation>, UnknownRole> {
    Ok(collect_operations(lineage(registry, id)?))
}

/// Operations of a class role as its own class lineage sees them.
///
/// Capability supers are skipped: their operations become dispatch slots of
/// the composite but never make the class itself abstract.
pub fn class_operations(
    registry: &dyn RoleRegistry,
    id: &RoleId,
) -> Result<BTreeMap<Signature, EffectiveOperation>, UnknownRole> {
    let classes = lineage(registry, id)?.into_iter().filter(|r| r.is_class());
    Ok(collect_operations(classes))
}

fn collect_operations(
    roles: impl IntoIterator<Item = Arc<Role>>,
) -> BTreeMap<Signature, EffectiveOperation> {
    let mut ops = BTreeMap::new();
    for role in roles {
        for op in role.operations() {
            ops.entry(op.signature.clone())
                .or_insert_with(|| EffectiveOperation {
                    operation: op.clone(),
                    declared_by: role.id().clone(),
                });
        }
    }
    ops
}

/// Whether a class role leaves any operation of its class lineage abstract.
pub fn is_abstract(registry: &dyn RoleRegistry, id: &RoleId) -> Result<bool, UnknownRole> {
    Ok(class_operations(registry, id)?
        .values()
        .any(|eff| eff.operation.is_abstract()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::StaticRoleRegistry;
    use crate::types::Role;
    use rolekit_abi::ValueType;

    fn registry() -> StaticRoleRegistry {
        StaticRoleRegistry::builder()
            .role(
                Role::capability("ex:Vehicle")
                    .requires(Signature::new("drive", vec![], ValueType::String))
                    .build(),
            )
            .role(
                Role::capability("ex:Home")
                    .requires(Signature::new("sleep", vec![], ValueType::String))
                    .build(),
            )
            .role(
                Role::capability("ex:Camper")
                    .extends("ex:Vehicle")
                    .extends("ex:Home")
                    .build(),
            )
            .role(
                Role::capability("ex:Motorhome")
                    .extends("ex:Camper")
                    .requires(Signature::new("drive", vec![], ValueType::String))
                    .build(),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_lineage_is_breadth_first_and_unique() {
        let reg = registry();
        let ids: Vec<String> = lineage(&reg, &"ex:Motorhome".into())
            .unwrap()
            .iter()
            .map(|r| r.id().to_string())
            .collect();
        assert_eq!(ids, ["ex:Motorhome", "ex:Camper", "ex:Vehicle", "ex:Home"]);
    }

    #[test]
    fn test_is_a_is_reflexive_and_transitive() {
        let reg = registry();
        assert!(is_a(&reg, &"ex:Camper".into(), &"ex:Camper".into()).unwrap());
        assert!(is_a(&reg, &"ex:Motorhome".into(), &"ex:Home".into()).unwrap());
        assert!(!is_a(&reg, &"ex:Home".into(), &"ex:Camper".into()).unwrap());
    }

    #[test]
    fn test_effective_operations_prefer_nearest_declaration() {
        let reg = registry();
        let ops = effective_operations(&reg, &"ex:Motorhome".into()).unwrap();
        assert_eq!(ops.len(), 2);
        let drive = Signature::new("drive", vec![], ValueType::String);
        assert_eq!(ops[&drive].declared_by, RoleId::from("ex:Motorhome"));
    }

    #[test]
    fn test_capability_supers_do_not_make_a_class_abstract() {
        let reg = StaticRoleRegistry::builder()
            .role(
                Role::capability("ex:Named")
                    .requires(Signature::new("getName", vec![], ValueType::String))
                    .build(),
            )
            .role(
                Role::class("ex:Shape")
                    .requires(Signature::new("area", vec![], ValueType::F64))
                    .build(),
            )
            .role(Role::class("ex:Tag").extends("ex:Named").build())
            .role(
                Role::class("ex:Square")
                    .extends("ex:Shape")
                    .provides(Signature::new("area", vec![], ValueType::F64))
                    .build(),
            )
            .build()
            .unwrap();

        assert!(!is_abstract(&reg, &"ex:Tag".into()).unwrap());
        assert!(is_abstract(&reg, &"ex:Shape".into()).unwrap());
        assert!(!is_abstract(&reg, &"ex:Square".into()).unwrap());
    }

    #[test]
    fn test_unknown_role_is_reported() {
        let reg = registry();
        let err = lineage(&reg, &"ex:Nope".into()).unwrap_err();
        assert_eq!(err, UnknownRole("ex:Nope".into()));
    }
}
