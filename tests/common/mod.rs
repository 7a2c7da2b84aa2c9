//! Shared fixture ontology for the integration tests.
//!
//! - `ex:Named` / `ex:Agent` / `ex:Person`: capabilities, Person is-a Agent and Named
//! - `ex:Vehicle`, `ex:Home`, `ex:Camper`: Camper is-a Vehicle and Home
//! - `ex:Thing`: concrete base class answering `describe`
//! - `ex:ConceptA`, `ex:ConceptB`: unrelated base classes

#![allow(dead_code)]

use std::sync::Arc;

use rolekit::{
    BehaviourCatalog, BehaviourFactory, FnBehaviour, Role, Signature, StaticRoleRegistry, TypeSet,
};

pub fn get_name() -> Signature {
    Signature::of::<(), String>("getName")
}

pub fn drive() -> Signature {
    Signature::of::<(), String>("drive")
}

pub fn sleep() -> Signature {
    Signature::of::<(), String>("sleep")
}

pub fn describe() -> Signature {
    Signature::of::<(), String>("describe")
}

pub fn types(ids: &[&str]) -> TypeSet {
    ids.iter().copied().collect()
}

fn base_class(id: &str) -> Role {
    let describe_text = format!("a {}", id);
    Role::class(id)
        .provides(describe())
        .constructor(move |_| {
            let text = describe_text.clone();
            Ok(Arc::new(
                FnBehaviour::new().typed("describe", move |_, (): ()| Ok(text.clone())),
            ))
        })
        .build()
}

pub fn registry() -> StaticRoleRegistry {
    StaticRoleRegistry::builder()
        .role(Role::capability("ex:Named").requires(get_name()).build())
        .role(Role::capability("ex:Agent").build())
        .role(
            Role::capability("ex:Person")
                .extends("ex:Agent")
                .extends("ex:Named")
                .build(),
        )
        .role(Role::capability("ex:Vehicle").requires(drive()).build())
        .role(Role::capability("ex:Home").requires(sleep()).build())
        .role(
            Role::capability("ex:Camper")
                .extends("ex:Vehicle")
                .extends("ex:Home")
                .build(),
        )
        .role(base_class("ex:Thing"))
        .role(base_class("ex:ConceptA"))
        .role(base_class("ex:ConceptB"))
        .map_type("foaf:Agent", "ex:Agent")
        .map_type("foaf:Person", "ex:Person")
        .map_type("schema:Vehicle", "ex:Vehicle")
        .map_type("schema:Home", "ex:Home")
        .map_type("schema:Camper", "ex:Camper")
        .map_type("owl:Thing", "ex:Thing")
        .map_type("ex:A", "ex:ConceptA")
        .map_type("ex:B", "ex:ConceptB")
        .individual("ex:alice", "ex:Named")
        .base_eligible("ex:Thing")
        .base_eligible("ex:ConceptA")
        .base_eligible("ex:ConceptB")
        .build()
        .expect("fixture registry is valid")
}

/// Behaviours answering every capability operation of the fixture.
pub fn catalog() -> BehaviourCatalog {
    BehaviourCatalog::new()
        .with(
            BehaviourFactory::builder("names", "ex:Named")
                .behaviour(FnBehaviour::new().typed("getName", |_, (): ()| Ok("Alice".to_string())))
                .build(),
        )
        .with(
            BehaviourFactory::builder("wheels", "ex:Vehicle")
                .behaviour(FnBehaviour::new().typed("drive", |_, (): ()| Ok("vroom".to_string())))
                .build(),
        )
        .with(
            BehaviourFactory::builder("bed", "ex:Home")
                .behaviour(FnBehaviour::new().typed("sleep", |_, (): ()| Ok("zzz".to_string())))
                .build(),
        )
}
