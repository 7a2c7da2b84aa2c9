//! rolekit: runtime role composition
//!
//! Entities whose roles are only known at run time (from a data-driven set
//! of ontology types) are mapped onto composite types. Each composite type
//! is synthesized once per distinct combination of roles, routes every
//! operation of every included role to exactly one implementation, and is
//! cached so repeated requests return the identical `Arc`.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                  Resolver                    │
//! │    cache  - insert-if-absent memo table      │
//! │                                              │
//! │  compose   - normalize, base, dispatch plan  │
//! │  discovery - providers, role behaviours      │
//! │  synth     - plan -> CompositeType (vtable)  │
//! │                                              │
//! ├──────────────────────────────────────────────┤
//! │  registry  - type ids -> roles (boundary)    │
//! │  rolekit-abi - Value, ValueType, TypeHash    │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Data flows one way: type set, roles, normalized roles, plan, composite
//! type, cache, caller.
//!
//! ## Example
//!
//! ```ignore
//! let registry = StaticRoleRegistry::builder()
//!     .role(Role::capability("ex:Named").requires(Signature::of::<(), String>("getName")).build())
//!     .map_type("foaf:Person", "ex:Named")
//!     .build()?;
//!
//! let names = BehaviourCatalog::new().with(
//!     BehaviourFactory::builder("name", "ex:Named")
//!         .behaviour(FnBehaviour::new().typed("getName", |_, (): ()| Ok("Alice".to_string())))
//!         .build(),
//! );
//!
//! let resolver = Resolver::builder(Arc::new(registry))
//!     .provider(Arc::new(names))
//!     .build()?;
//!
//! let types: TypeSet = ["foaf:Person"].into_iter().collect();
//! let alice = resolver.instantiate(&"ex:alice".into(), &types)?;
//! assert_eq!(alice.call_as::<String>("getName", &[])?, "Alice");
//! ```

pub mod behaviour;
pub mod cache;
pub mod compose;
pub mod composite;
pub mod discovery;
pub mod hierarchy;
pub mod manifest;
pub mod registry;
pub mod resolver;
pub mod signature;
pub mod synth;
pub mod types;

mod sync;

pub use behaviour::{Behaviour, BehaviourFactory, CallContext, FactoryOrigin, FnBehaviour};
pub use cache::{CacheKey, CompositionCache};
pub use compose::{Composer, CompositeName, CompositionError, CompositionPlan, ConflictKind};
pub use composite::{Composite, CompositeType, DispatchError, EntityHandle};
pub use discovery::{BehaviourCatalog, BehaviourProvider, RoleBehaviours};
pub use manifest::{Manifest, ManifestError};
pub use registry::{RegistryError, RoleRegistry, StaticRoleRegistry};
pub use resolver::{Resolver, ResolverBuilder};
pub use signature::Signature;
pub use synth::{SynthesisBackend, SynthesisError, VtableBackend};
pub use types::{BoxError, EntityId, Operation, Role, RoleId, RoleKind, RoleSet, TypeId, TypeSet};

pub use rolekit_abi::{ConversionError, FromValue, Value, ValueType};
