//! Behaviours and their factories
//!
//! A [`Behaviour`] answers some operations of a role for one entity. A
//! [`BehaviourFactory`] describes a behaviour to the composer (which role it
//! serves, which signatures it answers, how it ranks against competitors) and
//! builds instances of it for composites.
//!
//! # Example
//!
//! ```ignore
//! let named = FnBehaviour::new()
//!     .typed("getName", |cx, (): ()| Ok(cx.entity().id().to_string()));
//!
//! let factory = BehaviourFactory::builder("ex:name-from-id", "ex:Named")
//!     .behaviour(named)
//!     .build();
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, Mutex};

use rolekit_abi::{FromArgs, Value};

use crate::composite::{Composite, DispatchError, EntityHandle};
use crate::signature::{OpParams, OpType, Signature};
use crate::sync;
use crate::types::{BoxError, Constructor, Handler, RoleId, RoleSet};

/// An object answering operations on behalf of one composite.
pub trait Behaviour: Send + Sync {
    /// Answer `op`, the target signature this behaviour was bound with.
    ///
    /// Errors are handed to the caller exactly as returned.
    fn invoke(&self, op: &Signature, cx: &CallContext<'_>, args: &[Value]) -> Result<Value, BoxError>;
}

/// What a behaviour sees of the call in progress.
pub struct CallContext<'a> {
    this: &'a Composite,
    slot: &'a Signature,
}

impl<'a> CallContext<'a> {
    pub(crate) fn new(this: &'a Composite, slot: &'a Signature) -> Self {
        Self { this, slot }
    }

    /// The composite the call arrived on. Calls made through it are
    /// dispatched like any outside call.
    pub fn this(&self) -> &'a Composite {
        self.this
    }

    pub fn entity(&self) -> &'a EntityHandle {
        self.this.entity()
    }

    /// The dispatch slot being answered.
    pub fn slot(&self) -> &'a Signature {
        self.slot
    }
}

/// A behaviour assembled from closures, one per signature.
#[derive(Clone, Default)]
pub struct FnBehaviour {
    handlers: BTreeMap<Signature, Handler>,
}

impl FnBehaviour {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `signature` with a closure over raw values.
    pub fn on<F>(mut self, signature: Signature, f: F) -> Self
    where
        F: Fn(&CallContext<'_>, &[Value]) -> Result<Value, BoxError> + Send + Sync + 'static,
    {
        self.handlers.insert(signature, Arc::new(f));
        self
    }

    /// Answer an operation whose signature is derived from the closure's
    /// argument tuple and result type.
    pub fn typed<Args, Ret, F>(self, name: &str, f: F) -> Self
    where
        Args: OpParams + FromArgs + 'static,
        Ret: OpType + Into<Value> + 'static,
        F: Fn(&CallContext<'_>, Args) -> Result<Ret, BoxError> + Send + Sync + 'static,
    {
        let signature = Signature::of::<Args, Ret>(name);
        self.on(signature, move |cx, args| {
            let args = Args::from_args(args)?;
            f(cx, args).map(Into::into)
        })
    }

    pub fn signatures(&self) -> impl Iterator<Item = &Signature> {
        self.handlers.keys()
    }
}

impl Behaviour for FnBehaviour {
    fn invoke(&self, op: &Signature, cx: &CallContext<'_>, args: &[Value]) -> Result<Value, BoxError> {
        match self.handlers.get(op) {
            Some(handler) => handler(cx, args),
            None => Err(Box::new(DispatchError::NotAnswered {
                operation: op.to_string(),
            })),
        }
    }
}

impl fmt::Debug for FnBehaviour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.handlers.keys()).finish()
    }
}

/// Maps a required signature to the signature a behaviour answers it with.
pub type BindingFn = Arc<dyn Fn(&Signature) -> Option<Signature> + Send + Sync>;

/// `precedes(slot, other)`: whether this factory should win `slot` over `other`.
pub type PrecedenceFn = Arc<dyn Fn(&Signature, &BehaviourFactory) -> bool + Send + Sync>;

/// Where a factory came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactoryOrigin {
    /// Returned by a [`BehaviourProvider`](crate::discovery::BehaviourProvider).
    Provided,
    /// A class role's own constructed object.
    Role,
    /// Generated for an abstract class role.
    Adapter,
}

/// Descriptor of a behaviour, plus precedence metadata.
pub struct BehaviourFactory {
    id: String,
    role: RoleId,
    capabilities: RoleSet,
    answers: BTreeSet<Signature>,
    binding: Option<BindingFn>,
    precedence: Option<PrecedenceFn>,
    precedes: BTreeSet<String>,
    singleton: bool,
    constructor: Option<Constructor>,
    origin: FactoryOrigin,
    instance: Mutex<Option<Arc<dyn Behaviour>>>,
}

impl BehaviourFactory {
    pub fn builder(id: impl Into<String>, role: impl Into<RoleId>) -> BehaviourFactoryBuilder {
        BehaviourFactoryBuilder {
            factory: BehaviourFactory {
                id: id.into(),
                role: role.into(),
                capabilities: RoleSet::new(),
                answers: BTreeSet::new(),
                binding: None,
                precedence: None,
                precedes: BTreeSet::new(),
                singleton: false,
                constructor: None,
                origin: FactoryOrigin::Provided,
                instance: Mutex::new(None),
            },
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The role this behaviour implements.
    pub fn role(&self) -> &RoleId {
        &self.role
    }

    /// Additional capability roles this behaviour provides.
    pub fn capabilities(&self) -> &RoleSet {
        &self.capabilities
    }

    pub fn answers(&self) -> &BTreeSet<Signature> {
        &self.answers
    }

    pub fn is_singleton(&self) -> bool {
        self.singleton
    }

    pub fn origin(&self) -> FactoryOrigin {
        self.origin
    }

    pub fn has_constructor(&self) -> bool {
        self.constructor.is_some()
    }

    /// The signature this behaviour answers `required` with, if any.
    pub fn target_for(&self, required: &Signature) -> Option<Signature> {
        match &self.binding {
            Some(binding) => binding(required),
            None => self.answers.contains(required).then(|| required.clone()),
        }
    }

    /// Whether this factory asks to win `slot` over `other`.
    pub fn precedes(&self, slot: &Signature, other: &BehaviourFactory) -> bool {
        self.precedes.contains(&other.id)
            || self
                .precedence
                .as_ref()
                .map_or(false, |precedes| precedes(slot, other))
    }

    /// Build the behaviour for one entity. Singletons are built on first use
    /// and shared afterwards; a failed build is retried next time.
    pub fn instantiate(&self, entity: &EntityHandle) -> Result<Arc<dyn Behaviour>, BoxError> {
        let constructor = self
            .constructor
            .as_ref()
            .ok_or_else(|| format!("behaviour '{}' has no constructor", self.id))?;

        if !self.singleton {
            return constructor(entity);
        }

        let mut slot = sync::lock(&self.instance);
        if let Some(existing) = slot.as_ref() {
            return Ok(Arc::clone(existing));
        }
        let behaviour = constructor(entity)?;
        *slot = Some(Arc::clone(&behaviour));
        Ok(behaviour)
    }
}

impl fmt::Debug for BehaviourFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BehaviourFactory")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("origin", &self.origin)
            .field("answers", &self.answers)
            .field("singleton", &self.singleton)
            .finish_non_exhaustive()
    }
}

/// Builder for [`BehaviourFactory`].
pub struct BehaviourFactoryBuilder {
    factory: BehaviourFactory,
}

impl BehaviourFactoryBuilder {
    /// Declare an exactly answered signature.
    pub fn answers(mut self, signature: Signature) -> Self {
        self.factory.answers.insert(signature);
        self
    }

    /// Declare an extra capability role provided by this behaviour.
    pub fn capability(mut self, role: impl Into<RoleId>) -> Self {
        self.factory.capabilities.insert(role.into());
        self
    }

    /// Replace exact-match binding with a custom rule.
    pub fn binding<F>(mut self, f: F) -> Self
    where
        F: Fn(&Signature) -> Option<Signature> + Send + Sync + 'static,
    {
        self.factory.binding = Some(Arc::new(f));
        self
    }

    pub fn precedence<F>(mut self, f: F) -> Self
    where
        F: Fn(&Signature, &BehaviourFactory) -> bool + Send + Sync + 'static,
    {
        self.factory.precedence = Some(Arc::new(f));
        self
    }

    /// Win every contested slot against the factory named `other`.
    pub fn precedes(mut self, other: impl Into<String>) -> Self {
        self.factory.precedes.insert(other.into());
        self
    }

    pub fn singleton(mut self, singleton: bool) -> Self {
        self.factory.singleton = singleton;
        self
    }

    pub fn constructor<F>(mut self, f: F) -> Self
    where
        F: Fn(&EntityHandle) -> Result<Arc<dyn Behaviour>, BoxError> + Send + Sync + 'static,
    {
        self.factory.constructor = Some(Arc::new(f));
        self
    }

    pub(crate) fn constructor_arc(mut self, constructor: Constructor) -> Self {
        self.factory.constructor = Some(constructor);
        self
    }

    pub(crate) fn origin(mut self, origin: FactoryOrigin) -> Self {
        self.factory.origin = origin;
        self
    }

    /// Answer every signature of a stateless [`FnBehaviour`], sharing one
    /// instance across all composites.
    pub fn behaviour(mut self, behaviour: FnBehaviour) -> Self {
        self.factory.answers.extend(behaviour.signatures().cloned());
        let shared: Arc<dyn Behaviour> = Arc::new(behaviour);
        self.constructor(move |_| Ok(Arc::clone(&shared)))
    }

    pub fn build(self) -> Arc<BehaviourFactory> {
        Arc::new(self.factory)
    }
}
