//! Manifests
//!
//! A manifest describes a registry and a behaviour catalog in JSON, so that
//! compositions can be explored without writing Rust:
//!
//! ```json
//! {
//!   "roles": [
//!     { "id": "ex:Named", "kind": "capability",
//!       "operations": [{ "name": "getName", "result": "string" }] },
//!     { "id": "ex:Thing", "kind": "class", "base": true }
//!   ],
//!   "types": { "foaf:Person": ["ex:Named", "ex:Thing"] },
//!   "behaviours": [
//!     { "id": "alice-name", "role": "ex:Named", "answers": { "getName": "Alice" } }
//!   ]
//! }
//! ```
//!
//! Behaviours described this way answer with constants: `answers` maps an
//! operation name to the JSON value returned, converted to the operation's
//! result type. Class roles answer their own operations through `value`,
//! and any operation may carry a `default`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use thiserror::Error;

use rolekit_abi::{Value, ValueType};

use crate::behaviour::{Behaviour, BehaviourFactory, FnBehaviour};
use crate::compose::CompositionError;
use crate::discovery::BehaviourCatalog;
use crate::hierarchy;
use crate::registry::{RegistryError, StaticRoleRegistry};
use crate::resolver::Resolver;
use crate::signature::Signature;
use crate::types::{EntityId, Role, RoleBuilder, RoleId, RoleKind, TypeId};

/// Errors loading or interpreting a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid manifest JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("invalid operation '{operation}' on {owner}: {reason}")]
    InvalidOperation {
        owner: String,
        operation: String,
        reason: String,
    },

    #[error(transparent)]
    Composition(#[from] CompositionError),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub roles: Vec<RoleSpec>,
    /// Ontology type id to the roles it maps to.
    #[serde(default)]
    pub types: BTreeMap<TypeId, Vec<RoleId>>,
    /// Entity id to its individual roles.
    #[serde(default)]
    pub individuals: BTreeMap<EntityId, Vec<RoleId>>,
    #[serde(default)]
    pub behaviours: Vec<BehaviourSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoleSpec {
    pub id: RoleId,
    pub kind: RoleKind,
    #[serde(default)]
    pub supers: Vec<RoleId>,
    #[serde(default)]
    pub operations: Vec<OperationSpec>,
    /// Register as a base class candidate (class roles only).
    #[serde(default)]
    pub base: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OperationSpec {
    pub name: String,
    #[serde(default)]
    pub params: Vec<ValueType>,
    #[serde(default = "ValueType::unit")]
    pub result: ValueType,
    /// Constant answered by the class role itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Json>,
    /// Constant used when nothing else answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Json>,
}

impl OperationSpec {
    pub fn signature(&self) -> Signature {
        Signature::new(self.name.clone(), self.params.clone(), self.result.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BehaviourSpec {
    pub id: String,
    pub role: RoleId,
    #[serde(default)]
    pub capabilities: Vec<RoleId>,
    /// Operation name to the constant it answers with.
    #[serde(default)]
    pub answers: BTreeMap<String, Json>,
    /// Ids of behaviours this one wins against.
    #[serde(default)]
    pub precedes: Vec<String>,
    #[serde(default)]
    pub singleton: bool,
}

impl Manifest {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ManifestError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Build the registry and the behaviour catalog this manifest describes.
    pub fn build(&self) -> Result<(StaticRoleRegistry, BehaviourCatalog), ManifestError> {
        let mut builder = StaticRoleRegistry::builder();
        for spec in &self.roles {
            builder = builder.role(role_from_spec(spec)?);
            if spec.base {
                builder = builder.base_eligible(spec.id.clone());
            }
        }
        for (ty, roles) in &self.types {
            for role in roles {
                builder = builder.map_type(ty.clone(), role.clone());
            }
        }
        for (entity, roles) in &self.individuals {
            for role in roles {
                builder = builder.individual(entity.clone(), role.clone());
            }
        }
        let registry = builder.build()?;

        let mut catalog = BehaviourCatalog::new();
        for spec in &self.behaviours {
            catalog.add(behaviour_from_spec(&registry, spec)?);
        }
        Ok((registry, catalog))
    }

    /// A resolver over this manifest's registry, with its behaviours as the
    /// only provider.
    pub fn into_resolver(self) -> Result<Resolver, ManifestError> {
        let (registry, catalog) = self.build()?;
        Ok(Resolver::builder(Arc::new(registry))
            .provider(Arc::new(catalog))
            .build()?)
    }
}

fn invalid(owner: &impl ToString, operation: &str, reason: impl Into<String>) -> ManifestError {
    ManifestError::InvalidOperation {
        owner: owner.to_string(),
        operation: operation.to_string(),
        reason: reason.into(),
    }
}

fn role_from_spec(spec: &RoleSpec) -> Result<Role, ManifestError> {
    let mut builder: RoleBuilder = match spec.kind {
        RoleKind::Capability => Role::capability(spec.id.clone()),
        RoleKind::Class => Role::class(spec.id.clone()),
    };
    for parent in &spec.supers {
        builder = builder.extends(parent.clone());
    }

    let mut concrete = FnBehaviour::new();
    for op in &spec.operations {
        let signature = op.signature();
        if op.value.is_some() && op.default.is_some() {
            return Err(invalid(&spec.id, &op.name, "both 'value' and 'default' given"));
        }

        if let Some(json) = &op.value {
            if spec.kind == RoleKind::Capability {
                return Err(invalid(&spec.id, &op.name, "capability roles cannot answer operations"));
            }
            let answer = constant(&spec.id, &signature, json)?;
            concrete = concrete.on(signature.clone(), move |_, _| Ok(answer.clone()));
            builder = builder.provides(signature);
        } else if let Some(json) = &op.default {
            let answer = constant(&spec.id, &signature, json)?;
            builder = builder.defaults(signature, move |_, _| Ok(answer.clone()));
        } else {
            builder = builder.requires(signature);
        }
    }

    if spec.kind == RoleKind::Class {
        let shared: Arc<dyn Behaviour> = Arc::new(concrete);
        builder = builder.constructor(move |_| Ok(shared.clone()));
    }
    Ok(builder.build())
}

fn behaviour_from_spec(
    registry: &StaticRoleRegistry,
    spec: &BehaviourSpec,
) -> Result<Arc<BehaviourFactory>, ManifestError> {
    // Operations answerable by this behaviour: those of its role and of the
    // extra capabilities it claims.
    let mut operations = Vec::new();
    for role in std::iter::once(&spec.role).chain(&spec.capabilities) {
        let ops = hierarchy::effective_operations(registry, role).map_err(|e| {
            invalid(&spec.id, "*", e.to_string())
        })?;
        operations.extend(ops.into_keys());
    }

    let mut behaviour = FnBehaviour::new();
    for (name, json) in &spec.answers {
        let mut matching = operations.iter().filter(|sig| sig.name() == name.as_str());
        let signature = match (matching.next(), matching.next()) {
            (Some(sig), None) => sig.clone(),
            (None, _) => return Err(invalid(&spec.id, name, "not declared by its roles")),
            (Some(_), Some(_)) => return Err(invalid(&spec.id, name, "overloaded; cannot pick by name")),
        };
        let answer = constant(&spec.id, &signature, json)?;
        behaviour = behaviour.on(signature, move |_, _| Ok(answer.clone()));
    }

    let mut builder = BehaviourFactory::builder(spec.id.clone(), spec.role.clone())
        .singleton(spec.singleton)
        .behaviour(behaviour);
    for cap in &spec.capabilities {
        builder = builder.capability(cap.clone());
    }
    for other in &spec.precedes {
        builder = builder.precedes(other.clone());
    }
    Ok(builder.build())
}

fn constant(owner: &impl ToString, signature: &Signature, json: &Json) -> Result<Value, ManifestError> {
    json_to_value(json, signature.result()).map_err(|reason| invalid(owner, signature.name(), reason))
}

/// Convert JSON to a [`Value`] of type `ty`.
pub fn json_to_value(json: &Json, ty: &ValueType) -> Result<Value, String> {
    let mismatch = || format!("expected {}, got {}", ty, json);
    let int = || json.as_i64().ok_or_else(mismatch);
    let uint = || json.as_u64().ok_or_else(mismatch);

    let value = match ty {
        ValueType::Bool => Value::Bool(json.as_bool().ok_or_else(mismatch)?),
        ValueType::U8 => Value::U8(u8::try_from(uint()?).map_err(|_| mismatch())?),
        ValueType::U16 => Value::U16(u16::try_from(uint()?).map_err(|_| mismatch())?),
        ValueType::U32 => Value::U32(u32::try_from(uint()?).map_err(|_| mismatch())?),
        ValueType::U64 => Value::U64(uint()?),
        ValueType::S8 => Value::S8(i8::try_from(int()?).map_err(|_| mismatch())?),
        ValueType::S16 => Value::S16(i16::try_from(int()?).map_err(|_| mismatch())?),
        ValueType::S32 => Value::S32(i32::try_from(int()?).map_err(|_| mismatch())?),
        ValueType::S64 => Value::S64(int()?),
        ValueType::F32 => Value::F32(json.as_f64().ok_or_else(mismatch)? as f32),
        ValueType::F64 => Value::F64(json.as_f64().ok_or_else(mismatch)?),
        ValueType::Char => {
            let s = json.as_str().ok_or_else(mismatch)?;
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Value::Char(c),
                _ => return Err(mismatch()),
            }
        }
        ValueType::String => Value::String(json.as_str().ok_or_else(mismatch)?.to_string()),
        ValueType::Entity => Value::Entity(json.as_str().ok_or_else(mismatch)?.to_string()),
        ValueType::List(elem) => {
            let items = json
                .as_array()
                .ok_or_else(mismatch)?
                .iter()
                .map(|item| json_to_value(item, elem))
                .collect::<Result<Vec<_>, _>>()?;
            Value::List {
                elem_type: (**elem).clone(),
                items,
            }
        }
        ValueType::Option(inner) => Value::Option {
            inner_type: (**inner).clone(),
            value: match json {
                Json::Null => None,
                other => Some(Box::new(json_to_value(other, inner)?)),
            },
        },
        ValueType::Tuple(types) => {
            if types.is_empty() && json.is_null() {
                return Ok(Value::unit());
            }
            let items = json.as_array().ok_or_else(mismatch)?;
            if items.len() != types.len() {
                return Err(mismatch());
            }
            Value::Tuple(
                items
                    .iter()
                    .zip(types)
                    .map(|(item, ty)| json_to_value(item, ty))
                    .collect::<Result<Vec<_>, _>>()?,
            )
        }
        ValueType::Record(name) => {
            let fields = json
                .as_object()
                .ok_or_else(mismatch)?
                .iter()
                .map(|(k, v)| Ok((k.clone(), json_to_value(v, &ValueType::Any)?)))
                .collect::<Result<Vec<_>, String>>()?;
            Value::Record {
                type_name: name.clone(),
                fields,
            }
        }
        ValueType::Any => infer_value(json)?,
    };
    Ok(value)
}

fn infer_value(json: &Json) -> Result<Value, String> {
    Ok(match json {
        Json::Null => Value::unit(),
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => Value::S64(i),
            (None, Some(f)) => Value::F64(f),
            _ => return Err(format!("unrepresentable number {}", n)),
        },
        Json::String(s) => Value::String(s.clone()),
        Json::Array(items) => Value::List {
            elem_type: ValueType::Any,
            items: items.iter().map(infer_value).collect::<Result<_, _>>()?,
        },
        Json::Object(_) => return Err("records need a declared type".to_string()),
    })
}

/// Plain JSON rendering of a [`Value`].
pub fn value_to_json(value: &Value) -> Json {
    match value {
        Value::Bool(b) => Json::from(*b),
        Value::U8(n) => Json::from(*n),
        Value::U16(n) => Json::from(*n),
        Value::U32(n) => Json::from(*n),
        Value::U64(n) => Json::from(*n),
        Value::S8(n) => Json::from(*n),
        Value::S16(n) => Json::from(*n),
        Value::S32(n) => Json::from(*n),
        Value::S64(n) => Json::from(*n),
        Value::F32(n) => Json::from(*n),
        Value::F64(n) => Json::from(*n),
        Value::Char(c) => Json::from(c.to_string()),
        Value::String(s) | Value::Entity(s) => Json::from(s.clone()),
        Value::Tuple(items) if items.is_empty() => Json::Null,
        Value::List { items, .. } | Value::Tuple(items) => {
            Json::Array(items.iter().map(value_to_json).collect())
        }
        Value::Option { value, .. } => value.as_deref().map_or(Json::Null, value_to_json),
        Value::Record { fields, .. } => Json::Object(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), value_to_json(v)))
                .collect(),
        ),
    }
}

/// Convert JSON call arguments for `signature`.
pub fn json_args(signature: &Signature, args: &[Json]) -> Result<Vec<Value>, String> {
    if args.len() != signature.arity() {
        return Err(format!(
            "{} takes {} arguments, got {}",
            signature,
            signature.arity(),
            args.len()
        ));
    }
    args.iter()
        .zip(signature.params())
        .map(|(arg, ty)| json_to_value(arg, ty))
        .collect()
}
