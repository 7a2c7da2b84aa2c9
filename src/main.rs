//! rolekit CLI - explore role compositions described by a manifest
//!
//! Commands:
//!   rolekit inspect <manifest>                  - List roles, type mappings and behaviours
//!   rolekit plan <manifest> [TYPE..]            - Show the composite a type set resolves to
//!   rolekit call <manifest> --types T <op> ARG  - Instantiate a composite and call an operation

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use rolekit::manifest::{json_args, value_to_json};
use rolekit::{CompositeType, EntityId, Manifest, Resolver, RoleRegistry, TypeSet};

#[derive(Parser)]
#[command(name = "rolekit")]
#[command(about = "Runtime role composition over JSON manifests", long_about = None)]
struct Cli {
    /// Log composition decisions (overridden by RUST_LOG)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display the roles, type mappings and behaviours of a manifest
    Inspect {
        /// Path to the manifest JSON
        manifest: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Resolve a type set and display the composite type it maps to
    Plan {
        manifest: PathBuf,

        /// Ontology type ids
        types: Vec<String>,

        /// Include the individual roles of this entity
        #[arg(long)]
        entity: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Instantiate a composite for an entity and call one operation
    Call {
        manifest: PathBuf,

        /// Operation name
        operation: String,

        /// Arguments as JSON literals
        args: Vec<String>,

        /// Ontology type ids, comma separated or repeated
        #[arg(long, short = 't', value_delimiter = ',')]
        types: Vec<String>,

        /// Entity id the composite is bound to
        #[arg(long, default_value = "_:cli")]
        entity: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Inspect { manifest, json } => inspect_command(&manifest, json),
        Commands::Plan {
            manifest,
            types,
            entity,
            json,
        } => plan_command(&manifest, &types, entity.as_deref(), json),
        Commands::Call {
            manifest,
            operation,
            args,
            types,
            entity,
        } => call_command(&manifest, &types, &entity, &operation, &args),
    }
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "rolekit=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load(path: &Path) -> anyhow::Result<Manifest> {
    Manifest::from_path(path).with_context(|| format!("loading manifest {}", path.display()))
}

fn inspect_command(path: &Path, json: bool) -> anyhow::Result<()> {
    let manifest = load(path)?;
    let (registry, catalog) = manifest.build()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&manifest)?);
        return Ok(());
    }

    println!("roles:");
    for role in registry.roles() {
        let base = if registry.base_eligible_roles().contains(role.id()) {
            " (base)"
        } else {
            ""
        };
        println!("  {} [{:?}]{}", role.id(), role.kind(), base);
        if !role.supers().is_empty() {
            let supers: Vec<_> = role.supers().iter().map(|s| s.to_string()).collect();
            println!("    extends: {}", supers.join(", "));
        }
        for op in role.operations() {
            println!("    {:?} {}", op.body, op.signature);
        }
    }

    let type_ids = registry.type_ids();
    if !type_ids.is_empty() {
        println!("types:");
        for ty in type_ids {
            let roles: Vec<_> = registry
                .roles_for_type(ty)
                .into_iter()
                .flatten()
                .map(|r| r.to_string())
                .collect();
            println!("  {} -> {}", ty, roles.join(", "));
        }
    }

    let individuals = registry.individuals();
    if !individuals.is_empty() {
        println!("individuals:");
        for (entity, roles) in individuals {
            let roles: Vec<_> = roles.iter().map(|r| r.to_string()).collect();
            println!("  {} -> {}", entity, roles.join(", "));
        }
    }

    if !catalog.is_empty() {
        println!("behaviours:");
        for factory in catalog.iter() {
            let singleton = if factory.is_singleton() { " (singleton)" } else { "" };
            println!("  {} for {}{}", factory.id(), factory.role(), singleton);
            for sig in factory.answers() {
                println!("    {}", sig);
            }
        }
    }

    Ok(())
}

fn resolve(
    resolver: &Resolver,
    types: &[String],
    entity: Option<&str>,
) -> anyhow::Result<std::sync::Arc<CompositeType>> {
    let types: TypeSet = types.iter().map(String::as_str).collect();
    let ty = match entity {
        Some(id) => resolver.resolve_entity_with(&EntityId::from(id), &types)?,
        None => resolver.resolve_blank_with(&types)?,
    };
    Ok(ty)
}

fn plan_command(path: &Path, types: &[String], entity: Option<&str>, json: bool) -> anyhow::Result<()> {
    let resolver = load(path)?.into_resolver()?;
    let ty = resolve(&resolver, types, entity)?;
    let summary = ty.summary();

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("composite: {}", summary.name);
    if let Some(base) = &summary.base {
        println!("base: {}", base);
    }
    let roles: Vec<_> = summary.roles.iter().map(|r| r.to_string()).collect();
    println!("roles: {}", roles.join(", "));
    if summary.slots.is_empty() {
        println!("slots: (none)");
    } else {
        println!("slots:");
        for slot in &summary.slots {
            println!("  [{}] {} => {}", slot.key, slot.signature, slot.bound_to);
        }
    }
    Ok(())
}

fn call_command(
    path: &Path,
    types: &[String],
    entity: &str,
    operation: &str,
    args: &[String],
) -> anyhow::Result<()> {
    let resolver = load(path)?.into_resolver()?;
    let ty = resolve(&resolver, types, Some(entity))?;

    let args: Vec<serde_json::Value> = args
        .iter()
        .map(|arg| serde_json::from_str(arg).with_context(|| format!("argument {} is not JSON", arg)))
        .collect::<anyhow::Result<_>>()?;

    let mut overloads = ty
        .slots()
        .iter()
        .filter(|slot| slot.signature.name() == operation)
        .peekable();
    if overloads.peek().is_none() {
        bail!("composite {} has no operation '{}'", ty.name(), operation);
    }

    let (signature, values) = overloads
        .find_map(|slot| {
            json_args(&slot.signature, &args)
                .ok()
                .map(|values| (slot.signature.clone(), values))
        })
        .ok_or_else(|| anyhow!("no overload of '{}' accepts these arguments", operation))?;

    let composite = ty.instantiate(rolekit::EntityHandle::new(entity))?;
    let result = composite.invoke(&signature, &values).map_err(|e| anyhow!(e))?;
    println!("{}", serde_json::to_string_pretty(&value_to_json(&result))?);
    Ok(())
}
