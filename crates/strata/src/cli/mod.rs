//! CLI surface for strata.
//!
//! Thin handlers over the library: database-name checks, registry
//! inspection, and an end-to-end demo over the in-memory engine.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{ArgAction, Parser, Subcommand};

use strata_core::meta::Registry;
use strata_core::TypeKind;

use crate::config;
use crate::context::Context;
use crate::error::Result;
use crate::query::FilterToken;
use crate::samples::{self, BaseSampleData, DerivedSampleData};
use crate::source::{DataSource, DbName};
use crate::storage::MemoryStore;
use crate::telemetry;

#[derive(Parser, Debug)]
#[command(
    name = "strata",
    version,
    about = "Temporal, hierarchical record store",
    arg_required_else_help = true
)]
pub struct Cli {
    /// Config file path.
    #[arg(long, global = true, value_name = "PATH", default_value = "strata.toml")]
    pub config: PathBuf,

    /// Debug output (repeat for more).
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate a database name and show its environment gating.
    Env {
        /// Name in `ENV;GROUP;NAME` form.
        name: String,
    },

    /// List registered types, collections, and declared indexes.
    Schema,

    /// Run an end-to-end walkthrough over the in-memory engine.
    Demo,
}

pub fn run(cli: Cli) -> Result<()> {
    let cfg = config::load_or_init(&cli.config);
    telemetry::init(cli.verbose, &cfg.logging);

    match cli.command {
        Commands::Env { name } => {
            let db = DbName::parse(&name)?;
            println!("env:    {}", db.env());
            println!("group:  {}", db.group());
            println!("name:   {}", db.name());
            println!(
                "drop:   {}",
                if db.env().allows_drop() {
                    "permitted"
                } else {
                    "refused"
                }
            );
            Ok(())
        }
        Commands::Schema => {
            let registry = Arc::new(Registry::with_class_map(cfg.class_map.into()));
            strata_core::declare_core_types(&registry);
            samples::declare(&registry);
            print_schema(&registry)
        }
        Commands::Demo => {
            let registry = Arc::new(Registry::with_class_map(cfg.class_map.into()));
            samples::declare(&registry);
            let db = DbName::parse(&cfg.db_name)?;
            let source = Arc::new(
                DataSource::new(MemoryStore::new(), db, registry).with_convention(cfg.discriminator),
            );
            demo(source)
        }
    }
}

fn print_schema(registry: &Registry) -> Result<()> {
    let mut names: Vec<&str> = [
        strata_core::DATA_SET_TYPE,
        strata_core::DATA_SET_DETAIL_TYPE,
        strata_core::DELETED_RECORD_TYPE,
        samples::BASE_SAMPLE_TYPE,
        samples::DERIVED_SAMPLE_TYPE,
        samples::OTHER_DERIVED_SAMPLE_TYPE,
        samples::ELEMENT_SAMPLE_TYPE,
    ]
    .to_vec();
    names.sort_unstable();

    for name in names {
        let info = registry.require(name)?;
        match info.kind {
            TypeKind::Record => {
                let collection = registry.collection_of(name)?;
                println!("{name}  ->  collection `{collection}`");
                for declaration in registry.index_declarations(name)? {
                    println!("    index `{}`: {:?}", declaration.name, declaration.elements);
                }
                for method in &info.methods {
                    println!("    method `{}`", method.name);
                }
            }
            _ => println!("{name}  ({:?})", info.kind),
        }
    }
    Ok(())
}

/// Save, version, import, override, delete, and query on sample records.
fn demo(source: Arc<DataSource>) -> Result<()> {
    let common = source.create_common()?;
    let research = source.create_data_set("Research", &[common], common)?;
    println!("created Common {common} and Research {research}");

    let root = Context::new(source.clone());
    let common_context = root.with_data_set(common);
    let research_context = root.with_data_set(research);

    let mut base = BaseSampleData::new("EURUSD", 0);
    base.version = Some(0);
    common_context.save(&mut base)?;
    println!("saved EURUSD;0 into Common as {}", base.id);

    let mut override_row = BaseSampleData::new("EURUSD", 0);
    override_row.version = Some(1);
    research_context.save(&mut override_row)?;
    println!("saved override into Research as {}", override_row.id);

    let mut derived = DerivedSampleData::new("GBPUSD", 1);
    derived.derived_string_element = Some("derived".to_string());
    research_context.save(&mut derived)?;

    if let Some(winner) = research_context.reload_or_null::<BaseSampleData>("EURUSD;0")? {
        println!(
            "Research sees version {:?} via dataset {}",
            winner.version, winner.data_set
        );
    }

    // The whole hierarchy flows through the base type's query.
    let visible: Vec<_> = research_context
        .query_type(samples::BASE_SAMPLE_TYPE)
        .filter(FilterToken::gte("record_index", 0))
        .sort_by("record_id")
        .cursor()?
        .collect::<Result<_>>()?;
    println!("query returns {} record(s)", visible.len());

    research_context.delete_record::<BaseSampleData>("EURUSD;0")?;
    let after_delete = research_context.reload_or_null::<BaseSampleData>("EURUSD;0")?;
    println!(
        "after delete, Research sees {:?}, Common still sees a record: {}",
        after_delete.map(|r| r.version),
        common_context
            .reload_or_null::<BaseSampleData>("EURUSD;0")?
            .is_some()
    );
    Ok(())
}
