use anyhow::Result;
use helix_search::{Config, Registry};

use super::IndexCommands;

pub fn run(config: &Config, command: IndexCommands, json: bool) -> Result<()> {
    let registry = Registry::open_dir(&config.data_dir, config.storage.writer_memory_bytes)?;
    let outcome = execute(&registry, config, command, json);
    registry.close()?;
    outcome
}

fn execute(registry: &Registry, config: &Config, command: IndexCommands, json: bool) -> Result<()> {
    match command {
        IndexCommands::Create {
            name,
            storage,
            shards,
        } => {
            let storage = storage.unwrap_or(config.storage.default_storage);
            let shards = shards.unwrap_or(config.storage.default_shards);
            let pending = registry.create(&name, storage, shards)?;
            let index = registry.persist(pending)?;
            if json {
                println!("{}", serde_json::to_string_pretty(index.meta())?);
            } else {
                println!(
                    "Created index {} ({}, {} shards)",
                    index.name(),
                    index.storage_type(),
                    index.shard_count()
                );
            }
            Ok(())
        }
        IndexCommands::List => list(registry, json),
        IndexCommands::Delete { name } => {
            registry.delete(&name)?;
            if json {
                println!("{}", serde_json::json!({ "acknowledged": true, "index": name }));
            } else {
                println!("Deleted index {name}");
            }
            Ok(())
        }
    }
}

fn list(registry: &Registry, json: bool) -> Result<()> {
    let metas = registry.list();
    if json {
        println!("{}", serde_json::to_string_pretty(&metas)?);
        return Ok(());
    }
    if metas.is_empty() {
        println!("No indices.");
        return Ok(());
    }
    println!("{:<32} {:<8} {:>6} {:>10}", "INDEX", "STORAGE", "SHARDS", "DOCS");
    for meta in metas {
        let docs = registry.get(&meta.name)?.doc_count()?;
        println!(
            "{:<32} {:<8} {:>6} {:>10}",
            meta.name,
            meta.storage_type.as_str(),
            meta.shard_count,
            docs
        );
    }
    Ok(())
}
