use std::sync::Arc;

use anyhow::Result;
use helix_search::{Config, Registry, SearchCoordinator, TargetSelector};

pub async fn run(config: Config, index: Option<&str>, body: &str, json: bool) -> Result<()> {
    let registry = Arc::new(Registry::open_dir(
        &config.data_dir,
        config.storage.writer_memory_bytes,
    )?);
    let coordinator = SearchCoordinator::new(Arc::clone(&registry), config.search);
    let outcome = coordinator
        .search(&TargetSelector::from_param(index), body.as_bytes())
        .await;
    registry.close()?;
    let response = outcome?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }
    println!(
        "{} hits ({} shards, {}ms)",
        response.total(),
        response.shards.total,
        response.took
    );
    for hit in &response.hits.hits {
        let source = hit
            .source
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();
        println!("{:>8.3}  {}/{}  {source}", hit.score, hit.index, hit.id);
    }
    Ok(())
}
