use anyhow::Result;
use helix_search::{Config, HelixSearchError, ParseError, Registry};

pub fn run(config: &Config, index: &str, source: &str, id: Option<String>, json: bool) -> Result<()> {
    let source: serde_json::Value = serde_json::from_str(source)
        .map_err(|e| HelixSearchError::Parse(ParseError::from_json(&e, source.as_bytes())))?;
    let registry = Registry::open_dir(&config.data_dir, config.storage.writer_memory_bytes)?;
    let outcome = registry
        .get(index)
        .and_then(|target| target.put_document(id, source));
    registry.close()?;
    let id = outcome?;

    if json {
        println!("{}", serde_json::json!({ "_index": index, "_id": id, "result": "created" }));
    } else {
        println!("Stored {index}/{id}");
    }
    Ok(())
}
