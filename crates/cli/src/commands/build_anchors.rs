//! `mindchat build-anchors`: recompute topic anchors and rewrite the anchor file.

use super::{load_config, load_provider};
use mindchat_index::{AnchorBuilder, AnchorFile, catalog_fingerprint};
use mindchat_router::PromptCatalog;

pub async fn run(config_path: Option<&std::path::Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path)?;
    let catalog = PromptCatalog::from_config(&config)?;
    let provider = load_provider(&config).await;

    let (Some(model_id), Some(dimension)) = (provider.model_id(), provider.dimension()) else {
        let reason = provider.unavailable_reason().unwrap_or("unknown reason");
        return Err(format!("Embedding model unavailable: {reason}").into());
    };

    let exemplars = catalog.exemplars();
    let anchors = AnchorBuilder::new(&provider).build(&exemplars)?;
    let skipped = exemplars.len() - anchors.len();

    let path = config.anchors_path();
    let file = AnchorFile::new(model_id, dimension, catalog_fingerprint(&exemplars), anchors);
    file.save(&path)?;

    println!("Wrote {} anchors to {}", file.anchors.len(), path.display());
    println!("  Model:       {model_id} ({dimension} dimensions)");
    println!("  Fingerprint: {}", file.catalog_fingerprint);
    if skipped > 0 {
        println!("  Skipped:     {skipped} topic(s) without usable examples");
    }

    Ok(())
}
