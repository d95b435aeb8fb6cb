//! `mindchat doctor`: diagnose configuration, model, catalog and anchors.

use super::{load_config, load_provider};
use mindchat_config::AppConfig;
use mindchat_core::TopicSearch;
use mindchat_index::{AnchorFile, catalog_fingerprint};
use mindchat_router::{PromptCatalog, build_topic_index};
use std::sync::Arc;

pub async fn run(config_path: Option<&std::path::Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("MindChat Doctor: System Diagnostics");
    println!("===================================\n");

    let mut issues = 0;

    // Config
    let file = config_path
        .map(std::path::Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"));
    let config = match load_config(config_path) {
        Ok(config) => {
            if file.exists() {
                println!("  [ok]   Config file valid ({})", file.display());
            } else {
                println!("  [info] No config file at {}, using defaults", file.display());
            }
            config
        }
        Err(e) => {
            println!("  [fail] {e}");
            println!("\n  Fix the config file and run doctor again.");
            return Ok(());
        }
    };
    println!("         Mode: {}", config.app.default_mode);

    // Catalog
    let catalog = match PromptCatalog::from_config(&config) {
        Ok(catalog) => {
            println!("  [ok]   Prompt catalog loaded ({} topics)", catalog.len());
            Some(catalog)
        }
        Err(e) => {
            println!("  [fail] {e}");
            issues += 1;
            None
        }
    };

    // Embedding model
    let model_dir = config.embedding_model_dir();
    if model_dir.exists() {
        println!("  [ok]   Model directory exists ({})", model_dir.display());
    } else if config.embedding.allow_download {
        println!(
            "  [info] No model at {}, it will be downloaded ({})",
            model_dir.display(),
            config.embedding.model_id
        );
    } else {
        println!("  [warn] No model at {} and downloads are disabled", model_dir.display());
        issues += 1;
    }

    let provider = load_provider(&config).await;
    match (provider.model_id(), provider.dimension()) {
        (Some(model_id), Some(dimension)) => {
            println!("  [ok]   Embedding model ready: {model_id} ({dimension} dimensions)");
        }
        _ => {
            let reason = provider.unavailable_reason().unwrap_or("unknown reason");
            println!("  [warn] Embedding model unavailable: {reason}");
            println!("         Topic routing is disabled; counseling mode uses the default prompt.");
            issues += 1;
        }
    }

    // Anchors
    let anchors_path = config.anchors_path();
    match AnchorFile::load(&anchors_path) {
        Ok(Some(file)) => {
            let fresh = match (&catalog, provider.model_id(), provider.dimension()) {
                (Some(catalog), Some(model_id), Some(dimension)) => Some(file.matches(
                    model_id,
                    dimension,
                    &catalog_fingerprint(&catalog.exemplars()),
                )),
                _ => None,
            };
            match fresh {
                Some(true) => println!(
                    "  [ok]   Anchor file current ({} anchors, {})",
                    file.anchors.len(),
                    file.created_at.format("%Y-%m-%d %H:%M UTC")
                ),
                Some(false) => println!(
                    "  [info] Anchor file is stale and will be rebuilt ({})",
                    anchors_path.display()
                ),
                None => println!("  [info] Anchor file present ({})", anchors_path.display()),
            }
        }
        Ok(None) => println!(
            "  [info] No anchor file yet, anchors are computed on first start ({})",
            anchors_path.display()
        ),
        Err(e) => {
            println!("  [warn] {e}");
            issues += 1;
        }
    }

    // Routable topics
    if let Some(catalog) = &catalog
        && provider.is_available()
    {
        let for_index = catalog.clone();
        let provider = Arc::clone(&provider);
        let path = anchors_path.clone();
        let tie_break = config.routing.policy().tie_break;
        let index = tokio::task::spawn_blocking(move || {
            build_topic_index(&for_index, &provider, Some(&path), tie_break)
        })
        .await?;
        if index.len() == catalog.len() {
            println!("  [ok]   All {} topics routable", index.len());
        } else {
            println!(
                "  [warn] {} of {} topics routable (topics without usable examples are skipped)",
                index.len(),
                catalog.len()
            );
            issues += 1;
        }
    }

    // Summary
    println!();
    if issues == 0 {
        println!("  All checks passed!");
    } else {
        println!("  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
