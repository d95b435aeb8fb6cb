//! `mindchat topics`: list the prompt catalog.

use super::load_config;
use mindchat_router::PromptCatalog;

pub async fn run(config_path: Option<&std::path::Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path)?;
    let catalog = PromptCatalog::from_config(&config)?;

    let source = config
        .catalog_path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "built-in".into());
    println!("Catalog: {source} ({} topics)\n", catalog.len());

    let mut topics: Vec<_> = catalog.topics().iter().collect();
    topics.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));

    println!("  {:<14} {:>8} {:>9}  LABEL", "ID", "PRIORITY", "EXAMPLES");
    for topic in topics {
        println!(
            "  {:<14} {:>8} {:>9}  {}",
            topic.id,
            topic.priority,
            topic.examples.len(),
            topic.label
        );
    }

    Ok(())
}
