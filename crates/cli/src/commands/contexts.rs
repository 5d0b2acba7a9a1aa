//! `contextos contexts` — List published context schemas.

use super::{CmdResult, open_panel, require_key};

pub async fn run(search: Option<String>) -> CmdResult {
    let (_, panel) = open_panel().await?;
    require_key(&panel).await?;

    panel.refresh_contexts().await?;
    let schemas = panel
        .catalog()
        .search(search.as_deref().unwrap_or_default())
        .await;

    if schemas.is_empty() {
        println!("  No contexts found.");
        return Ok(());
    }

    for schema in &schemas {
        println!("  {}  {} [{}]", schema.id, schema.name, schema.context_type);
        if !schema.company_name.is_empty() {
            println!("      Company:  {}", schema.company_name);
        }
        if !schema.target_audience.is_empty() {
            println!("      Personas: {}", schema.target_audience.join(", "));
        }
        if !schema.key_goals.is_empty() {
            println!("      Goals:    {}", schema.key_goals.join(", "));
        }
        if !schema.description.is_empty() {
            println!("      {}", schema.description);
        }
    }
    println!("\n  {} context(s)", schemas.len());
    Ok(())
}
