//! `contextos history` — List past completed prompts.

use super::{CmdResult, open_panel, require_key};

pub async fn run(search: Option<String>) -> CmdResult {
    let (_, panel) = open_panel().await?;
    require_key(&panel).await?;

    let entries = panel.search_history(search.as_deref()).await;
    if entries.is_empty() {
        println!("  No history found.");
        return Ok(());
    }

    for entry in &entries {
        let when = entry
            .created_at
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".into());
        println!("  {}  {when}  {}", entry.id, preview(&entry.original_prompt, 60));
    }
    println!("\n  Run `contextos resume <ID>` to print a composite.");
    Ok(())
}

fn preview(text: &str, max: usize) -> String {
    let line = text.lines().next().unwrap_or_default();
    if line.chars().count() <= max {
        line.to_string()
    } else {
        let cut: String = line.chars().take(max).collect();
        format!("{cut}...")
    }
}
