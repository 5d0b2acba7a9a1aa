//! `contextos resume` — Rebuild the composite of a past prompt.

use super::{CmdResult, enhance::select_all_extracts, open_panel, require_key};

pub async fn run(id: String, extracts: bool) -> CmdResult {
    let (_, panel) = open_panel().await?;
    require_key(&panel).await?;

    // Schemas are needed to render the context section
    if let Err(e) = panel.refresh_contexts().await {
        eprintln!("  [Warning] {}", e.message());
    }
    panel.search_history(None).await;
    panel.resume(&id).await?;

    if extracts {
        select_all_extracts(&panel).await;
    }

    match panel.composite().await {
        Some(text) if !text.is_empty() => println!("{text}"),
        _ => eprintln!("  That prompt has no enhanced text."),
    }
    Ok(())
}
