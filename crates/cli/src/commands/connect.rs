//! `contextos connect` — Store an API key and load the catalog with it.

use super::{CmdResult, open_panel};

pub async fn run(key: String) -> CmdResult {
    let (_, panel) = open_panel().await?;

    let published = panel.connect(&key).await?;
    println!("  Connected. {published} published context(s) available.");
    println!("  Run `contextos contexts` to list them.");
    Ok(())
}
