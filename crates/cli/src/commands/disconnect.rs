//! `contextos disconnect` — Forget the stored API key.

use super::{CmdResult, open_panel};

pub async fn run() -> CmdResult {
    let (_, panel) = open_panel().await?;
    panel.disconnect().await?;
    println!("  Disconnected. Stored API key removed.");
    Ok(())
}
