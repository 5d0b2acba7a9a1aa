pub mod connect;
pub mod contexts;
pub mod disconnect;
pub mod enhance;
pub mod history;
pub mod onboard;
pub mod resume;
pub mod status;

use std::sync::Arc;

use contextos_client::HttpEnrichmentService;
use contextos_config::AppConfig;
use contextos_engine::Panel;

pub type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// Load config and build a panel backed by the HTTP service.
pub async fn open_panel() -> Result<(AppConfig, Panel), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let service = HttpEnrichmentService::from_config(&config)?;
    let panel = Panel::from_config(&config, Arc::new(service)).await?;
    Ok((config, panel))
}

/// Fail early with setup instructions when no key is available.
pub async fn require_key(panel: &Panel) -> CmdResult {
    if panel.credentials().is_configured().await {
        return Ok(());
    }
    eprintln!();
    eprintln!("  ERROR: No API key configured!");
    eprintln!();
    eprintln!("  Run:  contextos connect <KEY>");
    eprintln!("  or set $CONTEXTOS_API_KEY, or add api_key to:");
    eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
    eprintln!();
    Err("No API key found. See above for setup instructions.".into())
}
