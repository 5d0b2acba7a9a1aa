//! `contextos status` — Show configuration and connection state.

use contextos_config::AppConfig;

use super::{CmdResult, open_panel};

pub async fn run() -> CmdResult {
    let (config, panel) = open_panel().await?;
    let connected = panel.credentials().is_configured().await;

    println!("ContextOS Status");
    println!("================");
    println!("  Config dir:    {}", AppConfig::config_dir().display());
    println!("  Credentials:   {}", config.credentials_path().display());
    println!("  API URL:       {}", config.api_url);
    println!(
        "  Polling:       every {}ms, up to {} attempts",
        config.poll.interval_ms, config.poll.max_attempts
    );
    match config.http.timeout_secs {
        Some(secs) => println!("  HTTP timeout:  {secs}s"),
        None => println!("  HTTP timeout:  none"),
    }
    println!(
        "  API key:       {}",
        if connected { "configured" } else { "not configured" }
    );

    if connected {
        match panel.refresh_contexts().await {
            Ok(published) => println!("  Contexts:      {published} published"),
            Err(e) => println!("  Contexts:      unavailable ({})", e.message()),
        }
    } else {
        println!("\n  Run `contextos connect <KEY>` to get started");
    }

    let config_path = AppConfig::config_dir().join("config.toml");
    if !config_path.exists() {
        println!("\n  No config file, using defaults (run `contextos onboard` to create one)");
    }

    Ok(())
}
