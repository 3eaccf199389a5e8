//! Config commands.

use std::path::Path;

use clap::Subcommand;
use console::style;

use sl_core::config::AppConfig;
use sl_core::error::{SlError, SlResult};

use crate::OutputFormat;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show the effective configuration.
    Show,
    /// Write a configuration file with default values.
    Init {
        /// Server URL to store.
        #[arg(short, long)]
        url: Option<String>,
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
    /// Print the configuration file path.
    Path,
}

pub fn run(path: &Path, action: ConfigAction, format: OutputFormat) -> SlResult<()> {
    match action {
        ConfigAction::Show => {
            let cfg = AppConfig::load_or_default(path)?;
            match format {
                OutputFormat::Json => {
                    let value = serde_json::to_value(&cfg)?;
                    println!("{}", serde_json::to_string_pretty(&value)?);
                }
                OutputFormat::Text => print_config_text(&cfg, path),
            }
        }
        ConfigAction::Init { url, force } => {
            let cfg = init_config(path, url, force)?;
            match format {
                OutputFormat::Json => {
                    println!(
                        "{}",
                        serde_json::json!({ "path": path.display().to_string(), "url": cfg.server.url })
                    );
                }
                OutputFormat::Text => {
                    println!("  {} Config written to {}", style("OK").green(), path.display());
                }
            }
        }
        ConfigAction::Path => match format {
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({ "path": path.display().to_string(), "exists": path.exists() })
                );
            }
            OutputFormat::Text => println!("{}", path.display()),
        },
    }
    Ok(())
}

fn init_config(path: &Path, url: Option<String>, force: bool) -> SlResult<AppConfig> {
    if path.exists() && !force {
        return Err(SlError::Config(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )));
    }
    let mut cfg = AppConfig::default();
    if let Some(url) = url {
        cfg.server.url = AppConfig::sanitize_server_url(&url);
    }
    cfg.save_to_file(path)?;
    Ok(cfg)
}

fn print_config_text(cfg: &AppConfig, path: &Path) {
    let source = if path.exists() { "" } else { " (defaults, file not found)" };
    println!("{}{}", style(path.display()).dim(), style(source).dim());
    println!();

    println!("{}", style("Server").bold().underlined());
    println!("  server.url                    {}", cfg.server.url);
    println!("  server.connect_timeout_ms     {}", cfg.server.connect_timeout_ms);

    println!();
    println!("{}", style("Reconnect").bold().underlined());
    println!("  reconnect.base_delay_ms       {}", cfg.reconnect.base_delay_ms);
    println!("  reconnect.max_delay_ms        {}", cfg.reconnect.max_delay_ms);
    println!("  reconnect.max_attempts        {}", cfg.reconnect.max_attempts);
    println!("  reconnect.jitter_factor       {}", cfg.reconnect.jitter_factor);

    println!();
    println!("{}", style("Logging").bold().underlined());
    println!("  logging.level                 {}", cfg.logging.level);
    println!("  logging.directory             {}", cfg.logging.directory);
    println!("  logging.json_output           {}", cfg.logging.json_output);

    println!();
    println!("{}", style("Notifications").bold().underlined());
    println!("  notifications.desktop         {}", cfg.notifications.desktop);

    println!();
    println!("{}", style("Subscriptions").bold().underlined());
    println!("  subscriptions.channels        {}", cfg.subscriptions.channels.join(", "));
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_writes_loadable_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        init_config(&path, Some("https://scanner.local/ws/".into()), false).unwrap();
        let loaded = AppConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.server.url, "wss://scanner.local/ws");
        assert_eq!(loaded.reconnect.max_attempts, 5);
    }

    #[test]
    fn test_init_refuses_to_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        init_config(&path, None, false).unwrap();

        assert!(init_config(&path, None, false).is_err());
        assert!(init_config(&path, Some("ws://other".into()), true).is_ok());
        assert_eq!(AppConfig::load_from_file(&path).unwrap().server.url, "ws://other");
    }
}
