//! seQRets command line
//!
//! Splits secrets into Qards and restores them, manages vault files and
//! encrypted instructions, and stores items on seQRets smart cards.
//!
//! # Usage
//!
//! ```bash
//! SEQRETS_PASSWORD=... seqrets split --threshold 2 --total 3 < seed.txt
//! SEQRETS_PASSWORD=... seqrets restore shares.txt
//! seqrets card status
//! ```

mod app;
mod args;
mod card;
mod config;

use anyhow::{Context, Result};
use clap::Parser;

use crate::app::App;
use crate::args::Cli;
use crate::config::CliConfig;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config
    let mut config = CliConfig::load(cli.config.as_deref()).context("Failed to load config")?;

    // Apply env overrides
    config.apply_env_overrides();

    // Validate
    config
        .validate()
        .context("Configuration validation failed")?;

    // Init logger; the level may carry per-module directives
    env_logger::Builder::new()
        .parse_filters(&config.general.log_level)
        .init();

    if cli.validate {
        println!("✅ Configuration is valid.");
        println!("  Log level:        {}", config.general.log_level);
        println!("  Card backend:     {}", config.card.backend);
        println!(
            "  Card reader:      {}",
            if config.card.reader.is_empty() {
                "(first available)"
            } else {
                config.card.reader.as_str()
            }
        );
        println!("  Password env:     {}", config.secrets.password_env);
        println!("  Vault pw env:     {}", config.secrets.vault_password_env);
        println!("  PIN env:          {}", config.secrets.pin_env);
        println!("  New PIN env:      {}", config.secrets.new_pin_env);
        println!("  Vault label:      {}", config.vault.default_label);
        return Ok(());
    }

    let Some(command) = cli.command else {
        anyhow::bail!("No command given (try --help)");
    };

    let mut app = App::new(config);
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if let Err(e) = app.run(command, &mut out) {
        log::debug!("command failed: {:?}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
    Ok(())
}
