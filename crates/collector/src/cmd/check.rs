//! Check command - validate a configuration without binding anything

use std::path::Path;

use anyhow::{Context, Result};
use atna_config::Config;

use super::serve::build_listeners;

pub fn run(config_path: &Path) -> Result<()> {
    let config = Config::from_file(config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    // Loads TLS material and resolves every action
    let listeners = build_listeners(&config)?;

    println!("{}: ok", config_path.display());
    for listener in &listeners {
        let endpoint = listener.config();
        println!(
            "  {:<20} {:<28} actions: [{}]",
            endpoint.name,
            endpoint.address.as_str(),
            listener.actions().join(", ")
        );
    }

    Ok(())
}
