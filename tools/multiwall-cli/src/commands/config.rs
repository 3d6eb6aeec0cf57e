//! Print the effective configuration.

use multiwall_common::config::{config_file_path, WallConfig};

pub fn run() -> anyhow::Result<()> {
    let path = config_file_path();
    let config = WallConfig::load();
    config.validate()?;

    if path.exists() {
        println!("# loaded from {}", path.display());
    } else {
        println!("# {} not found; using defaults", path.display());
    }
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
