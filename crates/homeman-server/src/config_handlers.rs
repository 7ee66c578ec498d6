//! Handlers for `homeman config {path,show,init}`.

use std::path::{Path, PathBuf};

use homeman_core::{Error, Result};

use crate::cli::ConfigAction;
use crate::config::HomemanConfig;

/// Handle a config subcommand.
///
/// Receives the raw `--config` path (not a loaded config) because `path`
/// and `init` work before a config file exists.
pub fn handle_config_command(config_path: Option<&str>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Path => {
            let path = resolved_path(config_path)?;
            println!("{}", path.display());
            if !path.exists() {
                eprintln!("(file does not exist; run `homeman config init` to create it)");
            }
            Ok(())
        }
        ConfigAction::Show => {
            let config = HomemanConfig::load(config_path)?;
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
        ConfigAction::Init { file, force } => {
            let path = match file {
                Some(p) => PathBuf::from(p),
                None => HomemanConfig::default_config_path()
                    .ok_or_else(|| Error::config("Could not determine config directory"))?,
            };
            write_default_config(&path, force)?;
            println!("Config file created at {}", path.display());
            Ok(())
        }
    }
}

fn resolved_path(config_path: Option<&str>) -> Result<PathBuf> {
    HomemanConfig::resolve_config_path(config_path).ok_or_else(|| {
        Error::config("Could not determine config directory for this platform")
    })
}

/// Writes the built-in defaults to `path`, creating parent directories.
fn write_default_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(Error::config(format!(
            "Config file already exists at {}. Use --force to overwrite.",
            path.display()
        )));
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(&HomemanConfig::default())
        .map_err(|e| Error::config(e.to_string()))?;
    std::fs::write(path, toml_str)?;
    Ok(())
}
