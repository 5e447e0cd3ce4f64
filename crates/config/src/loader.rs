use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{env_subst::substitute_env, schema::XurlConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &["xurl.toml", "xurl.yaml", "xurl.yml", "xurl.json"];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<XurlConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Build the process configuration.
///
/// Precedence, lowest first: built-in defaults, the first config file found
/// (`./xurl.*`, then `~/.config/xurl/xurl.*`), then environment variables.
pub fn discover_and_load() -> XurlConfig {
    let mut config = match find_config_file() {
        Some(path) => {
            debug!(path = %path.display(), "loading config");
            load_config(&path).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
                XurlConfig::default()
            })
        },
        None => XurlConfig::default(),
    };
    config.apply_env(|name| std::env::var(name).ok());
    config
}

fn find_config_file() -> Option<PathBuf> {
    let mut dirs = vec![PathBuf::from(".")];
    dirs.extend(config_dir());
    find_in(&dirs)
}

fn find_in(dirs: &[PathBuf]) -> Option<PathBuf> {
    dirs.iter()
        .flat_map(|dir| CONFIG_FILENAMES.iter().map(move |name| dir.join(name)))
        .find(|p| p.exists())
}

/// Returns the user config directory, `~/.config/xurl/`.
pub fn config_dir() -> Option<PathBuf> {
    home_dir().map(|h| h.join(".config").join("xurl"))
}

/// A file directly under the home directory (or the working directory when
/// no home directory can be determined).
pub(crate) fn home_file(name: &str) -> PathBuf {
    home_dir()
        .map(|h| h.join(name))
        .unwrap_or_else(|| PathBuf::from(name))
}

fn home_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf())
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<XurlConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}
