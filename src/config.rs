use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RepoCacheConfig {
    /// Directory holding the `<prefix>.sqlite` files
    pub cache_dir: Option<String>,
    /// Suppress human-readable output
    pub quiet: Option<bool>,
}

impl RepoCacheConfig {
    /// Cache directory, falling back to the current directory
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir
            .as_deref()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("repocache.toml")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<RepoCacheConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: RepoCacheConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &RepoCacheConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use --force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

pub fn ensure_cache_dir(dir: &Path) -> anyhow::Result<()> {
    if !dir.as_os_str().is_empty() && !dir.exists() {
        std::fs::create_dir_all(dir)?;
    }
    Ok(())
}
