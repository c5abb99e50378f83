use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::Deserialize;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8787;
pub const DEFAULT_DATA_DIR: &str = "data";

/// Fully resolved settings the server runs with.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub cors_origins: Vec<String>,
}

/// Options collected from the command line; every field optional so file
/// config and defaults can fill the gaps.
#[derive(Debug, Default, Clone)]
pub struct CliOptions {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub data_dir: Option<PathBuf>,
    pub cors_origins: Vec<String>,
}

/// Settings read from tally.toml, paths already resolved against the
/// config file's directory.
#[derive(Debug, Clone, Default)]
pub struct FileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub data_dir: Option<PathBuf>,
    pub cors_origins: Vec<String>,
}

#[derive(Deserialize, Default)]
struct RootConfig {
    #[serde(default)]
    server: Option<RawServerConfig>,
    #[serde(default)]
    storage: Option<RawStorageConfig>,
}

#[derive(Deserialize, Default)]
struct RawServerConfig {
    host: Option<String>,
    port: Option<u16>,
    cors_origins: Option<Vec<String>>,
}

#[derive(Deserialize, Default)]
struct RawStorageConfig {
    data_dir: Option<String>,
}

pub fn load_file_config(path: Option<&Path>) -> Result<Option<FileConfig>> {
    let Some(path) = path else {
        return Ok(None);
    };

    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;
    let parsed: RootConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse TOML config {}", path.display()))?;

    let base = path.parent().unwrap_or(Path::new("."));
    Ok(Some(parsed.into_runtime_config(base)))
}

/// Merge CLI options over file config over defaults.
pub fn resolve(cli: &CliOptions, file_cfg: Option<&FileConfig>) -> RuntimeConfig {
    let host = cli
        .host
        .clone()
        .or_else(|| file_cfg.and_then(|cfg| cfg.host.clone()))
        .unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = cli
        .port
        .or_else(|| file_cfg.and_then(|cfg| cfg.port))
        .unwrap_or(DEFAULT_PORT);

    let data_dir = cli
        .data_dir
        .clone()
        .or_else(|| file_cfg.and_then(|cfg| cfg.data_dir.clone()))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));

    let mut cors_origins: Vec<String> = Vec::new();
    if let Some(cfg) = file_cfg {
        cors_origins.extend(cfg.cors_origins.iter().cloned());
    }
    cors_origins.extend(cli.cors_origins.iter().cloned());
    cors_origins.sort();
    cors_origins.dedup();

    RuntimeConfig {
        host,
        port,
        data_dir,
        cors_origins,
    }
}

fn resolve_relative(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

impl RootConfig {
    fn into_runtime_config(self, base: &Path) -> FileConfig {
        let server = self.server.unwrap_or_default();
        let storage = self.storage.unwrap_or_default();

        FileConfig {
            host: server.host,
            port: server.port,
            data_dir: storage
                .data_dir
                .map(|dir| resolve_relative(base, Path::new(&dir))),
            cors_origins: server.cors_origins.unwrap_or_default(),
        }
    }
}
