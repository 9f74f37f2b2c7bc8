use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::{RetryPolicy, DEFAULT_BASE_URL};
use crate::store::StoreBackend;

/// Everything a sync run needs to know
#[derive(Debug, Clone)]
pub struct EtlConfig {
    pub base_url: String,
    pub policy: RetryPolicy,
    pub data_dir: PathBuf,
    pub backend: StoreBackend,
}

impl EtlConfig {
    /// Defaults for everything but the data directory
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            policy: RetryPolicy::default(),
            data_dir: data_dir.into(),
            backend: StoreBackend::default(),
        }
    }

    pub fn with_backend(mut self, backend: StoreBackend) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.policy.request_delay = delay;
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

/// Use `custom_dir` or the platform data directory, creating it if needed
pub fn resolve_data_dir(custom_dir: Option<PathBuf>) -> Result<PathBuf> {
    let data_dir = match custom_dir {
        Some(dir) => dir,
        None => {
            let proj_dirs = ProjectDirs::from("", "", "pokedex-etl")
                .context("Could not determine data directory")?;
            proj_dirs.data_dir().to_path_buf()
        }
    };

    fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data directory {:?}", data_dir))?;

    Ok(data_dir)
}
