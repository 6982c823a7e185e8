use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::{Deserialize, Serialize};
use anyhow::{bail, Context, Result};
use crate::hash::HashAlgorithm;
use crate::orchestrator::UpdateRequest;
use crate::util::get_global_data_dir;

/// Represents the contents of a `lockstep.toml` file.
///
/// Holds global settings and the catalog of applications to keep in sync.
#[derive(Deserialize, Serialize, Debug, Default, Clone, PartialEq)]
pub struct LockstepConfig {
    #[serde(default)]
    pub settings: Settings,
    /// Application name to its sync source.
    #[serde(default)]
    pub apps: BTreeMap<String, AppConfig>,
}

/// Settings shared by every application.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Settings {
    /// Per-request timeout for manifest and file downloads.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Digest the manifests are authored with.
    #[serde(default)]
    pub hash: HashAlgorithm,
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            hash: HashAlgorithm::default(),
        }
    }
}

impl Settings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Where one application's files come from and where they are installed.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// Version token committed after a successful update.
    pub version: String,
    pub manifest_url: String,
    /// Prefix each manifest path is appended to when downloading.
    pub download_base_url: String,
    /// Installed root. Defaults to `<data dir>/apps/<name>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_path: Option<PathBuf>,
}

impl LockstepConfig {
    /// Saves the config to the given file path in pretty TOML format.
    ///
    /// # Errors
    /// Returns an error if the file can't be written or serialization fails.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_str = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_str)?;
        Ok(())
    }
    /// Loads a config from a file path.
    ///
    /// # Errors
    /// Returns an error if the file can't be read or deserialized.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<LockstepConfig> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("Could not parse {}", path.display()))
    }
    /// Adds a new application.
    ///
    /// # Errors
    /// Returns an error if the name is taken or a required field is blank.
    pub fn add(&mut self, name: &str, app: AppConfig) -> Result<()> {
        if name.trim().is_empty() {
            bail!("Application name must not be empty");
        }
        if self.apps.contains_key(name) {
            bail!("Application {} already exists", name);
        }
        if app.version.trim().is_empty() {
            bail!("Version for {} must not be empty", name);
        }
        if app.manifest_url.trim().is_empty() || app.download_base_url.trim().is_empty() {
            bail!("Manifest and download URLs for {} must not be empty", name);
        }
        let app = AppConfig {
            version: app.version.trim().to_string(),
            ..app
        };
        self.apps.insert(name.to_string(), app);
        Ok(())
    }
    /// Removes an application.
    ///
    /// If the application does not exist, nothing happens.
    pub fn remove(&mut self, name: &str) -> Option<AppConfig> {
        self.apps.remove(name)
    }

    pub fn app(&self, name: &str) -> Result<&AppConfig> {
        match self.apps.get(name) {
            Some(app) => Ok(app),
            None => bail!("Application {} is not configured", name),
        }
    }
    /// Returns the installed root of an application.
    pub fn install_root(&self, name: &str) -> Result<PathBuf> {
        let app = self.app(name)?;
        match &app.install_path {
            Some(path) => Ok(path.clone()),
            None => Ok(get_global_data_dir()?.join("apps").join(name)),
        }
    }
    /// Builds the orchestrator request for an application.
    pub fn request(&self, name: &str) -> Result<UpdateRequest> {
        let app = self.app(name)?;
        Ok(UpdateRequest {
            root: self.install_root(name)?,
            target_version: app.version.trim().to_string(),
            manifest_url: app.manifest_url.clone(),
            download_base_url: app.download_base_url.clone(),
        })
    }
}
