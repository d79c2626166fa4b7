//! On-disk repo: configuration, rendered bootstrap scripts, campaign state.
//!
//! Layout under the repo root (default `~/.pilot`, `PILOT_HOME` override):
//!
//! ```text
//! config.json               daemon configuration
//! template/worker32g.sh.tmpl
//! template/worker64g.sh.tmpl
//! scripts/<miner>.sh        rendered per-miner bootstrap script
//! state/switch.json         campaign map snapshot
//! ```
//!
//! Templates are seeded from embedded copies on init and read back from
//! disk on render, so operators can adjust them without rebuilding.

use anyhow::{Context, Result};
use pilot_protocol::{ApiInfo, MinerAddress, PilotConfig, SectorSize, SwitchId, SwitchState};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

const FS_CONFIG: &str = "config.json";
const FS_SCRIPTS: &str = "scripts";
const FS_TEMPLATE: &str = "template";
const FS_STATE: &str = "state";
const FS_WORKER_32G: &str = "worker32g.sh.tmpl";
const FS_WORKER_64G: &str = "worker64g.sh.tmpl";
const FS_SWITCH: &str = "switch.json";

const WORKER_32G_TMPL: &str = include_str!("../templates/worker32g.sh.tmpl");
const WORKER_64G_TMPL: &str = include_str!("../templates/worker64g.sh.tmpl");

/// Handle to the repo directory.
#[derive(Debug, Clone)]
pub struct Repo {
    path: PathBuf,
}

impl Repo {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Default repo location: `$PILOT_HOME`, else `~/.pilot`.
    pub fn default_path() -> PathBuf {
        if let Ok(home) = std::env::var("PILOT_HOME") {
            return PathBuf::from(home);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".pilot")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn scripts_path(&self) -> PathBuf {
        self.path.join(FS_SCRIPTS)
    }

    fn config_path(&self) -> PathBuf {
        self.path.join(FS_CONFIG)
    }

    fn template_path(&self, size: SectorSize) -> PathBuf {
        let name = match size {
            SectorSize::Gib32 => FS_WORKER_32G,
            SectorSize::Gib64 => FS_WORKER_64G,
        };
        self.path.join(FS_TEMPLATE).join(name)
    }

    fn script_path(&self, miner: &MinerAddress) -> PathBuf {
        self.scripts_path().join(format!("{miner}.sh"))
    }

    fn state_path(&self) -> PathBuf {
        self.path.join(FS_STATE).join(FS_SWITCH)
    }

    pub fn exists(&self) -> bool {
        self.path.join(FS_SCRIPTS).exists() || self.path.join(FS_TEMPLATE).exists()
    }

    /// Create the directory layout and seed config, templates and state.
    /// A repo that already exists is left untouched.
    pub fn init(&self) -> Result<()> {
        if self.exists() {
            return Ok(());
        }

        info!(path = %self.path.display(), "initializing repo");
        fs::create_dir_all(&self.path)?;
        fs::create_dir_all(self.scripts_path())?;
        fs::create_dir_all(self.path.join(FS_TEMPLATE))?;
        fs::create_dir_all(self.path.join(FS_STATE))?;

        let config = serde_json::to_string_pretty(&PilotConfig::default())?;
        fs::write(self.config_path(), config)?;
        fs::write(self.template_path(SectorSize::Gib32), WORKER_32G_TMPL)?;
        fs::write(self.template_path(SectorSize::Gib64), WORKER_64G_TMPL)?;
        fs::write(self.state_path(), "{}")?;

        Ok(())
    }

    pub fn load_config(&self) -> Result<PilotConfig> {
        let raw = fs::read_to_string(self.config_path())
            .with_context(|| format!("failed to read {}", self.config_path().display()))?;
        serde_json::from_str(&raw).context("failed to parse config.json")
    }

    /// Add or remove (`api = None`) one miner entry and rewrite the config.
    pub fn update_config(&self, miner: &str, api: Option<&ApiInfo>) -> Result<()> {
        let mut config = self.load_config()?;
        match api {
            Some(api) => {
                config.miners.insert(miner.to_string(), api.clone());
            }
            None => {
                config.miners.remove(miner);
            }
        }

        let data = serde_json::to_string_pretty(&config)?;
        fs::write(self.config_path(), data)
            .with_context(|| format!("failed to write {}", self.config_path().display()))?;
        info!(miner, "updated config");
        Ok(())
    }

    /// Render the size-matched bootstrap script for one miner.
    pub fn create_script(
        &self,
        miner: &MinerAddress,
        token_blob: &str,
        size: SectorSize,
    ) -> Result<PathBuf> {
        let template = fs::read_to_string(self.template_path(size))
            .with_context(|| format!("failed to read {} template", size))?;
        let rendered = render_script(&template, miner, token_blob);

        let path = self.script_path(miner);
        fs::write(&path, rendered)
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!(script = %path.display(), "created script");
        Ok(path)
    }

    pub fn remove_script(&self, miner: &MinerAddress) -> Result<()> {
        let path = self.script_path(miner);
        fs::remove_file(&path)
            .with_context(|| format!("failed to remove {}", path.display()))?;
        info!(script = %path.display(), "removed script");
        Ok(())
    }

    /// Read the campaign map snapshot. A missing or empty file is an
    /// empty map.
    pub fn read_switch_state(&self) -> Result<HashMap<SwitchId, SwitchState>> {
        let path = self.state_path();
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read {}", path.display()))
            }
        };
        if raw.trim().is_empty() {
            return Ok(HashMap::new());
        }
        serde_json::from_str(&raw).context("failed to parse state/switch.json")
    }

    pub fn write_switch_state(&self, switches: &HashMap<SwitchId, SwitchState>) -> Result<()> {
        let path = self.state_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec(switches)?;
        fs::write(&path, data).with_context(|| format!("failed to write {}", path.display()))
    }
}

fn render_script(template: &str, miner: &MinerAddress, token_blob: &str) -> String {
    template
        .replace("{{MinerID}}", miner.as_str())
        .replace("{{MinerAPIInfo}}", token_blob)
}
