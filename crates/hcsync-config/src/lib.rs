pub mod error;

pub use error::*;

use hcsync_core::{EngineConfig, Vendor};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CONFIG_ENV: &str = "HCSYNC_CONFIG_PATH";
const CANDIDATES: [&str; 4] = ["hcsync.local.yaml", ".hcsync.local.yaml", "hcsync.yaml", ".hcsync.yaml"];

/// hcsyncの設定ファイル全体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// エンジンの上限値
    pub engine: EngineConfig,
    /// state.json / lock.json を置くディレクトリ
    pub state_dir: PathBuf,
    pub accounts: Vec<AccountConfig>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            state_dir: PathBuf::from(".hcsync"),
            accounts: Vec::new(),
        }
    }
}

/// 同期対象のクラウドアカウント
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountConfig {
    pub id: String,
    pub vendor: Vendor,
    /// ベンダーCLIのプロファイル名
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
}

impl Settings {
    pub fn account(&self, id: &str) -> Result<&AccountConfig> {
        self.accounts
            .iter()
            .find(|a| a.id == id)
            .ok_or_else(|| ConfigError::AccountNotFound(id.to_string()))
    }

    fn validate(&self) -> Result<()> {
        let engine = &self.engine;
        if engine.max_cloud_ids == 0 || engine.store_batch_limit == 0 || engine.store_page_limit == 0 {
            return Err(ConfigError::Invalid("engine の上限値は 1 以上が必要です".into()));
        }
        for (i, account) in self.accounts.iter().enumerate() {
            if account.id.trim().is_empty() {
                return Err(ConfigError::Invalid("アカウントIDが空です".into()));
            }
            if self.accounts[..i].iter().any(|a| a.id == account.id) {
                return Err(ConfigError::Invalid(format!("アカウントIDが重複しています: {}", account.id)));
            }
        }
        Ok(())
    }
}

/// hcsyncの設定ディレクトリを取得
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("hcsync");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

/// 設定ファイルを探す
///
/// 以下の優先順位で検索:
/// 1. 環境変数 HCSYNC_CONFIG_PATH (直接パス指定)
/// 2. カレントディレクトリ: hcsync.local.yaml, .hcsync.local.yaml, hcsync.yaml, .hcsync.yaml
/// 3. ./.hcsync/ ディレクトリ内: 同様の順序
/// 4. ~/.config/hcsync/hcsync.yaml (グローバル設定)
pub fn find_config_file() -> Result<PathBuf> {
    if let Ok(config_path) = std::env::var(CONFIG_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
        tracing::warn!("{} points to a missing file: {}", CONFIG_ENV, path.display());
    }

    let current_dir = std::env::current_dir()?;
    for dir in [current_dir.clone(), current_dir.join(".hcsync")] {
        if !dir.is_dir() {
            continue;
        }
        for filename in &CANDIDATES {
            let path = dir.join(filename);
            if path.exists() {
                return Ok(path);
            }
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global_config = config_dir.join("hcsync").join("hcsync.yaml");
        if global_config.exists() {
            return Ok(global_config);
        }
    }

    Err(ConfigError::ConfigFileNotFound)
}

/// 指定したファイルから設定を読み込む
pub fn load_settings_from(path: &Path) -> Result<Settings> {
    let content = std::fs::read_to_string(path)?;
    let settings: Settings = if content.trim().is_empty() {
        Settings::default()
    } else {
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?
    };
    settings.validate()?;

    tracing::debug!("Loaded {} accounts from {}", settings.accounts.len(), path.display());
    Ok(settings)
}

/// 設定を読み込む。設定ファイルが無い場合はデフォルト値を返す
pub fn load_settings() -> Result<Settings> {
    match find_config_file() {
        Ok(path) => load_settings_from(&path),
        Err(ConfigError::ConfigFileNotFound) => {
            tracing::debug!("No config file found, using defaults");
            Ok(Settings::default())
        }
        Err(e) => Err(e),
    }
}
