use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// テンポラリディレクトリ内の設定ファイルと state ディレクトリ
pub struct TestEnv {
    pub dir: TempDir,
    pub config_path: PathBuf,
}

impl TestEnv {
    pub fn new(accounts: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("hcsync.yaml");
        let content = format!(
            "state_dir: {}\naccounts:\n{}",
            dir.path().join("state").display(),
            accounts
        );
        std::fs::write(&config_path, content).unwrap();
        Self { dir, config_path }
    }

    pub fn state_dir(&self) -> PathBuf {
        self.dir.path().join("state")
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}
