pub mod plan;
pub mod status;
pub mod sync;

use colored::Colorize;
use hcsync_config::Settings;
use hcsync_core::{SyncReport, SyncScope, Vendor};

/// 同期スコープの指定
#[derive(clap::Args, Debug, Clone)]
pub struct ScopeArgs {
    /// アカウントID（設定ファイルの accounts[].id）
    #[arg(short, long, env = "HCSYNC_ACCOUNT")]
    pub account: String,
    /// リージョン
    #[arg(short, long, env = "HCSYNC_REGION")]
    pub region: String,
    /// ゾーン（cvm / disk のみに適用）
    #[arg(short, long)]
    pub zone: Option<String>,
    /// リソースグループ（Azure では必須）
    #[arg(short = 'g', long)]
    pub resource_group: Option<String>,
    /// 対象のクラウドIDをカンマ区切りで指定（省略時はスコープ全体）
    #[arg(long, value_delimiter = ',')]
    pub ids: Vec<String>,
    /// ベンダー (tcloud, aws, gcp, azure, huawei)。設定ファイルの値を上書き
    #[arg(long)]
    pub vendor: Option<String>,
    /// ベンダーCLIのプロファイル。設定ファイルの値を上書き
    #[arg(long)]
    pub profile: Option<String>,
}

/// 解決済みの実行対象
pub struct Target {
    pub scope: SyncScope,
    pub profile: Option<String>,
}

impl ScopeArgs {
    pub fn resolve(&self, settings: &Settings) -> anyhow::Result<Target> {
        let configured = settings.account(&self.account).ok();
        let flag: Option<Vendor> = self.vendor.as_deref().map(str::parse).transpose()?;

        let vendor = match (configured, flag) {
            (Some(account), Some(vendor)) if account.vendor != vendor => {
                anyhow::bail!(
                    "アカウント '{}' は {} として設定されています（--vendor {}）",
                    self.account,
                    account.vendor,
                    vendor
                );
            }
            (_, Some(vendor)) => vendor,
            (Some(account), None) => account.vendor,
            (None, None) => anyhow::bail!(
                "アカウント '{}' のベンダーが不明です。--vendor で指定するか設定ファイルに追加してください",
                self.account
            ),
        };

        let mut scope = SyncScope::new(vendor, &self.account, &self.region).with_cloud_ids(self.ids.iter().cloned());
        if let Some(zone) = &self.zone {
            scope = scope.with_zone(zone);
        }
        if let Some(group) = &self.resource_group {
            scope = scope.with_resource_group(group);
        }

        Ok(Target {
            scope,
            profile: self.profile.clone().or_else(|| configured.and_then(|a| a.profile.clone())),
        })
    }
}

pub fn print_report(report: &SyncReport) {
    println!();
    println!("{}", format!("{:<20} {:>8} {:>8} {:>8} {:>10}", "KIND", "CREATE", "UPDATE", "DELETE", "UNCHANGED").bold());
    println!("{}", "─".repeat(58).dimmed());
    for outcome in &report.resources {
        println!(
            "{:<20} {:>8} {:>8} {:>8} {:>10}",
            outcome.kind.to_string().cyan(),
            outcome.created.len(),
            outcome.updated.len(),
            outcome.deleted.len(),
            outcome.unchanged
        );
    }
    for relation in &report.relations {
        println!(
            "{:<20} {:>8} {:>8} {:>8} {:>10}",
            relation.kind.to_string().cyan(),
            relation.created,
            "-",
            relation.deleted,
            "-"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hcsync_config::AccountConfig;

    fn args(account: &str, vendor: Option<&str>) -> ScopeArgs {
        ScopeArgs {
            account: account.into(),
            region: "ap-guangzhou".into(),
            zone: Some("ap-guangzhou-3".into()),
            resource_group: None,
            ids: vec!["ins-1".into(), "ins-1".into(), "ins-2".into()],
            vendor: vendor.map(String::from),
            profile: None,
        }
    }

    fn settings() -> Settings {
        Settings {
            accounts: vec![AccountConfig {
                id: "tc-prod".into(),
                vendor: Vendor::TCloud,
                profile: Some("prod".into()),
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_resolve_from_config() {
        let target = args("tc-prod", None).resolve(&settings()).unwrap();
        assert_eq!(target.scope.vendor, Vendor::TCloud);
        assert_eq!(target.scope.zone.as_deref(), Some("ap-guangzhou-3"));
        assert_eq!(target.scope.cloud_ids, vec!["ins-1", "ins-2"]);
        assert_eq!(target.profile.as_deref(), Some("prod"));
    }

    #[test]
    fn test_resolve_vendor_flag() {
        let target = args("unlisted", Some("aws")).resolve(&settings()).unwrap();
        assert_eq!(target.scope.vendor, Vendor::Aws);
        assert!(target.profile.is_none());

        assert!(args("unlisted", None).resolve(&settings()).is_err());
        assert!(args("tc-prod", Some("gcp")).resolve(&settings()).is_err());
        assert!(args("unlisted", Some("oracle")).resolve(&settings()).is_err());
    }
}
