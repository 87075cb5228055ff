mod commands;

use clap::{Parser, Subcommand};
use commands::ScopeArgs;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hcsync")]
#[command(about = "クラウド資源のインベントリを、各ベンダーの実態と同期する", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// スコープ内の全資源と関係を同期
    Sync {
        #[command(flatten)]
        scope: ScopeArgs,
    },
    /// 1種類の資源について差分を表示（書き込みなし）
    Plan {
        #[command(flatten)]
        scope: ScopeArgs,
        /// 資源の種類 (vpc, subnet, security_group, network_interface, eip, disk, cvm)
        #[arg(short, long)]
        kind: String,
        /// JSON形式で出力
        #[arg(long)]
        json: bool,
    },
    /// 保存済みインベントリの件数を表示
    Status,
    /// バージョン情報を表示
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // ログはstderrへ。RUST_LOG で詳細度を変更できる
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    // Versionコマンドは設定ファイル不要
    if matches!(cli.command, Commands::Version) {
        println!("hcsync {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let settings = hcsync_config::load_settings()?;

    match cli.command {
        Commands::Sync { scope } => commands::sync::handle(&settings, &scope).await,
        Commands::Plan { scope, kind, json } => commands::plan::handle(&settings, &scope, &kind, json).await,
        Commands::Status => commands::status::handle(&settings).await,
        Commands::Version => Ok(()),
    }
}
