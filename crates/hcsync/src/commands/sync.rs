use super::{ScopeArgs, print_report};
use colored::Colorize;
use hcsync_adaptor::VendorAdapter;
use hcsync_config::Settings;
use hcsync_core::{MemoryStore, PipelineState, StateManager, SyncOrchestrator};

pub async fn handle(settings: &Settings, args: &ScopeArgs) -> anyhow::Result<()> {
    let target = args.resolve(settings)?;
    println!("{}", "同期を開始します...".blue());
    println!("スコープ: {}", target.scope.to_string().cyan());

    // 同じ state_dir を使う実行は直列化する
    let state = StateManager::new(&settings.state_dir);
    let lock = state.acquire_lock().await?;

    let store = MemoryStore::from_inventory(state.load().await?, settings.engine.store_batch_limit)?;
    let adapter = VendorAdapter::new(target.scope.vendor, target.profile);
    let outcome = SyncOrchestrator::new(&adapter, &store, &settings.engine)
        .run(&target.scope)
        .await;

    // 失敗時もコミット済みの書き込みは保存する
    state.save(&store.snapshot().await).await?;
    lock.release().await?;

    print_report(outcome.report());
    println!();

    match outcome {
        PipelineState::Completed(report) => {
            if report.is_noop() {
                println!("{}", "✓ 変更はありませんでした".green());
            } else {
                println!("{}", format!("✓ 同期が完了しました ({})", report.summary()).green());
            }
            Ok(())
        }
        PipelineState::Failed(failure) => {
            tracing::error!(stage = %failure.stage, "sync failed: {}", failure.error);
            println!("{}", format!("✗ {} ステージで失敗しました", failure.stage).red());
            Err(anyhow::anyhow!(failure.error).context(format!("{} ステージで同期に失敗しました", failure.stage)))
        }
    }
}
