use super::ScopeArgs;
use colored::Colorize;
use hcsync_adaptor::VendorAdapter;
use hcsync_config::Settings;
use hcsync_core::{ActionType, CloudAdapter, MemoryStore, Reconciler, ResourceKind, StateManager};

pub async fn handle(settings: &Settings, args: &ScopeArgs, kind: &str, json: bool) -> anyhow::Result<()> {
    let kind: ResourceKind = kind.parse()?;
    let target = args.resolve(settings)?;

    let adapter = VendorAdapter::new(target.scope.vendor, target.profile);
    target.scope.validate(adapter.max_ids().min(settings.engine.max_cloud_ids))?;

    // 読み取りのみなのでロックは取らない
    let state = StateManager::new(&settings.state_dir);
    let store = MemoryStore::from_inventory(state.load().await?, settings.engine.store_batch_limit)?;

    let plan = Reconciler::new(&adapter, &store, &settings.engine)
        .plan(kind, &target.scope)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    println!("{}", format!("{} の差分 ({})", kind, target.scope).bold());
    for action in &plan.actions {
        let line = match action.action_type {
            ActionType::Create => format!("  + {}", action.cloud_id).green(),
            ActionType::Update => format!("  ~ {}", action.cloud_id).yellow(),
            ActionType::Delete => format!("  - {}", action.cloud_id).red(),
            ActionType::NoOp => continue,
        };
        println!("{}", line);
    }

    println!();
    if plan.has_changes {
        println!("{}", plan.summary());
    } else {
        println!("{}", "✓ 変更はありません".green());
    }
    Ok(())
}
