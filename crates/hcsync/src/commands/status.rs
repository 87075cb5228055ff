use colored::Colorize;
use hcsync_config::Settings;
use hcsync_core::{RelationKind, ResourceKind, StateManager};

pub async fn handle(settings: &Settings) -> anyhow::Result<()> {
    let state = StateManager::new(&settings.state_dir);
    let inventory = state.load().await?;

    println!("state: {}", settings.state_dir.display().to_string().cyan());
    println!();
    println!("{}", format!("{:<24} {:>8}", "KIND", "COUNT").bold());
    println!("{}", "─".repeat(33).dimmed());
    for kind in ResourceKind::ALL {
        println!("{:<24} {:>8}", kind.as_str(), inventory.count(kind));
    }
    for kind in RelationKind::ALL {
        println!("{:<24} {:>8}", kind.as_str(), inventory.relation_count(kind));
    }

    if !settings.accounts.is_empty() {
        println!();
        println!("{}", "アカウント:".bold());
        for account in &settings.accounts {
            match &account.profile {
                Some(profile) => println!("  {} ({}, profile: {})", account.id.cyan(), account.vendor, profile),
                None => println!("  {} ({})", account.id.cyan(), account.vendor),
            }
        }
    }
    Ok(())
}
