use anyhow::Result;
use chrono::Utc;
use colored::*;
use std::io::{self, Write};

use periodic_backup_engine::PeriodicBackup;

/// Apply the retention policy now, or only show what it would delete.
pub async fn perform_cleanup(service: &PeriodicBackup, dry_run: bool, force: bool) -> Result<()> {
    let policy = service.retention_policy();
    println!("{}", "Retention Policy:".bright_blue().bold());
    println!("   {}", policy.summarize());
    println!();

    if policy.is_unlimited() {
        println!("   Nothing to clean up, every backup is kept");
        return Ok(());
    }

    let now = Utc::now();
    let plan = service.retention_plan(now).await?;
    let total: usize = plan.iter().map(|(_, doomed)| doomed.len()).sum();

    if total == 0 {
        println!("   {}", "All backups meet retention criteria".bright_green());
        return Ok(());
    }

    println!("{}", "Backups to Delete:".bright_yellow().bold());
    for (location, doomed) in &plan {
        if doomed.is_empty() {
            continue;
        }
        println!("   {}", location.bold());
        for backup in doomed {
            let age_days = (now - backup.timestamp()).num_days();
            println!(
                "      • {} - {} archive(s), {} days old",
                backup.id().bright_red(),
                backup.archive_file_names().len(),
                age_days
            );
        }
    }
    println!();

    if dry_run {
        println!("   Dry run: {} backup(s) would be deleted", total);
        println!("   Run without --dry-run to actually delete these backups");
        return Ok(());
    }

    if !force {
        print!("{} ", "Delete these backups? (yes/no):".bright_yellow().bold());
        io::stdout().flush()?;

        let mut response = String::new();
        io::stdin().read_line(&mut response)?;
        if response.trim().to_lowercase() != "yes" {
            println!("   Cleanup cancelled");
            return Ok(());
        }
    }

    let report = service.apply_retention(now).await;
    for location in &report.locations {
        for failure in &location.failures {
            println!("   {} {} - {}", "✗".bright_red(), failure.item, failure.error);
        }
    }

    if report.failure_count() == 0 {
        println!("   {} Deleted {} backup(s)", "✓".bright_green(), report.deleted_count());
    } else {
        println!(
            "   Deleted {} backup(s), {} failure(s)",
            report.deleted_count(),
            report.failure_count()
        );
    }
    Ok(())
}
