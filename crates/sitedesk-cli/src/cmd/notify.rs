use crate::output::{print_fields, print_json};
use chrono::Utc;
use clap::Subcommand;
use sitedesk_core::fanout;
use std::path::Path;

#[derive(Subcommand, Debug)]
pub enum NotifySubcommand {
    /// Notify stakeholders about approaching and missed deadlines
    Deadlines {
        /// Days ahead to look (default: notifications.deadline_window_days)
        #[arg(long)]
        window: Option<i64>,
    },
}

pub fn run(root: &Path, subcommand: NotifySubcommand, json: bool) -> anyhow::Result<()> {
    match subcommand {
        NotifySubcommand::Deadlines { window } => deadlines(root, window, json),
    }
}

fn deadlines(root: &Path, window: Option<i64>, json: bool) -> anyhow::Result<()> {
    let (config, mut store) = super::open(root)?;
    let window = window.unwrap_or(config.notifications.deadline_window_days);
    if window < 0 {
        anyhow::bail!("--window must not be negative");
    }

    let now = Utc::now();
    let tx = store.transaction()?;
    let report = fanout::sweep_deadlines(&tx, window, now.date_naive(), now)?;
    tx.commit()?;

    if json {
        return print_json(&report);
    }
    print_fields(&[
        ("projects due", report.projects.to_string()),
        ("tenders due", report.tenders.to_string()),
        ("overdue tasks", report.overdue_tasks.to_string()),
        ("tasks due today", report.due_today_tasks.to_string()),
        ("notifications", report.notifications.to_string()),
    ]);
    Ok(())
}
