use crate::output::{print_fields, print_json, print_table};
use chrono::Utc;
use clap::Subcommand;
use serde_json::json;
use sitedesk_core::{progress, project};
use std::path::Path;

#[derive(Subcommand, Debug)]
pub enum ProjectSubcommand {
    /// List every project with its schedule status
    List,
    /// Show a project's progress against its timeline
    Progress {
        id: i64,
        /// Include the update history
        #[arg(long)]
        history: bool,
    },
}

pub fn run(root: &Path, subcommand: ProjectSubcommand, json: bool) -> anyhow::Result<()> {
    match subcommand {
        ProjectSubcommand::List => list(root, json),
        ProjectSubcommand::Progress { id, history } => show_progress(root, id, history, json),
    }
}

fn pct(v: f64) -> String {
    format!("{:.1}%", v)
}

fn list(root: &Path, json: bool) -> anyhow::Result<()> {
    let (_, store) = super::open(root)?;
    let today = Utc::now().date_naive();
    let projects = project::list_all(store.conn())?;

    if json {
        let items: Vec<_> = projects
            .iter()
            .map(|p| json!({ "id": p.id, "title": p.title, "status": p.status, "progress": p.report(today) }))
            .collect();
        return print_json(&items);
    }
    let rows = projects
        .iter()
        .map(|p| {
            vec![
                p.id.to_string(),
                p.title.clone(),
                p.status.to_string(),
                pct(p.progress_percentage),
                p.schedule_status(today).to_string(),
                p.finishing_date.to_string(),
            ]
        })
        .collect();
    print_table(&["ID", "TITLE", "STATUS", "PROGRESS", "SCHEDULE", "FINISH"], rows);
    Ok(())
}

fn show_progress(root: &Path, id: i64, with_history: bool, json: bool) -> anyhow::Result<()> {
    let (_, store) = super::open(root)?;
    let today = Utc::now().date_naive();
    let found = project::get(store.conn(), id)?;
    let report = found.report(today);
    let history = if with_history {
        progress::history(store.conn(), id)?
    } else {
        Vec::new()
    };

    if json {
        return print_json(&json!({
            "project": report,
            "progress_notes": found.progress_notes,
            "last_progress_update": found.last_progress_update,
            "history": history,
        }));
    }

    println!("{} (#{})", found.title, found.id);
    print_fields(&[
        ("progress", pct(report.current_progress)),
        ("timeline", pct(report.timeline_progress)),
        ("variance", format!("{:+.1}", report.progress_variance)),
        ("schedule", report.schedule_status.to_string()),
        ("days remaining", report.days_remaining.to_string()),
        (
            "est. completion",
            report
                .estimated_completion
                .map_or_else(|| "-".to_string(), |d| d.to_string()),
        ),
    ]);
    if report.progress_variance.abs() > progress::WARNING_THRESHOLD {
        println!("warning: {}", progress::DEVIATION_WARNING);
    }

    if with_history {
        println!();
        let rows = history
            .iter()
            .map(|u| {
                vec![
                    u.created_at.format("%Y-%m-%d %H:%M").to_string(),
                    pct(u.old_progress),
                    pct(u.new_progress),
                    u.update_type.to_string(),
                    u.updated_by.clone().unwrap_or_default(),
                    u.notes.clone().unwrap_or_default(),
                ]
            })
            .collect();
        print_table(&["WHEN", "FROM", "TO", "TYPE", "BY", "NOTES"], rows);
    }
    Ok(())
}
