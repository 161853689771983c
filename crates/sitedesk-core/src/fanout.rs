//! Notification fan-out.
//!
//! Each domain event resolves its stakeholders (tender, project or task),
//! renders one template and writes a notification per recipient. Templates
//! authored by a user skip that user where noted; system templates reach
//! everyone. Every function returns the number of notifications written.

use crate::config::NotificationConfig;
use crate::error::{Result, SiteError, Violations};
use crate::notification::{self, NewNotification};
use crate::project::{self, Project};
use crate::task::Task;
use crate::tender::{self, Tender};
use crate::types::{
    humanize, pluralize_days, NotificationType, Priority, ProjectPriority, ProjectStatus,
    TaskPriority, TaskStatus, TenderStatus,
};
use crate::user::{self, User};
use chrono::{DateTime, Days, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;

const SYSTEM: &str = "System";

fn long_date(d: NaiveDate) -> String {
    d.format("%B %d, %Y").to_string()
}

fn long_date_opt(d: Option<NaiveDate>) -> String {
    d.map(long_date).unwrap_or_default()
}

/// `40` stays `40`, `42.5` stays `42.5`.
fn pct(v: f64) -> String {
    format!("{}", (v * 100.0).round() / 100.0)
}

fn dedupe(users: Vec<User>) -> Vec<User> {
    let mut seen = HashSet::new();
    users.into_iter().filter(|u| seen.insert(u.id)).collect()
}

fn push_user(conn: &Connection, out: &mut Vec<User>, id: Option<i64>) -> Result<()> {
    if let Some(id) = id {
        match user::get(conn, id) {
            Ok(u) => out.push(u),
            Err(SiteError::NotFound { .. }) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// The user account sharing an e-mail with a directory row.
fn linked_account(conn: &Connection, table: &str, id: Option<i64>) -> Result<Option<User>> {
    let Some(id) = id else {
        return Ok(None);
    };
    let email: Option<String> = conn
        .query_row(&format!("SELECT email FROM {table} WHERE id = ?1"), [id], |row| {
            row.get(0)
        })
        .optional()?;
    match email {
        Some(email) => user::find_by_email(conn, &email),
        None => Ok(None),
    }
}

pub fn tender_stakeholders(conn: &Connection, tender: &Tender) -> Result<Vec<User>> {
    let mut users = Vec::new();
    push_user(conn, &mut users, tender.user_id)?;
    push_user(conn, &mut users, tender.project_manager_id)?;
    users.extend(user::admins(conn)?);
    Ok(dedupe(users))
}

pub fn project_stakeholders(conn: &Connection, project: &Project) -> Result<Vec<User>> {
    let mut users = Vec::new();
    push_user(conn, &mut users, Some(project.project_manager_id))?;
    users.extend(linked_account(conn, "supervisors", Some(project.supervisor_id))?);
    users.extend(linked_account(conn, "site_managers", project.site_manager_id)?);
    users.extend(user::admins(conn)?);
    Ok(dedupe(users))
}

pub fn task_stakeholders(conn: &Connection, task: &Task) -> Result<Vec<User>> {
    let mut users = user::list_by_ids(conn, &task.assignee_ids)?;
    users.extend(user::list_by_ids(conn, &task.watcher_ids)?);
    push_user(conn, &mut users, Some(task.project_manager_id))?;
    if let Some(pid) = task.project_id {
        match project::get(conn, pid) {
            Ok(p) => {
                push_user(conn, &mut users, Some(p.project_manager_id))?;
                users.extend(linked_account(conn, "supervisors", Some(p.supervisor_id))?);
            }
            Err(SiteError::NotFound { .. }) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(dedupe(users))
}

/// Write one notification per recipient, skipping `skip` when set.
fn deliver<F>(
    conn: &Connection,
    recipients: &[User],
    skip: Option<i64>,
    now: DateTime<Utc>,
    build: F,
) -> Result<usize>
where
    F: Fn(&User) -> NewNotification,
{
    let mut sent = 0;
    for user in recipients.iter().filter(|u| Some(u.id) != skip) {
        notification::create(conn, user.id, &build(user), now)?;
        sent += 1;
    }
    Ok(sent)
}

fn from_actor(mut n: NewNotification, actor: &User) -> NewNotification {
    n.sender_id = Some(actor.id);
    n
}

fn from_system(mut n: NewNotification, name: &str) -> NewNotification {
    n.sender_name = Some(name.to_string());
    n
}

// ---------------------------------------------------------------------------
// Tenders
// ---------------------------------------------------------------------------

fn tender_base(tender: &Tender, title: &str, message: String) -> NewNotification {
    let mut n = NewNotification::new(title, message);
    n.category = "tender".into();
    n.tender_id = Some(tender.id);
    n.project_id = tender.project_id;
    n
}

pub fn tender_created(
    conn: &Connection,
    tender: &Tender,
    actor: &User,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Result<usize> {
    let soon = today + Days::new(tender::URGENT_DAYS as u64);
    let priority = if tender.deadline <= soon
        || matches!(tender.priority, ProjectPriority::High | ProjectPriority::Critical)
    {
        Priority::High
    } else {
        Priority::Medium
    };
    let message = format!(
        "{} has been created by {}. Deadline: {}",
        tender.title,
        actor.display_name(),
        long_date(tender.deadline)
    );
    let recipients = tender_stakeholders(conn, tender)?;
    deliver(conn, &recipients, Some(actor.id), now, |u| {
        let mut n = from_actor(tender_base(tender, "New Tender Created", message.clone()), actor);
        n.priority = priority;
        n.action_required = u.is_admin() || u.is_project_manager();
        n.metadata = json!({
            "tender_id": tender.id,
            "deadline": tender.deadline,
            "budget_estimate": tender.budget_estimate,
            "category": tender.category,
        });
        n
    })
}

pub fn tender_updated(conn: &Connection, tender: &Tender, actor: &User, now: DateTime<Utc>) -> Result<usize> {
    let message = format!("{} has been updated by {}", tender.title, actor.display_name());
    let recipients = tender_stakeholders(conn, tender)?;
    deliver(conn, &recipients, Some(actor.id), now, |_| {
        let mut n = from_actor(tender_base(tender, "Tender Updated", message.clone()), actor);
        n.metadata = json!({"tender_id": tender.id, "updated_at": now});
        n
    })
}

pub fn tender_status_type(status: TenderStatus) -> NotificationType {
    match status {
        TenderStatus::Approved | TenderStatus::Won => NotificationType::Success,
        TenderStatus::Rejected | TenderStatus::Lost => NotificationType::Warning,
        _ => NotificationType::Info,
    }
}

/// Reaches the actor too.
pub fn tender_status_changed(
    conn: &Connection,
    tender: &Tender,
    old: TenderStatus,
    new: TenderStatus,
    actor: &User,
    now: DateTime<Utc>,
) -> Result<usize> {
    let message = format!(
        "{} status changed from {} to {}",
        tender.title,
        humanize(old.as_str()),
        humanize(new.as_str())
    );
    let recipients = tender_stakeholders(conn, tender)?;
    deliver(conn, &recipients, None, now, |_| {
        let mut n = from_actor(tender_base(tender, "Tender Status Changed", message.clone()), actor);
        n.notification_type = tender_status_type(new);
        n.action_required = matches!(new, TenderStatus::PendingReview | TenderStatus::RequiresAction);
        n.metadata = json!({
            "tender_id": tender.id,
            "old_status": old,
            "new_status": new,
            "changed_by": actor.display_name(),
        });
        n
    })
}

fn deadline_type(days_left: i64) -> NotificationType {
    if days_left <= 1 {
        NotificationType::Urgent
    } else {
        NotificationType::Warning
    }
}

pub fn tender_deadline_approaching(
    conn: &Connection,
    tender: &Tender,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Result<usize> {
    let days_left = (tender.deadline - today).num_days();
    let message = format!(
        "{} deadline is in {} ({})",
        tender.title,
        pluralize_days(days_left),
        long_date(tender.deadline)
    );
    let recipients = tender_stakeholders(conn, tender)?;
    deliver(conn, &recipients, None, now, |_| {
        let mut n = from_system(
            tender_base(tender, "Tender Deadline Approaching", message.clone()),
            SYSTEM,
        );
        n.notification_type = deadline_type(days_left);
        n.category = "deadline".into();
        n.priority = Priority::High;
        n.action_required = true;
        n.metadata = json!({
            "tender_id": tender.id,
            "deadline": tender.deadline,
            "days_left": days_left,
        });
        n
    })
}

/// Reaches the tender's and the new project's stakeholders once each.
pub fn tender_converted(
    conn: &Connection,
    tender: &Tender,
    project: &Project,
    actor: &User,
    now: DateTime<Utc>,
) -> Result<usize> {
    let mut recipients = tender_stakeholders(conn, tender)?;
    recipients.extend(project_stakeholders(conn, project)?);
    let recipients = dedupe(recipients);
    let message = format!(
        "{} has been successfully converted to project: {}",
        tender.title, project.title
    );
    deliver(conn, &recipients, None, now, |_| {
        let mut n = from_actor(
            tender_base(tender, "Tender Converted to Project", message.clone()),
            actor,
        );
        n.notification_type = NotificationType::Success;
        n.category = "project".into();
        n.project_id = Some(project.id);
        n.metadata = json!({
            "tender_id": tender.id,
            "project_id": project.id,
            "converted_by": actor.display_name(),
        });
        n
    })
}

// ---------------------------------------------------------------------------
// Projects
// ---------------------------------------------------------------------------

fn project_base(project: &Project, title: &str, message: String) -> NewNotification {
    let mut n = NewNotification::new(title, message);
    n.category = "project".into();
    n.project_id = Some(project.id);
    n
}

pub fn project_created(conn: &Connection, project: &Project, actor: &User, now: DateTime<Utc>) -> Result<usize> {
    let message = format!(
        "{} has been created. Start date: {}",
        project.title,
        long_date_opt(project.start_date)
    );
    let priority = match project.priority {
        ProjectPriority::High | ProjectPriority::Critical => Priority::High,
        _ => Priority::Medium,
    };
    let recipients = project_stakeholders(conn, project)?;
    deliver(conn, &recipients, Some(actor.id), now, |u| {
        let mut n = from_actor(project_base(project, "New Project Created", message.clone()), actor);
        n.priority = priority;
        n.action_required = u.id == project.project_manager_id;
        n.metadata = json!({
            "project_id": project.id,
            "start_date": project.start_date,
            "budget": project.budget,
            "priority": project.priority,
        });
        n
    })
}

pub fn project_status_type(status: ProjectStatus) -> NotificationType {
    match status {
        ProjectStatus::Completed => NotificationType::Success,
        ProjectStatus::OnHold | ProjectStatus::Cancelled => NotificationType::Warning,
        ProjectStatus::AtRisk => NotificationType::Urgent,
        _ => NotificationType::Info,
    }
}

pub fn project_status_changed(
    conn: &Connection,
    project: &Project,
    old: ProjectStatus,
    new: ProjectStatus,
    actor: &User,
    now: DateTime<Utc>,
) -> Result<usize> {
    let message = format!(
        "{} status changed from {} to {}",
        project.title,
        humanize(old.as_str()),
        humanize(new.as_str())
    );
    let ty = project_status_type(new);
    let recipients = project_stakeholders(conn, project)?;
    deliver(conn, &recipients, None, now, |_| {
        let mut n = from_actor(project_base(project, "Project Status Changed", message.clone()), actor);
        n.notification_type = ty;
        n.priority = if ty == NotificationType::Urgent {
            Priority::High
        } else {
            Priority::Medium
        };
        n.action_required = matches!(new, ProjectStatus::OnHold | ProjectStatus::AtRisk);
        n.metadata = json!({"project_id": project.id, "old_status": old, "new_status": new});
        n
    })
}

/// Moves smaller than `threshold` points notify nobody.
pub fn project_progress_updated(
    conn: &Connection,
    project: &Project,
    old: f64,
    new: f64,
    actor: &User,
    threshold: f64,
    now: DateTime<Utc>,
) -> Result<usize> {
    let diff = new - old;
    if diff.abs() < threshold {
        return Ok(0);
    }
    let rounded = (diff * 10.0).round() / 10.0;
    let sign = if diff > 0.0 { "+" } else { "" };
    let message = format!(
        "{} progress updated from {}% to {}% ({sign}{}%)",
        project.title,
        pct(old),
        pct(new),
        rounded
    );
    let recipients = project_stakeholders(conn, project)?;
    deliver(conn, &recipients, Some(actor.id), now, |_| {
        let mut n = from_actor(project_base(project, "Project Progress Updated", message.clone()), actor);
        n.notification_type = if diff > 0.0 {
            NotificationType::Success
        } else {
            NotificationType::Warning
        };
        n.metadata = json!({
            "project_id": project.id,
            "old_progress": old,
            "new_progress": new,
            "progress_diff": diff,
        });
        n
    })
}

pub fn project_milestone_reached(
    conn: &Connection,
    project: &Project,
    milestone: &str,
    actor: &User,
    now: DateTime<Utc>,
) -> Result<usize> {
    let message = format!("{} has reached milestone: {milestone}", project.title);
    let recipients = project_stakeholders(conn, project)?;
    deliver(conn, &recipients, None, now, |_| {
        let mut n = from_actor(project_base(project, "Project Milestone Reached", message.clone()), actor);
        n.notification_type = NotificationType::Success;
        n.metadata = json!({
            "project_id": project.id,
            "milestone_name": milestone,
            "achieved_by": actor.display_name(),
        });
        n
    })
}

pub fn project_budget_alert(
    conn: &Connection,
    project: &Project,
    utilization: f64,
    now: DateTime<Utc>,
) -> Result<usize> {
    let message = format!(
        "{} is at {}% budget utilization. Review recommended.",
        project.title,
        pct(utilization)
    );
    let recipients = project_stakeholders(conn, project)?;
    deliver(conn, &recipients, None, now, |_| {
        let mut n = from_system(
            project_base(project, "Project Budget Alert", message.clone()),
            "Finance System",
        );
        n.notification_type = if utilization >= 90.0 {
            NotificationType::Urgent
        } else {
            NotificationType::Warning
        };
        n.category = "budget".into();
        n.priority = Priority::High;
        n.action_required = true;
        n.metadata = json!({
            "project_id": project.id,
            "utilization_percentage": utilization,
            "budget": project.budget,
        });
        n
    })
}

pub fn project_deadline_approaching(
    conn: &Connection,
    project: &Project,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Result<usize> {
    let days_left = (project.finishing_date - today).num_days();
    let message = format!(
        "{} deadline is in {} ({})",
        project.title,
        pluralize_days(days_left),
        long_date(project.finishing_date)
    );
    let recipients = project_stakeholders(conn, project)?;
    deliver(conn, &recipients, None, now, |_| {
        let mut n = from_system(
            project_base(project, "Project Deadline Approaching", message.clone()),
            SYSTEM,
        );
        n.notification_type = deadline_type(days_left);
        n.category = "deadline".into();
        n.priority = Priority::High;
        n.action_required = true;
        n.metadata = json!({
            "project_id": project.id,
            "deadline": project.finishing_date,
            "days_left": days_left,
        });
        n
    })
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

fn task_base(task: &Task, title: &str, message: String) -> NewNotification {
    let mut n = NewNotification::new(title, message);
    n.category = "task".into();
    n.task_id = Some(task.id);
    n.project_id = task.project_id;
    n
}

pub fn task_created(conn: &Connection, task: &Task, actor: &User, now: DateTime<Utc>) -> Result<usize> {
    let message = format!(
        "{} has been created. Due: {}",
        task.title,
        long_date_opt(task.due_date)
    );
    let recipients = task_stakeholders(conn, task)?;
    deliver(conn, &recipients, Some(actor.id), now, |u| {
        let mut n = from_actor(task_base(task, "New Task Created", message.clone()), actor);
        n.priority = task.priority.notification_priority();
        n.action_required = task.assignee_ids.contains(&u.id);
        n.metadata = json!({
            "task_id": task.id,
            "due_date": task.due_date,
            "priority": task.priority,
            "estimated_hours": task.estimated_hours,
        });
        n
    })
}

pub fn task_assigned(
    conn: &Connection,
    task: &Task,
    assignee_ids: &[i64],
    actor: &User,
    now: DateTime<Utc>,
) -> Result<usize> {
    let message = format!(
        "You have been assigned to task: {}. Due: {}",
        task.title,
        long_date_opt(task.due_date)
    );
    let recipients = dedupe(user::list_by_ids(conn, assignee_ids)?);
    deliver(conn, &recipients, Some(actor.id), now, |_| {
        let mut n = from_actor(task_base(task, "Task Assigned to You", message.clone()), actor);
        n.notification_type = if task.priority == TaskPriority::Urgent {
            NotificationType::Urgent
        } else {
            NotificationType::Info
        };
        n.priority = task.priority.notification_priority();
        n.action_required = true;
        n.metadata = json!({
            "task_id": task.id,
            "assigned_by": actor.display_name(),
            "due_date": task.due_date,
        });
        n
    })
}

pub fn task_status_changed(
    conn: &Connection,
    task: &Task,
    old: TaskStatus,
    new: TaskStatus,
    actor: &User,
    now: DateTime<Utc>,
) -> Result<usize> {
    let message = format!(
        "{} status changed from {} to {}",
        task.title,
        humanize(old.as_str()),
        humanize(new.as_str())
    );
    let recipients = task_stakeholders(conn, task)?;
    deliver(conn, &recipients, Some(actor.id), now, |_| {
        let mut n = from_actor(task_base(task, "Task Status Changed", message.clone()), actor);
        n.notification_type = match new {
            TaskStatus::Completed => NotificationType::Success,
            TaskStatus::Cancelled | TaskStatus::OnHold => NotificationType::Warning,
            _ => NotificationType::Info,
        };
        n.metadata = json!({"task_id": task.id, "old_status": old, "new_status": new});
        n
    })
}

pub fn task_overdue(conn: &Connection, task: &Task, today: NaiveDate, now: DateTime<Utc>) -> Result<usize> {
    let Some(due) = task.due_date else {
        return Err(SiteError::invalid("Task has no due date"));
    };
    let days_overdue = (today - due).num_days();
    let message = format!(
        "{} is {} overdue. Immediate attention required.",
        task.title,
        pluralize_days(days_overdue)
    );
    let recipients = task_stakeholders(conn, task)?;
    deliver(conn, &recipients, None, now, |_| {
        let mut n = from_system(task_base(task, "Task Overdue", message.clone()), SYSTEM);
        n.notification_type = NotificationType::Urgent;
        n.category = "deadline".into();
        n.priority = Priority::High;
        n.action_required = true;
        n.metadata = json!({
            "task_id": task.id,
            "due_date": due,
            "days_overdue": days_overdue,
        });
        n
    })
}

pub fn task_completed(conn: &Connection, task: &Task, actor: &User, now: DateTime<Utc>) -> Result<usize> {
    let message = format!(
        "{} has been marked as completed by {}",
        task.title,
        actor.display_name()
    );
    let recipients = task_stakeholders(conn, task)?;
    deliver(conn, &recipients, Some(actor.id), now, |_| {
        let mut n = from_actor(task_base(task, "Task Completed", message.clone()), actor);
        n.notification_type = NotificationType::Success;
        n.priority = Priority::Low;
        n.metadata = json!({
            "task_id": task.id,
            "completed_by": actor.display_name(),
            "completed_at": now,
        });
        n
    })
}

pub fn task_due_today(conn: &Connection, task: &Task, now: DateTime<Utc>) -> Result<usize> {
    let message = format!("{} is due today. Please ensure completion.", task.title);
    let recipients = task_stakeholders(conn, task)?;
    deliver(conn, &recipients, None, now, |u| {
        let mut n = from_system(task_base(task, "Task Due Today", message.clone()), SYSTEM);
        n.notification_type = NotificationType::Warning;
        n.category = "deadline".into();
        n.priority = Priority::High;
        n.action_required = task.assignee_ids.contains(&u.id);
        n.metadata = json!({"task_id": task.id, "due_date": task.due_date});
        n
    })
}

// ---------------------------------------------------------------------------
// Explicit triggers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "activity", rename_all = "snake_case")]
pub enum TenderActivity {
    Created,
    Updated,
    StatusChanged {
        old_status: TenderStatus,
        new_status: TenderStatus,
    },
    DeadlineApproaching,
    Converted {
        project_id: i64,
    },
}

pub fn trigger_tender(
    conn: &Connection,
    tender_id: i64,
    activity: &TenderActivity,
    actor: &User,
    now: DateTime<Utc>,
) -> Result<usize> {
    let tender = tender::get(conn, tender_id)?;
    let today = now.date_naive();
    match activity {
        TenderActivity::Created => tender_created(conn, &tender, actor, today, now),
        TenderActivity::Updated => tender_updated(conn, &tender, actor, now),
        TenderActivity::StatusChanged {
            old_status,
            new_status,
        } => tender_status_changed(conn, &tender, *old_status, *new_status, actor, now),
        TenderActivity::DeadlineApproaching => tender_deadline_approaching(conn, &tender, today, now),
        TenderActivity::Converted { project_id } => {
            let project = project::get(conn, *project_id)?;
            tender_converted(conn, &tender, &project, actor, now)
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "activity", rename_all = "snake_case")]
pub enum ProjectActivity {
    Created,
    StatusChanged {
        old_status: ProjectStatus,
        new_status: ProjectStatus,
    },
    ProgressUpdated {
        old_progress: f64,
        new_progress: f64,
    },
    MilestoneReached {
        milestone_name: String,
    },
    BudgetAlert {
        utilization_percentage: f64,
    },
    DeadlineApproaching,
}

pub fn trigger_project(
    conn: &Connection,
    project_id: i64,
    activity: &ProjectActivity,
    actor: &User,
    config: &NotificationConfig,
    now: DateTime<Utc>,
) -> Result<usize> {
    let project = project::get(conn, project_id)?;
    match activity {
        ProjectActivity::Created => project_created(conn, &project, actor, now),
        ProjectActivity::StatusChanged {
            old_status,
            new_status,
        } => project_status_changed(conn, &project, *old_status, *new_status, actor, now),
        ProjectActivity::ProgressUpdated {
            old_progress,
            new_progress,
        } => project_progress_updated(
            conn,
            &project,
            *old_progress,
            *new_progress,
            actor,
            config.progress_threshold,
            now,
        ),
        ProjectActivity::MilestoneReached { milestone_name } => {
            project_milestone_reached(conn, &project, milestone_name, actor, now)
        }
        ProjectActivity::BudgetAlert {
            utilization_percentage,
        } => project_budget_alert(conn, &project, *utilization_percentage, now),
        ProjectActivity::DeadlineApproaching => {
            project_deadline_approaching(conn, &project, now.date_naive(), now)
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "activity", rename_all = "snake_case")]
pub enum TaskActivity {
    Created,
    Assigned {
        assignee_ids: Vec<i64>,
    },
    StatusChanged {
        old_status: TaskStatus,
        new_status: TaskStatus,
    },
    Overdue,
    Completed,
    DueToday,
}

pub fn trigger_task(
    conn: &Connection,
    task_id: i64,
    activity: &TaskActivity,
    actor: &User,
    now: DateTime<Utc>,
) -> Result<usize> {
    let task = crate::task::get(conn, task_id)?;
    match activity {
        TaskActivity::Created => task_created(conn, &task, actor, now),
        TaskActivity::Assigned { assignee_ids } => task_assigned(conn, &task, assignee_ids, actor, now),
        TaskActivity::StatusChanged {
            old_status,
            new_status,
        } => task_status_changed(conn, &task, *old_status, *new_status, actor, now),
        TaskActivity::Overdue => task_overdue(conn, &task, now.date_naive(), now),
        TaskActivity::Completed => task_completed(conn, &task, actor, now),
        TaskActivity::DueToday => task_due_today(conn, &task, now),
    }
}

// ---------------------------------------------------------------------------
// System broadcast
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Broadcast {
    pub title: Option<String>,
    pub message: Option<String>,
    #[serde(rename = "type")]
    pub notification_type: Option<NotificationType>,
    pub category: Option<String>,
    pub priority: Option<Priority>,
    pub action_required: Option<bool>,
    /// Every user when absent.
    pub user_ids: Option<Vec<i64>>,
    pub metadata: Option<Value>,
}

pub fn broadcast(conn: &Connection, b: &Broadcast, now: DateTime<Utc>) -> Result<usize> {
    let mut v = Violations::new();
    v.present("Title", b.title.as_deref());
    v.present("Message", b.message.as_deref());
    v.into_result()?;

    let recipients = match &b.user_ids {
        Some(ids) => dedupe(user::list_by_ids(conn, ids)?),
        None => user::list(conn)?,
    };
    let title = b.title.clone().unwrap_or_default();
    let message = b.message.clone().unwrap_or_default();
    deliver(conn, &recipients, None, now, |_| {
        let mut n = from_system(
            NewNotification::new(title.clone(), message.clone()),
            "System Administrator",
        );
        n.notification_type = b.notification_type.unwrap_or(NotificationType::Info);
        if let Some(category) = b.category.as_deref().filter(|c| !c.is_empty()) {
            n.category = category.to_string();
        }
        n.priority = b.priority.unwrap_or(Priority::Medium);
        n.action_required = b.action_required.unwrap_or(false);
        n.metadata = b.metadata.clone().unwrap_or_else(|| json!({}));
        n
    })
}

// ---------------------------------------------------------------------------
// Deadline sweep
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SweepReport {
    pub projects: usize,
    pub tenders: usize,
    pub overdue_tasks: usize,
    pub due_today_tasks: usize,
    pub notifications: usize,
}

/// Whether `title` already went out for this entity today.
fn sent_today(conn: &Connection, title: &str, column: &str, id: i64, today: NaiveDate) -> Result<bool> {
    let n: i64 = conn.query_row(
        &format!(
            "SELECT COUNT(*) FROM notifications WHERE title = ?1 AND {column} = ?2 AND created_at >= ?3"
        ),
        params![title, id, today],
        |row| row.get(0),
    )?;
    Ok(n > 0)
}

/// Deadline notifications for projects and tenders due within
/// `window_days`, overdue tasks and tasks due today. Entities already
/// notified today are skipped, so the sweep can run repeatedly. A negative
/// window, or one reaching past the calendar's range, is rejected.
pub fn sweep_deadlines(
    conn: &Connection,
    window_days: i64,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Result<SweepReport> {
    let until = u64::try_from(window_days)
        .ok()
        .and_then(|days| today.checked_add_days(Days::new(days)))
        .ok_or_else(|| SiteError::InvalidValue {
            kind: "deadline window",
            value: window_days.to_string(),
        })?;
    let mut report = SweepReport::default();

    for p in project::due_between(conn, today, until)? {
        if p.status == ProjectStatus::Cancelled
            || sent_today(conn, "Project Deadline Approaching", "project_id", p.id, today)?
        {
            continue;
        }
        report.notifications += project_deadline_approaching(conn, &p, today, now)?;
        report.projects += 1;
    }

    let open = tender::list(conn, tender::Scope::Active(today), &Default::default())?;
    for t in open.iter().filter(|t| t.deadline <= until) {
        let closed = matches!(
            t.status,
            TenderStatus::Converted | TenderStatus::Won | TenderStatus::Lost | TenderStatus::Rejected
        );
        if closed || sent_today(conn, "Tender Deadline Approaching", "tender_id", t.id, today)? {
            continue;
        }
        report.notifications += tender_deadline_approaching(conn, t, today, now)?;
        report.tenders += 1;
    }

    for t in crate::task::overdue(conn, today)? {
        if sent_today(conn, "Task Overdue", "task_id", t.id, today)? {
            continue;
        }
        report.notifications += task_overdue(conn, &t, today, now)?;
        report.overdue_tasks += 1;
    }

    for t in crate::task::due_on(conn, today)? {
        if sent_today(conn, "Task Due Today", "task_id", t.id, today)? {
            continue;
        }
        report.notifications += task_due_today(conn, &t, now)?;
        report.due_today_tasks += 1;
    }

    tracing::info!(
        projects = report.projects,
        tenders = report.tenders,
        overdue_tasks = report.overdue_tasks,
        due_today_tasks = report.due_today_tasks,
        notifications = report.notifications,
        "deadline sweep finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Store;
    use crate::notification::InboxFilter;
    use crate::testutil;
    use crate::types::Role;

    struct World {
        store: Store,
        admin: User,
        pm: User,
        sup_account: User,
        project: Project,
    }

    fn world() -> World {
        let store = Store::open_in_memory().unwrap();
        let now = Utc::now();
        let conn = store.conn();
        let admin = testutil::user(conn, "admin@site.io", Role::Admin);
        let pm = testutil::user(conn, "pm@site.io", Role::ProjectManager);
        let sup_account = testutil::user(conn, "sup@site.io", Role::Supervisor);
        let sup = testutil::supervisor(conn, "SUP@site.io");
        let project = testutil::project(conn, pm, sup, now);
        World {
            admin: user::get(conn, admin).unwrap(),
            pm: user::get(conn, pm).unwrap(),
            sup_account: user::get(conn, sup_account).unwrap(),
            project: project::get(conn, project).unwrap(),
            store,
        }
    }

    fn inbox(conn: &Connection, user: &User) -> Vec<notification::Notification> {
        notification::list(conn, user.id, &InboxFilter::default())
            .unwrap()
            .notifications
    }

    #[test]
    fn project_stakeholders_follow_email_links_and_dedupe() {
        let w = world();
        let conn = w.store.conn();
        let ids: Vec<i64> = project_stakeholders(conn, &w.project)
            .unwrap()
            .iter()
            .map(|u| u.id)
            .collect();
        assert_eq!(ids, vec![w.pm.id, w.sup_account.id, w.admin.id]);
    }

    #[test]
    fn progress_update_skips_actor_and_small_moves() {
        let w = world();
        let conn = w.store.conn();
        let now = Utc::now();
        assert_eq!(
            project_progress_updated(conn, &w.project, 10.0, 12.0, &w.pm, 5.0, now).unwrap(),
            0
        );
        let sent = project_progress_updated(conn, &w.project, 10.0, 42.5, &w.pm, 5.0, now).unwrap();
        assert_eq!(sent, 2);
        assert!(inbox(conn, &w.pm).is_empty());
        let got = &inbox(conn, &w.admin)[0];
        assert_eq!(
            got.message,
            "Riverside Depot progress updated from 10% to 42.5% (+32.5%)"
        );
        assert_eq!(got.notification_type, NotificationType::Success);
        assert_eq!(got.project.as_deref(), Some("Riverside Depot"));
        assert_eq!(got.sender.as_deref(), Some("Test User"));

        project_progress_updated(conn, &w.project, 50.0, 40.0, &w.pm, 5.0, now).unwrap();
        let got = &inbox(conn, &w.admin)[0];
        assert!(got.message.ends_with("(-10%)"));
        assert_eq!(got.notification_type, NotificationType::Warning);
    }

    #[test]
    fn tender_status_change_reaches_actor_with_mapped_type() {
        let w = world();
        let conn = w.store.conn();
        let now = Utc::now();
        let today = now.date_naive();
        let t = crate::tender::create(
            conn,
            &w.pm,
            &crate::tender::TenderInput {
                title: Some("Bridge works".into()),
                description: Some("Deck repair".into()),
                deadline: Some(today + Days::new(2)),
                responsible: Some("Ana".into()),
                ..Default::default()
            },
            today,
            now,
        )
        .unwrap();
        assert_eq!(tender_created(conn, &t, &w.pm, today, now).unwrap(), 1);
        let created = &inbox(conn, &w.admin)[0];
        assert_eq!(created.priority, Priority::High);
        assert!(created.action_required);

        let sent = tender_status_changed(
            conn,
            &t,
            TenderStatus::Draft,
            TenderStatus::Won,
            &w.pm,
            now,
        )
        .unwrap();
        assert_eq!(sent, 2);
        let mine = &inbox(conn, &w.pm)[0];
        assert_eq!(mine.message, "Bridge works status changed from Draft to Won");
        assert_eq!(mine.notification_type, NotificationType::Success);
    }

    #[test]
    fn task_templates_use_stakeholders() {
        let w = world();
        let conn = w.store.conn();
        let now = Utc::now();
        let worker = testutil::user(conn, "worker@site.io", Role::SiteManager);
        let input = crate::task::TaskInput {
            title: Some("Pour slab".into()),
            project_id: Some(w.project.id),
            due_date: Some(now.date_naive() - Days::new(2)),
            assignee_ids: Some(vec![worker]),
            ..Default::default()
        };
        let task = crate::task::create(conn, &w.pm, &input, now).unwrap();
        let ids: Vec<i64> = task_stakeholders(conn, &task).unwrap().iter().map(|u| u.id).collect();
        assert_eq!(ids, vec![worker, w.pm.id, w.sup_account.id]);

        assert_eq!(task_assigned(conn, &task, &[worker, w.pm.id], &w.pm, now).unwrap(), 1);
        assert_eq!(task_overdue(conn, &task, now.date_naive(), now).unwrap(), 3);
        let overdue = &inbox(conn, &w.pm)[0];
        assert_eq!(
            overdue.message,
            "Pour slab is 2 days overdue. Immediate attention required."
        );
        assert_eq!(overdue.sender.as_deref(), Some("System"));
    }

    #[test]
    fn sweep_runs_once_per_day() {
        let w = world();
        let conn = w.store.conn();
        let now = Utc::now();
        let today = now.date_naive();
        conn.execute(
            "UPDATE projects SET finishing_date = ?1 WHERE id = ?2",
            params![today + Days::new(1), w.project.id],
        )
        .unwrap();
        testutil::task(conn, w.pm.id, Some(w.project.id), "Inspect rebar");
        conn.execute("UPDATE tasks SET due_date = ?1", [today]).unwrap();

        let first = sweep_deadlines(conn, 3, today, now).unwrap();
        assert_eq!(first.projects, 1);
        assert_eq!(first.due_today_tasks, 1);
        assert!(first.notifications >= 4);
        let message = &inbox(conn, &w.admin)
            .into_iter()
            .find(|n| n.title == "Project Deadline Approaching")
            .unwrap()
            .message;
        assert!(message.contains("deadline is in 1 day ("));

        let second = sweep_deadlines(conn, 3, today, now).unwrap();
        assert_eq!(second, SweepReport::default());
    }

    #[test]
    fn sweep_rejects_unusable_windows() {
        let w = world();
        let conn = w.store.conn();
        let now = Utc::now();
        let today = now.date_naive();
        for window in [-1, i64::MAX] {
            let err = sweep_deadlines(conn, window, today, now).unwrap_err();
            assert!(matches!(err, SiteError::InvalidValue { .. }), "window {window}");
        }
        assert_eq!(sweep_deadlines(conn, 0, today, now).unwrap().projects, 0);
    }

    #[test]
    fn broadcast_requires_title_and_defaults_to_everyone() {
        let w = world();
        let conn = w.store.conn();
        let now = Utc::now();
        assert!(broadcast(conn, &Broadcast::default(), now).is_err());
        let b = Broadcast {
            title: Some("Site closed".into()),
            message: Some("Storm warning".into()),
            ..Default::default()
        };
        assert_eq!(broadcast(conn, &b, now).unwrap(), 3);
        let got = &inbox(conn, &w.sup_account)[0];
        assert_eq!(got.sender.as_deref(), Some("System Administrator"));
        assert_eq!(got.category, "system");
    }
}
