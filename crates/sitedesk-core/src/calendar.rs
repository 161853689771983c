//! Calendar aggregation.
//!
//! Builds one date-sorted list from project starts and deadlines, monthly
//! progress reviews, task starts and due dates, tender deadlines and
//! scheduled events, limited to what the caller can see.

use crate::error::{Result, SiteError};
use crate::project::Project;
use crate::task::Task;
use crate::tender::{self, Tender};
use crate::types::{ProjectStatus, TaskStatus};
use crate::user::User;
use chrono::{Datelike, Months, NaiveDate};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize)]
pub struct CalendarEntry {
    pub id: String,
    pub title: String,
    pub description: String,
    pub date: NaiveDate,
    pub time: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub category: &'static str,
    pub project: String,
    pub project_id: Option<i64>,
    pub location: String,
    pub attendees: Vec<String>,
    pub status: &'static str,
    pub priority: String,
    pub color: &'static str,
}

pub fn first_of_month(d: NaiveDate) -> NaiveDate {
    d.with_day(1).unwrap_or(d)
}

fn next_month(d: NaiveDate) -> NaiveDate {
    first_of_month(d)
        .checked_add_months(Months::new(1))
        .unwrap_or(d)
}

/// First and last day of the month containing `d`.
pub fn month_bounds(d: NaiveDate) -> (NaiveDate, NaiveDate) {
    let first = first_of_month(d);
    let last = next_month(first).pred_opt().unwrap_or(first);
    (first, last)
}

pub fn month_range(year: i32, month: u32) -> Result<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(|| SiteError::InvalidValue {
        kind: "month",
        value: format!("{year}-{month}"),
    })?;
    Ok(month_bounds(first))
}

fn between(d: NaiveDate, from: NaiveDate, to: NaiveDate) -> bool {
    d >= from && d <= to
}

fn banded(days_until: i64, high: i64, medium: i64) -> String {
    let band = if days_until <= high {
        "high"
    } else if days_until <= medium {
        "medium"
    } else {
        "low"
    };
    band.to_string()
}

/// Name lookups shared across entries.
struct Names<'c> {
    conn: &'c Connection,
    users: HashMap<i64, Option<String>>,
    supervisors: HashMap<i64, Option<String>>,
    projects: HashMap<i64, Option<(String, Option<String>, i64)>>,
}

impl<'c> Names<'c> {
    fn new(conn: &'c Connection) -> Self {
        Self {
            conn,
            users: HashMap::new(),
            supervisors: HashMap::new(),
            projects: HashMap::new(),
        }
    }

    fn user(&mut self, id: i64) -> Result<Option<String>> {
        if let Some(name) = self.users.get(&id) {
            return Ok(name.clone());
        }
        let name = self
            .conn
            .query_row("SELECT COALESCE(name, email) FROM users WHERE id = ?1", [id], |row| {
                row.get(0)
            })
            .optional()?;
        self.users.insert(id, name.clone());
        Ok(name)
    }

    fn supervisor(&mut self, id: i64) -> Result<Option<String>> {
        if let Some(name) = self.supervisors.get(&id) {
            return Ok(name.clone());
        }
        let name = self
            .conn
            .query_row("SELECT name FROM supervisors WHERE id = ?1", [id], |row| row.get(0))
            .optional()?;
        self.supervisors.insert(id, name.clone());
        Ok(name)
    }

    /// Title, location and manager of a project.
    fn project(&mut self, id: i64) -> Result<Option<(String, Option<String>, i64)>> {
        if let Some(p) = self.projects.get(&id) {
            return Ok(p.clone());
        }
        let p = self
            .conn
            .query_row(
                "SELECT title, location, project_manager_id FROM projects WHERE id = ?1",
                [id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;
        self.projects.insert(id, p.clone());
        Ok(p)
    }
}

fn project_entries(
    names: &mut Names<'_>,
    project: &Project,
    from: NaiveDate,
    to: NaiveDate,
    today: NaiveDate,
    out: &mut Vec<CalendarEntry>,
) -> Result<()> {
    let location = project
        .location
        .clone()
        .unwrap_or_else(|| "Project Site".into());
    let attendees: Vec<String> = [
        names.user(project.project_manager_id)?,
        names.supervisor(project.supervisor_id)?,
    ]
    .into_iter()
    .flatten()
    .collect();
    let base = |id: String, title: String, description: &str, date, time, kind| CalendarEntry {
        id,
        title,
        description: description.to_string(),
        date,
        time,
        kind,
        category: "project",
        project: project.title.clone(),
        project_id: Some(project.id),
        location: location.clone(),
        attendees: attendees.clone(),
        status: "scheduled",
        priority: project.priority.to_string(),
        color: "",
    };

    if let Some(start) = project.start_date.filter(|d| between(*d, from, to)) {
        out.push(CalendarEntry {
            color: "bg-green-500",
            ..base(
                format!("project_start_{}", project.id),
                format!("{} - Project Start", project.title),
                "Project kickoff and initial setup",
                start,
                "09:00",
                "project_start",
            )
        });
    }

    let finish = project.finishing_date;
    if between(finish, from, to) {
        out.push(CalendarEntry {
            status: if project.status == ProjectStatus::Completed {
                "completed"
            } else {
                "scheduled"
            },
            priority: banded((finish - today).num_days(), 7, 30),
            color: "bg-red-500",
            ..base(
                format!("project_deadline_{}", project.id),
                format!("{} - Deadline", project.title),
                "Project completion deadline",
                finish,
                "17:00",
                "deadline",
            )
        });
    }

    if let Some(start) = project.start_date {
        let horizon = next_month(today);
        let mut review = next_month(start);
        while review <= finish && review <= to {
            if between(review, from, to) && review <= horizon {
                let mut attendees = attendees.clone();
                attendees.push("Stakeholders".into());
                out.push(CalendarEntry {
                    location: "Conference Room".into(),
                    attendees,
                    status: if review < today { "completed" } else { "scheduled" },
                    priority: "medium".into(),
                    color: "bg-purple-500",
                    ..base(
                        format!("project_review_{}_{}", project.id, review.format("%Y%m")),
                        format!("{} - Progress Review", project.title),
                        "Monthly progress review and status update",
                        review,
                        "14:00",
                        "review",
                    )
                });
            }
            review = next_month(review);
        }
    }
    Ok(())
}

fn task_entries(
    names: &mut Names<'_>,
    task: &Task,
    from: NaiveDate,
    to: NaiveDate,
    today: NaiveDate,
    out: &mut Vec<CalendarEntry>,
) -> Result<()> {
    let project = match task.project_id {
        Some(id) => names.project(id)?,
        None => None,
    };
    let project_title = project
        .as_ref()
        .map(|p| p.0.clone())
        .unwrap_or_else(|| "General Tasks".into());
    let attendees: Vec<String> = [
        names.user(task.project_manager_id)?,
        match task.user_id {
            Some(id) => names.user(id)?,
            None => None,
        },
    ]
    .into_iter()
    .flatten()
    .collect();

    if let Some(due) = task.due_date.filter(|d| between(*d, from, to)) {
        out.push(CalendarEntry {
            id: format!("task_due_{}", task.id),
            title: format!("{} - Due", task.title),
            description: task
                .description
                .clone()
                .unwrap_or_else(|| "Task deadline".into()),
            date: due,
            time: "17:00",
            kind: "deadline",
            category: "task",
            project: project_title.clone(),
            project_id: task.project_id,
            location: project
                .as_ref()
                .and_then(|p| p.1.clone())
                .unwrap_or_else(|| "Office".into()),
            attendees: attendees.clone(),
            status: if task.status == TaskStatus::Completed {
                "completed"
            } else {
                "scheduled"
            },
            priority: banded((due - today).num_days(), 1, 7),
            color: "bg-orange-500",
        });
    }

    if let Some(start) = task.start_date.filter(|d| between(*d, from, to)) {
        out.push(CalendarEntry {
            id: format!("task_start_{}", task.id),
            title: format!("{} - Start", task.title),
            description: "Begin working on task".into(),
            date: start,
            time: "09:00",
            kind: "task_start",
            category: "task",
            project: project_title,
            project_id: task.project_id,
            location: "Office".into(),
            attendees,
            status: if task.status == TaskStatus::Pending {
                "scheduled"
            } else {
                "started"
            },
            priority: task.priority.to_string(),
            color: "bg-blue-500",
        });
    }
    Ok(())
}

fn tender_entry(
    names: &mut Names<'_>,
    tender: &Tender,
    today: NaiveDate,
) -> Result<CalendarEntry> {
    let project = match tender.project_id {
        Some(id) => names.project(id)?,
        None => None,
    };
    let mut attendees: Vec<String> = match tender.project_manager_id {
        Some(id) => names.user(id)?.into_iter().collect(),
        None => Vec::new(),
    };
    attendees.extend(tender.lead_person.clone());
    attendees.push(tender.responsible.clone());
    Ok(CalendarEntry {
        id: format!("tender_deadline_{}", tender.id),
        title: format!("{} - Tender Deadline", tender.title),
        description: tender.description.clone(),
        date: tender.deadline,
        time: "23:59",
        kind: "deadline",
        category: "tender",
        project: project.map(|p| p.0).unwrap_or_else(|| "New Project".into()),
        project_id: tender.project_id,
        location: "Online Submission".into(),
        attendees,
        status: "scheduled",
        priority: banded((tender.deadline - today).num_days(), 3, 7),
        color: "bg-yellow-500",
    })
}

/// Everything on `user`'s calendar between `from` and `to` inclusive,
/// ordered by date.
pub fn entries(
    conn: &Connection,
    user: &User,
    from: NaiveDate,
    to: NaiveDate,
    today: NaiveDate,
) -> Result<Vec<CalendarEntry>> {
    if from > to {
        return Err(SiteError::invalid("Start date must be before end date"));
    }
    let mut names = Names::new(conn);
    let mut out = Vec::new();

    for project in crate::project::list_visible(conn, user)? {
        project_entries(&mut names, &project, from, to, today, &mut out)?;
    }
    for task in crate::task::list_for(conn, user)? {
        task_entries(&mut names, &task, from, to, today, &mut out)?;
    }
    let scope = if user.is_admin() {
        tender::Scope::All
    } else {
        tender::Scope::Mine(user.id)
    };
    for t in tender::list(conn, scope, &Default::default())?
        .iter()
        .filter(|t| between(t.deadline, from, to))
    {
        out.push(tender_entry(&mut names, t, today)?);
    }
    for event in crate::event::between(conn, user, from, to)? {
        let project = names.project(event.project_id)?;
        let mut attendees = vec![event.responsible.clone()];
        if let Some((_, _, manager)) = &project {
            attendees.extend(names.user(*manager)?);
        }
        out.push(CalendarEntry {
            id: format!("event_{}", event.id),
            title: event.description.clone(),
            description: event.description.clone(),
            date: event.date,
            time: "10:00",
            kind: "meeting",
            category: "event",
            project: project
                .as_ref()
                .map(|p| p.0.clone())
                .unwrap_or_else(|| "Project Event".into()),
            project_id: Some(event.project_id),
            location: project
                .and_then(|p| p.1)
                .unwrap_or_else(|| "Project Site".into()),
            attendees,
            status: if event.date < today { "completed" } else { "scheduled" },
            priority: "medium".into(),
            color: "bg-indigo-500",
        });
    }

    out.sort_by_key(|e| e.date);
    Ok(out)
}
