//! Project-manager dashboard figures.
//!
//! Everything here is scoped to the projects, events and tenders the user
//! manages. Progress comes from the recorded percentage and team size from
//! the people actually attached to each project.

use crate::calendar::month_bounds;
use crate::error::Result;
use crate::event::{self, Event};
use crate::progress::deadline_priority;
use crate::project::{self, Project};
use crate::tender::{self, Tender};
use crate::types::{EventKind, Priority, ProjectStatus, ScheduleStatus, TaskPriority, TaskStatus};
use crate::user::User;
use chrono::{DateTime, Days, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

pub const UPCOMING_EVENTS_LIMIT: usize = 10;
pub const RECENT_TASKS_LIMIT: usize = 10;

#[derive(Debug, Clone, Serialize)]
pub struct ProjectCard {
    pub id: i64,
    pub title: String,
    pub status: ProjectStatus,
    pub location: Option<String>,
    pub finishing_date: NaiveDate,
    pub lead_person: Option<String>,
    pub responsible: Option<String>,
    pub progress: f64,
    /// Deadline urgency: high within a month, medium within three.
    pub priority: Priority,
    pub team_size: usize,
    pub events_count: i64,
    pub upcoming_deadline: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn project_card(conn: &Connection, p: &Project, today: NaiveDate) -> Result<ProjectCard> {
    let events_count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM events WHERE project_id = ?1",
        [p.id],
        |row| row.get(0),
    )?;
    let days_left = (p.finishing_date - today).num_days();
    Ok(ProjectCard {
        id: p.id,
        title: p.title.clone(),
        status: p.status,
        location: p.location.clone(),
        finishing_date: p.finishing_date,
        lead_person: p.lead_person.clone(),
        responsible: p.responsible.clone(),
        progress: p.progress_percentage,
        priority: deadline_priority(days_left),
        team_size: project::team_size(conn, p)?,
        events_count,
        upcoming_deadline: days_left,
        created_at: p.created_at,
        updated_at: p.updated_at,
    })
}

pub fn my_projects(conn: &Connection, user: &User, today: NaiveDate) -> Result<Vec<ProjectCard>> {
    project::managed_by(conn, user.id)?
        .iter()
        .map(|p| project_card(conn, p, today))
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct EventCard {
    pub id: i64,
    pub description: String,
    pub date: NaiveDate,
    pub responsible: String,
    pub project_id: i64,
    pub project_title: Option<String>,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub days_until: i64,
}

fn project_title(conn: &Connection, id: i64) -> Result<Option<String>> {
    Ok(conn
        .query_row("SELECT title FROM projects WHERE id = ?1", [id], |row| row.get(0))
        .optional()?)
}

fn event_card(conn: &Connection, e: &Event, today: NaiveDate) -> Result<EventCard> {
    Ok(EventCard {
        id: e.id,
        description: e.description.clone(),
        date: e.date,
        responsible: e.responsible.clone(),
        project_id: e.project_id,
        project_title: project_title(conn, e.project_id)?,
        kind: e.kind(),
        days_until: (e.date - today).num_days(),
    })
}

/// The next events on the user's projects, soonest first.
pub fn upcoming_events(conn: &Connection, user: &User, today: NaiveDate) -> Result<Vec<EventCard>> {
    event::for_manager(conn, user.id, today, Some(UPCOMING_EVENTS_LIMIT))?
        .iter()
        .map(|e| event_card(conn, e, today))
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct TenderCard {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub deadline: NaiveDate,
    pub responsible: String,
    pub project_id: Option<i64>,
    pub project_title: Option<String>,
    /// `overdue`, `urgent`, `pending` or `active`.
    pub status: &'static str,
    pub days_until_deadline: i64,
    pub created_at: DateTime<Utc>,
}

fn deadline_band(t: &Tender, today: NaiveDate) -> &'static str {
    let days = (t.deadline - today).num_days();
    if days < 0 {
        "overdue"
    } else if days <= tender::URGENT_DAYS {
        "urgent"
    } else if days <= tender::DUE_SOON_DAYS {
        "pending"
    } else {
        "active"
    }
}

fn managed_tenders(conn: &Connection, user: &User) -> Result<Vec<Tender>> {
    Ok(tender::list(conn, tender::Scope::All, &Default::default())?
        .into_iter()
        .filter(|t| t.project_manager_id == Some(user.id))
        .collect())
}

pub fn my_tenders(conn: &Connection, user: &User, today: NaiveDate) -> Result<Vec<TenderCard>> {
    managed_tenders(conn, user)?
        .iter()
        .map(|t| {
            Ok(TenderCard {
                id: t.id,
                title: t.title.clone(),
                description: t.description.clone(),
                deadline: t.deadline,
                responsible: t.responsible.clone(),
                project_id: t.project_id,
                project_title: match t.project_id {
                    Some(id) => project_title(conn, id)?,
                    None => None,
                },
                status: deadline_band(t, today),
                days_until_deadline: (t.deadline - today).num_days(),
                created_at: t.created_at,
            })
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Statistics {
    pub total_projects: usize,
    pub active_projects: usize,
    pub completed_projects: usize,
    pub projects_in_planning: usize,
    pub projects_in_progress: usize,
    pub projects_in_review: usize,
    pub total_team_members: usize,
    pub active_tenders: usize,
    /// Events within the next seven days.
    pub upcoming_events: i64,
    pub overdue_projects: usize,
    pub completion_rate: f64,
    pub this_month_projects: usize,
}

pub fn statistics(conn: &Connection, user: &User, today: NaiveDate) -> Result<Statistics> {
    let projects = project::managed_by(conn, user.id)?;
    let count = |status: ProjectStatus| projects.iter().filter(|p| p.status == status).count();
    let total = projects.len();
    let completed = count(ProjectStatus::Completed);

    let mut team = 0;
    for p in &projects {
        team += project::team_size(conn, p)?;
    }
    let active_tenders = managed_tenders(conn, user)?
        .iter()
        .filter(|t| t.deadline >= today && t.status != crate::types::TenderStatus::Converted)
        .count();
    let upcoming_events: i64 = conn.query_row(
        "SELECT COUNT(*) FROM events e JOIN projects p ON p.id = e.project_id
         WHERE p.project_manager_id = ?1 AND e.date >= ?2 AND e.date <= ?3",
        params![user.id, today, today + Days::new(7)],
        |row| row.get(0),
    )?;
    let (month_start, month_end) = month_bounds(today);
    let this_month = projects
        .iter()
        .filter(|p| {
            let created = p.created_at.date_naive();
            created >= month_start && created <= month_end
        })
        .count();

    Ok(Statistics {
        total_projects: total,
        active_projects: total - completed,
        completed_projects: completed,
        projects_in_planning: count(ProjectStatus::Planning),
        projects_in_progress: count(ProjectStatus::InProgress),
        projects_in_review: count(ProjectStatus::Review),
        total_team_members: team,
        active_tenders,
        upcoming_events,
        overdue_projects: projects.iter().filter(|p| p.is_overdue(today)).count(),
        completion_rate: if total == 0 {
            0.0
        } else {
            (completed as f64 / total as f64 * 1000.0).round() / 10.0
        },
        this_month_projects: this_month,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct TeamShare {
    pub project_name: String,
    pub team_size: usize,
    pub status: ProjectStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct TeamMembers {
    pub total_members: usize,
    /// Members of projects that are not completed.
    pub active_members: usize,
    pub projects_distribution: Vec<TeamShare>,
}

pub fn team_members(conn: &Connection, user: &User) -> Result<TeamMembers> {
    let mut out = TeamMembers {
        total_members: 0,
        active_members: 0,
        projects_distribution: Vec::new(),
    };
    for p in project::managed_by(conn, user.id)? {
        let size = project::team_size(conn, &p)?;
        out.total_members += size;
        if p.status != ProjectStatus::Completed {
            out.active_members += size;
        }
        out.projects_distribution.push(TeamShare {
            project_name: p.title,
            team_size: size,
            status: p.status,
        });
    }
    Ok(out)
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressRow {
    pub id: i64,
    pub title: String,
    pub progress: f64,
    pub timeline_progress: f64,
    pub variance: f64,
    pub schedule_status: ScheduleStatus,
    pub status: ProjectStatus,
    pub deadline: NaiveDate,
    pub team_size: usize,
}

pub fn projects_progress(conn: &Connection, user: &User, today: NaiveDate) -> Result<Vec<ProgressRow>> {
    project::managed_by(conn, user.id)?
        .into_iter()
        .map(|p| {
            let variance = p.progress_variance(today);
            Ok(ProgressRow {
                id: p.id,
                progress: p.progress_percentage,
                timeline_progress: p.timeline_progress(today),
                variance,
                schedule_status: ScheduleStatus::classify(variance),
                status: p.status,
                deadline: p.finishing_date,
                team_size: project::team_size(conn, &p)?,
                title: p.title,
            })
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct RecentTask {
    pub id: i64,
    pub task: String,
    pub project: Option<String>,
    pub due: Option<NaiveDate>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
}

/// Open tasks the user manages, earliest due date first; undated last.
pub fn recent_tasks(conn: &Connection, user: &User) -> Result<Vec<RecentTask>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT t.id, t.title, p.title, t.due_date, t.status, t.priority
         FROM tasks t LEFT JOIN projects p ON p.id = t.project_id
         WHERE t.project_manager_id = ?1 AND t.status NOT IN ('completed', 'cancelled')
           AND t.is_archived = 0
         ORDER BY t.due_date IS NULL, t.due_date, t.id
         LIMIT {RECENT_TASKS_LIMIT}"
    ))?;
    let rows = stmt.query_map([user.id], |row| {
        Ok(RecentTask {
            id: row.get(0)?,
            task: row.get(1)?,
            project: row.get(2)?,
            due: row.get(3)?,
            status: row.get(4)?,
            priority: row.get(5)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub projects: Vec<ProjectCard>,
    pub events: Vec<EventCard>,
    pub tenders: Vec<TenderCard>,
    pub statistics: Statistics,
    pub recent_tasks: Vec<RecentTask>,
}

pub fn dashboard(conn: &Connection, user: &User, today: NaiveDate) -> Result<Dashboard> {
    Ok(Dashboard {
        projects: my_projects(conn, user, today)?,
        events: upcoming_events(conn, user, today)?,
        tenders: my_tenders(conn, user, today)?,
        statistics: statistics(conn, user, today)?,
        recent_tasks: recent_tasks(conn, user)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Store;
    use crate::testutil;
    use crate::types::Role;

    #[test]
    fn statistics_and_team_counts() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.conn();
        let now = Utc::now();
        let today = now.date_naive();
        let pm_id = testutil::user(conn, "pm@site.io", Role::ProjectManager);
        let worker = testutil::user(conn, "worker@site.io", Role::SiteManager);
        let sup = testutil::supervisor(conn, "sup@site.io");
        let open = testutil::project(conn, pm_id, sup, now);
        let done = testutil::project(conn, pm_id, sup, now);
        conn.execute(
            "UPDATE projects SET status = 'completed', progress_percentage = 100 WHERE id = ?1",
            [done],
        )
        .unwrap();
        let task = testutil::task(conn, pm_id, Some(open), "Formwork");
        conn.execute(
            "INSERT INTO task_assignees (task_id, user_id) VALUES (?1, ?2)",
            params![task, worker],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO events (description, date, responsible, project_id, created_at, updated_at)
             VALUES ('Site walk', ?1, 'Ana', ?2, ?3, ?3)",
            params![today + Days::new(2), open, now],
        )
        .unwrap();
        let pm = crate::user::get(conn, pm_id).unwrap();

        let stats = statistics(conn, &pm, today).unwrap();
        assert_eq!(stats.total_projects, 2);
        assert_eq!(stats.completed_projects, 1);
        assert_eq!(stats.active_projects, 1);
        assert_eq!(stats.completion_rate, 50.0);
        assert_eq!(stats.upcoming_events, 1);
        assert_eq!(stats.this_month_projects, 2);
        // manager + supervisor on each, plus the assignee on the open one
        assert_eq!(stats.total_team_members, 5);

        let team = team_members(conn, &pm).unwrap();
        assert_eq!(team.active_members, 3);

        let board = dashboard(conn, &pm, today).unwrap();
        assert_eq!(board.events[0].kind, EventKind::Inspection);
        assert_eq!(board.events[0].days_until, 2);
        assert_eq!(board.recent_tasks.len(), 1);
        assert_eq!(board.recent_tasks[0].project.as_deref(), Some("Riverside Depot"));
        assert_eq!(board.projects[0].priority, Priority::Medium);
    }

    #[test]
    fn tender_deadline_bands() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.conn();
        let now = Utc::now();
        let today = now.date_naive();
        let pm_id = testutil::user(conn, "pm@site.io", Role::ProjectManager);
        let pm = crate::user::get(conn, pm_id).unwrap();
        for (title, days) in [("Roofing", 2u64), ("Paving", 6), ("Lighting", 30)] {
            tender::create(
                conn,
                &pm,
                &tender::TenderInput {
                    title: Some(title.into()),
                    description: Some("Scope".into()),
                    deadline: Some(today + Days::new(days)),
                    responsible: Some("Ana".into()),
                    ..Default::default()
                },
                today,
                now,
            )
            .unwrap();
        }
        let bands: Vec<&str> = my_tenders(conn, &pm, today)
            .unwrap()
            .iter()
            .map(|t| t.status)
            .collect();
        assert_eq!(bands, vec!["urgent", "pending", "active"]);
    }
}
