use crate::db::found;
use crate::error::{Result, SiteError, Violations};
use crate::project::{self, Project, ProjectInput};
use crate::types::{ProjectPriority, TenderStatus, TenderUrgency};
use crate::user::User;
use chrono::{DateTime, Days, NaiveDate, Utc};
use rusqlite::{params, Connection, Row, ToSql};
use serde::{Deserialize, Serialize};

/// Deadlines this close (in days) count as urgent.
pub const URGENT_DAYS: i64 = 3;
pub const DUE_SOON_DAYS: i64 = 7;

#[derive(Debug, Clone, Serialize)]
pub struct Tender {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub deadline: NaiveDate,
    pub lead_person: Option<String>,
    pub responsible: String,
    pub status: TenderStatus,
    pub priority: ProjectPriority,
    pub category: Option<String>,
    pub location: Option<String>,
    pub client: Option<String>,
    pub budget_estimate: Option<f64>,
    pub estimated_duration: Option<String>,
    pub requirements: Option<String>,
    pub submission_count: i64,
    pub project_manager_id: Option<i64>,
    pub project_id: Option<i64>,
    pub user_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tender {
    /// Admins, the tender's manager and its owner.
    pub fn involves(&self, user: &User) -> bool {
        user.is_admin() || self.project_manager_id == Some(user.id) || self.user_id == Some(user.id)
    }

    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.deadline < today
    }

    pub fn days_remaining(&self, today: NaiveDate) -> i64 {
        if self.is_expired(today) {
            0
        } else {
            (self.deadline - today).num_days()
        }
    }

    pub fn is_urgent(&self, today: NaiveDate) -> bool {
        !self.is_expired(today) && self.days_remaining(today) <= URGENT_DAYS
    }

    pub fn urgency(&self, today: NaiveDate) -> TenderUrgency {
        if self.is_expired(today) {
            TenderUrgency::Expired
        } else if self.is_urgent(today) {
            TenderUrgency::Urgent
        } else if self.days_remaining(today) <= DUE_SOON_DAYS {
            TenderUrgency::DueSoon
        } else {
            TenderUrgency::Active
        }
    }

    pub fn view(&self, today: NaiveDate) -> TenderView {
        let urgency = self.urgency(today);
        TenderView {
            tender: self.clone(),
            days_remaining: self.days_remaining(today),
            expired: self.is_expired(today),
            urgent: self.is_urgent(today),
            urgency,
            status_color: urgency.color(),
        }
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            title: row.get("title")?,
            description: row.get("description")?,
            deadline: row.get("deadline")?,
            lead_person: row.get("lead_person")?,
            responsible: row.get("responsible")?,
            status: row.get("status")?,
            priority: row.get("priority")?,
            category: row.get("category")?,
            location: row.get("location")?,
            client: row.get("client")?,
            budget_estimate: row.get("budget_estimate")?,
            estimated_duration: row.get("estimated_duration")?,
            requirements: row.get("requirements")?,
            submission_count: row.get("submission_count")?,
            project_manager_id: row.get("project_manager_id")?,
            project_id: row.get("project_id")?,
            user_id: row.get("user_id")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TenderView {
    #[serde(flatten)]
    pub tender: Tender,
    pub days_remaining: i64,
    pub expired: bool,
    pub urgent: bool,
    pub urgency: TenderUrgency,
    pub status_color: &'static str,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TenderFilter {
    pub status: Option<TenderStatus>,
    pub priority: Option<ProjectPriority>,
    /// Case-insensitive substring of the title.
    pub search: Option<String>,
}

/// Which slice of tenders to list.
#[derive(Debug, Clone, Copy)]
pub enum Scope {
    All,
    /// Managed or owned by the user.
    Mine(i64),
    /// Deadline today or later.
    Active(NaiveDate),
    /// Deadline within the next `URGENT_DAYS`.
    Urgent(NaiveDate),
    Drafts,
}

pub fn get(conn: &Connection, id: i64) -> Result<Tender> {
    found(
        conn.query_row("SELECT * FROM tenders WHERE id = ?1", [id], Tender::from_row),
        "tender",
        id,
    )
}

/// Fetch a tender the user is involved in; others are not found.
pub fn get_for(conn: &Connection, user: &User, id: i64) -> Result<Tender> {
    let tender = get(conn, id)?;
    if !tender.involves(user) {
        return Err(SiteError::not_found("tender", id));
    }
    Ok(tender)
}

pub fn list(conn: &Connection, scope: Scope, filter: &TenderFilter) -> Result<Vec<Tender>> {
    let mut sql = String::from("SELECT * FROM tenders WHERE 1=1");
    let mut args: Vec<Box<dyn ToSql>> = Vec::new();
    let mut bind = |sql: &mut String, clause: &str, value: Box<dyn ToSql>| {
        args.push(value);
        sql.push_str(&clause.replace('?', &format!("?{}", args.len())));
    };
    match scope {
        Scope::All => {}
        Scope::Mine(uid) => {
            bind(&mut sql, " AND (project_manager_id = ?", Box::new(uid));
            bind(&mut sql, " OR user_id = ?)", Box::new(uid));
        }
        Scope::Active(today) => bind(&mut sql, " AND deadline >= ?", Box::new(today)),
        Scope::Urgent(today) => {
            bind(&mut sql, " AND deadline >= ?", Box::new(today));
            bind(
                &mut sql,
                " AND deadline <= ?",
                Box::new(today + Days::new(URGENT_DAYS as u64)),
            );
        }
        Scope::Drafts => bind(&mut sql, " AND status = ?", Box::new(TenderStatus::Draft)),
    }
    if let Some(status) = filter.status {
        bind(&mut sql, " AND status = ?", Box::new(status));
    }
    if let Some(priority) = filter.priority {
        bind(&mut sql, " AND priority = ?", Box::new(priority));
    }
    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        bind(
            &mut sql,
            " AND title LIKE ? ESCAPE '\\'",
            Box::new(format!("%{}%", escape_like(search))),
        );
    }
    sql.push_str(" ORDER BY deadline, id");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(args.iter()), Tender::from_row)?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

pub(crate) fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TenderInput {
    pub title: Option<String>,
    pub description: Option<String>,
    pub deadline: Option<NaiveDate>,
    pub lead_person: Option<String>,
    pub responsible: Option<String>,
    pub status: Option<TenderStatus>,
    pub priority: Option<ProjectPriority>,
    pub category: Option<String>,
    pub location: Option<String>,
    pub client: Option<String>,
    pub budget_estimate: Option<f64>,
    pub estimated_duration: Option<String>,
    pub requirements: Option<String>,
    pub submission_count: Option<i64>,
    pub project_manager_id: Option<i64>,
    pub project_id: Option<i64>,
}

fn validate(
    title: Option<&str>,
    description: Option<&str>,
    deadline: Option<NaiveDate>,
    check_deadline: bool,
    responsible: Option<&str>,
    today: NaiveDate,
) -> Result<()> {
    let mut v = Violations::new();
    v.length("Title", title, 3, 255);
    v.present("Description", description);
    match deadline {
        None => v.add("Deadline can't be blank"),
        Some(d) if check_deadline && d < today => v.add("Deadline can't be in the past"),
        Some(_) => {}
    }
    v.present("Responsible", responsible);
    v.into_result()
}

/// Create a tender owned by `owner`. The owner manages it unless another
/// manager is named.
pub fn create(
    conn: &Connection,
    owner: &User,
    input: &TenderInput,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Result<Tender> {
    validate(
        input.title.as_deref(),
        input.description.as_deref(),
        input.deadline,
        true,
        input.responsible.as_deref(),
        today,
    )?;
    conn.execute(
        "INSERT INTO tenders
           (title, description, deadline, lead_person, responsible, status, priority, category,
            location, client, budget_estimate, estimated_duration, requirements,
            submission_count, project_manager_id, project_id, user_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17,
                 ?18, ?18)",
        params![
            input.title.as_deref().map(str::trim),
            input.description,
            input.deadline,
            input.lead_person,
            input.responsible,
            input.status.unwrap_or_default(),
            input.priority.unwrap_or_default(),
            input.category,
            input.location,
            input.client,
            input.budget_estimate,
            input.estimated_duration,
            input.requirements,
            input.submission_count.unwrap_or(0),
            input.project_manager_id.unwrap_or(owner.id),
            input.project_id,
            owner.id,
            now,
        ],
    )?;
    get(conn, conn.last_insert_rowid())
}

pub fn update(
    conn: &Connection,
    id: i64,
    input: &TenderInput,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Result<Tender> {
    let old = get(conn, id)?;
    let title = input.title.clone().unwrap_or(old.title);
    let description = input.description.clone().unwrap_or(old.description);
    let deadline = input.deadline.unwrap_or(old.deadline);
    let responsible = input.responsible.clone().unwrap_or(old.responsible);
    validate(
        Some(&title),
        Some(&description),
        Some(deadline),
        deadline != old.deadline,
        Some(&responsible),
        today,
    )?;
    conn.execute(
        "UPDATE tenders SET title = ?1, description = ?2, deadline = ?3, lead_person = ?4,
                responsible = ?5, status = ?6, priority = ?7, category = ?8, location = ?9,
                client = ?10, budget_estimate = ?11, estimated_duration = ?12,
                requirements = ?13, submission_count = ?14, project_manager_id = ?15,
                project_id = ?16, updated_at = ?17
         WHERE id = ?18",
        params![
            title.trim(),
            description,
            deadline,
            input.lead_person.clone().or(old.lead_person),
            responsible,
            input.status.unwrap_or(old.status),
            input.priority.unwrap_or(old.priority),
            input.category.clone().or(old.category),
            input.location.clone().or(old.location),
            input.client.clone().or(old.client),
            input.budget_estimate.or(old.budget_estimate),
            input.estimated_duration.clone().or(old.estimated_duration),
            input.requirements.clone().or(old.requirements),
            input.submission_count.unwrap_or(old.submission_count),
            input.project_manager_id.or(old.project_manager_id),
            input.project_id.or(old.project_id),
            now,
            id,
        ],
    )?;
    get(conn, id)
}

/// Returns the tender and its previous status.
pub fn update_status(
    conn: &Connection,
    id: i64,
    status: TenderStatus,
    now: DateTime<Utc>,
) -> Result<(Tender, TenderStatus)> {
    let old = get(conn, id)?;
    if old.status == TenderStatus::Converted && status != TenderStatus::Converted {
        return Err(SiteError::Conflict(
            "a converted tender cannot change status".into(),
        ));
    }
    let submitted = i64::from(status == TenderStatus::Submitted && old.status != status);
    conn.execute(
        "UPDATE tenders SET status = ?1, submission_count = submission_count + ?2, updated_at = ?3
         WHERE id = ?4",
        params![status, submitted, now, id],
    )?;
    Ok((get(conn, id)?, old.status))
}

pub fn delete(conn: &Connection, id: i64) -> Result<()> {
    if conn.execute("DELETE FROM tenders WHERE id = ?1", [id])? == 0 {
        return Err(SiteError::not_found("tender", id));
    }
    Ok(())
}

/// Create a project from a tender and link the two.
///
/// The project takes the tender's title, description, lead person,
/// responsible, location (or `Unknown`) and its deadline as the finishing
/// date. It is managed by the tender's manager, falling back to `actor`.
/// The tender is kept, marked converted.
pub fn convert_to_project(
    conn: &Connection,
    id: i64,
    supervisor_id: Option<i64>,
    actor: &User,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Result<(Tender, Project)> {
    let tender = get(conn, id)?;
    if tender.status == TenderStatus::Converted {
        return Err(SiteError::Conflict(format!(
            "tender {id} was already converted"
        )));
    }
    let input = ProjectInput {
        title: Some(tender.title.clone()),
        description: Some(Some(tender.description.clone())),
        lead_person: Some(tender.lead_person.clone()),
        responsible: Some(Some(tender.responsible.clone())),
        location: Some(Some(
            tender
                .location
                .clone()
                .filter(|l| !l.trim().is_empty())
                .unwrap_or_else(|| "Unknown".into()),
        )),
        budget: Some(tender.budget_estimate),
        priority: Some(tender.priority),
        finishing_date: Some(tender.deadline),
        supervisor_id,
        ..Default::default()
    };
    let manager = tender.project_manager_id.unwrap_or(actor.id);
    let project = project::create(conn, manager, &input, today, now)?;
    conn.execute(
        "UPDATE tenders SET status = ?1, project_id = ?2, updated_at = ?3 WHERE id = ?4",
        params![TenderStatus::Converted, project.id, now, id],
    )?;
    tracing::info!(tender_id = id, project_id = project.id, "tender converted");
    Ok((get(conn, id)?, project))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Store;
    use crate::testutil;
    use crate::types::Role;

    fn input(title: &str, deadline: NaiveDate) -> TenderInput {
        TenderInput {
            title: Some(title.into()),
            description: Some("Supply and install".into()),
            deadline: Some(deadline),
            responsible: Some("Ana".into()),
            ..Default::default()
        }
    }

    fn sample(deadline: NaiveDate) -> Tender {
        let now = Utc::now();
        Tender {
            id: 1,
            title: "t".into(),
            description: "d".into(),
            deadline,
            lead_person: None,
            responsible: "r".into(),
            status: TenderStatus::Draft,
            priority: ProjectPriority::Medium,
            category: None,
            location: None,
            client: None,
            budget_estimate: None,
            estimated_duration: None,
            requirements: None,
            submission_count: 0,
            project_manager_id: None,
            project_id: None,
            user_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn urgency_bands_and_colors() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 10).unwrap();
        let at = |days: i64| sample(today + chrono::Duration::days(days));
        assert_eq!(at(-1).urgency(today), TenderUrgency::Expired);
        assert_eq!(at(0).urgency(today), TenderUrgency::Urgent);
        assert_eq!(at(3).urgency(today), TenderUrgency::Urgent);
        assert_eq!(at(4).urgency(today), TenderUrgency::DueSoon);
        assert_eq!(at(7).urgency(today), TenderUrgency::DueSoon);
        assert_eq!(at(8).urgency(today), TenderUrgency::Active);
        assert_eq!(at(-1).view(today).status_color, "red");
        assert_eq!(at(8).view(today).status_color, "green");
        assert_eq!(at(-1).days_remaining(today), 0);
    }

    #[test]
    fn create_requires_fields() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.conn();
        let now = Utc::now();
        let owner = crate::user::get(conn, testutil::user(conn, "pm@site.io", Role::ProjectManager)).unwrap();
        let err = create(conn, &owner, &TenderInput::default(), now.date_naive(), now).unwrap_err();
        match err {
            SiteError::Validation(msgs) => assert_eq!(msgs.len(), 4),
            other => panic!("unexpected {other:?}"),
        }
        let t = create(conn, &owner, &input("Roofing", now.date_naive()), now.date_naive(), now).unwrap();
        assert_eq!(t.project_manager_id, Some(owner.id));
        assert_eq!(t.status, TenderStatus::Draft);
    }

    #[test]
    fn scopes_and_search() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.conn();
        let now = Utc::now();
        let today = now.date_naive();
        let owner = crate::user::get(conn, testutil::user(conn, "pm@site.io", Role::ProjectManager)).unwrap();
        create(conn, &owner, &input("Roof_works 100%", today + Days::new(2)), today, now).unwrap();
        create(conn, &owner, &input("Facade", today + Days::new(20)), today, now).unwrap();

        assert_eq!(list(conn, Scope::Urgent(today), &TenderFilter::default()).unwrap().len(), 1);
        assert_eq!(list(conn, Scope::Active(today), &TenderFilter::default()).unwrap().len(), 2);
        assert_eq!(list(conn, Scope::Mine(owner.id), &TenderFilter::default()).unwrap().len(), 2);
        assert_eq!(list(conn, Scope::Mine(owner.id + 1), &TenderFilter::default()).unwrap().len(), 0);
        assert_eq!(list(conn, Scope::Drafts, &TenderFilter::default()).unwrap().len(), 2);

        let search = |q: &str| TenderFilter {
            search: Some(q.into()),
            ..Default::default()
        };
        assert_eq!(list(conn, Scope::All, &search("roof")).unwrap().len(), 1);
        assert_eq!(list(conn, Scope::All, &search("100%")).unwrap().len(), 1);
        assert_eq!(list(conn, Scope::All, &search("_")).unwrap().len(), 1);
    }

    #[test]
    fn hidden_from_uninvolved_users() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.conn();
        let now = Utc::now();
        let today = now.date_naive();
        let owner = crate::user::get(conn, testutil::user(conn, "pm@site.io", Role::ProjectManager)).unwrap();
        let other = crate::user::get(conn, testutil::user(conn, "other@site.io", Role::ProjectManager)).unwrap();
        let admin = crate::user::get(conn, testutil::user(conn, "root@site.io", Role::Admin)).unwrap();
        let t = create(conn, &owner, &input("Roofing", today), today, now).unwrap();

        assert!(get_for(conn, &owner, t.id).is_ok());
        assert!(get_for(conn, &admin, t.id).is_ok());
        assert!(matches!(get_for(conn, &other, t.id), Err(SiteError::NotFound { .. })));
    }

    #[test]
    fn status_change_reports_previous() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.conn();
        let now = Utc::now();
        let today = now.date_naive();
        let owner = crate::user::get(conn, testutil::user(conn, "pm@site.io", Role::ProjectManager)).unwrap();
        let t = create(conn, &owner, &input("Roofing", today), today, now).unwrap();
        let (t, old) = update_status(conn, t.id, TenderStatus::Submitted, now).unwrap();
        assert_eq!(old, TenderStatus::Draft);
        assert_eq!(t.status, TenderStatus::Submitted);
        assert_eq!(t.submission_count, 1);
    }

    #[test]
    fn conversion_creates_linked_project() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.conn();
        let now = Utc::now();
        let today = now.date_naive();
        let owner = crate::user::get(conn, testutil::user(conn, "pm@site.io", Role::ProjectManager)).unwrap();
        let sup = testutil::supervisor(conn, "sup@site.io");
        let t = create(conn, &owner, &input("Roofing", today + Days::new(30)), today, now).unwrap();

        assert!(matches!(
            convert_to_project(conn, t.id, None, &owner, today, now),
            Err(SiteError::Validation(_))
        ));

        let (t, p) = convert_to_project(conn, t.id, Some(sup), &owner, today, now).unwrap();
        assert_eq!(t.status, TenderStatus::Converted);
        assert_eq!(t.project_id, Some(p.id));
        assert_eq!(p.title, "Roofing");
        assert_eq!(p.location.as_deref(), Some("Unknown"));
        assert_eq!(p.finishing_date, today + Days::new(30));
        assert_eq!(p.project_manager_id, owner.id);

        assert!(matches!(
            convert_to_project(conn, t.id, Some(sup), &owner, today, now),
            Err(SiteError::Conflict(_))
        ));
    }

    #[test]
    fn linked_draft_tender_still_converts() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.conn();
        let now = Utc::now();
        let today = now.date_naive();
        let owner = crate::user::get(conn, testutil::user(conn, "pm@site.io", Role::ProjectManager)).unwrap();
        let sup = testutil::supervisor(conn, "sup@site.io");
        let existing = testutil::project(conn, owner.id, sup, now);
        let t = create(
            conn,
            &owner,
            &TenderInput {
                project_id: Some(existing),
                ..input("Annex fit-out", today + Days::new(30))
            },
            today,
            now,
        )
        .unwrap();
        assert_eq!(t.status, TenderStatus::Draft);
        assert_eq!(t.project_id, Some(existing));

        let (t, p) = convert_to_project(conn, t.id, Some(sup), &owner, today, now).unwrap();
        assert_ne!(p.id, existing);
        assert_eq!(t.project_id, Some(p.id));
        assert_eq!(t.status, TenderStatus::Converted);
    }
}
