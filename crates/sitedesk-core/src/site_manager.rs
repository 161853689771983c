use crate::db::{found, is_unique_violation, json_column};
use crate::error::{Result, SiteError, Violations};
use crate::types::{Availability, SiteManagerStatus};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct SiteManager {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub location: Option<String>,
    pub specialization: Option<String>,
    pub experience_years: i64,
    pub status: SiteManagerStatus,
    pub availability: Availability,
    pub certifications: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SiteManager {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            email: row.get("email")?,
            phone: row.get("phone")?,
            location: row.get("location")?,
            specialization: row.get("specialization")?,
            experience_years: row.get("experience_years")?,
            status: row.get("status")?,
            availability: row.get("availability")?,
            certifications: json_column(row, "certifications")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

pub fn get(conn: &Connection, id: i64) -> Result<SiteManager> {
    found(
        conn.query_row("SELECT * FROM site_managers WHERE id = ?1", [id], SiteManager::from_row),
        "site manager",
        id,
    )
}

pub fn list(conn: &Connection) -> Result<Vec<SiteManager>> {
    let mut stmt = conn.prepare("SELECT * FROM site_managers ORDER BY name, id")?;
    let rows = stmt.query_map([], SiteManager::from_row)?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SiteManagerInput {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub location: Option<String>,
    pub specialization: Option<String>,
    pub experience_years: Option<i64>,
    pub status: Option<SiteManagerStatus>,
    pub availability: Option<Availability>,
    pub certifications: Option<Vec<String>>,
}

fn validate(name: &str, email: &str, experience_years: i64) -> Result<()> {
    let mut v = Violations::new();
    v.present("Name", Some(name));
    if email.trim().is_empty() {
        v.add("Email can't be blank");
    } else {
        v.check(crate::user::is_valid_email(email.trim()), "Email is invalid");
    }
    v.check(
        experience_years >= 0,
        "Experience years must be greater than or equal to 0",
    );
    v.into_result()
}

fn taken(e: rusqlite::Error) -> SiteError {
    if is_unique_violation(&e) {
        SiteError::Validation(vec!["Email has already been taken".into()])
    } else {
        e.into()
    }
}

pub fn create(conn: &Connection, input: &SiteManagerInput, now: DateTime<Utc>) -> Result<SiteManager> {
    let name = input.name.clone().unwrap_or_default();
    let email = input.email.clone().unwrap_or_default();
    let years = input.experience_years.unwrap_or(0);
    validate(&name, &email, years)?;
    conn.execute(
        "INSERT INTO site_managers
           (name, email, phone, location, specialization, experience_years, status,
            availability, certifications, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
        params![
            name.trim(),
            email.trim().to_lowercase(),
            input.phone,
            input.location,
            input.specialization,
            years,
            input.status.unwrap_or(SiteManagerStatus::Active),
            input.availability.unwrap_or(Availability::Available),
            serde_json::to_value(input.certifications.clone().unwrap_or_default())?,
            now,
        ],
    )
    .map_err(taken)?;
    get(conn, conn.last_insert_rowid())
}

pub fn update(
    conn: &Connection,
    id: i64,
    input: &SiteManagerInput,
    now: DateTime<Utc>,
) -> Result<SiteManager> {
    let old = get(conn, id)?;
    let name = input.name.clone().unwrap_or(old.name);
    let email = input.email.clone().unwrap_or(old.email);
    let years = input.experience_years.unwrap_or(old.experience_years);
    validate(&name, &email, years)?;
    conn.execute(
        "UPDATE site_managers SET name = ?1, email = ?2, phone = ?3, location = ?4,
                specialization = ?5, experience_years = ?6, status = ?7, availability = ?8,
                certifications = ?9, updated_at = ?10
         WHERE id = ?11",
        params![
            name.trim(),
            email.trim().to_lowercase(),
            input.phone.clone().or(old.phone),
            input.location.clone().or(old.location),
            input.specialization.clone().or(old.specialization),
            years,
            input.status.unwrap_or(old.status),
            input.availability.unwrap_or(old.availability),
            serde_json::to_value(input.certifications.clone().unwrap_or(old.certifications))?,
            now,
            id,
        ],
    )
    .map_err(taken)?;
    get(conn, id)
}

/// Projects keep their rows; their site manager link is cleared.
pub fn delete(conn: &Connection, id: i64) -> Result<()> {
    if conn.execute("DELETE FROM site_managers WHERE id = ?1", [id])? == 0 {
        return Err(SiteError::not_found("site manager", id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Store;
    use crate::testutil;
    use crate::types::Role;

    #[test]
    fn create_defaults_and_certifications() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.conn();
        let sm = create(
            conn,
            &SiteManagerInput {
                name: Some("Lena".into()),
                email: Some("lena@site.io".into()),
                certifications: Some(vec!["SMSTS".into(), "CSCS".into()]),
                ..Default::default()
            },
            Utc::now(),
        )
        .unwrap();
        assert_eq!(sm.status, SiteManagerStatus::Active);
        assert_eq!(sm.availability, Availability::Available);
        assert_eq!(sm.certifications, vec!["SMSTS", "CSCS"]);

        let updated = update(
            conn,
            sm.id,
            &SiteManagerInput {
                availability: Some(Availability::Vacation),
                ..Default::default()
            },
            Utc::now(),
        )
        .unwrap();
        assert_eq!(updated.availability, Availability::Vacation);
        assert_eq!(updated.certifications.len(), 2);
    }

    #[test]
    fn delete_clears_project_link() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.conn();
        let now = Utc::now();
        let pm = testutil::user(conn, "pm@site.io", Role::ProjectManager);
        let sup = testutil::supervisor(conn, "sup@site.io");
        let project = testutil::project(conn, pm, sup, now);
        let sm = create(
            conn,
            &SiteManagerInput {
                name: Some("Lena".into()),
                email: Some("lena@site.io".into()),
                ..Default::default()
            },
            now,
        )
        .unwrap();
        conn.execute(
            "UPDATE projects SET site_manager_id = ?1 WHERE id = ?2",
            params![sm.id, project],
        )
        .unwrap();
        delete(conn, sm.id).unwrap();
        assert_eq!(crate::project::get(conn, project).unwrap().site_manager_id, None);
        assert!(matches!(delete(conn, sm.id), Err(SiteError::NotFound { .. })));
    }
}
