//! Timeline progress, schedule variance and the progress audit trail.
//!
//! Timeline progress is the share of the planned span (`start_date` to
//! `finishing_date`) that has elapsed by `today`, in percent. Variance is
//! actual progress minus timeline progress; its sign says whether a project
//! is ahead of or behind where the calendar says it should be.

use crate::config::NotificationConfig;
use crate::db::Store;
use crate::error::{Result, SiteError};
use crate::fanout;
use crate::project::{self, Project};
use crate::types::{Priority, ProjectStatus, ScheduleStatus, UpdateType};
use crate::user::User;
use chrono::{DateTime, Days, NaiveDate, Utc};
use rusqlite::{params, Connection, Row};
use serde::Serialize;

/// Points of variance inside which a project counts as on track.
pub const ON_TRACK_THRESHOLD: f64 = 5.0;
/// Points of variance beyond which a project is significantly off.
pub const SIGNIFICANT_THRESHOLD: f64 = 10.0;
/// Variance above which an update carries a warning.
pub const WARNING_THRESHOLD: f64 = 30.0;

pub const DEVIATION_WARNING: &str =
    "Warning: Progress is significantly off expected timeline progress.";

pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

pub fn timeline_progress(
    start: Option<NaiveDate>,
    finish: Option<NaiveDate>,
    today: NaiveDate,
) -> f64 {
    let (Some(start), Some(finish)) = (start, finish) else {
        return 0.0;
    };
    if today >= finish {
        return 100.0;
    }
    let total = (finish - start).num_days();
    if total <= 0 {
        return 0.0;
    }
    let elapsed = (today - start).num_days();
    if elapsed <= 0 {
        return 0.0;
    }
    round2((elapsed as f64 / total as f64 * 100.0).clamp(0.0, 100.0))
}

pub fn variance(actual: f64, timeline: f64) -> f64 {
    round2(actual - timeline)
}

impl ScheduleStatus {
    /// Three-way classification: on track within ±5 points.
    pub fn classify(variance: f64) -> Self {
        if variance.abs() <= ON_TRACK_THRESHOLD {
            ScheduleStatus::OnTrack
        } else if variance < -ON_TRACK_THRESHOLD {
            ScheduleStatus::BehindSchedule
        } else {
            ScheduleStatus::AheadOfSchedule
        }
    }

    /// Five-way classification. ±5 is on track, -10 is significantly
    /// behind and +10 is still only ahead.
    pub fn classify_detailed(variance: f64) -> Self {
        if variance <= -SIGNIFICANT_THRESHOLD {
            ScheduleStatus::SignificantlyBehind
        } else if variance < -ON_TRACK_THRESHOLD {
            ScheduleStatus::BehindSchedule
        } else if variance <= ON_TRACK_THRESHOLD {
            ScheduleStatus::OnTrack
        } else if variance <= SIGNIFICANT_THRESHOLD {
            ScheduleStatus::AheadOfSchedule
        } else {
            ScheduleStatus::SignificantlyAhead
        }
    }
}

pub fn is_behind(variance: f64) -> bool {
    variance < -ON_TRACK_THRESHOLD
}

pub fn is_ahead(variance: f64) -> bool {
    variance > ON_TRACK_THRESHOLD
}

/// Projected finish from the pace so far.
pub fn estimated_completion(
    start: Option<NaiveDate>,
    finish: NaiveDate,
    progress: f64,
    today: NaiveDate,
) -> Option<NaiveDate> {
    if progress >= 100.0 {
        return Some(finish);
    }
    let start = start?;
    if progress <= 0.0 {
        return None;
    }
    let elapsed = (today - start).num_days();
    let total = (elapsed as f64 / progress * 100.0).round() as i64;
    if total >= 0 {
        start.checked_add_days(Days::new(total as u64))
    } else {
        start.checked_sub_days(Days::new(total.unsigned_abs()))
    }
}

pub fn is_overdue(finish: NaiveDate, completed: bool, today: NaiveDate) -> bool {
    finish < today && !completed
}

/// Not completed and due within a week.
pub fn is_urgent(finish: NaiveDate, completed: bool, today: NaiveDate) -> bool {
    !completed && (finish - today).num_days() <= 7
}

pub fn days_remaining(finish: NaiveDate, completed: bool, today: NaiveDate) -> i64 {
    if completed || is_overdue(finish, completed, today) {
        0
    } else {
        (finish - today).num_days()
    }
}

/// High within 30 days, medium within 90, else low.
pub fn deadline_priority(days_left: i64) -> Priority {
    if days_left <= 30 {
        Priority::High
    } else if days_left <= 90 {
        Priority::Medium
    } else {
        Priority::Low
    }
}

/// Everything the progress view shows for one project.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressReport {
    pub id: i64,
    pub current_progress: f64,
    pub timeline_progress: f64,
    pub progress_variance: f64,
    pub schedule_status: ScheduleStatus,
    pub behind_schedule: bool,
    pub ahead_of_schedule: bool,
    pub days_remaining: i64,
    pub estimated_completion: Option<NaiveDate>,
}

impl Project {
    pub fn timeline_progress(&self, today: NaiveDate) -> f64 {
        timeline_progress(self.start_date, Some(self.finishing_date), today)
    }

    pub fn progress_variance(&self, today: NaiveDate) -> f64 {
        variance(self.progress_percentage, self.timeline_progress(today))
    }

    pub fn schedule_status(&self, today: NaiveDate) -> ScheduleStatus {
        ScheduleStatus::classify_detailed(self.progress_variance(today))
    }

    pub fn is_completed(&self) -> bool {
        self.status == ProjectStatus::Completed
    }

    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        is_overdue(self.finishing_date, self.is_completed(), today)
    }

    pub fn is_urgent(&self, today: NaiveDate) -> bool {
        is_urgent(self.finishing_date, self.is_completed(), today)
    }

    pub fn days_remaining(&self, today: NaiveDate) -> i64 {
        days_remaining(self.finishing_date, self.is_completed(), today)
    }

    pub fn report(&self, today: NaiveDate) -> ProgressReport {
        let variance = self.progress_variance(today);
        ProgressReport {
            id: self.id,
            current_progress: self.progress_percentage,
            timeline_progress: self.timeline_progress(today),
            progress_variance: variance,
            schedule_status: ScheduleStatus::classify_detailed(variance),
            behind_schedule: is_behind(variance),
            ahead_of_schedule: is_ahead(variance),
            days_remaining: self.days_remaining(today),
            estimated_completion: estimated_completion(
                self.start_date,
                self.finishing_date,
                self.progress_percentage,
                today,
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Audit trail
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ProgressUpdate {
    pub id: i64,
    pub project_id: i64,
    pub old_progress: f64,
    pub new_progress: f64,
    pub notes: Option<String>,
    pub update_type: UpdateType,
    pub updated_by_id: Option<i64>,
    pub updated_by: Option<String>,
    pub timeline_progress_at_update: Option<f64>,
    pub variance_at_update: Option<f64>,
    pub project_status_at_update: Option<ProjectStatus>,
    pub created_at: DateTime<Utc>,
}

impl ProgressUpdate {
    pub fn progress_change(&self) -> f64 {
        self.new_progress - self.old_progress
    }

    pub fn increased(&self) -> bool {
        self.progress_change() > 0.0
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            project_id: row.get("project_id")?,
            old_progress: row.get("old_progress")?,
            new_progress: row.get("new_progress")?,
            notes: row.get("notes")?,
            update_type: row.get("update_type")?,
            updated_by_id: row.get("updated_by_id")?,
            updated_by: row.get("updated_by")?,
            timeline_progress_at_update: row.get("timeline_progress_at_update")?,
            variance_at_update: row.get("variance_at_update")?,
            project_status_at_update: row.get("project_status_at_update")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// Progress updates for a project, newest first.
pub fn history(conn: &Connection, project_id: i64) -> Result<Vec<ProgressUpdate>> {
    let mut stmt = conn.prepare(
        "SELECT p.*, COALESCE(u.name, u.email) AS updated_by
         FROM progress_updates p LEFT JOIN users u ON u.id = p.updated_by_id
         WHERE p.project_id = ?1
         ORDER BY p.created_at DESC, p.id DESC",
    )?;
    let rows = stmt.query_map([project_id], ProgressUpdate::from_row)?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressSnapshot {
    pub id: i64,
    pub progress_percentage: f64,
    pub timeline_progress: f64,
    pub variance: f64,
    pub schedule_status: ScheduleStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressOutcome {
    pub message: &'static str,
    pub project: ProgressSnapshot,
    pub warning: Option<&'static str>,
    #[serde(skip)]
    pub notified: usize,
}

/// Record a manual progress update.
///
/// The project row, the audit row and the stakeholder notifications are
/// written in one transaction. Only admins and the project's manager may
/// update; anyone else gets not-found.
pub fn update_progress(
    store: &mut Store,
    project_id: i64,
    new_progress: f64,
    notes: Option<&str>,
    actor: &User,
    notify: &NotificationConfig,
    now: DateTime<Utc>,
) -> Result<ProgressOutcome> {
    if !(0.0..=100.0).contains(&new_progress) {
        return Err(SiteError::invalid(
            "Progress percentage must be between 0 and 100",
        ));
    }
    let today = now.date_naive();
    let tx = store.transaction()?;
    let existing = project::get(&tx, project_id)?;
    if !actor.is_admin() && existing.project_manager_id != actor.id {
        return Err(SiteError::not_found("project", project_id));
    }

    let old_progress = existing.progress_percentage;
    let timeline = existing.timeline_progress(today);
    let variance = variance(new_progress, timeline);
    let status = ScheduleStatus::classify(variance);

    tx.execute(
        "UPDATE projects SET progress_percentage = ?1, progress_notes = ?2,
                last_progress_update = ?3, updated_at = ?3
         WHERE id = ?4",
        params![new_progress, notes, now, project_id],
    )?;
    tx.execute(
        "INSERT INTO progress_updates
           (project_id, old_progress, new_progress, notes, update_type, updated_by_id,
            timeline_progress_at_update, variance_at_update, project_status_at_update, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            project_id,
            old_progress,
            new_progress,
            notes,
            UpdateType::Manual,
            actor.id,
            timeline,
            variance,
            existing.status,
            now
        ],
    )?;

    let updated = project::get(&tx, project_id)?;
    let notified = fanout::project_progress_updated(
        &tx,
        &updated,
        old_progress,
        new_progress,
        actor,
        notify.progress_threshold,
        now,
    )?;
    crate::activity::record(
        &tx,
        Some(actor.id),
        "progress_updated",
        "Project",
        Some(project_id),
        serde_json::json!({"old_progress": old_progress, "new_progress": new_progress}),
        now,
    )?;
    tx.commit()?;

    let warning = (variance.abs() > WARNING_THRESHOLD).then_some(DEVIATION_WARNING);
    if warning.is_some() {
        tracing::warn!(project_id, variance, "progress far from timeline");
    }
    Ok(ProgressOutcome {
        message: "Progress updated successfully",
        project: ProgressSnapshot {
            id: project_id,
            progress_percentage: new_progress,
            timeline_progress: timeline,
            variance,
            schedule_status: status,
        },
        warning,
        notified,
    })
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProgressSummary {
    pub total_projects: usize,
    pub on_track: usize,
    pub behind_schedule: usize,
    pub ahead_of_schedule: usize,
    pub average_progress: f64,
}

pub fn summarize(projects: &[Project], today: NaiveDate) -> ProgressSummary {
    if projects.is_empty() {
        return ProgressSummary::default();
    }
    let mut summary = ProgressSummary {
        total_projects: projects.len(),
        ..Default::default()
    };
    let mut sum = 0.0;
    for p in projects {
        let v = p.progress_variance(today);
        match ScheduleStatus::classify(v) {
            ScheduleStatus::OnTrack => summary.on_track += 1,
            ScheduleStatus::BehindSchedule => summary.behind_schedule += 1,
            _ => summary.ahead_of_schedule += 1,
        }
        sum += p.progress_percentage;
    }
    summary.average_progress = round2(sum / projects.len() as f64);
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use crate::types::Role;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn timeline_is_linear_between_dates() {
        let start = d(2025, 1, 1);
        let finish = d(2025, 1, 11);
        assert_eq!(timeline_progress(Some(start), Some(finish), d(2025, 1, 6)), 50.0);
        assert_eq!(timeline_progress(Some(start), Some(finish), d(2025, 1, 4)), 30.0);
    }

    #[test]
    fn timeline_edges() {
        let start = d(2025, 1, 1);
        let finish = d(2025, 4, 1);
        assert_eq!(timeline_progress(None, Some(finish), d(2025, 2, 1)), 0.0);
        assert_eq!(timeline_progress(Some(start), None, d(2025, 2, 1)), 0.0);
        assert_eq!(timeline_progress(Some(start), Some(finish), finish), 100.0);
        assert_eq!(timeline_progress(Some(start), Some(finish), d(2026, 1, 1)), 100.0);
        assert_eq!(timeline_progress(Some(start), Some(finish), d(2024, 12, 1)), 0.0);
        assert_eq!(timeline_progress(Some(start), Some(finish), start), 0.0);
        // finish before start, checked on a day before both
        assert_eq!(timeline_progress(Some(finish), Some(start), d(2024, 6, 1)), 0.0);
    }

    #[test]
    fn timeline_rounds_to_two_places() {
        let v = timeline_progress(Some(d(2025, 1, 1)), Some(d(2025, 1, 4)), d(2025, 1, 2));
        assert_eq!(v, 33.33);
    }

    #[test]
    fn three_way_classification() {
        assert_eq!(ScheduleStatus::classify(5.0), ScheduleStatus::OnTrack);
        assert_eq!(ScheduleStatus::classify(-5.0), ScheduleStatus::OnTrack);
        assert_eq!(ScheduleStatus::classify(-5.01), ScheduleStatus::BehindSchedule);
        assert_eq!(ScheduleStatus::classify(5.01), ScheduleStatus::AheadOfSchedule);
    }

    #[test]
    fn five_way_boundaries() {
        use ScheduleStatus::*;
        let cases = [
            (-40.0, SignificantlyBehind),
            (-10.0, SignificantlyBehind),
            (-9.99, BehindSchedule),
            (-5.01, BehindSchedule),
            (-5.0, OnTrack),
            (0.0, OnTrack),
            (5.0, OnTrack),
            (5.01, AheadOfSchedule),
            (9.99, AheadOfSchedule),
            (10.0, AheadOfSchedule),
            (10.01, SignificantlyAhead),
        ];
        for (v, expected) in cases {
            assert_eq!(ScheduleStatus::classify_detailed(v), expected, "variance {v}");
        }
        assert!(is_behind(-5.5) && !is_behind(-5.0));
        assert!(is_ahead(5.5) && !is_ahead(5.0));
    }

    #[test]
    fn estimated_completion_extrapolates_pace() {
        let start = d(2025, 1, 1);
        let finish = d(2025, 12, 31);
        assert_eq!(estimated_completion(Some(start), finish, 100.0, d(2025, 3, 1)), Some(finish));
        assert_eq!(estimated_completion(None, finish, 40.0, d(2025, 3, 1)), None);
        assert_eq!(estimated_completion(Some(start), finish, 0.0, d(2025, 3, 1)), None);
        // 10 days elapsed at 25% → 40 days total
        assert_eq!(
            estimated_completion(Some(start), finish, 25.0, d(2025, 1, 11)),
            Some(d(2025, 2, 10))
        );
    }

    #[test]
    fn deadline_helpers() {
        let today = d(2025, 6, 1);
        assert!(is_overdue(d(2025, 5, 31), false, today));
        assert!(!is_overdue(d(2025, 5, 31), true, today));
        assert_eq!(days_remaining(d(2025, 5, 31), false, today), 0);
        assert_eq!(days_remaining(d(2025, 6, 11), false, today), 10);
        assert_eq!(days_remaining(d(2025, 6, 11), true, today), 0);
        assert!(is_urgent(d(2025, 6, 8), false, today));
        assert!(!is_urgent(d(2025, 6, 9), false, today));
        assert_eq!(deadline_priority(30), Priority::High);
        assert_eq!(deadline_priority(31), Priority::Medium);
        assert_eq!(deadline_priority(91), Priority::Low);
    }

    #[test]
    fn update_progress_writes_audit_row_and_notifies() {
        let mut store = crate::db::Store::open_in_memory().unwrap();
        let now = Utc::now();
        let (pm, project_id) = {
            let conn = store.conn();
            let pm = testutil::user(conn, "pm@site.io", Role::ProjectManager);
            testutil::user(conn, "boss@site.io", Role::Admin);
            let sup = testutil::supervisor(conn, "sup@site.io");
            (pm, testutil::project(conn, pm, sup, now))
        };
        let actor = crate::user::get(store.conn(), pm).unwrap();

        let outcome = update_progress(
            &mut store,
            project_id,
            40.0,
            Some("framing done"),
            &actor,
            &NotificationConfig::default(),
            now,
        )
        .unwrap();
        assert_eq!(outcome.project.progress_percentage, 40.0);
        // admin is notified, the acting manager is not
        assert_eq!(outcome.notified, 1);

        let rows = history(store.conn(), project_id).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].old_progress, 0.0);
        assert_eq!(rows[0].new_progress, 40.0);
        assert_eq!(rows[0].update_type, UpdateType::Manual);
        assert_eq!(rows[0].updated_by.as_deref(), Some("Test User"));
        assert!(rows[0].increased());

        let p = project::get(store.conn(), project_id).unwrap();
        assert_eq!(p.progress_percentage, 40.0);
        assert_eq!(p.progress_notes.as_deref(), Some("framing done"));
        assert!(p.last_progress_update.is_some());
    }

    #[test]
    fn update_progress_rejects_out_of_range_and_strangers() {
        let mut store = crate::db::Store::open_in_memory().unwrap();
        let now = Utc::now();
        let (pm, other, project_id) = {
            let conn = store.conn();
            let pm = testutil::user(conn, "pm@site.io", Role::ProjectManager);
            let other = testutil::user(conn, "other@site.io", Role::ProjectManager);
            let sup = testutil::supervisor(conn, "sup@site.io");
            (pm, other, testutil::project(conn, pm, sup, now))
        };
        let actor = crate::user::get(store.conn(), pm).unwrap();
        let stranger = crate::user::get(store.conn(), other).unwrap();
        let cfg = NotificationConfig::default();

        let err = update_progress(&mut store, project_id, 120.0, None, &actor, &cfg, now).unwrap_err();
        assert!(matches!(err, SiteError::Validation(_)));
        let err = update_progress(&mut store, project_id, 10.0, None, &stranger, &cfg, now).unwrap_err();
        assert!(matches!(err, SiteError::NotFound { .. }));
        assert!(history(store.conn(), project_id).unwrap().is_empty());
    }

    #[test]
    fn large_variance_carries_warning() {
        let mut store = crate::db::Store::open_in_memory().unwrap();
        let now = Utc::now();
        let (pm, project_id) = {
            let conn = store.conn();
            let pm = testutil::user(conn, "pm@site.io", Role::ProjectManager);
            let sup = testutil::supervisor(conn, "sup@site.io");
            (pm, testutil::project(conn, pm, sup, now))
        };
        let actor = crate::user::get(store.conn(), pm).unwrap();
        // the fixture project starts today, so timeline progress is 0
        let outcome = update_progress(
            &mut store,
            project_id,
            80.0,
            None,
            &actor,
            &NotificationConfig::default(),
            now,
        )
        .unwrap();
        assert_eq!(outcome.warning, Some(DEVIATION_WARNING));
        assert_eq!(outcome.project.schedule_status, ScheduleStatus::AheadOfSchedule);
    }
}
