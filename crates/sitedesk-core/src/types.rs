use crate::error::SiteError;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Declares a closed set of snake_case values that round-trips through serde,
/// `FromStr`/`Display`, and SQLite TEXT columns.
macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        $name:ident as $kind:literal {
            $($variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub fn all() -> &'static [$name] {
                &[$($name::$variant),+]
            }

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = SiteError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    _ => Err(SiteError::InvalidValue {
                        kind: $kind,
                        value: s.to_string(),
                    }),
                }
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: SiteError| FromSqlError::Other(Box::new(e)))
            }
        }
    };
}

text_enum! {
    /// Account role. Project managers are the default for self-registered users.
    Role as "role" {
        ProjectManager => "project_manager",
        Supervisor => "supervisor",
        SiteManager => "site_manager",
        Admin => "admin",
    }
}

text_enum! {
    ProjectStatus as "project status" {
        Planning => "planning",
        InProgress => "in_progress",
        Review => "review",
        OnHold => "on_hold",
        Completed => "completed",
        Cancelled => "cancelled",
        AtRisk => "at_risk",
    }
}

text_enum! {
    ProjectPriority as "project priority" {
        Low => "low",
        Medium => "medium",
        High => "high",
        Critical => "critical",
    }
}

text_enum! {
    TaskStatus as "task status" {
        Pending => "pending",
        InProgress => "in_progress",
        InReview => "in_review",
        Completed => "completed",
        Cancelled => "cancelled",
        OnHold => "on_hold",
    }
}

text_enum! {
    TaskPriority as "task priority" {
        Low => "low",
        Medium => "medium",
        High => "high",
        Urgent => "urgent",
    }
}

text_enum! {
    TenderStatus as "tender status" {
        Draft => "draft",
        Submitted => "submitted",
        PendingReview => "pending_review",
        RequiresAction => "requires_action",
        Approved => "approved",
        Rejected => "rejected",
        Won => "won",
        Lost => "lost",
        Converted => "converted",
    }
}

text_enum! {
    NotificationType as "notification type" {
        Info => "info",
        Success => "success",
        Warning => "warning",
        Urgent => "urgent",
    }
}

text_enum! {
    Priority as "priority" {
        Low => "low",
        Medium => "medium",
        High => "high",
    }
}

text_enum! {
    SiteManagerStatus as "site manager status" {
        Active => "active",
        Inactive => "inactive",
    }
}

text_enum! {
    Availability as "availability" {
        Available => "available",
        Busy => "busy",
        Vacation => "vacation",
    }
}

text_enum! {
    FieldType as "field type" {
        Text => "text",
        LongText => "long_text",
        Number => "number",
        Currency => "currency",
        Date => "date",
        Checkbox => "checkbox",
        Dropdown => "dropdown",
        User => "user",
    }
}

text_enum! {
    EntityType as "entity type" {
        Task => "task",
        Project => "project",
        Tender => "tender",
    }
}

text_enum! {
    UpdateType as "update type" {
        Manual => "manual",
        Automatic => "automatic",
    }
}

text_enum! {
    /// Where actual progress sits relative to elapsed time.
    ScheduleStatus as "schedule status" {
        SignificantlyBehind => "significantly_behind",
        BehindSchedule => "behind_schedule",
        OnTrack => "on_track",
        AheadOfSchedule => "ahead_of_schedule",
        SignificantlyAhead => "significantly_ahead",
    }
}

text_enum! {
    TenderUrgency as "tender urgency" {
        Expired => "expired",
        Urgent => "urgent",
        DueSoon => "due_soon",
        Active => "active",
    }
}

text_enum! {
    EventUrgency as "event urgency" {
        Overdue => "overdue",
        Urgent => "urgent",
        Soon => "soon",
        Upcoming => "upcoming",
        Future => "future",
    }
}

text_enum! {
    EventKind as "event type" {
        Meeting => "meeting",
        Deadline => "deadline",
        Review => "review",
        Inspection => "inspection",
        Training => "training",
        General => "general",
    }
}

impl Default for ProjectStatus {
    fn default() -> Self {
        ProjectStatus::Planning
    }
}

impl Default for ProjectPriority {
    fn default() -> Self {
        ProjectPriority::Medium
    }
}

impl Default for TaskStatus {
    fn default() -> Self {
        TaskStatus::Pending
    }
}

impl Default for TaskPriority {
    fn default() -> Self {
        TaskPriority::Medium
    }
}

impl Default for TenderStatus {
    fn default() -> Self {
        TenderStatus::Draft
    }
}

impl TaskStatus {
    /// Completed and cancelled tasks never count as overdue or active.
    pub fn is_closed(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Cancelled)
    }
}

impl TaskPriority {
    /// Notification priority for a task of this priority.
    pub fn notification_priority(self) -> Priority {
        match self {
            TaskPriority::Urgent | TaskPriority::High => Priority::High,
            TaskPriority::Low => Priority::Low,
            TaskPriority::Medium => Priority::Medium,
        }
    }
}

impl ProjectStatus {
    pub fn is_closed(self) -> bool {
        matches!(self, ProjectStatus::Completed | ProjectStatus::Cancelled)
    }

    pub fn color(self) -> &'static str {
        match self {
            ProjectStatus::Planning => "yellow",
            ProjectStatus::InProgress => "blue",
            ProjectStatus::Review => "purple",
            ProjectStatus::Completed => "green",
            ProjectStatus::OnHold => "orange",
            ProjectStatus::Cancelled => "red",
            ProjectStatus::AtRisk => "gray",
        }
    }
}

impl TenderUrgency {
    pub fn color(self) -> &'static str {
        match self {
            TenderUrgency::Expired => "red",
            TenderUrgency::Urgent => "orange",
            TenderUrgency::DueSoon => "yellow",
            TenderUrgency::Active => "green",
        }
    }
}

impl EventUrgency {
    pub fn color(self) -> &'static str {
        match self {
            EventUrgency::Overdue => "red",
            EventUrgency::Urgent => "orange",
            EventUrgency::Soon => "yellow",
            EventUrgency::Upcoming => "blue",
            EventUrgency::Future => "green",
        }
    }
}

/// `"pending_review"` → `"Pending review"`.
pub fn humanize(value: &str) -> String {
    let spaced = value.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// `1 day`, `3 days`.
pub fn pluralize_days(n: i64) -> String {
    if n == 1 {
        format!("{n} day")
    } else {
        format!("{n} days")
    }
}
