use thiserror::Error;

#[derive(Debug, Error)]
pub enum SiteError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("validation failed: {}", .0.join(", "))]
    Validation(Vec<String>),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid {kind}: '{value}'")]
    InvalidValue { kind: &'static str, value: String },

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl SiteError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        SiteError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        SiteError::Validation(vec![message.into()])
    }
}

pub type Result<T> = std::result::Result<T, SiteError>;

/// Collects human-readable validation messages before a write.
#[derive(Debug, Default)]
pub struct Violations(Vec<String>);

impl Violations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, message: impl Into<String>) {
        self.0.push(message.into());
    }

    pub fn check(&mut self, ok: bool, message: impl Into<String>) {
        if !ok {
            self.add(message);
        }
    }

    /// Length bounds counted in characters; a missing value only reports presence.
    pub fn length(&mut self, field: &str, value: Option<&str>, min: usize, max: usize) {
        match value.map(str::trim) {
            None | Some("") => self.add(format!("{field} can't be blank")),
            Some(v) => {
                let n = v.chars().count();
                if n < min {
                    self.add(format!("{field} is too short (minimum is {min} characters)"));
                } else if n > max {
                    self.add(format!("{field} is too long (maximum is {max} characters)"));
                }
            }
        }
    }

    pub fn present(&mut self, field: &str, value: Option<&str>) {
        if value.map(str::trim).unwrap_or("").is_empty() {
            self.add(format!("{field} can't be blank"));
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_result(self) -> Result<()> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(SiteError::Validation(self.0))
        }
    }
}
