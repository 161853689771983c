use crate::db::{found, is_unique_violation};
use crate::error::{Result, SiteError, Violations};
use crate::types::{EntityType, FieldType};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Serialize)]
pub struct CustomField {
    pub id: i64,
    pub name: String,
    pub field_type: FieldType,
    pub description: Option<String>,
    pub required: bool,
    pub entity_type: EntityType,
    pub options: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CustomField {
    /// Dropdown choices live under `options.values`.
    pub fn dropdown_values(&self) -> Vec<String> {
        self.options
            .get("values")
            .and_then(Value::as_array)
            .map(|vals| {
                vals.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let options: Value = row.get("options")?;
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            field_type: row.get("field_type")?,
            description: row.get("description")?,
            required: row.get("required")?,
            entity_type: row.get("entity_type")?,
            options: match options {
                Value::Object(map) => map,
                _ => Map::new(),
            },
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

pub fn get(conn: &Connection, id: i64) -> Result<CustomField> {
    found(
        conn.query_row("SELECT * FROM custom_fields WHERE id = ?1", [id], CustomField::from_row),
        "custom field",
        id,
    )
}

pub fn list(conn: &Connection, entity_type: Option<EntityType>) -> Result<Vec<CustomField>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM custom_fields WHERE (?1 IS NULL OR entity_type = ?1) ORDER BY name, id",
    )?;
    let rows = stmt.query_map([entity_type], CustomField::from_row)?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomFieldInput {
    pub name: Option<String>,
    pub field_type: Option<FieldType>,
    pub description: Option<String>,
    pub required: Option<bool>,
    pub entity_type: Option<EntityType>,
    pub options: Option<Map<String, Value>>,
}

fn validate(name: &str, field_type: Option<FieldType>, options: &Map<String, Value>) -> Result<()> {
    let mut v = Violations::new();
    v.present("Name", Some(name));
    match field_type {
        None => v.add("Field type can't be blank"),
        Some(FieldType::Dropdown) => v.check(
            options
                .get("values")
                .and_then(Value::as_array)
                .is_some_and(|vals| !vals.is_empty()),
            "Options must list dropdown values",
        ),
        Some(_) => {}
    }
    v.into_result()
}

fn taken(e: rusqlite::Error) -> SiteError {
    if is_unique_violation(&e) {
        SiteError::Validation(vec!["Name has already been taken".into()])
    } else {
        e.into()
    }
}

pub fn create(conn: &Connection, input: &CustomFieldInput, now: DateTime<Utc>) -> Result<CustomField> {
    let name = input.name.clone().unwrap_or_default();
    let options = input.options.clone().unwrap_or_default();
    validate(&name, input.field_type, &options)?;
    conn.execute(
        "INSERT INTO custom_fields
           (name, field_type, description, required, entity_type, options, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
        params![
            name.trim(),
            input.field_type,
            input.description,
            input.required.unwrap_or(false),
            input.entity_type.unwrap_or(EntityType::Task),
            Value::Object(options),
            now,
        ],
    )
    .map_err(taken)?;
    get(conn, conn.last_insert_rowid())
}

pub fn update(
    conn: &Connection,
    id: i64,
    input: &CustomFieldInput,
    now: DateTime<Utc>,
) -> Result<CustomField> {
    let old = get(conn, id)?;
    let name = input.name.clone().unwrap_or(old.name);
    let field_type = input.field_type.unwrap_or(old.field_type);
    let options = input.options.clone().unwrap_or(old.options);
    validate(&name, Some(field_type), &options)?;
    conn.execute(
        "UPDATE custom_fields SET name = ?1, field_type = ?2, description = ?3, required = ?4,
                entity_type = ?5, options = ?6, updated_at = ?7
         WHERE id = ?8",
        params![
            name.trim(),
            field_type,
            input.description.clone().or(old.description),
            input.required.unwrap_or(old.required),
            input.entity_type.unwrap_or(old.entity_type),
            Value::Object(options),
            now,
            id,
        ],
    )
    .map_err(taken)?;
    get(conn, id)
}

pub fn delete(conn: &Connection, id: i64) -> Result<()> {
    if conn.execute("DELETE FROM custom_fields WHERE id = ?1", [id])? == 0 {
        return Err(SiteError::not_found("custom field", id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Store;
    use serde_json::json;

    fn input(name: &str, ty: FieldType, entity: EntityType) -> CustomFieldInput {
        CustomFieldInput {
            name: Some(name.into()),
            field_type: Some(ty),
            entity_type: Some(entity),
            ..Default::default()
        }
    }

    #[test]
    fn names_unique_per_entity_type() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.conn();
        let now = Utc::now();
        create(conn, &input("Crew", FieldType::Text, EntityType::Task), now).unwrap();
        create(conn, &input("Crew", FieldType::Text, EntityType::Project), now).unwrap();
        let err = create(conn, &input("Crew", FieldType::Number, EntityType::Task), now).unwrap_err();
        assert!(matches!(err, SiteError::Validation(_)));
        assert_eq!(list(conn, Some(EntityType::Task)).unwrap().len(), 1);
        assert_eq!(list(conn, None).unwrap().len(), 2);
    }

    #[test]
    fn dropdown_needs_values() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.conn();
        let now = Utc::now();
        assert!(create(conn, &input("Phase", FieldType::Dropdown, EntityType::Task), now).is_err());

        let mut with_values = input("Phase", FieldType::Dropdown, EntityType::Task);
        let mut options = Map::new();
        options.insert("values".into(), json!(["Design", "Build"]));
        with_values.options = Some(options);
        let field = create(conn, &with_values, now).unwrap();
        assert_eq!(field.dropdown_values(), vec!["Design", "Build"]);
    }
}
