use crate::output::{print_fields, print_json};
use serde_json::json;
use std::path::Path;

/// Opening the store applies any pending migrations.
pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let (config, store) = super::open(root)?;
    let path = config.database_path(root);
    let version = store.version()?;
    let counts = store.counts()?;

    if json {
        return print_json(&json!({
            "database": path,
            "schema_version": version,
            "counts": counts,
        }));
    }

    println!("Database ready: {}", path.display());
    let mut fields = vec![("schema version", version.to_string())];
    fields.extend(counts.iter().map(|(table, n)| (*table, n.to_string())));
    print_fields(&fields);
    Ok(())
}
