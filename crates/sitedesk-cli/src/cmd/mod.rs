pub mod migrate;
pub mod notify;
pub mod project;
pub mod serve;
pub mod user;

use anyhow::Context;
use sitedesk_core::config::Config;
use sitedesk_core::Store;
use std::path::Path;

/// Load the config under `root` and open (migrating if needed) its database.
pub fn open(root: &Path) -> anyhow::Result<(Config, Store)> {
    let config = Config::load(root).context("failed to load sitedesk.yaml")?;
    let path = config.database_path(root);
    let store = Store::open(&path)
        .with_context(|| format!("failed to open database {}", path.display()))?;
    Ok((config, store))
}
