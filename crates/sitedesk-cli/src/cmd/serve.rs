use chrono::Utc;
use sitedesk_core::session;
use sitedesk_server::AppState;
use std::path::Path;

pub fn run(root: &Path, port: Option<u16>) -> anyhow::Result<()> {
    let (config, store) = super::open(root)?;
    let purged = session::purge_expired(store.conn(), Utc::now())?;
    if purged > 0 {
        tracing::info!(purged, "removed expired sessions");
    }

    let port = port.unwrap_or(config.server.port);
    tracing::info!(root = %root.display(), port, "starting sitedesk");

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(sitedesk_server::serve(AppState::new(store, config), port))
}
