use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use paydesk::app::{self, PositionBook};
use paydesk::{
    Config, Dispatcher, HtmlRenderer, MemoryDirectory, MemorySessionStore, MiddlewareRegistry,
    PermissionKey, Principal, Router, Server, Services, TenantId, UserId,
};

const PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,paydesk=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("loading configuration")?;

    let directory = Arc::new(seed_directory()?);
    let positions = Arc::new(PositionBook::new());
    positions.insert(TenantId(1), 1, "Payroll clerk");
    positions.insert(TenantId(1), 2, "Senior accountant");
    positions.insert(TenantId(2), 1, "Site foreman");

    let sessions = Arc::new(MemorySessionStore::new(config.session_ttl));
    spawn_session_purge(Arc::clone(&sessions));

    let services = Services {
        sessions,
        credentials: directory.clone(),
        permissions: directory,
        renderer: Arc::new(HtmlRenderer::new("Paydesk", &config.login_path)),
    };
    let router = Router::compile(app::routes(positions)).context("compiling routes")?;
    let dispatcher = Dispatcher::new(router, MiddlewareRegistry::with_defaults(&config), services, &config)
        .context("resolving route middleware")?;

    info!(
        cookie = %config.session_cookie,
        ttl_secs = config.session_ttl.as_secs(),
        login = %config.login_path,
        "dispatcher ready",
    );
    Server::bind(config.addr).serve(dispatcher).await?;
    Ok(())
}

/// Demo accounts: an administrator who may manage positions in tenant 1 and
/// a clerk in tenant 2 who may not.
fn seed_directory() -> anyhow::Result<MemoryDirectory> {
    let manage: PermissionKey = "config:manage_positions".parse()?;
    let admin = Principal { user_id: UserId(1), tenant_id: TenantId(1) };
    let clerk = Principal { user_id: UserId(2), tenant_id: TenantId(2) };

    let directory = MemoryDirectory::new()
        .with_user(admin, "admin@paydesk.test", "correct horse battery staple")
        .and_then(|d| d.with_user(clerk, "clerk@paydesk.test", "payday every friday"))
        .map_err(|e| anyhow::anyhow!(e))
        .context("seeding demo accounts")?
        .grant(admin.user_id, admin.tenant_id, &manage);
    Ok(directory)
}

fn spawn_session_purge(store: Arc<MemorySessionStore>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PURGE_INTERVAL);
        loop {
            ticker.tick().await;
            let purged = store.purge_expired();
            if purged > 0 {
                debug!(purged, remaining = store.len(), "expired sessions purged");
            }
        }
    });
}
