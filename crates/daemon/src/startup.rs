//! Service wiring: config, engine, identities, listener

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use slotswap_core::{Config, StaticIdentity, SwapEngine};
use slotswap_net::Server;
use tracing::{info, warn};

/// Time given to in-flight requests after shutdown is signalled
const DRAIN_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error(transparent)]
    Core(#[from] slotswap_core::Error),

    #[error(transparent)]
    Net(#[from] slotswap_net::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DaemonError>;

/// Everything the listener needs, built from a config
pub struct Service {
    pub config: Config,
    pub engine: Arc<SwapEngine>,
    pub identity: Arc<StaticIdentity>,
}

/// Open the store and seed a profile for every configured identity
pub fn prepare(config: Config) -> Result<Service> {
    let engine = SwapEngine::open(&config.store)?;
    let identity = StaticIdentity::from_config(&config.identity);

    if config.identity.users.is_empty() {
        warn!("No identities configured; every connection will be rejected");
    }
    for known in identity.identities() {
        engine.register_profile(known.user_id, &known.display_name)?;
    }

    let report = engine.audit()?;
    if report.is_clean() {
        info!("Store audit clean");
    }

    Ok(Service {
        config,
        engine: Arc::new(engine),
        identity: Arc::new(identity),
    })
}

/// Run until Ctrl-C
pub async fn run(config_path: Option<PathBuf>) -> Result<()> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };
    let config = Config::load(&path)?;

    let service = tokio::task::spawn_blocking(move || prepare(config))
        .await
        .map_err(|e| DaemonError::Io(std::io::Error::other(e)))??;

    let server = Server::start(
        service.config.server.socket_addr()?,
        service.engine.clone(),
        service.identity.clone(),
        service.config.server.max_connections,
    )
    .await?;

    info!(addr = %server.addr(), "Listening");

    tokio::signal::ctrl_c().await?;
    info!(
        sessions = server.session_count().await,
        in_flight = server.in_flight().await,
        "Interrupt received"
    );

    server.shutdown();
    tokio::time::sleep(DRAIN_GRACE).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_seeds_profiles() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("data").join("slotswap.db");
        let config = Config::from_toml_str(&format!(
            r#"
            [store]
            path = {:?}

            [[identity.users]]
            credential = "alice-token"
            user_id = "11111111-1111-1111-1111-111111111111"
            display_name = "Alice"
            "#,
            db_path.display().to_string()
        ))
        .unwrap();

        let service = prepare(config).unwrap();
        let alice = service.config.identity.users[0].user_id;

        // A seeded profile can own slots straight away
        let slot = service
            .engine
            .create_slot(
                alice,
                "Standup",
                "2026-11-02T09:00:00Z".parse().unwrap(),
                "2026-11-02T10:00:00Z".parse().unwrap(),
            )
            .unwrap();
        assert_eq!(slot.owner_id, alice);
        assert!(db_path.exists());
    }

    #[test]
    fn test_prepare_without_identities() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.store.path = Some(dir.path().join("empty.db"));

        let service = prepare(config).unwrap();
        assert_eq!(service.identity.identities().count(), 0);
        assert!(service.engine.audit().unwrap().is_clean());
    }
}
