use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use service::{ConfirmationPolicy, LedgerBackend};

use crate::state::AppState;

/// Everything the daemon needs to run: the vault configuration plus the
///  process-level knobs (logging) that the service crate knows nothing about
#[derive(Debug, Clone)]
pub struct Config {
    pub vault: service::Config,

    /// Directory for log files (optional, logs to stdout only if not set)
    pub log_dir: Option<PathBuf>,
}

impl Config {
    /// Assemble the runtime config from the on-disk app state
    pub fn from_app_state(state: &AppState, api_port: Option<u16>) -> Self {
        let app = &state.config;
        let api_port = api_port.unwrap_or(app.api_port);

        let reconcile_interval = match app.reconcile_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        let vault = service::Config {
            sqlite_path: Some(state.db_path.clone()),
            blob_store: app.blob_store.clone(),
            ledger: app.ledger.clone(),
            retry: app.retry,
            confirmation: ConfirmationPolicy {
                timeout: Duration::from_secs(app.confirmation_timeout_secs),
                poll_interval: Duration::from_millis(app.confirmation_poll_ms),
            },
            reconcile_stale_after: Duration::from_secs(app.reconcile_stale_after_secs),
            reconcile_interval,
            members: app.members.clone(),
            api_listen_addr: Some(SocketAddr::from(([0, 0, 0, 0], api_port))),
            ..Default::default()
        };

        Self {
            vault,
            log_dir: None,
        }
    }

    pub fn api_listen_addr(&self) -> SocketAddr {
        self.vault
            .api_listen_addr
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 5080)))
    }

    pub fn uses_memory_ledger(&self) -> bool {
        matches!(self.vault.ledger, LedgerBackend::Memory { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AppConfig;

    #[test]
    fn test_from_app_state() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::init(
            Some(dir.path().join("anchor")),
            Some(AppConfig {
                api_port: 6100,
                reconcile_interval_secs: 0,
                confirmation_poll_ms: 250,
                ..Default::default()
            }),
        )
        .unwrap();

        let config = Config::from_app_state(&state, None);
        assert_eq!(config.api_listen_addr().port(), 6100);
        assert_eq!(config.vault.reconcile_interval, None);
        assert_eq!(
            config.vault.confirmation.poll_interval,
            Duration::from_millis(250)
        );
        assert_eq!(config.vault.sqlite_path, Some(state.db_path.clone()));
        assert!(config.uses_memory_ledger());

        let overridden = Config::from_app_state(&state, Some(7100));
        assert_eq!(overridden.api_listen_addr().port(), 7100);
    }
}
