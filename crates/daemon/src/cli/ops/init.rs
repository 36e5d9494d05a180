use clap::Args;

use anchor_daemon::state::{AppConfig, AppState, BLOBS_DIR_NAME};
use anchor_object_store::ObjectStoreConfig;
use common::types::{Address, Priority, Role};
use service::{LedgerBackend, MemberEntry};

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// API server port
    #[arg(long, default_value_t = 5080)]
    pub api_port: u16,

    /// Owner of the in-memory ledger
    #[arg(long)]
    pub owner: Address,

    /// Uploaders the owner whitelists at startup (repeatable)
    #[arg(long = "uploader")]
    pub uploaders: Vec<Address>,

    /// Membership entry as `identity:role:ceiling`, e.g. `0xab..:admin:2` (repeatable)
    #[arg(long = "member", value_parser = parse_member)]
    pub members: Vec<MemberEntry>,

    /// Keep ciphertext in memory instead of under the config directory
    #[arg(long)]
    pub memory_blobs: bool,
}

fn parse_member(raw: &str) -> Result<MemberEntry, String> {
    let mut parts = raw.splitn(3, ':');
    let (Some(identity), Some(role), Some(ceiling)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(format!("expected identity:role:ceiling, got {:?}", raw));
    };
    Ok(MemberEntry {
        identity: identity.parse().map_err(|e| format!("{}", e))?,
        role: role.parse::<Role>().map_err(|e| format!("{}", e))?,
        priority_ceiling: ceiling.parse::<Priority>().map_err(|e| format!("{}", e))?,
    })
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("init failed: {0}")]
    StateFailed(#[from] anchor_daemon::state::StateError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Init {
    type Error = InitError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let anchor_dir = AppState::anchor_dir(ctx.config_path.clone())?;
        let blob_store = if self.memory_blobs {
            ObjectStoreConfig::Memory
        } else {
            ObjectStoreConfig::Local {
                path: anchor_dir.join(BLOBS_DIR_NAME),
            }
        };

        let config = AppConfig {
            api_port: self.api_port,
            blob_store,
            ledger: LedgerBackend::Memory {
                owner: self.owner,
                uploaders: self.uploaders.clone(),
            },
            members: self.members.clone(),
            ..Default::default()
        };

        let state = AppState::init(Some(anchor_dir), Some(config))?;

        let output = format!(
            "Initialized anchor directory at: {}\n\
             - Database: {}\n\
             - Blobs: {}\n\
             - Config: {}\n\
             - API port: {}\n\
             - Ledger owner: {}\n\
             - Uploaders: {}\n\
             - Members: {}",
            state.anchor_dir.display(),
            state.db_path.display(),
            state.blobs_path.display(),
            state.config_path.display(),
            state.config.api_port,
            self.owner,
            self.uploaders.len(),
            state.config.members.len(),
        );

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_member() {
        let entry =
            parse_member("0x0000000000000000000000000000000000000002:admin:2").unwrap();
        assert_eq!(entry.role, Role::Admin);
        assert_eq!(entry.priority_ceiling, Priority::Admin);

        assert!(parse_member("0x0000000000000000000000000000000000000002:admin").is_err());
        assert!(parse_member("0x0000000000000000000000000000000000000002:admin:4").is_err());
        assert!(parse_member("nope:admin:1").is_err());
    }
}
