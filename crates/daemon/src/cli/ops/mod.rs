pub mod archive;
pub mod daemon;
pub mod escrow;
pub mod health;
pub mod init;
pub mod reconcile;
pub mod recover;
pub mod upload;
pub mod uploaders;
pub mod version;

pub use archive::Archive;
pub use daemon::Daemon;
pub use escrow::Escrow;
pub use health::Health;
pub use init::Init;
pub use reconcile::Reconcile;
pub use recover::Recover;
pub use upload::Upload;
pub use uploaders::Uploaders;
pub use version::Version;
