// Service modules (daemon functionality)
pub mod http_server;
pub mod process;
pub mod service_config;

// App state (configuration, paths)
pub mod state;

// Re-exports for consumers
pub use process::{spawn_service, start_service, ShutdownHandle};
pub use service::ServiceState;
pub use service_config::Config as ServiceConfig;
pub use state::{AppConfig, AppState, StateError};
