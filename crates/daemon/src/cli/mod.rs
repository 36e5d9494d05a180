pub mod args;
pub mod op;
pub mod ops;

pub use ops::{Archive, Daemon, Escrow, Health, Init, Reconcile, Recover, Upload, Uploaders, Version};
