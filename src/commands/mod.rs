// ABOUTME: Command module aggregator for the skiff CLI.
// ABOUTME: Re-exports deploy, rollback, status, and logs command handlers.

mod connect;
mod deploy;
mod logs;
mod rollback;
mod status;

pub use deploy::deploy;
pub use logs::logs;
pub use rollback::rollback;
pub use status::status;
