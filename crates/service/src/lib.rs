//! The finality provider service: per-provider control loops around the
//! commit and vote pipelines, the start-height resolver, and the app-level
//! supervisor that watches the critical-error channel.

pub mod app;
pub mod config;
pub mod critical;
pub mod error;
pub mod instance;
pub mod poller;

#[cfg(test)]
mod mock;

pub use app::FinalityProviderApp;
pub use config::Config;
pub use critical::CriticalError;
pub use error::InstanceError;
pub use instance::FinalityProviderInstance;
pub use poller::ChainPoller;
