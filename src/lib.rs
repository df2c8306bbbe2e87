//! upsocket kit
//!
//! The [`upsocket`] library plus the pieces a host program needs around it.
//!
//! ## Architecture
//!
//! - **upsocket**: the reconnecting connection (re-exported from workspace)
//! - **settings**: YAML + `.env` configuration for a connection
//! - **logging**: `tracing` subscriber setup
//!
//! ## Usage
//!
//! ```rust,ignore
//! use upsocket_kit::{logging, settings::UpsocketSettings, upsocket::Topic};
//!
//! logging::init_tracing();
//! let settings = UpsocketSettings::load_from_env()?;
//! let connection = settings.connect().await?;
//! connection.on(Topic::Message, |event| tracing::info!("{:?}", event));
//! ```

// Re-export workspace library for convenience
pub use upsocket;

pub mod logging;
pub mod settings;

pub use settings::{config_path_from_env, SettingsError, UpsocketSettings};
