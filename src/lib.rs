// ABOUTME: Root library module: the Discord adapter, platform event handler, and status server
// ABOUTME: Re-exports the platform-agnostic relay core from pepito-core

pub mod handler;
pub mod platform;
#[cfg(feature = "status")]
pub mod status;

// Re-export platform-agnostic modules from pepito-core
pub use pepito_core::commands;
pub use pepito_core::config;
pub use pepito_core::context;
pub use pepito_core::dispatch;
pub use pepito_core::feed;
pub use pepito_core::lifecycle;
pub use pepito_core::metrics;
pub use pepito_core::paths;
pub use pepito_core::registry;
pub use pepito_core::relay;
pub use pepito_core::traits;
pub use pepito_core::translate;

pub use pepito_core::{AppContext, ConnectionState, ReconnectPolicy, SharedRegistry};
