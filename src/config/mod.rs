#[allow(clippy::module_inception)]
mod config;

pub use config::{
    PollerSettings, PostgresSettings, ProviderKind, ServerSettings, Settings, SymbolSettings,
    UpstreamSettings,
};
