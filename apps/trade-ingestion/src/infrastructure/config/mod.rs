//! Configuration Module
//!
//! Configuration loading for the ingestion service.

mod settings;

pub use settings::{
    BackoffKind, BackoffSettings, BusBackend, BusSettings, ConfigError, DEFAULT_SYMBOLS,
    IngestionConfig, ServerSettings,
};
