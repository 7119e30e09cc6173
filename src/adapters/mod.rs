//! Concrete adapter implementations for ports.

pub mod csv_adapter;
pub mod file_config_adapter;
#[cfg(feature = "llm")]
pub mod llm_advisor;
#[cfg(feature = "sqlite")]
pub mod sqlite_adapter;
pub mod static_advisor;
