// src/config/mod.rs

//! Pipeline file loading and validation.

pub mod duration;
pub mod loader;
pub mod model;
pub mod validate;

pub use duration::{DurationSpec, parse_duration};
pub use loader::{default_config_path, load_and_validate, load_from_path, load_from_str};
pub use model::{
    ConfigFile, ConnectionConfig, CreateTablesConfig, CredentialsConfig, DataQualityConfig,
    LoadDimensionConfig, LoadFactConfig, NoopConfig, OperatorConfig, PipelineSection,
    RawConfigFile, StageConfig, TaskConfig,
};
