// src/operator/factory.rs

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::config::{ConfigFile, CredentialsConfig, OperatorConfig};
use crate::errors::{PipedagError, Result};
use crate::operator::stage::{KeyTemplate, StageSpec};
use crate::operator::{
    CreateTablesOperator, DataQualityOperator, LoadDimensionOperator, LoadFactOperator,
    NoopOperator, Operator, ShellWarehouse, StageToWarehouseOperator, Warehouse,
};

/// Connections and credentials operators are built against, keyed by the
/// ids used in the configuration.
#[derive(Clone, Default)]
pub struct Collaborators {
    warehouses: HashMap<String, Arc<dyn Warehouse>>,
    credentials: HashMap<String, CredentialsConfig>,
}

impl Collaborators {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shell-backed warehouses for every `[connections.<id>]` plus the
    /// declared credentials.
    pub fn from_config(cfg: &ConfigFile) -> Self {
        let mut collaborators = Self::new();
        for (id, conn) in &cfg.connections {
            let warehouse = ShellWarehouse::new(id.clone(), conn.command.clone());
            collaborators = collaborators.with_warehouse(id.clone(), Arc::new(warehouse));
        }
        for (id, creds) in &cfg.credentials {
            collaborators = collaborators.with_credentials(id.clone(), creds.clone());
        }
        collaborators
    }

    pub fn with_warehouse(mut self, id: impl Into<String>, warehouse: Arc<dyn Warehouse>) -> Self {
        self.warehouses.insert(id.into(), warehouse);
        self
    }

    pub fn with_credentials(mut self, id: impl Into<String>, creds: CredentialsConfig) -> Self {
        self.credentials.insert(id.into(), creds);
        self
    }

    pub fn warehouse(&self, id: &str) -> Option<Arc<dyn Warehouse>> {
        self.warehouses.get(id).cloned()
    }

    pub fn credentials(&self, id: &str) -> Option<&CredentialsConfig> {
        self.credentials.get(id)
    }
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut warehouses: Vec<_> = self.warehouses.keys().collect();
        warehouses.sort();
        f.debug_struct("Collaborators")
            .field("warehouses", &warehouses)
            .field("credentials", &self.credentials)
            .finish()
    }
}

/// Build the operator for task `task_id` from its configuration.
pub fn build_operator(
    task_id: &str,
    config: &OperatorConfig,
    collaborators: &Collaborators,
) -> Result<Arc<dyn Operator>> {
    let warehouse = |conn: &str| {
        collaborators.warehouse(conn).ok_or_else(|| {
            PipedagError::ConfigError(format!(
                "task '{task_id}' references unknown connection '{conn}'"
            ))
        })
    };

    let op: Arc<dyn Operator> = match config {
        OperatorConfig::Noop(_) => Arc::new(NoopOperator),
        OperatorConfig::CreateTables(c) => Arc::new(CreateTablesOperator::new(
            warehouse(&c.connection_id)?,
            c.sql_text.clone(),
        )),
        OperatorConfig::StageToWarehouse(c) => {
            let credentials = match &c.credentials_id {
                Some(id) => Some(collaborators.credentials(id).cloned().ok_or_else(|| {
                    PipedagError::ConfigError(format!(
                        "task '{task_id}' references unknown credentials '{id}'"
                    ))
                })?),
                None => None,
            };
            let key = KeyTemplate::parse(&c.source_key)
                .map_err(|e| PipedagError::ConfigError(format!("task '{task_id}': {e}")))?;
            let spec = StageSpec {
                table: c.table.clone(),
                bucket: c.source_bucket.clone(),
                key,
                region: c.region.clone(),
                format: c.file_format,
                json_paths: c.json_paths.clone(),
            };
            Arc::new(StageToWarehouseOperator::new(
                warehouse(&c.connection_id)?,
                spec,
                credentials,
            ))
        }
        OperatorConfig::LoadFact(c) => Arc::new(LoadFactOperator::new(
            warehouse(&c.connection_id)?,
            c.table.clone(),
            c.sql_text.clone(),
        )),
        OperatorConfig::LoadDimension(c) => Arc::new(LoadDimensionOperator::new(
            warehouse(&c.connection_id)?,
            c.table.clone(),
            c.sql_text.clone(),
            c.truncate,
        )),
        OperatorConfig::DataQuality(c) => Arc::new(DataQualityOperator::new(
            warehouse(&c.connection_id)?,
            c.tables.clone(),
            c.min_rows,
        )),
    };

    Ok(op)
}
