// src/operator/stage.rs

//! `COPY` from object storage into a staging table.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Timelike, Utc};
use tracing::{debug, info};

use super::{Operator, OperatorContext, OperatorFuture, Warehouse, sql_literal};
use crate::config::CredentialsConfig;
use crate::errors::OperatorError;
use crate::types::FileFormat;

#[derive(Debug, Clone, PartialEq, Eq)]
enum KeySegment {
    Literal(String),
    Ds,
    Year,
    Month,
    Day,
    Hour,
}

/// A source key with `{ds}`, `{year}`, `{month}`, `{day}` and `{hour}`
/// placeholders filled from the run's logical time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyTemplate {
    segments: Vec<KeySegment>,
}

impl KeyTemplate {
    pub fn parse(template: &str) -> Result<Self, OperatorError> {
        let mut segments = Vec::new();
        let mut rest = template;

        while let Some(open) = rest.find('{') {
            if open > 0 {
                segments.push(KeySegment::Literal(rest[..open].to_string()));
            }
            let after = &rest[open + 1..];
            let close = after.find('}').ok_or_else(|| {
                OperatorError::new(format!("unterminated placeholder in source key '{template}'"))
            })?;
            let segment = match &after[..close] {
                "ds" => KeySegment::Ds,
                "year" => KeySegment::Year,
                "month" => KeySegment::Month,
                "day" => KeySegment::Day,
                "hour" => KeySegment::Hour,
                other => {
                    return Err(OperatorError::new(format!(
                        "unknown placeholder '{{{other}}}' in source key '{template}'"
                    )));
                }
            };
            segments.push(segment);
            rest = &after[close + 1..];
        }
        if !rest.is_empty() {
            segments.push(KeySegment::Literal(rest.to_string()));
        }

        Ok(Self { segments })
    }

    pub fn render(&self, logical_time: DateTime<Utc>) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                KeySegment::Literal(s) => out.push_str(s),
                KeySegment::Ds => out.push_str(&logical_time.format("%Y-%m-%d").to_string()),
                KeySegment::Year => out.push_str(&format!("{:04}", logical_time.year())),
                KeySegment::Month => out.push_str(&format!("{:02}", logical_time.month())),
                KeySegment::Day => out.push_str(&format!("{:02}", logical_time.day())),
                KeySegment::Hour => out.push_str(&format!("{:02}", logical_time.hour())),
            }
        }
        out
    }
}

/// Static parameters of a staging load.
#[derive(Debug, Clone)]
pub struct StageSpec {
    pub table: String,
    pub bucket: String,
    pub key: KeyTemplate,
    pub region: String,
    pub format: FileFormat,
    /// JSONPaths file for `FORMAT AS JSON`; `auto` when absent.
    pub json_paths: Option<String>,
}

/// Copies files from `s3://<bucket>/<key>` into a staging table.
pub struct StageToWarehouseOperator {
    warehouse: Arc<dyn Warehouse>,
    spec: StageSpec,
    credentials: Option<CredentialsConfig>,
}

impl StageToWarehouseOperator {
    pub fn new(
        warehouse: Arc<dyn Warehouse>,
        spec: StageSpec,
        credentials: Option<CredentialsConfig>,
    ) -> Self {
        Self {
            warehouse,
            spec,
            credentials,
        }
    }

    /// Resolve the access key pair from the environment.
    fn resolve_credentials(&self) -> Result<Option<(String, String)>, OperatorError> {
        let Some(creds) = &self.credentials else {
            return Ok(None);
        };
        let read = |var: &str| {
            std::env::var(var).map_err(|_| {
                OperatorError::new(format!("credential environment variable '{var}' is not set"))
            })
        };
        Ok(Some((read(&creds.access_key_env)?, read(&creds.secret_key_env)?)))
    }

    /// Render the `COPY` statement. `credentials` are inlined verbatim; pass
    /// placeholders to obtain a loggable form.
    pub fn render_copy(
        &self,
        logical_time: DateTime<Utc>,
        credentials: Option<(&str, &str)>,
    ) -> String {
        let spec = &self.spec;
        let mut sql = format!(
            "COPY {} FROM 's3://{}/{}'",
            spec.table,
            sql_literal(&spec.bucket),
            sql_literal(&spec.key.render(logical_time)),
        );
        if let Some((access, secret)) = credentials {
            sql.push_str(&format!(
                " ACCESS_KEY_ID '{}' SECRET_ACCESS_KEY '{}'",
                sql_literal(access),
                sql_literal(secret)
            ));
        }
        sql.push_str(&format!(" REGION '{}'", sql_literal(&spec.region)));
        match spec.format {
            FileFormat::Json => {
                let paths = spec.json_paths.as_deref().unwrap_or("auto");
                sql.push_str(&format!(" FORMAT AS JSON '{}'", sql_literal(paths)));
            }
            other => sql.push_str(&format!(" FORMAT AS {other}")),
        }
        sql
    }
}

impl Operator for StageToWarehouseOperator {
    fn kind(&self) -> &'static str {
        "stage_to_warehouse"
    }

    fn execute<'a>(&'a self, ctx: &'a OperatorContext) -> OperatorFuture<'a> {
        Box::pin(async move {
            let resolved = self.resolve_credentials()?;
            let redacted = self.render_copy(
                ctx.logical_time,
                resolved.as_ref().map(|_| ("***", "***")),
            );
            info!(
                task = %ctx.task_id,
                run_id = ctx.run_id,
                table = %self.spec.table,
                "staging from object storage"
            );
            debug!(task = %ctx.task_id, sql = %redacted, "COPY statement");

            let sql = self.render_copy(
                ctx.logical_time,
                resolved.as_ref().map(|(a, s)| (a.as_str(), s.as_str())),
            );
            self.warehouse.execute(&sql).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    use crate::operator::warehouse::WarehouseFuture;

    struct Unused;

    impl Warehouse for Unused {
        fn execute<'a>(&'a self, _sql: &'a str) -> WarehouseFuture<'a, ()> {
            Box::pin(async { Ok(()) })
        }
        fn query_count<'a>(&'a self, _sql: &'a str) -> WarehouseFuture<'a, u64> {
            Box::pin(async { Ok(0) })
        }
    }

    fn op(key: &str, format: FileFormat, json_paths: Option<&str>) -> StageToWarehouseOperator {
        StageToWarehouseOperator::new(
            Arc::new(Unused),
            StageSpec {
                table: "staging_events".into(),
                bucket: "udacity-dend".into(),
                key: KeyTemplate::parse(key).unwrap(),
                region: "ap-southeast-1".into(),
                format,
                json_paths: json_paths.map(str::to_string),
            },
            None,
        )
    }

    #[test]
    fn key_template_renders_logical_time() {
        let t = Utc.with_ymd_and_hms(2018, 11, 3, 7, 0, 0).unwrap();
        let tpl = KeyTemplate::parse("log_data/{year}/{month}/{ds}-{hour}.json").unwrap();
        assert_eq!(tpl.render(t), "log_data/2018/11/2018-11-03-07.json");

        assert_eq!(KeyTemplate::parse("song_data").unwrap().render(t), "song_data");
        assert!(KeyTemplate::parse("x/{minute}").is_err());
        assert!(KeyTemplate::parse("x/{year").is_err());
    }

    #[test]
    fn copy_statement_covers_formats_and_credentials() {
        let t = Utc.with_ymd_and_hms(2018, 5, 1, 0, 0, 0).unwrap();

        let json = op("log_data", FileFormat::Json, None);
        assert_eq!(
            json.render_copy(t, Some(("AK", "SK"))),
            "COPY staging_events FROM 's3://udacity-dend/log_data' \
             ACCESS_KEY_ID 'AK' SECRET_ACCESS_KEY 'SK' \
             REGION 'ap-southeast-1' FORMAT AS JSON 'auto'"
        );

        let paths = op("log_data", FileFormat::Json, Some("s3://udacity-dend/log_json_path.json"));
        assert!(
            paths
                .render_copy(t, None)
                .ends_with("FORMAT AS JSON 's3://udacity-dend/log_json_path.json'")
        );

        let csv = op("csv/{ds}", FileFormat::Csv, None);
        assert_eq!(
            csv.render_copy(t, None),
            "COPY staging_events FROM 's3://udacity-dend/csv/2018-05-01' \
             REGION 'ap-southeast-1' FORMAT AS CSV"
        );
    }
}
