pub mod builders;
pub mod fake_operator;
pub mod memory_warehouse;

use std::sync::Once;
use std::time::Duration;

use tracing_subscriber::{EnvFilter, fmt};

pub use builders::{ConfigFileBuilder, TaskConfigBuilder, sparkify_edges, sparkify_graph};
pub use fake_operator::{ConcurrencyGauge, DispatchLog, DispatchRecord, Script, ScriptedOperator};
pub use memory_warehouse::MemoryWarehouse;

static INIT: Once = Once::new();

/// Install a test subscriber once per test binary.
///
/// The filter comes from `PIPEDAG_LOG` (same variable the binary reads) and
/// defaults to `info`. Output goes through `with_test_writer()`, so it only
/// shows up for failing tests unless `--nocapture` is passed.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env(pipedag::logging::LOG_ENV_VAR)
            .unwrap_or_else(|_| EnvFilter::new("info"));

        let _ = fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .try_init();
    });
}

/// Await `f`, panicking if it takes longer than five seconds.
///
/// Under a paused clock Tokio auto-advances time, so any test that sleeps
/// through retry delays must not be wrapped in this.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(Duration::from_secs(5), f)
        .await
        .expect("test timed out after 5 seconds")
}
