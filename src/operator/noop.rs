// src/operator/noop.rs

use tracing::debug;

use super::{Operator, OperatorContext, OperatorFuture};

/// Does nothing and always succeeds. Used for the begin/end markers.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopOperator;

impl Operator for NoopOperator {
    fn kind(&self) -> &'static str {
        "noop"
    }

    fn execute<'a>(&'a self, ctx: &'a OperatorContext) -> OperatorFuture<'a> {
        Box::pin(async move {
            debug!(task = %ctx.task_id, run_id = ctx.run_id, "noop");
            Ok(())
        })
    }
}
