//! Stage log persister that writes to `tracing`.

use crate::application::ports::StageLogPersister;

/// Forwards stage progress to the process log, tagged with the stage and
/// deploy target it belongs to.
#[derive(Debug, Clone, Default)]
pub struct TracingLogPersister {
    stage: String,
    deploy_target: String,
}

impl TracingLogPersister {
    #[must_use]
    pub fn new(stage: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            deploy_target: String::new(),
        }
    }

    /// Copy of this persister scoped to one deploy target.
    #[must_use]
    pub fn for_target(&self, deploy_target: &str) -> Self {
        Self {
            stage: self.stage.clone(),
            deploy_target: deploy_target.to_string(),
        }
    }
}

impl StageLogPersister for TracingLogPersister {
    fn info(&self, message: &str) {
        tracing::info!(stage = %self.stage, deploy_target = %self.deploy_target, "{message}");
    }

    fn success(&self, message: &str) {
        tracing::info!(stage = %self.stage, deploy_target = %self.deploy_target, success = true, "{message}");
    }

    fn error(&self, message: &str) {
        tracing::error!(stage = %self.stage, deploy_target = %self.deploy_target, "{message}");
    }
}
