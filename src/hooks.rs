//! Step lifecycle entry points for the pipeline framework.
//!
//! The framework calls [`StepMetrics::task_pre_step`] before user code runs and
//! [`StepMetrics::task_finished`] after it completes. The `StepMetrics` value
//! (and with it the session's leader lease) must live for the whole task.

use crate::clienv;
use crate::metrics::Registry;
use crate::session::{Session, SessionOptions, SessionSettings};
use crate::shutdown;
use crate::user_config::MeasureConfig;
use tracing::debug;

/// Execution metadata identifying the running step.
#[derive(Debug, Clone, Default)]
pub struct StepContext {
    pub flow_name: String,
    pub run_id: String,
    pub step_name: String,
    pub task_id: String,
    pub username: String,
    pub project: Option<ProjectContext>,
}

#[derive(Debug, Clone, Default)]
pub struct ProjectContext {
    pub name: String,
    pub branch: String,
    pub is_production: bool,
}

/// Tags identifying where a metric came from.
pub fn identity_tags(ctx: &StepContext, runtime: &str) -> Vec<String> {
    let mut tags = vec![
        format!("metaflow_runtime:{runtime}"),
        format!("metaflow_flow:{}", ctx.flow_name),
        format!("metaflow_runid:{}", ctx.run_id),
        format!("metaflow_step:{}", ctx.step_name),
        format!("metaflow_user:{}", ctx.username),
    ];
    if let Some(project) = ctx.project.as_ref().filter(|p| !p.name.is_empty()) {
        tags.push(format!("metaflow_project:{}", project.name));
        tags.push(format!("metaflow_branch:{}", project.branch));
        if project.is_production {
            tags.push("metaflow_production".to_string());
        }
    }
    tags
}

pub struct StepMetrics {
    config: MeasureConfig,
    settings: SessionSettings,
    session: Option<Session>,
}

impl StepMetrics {
    pub fn new(config: MeasureConfig, settings: SessionSettings) -> Self {
        Self {
            config,
            settings,
            session: None,
        }
    }

    pub fn constant_tags(&self, ctx: &StepContext) -> Vec<String> {
        let mut tags = self.config.tags.clone();
        if self.config.include_identity_tags {
            tags.extend(identity_tags(ctx, &clienv::runtime_name()));
        }
        tags
    }

    /// Join or start the shared daemon for this step.
    pub async fn task_pre_step(&mut self, ctx: &StepContext, registry: &Registry) -> &Session {
        debug!(
            flow = %ctx.flow_name,
            run_id = %ctx.run_id,
            step = %ctx.step_name,
            task_id = %ctx.task_id,
            "Step starting"
        );
        let options = SessionOptions::from_config(&self.config, self.constant_tags(ctx));
        let session = Session::start(options, &self.settings, registry).await;
        self.session.insert(session)
    }

    /// Flush and, in disposable containers, give the daemon time to forward.
    /// Returns whether it waited.
    pub async fn task_finished(&self, is_task_ok: bool, retry_count: u32, registry: &Registry) -> bool {
        debug!(is_task_ok, retry_count, "Step finished");
        shutdown::flush_and_wait(
            registry,
            self.config.flush_grace(),
            clienv::is_disposable_container(),
        )
        .await
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }
}
