use std::time::Duration;

use tracing::info;

use crate::chain::PromptChain;
use crate::error::WorkflowError;
use crate::workflow::{Presenter, Stage, Workflow, WorkflowEvent};

/// How the linear script treats the task definition stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScriptMode {
    /// Task definition is only reported; one model call turns the raw
    /// analysis into the definition and the function together.
    #[default]
    SingleShot,
    /// Task definition and code generation are separate, chained model calls.
    Chained,
}

#[derive(Debug, Clone)]
pub struct ScriptOptions {
    pub mode: ScriptMode,
    /// Simulated latency for stages that make no model call.
    pub delay: Duration,
}

impl Default for ScriptOptions {
    fn default() -> Self {
        Self {
            mode: ScriptMode::default(),
            delay: Duration::from_millis(crate::constants::DEFAULT_STAGE_DELAY_MS),
        }
    }
}

/// Runs every stage unconditionally and returns the final generated output.
pub async fn run_script<P: Presenter + ?Sized>(
    chain: &mut PromptChain,
    analysis: &str,
    options: &ScriptOptions,
    presenter: &mut P,
) -> Result<String, WorkflowError> {
    info!(mode = ?options.mode, "Running linear script");

    presenter.on_event(WorkflowEvent::Started(Stage::Analysis));
    tokio::time::sleep(options.delay).await;
    presenter.on_event(WorkflowEvent::Finished {
        stage: Stage::Analysis,
        output: Some(analysis),
    });

    match options.mode {
        ScriptMode::SingleShot => {
            presenter.on_event(WorkflowEvent::Started(Stage::UserStory));
            tokio::time::sleep(options.delay).await;
            presenter.on_event(WorkflowEvent::Finished {
                stage: Stage::UserStory,
                output: None,
            });

            presenter.on_event(WorkflowEvent::Started(Stage::CodeGeneration));
            match chain.respond(analysis).await {
                Ok(reply) => {
                    presenter.on_event(WorkflowEvent::Finished {
                        stage: Stage::CodeGeneration,
                        output: Some(&reply),
                    });
                    Ok(reply)
                }
                Err(source) => {
                    presenter.on_event(WorkflowEvent::Failed {
                        stage: Stage::CodeGeneration,
                        error: &source.to_string(),
                    });
                    Err(WorkflowError::Completion {
                        stage: Stage::CodeGeneration,
                        source,
                    })
                }
            }
        }
        ScriptMode::Chained => {
            // The analysis stage was already reported above.
            let mut workflow = Workflow::new(analysis);
            workflow.ensure_analysis(&mut crate::workflow::Silent);
            workflow.define_user_story(chain, presenter).await?;
            workflow.generate_code(chain, presenter).await
        }
    }
}
