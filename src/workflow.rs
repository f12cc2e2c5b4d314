use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use tracing::{info, warn};

use crate::chain::PromptChain;
use crate::error::WorkflowError;
use crate::prompts;

/// Gated stages of the wizard, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Analysis,
    UserStory,
    CodeGeneration,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Analysis, Stage::UserStory, Stage::CodeGeneration];

    pub fn predecessor(self) -> Option<Stage> {
        match self {
            Stage::Analysis => None,
            Stage::UserStory => Some(Stage::Analysis),
            Stage::CodeGeneration => Some(Stage::UserStory),
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Stage::Analysis => "Issue analysis",
            Stage::UserStory => "User story task definition",
            Stage::CodeGeneration => "Code generation",
        }
    }

    /// Status line shown while the stage runs.
    pub fn running_label(self) -> &'static str {
        match self {
            Stage::Analysis => "Analysing issue report...",
            Stage::UserStory => "Generating task definition...",
            Stage::CodeGeneration => "Generating Python function...",
        }
    }

    pub fn done_label(self) -> &'static str {
        match self {
            Stage::Analysis => "Issue report analysis complete.",
            Stage::UserStory => "Task definition generation complete.",
            Stage::CodeGeneration => "Python function generation complete.",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Analysis => "analysis",
            Stage::UserStory => "user_story",
            Stage::CodeGeneration => "code_generation",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    NotStarted,
    AnalysisDone,
    UserStoryDone,
    CodeGenDone,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    pub done: bool,
    pub result: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub enum WorkflowEvent<'a> {
    Started(Stage),
    Finished { stage: Stage, output: Option<&'a str> },
    Failed { stage: Stage, error: &'a str },
}

/// Receives stage progress; console and browser front-ends implement it.
pub trait Presenter {
    fn on_event(&mut self, event: WorkflowEvent<'_>);
}

/// Presenter that drops every event.
pub struct Silent;

impl Presenter for Silent {
    fn on_event(&mut self, _event: WorkflowEvent<'_>) {}
}

/// Per-session stage flags and results.
#[derive(Debug, Clone)]
pub struct Workflow {
    analysis: String,
    steps: BTreeMap<Stage, StepRecord>,
}

impl Workflow {
    pub fn new(analysis: impl Into<String>) -> Self {
        Self {
            analysis: analysis.into(),
            steps: Stage::ALL.iter().map(|s| (*s, StepRecord::default())).collect(),
        }
    }

    pub fn step(&self, stage: Stage) -> &StepRecord {
        // Every stage is inserted by `new`.
        &self.steps[&stage]
    }

    pub fn steps(&self) -> &BTreeMap<Stage, StepRecord> {
        &self.steps
    }

    pub fn state(&self) -> WorkflowState {
        if self.step(Stage::CodeGeneration).done {
            WorkflowState::CodeGenDone
        } else if self.step(Stage::UserStory).done {
            WorkflowState::UserStoryDone
        } else if self.step(Stage::Analysis).done {
            WorkflowState::AnalysisDone
        } else {
            WorkflowState::NotStarted
        }
    }

    /// Whether `stage` may be triggered now.
    pub fn check_ready(&self, stage: Stage) -> Result<(), WorkflowError> {
        if self.step(stage).done {
            return Err(WorkflowError::AlreadyDone(stage));
        }
        match stage.predecessor() {
            Some(requires) if !self.step(requires).done => {
                Err(WorkflowError::StageLocked { stage, requires })
            }
            _ => Ok(()),
        }
    }

    /// Publishes the analysis once per session; later calls are no-ops.
    pub fn ensure_analysis<P: Presenter + ?Sized>(&mut self, presenter: &mut P) -> &str {
        if !self.step(Stage::Analysis).done {
            presenter.on_event(WorkflowEvent::Started(Stage::Analysis));
            let analysis = self.analysis.clone();
            self.complete(Stage::Analysis, analysis);
            presenter.on_event(WorkflowEvent::Finished {
                stage: Stage::Analysis,
                output: Some(&self.analysis),
            });
        }
        &self.analysis
    }

    pub async fn define_user_story<P: Presenter + ?Sized>(
        &mut self,
        chain: &mut PromptChain,
        presenter: &mut P,
    ) -> Result<String, WorkflowError> {
        self.check_ready(Stage::UserStory)?;
        let input = prompts::user_story_instruction(&self.analysis);
        self.run_model_stage(Stage::UserStory, input, chain, presenter).await
    }

    pub async fn generate_code<P: Presenter + ?Sized>(
        &mut self,
        chain: &mut PromptChain,
        presenter: &mut P,
    ) -> Result<String, WorkflowError> {
        self.check_ready(Stage::CodeGeneration)?;
        let task_definition = self
            .step(Stage::UserStory)
            .result
            .clone()
            .unwrap_or_default();
        let input = prompts::code_generation_instruction(&task_definition);
        self.run_model_stage(Stage::CodeGeneration, input, chain, presenter).await
    }

    async fn run_model_stage<P: Presenter + ?Sized>(
        &mut self,
        stage: Stage,
        input: String,
        chain: &mut PromptChain,
        presenter: &mut P,
    ) -> Result<String, WorkflowError> {
        info!(%stage, "Running stage");
        presenter.on_event(WorkflowEvent::Started(stage));

        match chain.respond(&input).await {
            Ok(reply) => {
                self.complete(stage, reply.clone());
                presenter.on_event(WorkflowEvent::Finished {
                    stage,
                    output: Some(&reply),
                });
                Ok(reply)
            }
            Err(source) => {
                warn!(%stage, error = %source, "Stage failed");
                presenter.on_event(WorkflowEvent::Failed {
                    stage,
                    error: &source.to_string(),
                });
                Err(WorkflowError::Completion { stage, source })
            }
        }
    }

    fn complete(&mut self, stage: Stage, result: String) {
        let record = self.steps.entry(stage).or_default();
        record.done = true;
        record.result = Some(result);
    }
}

/// Contents of the first `<function>...</function>` block of a reply, trimmed.
pub fn extract_function(reply: &str) -> Option<&str> {
    const OPEN: &str = "<function>";
    const CLOSE: &str = "</function>";

    let start = reply.find(OPEN)? + OPEN.len();
    let end = start + reply[start..].find(CLOSE)?;
    let body = reply[start..end].trim();
    // Models often fence the code inside the tags as well.
    let body = body
        .strip_prefix("```python")
        .or_else(|| body.strip_prefix("```"))
        .and_then(|inner| inner.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(body);
    Some(body)
}
