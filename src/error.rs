use std::path::PathBuf;

use thiserror::Error;

use crate::workflow::Stage;

/// Failures of a single prompt round-trip.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("failed to reach completion endpoint {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("completion endpoint returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("malformed completion response: {0}")]
    Decode(String),
    #[error("completion response contained no reply")]
    EmptyReply,
    #[error("prompt template is missing the `{0}` placeholder")]
    MissingPlaceholder(&'static str),
    #[error("prompt template error: {0}")]
    Template(#[from] minijinja::Error),
    #[error("failed to read prompt template {path}: {source}")]
    TemplateIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("stage `{stage}` cannot run before `{requires}` has completed")]
    StageLocked { stage: Stage, requires: Stage },
    #[error("stage `{0}` has already completed")]
    AlreadyDone(Stage),
    #[error("stage `{stage}` failed")]
    Completion {
        stage: Stage,
        #[source]
        source: ChainError,
    },
}
