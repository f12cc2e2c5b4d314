pub mod chain;
pub mod console;
pub mod constants;
pub mod error;
pub mod llm;
pub mod prompts;
pub mod script;
pub mod session;
pub mod template;
pub mod transcript;
pub mod web_server;
pub mod workflow;

pub use chain::PromptChain;
pub use error::{ChainError, WorkflowError};
pub use llm::{build_client, CompletionClient, LlmSettings, Provider};
pub use template::PromptTemplate;
pub use workflow::{Presenter, Stage, Workflow, WorkflowEvent, WorkflowState};
