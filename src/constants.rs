// Defaults for the completion providers, overridable from the environment
// (or a .env file) and then from the command line.

use std::env;
use std::time::Duration;

lazy_static::lazy_static! {
    pub static ref OPENAI_API_BASE: String = env::var("OPENAI_API_BASE").unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
    pub static ref OPENAI_API_KEY: String = env::var("OPENAI_API_KEY").unwrap_or_default();
    pub static ref TASKFORGE_MODEL: String = env::var("TASKFORGE_MODEL").unwrap_or_else(|_| "gpt-4o".to_string());
    pub static ref OLLAMA_URL: String = env::var("OLLAMA_URL").unwrap_or_else(|_| "http://127.0.0.1:11434".to_string());
    pub static ref OLLAMA_MODEL: String = env::var("OLLAMA_MODEL").unwrap_or_else(|_| "gemma3:12b".to_string());
}

/// Prefix some models put in front of their replies after seeing it in the transcript.
pub const ASSISTANT_MARKER: &str = "Assistant:";

/// Simulated latency of the non-model stages in the linear script.
pub const DEFAULT_STAGE_DELAY_MS: u64 = 3000;

pub const DEFAULT_PORT: u16 = 9900;
pub const DEFAULT_TEMPLATES_DIR: &str = "templates";
pub const DEFAULT_STATIC_DIR: &str = "static";

/// Upper bound on live wizard sessions; the least recently used is evicted past it.
pub const MAX_SESSIONS: usize = 1000;
pub const SESSION_IDLE_TTL: Duration = Duration::from_secs(60 * 60);
