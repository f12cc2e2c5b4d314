use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::chain::PromptChain;
use crate::constants::{MAX_SESSIONS, SESSION_IDLE_TTL};
use crate::llm::CompletionClient;
use crate::template::PromptTemplate;
use crate::workflow::{Stage, StepRecord, Workflow, WorkflowState};

/// One wizard run: its own conversation and its own stage flags.
pub struct Session {
    pub id: Uuid,
    pub workflow: Workflow,
    pub chain: PromptChain,
}

impl Session {
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            state: self.workflow.state(),
            steps: self.workflow.steps().clone(),
            turns: self.chain.transcript().len(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub state: WorkflowState,
    pub steps: BTreeMap<Stage, StepRecord>,
    pub turns: usize,
}

struct Entry {
    session: Arc<Mutex<Session>>,
    last_seen: Instant,
}

/// In-memory sessions keyed by id; gone when the process exits.
///
/// Sessions idle for longer than `idle_ttl` are dropped, and the store never
/// holds more than `max_sessions`: creating one past the cap evicts the least
/// recently used. A request already holding an evicted session finishes normally.
pub struct SessionStore {
    client: Arc<dyn CompletionClient>,
    template: PromptTemplate,
    analysis: String,
    max_sessions: usize,
    idle_ttl: Duration,
    sessions: Mutex<HashMap<Uuid, Entry>>,
}

impl SessionStore {
    pub fn new(client: Arc<dyn CompletionClient>, template: PromptTemplate, analysis: impl Into<String>) -> Self {
        Self::with_limits(client, template, analysis, MAX_SESSIONS, SESSION_IDLE_TTL)
    }

    pub fn with_limits(
        client: Arc<dyn CompletionClient>,
        template: PromptTemplate,
        analysis: impl Into<String>,
        max_sessions: usize,
        idle_ttl: Duration,
    ) -> Self {
        Self {
            client,
            template,
            analysis: analysis.into(),
            max_sessions: max_sessions.max(1),
            idle_ttl,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub async fn create(&self) -> Uuid {
        let id = Uuid::new_v4();
        let session = Session {
            id,
            workflow: Workflow::new(self.analysis.clone()),
            chain: PromptChain::new(self.client.clone(), self.template.clone()),
        };

        let mut sessions = self.sessions.lock().await;
        let now = Instant::now();
        let before = sessions.len();
        sessions.retain(|_, entry| now.duration_since(entry.last_seen) <= self.idle_ttl);
        while sessions.len() >= self.max_sessions {
            let Some(oldest) = sessions
                .iter()
                .min_by_key(|(_, entry)| entry.last_seen)
                .map(|(id, _)| *id)
            else {
                break;
            };
            sessions.remove(&oldest);
        }
        if sessions.len() < before {
            debug!(evicted = before - sessions.len(), "Evicted wizard sessions");
        }

        sessions.insert(
            id,
            Entry {
                session: Arc::new(Mutex::new(session)),
                last_seen: now,
            },
        );
        info!(%id, "Created wizard session");
        id
    }

    /// Looks a session up and marks it as recently used.
    pub async fn get(&self, id: Uuid) -> Option<Arc<Mutex<Session>>> {
        let mut sessions = self.sessions.lock().await;
        let entry = sessions.get_mut(&id)?;
        entry.last_seen = Instant::now();
        Some(entry.session.clone())
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }
}
