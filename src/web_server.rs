use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path as UrlPath, State,
    },
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    serve, Json, Router,
};
use futures::{sink::SinkExt, stream::StreamExt};
use minijinja::{path_loader, Environment};
use minijinja_autoreload::AutoReloader;
use pulldown_cmark::{html, CowStr, Event, Options, Parser, Tag};
use serde::Serialize;
use tokio::sync::broadcast;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::WorkflowError;
use crate::session::{Session, SessionStore};
use crate::workflow::{extract_function, Presenter, Stage, WorkflowEvent};

/// Stage progress pushed to the browser over `/ws/{id}`.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct BroadcastMessage {
    pub session_id: Uuid,
    pub message_type: String,
    pub payload: serde_json::Value,
}

#[derive(Clone)]
pub struct AppState {
    templates: Arc<AutoReloader>,
    sessions: Arc<SessionStore>,
    // Channel for broadcasting stage events to every connected WebSocket client
    broadcast_tx: broadcast::Sender<BroadcastMessage>,
}

impl AppState {
    pub fn new(sessions: SessionStore, templates_dir: PathBuf) -> Self {
        let (broadcast_tx, _) = broadcast::channel::<BroadcastMessage>(100);
        Self {
            templates: Arc::new(create_minijinja_env(templates_dir)),
            sessions: Arc::new(sessions),
            broadcast_tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastMessage> {
        self.broadcast_tx.subscribe()
    }
}

#[derive(Debug, Clone)]
pub struct WebConfig {
    pub port: u16,
    pub templates_dir: PathBuf,
    pub static_dir: PathBuf,
}

/// Forwards one session's workflow events to the broadcast channel.
struct BroadcastPresenter {
    session_id: Uuid,
    tx: broadcast::Sender<BroadcastMessage>,
}

impl Presenter for BroadcastPresenter {
    fn on_event(&mut self, event: WorkflowEvent<'_>) {
        let (message_type, payload) = match event {
            WorkflowEvent::Started(stage) => (
                "StageStarted",
                serde_json::json!({ "stage": stage, "label": stage.running_label() }),
            ),
            WorkflowEvent::Finished { stage, .. } => (
                "StageFinished",
                serde_json::json!({ "stage": stage, "label": stage.done_label() }),
            ),
            WorkflowEvent::Failed { stage, error } => (
                "StageFailed",
                serde_json::json!({ "stage": stage, "error": error }),
            ),
        };
        let message = BroadcastMessage {
            session_id: self.session_id,
            message_type: message_type.to_string(),
            payload,
        };
        // No subscribers is fine; nobody is watching this session.
        let _ = self.tx.send(message);
    }
}

fn create_minijinja_env(templates_dir: PathBuf) -> AutoReloader {
    AutoReloader::new(move |notifier| {
        let mut env = Environment::new();
        env.set_loader(path_loader(&templates_dir));
        notifier.watch_path(&templates_dir, true);
        Ok(env)
    })
}

/// Markdown to HTML with raw HTML from the model shown as text and
/// link/image targets limited to http(s), mailto and relative URLs.
pub fn markdown_to_html(markdown: &str) -> String {
    let parser = Parser::new_ext(markdown, Options::ENABLE_TABLES).map(|event| match event {
        Event::Html(raw) => Event::Text(raw),
        Event::Start(Tag::Link(kind, dest, title)) => Event::Start(Tag::Link(kind, safe_url(dest), title)),
        Event::End(Tag::Link(kind, dest, title)) => Event::End(Tag::Link(kind, safe_url(dest), title)),
        Event::Start(Tag::Image(kind, dest, title)) => Event::Start(Tag::Image(kind, safe_url(dest), title)),
        Event::End(Tag::Image(kind, dest, title)) => Event::End(Tag::Image(kind, safe_url(dest), title)),
        other => other,
    });
    let mut out = String::new();
    html::push_html(&mut out, parser);
    out
}

fn safe_url(dest: CowStr<'_>) -> CowStr<'_> {
    // Browsers ignore tabs and newlines inside a scheme, so strip them before looking.
    let normalized: String = dest
        .chars()
        .filter(|c| !c.is_ascii_whitespace() && !c.is_ascii_control())
        .collect::<String>()
        .to_ascii_lowercase();
    let scheme = normalized
        .split_once(':')
        .map(|(scheme, _)| scheme)
        .filter(|scheme| !scheme.contains(['/', '?', '#']));
    match scheme {
        None | Some("http") | Some("https") | Some("mailto") => dest,
        Some(_) => CowStr::Borrowed("#"),
    }
}

#[derive(Serialize)]
struct StageView {
    id: String,
    title: &'static str,
    done: bool,
    html: Option<String>,
    code: Option<String>,
    action: Option<&'static str>,
    enabled: bool,
}

fn stage_views(session: &Session) -> Vec<StageView> {
    Stage::ALL
        .iter()
        .map(|&stage| {
            let record = session.workflow.step(stage);
            let action = match stage {
                Stage::Analysis => None,
                Stage::UserStory => Some("user-story"),
                Stage::CodeGeneration => Some("code"),
            };
            StageView {
                id: stage.to_string(),
                title: stage.title(),
                done: record.done,
                html: record.result.as_deref().map(markdown_to_html),
                code: match stage {
                    Stage::CodeGeneration => record
                        .result
                        .as_deref()
                        .and_then(extract_function)
                        .map(str::to_string),
                    _ => None,
                },
                action,
                enabled: session.workflow.check_ready(stage).is_ok(),
            }
        })
        .collect()
}

fn render_template(state: &AppState, name: &str, context: minijinja::Value) -> Result<Html<String>, Html<String>> {
    state
        .templates
        .acquire_env()
        .and_then(|env| env.get_template(name).and_then(|tmpl| tmpl.render(context)))
        .map(Html)
        .map_err(|e| {
            error!("Failed to get or render template {}: {}", name, e);
            Html(format!("Internal Server Error: {}", e))
        })
}

fn render_session(state: &AppState, session: &Session, status: StatusCode, error: Option<String>) -> Response {
    let context = minijinja::context! {
        title => "Taskforge",
        session_id => session.id.to_string(),
        state => session.workflow.state(),
        stages => stage_views(session),
        error => error,
    };
    match render_template(state, "wizard.html", context) {
        Ok(page) => (status, page).into_response(),
        Err(page) => (StatusCode::INTERNAL_SERVER_ERROR, page).into_response(),
    }
}

fn not_found(state: &AppState, id: Uuid) -> Response {
    let context = minijinja::context! {
        title => "Taskforge",
        message => format!("Unknown session {}", id),
    };
    match render_template(state, "error.html", context) {
        Ok(page) => (StatusCode::NOT_FOUND, page).into_response(),
        Err(page) => (StatusCode::INTERNAL_SERVER_ERROR, page).into_response(),
    }
}

async fn index_handler(State(state): State<AppState>) -> Redirect {
    let id = state.sessions.create().await;
    Redirect::to(&format!("/sessions/{}", id))
}

async fn session_page(State(state): State<AppState>, UrlPath(id): UrlPath<Uuid>) -> Response {
    let Some(session) = state.sessions.get(id).await else {
        return not_found(&state, id);
    };
    let mut session = session.lock().await;
    let mut presenter = BroadcastPresenter {
        session_id: id,
        tx: state.broadcast_tx.clone(),
    };
    session.workflow.ensure_analysis(&mut presenter);
    render_session(&state, &session, StatusCode::OK, None)
}

async fn session_state(State(state): State<AppState>, UrlPath(id): UrlPath<Uuid>) -> Response {
    match state.sessions.get(id).await {
        Some(session) => Json(session.lock().await.snapshot()).into_response(),
        None => (StatusCode::NOT_FOUND, Json(serde_json::json!({ "error": "unknown session" }))).into_response(),
    }
}

/// Stages a browser can trigger; the analysis runs on its own when the page loads.
#[derive(Debug, Clone, Copy)]
enum Trigger {
    UserStory,
    Code,
}

impl Trigger {
    fn stage(self) -> Stage {
        match self {
            Trigger::UserStory => Stage::UserStory,
            Trigger::Code => Stage::CodeGeneration,
        }
    }
}

async fn trigger_user_story(State(state): State<AppState>, UrlPath(id): UrlPath<Uuid>) -> Response {
    trigger_stage(state, id, Trigger::UserStory).await
}

async fn trigger_code(State(state): State<AppState>, UrlPath(id): UrlPath<Uuid>) -> Response {
    trigger_stage(state, id, Trigger::Code).await
}

async fn trigger_stage(state: AppState, id: Uuid, trigger: Trigger) -> Response {
    let stage = trigger.stage();
    let Some(session) = state.sessions.get(id).await else {
        return not_found(&state, id);
    };
    // Held for the whole stage, so a session never has two calls in flight.
    let mut guard = session.lock().await;
    let mut presenter = BroadcastPresenter {
        session_id: id,
        tx: state.broadcast_tx.clone(),
    };

    let Session { workflow, chain, .. } = &mut *guard;
    let result = match trigger {
        Trigger::UserStory => workflow.define_user_story(chain, &mut presenter).await,
        Trigger::Code => workflow.generate_code(chain, &mut presenter).await,
    };

    match result {
        Ok(_) => Redirect::to(&format!("/sessions/{}", id)).into_response(),
        Err(e @ (WorkflowError::StageLocked { .. } | WorkflowError::AlreadyDone(_))) => {
            warn!(%id, %stage, "Rejected stage trigger: {}", e);
            render_session(&state, &guard, StatusCode::CONFLICT, Some(e.to_string()))
        }
        Err(WorkflowError::Completion { source, .. }) => {
            error!(%id, %stage, "Stage failed: {}", source);
            let message = format!("{} failed: {}", stage.title(), source);
            render_session(&state, &guard, StatusCode::BAD_GATEWAY, Some(message))
        }
    }
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    UrlPath(id): UrlPath<Uuid>,
) -> impl IntoResponse {
    info!(%id, "WebSocket connection upgrade requested");
    ws.on_upgrade(move |socket| handle_socket(socket, state, id))
}

async fn handle_socket(socket: WebSocket, state: AppState, session_id: Uuid) {
    let mut broadcast_rx = state.broadcast_tx.subscribe();
    let (mut sender, mut receiver) = socket.split();

    let welcome = BroadcastMessage {
        session_id,
        message_type: "Info".to_string(),
        payload: serde_json::json!({ "message": "Connected to Taskforge" }),
    };
    if let Ok(json_msg) = serde_json::to_string(&welcome) {
        if sender.send(Message::Text(json_msg)).await.is_err() {
            warn!("Failed to send welcome message to new WebSocket client");
            return;
        }
    }

    loop {
        tokio::select! {
            msg = broadcast_rx.recv() => match msg {
                Ok(msg) if msg.session_id == session_id => {
                    let Ok(json_msg) = serde_json::to_string(&msg) else {
                        error!("Failed to serialize broadcast message");
                        continue;
                    };
                    if sender.send(Message::Text(json_msg)).await.is_err() {
                        warn!("WebSocket client disconnected or send error. Closing connection.");
                        break;
                    }
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "WebSocket client lagged behind stage events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => {
                    info!("WebSocket client disconnected");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("WebSocket receive error: {}", e);
                    break;
                }
            },
        }
    }
    info!(%session_id, "WebSocket connection closed");
}

pub fn router(state: AppState, static_dir: &Path) -> Router {
    let static_files_service = ServeDir::new(static_dir).not_found_service(tower::service_fn(
        |_req: axum::extract::Request| async {
            Ok::<_, std::convert::Infallible>((StatusCode::NOT_FOUND, "Not Found").into_response())
        },
    ));

    Router::new()
        .route("/", get(index_handler))
        .route("/sessions/:id", get(session_page))
        .route("/sessions/:id/state", get(session_state))
        .route("/sessions/:id/user-story", post(trigger_user_story))
        .route("/sessions/:id/code", post(trigger_code))
        .route("/ws/:id", get(ws_handler))
        .nest_service("/static", static_files_service)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub async fn start_web_server(config: WebConfig, sessions: SessionStore) -> Result<()> {
    let state = AppState::new(sessions, config.templates_dir.clone());
    let app = router(state, &config.static_dir);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Web server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context(format!("Failed to bind to address {}", addr))?;

    serve(listener, app.into_make_service())
        .await
        .context("Web server failed")?;

    Ok(())
}
