//! HTTP API for the NPC backend
//!
//! Endpoints:
//! - GET /                      - Banner
//! - GET /api/health            - Health check
//! - GET /api/npcs              - Registry listing
//! - POST /api/chat             - Player → NPC
//! - POST /api/npc-dialogue     - NPC → NPC
//! - POST /api/echo             - Echo room attribution
//! - POST /api/check-dissonance - Dissonance check

use axum::{
    extract::{rejection::JsonRejection, State},
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::core::compiler::ECHO_HISTORY_TURNS;
use crate::core::echo::{self, AttributionSource};
use crate::core::error::ApiError;
use crate::core::router::describe_environment;
use crate::core::store::spawn_append;
use crate::core::{BeliefCompiler, Config, GatewayClient, InteractionStore, NpcRegistry, NpcRouter};
use crate::types::{
    records_to_turns, BeliefSummary, ConversationContext, ConversationTurn, InteractionRecord,
    NpcKind, NpcProfile, NpcRoute, RouteKind, RoutingResult, Scene, ENVIRONMENT_ID,
};
use crate::{HISTORY_TURNS, SERVICE_NAME, VERSION};

/// Records fetched per session before filtering by NPC
const SESSION_LOOKBACK: usize = 20;

/// Turn window covering everything fetched
const WHOLE_SESSION: usize = SESSION_LOOKBACK * 2;

/// Display name of the environment narrator
const ENVIRONMENT_NAME: &str = "环境";

/// Shared handles, immutable after startup
pub struct AppState {
    pub registry: Arc<NpcRegistry>,
    pub compiler: BeliefCompiler,
    pub router: NpcRouter,
    pub gateway: Arc<GatewayClient>,
    pub store: Arc<dyn InteractionStore>,
    pub scene: Scene,
    routes: Vec<NpcRoute>,
}

impl AppState {
    pub fn new(
        registry: NpcRegistry,
        router: NpcRouter,
        gateway: GatewayClient,
        store: Arc<dyn InteractionStore>,
    ) -> Self {
        let routes = registry.routes();
        Self {
            registry: Arc::new(registry),
            compiler: BeliefCompiler::new(),
            router,
            gateway: Arc::new(gateway),
            store,
            scene: Scene::default(),
            routes,
        }
    }

    pub fn from_config(config: &Config, registry: NpcRegistry) -> Self {
        Self::new(
            registry,
            config.router(),
            GatewayClient::new(config.gateway.clone()),
            config.store(),
        )
    }

    pub fn routes(&self) -> &[NpcRoute] {
        &self.routes
    }

    fn profile(&self, npc_id: &str) -> Result<&NpcProfile, ApiError> {
        self.registry
            .get(npc_id)
            .ok_or_else(|| ApiError::UnknownNpc(npc_id.to_string()))
    }

    /// Last `max_turns` turns of a session, oldest first. Store failures give no history.
    async fn history(&self, session_id: &str, npc_id: Option<&str>, max_turns: usize) -> Vec<ConversationTurn> {
        let records = match self.store.recent(session_id, SESSION_LOOKBACK).await {
            Ok(records) => records,
            Err(err) => {
                warn!(backend = self.store.backend(), session_id, error = %err, "history unavailable");
                return Vec::new();
            }
        };
        let mut records: Vec<InteractionRecord> = records
            .into_iter()
            .filter(|r| npc_id.map_or(true, |id| r.character_id == id))
            .collect();
        let start = records.len().saturating_sub(max_turns / 2);
        records.drain(..start);
        records_to_turns(&records, |id| self.registry.name_of(id).to_string())
    }
}

// =============================================================================
// REQUESTS / RESPONSES
// =============================================================================

#[derive(Debug, Serialize)]
pub struct BannerResponse {
    pub message: String,
    pub status: String,
    pub endpoints: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub gateway: &'static str,
    pub store: &'static str,
}

#[derive(Debug, Serialize)]
pub struct NpcListing {
    pub id: String,
    pub name: String,
    pub role: String,
    pub kind: NpcKind,
    pub triggers: Vec<String>,
    pub has_belief: bool,
    pub summary: BeliefSummary,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub player_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    pub message: String,
    #[serde(default)]
    pub npc_id: Option<String>,
}

impl ChatRequest {
    /// `session_id`, else `player_id`
    fn session_key(&self) -> Option<&str> {
        non_blank(&self.session_id).or_else(|| non_blank(&self.player_id))
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub npc_id: String,
    pub npc_name: String,
    pub response: String,
    pub session_id: String,
    pub route: RouteKind,
    pub reasoning: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct DialogueRequest {
    #[serde(default)]
    pub scene_id: Option<String>,
    #[serde(default)]
    pub player_id: Option<String>,
    #[serde(default)]
    pub speaker_id: Option<String>,
    #[serde(default, alias = "target_id")]
    pub listener_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct NpcRef {
    pub id: String,
    pub name: String,
}

impl From<&NpcProfile> for NpcRef {
    fn from(profile: &NpcProfile) -> Self {
        Self {
            id: profile.id.clone(),
            name: profile.name.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DialogueResponse {
    pub speaker: NpcRef,
    pub listener: NpcRef,
    pub message: String,
    pub response: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct EchoRequest {
    pub player_id: String,
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub confusion_text: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EchoResponse {
    pub attribution: String,
    pub memory_evidence: Vec<String>,
    pub source: AttributionSource,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct DissonanceRequest {
    pub player_id: String,
    #[serde(default)]
    pub conversation_history: Option<Vec<HistoryMessage>>,
}

// =============================================================================
// ROUTER
// =============================================================================

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(banner))
        .route("/api/health", get(health))
        .route("/api/npcs", get(list_npcs))
        .route("/api/chat", post(chat))
        .route("/api/npc-dialogue", post(npc_dialogue))
        .route("/api/echo", post(echo_room))
        .route("/api/check-dissonance", post(check_dissonance))
        .with_state(state)
}

async fn banner() -> Json<BannerResponse> {
    Json(BannerResponse {
        message: "Helios Agent Core API".to_string(),
        status: "running".to_string(),
        endpoints: vec![
            "/api/health",
            "/api/npcs",
            "/api/chat",
            "/api/npc-dialogue",
            "/api/echo",
            "/api/check-dissonance",
        ],
    })
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: SERVICE_NAME.to_string(),
        version: VERSION.to_string(),
        gateway: if state.gateway.is_live() { "live" } else { "local" },
        store: state.store.backend(),
    })
}

async fn list_npcs(State(state): State<Arc<AppState>>) -> Json<Vec<NpcListing>> {
    let listing = state
        .registry
        .profiles()
        .iter()
        .map(|p| NpcListing {
            id: p.id.clone(),
            name: p.name.clone(),
            role: p.role.clone(),
            kind: p.kind,
            triggers: p.triggers.clone(),
            has_belief: p.belief.is_some(),
            summary: p.summary(),
        })
        .collect();
    Json(listing)
}

/// Player message → routed NPC reply
async fn chat(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(req) = payload?;
    let message = req.message.trim();
    if message.is_empty() {
        return Err(ApiError::InvalidRequest("message must not be empty".to_string()));
    }
    let session_id = req
        .session_key()
        .map(str::to_string)
        .unwrap_or_else(|| format!("anon_{}", uuid::Uuid::new_v4().simple()));

    let routing = match req.npc_id.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(npc_id) => {
            state.profile(npc_id)?;
            RoutingResult {
                npc_id: npc_id.to_string(),
                kind: RouteKind::Requested,
                matched: Vec::new(),
                reasoning: format!("玩家指定了角色 {}", npc_id),
            }
        }
        None => state.router.route(message, state.routes()),
    };

    if routing.kind == RouteKind::Environment {
        info!(session_id = %session_id, "environment narration");
        return Ok(Json(ChatResponse {
            npc_id: ENVIRONMENT_ID.to_string(),
            npc_name: ENVIRONMENT_NAME.to_string(),
            response: describe_environment(message).to_string(),
            session_id,
            route: routing.kind,
            reasoning: routing.reasoning,
            timestamp: Utc::now(),
        }));
    }

    let profile = state.profile(&routing.npc_id)?;
    let history = state.history(&session_id, Some(&profile.id), HISTORY_TURNS).await;
    let context = ConversationContext::new(state.scene.clone()).with_history(history);
    let prompt = state.compiler.compile_profile(profile, &context);
    let response = state.gateway.complete(&prompt, message, context.history()).await;

    info!(session_id = %session_id, npc_id = %profile.id, route = ?routing.kind, "chat reply");
    spawn_append(
        state.store.clone(),
        InteractionRecord::new(&profile.id, &session_id, message, &response),
    );

    Ok(Json(ChatResponse {
        npc_id: profile.id.clone(),
        npc_name: profile.name.clone(),
        response,
        session_id,
        route: routing.kind,
        reasoning: routing.reasoning,
        timestamp: Utc::now(),
    }))
}

/// One NPC addressing another
async fn npc_dialogue(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<DialogueRequest>, JsonRejection>,
) -> Result<Json<DialogueResponse>, ApiError> {
    let Json(req) = payload?;

    // Defaults to the first two named characters
    let mut named = state.registry.core().map(|p| p.id.as_str());
    let default_speaker = named.next();
    let default_listener = named.next();

    let speaker_id = req
        .speaker_id
        .as_deref()
        .or(default_speaker)
        .ok_or_else(|| ApiError::InvalidRequest("speaker_id is required".to_string()))?;
    let listener_id = req
        .listener_id
        .as_deref()
        .or(default_listener)
        .ok_or_else(|| ApiError::InvalidRequest("listener_id is required".to_string()))?;
    if speaker_id == listener_id {
        return Err(ApiError::InvalidRequest("speaker and listener must differ".to_string()));
    }

    let speaker = state.profile(speaker_id)?;
    let listener = state.profile(listener_id)?;
    let message = req
        .message
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("你好，{}。", listener.name));

    let scene = req.scene_id.as_deref().map(Scene::by_id).unwrap_or_else(|| state.scene.clone());
    let context = ConversationContext::new(scene);
    let prompt = state.compiler.dialogue_prompt(speaker, listener, &context);
    let response = state.gateway.complete(&prompt, &message, &[]).await;

    if let Some(player_id) = req.player_id.as_deref().filter(|p| !p.is_empty()) {
        spawn_append(
            state.store.clone(),
            InteractionRecord::new(&speaker.id, player_id, &message, &response),
        );
    }

    Ok(Json(DialogueResponse {
        speaker: speaker.into(),
        listener: listener.into(),
        message,
        response,
        timestamp: Utc::now(),
    }))
}

async fn echo_room(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<EchoRequest>, JsonRejection>,
) -> Result<Json<EchoResponse>, ApiError> {
    let Json(req) = payload?;
    let player_id = req.player_id.trim();
    if player_id.is_empty() {
        return Err(ApiError::InvalidRequest("player_id must not be empty".to_string()));
    }

    let history = state.history(player_id, None, ECHO_HISTORY_TURNS).await;
    let outcome = echo::echo_attribution(
        &state.gateway,
        &state.compiler,
        &history,
        req.confusion_text.as_deref(),
        req.event_id.as_deref(),
    )
    .await;

    info!(player_id, source = ?outcome.source, "echo attribution");
    Ok(Json(EchoResponse {
        attribution: outcome.attribution,
        memory_evidence: outcome.memory_evidence,
        source: outcome.source,
        timestamp: Utc::now(),
    }))
}

async fn check_dissonance(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<DissonanceRequest>, JsonRejection>,
) -> Result<Json<echo::DissonanceVerdict>, ApiError> {
    let Json(req) = payload?;
    let player_id = req.player_id.trim();
    if player_id.is_empty() {
        return Err(ApiError::InvalidRequest("player_id must not be empty".to_string()));
    }

    let transcript = match &req.conversation_history {
        Some(messages) => messages
            .iter()
            .map(|m| format!("{}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n"),
        None => state
            .history(player_id, None, WHOLE_SESSION)
            .await
            .iter()
            .map(|t| format!("{}: {}", t.speaker.as_str(), t.text))
            .collect::<Vec<_>>()
            .join("\n"),
    };

    if transcript.trim().is_empty() {
        return Ok(Json(echo::DissonanceVerdict {
            dissonance_detected: false,
            analysis: "没有可分析的对话。".to_string(),
            event_id: None,
            echo_room_triggered: false,
        }));
    }

    let verdict = echo::check_dissonance(&state.gateway, &state.compiler, player_id, &transcript).await;
    Ok(Json(verdict))
}

/// Run the API server
pub async fn run_server(addr: &str, state: Arc<AppState>) -> Result<(), Box<dyn std::error::Error>> {
    let npcs = state.registry.len();
    let router = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr, npcs, "Helios API listening");
    axum::serve(listener, router).await?;
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::MemoryStore;
    use crate::core::GatewayConfig;

    fn state_with(store: Arc<MemoryStore>) -> AppState {
        AppState::new(
            NpcRegistry::bundled().unwrap(),
            NpcRouter::new(),
            GatewayClient::new(GatewayConfig::default()),
            store,
        )
    }

    #[test]
    fn test_session_key_prefers_session_id() {
        let req = ChatRequest {
            player_id: Some("p1".to_string()),
            session_id: Some("s1".to_string()),
            message: "hi".to_string(),
            npc_id: None,
        };
        assert_eq!(req.session_key(), Some("s1"));

        let req = ChatRequest {
            player_id: Some("p1".to_string()),
            session_id: Some(" ".to_string()),
            message: "hi".to_string(),
            npc_id: None,
        };
        // A blank session id falls through to the player id
        assert_eq!(req.session_key(), Some("p1"));

        let req = ChatRequest {
            player_id: None,
            session_id: Some("".to_string()),
            message: "hi".to_string(),
            npc_id: None,
        };
        assert_eq!(req.session_key(), None);
    }

    #[tokio::test]
    async fn test_history_filters_by_npc_and_caps_turns() {
        let store = Arc::new(MemoryStore::new());
        for i in 0..5 {
            store
                .append(InteractionRecord::new("bartender", "s1", format!("q{}", i), "a"))
                .await
                .unwrap();
        }
        store.append(InteractionRecord::new("cook", "s1", "饿了", "炖鱼")).await.unwrap();
        let state = state_with(store);

        let turns = state.history("s1", Some("bartender"), HISTORY_TURNS).await;
        assert_eq!(turns.len(), HISTORY_TURNS);
        assert_eq!(turns[0].text, "q2");
        assert_eq!(turns[1].speaker_name.as_deref(), Some("酒保"));

        let all = state.history("s1", None, HISTORY_TURNS).await;
        assert_eq!(all.last().map(|t| t.text.as_str()), Some("炖鱼"));
    }

    #[tokio::test]
    async fn test_history_windows_per_caller() {
        let store = Arc::new(MemoryStore::new());
        for i in 0..6 {
            store
                .append(InteractionRecord::new("chenhao", "p1", format!("q{}", i), "嗯"))
                .await
                .unwrap();
        }
        let state = state_with(store);

        let echo = state.history("p1", None, ECHO_HISTORY_TURNS).await;
        assert_eq!(echo.len(), ECHO_HISTORY_TURNS);
        assert_eq!(echo[0].text, "q2");

        let whole = state.history("p1", None, WHOLE_SESSION).await;
        assert_eq!(whole.len(), 12);
        assert_eq!(whole[0].text, "q0");

        let chat = state.history("p1", Some("chenhao"), HISTORY_TURNS).await;
        assert_eq!(chat.len(), HISTORY_TURNS);
    }

    #[test]
    fn test_unknown_profile_is_404() {
        let state = state_with(Arc::new(MemoryStore::new()));
        let err = state.profile("ghost").unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::NOT_FOUND);
    }
}
