//! HTTP routes.
//!
//! Sessions are addressed by id; nothing about a running game is global.
//! Reference data (adventure listings, character sheets, provider config)
//! is served straight from the store without a session.

use axum::{
    extract::{Path, Query, State},
    http::header,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

use loremaster_domain::{CharacterSheet, ContextTier, Quest, QuestStatus, SessionId};

use crate::app::App;
use crate::infrastructure::ports::{LlmError, StoreError};
use crate::infrastructure::provider::Provider;
use crate::infrastructure::store::{DEFAULT_ADDITIONAL_RULES, RULES_FILE_NAME};
use crate::use_cases::progression;
use crate::use_cases::quest_log::{self, QuestUpdate};
use crate::use_cases::session::GameSession;
use crate::use_cases::state::{AdventureState, StateError};
use crate::use_cases::turn::TurnError;

/// Create all HTTP routes.
pub fn routes() -> Router<Arc<App>> {
    Router::new()
        .route("/", get(root))
        .route("/api/health", get(health))
        .route("/api/session", post(create_session).get(list_sessions))
        .route("/api/session/{id}", get(get_session).delete(end_session))
        .route("/api/session/{id}/action", post(player_action))
        .route("/api/session/{id}/reset", post(reset_session))
        .route("/api/session/{id}/update", post(update_adventure_state))
        .route("/api/session/{id}/context/{tier}", get(get_context))
        .route(
            "/api/session/{id}/accessible-locations",
            get(accessible_locations),
        )
        .route("/api/session/{id}/long-rest", post(long_rest))
        .route("/api/session/{id}/progression", get(progression_summary))
        .route("/api/session/{id}/track/{kind}", post(track_progress))
        .route("/api/session/{id}/analyze-quests", post(analyze_quests))
        .route(
            "/api/session/{id}/quest-updates/apply",
            post(apply_quest_updates),
        )
        .route("/api/adventures", get(list_adventures))
        .route("/api/adventures/{id}", get(get_adventure))
        .route("/api/adventures/{id}/chapters", get(list_chapters))
        .route("/api/adventures/{id}/locations", get(list_locations))
        .route("/api/adventures/{id}/npcs", get(list_npcs))
        .route(
            "/api/adventures/{id}/location/{location_id}",
            get(location_details),
        )
        .route("/api/adventures/{id}/npc/{npc_id}", get(npc_info))
        .route("/api/characters", get(list_characters))
        .route("/api/characters/{name}", get(get_character))
        .route("/api/audio/{filename}", get(serve_audio))
        .route("/api/tts/clear-cache", post(clear_tts_cache))
        .route("/api/rules", get(get_rules).post(save_rules))
        .route("/api/config/providers", get(provider_config))
}

fn session_for(app: &App, id: Uuid) -> Result<Arc<Mutex<GameSession>>, ApiError> {
    app.registry
        .get(SessionId::from(id))
        .ok_or(ApiError::NotFound)
}

// =============================================================================
// Liveness
// =============================================================================

async fn root(State(app): State<Arc<App>>) -> Json<Value> {
    Json(json!({
        "message": "Loremaster DM API",
        "status": "ready",
        "ai_provider": app.provider.as_str(),
        "tts_enabled": app.tts_enabled,
    }))
}

async fn health(State(app): State<Arc<App>>) -> Json<Value> {
    let backend = match app.provider {
        Provider::Ollama => probe_ollama(&app.base_url).await,
        _ => json!({"status": "configured", "base_url": app.base_url}),
    };
    Json(json!({
        "status": "ready",
        "provider": app.provider.as_str(),
        "model": app.model,
        "tts_enabled": app.tts_enabled,
        "backend": backend,
    }))
}

/// Live reachability probe against a local Ollama server. Hosted providers
/// are not probed; a request there costs money.
async fn probe_ollama(base_url: &str) -> Value {
    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()
    {
        Ok(client) => client,
        Err(e) => return json!({"status": "error", "message": e.to_string()}),
    };

    match client.get(format!("{base_url}/api/tags")).send().await {
        Ok(response) if response.status().is_success() => {
            let models: Vec<String> = response
                .json::<Value>()
                .await
                .ok()
                .and_then(|body| {
                    body.get("models").and_then(Value::as_array).map(|models| {
                        models
                            .iter()
                            .filter_map(|m| m.get("name").and_then(Value::as_str))
                            .map(str::to_string)
                            .collect()
                    })
                })
                .unwrap_or_default();
            let model_count = models.len();
            json!({
                "status": "healthy",
                "base_url": base_url,
                "available_models": models,
                "model_count": model_count,
            })
        }
        Ok(response) => json!({
            "status": "error",
            "message": format!("Ollama returned status {}", response.status().as_u16()),
        }),
        Err(e) if e.is_timeout() => json!({
            "status": "timeout",
            "message": format!("Connection to Ollama at {base_url} timed out"),
        }),
        Err(_) => json!({
            "status": "unavailable",
            "message": format!("Cannot connect to Ollama at {base_url}. Is the server running?"),
            "help": "Run 'ollama serve' to start the Ollama server",
        }),
    }
}

// =============================================================================
// Sessions
// =============================================================================

#[derive(Deserialize, Default)]
struct CreateSessionRequest {
    adventure_id: Option<String>,
}

async fn create_session(
    State(app): State<Arc<App>>,
    body: Option<Json<CreateSessionRequest>>,
) -> Result<Json<Value>, ApiError> {
    let requested = body.and_then(|Json(body)| body.adventure_id);
    let adventure_id = match requested {
        Some(id) if !id.is_empty() => id,
        // No explicit adventure: resume the one played last.
        _ => app
            .store
            .last_adventure()
            .await
            .ok_or_else(|| ApiError::BadRequest("adventure_id is required".to_string()))?,
    };

    let (session_id, handle) = app.open_session(&adventure_id).await?;
    let session = handle.lock().await;
    Ok(Json(json!({
        "session_id": session_id,
        "message": format!("Loaded adventure: {}", session.state.adventure().name),
        "adventure_info": session.state.adventure_info().await,
        "game_state": session.mechanics.get_state(),
    })))
}

async fn list_sessions(State(app): State<Arc<App>>) -> Json<Value> {
    Json(json!({"sessions": app.registry.list().await}))
}

async fn get_session(
    State(app): State<Arc<App>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let handle = session_for(&app, id)?;
    let session = handle.lock().await;
    Ok(Json(json!({
        "session_id": session.session_id(),
        "adventure_info": session.state.adventure_info().await,
        "metadata": session.state.metadata(),
        "game_state": session.mechanics.get_state(),
    })))
}

async fn end_session(
    State(app): State<Arc<App>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    if !app.registry.remove(SessionId::from(id)) {
        return Err(ApiError::NotFound);
    }
    Ok(Json(json!({"message": "Session ended"})))
}

// =============================================================================
// Turns
// =============================================================================

#[derive(Deserialize)]
struct ActionRequest {
    message: String,
    /// Which party member is acting, attribution only.
    character: Option<String>,
    #[serde(default)]
    voice: bool,
}

async fn player_action(
    State(app): State<Arc<App>>,
    Path(id): Path<Uuid>,
    Json(body): Json<ActionRequest>,
) -> Result<Json<Value>, ApiError> {
    let handle = session_for(&app, id)?;
    if let Some(character) = body.character.as_deref() {
        tracing::debug!(session_id = %id, character, "Action attributed to character");
    }
    let mut session = handle.lock().await;
    let outcome = app
        .agent
        .run_turn(&mut session, &body.message, body.voice, app.clock.now())
        .await?;
    Ok(Json(json!({
        "narrative": outcome.narrative,
        "audio_url": outcome.audio_url,
        "game_state": outcome.game_state,
        "tool_results": outcome.tool_results,
        "quest_updates": outcome.quest_updates,
    })))
}

async fn reset_session(
    State(app): State<Arc<App>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let handle = session_for(&app, id)?;
    handle.lock().await.reset_conversation();
    Ok(Json(json!({"message": "Session reset"})))
}

// =============================================================================
// Adventure state
// =============================================================================

async fn update_adventure_state(
    State(app): State<Arc<App>>,
    Path(id): Path<Uuid>,
    Json(updates): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let handle = session_for(&app, id)?;
    let mut session = handle.lock().await;
    let now = app.clock.now();
    let mut warning = None;

    if let Some(location) = updates.get("location").and_then(Value::as_str) {
        session.state.set_location(location, now).await?;
    }
    if let Some(chapter) = updates.get("chapter").and_then(Value::as_str) {
        let force = updates
            .get("force_chapter_change")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let transition = session.state.set_chapter(chapter, force).await?;
        warning = transition.warning;
    }
    if let Some(event) = updates.get("event").and_then(Value::as_str) {
        session.state.add_event(event).await?;
    }
    if let Some(npc_id) = updates.get("met_npc").and_then(Value::as_str) {
        session.state.meet_npc(npc_id, now).await?;
    }
    if let Some(quest) = updates.get("quest") {
        apply_quest_field(&mut session.state, quest, now).await?;
    }
    if let Some(knowledge) = updates.get("party_knowledge") {
        let key = knowledge.get("key").and_then(Value::as_str).ok_or_else(|| {
            ApiError::BadRequest("party_knowledge requires key and value".to_string())
        })?;
        let value = knowledge
            .get("value")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        session.state.set_party_knowledge(key, value).await?;
    }
    if let Some(n) = updates.get("session_number").and_then(Value::as_u64) {
        session.state.set_session_number(n as u32).await?;
    }
    if let Some(level) = updates.get("party_level").and_then(Value::as_u64) {
        session.state.set_party_level(level as u32).await?;
    }

    let mut response = json!({"success": true, "metadata": session.state.metadata()});
    if let (Some(warning), Value::Object(map)) = (warning, &mut response) {
        map.insert("warning".to_string(), Value::String(warning));
    }
    Ok(Json(response))
}

/// A `status` key marks a status change for an existing quest; anything
/// else is a full quest document to add to the log.
async fn apply_quest_field(
    state: &mut AdventureState,
    quest: &Value,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<(), ApiError> {
    if let Some(status) = quest.get("status").and_then(Value::as_str) {
        let quest_id = quest
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| ApiError::BadRequest("quest update requires an id".to_string()))?;
        let status: QuestStatus = status
            .parse()
            .map_err(|e: loremaster_domain::DomainError| ApiError::BadRequest(e.to_string()))?;
        state.set_quest_status(quest_id, status, now).await?;
    } else {
        let quest: Quest = serde_json::from_value(quest.clone())
            .map_err(|e| ApiError::BadRequest(format!("Invalid quest: {e}")))?;
        state.add_quest(quest).await?;
    }
    Ok(())
}

async fn get_context(
    State(app): State<Arc<App>>,
    Path((id, tier)): Path<(Uuid, String)>,
) -> Result<Json<Value>, ApiError> {
    let handle = session_for(&app, id)?;
    let tier: ContextTier = tier.parse().map_err(|_| {
        ApiError::BadRequest("Invalid context_type. Use minimal, standard, or detailed".to_string())
    })?;
    let session = handle.lock().await;
    let context = session
        .context
        .render(session.state.adventure(), tier)
        .await;
    Ok(Json(json!({"context": context, "type": tier.as_str()})))
}

async fn accessible_locations(
    State(app): State<Arc<App>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let handle = session_for(&app, id)?;
    let session = handle.lock().await;
    Ok(Json(session.state.accessible_locations().await))
}

async fn long_rest(
    State(app): State<Arc<App>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let handle = session_for(&app, id)?;
    let mut session = handle.lock().await;
    let outcome = progression::long_rest(&mut session.state, app.clock.now()).await?;
    Ok(Json(serde_json::to_value(&outcome).unwrap_or(Value::Null)))
}

async fn progression_summary(
    State(app): State<Arc<App>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let handle = session_for(&app, id)?;
    let session = handle.lock().await;
    let overview = progression::overview(&session.state);
    Ok(Json(serde_json::to_value(&overview).unwrap_or(Value::Null)))
}

#[derive(Deserialize, Default)]
struct TrackParams {
    encounter_id: Option<String>,
    #[serde(default)]
    xp_value: u32,
    milestone: Option<String>,
    location_id: Option<String>,
    interaction_type: Option<String>,
    npc_id: Option<String>,
    quest_id: Option<String>,
}

async fn track_progress(
    State(app): State<Arc<App>>,
    Path((id, kind)): Path<(Uuid, String)>,
    Query(params): Query<TrackParams>,
) -> Result<Json<Value>, ApiError> {
    let handle = session_for(&app, id)?;
    let mut session = handle.lock().await;
    let now = app.clock.now();

    let message = match kind.as_str() {
        "combat" => {
            let encounter_id = params
                .encounter_id
                .ok_or_else(|| ApiError::BadRequest("encounter_id is required".to_string()))?;
            progression::track_combat(&mut session.state, &encounter_id, params.xp_value, now)
                .await?;
            format!("Tracked combat encounter: {encounter_id}")
        }
        "exploration" => {
            let milestone = params
                .milestone
                .ok_or_else(|| ApiError::BadRequest("milestone is required".to_string()))?;
            progression::track_exploration(&mut session.state, &milestone, params.location_id, now)
                .await?;
            format!("Tracked exploration: {milestone}")
        }
        "social" => {
            let interaction_type = params
                .interaction_type
                .ok_or_else(|| ApiError::BadRequest("interaction_type is required".to_string()))?;
            progression::track_social(
                &mut session.state,
                &interaction_type,
                params.npc_id,
                params.quest_id,
                now,
            )
            .await?;
            format!("Tracked social interaction: {interaction_type}")
        }
        other => {
            return Err(ApiError::BadRequest(format!(
                "Unknown track kind: {other}. Use combat, exploration, or social"
            )))
        }
    };

    Ok(Json(json!({"success": true, "message": message})))
}

// =============================================================================
// Quest log
// =============================================================================

#[derive(Deserialize)]
struct AnalyzeQuestsRequest {
    narrative: String,
    #[serde(default)]
    current_quests: Option<Vec<Quest>>,
}

async fn analyze_quests(
    State(app): State<Arc<App>>,
    Path(id): Path<Uuid>,
    Json(body): Json<AnalyzeQuestsRequest>,
) -> Result<Json<Value>, ApiError> {
    let handle = session_for(&app, id)?;
    let session = handle.lock().await;
    let updates = match &body.current_quests {
        Some(quests) => quest_log::analyze(&body.narrative, quests),
        None => quest_log::analyze(&body.narrative, &session.state.adventure().active_quests),
    };
    Ok(Json(json!({"updates": updates})))
}

#[derive(Deserialize)]
struct ApplyQuestUpdatesRequest {
    updates: Vec<QuestUpdate>,
}

async fn apply_quest_updates(
    State(app): State<Arc<App>>,
    Path(id): Path<Uuid>,
    Json(body): Json<ApplyQuestUpdatesRequest>,
) -> Result<Json<Value>, ApiError> {
    let handle = session_for(&app, id)?;
    let mut session = handle.lock().await;
    let applied = quest_log::apply(&mut session.state, &body.updates, app.clock.now()).await?;
    Ok(Json(json!({
        "applied": applied,
        "active_quests": session.state.adventure().active_quests,
    })))
}

// =============================================================================
// Adventures
// =============================================================================

async fn list_adventures(State(app): State<Arc<App>>) -> Json<Value> {
    Json(json!({"adventures": app.store.list_adventures().await}))
}

async fn get_adventure(
    State(app): State<Arc<App>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let state = AdventureState::load(app.store.clone(), &id, app.skip_policy).await?;
    Ok(Json(state.adventure_info().await))
}

async fn list_chapters(State(app): State<Arc<App>>, Path(id): Path<String>) -> Json<Value> {
    Json(json!({"chapters": app.store.list_chapters(&id).await}))
}

async fn list_locations(State(app): State<Arc<App>>, Path(id): Path<String>) -> Json<Value> {
    Json(json!({"locations": app.store.list_locations(&id).await}))
}

async fn list_npcs(State(app): State<Arc<App>>, Path(id): Path<String>) -> Json<Value> {
    Json(json!({"npcs": app.store.list_npcs(&id).await}))
}

#[derive(Deserialize, Default)]
struct AreaParams {
    area_id: Option<String>,
}

async fn location_details(
    State(app): State<Arc<App>>,
    Path((id, location_id)): Path<(String, String)>,
    Query(params): Query<AreaParams>,
) -> Json<Value> {
    let details = app
        .context
        .location_details(&id, &location_id, params.area_id.as_deref())
        .await;
    Json(json!({
        "location_id": location_id,
        "area_id": params.area_id,
        "details": details,
    }))
}

async fn npc_info(
    State(app): State<Arc<App>>,
    Path((id, npc_id)): Path<(String, String)>,
) -> Json<Value> {
    let info = app.context.npc_info(&id, &npc_id).await;
    Json(json!({"npc_id": npc_id, "info": info}))
}

// =============================================================================
// Characters
// =============================================================================

async fn list_characters(State(app): State<Arc<App>>) -> Json<Value> {
    Json(json!({"characters": app.store.load_party().await}))
}

async fn get_character(
    State(app): State<Arc<App>>,
    Path(name): Path<String>,
) -> Result<Json<CharacterSheet>, ApiError> {
    let party = app.store.load_party().await;
    let sheet = party
        .get(&name)
        .or_else(|| {
            party
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(&name))
                .map(|(_, sheet)| sheet)
        })
        .ok_or(ApiError::NotFound)?;
    Ok(Json(sheet.clone()))
}

// =============================================================================
// Audio, rules, provider config
// =============================================================================

async fn serve_audio(
    State(app): State<Arc<App>>,
    Path(filename): Path<String>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let bytes = app.speech.audio(&filename).await.ok_or(ApiError::NotFound)?;
    Ok((
        [
            (header::CONTENT_TYPE, "audio/mpeg".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("inline; filename={filename}"),
            ),
        ],
        bytes,
    ))
}

async fn clear_tts_cache(State(app): State<Arc<App>>) -> Json<Value> {
    let files_removed = app.speech.clear_cache().await;
    Json(json!({"message": "TTS cache cleared", "files_removed": files_removed}))
}

async fn get_rules(State(app): State<Arc<App>>) -> Json<Value> {
    let content = app
        .rules
        .load()
        .await
        .unwrap_or_else(|| DEFAULT_ADDITIONAL_RULES.to_string());
    Json(json!({"content": content, "file": RULES_FILE_NAME}))
}

#[derive(Deserialize)]
struct RulesRequest {
    content: String,
}

async fn save_rules(
    State(app): State<Arc<App>>,
    Json(body): Json<RulesRequest>,
) -> Result<Json<Value>, ApiError> {
    if body.content.is_empty() {
        return Err(ApiError::BadRequest("Content is required".to_string()));
    }
    app.rules.save(&body.content).await?;
    Ok(Json(json!({
        "message": "Additional rules saved successfully",
        "length": body.content.len(),
    })))
}

async fn provider_config(State(app): State<Arc<App>>) -> Json<Value> {
    let all = [
        Provider::Anthropic,
        Provider::OpenAi,
        Provider::Ollama,
        Provider::LmStudio,
        Provider::OpenRouter,
    ];
    let models: serde_json::Map<String, Value> = all
        .iter()
        .map(|p| (p.as_str().to_string(), json!(p.recommended_models())))
        .collect();
    Json(json!({
        "providers": Provider::names(),
        "models": models,
        "current": {"provider": app.provider.as_str(), "model": app.model},
    }))
}

// =============================================================================
// Error handling
// =============================================================================

#[derive(Debug)]
pub enum ApiError {
    NotFound,
    BadRequest(String),
    Internal(String),
}

impl axum::response::IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            ApiError::NotFound => {
                (axum::http::StatusCode::NOT_FOUND, "Not found").into_response()
            }
            ApiError::BadRequest(msg) => {
                (axum::http::StatusCode::BAD_REQUEST, msg).into_response()
            }
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal error",
                )
                    .into_response()
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { .. } => ApiError::NotFound,
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<StateError> for ApiError {
    fn from(e: StateError) -> Self {
        match e {
            StateError::InvalidTransition(message) => ApiError::BadRequest(message),
            StateError::Store(store) => ApiError::from(store),
        }
    }
}

impl From<LlmError> for ApiError {
    fn from(e: LlmError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl From<TurnError> for ApiError {
    fn from(e: TurnError) -> Self {
        match e {
            TurnError::EmptyMessage => ApiError::BadRequest("message is required".to_string()),
            TurnError::Llm(llm) => ApiError::from(llm),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    #[test]
    fn test_api_error_status_codes() {
        assert_eq!(
            ApiError::NotFound.into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::BadRequest("bad".to_string())
                .into_response()
                .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Internal("boom".to_string())
                .into_response()
                .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_store_not_found_maps_to_404() {
        let error = StoreError::NotFound {
            entity_type: "Adventure",
            id: "lost_mines".to_string(),
        };
        assert!(matches!(ApiError::from(error), ApiError::NotFound));
    }

    #[test]
    fn test_invalid_transition_maps_to_400() {
        let error = StateError::InvalidTransition("Cannot skip to part3".to_string());
        match ApiError::from(error) {
            ApiError::BadRequest(message) => assert!(message.contains("part3")),
            other => panic!("expected BadRequest, got {other:?}"),
        }
    }

    #[test]
    fn test_llm_error_detail_stays_internal() {
        let error = LlmError::RequestFailed("api key sk-secret rejected".to_string());
        let response = ApiError::from(error).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_empty_player_message_maps_to_400() {
        match ApiError::from(TurnError::EmptyMessage) {
            ApiError::BadRequest(message) => assert_eq!(message, "message is required"),
            other => panic!("expected BadRequest, got {other:?}"),
        }
    }
}
