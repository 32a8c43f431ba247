//! REST API
//!
//! HTTP front-end over the shared executor and config manager: command
//! endpoints, status, config administration and the AI entry point.
//! Default port: 8000

use crate::config::{ConfigManager, ConfigModel, GroupAction, GroupRecord};
use crate::error::{CommandError, ConfigError, ErrorBody};
use crate::executor::{
    command_schema, Command, CommandBatch, CommandExecutor, CommandReport, DurationSpec,
};
use crate::scheduler::StatusSnapshot;
use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

/// Default API port
pub const DEFAULT_API_PORT: u16 = 8000;

/// Shared state for API handlers
pub struct ApiState {
    pub executor: Arc<CommandExecutor>,
    pub manager: Arc<ConfigManager>,
}

/// Error response: `{"ok": false, "error": <tag>, "message": ...}`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl From<CommandError> for ApiError {
    fn from(e: CommandError) -> Self {
        let status = match e {
            CommandError::Unauthorized => StatusCode::UNAUTHORIZED,
            CommandError::Disabled => StatusCode::FORBIDDEN,
            CommandError::Driver(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        };
        Self {
            status,
            body: ErrorBody::from(&e),
        }
    }
}

impl From<ConfigError> for ApiError {
    fn from(e: ConfigError) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ErrorBody::from(&e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Deserialize)]
pub struct ActivateRequest {
    pub alias: String,
    #[serde(default)]
    pub duration: Option<DurationSpec>,
}

#[derive(Debug, Deserialize)]
pub struct ActivateGroupRequest {
    pub group: String,
    #[serde(default)]
    pub duration: Option<DurationSpec>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StopRequest {
    #[serde(default)]
    pub alias: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PinRequest {
    pub config_spot: String,
    #[serde(default)]
    pub pin_num: Option<u8>,
}

#[derive(Debug, Deserialize)]
pub struct AliasRequest {
    pub name: String,
    #[serde(default)]
    pub config_spot: Option<String>,
    #[serde(default)]
    pub auto_off: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct GroupRequest {
    pub name: String,
    #[serde(default)]
    pub aliases: Option<Vec<String>>,
    #[serde(default)]
    pub action: Option<GroupAction>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    pub enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct AiExecuteRequest {
    #[serde(default)]
    pub api_key: Option<String>,
    pub command: CommandBatch,
}

/// Build the API router
pub fn build_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/config", get(get_config))
        .route("/api/activate", post(activate))
        .route("/api/activate-group", post(activate_group))
        .route("/api/stop", post(stop))
        .route("/api/status", get(status))
        .route("/api/commands", post(commands))
        .route("/api/config/gpio-pins", post(set_pin).delete(delete_pin))
        .route("/api/config/aliases", post(set_alias).delete(delete_alias))
        .route("/api/config/groups", post(set_group).delete(delete_group))
        .route("/api/config/reload", post(reload))
        .route("/api/ai/register", post(ai_register))
        .route("/api/ai/schema", get(ai_schema))
        .route("/api/ai/execute", post(ai_execute))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn run(state: &ApiState, command: Command) -> ApiResult<Json<CommandReport>> {
    let result = state.executor.execute(&command);
    match result {
        Ok(_) => Ok(Json(CommandReport::from(&result))),
        Err(e) => Err(e.into()),
    }
}

fn ok() -> Json<Value> {
    Json(json!({ "ok": true }))
}

/// GET /api/health - Health check endpoint
async fn health_check() -> &'static str {
    "ok"
}

/// GET /api/config - Current configuration, credential masked
async fn get_config(State(state): State<Arc<ApiState>>) -> Json<ConfigModel> {
    Json(state.manager.snapshot().redacted())
}

/// POST /api/activate - Activate one alias
async fn activate(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<ActivateRequest>,
) -> ApiResult<Json<CommandReport>> {
    run(&state, Command::activate_alias(&req.alias, req.duration))
}

/// POST /api/activate-group - Activate a group
async fn activate_group(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<ActivateGroupRequest>,
) -> ApiResult<Json<CommandReport>> {
    run(&state, Command::activate_group(&req.group, req.duration))
}

/// POST /api/stop - Stop one alias or group; no target stops everything
async fn stop(
    State(state): State<Arc<ApiState>>,
    body: Option<Json<StopRequest>>,
) -> ApiResult<Response> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    if let Some(target) = req.alias.filter(|a| !a.trim().is_empty()) {
        return run(&state, Command::stop(&target)).map(IntoResponse::into_response);
    }

    let failures = state.executor.stop_all();
    if failures.is_empty() {
        return Ok(Json(json!({ "ok": true, "action": "stop", "target": "all" })).into_response());
    }

    let message = failures
        .iter()
        .map(|(index, e)| format!("{index}: {e}"))
        .collect::<Vec<_>>()
        .join("; ");
    let body = ErrorBody {
        ok: false,
        error: "DriverFailure".to_string(),
        message,
    };
    Ok((StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response())
}

/// GET /api/status - Remaining seconds per active output
async fn status(State(state): State<Arc<ApiState>>) -> Json<StatusSnapshot> {
    Json(state.executor.status())
}

/// POST /api/commands - One command or a list; each gets its own result
async fn commands(
    State(state): State<Arc<ApiState>>,
    Json(batch): Json<CommandBatch>,
) -> Json<Vec<CommandReport>> {
    let results = state.executor.execute_batch(batch);
    Json(results.iter().map(CommandReport::from).collect())
}

/// POST /api/config/gpio-pins - Bind (or unbind) a slot
async fn set_pin(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<PinRequest>,
) -> ApiResult<Json<Value>> {
    state.manager.set_binding(&req.config_spot, req.pin_num).await?;
    Ok(ok())
}

/// DELETE /api/config/gpio-pins - Remove a slot
async fn delete_pin(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<PinRequest>,
) -> ApiResult<Json<Value>> {
    state.manager.delete_binding(&req.config_spot).await?;
    Ok(ok())
}

/// POST /api/config/aliases - Create or replace an alias
async fn set_alias(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<AliasRequest>,
) -> ApiResult<Json<Value>> {
    state
        .manager
        .upsert_alias(&req.name, req.config_spot, req.auto_off)
        .await?;
    Ok(ok())
}

/// DELETE /api/config/aliases - Remove an alias
async fn delete_alias(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<AliasRequest>,
) -> ApiResult<Json<Value>> {
    state.manager.delete_alias(&req.name).await?;
    Ok(ok())
}

/// POST /api/config/groups - Create or replace a group
async fn set_group(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<GroupRequest>,
) -> ApiResult<Json<Value>> {
    let record = GroupRecord::new(
        req.aliases.unwrap_or_default(),
        req.action.unwrap_or(GroupAction::On),
    );
    state.manager.set_group(&req.name, record).await?;
    Ok(ok())
}

/// DELETE /api/config/groups - Remove a group
async fn delete_group(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<GroupRequest>,
) -> ApiResult<Json<Value>> {
    state.manager.delete_group(&req.name).await?;
    Ok(ok())
}

/// POST /api/config/reload - Re-read the configuration store
async fn reload(State(state): State<Arc<ApiState>>) -> Response {
    match state.manager.reload().await {
        Ok(changed) => Json(json!({ "ok": true, "changed": changed })).into_response(),
        Err(e) => {
            let body = ErrorBody {
                ok: false,
                error: "ReloadFailed".to_string(),
                message: format!("{e:#}"),
            };
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        }
    }
}

/// POST /api/ai/register - Set the AI credential, model and switch
///
/// Omitted `api_key`/`model` keep their current values.
async fn ai_register(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<RegisterRequest>,
) -> Json<Value> {
    let settings = state
        .manager
        .update_ai(|ai| {
            if let Some(key) = req.api_key {
                ai.api_key = Some(key);
            }
            if let Some(model) = req.model {
                ai.model = Some(model);
            }
            ai.enabled = req.enabled;
        })
        .await;
    Json(json!({
        "ok": true,
        "enabled": settings.enabled,
        "api_key_set": settings.api_key.is_some()
    }))
}

/// GET /api/ai/schema - Command schema plus the names a model may target
async fn ai_schema(State(state): State<Arc<ApiState>>) -> Json<Value> {
    let resolver = state.executor.resolver();
    Json(json!({
        "schema": command_schema(),
        "aliases": resolver.alias_names(),
        "groups": resolver.group_names(),
        "model": state.manager.ai_settings().model,
    }))
}

/// POST /api/ai/execute - Authorized batch execution
async fn ai_execute(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<AiExecuteRequest>,
) -> ApiResult<Json<Vec<CommandReport>>> {
    let results = state
        .executor
        .execute_authorized(req.api_key.as_deref(), req.command)?;
    info!("AI batch executed ({} command(s))", results.len());
    Ok(Json(results.iter().map(CommandReport::from).collect()))
}

/// Start the API server
pub async fn start_server(state: Arc<ApiState>, host: &str, port: u16) -> Result<()> {
    let router = build_router(state);

    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("Invalid API listen address {host}:{port}"))?;
    info!("Starting API server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind API server")?;

    if let Err(e) = axum::serve(listener, router).await {
        warn!("API server stopped: {}", e);
        return Err(e).context("API server error");
    }

    Ok(())
}
