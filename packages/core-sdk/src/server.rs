use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, get_service, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::services::ServeDir;

use crate::{
    config::AppConfig,
    error::RelayError,
    llm::ChatRelay,
    models::Message,
    persona::PersonaProfile,
    telemetry,
};

/**
 * \brief 路由共享状态。服务端不保存会话，历史由前端每次随请求带上。
 */
#[derive(Clone)]
pub struct AppState {
    pub relay: ChatRelay,
}

/**
 * \brief 仅包含 API 的路由，便于测试时直接挂载。
 */
pub fn router(relay: ChatRelay) -> Router {
    Router::new()
        .route("/api/personas", get(list_personas))
        .route("/api/talk", post(talk))
        .route("/api/health", get(health_check))
        .with_state(AppState { relay })
}

/**
 * \brief 启动本地 HTTP 服务，提供静态前端与对话 API。
 * \param addr 监听地址，如 "127.0.0.1:5173"
 */
pub async fn run(addr: &str, config: AppConfig) -> Result<()> {
    let ui_root = std::env::var("KURUMI_UI_DIR").unwrap_or_else(|_| "dist".to_string());
    let static_service =
        get_service(ServeDir::new(ui_root).append_index_html_on_directories(true));

    let relay = ChatRelay::new(config.relay)?;
    let app = router(relay).fallback_service(static_service);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    telemetry::log_event("server", &format!("listening on {}", addr));
    println!("Server listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

#[derive(Serialize, Debug)]
struct PersonaDto {
    key: String,
    name: String,
}

#[derive(Deserialize, Debug)]
struct TalkRequest {
    /** \brief 人设键，缺省为 kurumi */
    #[serde(default)]
    persona: Option<String>,
    /** \brief 本轮用户输入 */
    prompt: String,
    /** \brief 前端持有的历史记录 */
    #[serde(default)]
    history: Vec<Message>,
}

#[derive(Serialize, Debug)]
struct TalkResponse {
    persona: String,
    reply: String,
}

/**
 * \brief 列出内置人设。
 */
async fn list_personas() -> Json<Vec<PersonaDto>> {
    Json(
        PersonaProfile::builtin()
            .into_iter()
            .map(|p| PersonaDto {
                key: p.key,
                name: p.name,
            })
            .collect(),
    )
}

/**
 * \brief 对话接口：POST /api/talk，失败时返回错误状态，由前端显示兜底文案。
 */
async fn talk(
    State(state): State<AppState>,
    Json(req): Json<TalkRequest>,
) -> Result<Json<TalkResponse>, (StatusCode, String)> {
    let key = req.persona.as_deref().unwrap_or("kurumi");
    let persona = PersonaProfile::by_key(key)
        .ok_or_else(|| (StatusCode::BAD_REQUEST, format!("未知的人设: {}", key)))?;

    let reply = state
        .relay
        .relay(&persona, &req.prompt, &req.history)
        .await
        .map_err(relay_err)?;

    Ok(Json(TalkResponse {
        persona: persona.key,
        reply,
    }))
}

/**
 * \brief 健康检查：尝试列出模型并返回状态。
 */
async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    let cfg = state.relay.config();
    match state.relay.list_models().await {
        Ok(list) => Json(serde_json::json!({
            "ok": true,
            "base": cfg.base_url,
            "model": cfg.model,
            "models": list.len()
        })),
        Err(e) => Json(serde_json::json!({
            "ok": false,
            "base": cfg.base_url,
            "model": cfg.model,
            "error": e.to_string()
        })),
    }
}

fn relay_err(e: RelayError) -> (StatusCode, String) {
    let status = match &e {
        RelayError::Validation(_) => StatusCode::BAD_REQUEST,
        RelayError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        RelayError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::BAD_GATEWAY,
    };
    (status, e.to_string())
}
