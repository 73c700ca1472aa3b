//! HTTP request handlers

use super::types::{ErrorResponse, MessageRequest, MessagesResponse};
use super::AppState;
use crate::adapter::{ChatIdentity, InboundEvent};
use crate::component::{ApiError, ApiRequest};
use crate::engine::QuietOutcome;
use crate::error::ErrorClass;
use crate::route::{ApiMethod, Menu};
use crate::RenderError;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{any, get, post},
    Json, Router,
};
use serde_json::Value;
use tower_http::trace::TraceLayer;

/// Header carrying the shared webhook secret
pub const TOKEN_HEADER: &str = "x-chatframe-token";

/// Create the webhook router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/chats/:chat_id/messages",
            post(post_message).get(list_messages),
        )
        .route("/chats/:chat_id/back", post(go_back))
        .route("/api/*path", any(dispatch_api))
        .route("/menus", get(list_menus))
        .route("/version", get(get_version))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    let presented = headers.get(TOKEN_HEADER).and_then(|v| v.to_str().ok());
    if presented == Some(state.token.as_str()) {
        Ok(())
    } else {
        Err(AppError::Unauthorized)
    }
}

// ============================================================
// Messages
// ============================================================

async fn post_message(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<MessageRequest>,
) -> Result<Json<MessagesResponse>, AppError> {
    authorize(&state, &headers)?;
    if req.text.is_none() && req.callback.is_none() {
        return Err(AppError::BadRequest(
            "Message needs text or a callback".to_string(),
        ));
    }

    let mut chat = ChatIdentity::new(chat_id.clone());
    if let Some(user_id) = req.user_id {
        chat = chat.with_user(user_id);
    }
    let event = InboundEvent::new(chat, req.text, req.callback);
    tracing::info!(chat_id = %chat_id, "Inbound message");

    let outcome = state.core.handle_message_update(event).await?;
    Ok(Json(MessagesResponse {
        messages: state.core.adapter().outbox(&chat_id),
        chat_id,
        settled: outcome == QuietOutcome::Quiet,
    }))
}

async fn list_messages(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<MessagesResponse>, AppError> {
    authorize(&state, &headers)?;
    Ok(Json(MessagesResponse {
        messages: state.core.adapter().outbox(&chat_id),
        chat_id,
        settled: true,
    }))
}

async fn go_back(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<MessagesResponse>, AppError> {
    authorize(&state, &headers)?;
    let chat = ChatIdentity::new(chat_id.clone());
    state.core.handle().go_back(&chat).await?;
    let outcome = state.core.wait_quiet(&chat).await?;
    Ok(Json(MessagesResponse {
        messages: state.core.adapter().outbox(&chat_id),
        chat_id,
        settled: outcome == QuietOutcome::Quiet,
    }))
}

// ============================================================
// Route api handlers
// ============================================================

async fn dispatch_api(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> Result<Response, AppError> {
    let api_method = ApiMethod::parse(method.as_str())
        .ok_or_else(|| AppError::MethodNotAllowed(method.to_string()))?;
    let target = uri
        .path_and_query()
        .map_or_else(|| uri.path().to_string(), |pq| pq.as_str().to_string());

    let found = state
        .core
        .router()
        .resolve_api(&target, api_method)
        .ok_or_else(|| AppError::NotFound(format!("No {api_method} handler for {}", uri.path())))?;

    let body = if body.is_empty() {
        None
    } else {
        Some(
            serde_json::from_slice::<Value>(&body)
                .map_err(|e| AppError::BadRequest(format!("Invalid JSON body: {e}")))?,
        )
    };

    tracing::debug!(method = %api_method, path = %uri.path(), handler = %found.handler.name, "Api call");
    let response = found
        .handler
        .value
        .handle(ApiRequest {
            method: api_method,
            path: uri.path().to_string(),
            params: found.params,
            query: found.query,
            body,
            storage: std::sync::Arc::clone(state.core.storage()),
        })
        .await?;

    let status = StatusCode::from_u16(response.status)
        .map_err(|_| AppError::Internal(format!("Handler returned status {}", response.status)))?;
    Ok((status, Json(response.body)).into_response())
}

// ============================================================
// Misc
// ============================================================

async fn list_menus(State(state): State<AppState>) -> Json<Vec<Menu>> {
    Json(state.core.adapter().menus())
}

async fn get_version() -> &'static str {
    concat!("chatframe ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Unauthorized,
    NotFound(String),
    MethodNotAllowed(String),
    Status(StatusCode, String),
    Internal(String),
}

impl From<RenderError> for AppError {
    fn from(err: RenderError) -> Self {
        match err.class() {
            ErrorClass::Fatal => {
                tracing::error!(error = %err, "Request failed");
                AppError::Internal(err.to_string())
            }
            _ => AppError::Status(StatusCode::UNPROCESSABLE_ENTITY, err.to_string()),
        }
    }
}

impl From<ApiError> for AppError {
    fn from(err: ApiError) -> Self {
        let status = StatusCode::from_u16(err.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        AppError::Status(status, err.message)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                format!("Missing or wrong {TOKEN_HEADER} header"),
            ),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::MethodNotAllowed(method) => (
                StatusCode::METHOD_NOT_ALLOWED,
                format!("Method {method} is not supported"),
            ),
            AppError::Status(status, msg) => (status, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app;
    use crate::config::CoreConfig;
    use crate::engine::Core;
    use crate::route::Router as RouteRouter;
    use crate::storage::MemoryStorage;
    use crate::webhook::WebhookAdapter;
    use axum::http::HeaderValue;
    use std::sync::Arc;
    use std::time::Duration;

    async fn state() -> AppState {
        let router = RouteRouter::init_from_routes(
            &app::route_file(),
            &app::catalog(),
            Arc::new(MemoryStorage::new()),
        )
        .unwrap();
        let config = CoreConfig {
            quiet_window: Duration::from_millis(100),
            ..CoreConfig::default()
        };
        let core = Core::new(Arc::new(WebhookAdapter::new()), Arc::new(router), config);
        core.init().await.unwrap();
        AppState::new(core, "secret")
    }

    fn headers(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(TOKEN_HEADER, HeaderValue::from_str(token).unwrap());
        headers
    }

    fn text(t: &str) -> Json<MessageRequest> {
        Json(MessageRequest {
            text: Some(t.to_string()),
            ..MessageRequest::default()
        })
    }

    #[tokio::test]
    async fn test_rejects_wrong_token() {
        let state = state().await;
        let err = post_message(
            State(state.clone()),
            Path("c1".into()),
            headers("nope"),
            text("/start"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized));

        let err = list_messages(State(state), Path("c1".into()), HeaderMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized));
    }

    #[tokio::test]
    async fn test_empty_message_is_bad_request() {
        let state = state().await;
        let err = post_message(
            State(state),
            Path("c1".into()),
            headers("secret"),
            Json(MessageRequest::default()),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_message_round_trip() {
        let state = state().await;
        let Json(response) = post_message(
            State(state.clone()),
            Path("c1".into()),
            headers("secret"),
            text("/start"),
        )
        .await
        .unwrap();
        assert!(response.settled);
        assert_eq!(response.messages.len(), 1);
        assert!(response.messages[0].text.contains("Welcome"));

        let Json(response) = post_message(
            State(state.clone()),
            Path("c1".into()),
            headers("secret"),
            text("/users_42"),
        )
        .await
        .unwrap();
        // each turn gets its own reply
        assert_eq!(response.messages.len(), 2);
        let last = &response.messages[1];
        assert!(!last.edited);
        assert!(last.text.contains("42"));
        assert_ne!(last.message_id, response.messages[0].message_id);
        assert!(response.messages[0].text.contains("Welcome"));

        let Json(listed) = list_messages(State(state), Path("c1".into()), headers("secret"))
            .await
            .unwrap();
        assert_eq!(listed.messages, response.messages);
    }

    #[tokio::test]
    async fn test_api_dispatch() {
        let state = state().await;
        let response = dispatch_api(
            State(state.clone()),
            Method::GET,
            Uri::from_static("/api/health"),
            Bytes::new(),
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let err = dispatch_api(
            State(state.clone()),
            Method::GET,
            Uri::from_static("/api/nothing-here"),
            Bytes::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let err = dispatch_api(
            State(state),
            Method::OPTIONS,
            Uri::from_static("/api/health"),
            Bytes::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::MethodNotAllowed(_)));
    }

    #[tokio::test]
    async fn test_menus_are_published() {
        let state = state().await;
        let Json(menus) = list_menus(State(state)).await;
        assert!(!menus.is_empty());
        assert_eq!(menus[0].href, "/");
    }

    #[test]
    fn test_error_statuses() {
        let response = AppError::from(RenderError::NothingToRender).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let response = AppError::from(RenderError::component("x")).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let response = AppError::from(ApiError::bad_request("no")).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
