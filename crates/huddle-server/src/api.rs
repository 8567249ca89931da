//! HTTP surface for rooms, moderation and sessions.
//!
//! Every handler calls the same [`RoomManager`](huddle_core::RoomManager)
//! operations the WebSocket protocol uses.

use crate::handlers::AppState;
use crate::metrics;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use huddle_core::{Ban, ChatError, Clock, NewRoom, RoomSnapshot, RoomSummary, Session, Stats};
use huddle_protocol::RoomInfo;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

type ApiResult<T> = Result<T, ApiError>;

/// A failed HTTP request.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Chat(#[from] ChatError),

    #[error("{0}")]
    NotFound(&'static str),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Chat(err) => match err {
                ChatError::RoomNotFound | ChatError::ParticipantNotFound => StatusCode::NOT_FOUND,
                ChatError::RoomFull => StatusCode::CONFLICT,
                ChatError::Banned { .. } => StatusCode::FORBIDDEN,
                ChatError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
                ChatError::InvalidInput(_)
                | ChatError::MalformedMessage(_)
                | ChatError::NotInRoom
                | ChatError::ContentFlagged { .. } => StatusCode::BAD_REQUEST,
                ChatError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match &self {
            ApiError::Chat(err) => {
                metrics::record_error(err.kind());
                err.client_message()
            }
            ApiError::NotFound(what) => (*what).to_string(),
        };
        (self.status(), Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// Body of `POST /rooms`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    pub name: String,
    #[serde(default)]
    pub max_participants: Option<u32>,
    #[serde(default)]
    pub expires_in_minutes: Option<u64>,
    #[serde(default)]
    pub created_by: Option<String>,
}

/// Routes mounted under the API prefix.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/rooms", get(list_rooms).post(create_room))
        .route("/rooms/:room_id", get(room_detail).delete(delete_room))
        .route(
            "/rooms/:room_id/participants/:participant_id",
            delete(kick_participant),
        )
        .route("/rooms/:room_id/bans", get(list_bans))
        .route("/bans/:ban_id", delete(remove_ban))
        .route("/sessions", post(create_session))
        .route("/sessions/:session_id", get(get_session).delete(delete_session))
        .route("/stats", get(stats))
}

async fn create_room(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateRoomRequest>,
) -> ApiResult<(StatusCode, Json<RoomInfo>)> {
    let manager = &state.manager;
    let expires_at = request.expires_in_minutes.map(|minutes| {
        let lifetime = Duration::from_secs(minutes.saturating_mul(60));
        manager
            .clock()
            .now_millis()
            .saturating_add(lifetime.as_millis() as u64)
    });

    let room = manager
        .create_room(NewRoom {
            name: request.name,
            max_participants: request.max_participants,
            expires_at,
            created_by: request.created_by,
        })
        .await?;
    metrics::refresh_room_gauge(&state.manager).await;

    Ok((StatusCode::CREATED, Json(room.info())))
}

async fn list_rooms(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<RoomSummary>>> {
    Ok(Json(state.manager.list_rooms().await?))
}

async fn room_detail(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
) -> ApiResult<Json<RoomSnapshot>> {
    Ok(Json(state.manager.room_detail(&room_id).await?))
}

async fn delete_room(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
) -> ApiResult<StatusCode> {
    if !state.manager.delete_room(&room_id).await? {
        return Err(ApiError::NotFound("Room not found"));
    }
    metrics::refresh_room_gauge(&state.manager).await;
    Ok(StatusCode::NO_CONTENT)
}

async fn kick_participant(
    State(state): State<Arc<AppState>>,
    Path((room_id, participant_id)): Path<(String, u64)>,
) -> ApiResult<StatusCode> {
    let participant = state
        .manager
        .kick_participant(&room_id, participant_id)
        .await?;
    info!(room = %room_id, nickname = %participant.nickname, "Participant kicked over HTTP");
    Ok(StatusCode::NO_CONTENT)
}

async fn list_bans(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
) -> ApiResult<Json<Vec<Ban>>> {
    Ok(Json(state.manager.list_bans(&room_id).await?))
}

async fn remove_ban(
    State(state): State<Arc<AppState>>,
    Path(ban_id): Path<u64>,
) -> ApiResult<StatusCode> {
    if state.manager.remove_ban(ban_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("Ban not found"))
    }
}

async fn create_session(State(state): State<Arc<AppState>>) -> (StatusCode, Json<Session>) {
    (StatusCode::CREATED, Json(state.manager.create_session()))
}

async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<Session>> {
    state
        .manager
        .session(&session_id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound("Session not found"))
}

async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> ApiResult<StatusCode> {
    if state.manager.delete_session(&session_id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("Session not found"))
    }
}

async fn stats(State(state): State<Arc<AppState>>) -> ApiResult<Json<Stats>> {
    let stats = state.manager.stats().await?;
    metrics::set_active_rooms(stats.rooms);
    Ok(Json(stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::handlers::router;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request};
    use huddle_core::ConnectionId;
    use huddle_protocol::ServerEvent;
    use serde_json::{json, Value};
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    struct TestApp {
        state: Arc<AppState>,
        app: Router,
    }

    impl TestApp {
        fn new() -> Self {
            let state = Arc::new(AppState::new(Config::default()));
            let app = router(state.clone());
            Self { state, app }
        }

        async fn call(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
            let request = Request::builder().method(method).uri(uri);
            let request = match body {
                Some(body) => request
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
                None => request.body(Body::empty()).unwrap(),
            };

            let response = self.app.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let value = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap()
            };
            (status, value)
        }

        async fn create_room(&self, body: Value) -> String {
            let (status, room) = self.call(Method::POST, "/api/rooms", Some(body)).await;
            assert_eq!(status, StatusCode::CREATED);
            room["id"].as_str().unwrap().to_string()
        }

        fn connect(&self) -> (ConnectionId, mpsc::UnboundedReceiver<huddle_core::Outbound>) {
            let (tx, rx) = mpsc::unbounded_channel();
            (self.state.manager.connect(tx), rx)
        }
    }

    #[tokio::test]
    async fn test_create_and_list_rooms() {
        let app = TestApp::new();
        let room_id = app
            .create_room(json!({"name": "Standup", "maxParticipants": 4, "createdBy": "ops"}))
            .await;
        assert_eq!(room_id.len(), 8);

        let (status, rooms) = app.call(Method::GET, "/api/rooms", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(rooms[0]["id"], room_id.as_str());
        assert_eq!(rooms[0]["name"], "Standup");
        assert_eq!(rooms[0]["maxParticipants"], 4);
        assert_eq!(rooms[0]["participantCount"], 0);
    }

    #[tokio::test]
    async fn test_room_expiry_from_minutes() {
        let app = TestApp::new();
        let (status, room) = app
            .call(
                Method::POST,
                "/api/rooms",
                Some(json!({"name": "Brief", "expiresInMinutes": 30})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let created_at = room["createdAt"].as_u64().unwrap();
        let expires_at = room["expiresAt"].as_u64().unwrap();
        assert!(expires_at >= created_at + 30 * 60 * 1000);
    }

    #[tokio::test]
    async fn test_invalid_room_rejected() {
        let app = TestApp::new();

        let (status, body) = app
            .call(Method::POST, "/api/rooms", Some(json!({"name": "  "})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().starts_with("Invalid input"));

        let (status, _) = app
            .call(
                Method::POST,
                "/api/rooms",
                Some(json!({"name": "Huge", "maxParticipants": 1000})),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_room_detail_and_delete() {
        let app = TestApp::new();
        let room_id = app.create_room(json!({"name": "Standup"})).await;

        let (conn, mut rx) = app.connect();
        app.state
            .manager
            .join_room(&conn, &room_id, "alice", None)
            .await
            .unwrap();

        let uri = format!("/api/rooms/{room_id}");
        let (status, detail) = app.call(Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(detail["room"]["id"], room_id.as_str());
        assert_eq!(detail["participants"][0]["nickname"], "alice");

        let (status, _) = app.call(Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let closed = std::iter::from_fn(|| rx.try_recv().ok()).any(|item| {
            matches!(
                item,
                huddle_core::Outbound::Event(event)
                    if *event == ServerEvent::error("This room has been closed")
            )
        });
        assert!(closed);

        let (status, body) = app.call(Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Room not found");

        let (status, _) = app.call(Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_kick_and_lift_ban() {
        let app = TestApp::new();
        let room_id = app.create_room(json!({"name": "Standup"})).await;

        let (conn, _rx) = app.connect();
        app.state
            .manager
            .join_room(&conn, &room_id, "bob", None)
            .await
            .unwrap();

        let (_, detail) = app
            .call(Method::GET, &format!("/api/rooms/{room_id}"), None)
            .await;
        let participant_id = detail["participants"][0]["id"].as_u64().unwrap();

        let kick_uri = format!("/api/rooms/{room_id}/participants/{participant_id}");
        let (status, _) = app.call(Method::DELETE, &kick_uri, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = app.call(Method::DELETE, &kick_uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        assert!(matches!(
            app.state.manager.join_room(&conn, &room_id, "bob", None).await,
            Err(ChatError::Banned { .. })
        ));

        let (status, bans) = app
            .call(Method::GET, &format!("/api/rooms/{room_id}/bans"), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(bans[0]["nickname"], "bob");
        assert_eq!(bans[0]["reason"], "kicked");

        let ban_uri = format!("/api/bans/{}", bans[0]["id"].as_u64().unwrap());
        let (status, _) = app.call(Method::DELETE, &ban_uri, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = app.call(Method::DELETE, &ban_uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        app.state
            .manager
            .join_room(&conn, &room_id, "bob", None)
            .await
            .unwrap();
    }

    #[test]
    fn test_error_status_codes() {
        let err = ApiError::from(ChatError::RoomFull);
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);

        let err = ApiError::from(ChatError::Banned { remaining_secs: 60 });
        assert_eq!(err.into_response().status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let app = TestApp::new();

        let (status, session) = app.call(Method::POST, "/api/sessions", None).await;
        assert_eq!(status, StatusCode::CREATED);
        let uri = format!("/api/sessions/{}", session["id"].as_str().unwrap());

        let (status, fetched) = app.call(Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["id"], session["id"]);

        let (status, _) = app.call(Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = app.call(Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = app.call(Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = app
            .call(Method::GET, "/api/sessions/not%20valid", None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_stats() {
        let app = TestApp::new();
        app.create_room(json!({"name": "One"})).await;
        let (_conn, _rx) = app.connect();

        let (status, stats) = app.call(Method::GET, "/api/stats", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats["rooms"], 1);
        assert_eq!(stats["connections"], 1);
        assert_eq!(stats["boundConnections"], 0);
    }
}
