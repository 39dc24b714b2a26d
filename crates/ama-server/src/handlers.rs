//! HTTP and WebSocket handlers.
//!
//! `GET {subscribe_path}/:room_id` admits a subscriber to a room and upgrades
//! it to a push-only WebSocket. The `/api` routes read and write rooms and
//! questions; every successful write queues the matching notification.

use crate::config::Config;
use crate::error::ApiError;
use crate::metrics::{self, BroadcastMetrics, ConnectionMetricsGuard};
use crate::store::{Question, Room, RoomStore};
use ama_core::{
    Broadcaster, Dispatcher, Event, Notifier, NotifyError, Registry, RoomId, Session,
};
use ama_transport::WebSocketConnection;
use anyhow::Result;
use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        ConnectInfo, Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Shared server state.
pub struct AppState {
    /// Live subscribers per room.
    pub registry: Arc<Registry>,
    /// Queue in front of the broadcaster.
    pub notifier: Notifier,
    /// Rooms and questions.
    pub store: Arc<dyn RoomStore>,
    /// Server configuration.
    pub config: Config,
    /// Process-wide shutdown signal.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Build the core pipeline and the state sharing it.
    ///
    /// The returned [`Dispatcher`] runs until `shutdown` is cancelled.
    #[must_use]
    pub fn new(
        config: Config,
        store: Arc<dyn RoomStore>,
        shutdown: CancellationToken,
    ) -> (Arc<Self>, Dispatcher) {
        let registry = Arc::new(Registry::with_config(config.registry_config()));
        let broadcaster =
            Broadcaster::with_config(Arc::clone(&registry), config.broadcaster_config())
                .with_observer(Arc::new(BroadcastMetrics::new(Arc::clone(&registry))));
        let (notifier, dispatcher) = Dispatcher::spawn(
            Arc::new(broadcaster),
            config.dispatcher_config(),
            shutdown.clone(),
        );

        let state = Arc::new(Self {
            registry,
            notifier,
            store,
            config,
            shutdown,
        });

        (state, dispatcher)
    }

    /// Queue an event. A full queue drops it.
    fn publish(&self, event: Event) {
        if let Err(e) = self.notifier.notify(event) {
            metrics::record_dropped(match e {
                NotifyError::QueueFull => "queue_full",
                NotifyError::Closed => "closed",
            });
            debug!(error = %e, "Notification not queued");
        }
    }
}

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(&state.config.subscribe_route(), get(subscribe_handler))
        .route("/api/rooms", post(create_room).get(list_rooms))
        .route("/api/rooms/:room_id", get(get_room))
        .route(
            "/api/rooms/:room_id/questions",
            post(create_question).get(list_questions),
        )
        .route(
            "/api/rooms/:room_id/questions/:question_id",
            get(get_question),
        )
        .route(
            "/api/rooms/:room_id/questions/:question_id/react",
            patch(react).delete(unreact),
        )
        .route(
            "/api/rooms/:room_id/questions/:question_id/answer",
            patch(answer),
        )
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Serve on `listener` until the state's shutdown token is cancelled.
///
/// # Errors
///
/// Returns an error if the server fails.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<()> {
    let shutdown = state.shutdown.clone();
    let app = router(state).into_make_service_with_connect_info::<SocketAddr>();

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    Ok(())
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(
    config: Config,
    store: Arc<dyn RoomStore>,
    shutdown: CancellationToken,
) -> Result<()> {
    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let addr = config.bind_addr()?;
    let route = config.subscribe_route();
    let (state, dispatcher) = AppState::new(config, store, shutdown);

    let listener = TcpListener::bind(addr).await?;
    info!("AMA server listening on {}", addr);
    info!("Subscription endpoint: ws://{}{}", addr, route);

    serve(listener, state).await?;
    dispatcher.join().await;

    info!("AMA server stopped");
    Ok(())
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stats = state.registry.stats();
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "rooms": stats.room_count,
        "subscribers": stats.subscriber_count,
    }))
}

/// Subscription handler.
///
/// The room is checked before the upgrade so a bad request gets a plain HTTP
/// error.
async fn subscribe_handler(
    ws: Option<WebSocketUpgrade>,
    Path(room_id): Path<String>,
    remote: Option<ConnectInfo<SocketAddr>>,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let room_id = RoomId::parse(&room_id)?;
    state.store.get_room(&room_id).await?;

    let Some(ws) = ws else {
        return Err(ApiError::BadRequest(
            "Expected a WebSocket upgrade".to_string(),
        ));
    };

    let session = Session::new(room_id, Arc::clone(&state.registry), state.shutdown.clone());
    let remote = remote.map(|ConnectInfo(addr)| addr);

    Ok(ws
        .max_message_size(state.config.transport.max_message_size)
        .on_upgrade(move |socket| handle_socket(socket, session, remote, state))
        .into_response())
}

/// Drive one upgraded subscriber connection until it closes.
async fn handle_socket(
    socket: WebSocket,
    mut session: Session,
    remote: Option<SocketAddr>,
    state: Arc<AppState>,
) {
    let _metrics_guard = ConnectionMetricsGuard::new();
    let (connection, peer) = WebSocketConnection::split(socket, remote);

    if let Err(e) = session.upgraded(connection) {
        warn!(room = %session.room_id(), error = %e, "Upgrade rejected");
        metrics::record_error("session");
        return;
    }
    if let Err(e) = session.subscribe() {
        warn!(room = %session.room_id(), error = %e, "Subscribe rejected");
        metrics::record_error("session");
        return;
    }

    metrics::record_subscription();
    metrics::set_active_rooms(state.registry.stats().room_count);

    match session.wait_closed(peer.closed()).await {
        Ok(reason) => debug!(room = %session.room_id(), reason = ?reason, "Subscriber gone"),
        Err(e) => {
            warn!(room = %session.room_id(), error = %e, "Session failed");
            metrics::record_error("session");
        }
    }

    metrics::set_active_rooms(state.registry.stats().room_count);
}

/// Body of `POST /api/rooms`.
#[derive(Debug, Deserialize)]
pub struct CreateRoomRequest {
    pub theme: String,
}

/// Body of `POST /api/rooms/:room_id/questions`.
#[derive(Debug, Deserialize)]
pub struct CreateQuestionRequest {
    pub text: String,
}

/// Response of `GET /api/rooms/:room_id/questions`.
#[derive(Debug, Serialize)]
pub struct QuestionList {
    pub list: Vec<Question>,
    pub total: usize,
}

fn parse_question_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::InvalidQuestionId)
}

async fn create_room(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateRoomRequest>,
) -> Result<(StatusCode, Json<Room>), ApiError> {
    let room = state.store.create_room(&request.theme).await?;
    info!(room = %room.id, "Room created");
    Ok((StatusCode::CREATED, Json(room)))
}

async fn list_rooms(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Room>>, ApiError> {
    Ok(Json(state.store.list_rooms().await?))
}

async fn get_room(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
) -> Result<Json<Room>, ApiError> {
    let room_id = RoomId::parse(&room_id)?;
    Ok(Json(state.store.get_room(&room_id).await?))
}

async fn create_question(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
    Json(request): Json<CreateQuestionRequest>,
) -> Result<(StatusCode, Json<Question>), ApiError> {
    let room_id = RoomId::parse(&room_id)?;
    let question = state.store.create_question(&room_id, &request.text).await?;

    state.publish(Event::question_created(
        room_id,
        question.id.to_string(),
        question.text.clone(),
    ));

    Ok((StatusCode::CREATED, Json(question)))
}

async fn list_questions(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
) -> Result<Json<QuestionList>, ApiError> {
    let room_id = RoomId::parse(&room_id)?;
    let list = state.store.list_questions(&room_id).await?;
    Ok(Json(QuestionList {
        total: list.len(),
        list,
    }))
}

async fn get_question(
    State(state): State<Arc<AppState>>,
    Path((room_id, question_id)): Path<(String, String)>,
) -> Result<Json<Question>, ApiError> {
    let room_id = RoomId::parse(&room_id)?;
    let question_id = parse_question_id(&question_id)?;
    Ok(Json(state.store.get_question(&room_id, question_id).await?))
}

async fn react(
    State(state): State<Arc<AppState>>,
    Path((room_id, question_id)): Path<(String, String)>,
) -> Result<Json<Question>, ApiError> {
    let room_id = RoomId::parse(&room_id)?;
    let question_id = parse_question_id(&question_id)?;
    let question = state.store.react(&room_id, question_id).await?;

    state.publish(Event::reaction_increased(
        room_id,
        question.id.to_string(),
        question.reaction_count,
    ));

    Ok(Json(question))
}

async fn unreact(
    State(state): State<Arc<AppState>>,
    Path((room_id, question_id)): Path<(String, String)>,
) -> Result<Json<Question>, ApiError> {
    let room_id = RoomId::parse(&room_id)?;
    let question_id = parse_question_id(&question_id)?;
    let question = state.store.unreact(&room_id, question_id).await?;

    state.publish(Event::reaction_decreased(
        room_id,
        question.id.to_string(),
        question.reaction_count,
    ));

    Ok(Json(question))
}

async fn answer(
    State(state): State<Arc<AppState>>,
    Path((room_id, question_id)): Path<(String, String)>,
) -> Result<Json<Question>, ApiError> {
    let room_id = RoomId::parse(&room_id)?;
    let question_id = parse_question_id(&question_id)?;
    let question = state.store.mark_answered(&room_id, question_id).await?;

    state.publish(Event::question_answered(
        room_id,
        question.id.to_string(),
        question.text.clone(),
    ));

    Ok(Json(question))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use ama_core::Subscriber;
    use ama_protocol::Category;
    use ama_transport::{MemoryConnection, MemoryPeer};
    use futures_util::{SinkExt, StreamExt};
    use std::time::Duration;
    use tokio_tungstenite::{connect_async, tungstenite};

    fn test_state() -> (Arc<AppState>, Dispatcher) {
        let config = Config {
            metrics: crate::config::MetricsConfig {
                enabled: false,
                ..Default::default()
            },
            ..Config::default()
        };
        AppState::new(config, Arc::new(MemoryStore::new()), CancellationToken::new())
    }

    async fn spawn_server(
        state: Arc<AppState>,
    ) -> (SocketAddr, tokio::task::JoinHandle<Result<()>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        (addr, tokio::spawn(serve(listener, state)))
    }

    async fn wait_for(condition: impl Fn() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    fn watch_room(state: &AppState, room_id: &RoomId) -> MemoryPeer {
        let (conn, peer) = MemoryConnection::pair();
        state.registry.register(room_id, Subscriber::new(conn));
        peer
    }

    #[tokio::test]
    async fn test_subscriber_receives_question_created() {
        let (state, _dispatcher) = test_state();
        let room = state.store.create_room("Live").await.unwrap();
        let (addr, _server) = spawn_server(Arc::clone(&state)).await;

        let url = format!("ws://{}/subscribe/{}", addr, room.id);
        let (mut client, _) = connect_async(url).await.unwrap();
        wait_for(|| state.registry.subscriber_count(&room.id) == 1).await;

        let Json(question) = create_question(
            State(Arc::clone(&state)),
            Path(room.id.to_string()),
            Json(CreateQuestionRequest {
                text: "hi".to_string(),
            }),
        )
        .await
        .unwrap()
        .1;

        let message = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let expected = format!(
            r#"{{"category":"question_created","value":{{"id":"{}","text":"hi","count":0}}}}"#,
            question.id
        );
        assert_eq!(message, tungstenite::Message::Text(expected));
    }

    #[tokio::test]
    async fn test_subscribe_rejects_bad_rooms() {
        let (state, _dispatcher) = test_state();
        let (addr, _server) = spawn_server(Arc::clone(&state)).await;

        let unknown = format!("ws://{}/subscribe/{}", addr, RoomId::new_v4());
        match connect_async(unknown).await {
            Err(tungstenite::Error::Http(response)) => {
                assert_eq!(response.status(), StatusCode::NOT_FOUND);
            }
            other => panic!("expected 404, got {:?}", other.map(|_| ())),
        }

        let malformed = format!("ws://{}/subscribe/not-a-room", addr);
        match connect_async(malformed).await {
            Err(tungstenite::Error::Http(response)) => {
                assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            }
            other => panic!("expected 400, got {:?}", other.map(|_| ())),
        }

        assert_eq!(state.registry.stats().room_count, 0);
    }

    #[tokio::test]
    async fn test_subscribe_without_upgrade() {
        let (state, _dispatcher) = test_state();
        let room = state.store.create_room("Plain").await.unwrap();

        let err = subscribe_handler(None, Path(room.id.to_string()), None, State(state))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_client_close_unregisters() {
        let (state, _dispatcher) = test_state();
        let room = state.store.create_room("Leaving").await.unwrap();
        let (addr, _server) = spawn_server(Arc::clone(&state)).await;

        let url = format!("ws://{}/subscribe/{}", addr, room.id);
        let (mut client, _) = connect_async(url).await.unwrap();
        wait_for(|| state.registry.subscriber_count(&room.id) == 1).await;

        client.close(None).await.unwrap();
        wait_for(|| state.registry.subscriber_count(&room.id) == 0).await;
        assert!(state.registry.room_ids().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_closes_subscribers() {
        let (state, dispatcher) = test_state();
        let room = state.store.create_room("Closing").await.unwrap();
        let (addr, server) = spawn_server(Arc::clone(&state)).await;

        let url = format!("ws://{}/subscribe/{}", addr, room.id);
        let (mut client, _) = connect_async(url).await.unwrap();
        wait_for(|| state.registry.subscriber_count(&room.id) == 1).await;

        state.shutdown.cancel();

        tokio::time::timeout(Duration::from_secs(5), async {
            while let Some(Ok(message)) = client.next().await {
                if message.is_close() {
                    break;
                }
            }
        })
        .await
        .unwrap();

        wait_for(|| state.registry.subscriber_count(&room.id) == 0).await;
        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        dispatcher.join().await;
    }

    #[tokio::test]
    async fn test_mutations_publish_events() {
        let (state, _dispatcher) = test_state();
        let room = state.store.create_room("Events").await.unwrap();
        let question = state.store.create_question(&room.id, "Why?").await.unwrap();
        let mut peer = watch_room(&state, &room.id);
        let path = || Path((room.id.to_string(), question.id.to_string()));

        react(State(Arc::clone(&state)), path()).await.unwrap();
        let received = peer.recv_notification().await.unwrap();
        assert_eq!(received.category, Category::QuestionReactionIncrease);
        assert_eq!(received.value.id, question.id.to_string());
        assert_eq!(received.value.count, 1);

        unreact(State(Arc::clone(&state)), path()).await.unwrap();
        let received = peer.recv_notification().await.unwrap();
        assert_eq!(received.category, Category::QuestionReactionDecrease);
        assert_eq!(received.value.count, 0);

        let Json(answered) = answer(State(Arc::clone(&state)), path()).await.unwrap();
        assert!(answered.answered);
        let received = peer.recv_notification().await.unwrap();
        assert_eq!(received.category, Category::QuestionAnswered);
        assert_eq!(received.value.text, "Why?");
    }

    #[tokio::test]
    async fn test_failed_write_publishes_nothing() {
        let (state, _dispatcher) = test_state();
        let room = state.store.create_room("Quiet").await.unwrap();
        let mut peer = watch_room(&state, &room.id);

        let err = react(
            State(Arc::clone(&state)),
            Path((room.id.to_string(), Uuid::new_v4().to_string())),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::QuestionNotFound));

        let err = create_question(
            State(Arc::clone(&state)),
            Path(room.id.to_string()),
            Json(CreateQuestionRequest {
                text: "  ".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));

        // Nothing is queued for rejected writes.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(peer.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_room_routes() {
        let (state, _dispatcher) = test_state();

        let (status, Json(room)) = create_room(
            State(Arc::clone(&state)),
            Json(CreateRoomRequest {
                theme: "Rust".to_string(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);

        let Json(rooms) = list_rooms(State(Arc::clone(&state))).await.unwrap();
        assert_eq!(rooms, vec![room.clone()]);

        let Json(fetched) = get_room(State(Arc::clone(&state)), Path(room.id.to_string()))
            .await
            .unwrap();
        assert_eq!(fetched, room);

        let err = get_room(State(Arc::clone(&state)), Path("nope".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidRoomId));

        let Json(questions) =
            list_questions(State(Arc::clone(&state)), Path(room.id.to_string()))
                .await
                .unwrap();
        assert_eq!(questions.total, 0);

        let err = get_question(
            State(state),
            Path((room.id.to_string(), "nope".to_string())),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::InvalidQuestionId));
    }
}
