use crate::core::FeedEvent;
use crate::router::SourceRouter;
use crate::window::{BoundedWindow, Direction, WindowError, WindowStart};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex, RwLock};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};
use verse_proto::protocol::{Command, FeedSnapshot, SourceMode};
use verse_proto::{Item, SearchField, SearchMatch, SourceError};

const DEFAULT_SEARCH_LIMIT: usize = 20;

#[derive(Clone)]
pub struct HttpState {
    pub snapshot: Arc<RwLock<FeedSnapshot>>,
    pub event_tx: mpsc::Sender<FeedEvent>,
    pub router: Arc<SourceRouter>,
    /// The ordered-browsing window, once a client has opened one. It is
    /// mutated in place by every slide.
    pub window: Arc<Mutex<Option<BoundedWindow>>>,
}

impl HttpState {
    pub fn new(
        snapshot: Arc<RwLock<FeedSnapshot>>,
        event_tx: mpsc::Sender<FeedEvent>,
        router: Arc<SourceRouter>,
    ) -> Self {
        Self {
            snapshot,
            event_tx,
            router,
            window: Arc::new(Mutex::new(None)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    #[serde(default)]
    exact: bool,
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct WindowView {
    window_start: usize,
    global_index: usize,
    local_index: usize,
    corpus_total: usize,
    /// This request refetched the window.
    reloaded: bool,
    items: Vec<Item>,
}

impl WindowView {
    fn of(window: &BoundedWindow, reloaded: bool) -> Self {
        Self {
            window_start: window.window_start(),
            global_index: window.global_index(),
            local_index: window.local_index(),
            corpus_total: window.corpus_total(),
            reloaded,
            items: window.items().to_vec(),
        }
    }
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/api/state", get(get_state))
        .route("/api/move/:pos", get(move_to).post(move_to))
        .route("/api/next", get(next).post(next))
        .route("/api/prev", get(prev).post(prev))
        .route("/api/source/:mode", get(switch_source).post(switch_source))
        .route("/api/search/:field/:query", get(search))
        .route("/api/window", get(window_current))
        .route("/api/window/open/:start", get(window_open).post(window_open))
        .route("/api/window/next", get(window_next).post(window_next))
        .route("/api/window/prev", get(window_prev).post(window_prev))
        .route("/api/window/jump/:global", get(window_jump).post(window_jump))
        .layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
        .with_state(state)
}

pub fn start_server(
    bind_address: String,
    port: u16,
    state: HttpState,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let app = build_router(state);

        let addr = format!("{}:{}", bind_address, port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind HTTP server to {}: {}", addr, e);
                return;
            }
        };

        info!("HTTP API server listening on http://{}", addr);

        if let Err(e) = axum::serve(listener, app).await {
            error!("HTTP server error: {}", e);
        }
    })
}

async fn send(state: &HttpState, cmd: Command) -> StatusCode {
    if state.event_tx.send(FeedEvent::Client(cmd)).await.is_err() {
        error!("Failed to forward command: feed core is gone");
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    StatusCode::ACCEPTED
}

async fn get_state(State(state): State<HttpState>) -> Json<FeedSnapshot> {
    Json(state.snapshot.read().await.clone())
}

async fn move_to(State(state): State<HttpState>, Path(pos): Path<usize>) -> StatusCode {
    let capacity = state.snapshot.read().await.capacity;
    if capacity > 0 && pos >= capacity {
        return StatusCode::BAD_REQUEST;
    }
    info!("HTTP API: move to {}", pos);
    send(&state, Command::MoveTo { position: pos }).await
}

async fn next(State(state): State<HttpState>) -> StatusCode {
    send(&state, Command::Next).await
}

async fn prev(State(state): State<HttpState>) -> StatusCode {
    send(&state, Command::Prev).await
}

async fn switch_source(State(state): State<HttpState>, Path(mode): Path<String>) -> StatusCode {
    let mode: SourceMode = match mode.parse() {
        Ok(m) => m,
        Err(e) => {
            warn!("HTTP API: {}", e);
            return StatusCode::BAD_REQUEST;
        }
    };
    info!("HTTP API: switch source to {}", mode);
    send(&state, Command::SwitchSource { mode }).await
}

async fn search(
    State(state): State<HttpState>,
    Path((field, query)): Path<(String, String)>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<Item>>, StatusCode> {
    let field: SearchField = field.parse().map_err(|_| StatusCode::BAD_REQUEST)?;
    let mode = if params.exact {
        SearchMatch::Exact
    } else {
        SearchMatch::Partial
    };
    let limit = params.limit.unwrap_or(DEFAULT_SEARCH_LIMIT).max(1);
    match state.router.search_by(field, &query, mode, limit).await {
        Ok(items) => Ok(Json(items)),
        Err(SourceError::InvalidQuery(reason)) => {
            warn!("HTTP API: search rejected: {}", reason);
            Err(StatusCode::BAD_REQUEST)
        }
        Err(e) => {
            warn!("HTTP API: search failed: {}", e);
            Err(StatusCode::BAD_GATEWAY)
        }
    }
}

fn window_status(e: WindowError) -> StatusCode {
    match e {
        WindowError::EmptyCorpus => StatusCode::NOT_FOUND,
        WindowError::UnknownTotal => StatusCode::UNPROCESSABLE_ENTITY,
        WindowError::Source(e) => {
            warn!("HTTP API: window fetch failed: {}", e);
            StatusCode::BAD_GATEWAY
        }
    }
}

async fn window_current(
    State(state): State<HttpState>,
) -> Result<Json<WindowView>, StatusCode> {
    let guard = state.window.lock().await;
    let window = guard.as_ref().ok_or(StatusCode::CONFLICT)?;
    Ok(Json(WindowView::of(window, false)))
}

/// Open (or reopen) the browsing window over the local corpus.
async fn window_open(
    State(state): State<HttpState>,
    Path(start): Path<String>,
) -> Result<Json<WindowView>, StatusCode> {
    let start: WindowStart = start.parse().map_err(|e| {
        warn!("HTTP API: {}", e);
        StatusCode::BAD_REQUEST
    })?;
    let window = BoundedWindow::create(state.router.local(), start)
        .await
        .map_err(window_status)?;
    info!(
        "HTTP API: window opened at {} of {}",
        window.window_start(),
        window.corpus_total()
    );
    let view = WindowView::of(&window, true);
    *state.window.lock().await = Some(window);
    Ok(Json(view))
}

async fn slide(state: &HttpState, direction: Direction) -> Result<Json<WindowView>, StatusCode> {
    let mut guard = state.window.lock().await;
    let window = guard.as_mut().ok_or(StatusCode::CONFLICT)?;
    let reloaded = window.slide(direction).await.map_err(window_status)?;
    Ok(Json(WindowView::of(window, reloaded)))
}

async fn window_next(State(state): State<HttpState>) -> Result<Json<WindowView>, StatusCode> {
    slide(&state, Direction::Next).await
}

async fn window_prev(State(state): State<HttpState>) -> Result<Json<WindowView>, StatusCode> {
    slide(&state, Direction::Prev).await
}

async fn window_jump(
    State(state): State<HttpState>,
    Path(global): Path<usize>,
) -> Result<Json<WindowView>, StatusCode> {
    let mut guard = state.window.lock().await;
    let window = guard.as_mut().ok_or(StatusCode::CONFLICT)?;
    window.jump_to(global).await.map_err(window_status)?;
    Ok(Json(WindowView::of(window, true)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::time::Duration;
    use tower::ServiceExt;
    use verse_proto::local::LocalCorpus;
    use verse_proto::{CorpusSource, ItemId};

    fn app_state(poems: u64) -> (HttpState, mpsc::Receiver<FeedEvent>) {
        let items = (0..poems)
            .map(|i| {
                let author = if i % 2 == 0 { "Robert Frost" } else { "Emily Dickinson" };
                Item::new(ItemId::Local(i), format!("Poem {}", i), author, "line")
            })
            .collect();
        let local: Arc<dyn CorpusSource> =
            Arc::new(LocalCorpus::with_rng(items, StdRng::seed_from_u64(3)));
        let (event_tx, event_rx) = mpsc::channel(8);
        let state = HttpState::new(
            Arc::new(RwLock::new(FeedSnapshot {
                cursor: 7,
                capacity: 2000,
                ..FeedSnapshot::default()
            })),
            event_tx,
            Arc::new(SourceRouter::new(local, None, 3, Duration::from_secs(60))),
        );
        (state, event_rx)
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_state_returns_snapshot() {
        let (state, _rx) = app_state(3);
        let (status, body) = get_json(build_router(state), "/api/state").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["cursor"], 7);
        assert_eq!(body["mode"], "hybrid");
    }

    #[tokio::test]
    async fn test_move_forwards_command() {
        let (state, mut rx) = app_state(3);
        let response = build_router(state)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/move/12")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        match rx.recv().await {
            Some(FeedEvent::Client(Command::MoveTo { position })) => assert_eq!(position, 12),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_move_past_capacity_rejected() {
        let (state, _rx) = app_state(3);
        let (status, _) = get_json(build_router(state), "/api/move/2000").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_source_mode_rejected() {
        let (state, _rx) = app_state(3);
        let (status, _) = get_json(build_router(state), "/api/source/cloud").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_search_served_locally_without_remote() {
        let (state, _rx) = app_state(10);
        let (status, body) =
            get_json(build_router(state), "/api/search/author/frost?limit=3").await;
        assert_eq!(status, StatusCode::OK);
        let items = body.as_array().unwrap();
        assert_eq!(items.len(), 3);
        assert!(items.iter().all(|i| i["author"] == "Robert Frost"));
    }

    #[tokio::test]
    async fn test_window_slides_across_a_reload() {
        let (state, _rx) = app_state(100);
        let app = build_router(state);

        let (status, body) = get_json(app.clone(), "/api/window/open/50").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["window_start"], 50);
        assert_eq!(body["global_index"], 60);
        assert_eq!(body["items"].as_array().unwrap().len(), 21);

        for step in 1..10 {
            let (status, body) = get_json(app.clone(), "/api/window/next").await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["global_index"], 60 + step);
            assert_eq!(body["reloaded"], false);
        }

        // Local index 19 -> 20 hits the edge and shifts by ten.
        let (_, body) = get_json(app.clone(), "/api/window/next").await;
        assert_eq!(body["reloaded"], true);
        assert_eq!(body["window_start"], 60);
        assert_eq!(body["global_index"], 70);
        assert_eq!(body["local_index"], 10);
        assert_eq!(body["items"][10]["title"], "Poem 70");

        // The window persists between requests.
        let (status, body) = get_json(app.clone(), "/api/window").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["global_index"], 70);

        let (_, body) = get_json(app.clone(), "/api/window/prev").await;
        assert_eq!(body["global_index"], 69);
        assert_eq!(body["reloaded"], false);

        let (status, body) = get_json(app, "/api/window/jump/5").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["window_start"], 0);
        assert_eq!(body["global_index"], 5);
    }

    #[tokio::test]
    async fn test_window_routes_without_an_open_window() {
        let (state, _rx) = app_state(100);
        let app = build_router(state);
        for uri in ["/api/window", "/api/window/next", "/api/window/prev", "/api/window/jump/3"] {
            let (status, _) = get_json(app.clone(), uri).await;
            assert_eq!(status, StatusCode::CONFLICT, "{}", uri);
        }
        let (status, _) = get_json(app, "/api/window/open/middle").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_window_over_empty_corpus_not_found() {
        let (state, _rx) = app_state(0);
        let app = build_router(state);
        let (status, _) = get_json(app.clone(), "/api/window/open/beginning").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = get_json(app, "/api/window/next").await;
        assert_eq!(status, StatusCode::CONFLICT);
    }
}
