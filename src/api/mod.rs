use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use snafu::ResultExt;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::error::{ApplicationError, BindAddressSnafu, WebServerSnafu};
use crate::model::{EventKind, RecordRequest, RecordResponse, StatsResponse, StatsSnapshot};

pub use state::{create_app, App};

mod state;

/// Successful reads may be served from shared caches for 30 seconds, with a
/// 60 second grace window for serving stale data during a refresh.
const CACHE_DIRECTIVES: &str = "public, max-age=30, stale-while-revalidate=60";

pub async fn serve(config: &Config, app: App) -> Result<(), ApplicationError> {
    let router = create_router(app);

    let listener = tokio::net::TcpListener::bind(config.host)
        .await
        .context(BindAddressSnafu {
            address: config.host,
        })?;

    tracing::info!("serving the stats api on {}", config.host);
    axum::serve(listener, router).await.context(WebServerSnafu)
}

pub fn create_router(app: App) -> Router {
    Router::new()
        .route("/stats", get(get_stats).post(post_stats))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(app)
}

async fn get_stats(State(app): State<App>) -> Response {
    spawn_maintenance(&app);

    if let Some(snapshot) = app.cache.get().await {
        let body = StatsResponse::new(true, Some(snapshot), Some(true), None);
        return with_cache_directives(Json(body));
    }

    match app.stats.snapshot().await {
        Some(snapshot) => {
            app.cache.put(snapshot).await;
            let body = StatsResponse::new(true, Some(snapshot), None, None);
            with_cache_directives(Json(body))
        }
        // A recognized operating mode, not a failure status: respond 200
        // with a zeroed snapshot and say why.
        None => Json(StatsResponse::new(
            false,
            Some(StatsSnapshot::default()),
            None,
            Some("stats backend is not configured".to_string()),
        ))
        .into_response(),
    }
}

async fn post_stats(State(app): State<App>, Json(request): Json<RecordRequest>) -> Response {
    let kind: EventKind = match request.action.parse() {
        Ok(kind) => kind,
        Err(err) => {
            let body = RecordResponse::new(false, Some(err.to_string()));
            return (StatusCode::BAD_REQUEST, Json(body)).into_response();
        }
    };

    if !app.stats.record(kind).await {
        let body = RecordResponse::new(
            false,
            Some("stats backend is not configured or the write failed".to_string()),
        );
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response();
    }

    // The next read must reflect a fresh vote; visits are not wait-gated,
    // so a slightly stale visit count is fine.
    if kind == EventKind::Vote {
        app.cache.invalidate().await;
    }

    Json(RecordResponse::new(true, Some(format!("{kind} recorded")))).into_response()
}

/// Retention cleanup and counter repair ride along with reads, detached from
/// the response: their outcome is logged, never awaited.
fn spawn_maintenance(app: &App) {
    let stats = app.stats.clone();

    tokio::spawn(async move {
        stats.cleanup_expired().await;
        stats.repair_consistency().await;
    });
}

fn with_cache_directives(body: Json<StatsResponse>) -> Response {
    ([(header::CACHE_CONTROL, CACHE_DIRECTIVES)], body).into_response()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum_test::TestServer;

    use super::*;
    use crate::stats::StatsRepository;
    use crate::store::{EventStore as _, MemoryStore, Store};

    fn disabled_server() -> TestServer {
        let app = create_app(StatsRepository::disabled());
        TestServer::new(create_router(app)).unwrap()
    }

    fn server_with_store() -> (TestServer, Store) {
        let store: Store = Arc::new(MemoryStore::default());
        let app = create_app(StatsRepository::new(Some(store.clone())));
        (TestServer::new(create_router(app)).unwrap(), store)
    }

    fn record(action: &str) -> RecordRequest {
        RecordRequest::new(action.to_string())
    }

    #[tokio::test]
    async fn read_without_backend_reports_zeroed_snapshot() {
        let server = disabled_server();

        let response = server.get("/stats").await;
        response.assert_status_ok();

        let body: StatsResponse = response.json();
        assert!(!body.success);
        assert_eq!(body.data, Some(StatsSnapshot::default()));
        assert!(body.message.is_some());
    }

    #[tokio::test]
    async fn write_without_backend_is_a_server_error() {
        let server = disabled_server();

        let response = server.post("/stats").json(&record("visit")).await;

        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        let body: RecordResponse = response.json();
        assert!(!body.success);
    }

    #[tokio::test]
    async fn unknown_action_is_a_client_error_with_no_side_effects() {
        let (server, store) = server_with_store();

        let response = server.post("/stats").json(&record("share")).await;

        response.assert_status(StatusCode::BAD_REQUEST);
        let body: RecordResponse = response.json();
        assert!(!body.success);

        assert!(store.list_events(EventKind::Visit).await.unwrap().is_empty());
        assert!(store.list_events(EventKind::Vote).await.unwrap().is_empty());
        assert_eq!(store.get_counter(EventKind::Visit).await.unwrap(), 0);
        assert_eq!(store.get_counter(EventKind::Vote).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn recorded_events_show_up_in_the_snapshot() {
        let (server, store) = server_with_store();

        for _ in 0..3 {
            server.post("/stats").json(&record("visit")).await;
        }
        for _ in 0..2 {
            server.post("/stats").json(&record("vote")).await;
        }
        store.set_counter(EventKind::Visit, 10).await.unwrap();
        store.set_counter(EventKind::Vote, 7).await.unwrap();

        let response = server.get("/stats").await;
        response.assert_status_ok();
        assert_eq!(
            response.header(header::CACHE_CONTROL),
            CACHE_DIRECTIVES,
            "successful reads should be publicly cacheable"
        );

        let body: StatsResponse = response.json();
        assert!(body.success);

        let snapshot = body.data.unwrap();
        assert_eq!(snapshot.visits, 3);
        assert_eq!(snapshot.votes, 2);
        assert_eq!(snapshot.total_visits, 10);
        assert_eq!(snapshot.total_votes, 7);
        assert!(snapshot.last_vote_time.is_some());
    }

    #[tokio::test]
    async fn second_read_within_the_ttl_is_served_from_cache() {
        let (server, _store) = server_with_store();

        let first = server.get("/stats").await;
        let first: StatsResponse = first.json();
        assert_eq!(first.cached, None, "first read goes to the repository");

        let second = server.get("/stats").await;
        let second: StatsResponse = second.json();
        assert_eq!(second.cached, Some(true));
        assert_eq!(second.data, first.data);
    }

    #[tokio::test]
    async fn a_vote_invalidates_the_cached_snapshot() {
        let (server, _store) = server_with_store();

        server.get("/stats").await;
        server.post("/stats").json(&record("vote")).await;

        let response = server.get("/stats").await;
        let body: StatsResponse = response.json();

        assert_eq!(body.cached, None, "the vote must evict the cached snapshot");
        assert_eq!(body.data.unwrap().votes, 1);
    }

    #[tokio::test]
    async fn a_visit_leaves_the_cached_snapshot_alone() {
        let (server, _store) = server_with_store();

        server.get("/stats").await;
        server.post("/stats").json(&record("visit")).await;

        let response = server.get("/stats").await;
        let body: StatsResponse = response.json();

        assert_eq!(
            body.cached,
            Some(true),
            "visit writes tolerate a slightly stale read"
        );
    }
}
