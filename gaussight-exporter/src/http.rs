//! HTTP server for the Prometheus scrape endpoint and admin routes.

use std::net::SocketAddr;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::{Method, StatusCode};
use axum::http::header::CONTENT_TYPE;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::collector::SharedScraper;
use crate::render;

/// Query parameter that restricts a scrape to named definitions.
const COLLECT_PARAM: &str = "collect[]";

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    scraper: SharedScraper,
    metrics_path: String,
}

/// Create the HTTP router.
pub fn create_router(scraper: SharedScraper, metrics_path: &str) -> Router {
    let state = AppState {
        scraper,
        metrics_path: metrics_path.to_string(),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET]);

    // Layers only wrap routes added before them, so /reload gets no CORS.
    Router::new()
        .route("/", get(index_handler))
        .route(metrics_path, get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .layer(cors)
        .route("/reload", post(reload_handler))
        .with_state(state)
}

/// Handler for the metrics endpoint. Each request runs one scrape.
async fn metrics_handler(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> Response {
    let collect: Vec<String> = params
        .into_iter()
        .filter(|(k, v)| k == COLLECT_PARAM && !v.is_empty())
        .map(|(_, v)| v)
        .collect();

    match state.scraper.scrape(&collect).await {
        Ok(report) => (
            StatusCode::OK,
            [(CONTENT_TYPE, render::CONTENT_TYPE)],
            render::render(&report.samples),
        )
            .into_response(),
        Err(e) => (StatusCode::SERVICE_UNAVAILABLE, format!("{}\n", e)).into_response(),
    }
}

/// Handler for the /health endpoint.
async fn health_handler() -> Response {
    (StatusCode::OK, "healthy\n").into_response()
}

/// Handler for the /ready endpoint.
async fn ready_handler(State(state): State<AppState>) -> Response {
    if state.scraper.has_scraped() {
        (StatusCode::OK, "ready\n").into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            "not ready - no successful scrape yet\n",
        )
            .into_response()
    }
}

/// Handler for POST /reload. On failure the previous definitions stay active.
async fn reload_handler(State(state): State<AppState>) -> Response {
    match state.scraper.registry().reload() {
        Ok(table) => (
            StatusCode::OK,
            format!("reloaded {} query definitions\n", table.len()),
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Definition reload failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("reload failed: {}\n", e),
            )
                .into_response()
        }
    }
}

async fn index_handler(State(state): State<AppState>) -> Html<String> {
    Html(format!(
        "<html>\n<head><title>GaussDB Exporter</title></head>\n<body>\n\
         <h1>GaussDB Exporter</h1>\n<p>Target: {}</p>\n\
         <p><a href=\"{}\">Metrics</a></p>\n</body>\n</html>\n",
        state.scraper.server().address(),
        state.metrics_path
    ))
}

/// HTTP server configuration.
pub struct HttpServer {
    scraper: SharedScraper,
    listen_addr: SocketAddr,
    metrics_path: String,
}

impl HttpServer {
    /// Create a new HTTP server.
    pub fn new(scraper: SharedScraper, listen_addr: SocketAddr, metrics_path: String) -> Self {
        Self {
            scraper,
            listen_addr,
            metrics_path,
        }
    }

    /// Run the HTTP server until the shutdown signal is received.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.listen_addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", self.listen_addr, e))?;

        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener.
    pub async fn serve(
        self,
        listener: tokio::net::TcpListener,
        mut shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        let router = create_router(self.scraper, &self.metrics_path);

        info!(
            addr = %listener.local_addr().unwrap_or(self.listen_addr),
            path = %self.metrics_path,
            "HTTP server listening"
        );

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                loop {
                    if shutdown.changed().await.is_err() {
                        break;
                    }
                    if *shutdown.borrow() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await
            .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))?;

        info!("HTTP server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::Scraper;
    use crate::config::ExporterConfig;
    use crate::registry::{DefinitionRegistry, DefinitionTable};
    use crate::source::{QuerySource, ResultSet, ServerInfo, SourceError};
    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use gaussight_common::parse_definitions;
    use std::sync::Arc;
    use tower::ServiceExt;

    struct StaticSource {
        up: bool,
    }

    #[async_trait]
    impl QuerySource for StaticSource {
        fn address(&self) -> &str {
            "db:5432"
        }

        async fn query(&self, _sql: &str) -> Result<ResultSet, SourceError> {
            Ok(ResultSet::new(
                vec!["datname".to_string(), "numbackends".to_string()],
                vec![vec!["postgres".into(), 3i64.into()]],
            ))
        }

        async fn ping(&self) -> Result<(), SourceError> {
            if self.up {
                Ok(())
            } else {
                Err(SourceError::Connect("connection refused".to_string()))
            }
        }

        async fn server_info(&self) -> Result<ServerInfo, SourceError> {
            Ok(ServerInfo::default())
        }
    }

    const QUERIES: &str = r#"
    {
        pg_database: {
            queries: [{ sql: "SELECT datname, numbackends FROM pg_stat_database" }],
            metrics: [
                { name: "datname", usage: "LABEL" },
                { name: "numbackends", usage: "GAUGE", description: "Backends" },
            ],
        },
    }
    "#;

    fn make_scraper(up: bool) -> SharedScraper {
        let table = DefinitionTable::new(parse_definitions(QUERIES).unwrap());
        Arc::new(Scraper::new(
            Arc::new(StaticSource { up }),
            Arc::new(DefinitionRegistry::new(table)),
            &ExporterConfig::default(),
        ))
    }

    async fn body_string(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let router = create_router(make_scraper(true), "/metrics");

        let response = router
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers().get("content-type").unwrap();
        assert!(content_type.to_str().unwrap().contains("version=0.0.4"));

        let body = body_string(response).await;
        assert!(body.contains("pg_database_numbackends{server=\"db:5432\",datname=\"postgres\"} 3"));
        assert!(body.contains("pg_up{server=\"db:5432\"} 1"));
    }

    #[tokio::test]
    async fn test_metrics_collect_filter() {
        let router = create_router(make_scraper(true), "/metrics");

        let response = router
            .oneshot(
                Request::get("/metrics?collect%5B%5D=pg_other")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_string(response).await;
        assert!(!body.contains("pg_database_numbackends"));
        assert!(body.contains("pg_up"));
    }

    #[tokio::test]
    async fn test_metrics_unreachable_target() {
        let router = create_router(make_scraper(false), "/metrics");

        let response = router
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let router = create_router(make_scraper(false), "/metrics");

        let response = router
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_ready_after_scrape() {
        let scraper = make_scraper(true);
        let router = create_router(scraper.clone(), "/metrics");

        let response = router
            .clone()
            .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        scraper.scrape(&[]).await.unwrap();

        let response = router
            .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_reload_without_path_fails() {
        let router = create_router(make_scraper(true), "/metrics");

        let response = router
            .oneshot(Request::post("/reload").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_cors_only_on_read_routes() {
        let router = create_router(make_scraper(true), "/metrics");

        let response = router
            .clone()
            .oneshot(
                Request::get("/metrics")
                    .header("origin", "http://dashboard.example")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "*"
        );

        let response = router
            .clone()
            .oneshot(
                Request::options("/reload")
                    .header("origin", "http://evil.example")
                    .header("access-control-request-method", "POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(response.headers().get("access-control-allow-origin").is_none());

        let response = router
            .oneshot(
                Request::post("/reload")
                    .header("origin", "http://evil.example")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(response.headers().get("access-control-allow-origin").is_none());
    }

    #[tokio::test]
    async fn test_custom_metrics_path() {
        let router = create_router(make_scraper(true), "/gauss/metrics");

        let response = router
            .clone()
            .oneshot(Request::get("/gauss/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = router
            .clone()
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = router
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(body_string(response).await.contains("/gauss/metrics"));
    }
}
