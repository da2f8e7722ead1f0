//! Calendar Gateway
//!
//! Single-binary Rust service that:
//! 1. Sends users through Google consent and stores their provider tokens
//! 2. Hands back a signed session credential instead of provider tokens
//! 3. Serves today's calendar events, refreshing expired provider tokens
//!    transparently

mod config;
mod metrics;
mod routes;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::{FromRef, State};
use axum::response::IntoResponse;
use axum::routing::get;
use calendar_session::{AuthOrchestrator, SessionCodec};
use google_auth::{GoogleOAuthConfig, GoogleProvider, default_scopes};
use std::sync::Arc;
use std::time::{Duration, Instant};
use token_store::FileTokenStore;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use metrics_exporter_prometheus::PrometheusHandle;

use crate::config::Config;
use crate::routes::SessionState;

/// Time allowed for in-flight requests to finish after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared application state accessible from all handlers
#[derive(Clone)]
struct AppState {
    session: SessionState,
    store: Arc<FileTokenStore>,
    started_at: Instant,
    prometheus: PrometheusHandle,
}

impl FromRef<AppState> for SessionState {
    fn from_ref(state: &AppState) -> Self {
        state.session.clone()
    }
}

/// Build the axum router with all routes and shared state.
///
/// Applies a concurrency limit layer based on `max_connections`.
fn build_router(state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route(routes::AUTH_START_ROUTE, get(routes::start_authorization))
        .route(routes::AUTH_CALLBACK_ROUTE, get(routes::complete_authorization))
        .route(routes::EVENTS_ROUTE, get(routes::calendar_events))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs, filter from LOG_LEVEL then RUST_LOG
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting calendar-gateway");

    // Install before any metric is emitted
    let prometheus_handle =
        metrics::install_recorder().context("failed to install Prometheus recorder")?;

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        listen_addr = %config.server.listen_addr,
        redirect_url = %config.google.redirect_url,
        store = %config.store.path.display(),
        session_validity_secs = config.session.validity_secs,
        "configuration loaded"
    );

    let app_state = build_state(config.runtime_settings()?, prometheus_handle).await?;
    let app = build_router(app_state, config.server.max_connections);

    let listen_addr = config.server.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;

    info!(addr = %listen_addr, "accepting requests");

    // Drain timer starts at signal receipt, not at server start
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => {
            info!("all in-flight requests drained");
        }
        Ok(Ok(Err(e))) => {
            error!(error = %e, "server error during shutdown");
        }
        Ok(Err(e)) => {
            error!(error = %e, "server task panicked");
        }
        Err(_) => {
            warn!(
                drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
                "drain timeout exceeded, forcing shutdown"
            );
        }
    }

    info!("shutdown complete");
    Ok(())
}

/// Settings `build_state` needs, split out of `Config` so the secrets move
/// into the components that use them.
struct RuntimeSettings {
    oauth: GoogleOAuthConfig,
    signing_secret: common::Secret<String>,
    session_validity: Duration,
    store_path: std::path::PathBuf,
    timeout: Duration,
}

impl Config {
    fn runtime_settings(&self) -> Result<RuntimeSettings> {
        let client_secret = self
            .google
            .client_secret
            .clone()
            .context("Google client secret missing after config load")?;
        let signing_secret = self
            .session
            .signing_secret
            .clone()
            .context("session signing secret missing after config load")?;

        Ok(RuntimeSettings {
            oauth: GoogleOAuthConfig {
                client_id: self.google.client_id.clone(),
                client_secret,
                redirect_url: self.google.redirect_url.clone(),
            },
            signing_secret,
            session_validity: Duration::from_secs(self.session.validity_secs),
            store_path: self.store.path.clone(),
            timeout: Duration::from_secs(self.server.timeout_secs),
        })
    }
}

/// Load the token store and wire the orchestrator to the Google provider.
async fn build_state(settings: RuntimeSettings, prometheus: PrometheusHandle) -> Result<AppState> {
    let store = Arc::new(
        FileTokenStore::load(settings.store_path.clone())
            .await
            .with_context(|| {
                format!(
                    "failed to load token store from {}",
                    settings.store_path.display()
                )
            })?,
    );

    let http_client = reqwest::Client::builder()
        .timeout(settings.timeout)
        .build()
        .context("failed to build HTTP client")?;
    let provider = Arc::new(GoogleProvider::new(settings.oauth, http_client));

    let codec = SessionCodec::new(
        settings.signing_secret.expose().as_bytes(),
        settings.session_validity,
    );
    let orchestrator = AuthOrchestrator::new(codec, store.clone(), provider, default_scopes());

    Ok(AppState {
        session: SessionState {
            orchestrator: Arc::new(orchestrator),
            timeout: settings.timeout,
        },
        store,
        started_at: Instant::now(),
        prometheus,
    })
}

/// Health endpoint: status, stored user count, uptime.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let started = Instant::now();
    let body = serde_json::json!({
        "status": "healthy",
        "users": state.store.len().await,
        "uptime_seconds": state.started_at.elapsed().as_secs(),
    });
    metrics::record_request("/health", 200, started.elapsed().as_secs_f64());

    (
        axum::http::StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

/// Prometheus metrics endpoint in text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        axum::http::StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::{DateTime, Utc};
    use provider::{
        AuthorizedUser, CalendarProvider, Event, EventTime, ProviderError, ProviderFuture,
        ProviderTokenTriple, RefreshedToken,
    };
    use token_store::TokenStore;
    use tower::ServiceExt;

    const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";

    /// PrometheusHandle without installing a global recorder.
    fn test_prometheus_handle() -> PrometheusHandle {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        recorder.handle()
    }

    /// Scripted provider keyed on the access token it is handed:
    /// `broken` fails the fetch, `slow` stalls it, anything else lists one
    /// event. Refresh is always rejected as revoked.
    struct FakeProvider;

    impl CalendarProvider for FakeProvider {
        fn id(&self) -> &str {
            "fake"
        }

        fn build_authorization_url(&self, scopes: &[String]) -> String {
            format!(
                "https://accounts.test/auth?access_type=offline&prompt=consent&scope={}",
                scopes.join("%20")
            )
        }

        fn exchange_code<'a>(&'a self, code: &'a str) -> ProviderFuture<'a, AuthorizedUser> {
            Box::pin(async move {
                if code != "abc123" {
                    return Err(ProviderError::ExchangeFailed(
                        "invalid_grant: Bad Request".into(),
                    ));
                }
                Ok(AuthorizedUser {
                    id: "u1".into(),
                    email: "a@b.com".into(),
                    tokens: ProviderTokenTriple {
                        access_token: "A1".into(),
                        refresh_token: "R1".into(),
                        expiry_date: Utc::now() + chrono::Duration::seconds(3600),
                    },
                })
            })
        }

        fn refresh_access_token<'a>(
            &'a self,
            _tokens: &'a ProviderTokenTriple,
        ) -> ProviderFuture<'a, RefreshedToken> {
            Box::pin(async {
                Err(ProviderError::RefreshFailed(
                    "invalid_grant: Token has been expired or revoked.".into(),
                ))
            })
        }

        fn list_events_in_range<'a>(
            &'a self,
            tokens: &'a ProviderTokenTriple,
            start: DateTime<Utc>,
            _end: DateTime<Utc>,
        ) -> ProviderFuture<'a, Vec<Event>> {
            Box::pin(async move {
                match tokens.access_token.as_str() {
                    "broken" => Err(ProviderError::FetchFailed("HTTP 503".into())),
                    "slow" => {
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        Ok(vec![])
                    }
                    _ => Ok(vec![Event {
                        id: "e1".into(),
                        title: Some("Standup".into()),
                        start: EventTime::DateTime {
                            date_time: start.fixed_offset(),
                            time_zone: None,
                        },
                        end: EventTime::DateTime {
                            date_time: (start + chrono::Duration::minutes(15)).fixed_offset(),
                            time_zone: None,
                        },
                        description: None,
                        location: None,
                        status: Some("confirmed".into()),
                        html_link: None,
                        meeting_url: Some("https://meet.google.com/abc-defg-hij".into()),
                    }]),
                }
            })
        }
    }

    struct TestApp {
        state: AppState,
        codec: SessionCodec,
        _dir: tempfile::TempDir,
    }

    async fn test_app(timeout: Duration) -> TestApp {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(
            FileTokenStore::load(dir.path().join("users.json"))
                .await
                .unwrap(),
        );
        let codec = SessionCodec::new(SECRET, Duration::from_secs(3600));
        let orchestrator = AuthOrchestrator::new(
            codec.clone(),
            store.clone(),
            Arc::new(FakeProvider),
            default_scopes(),
        );
        TestApp {
            state: AppState {
                session: SessionState {
                    orchestrator: Arc::new(orchestrator),
                    timeout,
                },
                store,
                started_at: Instant::now(),
                prometheus: test_prometheus_handle(),
            },
            codec,
            _dir: dir,
        }
    }

    async fn seed_user(app: &TestApp, user_id: &str, access: &str, expires_in_secs: i64) {
        app.state
            .store
            .upsert(
                user_id,
                "x@y.com",
                ProviderTokenTriple {
                    access_token: access.into(),
                    refresh_token: "R1".into(),
                    expiry_date: Utc::now() + chrono::Duration::seconds(expires_in_secs),
                },
            )
            .await
            .unwrap();
    }

    async fn get(app: &TestApp, uri: &str, bearer: Option<&str>) -> axum::response::Response {
        let mut request = Request::builder().uri(uri);
        if let Some(credential) = bearer {
            request = request.header("authorization", format!("Bearer {credential}"));
        }
        build_router(app.state.clone(), 1000)
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn health_endpoint_reports_users_and_uptime() {
        let app = test_app(Duration::from_secs(5)).await;
        seed_user(&app, "u1", "A1", 3600).await;

        let response = get(&app, "/health", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["users"], 1);
        assert!(json["uptime_seconds"].is_u64());
    }

    #[tokio::test]
    async fn metrics_endpoint_returns_prometheus_format() {
        let app = test_app(Duration::from_secs(5)).await;
        let response = get(&app, "/metrics", None).await;

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response
            .headers()
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap();
        assert!(content_type.contains("text/plain"));
    }

    #[tokio::test]
    async fn auth_start_redirects_to_consent() {
        let app = test_app(Duration::from_secs(5)).await;
        let response = get(&app, "/auth/google", None).await;

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let location = response
            .headers()
            .get("location")
            .unwrap()
            .to_str()
            .unwrap();
        assert!(location.starts_with("https://accounts.test/auth"));
        assert!(location.contains("access_type=offline"));
        assert!(location.contains("prompt=consent"));
    }

    #[tokio::test]
    async fn callback_without_code_is_bad_request() {
        let app = test_app(Duration::from_secs(5)).await;
        let response = get(&app, "/auth/google/callback", None).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = json_body(response).await;
        assert_eq!(json["error"]["type"], "invalid_request");
        assert!(json["error"]["request_id"].as_str().unwrap().starts_with("req_"));
    }

    #[tokio::test]
    async fn callback_with_provider_error_is_bad_request() {
        let app = test_app(Duration::from_secs(5)).await;
        let response = get(&app, "/auth/google/callback?error=access_denied", None).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(app.state.store.is_empty().await);
    }

    #[tokio::test]
    async fn callback_then_events_end_to_end() {
        let app = test_app(Duration::from_secs(5)).await;

        let response = get(&app, "/auth/google/callback?code=abc123", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        let token = json["token"].as_str().unwrap().to_string();
        assert_eq!(app.codec.verify(&token).unwrap(), "u1");
        assert_eq!(app.state.store.len().await, 1);

        let response = get(&app, "/calendar/events", Some(&token)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let events = json_body(response).await;
        let events = events.as_array().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["id"], "e1");
        assert_eq!(events[0]["title"], "Standup");
    }

    #[tokio::test]
    async fn callback_with_bad_code_is_authentication_failed() {
        let app = test_app(Duration::from_secs(5)).await;
        let response = get(&app, "/auth/google/callback?code=reused", None).await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let json = json_body(response).await;
        assert_eq!(json["error"]["type"], "authentication_failed");
        assert!(
            !json["error"]["message"]
                .as_str()
                .unwrap()
                .contains("invalid_grant"),
            "provider detail must not leak to the client"
        );
        assert!(app.state.store.is_empty().await);
    }

    #[tokio::test]
    async fn events_without_bearer_require_reauthorization() {
        let app = test_app(Duration::from_secs(5)).await;
        let response = get(&app, "/calendar/events", None).await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let json = json_body(response).await;
        assert_eq!(json["error"]["type"], "reauthorization_required");
        assert_eq!(json["error"]["kind"], "invalid_credential");
    }

    #[tokio::test]
    async fn events_with_garbage_credential_require_reauthorization() {
        let app = test_app(Duration::from_secs(5)).await;
        let response = get(&app, "/calendar/events", Some("not-a-token")).await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let json = json_body(response).await;
        assert_eq!(json["error"]["kind"], "invalid_credential");
    }

    #[tokio::test]
    async fn events_with_expired_credential_report_expiry() {
        let app = test_app(Duration::from_secs(5)).await;
        seed_user(&app, "u1", "A1", 3600).await;
        let credential = app
            .codec
            .issue_at("u1", Utc::now() - chrono::Duration::seconds(7200))
            .unwrap();

        let response = get(&app, "/calendar/events", Some(&credential)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let json = json_body(response).await;
        assert_eq!(json["error"]["kind"], "expired_credential");
    }

    #[tokio::test]
    async fn events_for_unknown_user_require_reauthorization() {
        let app = test_app(Duration::from_secs(5)).await;
        let credential = app.codec.issue("ghost").unwrap();

        let response = get(&app, "/calendar/events", Some(&credential)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let json = json_body(response).await;
        assert_eq!(json["error"]["kind"], "user_not_found");
    }

    #[tokio::test]
    async fn events_with_revoked_refresh_token_require_reauthorization() {
        let app = test_app(Duration::from_secs(5)).await;
        seed_user(&app, "u1", "A1", -10).await;
        let before = app.state.store.get("u1").await.unwrap();
        let credential = app.codec.issue("u1").unwrap();

        let response = get(&app, "/calendar/events", Some(&credential)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let json = json_body(response).await;
        assert_eq!(json["error"]["type"], "reauthorization_required");
        assert_eq!(json["error"]["kind"], "refresh_failed");
        let message = json["error"]["message"].as_str().unwrap();
        assert!(
            !message.contains("invalid_grant") && !message.contains("revoked."),
            "provider detail must not leak to the client, got: {message}"
        );
        assert_eq!(app.state.store.get("u1").await.unwrap(), before);
    }

    #[tokio::test]
    async fn events_provider_failure_is_temporary() {
        let app = test_app(Duration::from_secs(5)).await;
        seed_user(&app, "u2", "broken", 3600).await;
        let credential = app.codec.issue("u2").unwrap();

        let response = get(&app, "/calendar/events", Some(&credential)).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let json = json_body(response).await;
        assert_eq!(json["error"]["type"], "temporary_failure");
    }

    #[tokio::test]
    async fn events_timeout_returns_504() {
        let app = test_app(Duration::from_millis(50)).await;
        seed_user(&app, "u3", "slow", 3600).await;
        let credential = app.codec.issue("u3").unwrap();

        let response = get(&app, "/calendar/events", Some(&credential)).await;
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        let json = json_body(response).await;
        assert_eq!(json["error"]["type"], "timeout");
    }

    #[tokio::test]
    async fn metrics_endpoint_contains_gateway_metric_names_after_request() {
        let (recorder, handle) = {
            let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
            let handle = recorder.handle();
            (recorder, handle)
        };
        let _guard = ::metrics::set_default_local_recorder(&recorder);

        let app = test_app(Duration::from_secs(5)).await;
        let response = get(&app, "/calendar/events", None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let rendered = handle.render();
        assert!(
            rendered.contains("gateway_requests_total"),
            "rendered:\n{rendered}"
        );
        assert!(
            rendered.contains("gateway_auth_failures_total"),
            "rendered:\n{rendered}"
        );
    }

    #[tokio::test]
    async fn concurrency_limit_queues_excess_requests() {
        let app = test_app(Duration::from_secs(5)).await;
        let router = build_router(app.state.clone(), 1);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        let req1 = client.get(format!("http://{addr}/health")).send();
        let req2 = client.get(format!("http://{addr}/health")).send();

        let (r1, r2) = tokio::join!(req1, req2);
        assert!(r1.unwrap().status().is_success());
        assert!(r2.unwrap().status().is_success());
    }
}
