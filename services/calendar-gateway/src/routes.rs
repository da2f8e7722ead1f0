//! Authorization and calendar routes
//!
//! Thin HTTP layer over `AuthOrchestrator`. Each orchestrator call runs in
//! its own spawned task that the handler awaits under the configured timeout.
//! A dropped client connection or an elapsed timeout abandons the wait, not
//! the task, so provider and store calls already in flight complete and
//! persist their result.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Json;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Redirect, Response};
use calendar_session::{AuthOrchestrator, Error as SessionError, ErrorKind};
use serde::Deserialize;
use tracing::{error, info, instrument, warn};

use crate::metrics;

pub const AUTH_START_ROUTE: &str = "/auth/google";
pub const AUTH_CALLBACK_ROUTE: &str = "/auth/google/callback";
pub const EVENTS_ROUTE: &str = "/calendar/events";

/// State shared by the orchestrator-backed routes
#[derive(Clone)]
pub struct SessionState {
    pub orchestrator: Arc<AuthOrchestrator>,
    /// Upper bound on a single orchestrator call
    pub timeout: Duration,
}

/// Query parameters of the provider redirect back to the gateway
#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    code: Option<String>,
    error: Option<String>,
}

pub fn new_request_id() -> String {
    format!("req_{}", uuid::Uuid::new_v4().as_simple())
}

/// JSON error body: {"error":{"type":"...","kind":"...","message":"...","request_id":"req_..."}}
fn error_response(
    status: StatusCode,
    error_type: &str,
    kind: Option<ErrorKind>,
    message: &str,
    request_id: &str,
) -> Response {
    let mut error = serde_json::json!({
        "type": error_type,
        "message": message,
        "request_id": request_id,
    });
    if let Some(kind) = kind {
        error["kind"] = serde_json::Value::from(kind.as_str());
    }
    (
        status,
        [(header::CONTENT_TYPE, "application/json")],
        serde_json::json!({ "error": error }).to_string(),
    )
        .into_response()
}

/// Map an orchestrator error onto the client-facing response.
///
/// Re-authorization errors are 401; a failed event fetch is a retryable 502.
/// Exchange failures and server-side faults get a generic message so provider
/// and storage internals stay out of the response body.
fn session_error_response(err: &SessionError, request_id: &str) -> Response {
    let kind = err.kind();
    metrics::record_auth_failure(kind.as_str());

    match kind {
        ErrorKind::ExchangeFailed => {
            warn!(error = %err, "authorization code exchange failed");
            error_response(
                StatusCode::UNAUTHORIZED,
                "authentication_failed",
                Some(kind),
                "authorization could not be completed, please sign in again",
                request_id,
            )
        }
        _ if err.requires_reauthorization() => {
            info!(kind = kind.as_str(), error = %err, "re-authorization required");
            error_response(
                StatusCode::UNAUTHORIZED,
                "reauthorization_required",
                Some(kind),
                reauthorization_message(kind),
                request_id,
            )
        }
        ErrorKind::FetchFailed => {
            warn!(error = %err, "calendar fetch failed");
            error_response(
                StatusCode::BAD_GATEWAY,
                "temporary_failure",
                Some(kind),
                "calendar provider unavailable, try again later",
                request_id,
            )
        }
        _ => {
            error!(error = %err, "request failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                Some(kind),
                "internal error",
                request_id,
            )
        }
    }
}

/// Client-facing message for a re-authorization error. The underlying error
/// text only goes to the log.
fn reauthorization_message(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::ExpiredCredential => "session expired, please sign in again",
        ErrorKind::UserNotFound => "no authorization on record, please sign in again",
        ErrorKind::RefreshFailed => "calendar access was revoked or expired, please sign in again",
        _ => "invalid session credential, please sign in again",
    }
}

/// Run orchestrator work in its own task and wait for it up to `timeout`.
async fn run_bounded<T, F>(timeout: Duration, request_id: &str, work: F) -> Result<T, Response>
where
    F: Future<Output = calendar_session::Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let task = tokio::spawn(work);
    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(Ok(value))) => Ok(value),
        Ok(Ok(Err(e))) => Err(session_error_response(&e, request_id)),
        Ok(Err(e)) => {
            error!(error = %e, "orchestrator task failed");
            Err(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                None,
                "internal error",
                request_id,
            ))
        }
        Err(_) => {
            warn!(timeout_secs = timeout.as_secs_f64(), "request timed out");
            Err(error_response(
                StatusCode::GATEWAY_TIMEOUT,
                "timeout",
                None,
                &format!("request timed out after {}s", timeout.as_secs_f64()),
                request_id,
            ))
        }
    }
}

/// Extract the session credential from `Authorization: Bearer <credential>`.
fn bearer_credential(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, credential) = value.split_once(' ')?;
    let credential = credential.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !credential.is_empty()).then_some(credential)
}

fn finish(route: &'static str, started: Instant, response: Response) -> Response {
    metrics::record_request(
        route,
        response.status().as_u16(),
        started.elapsed().as_secs_f64(),
    );
    response
}

/// `GET /auth/google`: redirect to the provider consent page.
pub async fn start_authorization(State(state): State<SessionState>) -> Response {
    let started = Instant::now();
    let response = Redirect::to(&state.orchestrator.authorization_url()).into_response();
    finish(AUTH_START_ROUTE, started, response)
}

/// `GET /auth/google/callback?code=...`: complete authorization and return
/// the session credential.
#[instrument(skip_all, fields(request_id = tracing::field::Empty))]
pub async fn complete_authorization(
    State(state): State<SessionState>,
    Query(params): Query<CallbackParams>,
) -> Response {
    let started = Instant::now();
    let request_id = new_request_id();
    tracing::Span::current().record("request_id", request_id.as_str());

    if let Some(denied) = params.error {
        info!(error = %denied, "provider returned an authorization error");
        let response = error_response(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            None,
            &format!("authorization was not granted: {denied}"),
            &request_id,
        );
        return finish(AUTH_CALLBACK_ROUTE, started, response);
    }

    let Some(code) = params.code.filter(|c| !c.is_empty()) else {
        let response = error_response(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            None,
            "missing authorization code",
            &request_id,
        );
        return finish(AUTH_CALLBACK_ROUTE, started, response);
    };

    let orchestrator = state.orchestrator.clone();
    let work = async move { orchestrator.complete_authorization(&code).await };
    let response = match run_bounded(state.timeout, &request_id, work).await {
        Ok(token) => Json(serde_json::json!({ "token": token })).into_response(),
        Err(response) => response,
    };
    finish(AUTH_CALLBACK_ROUTE, started, response)
}

/// `GET /calendar/events`: today's events for the bearer of a session
/// credential.
#[instrument(skip_all, fields(request_id = tracing::field::Empty))]
pub async fn calendar_events(State(state): State<SessionState>, headers: HeaderMap) -> Response {
    let started = Instant::now();
    let request_id = new_request_id();
    tracing::Span::current().record("request_id", request_id.as_str());

    let Some(credential) = bearer_credential(&headers).map(str::to_owned) else {
        let err = SessionError::InvalidCredential("missing bearer credential".into());
        return finish(
            EVENTS_ROUTE,
            started,
            session_error_response(&err, &request_id),
        );
    };

    let orchestrator = state.orchestrator.clone();
    let work = async move { orchestrator.fetch_today_events(&credential).await };
    let response = match run_bounded(state.timeout, &request_id, work).await {
        Ok(events) => Json(events).into_response(),
        Err(response) => response,
    };
    finish(EVENTS_ROUTE, started, response)
}
