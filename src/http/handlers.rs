//! API handlers.

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use crate::http::server::AppState;
use crate::observability::metrics;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Serialize)]
pub struct CsrfTokenResponse {
    pub token: String,
}

/// Client-side error report from the loan application flow.
#[derive(Debug, Deserialize)]
pub struct ErrorReport {
    pub message: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub stack: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub page: Option<String>,
}

#[derive(Serialize)]
pub struct ErrorReportAck {
    pub received: bool,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Mint a fresh anti-CSRF token. Every call returns a new token; nothing
/// is cached or stored server-side.
pub async fn issue_csrf_token(State(state): State<AppState>) -> Json<CsrfTokenResponse> {
    Json(CsrfTokenResponse {
        token: state.csrf.issue(),
    })
}

/// Accept a client error report. The report is logged and counted; the
/// client only learns that it was received.
pub async fn report_error(Json(report): Json<ErrorReport>) -> (StatusCode, Json<ErrorReportAck>) {
    tracing::warn!(
        message = %report.message,
        source = report.source.as_deref().unwrap_or("unknown"),
        page = report.page.as_deref().unwrap_or("unknown"),
        user_agent = report.user_agent.as_deref().unwrap_or("unknown"),
        "Client error report"
    );
    if let Some(stack) = &report.stack {
        tracing::debug!(stack = %stack, "Client error stack trace");
    }
    metrics::record_error_report();

    (StatusCode::ACCEPTED, Json(ErrorReportAck { received: true }))
}
