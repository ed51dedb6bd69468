//! HTTP surface
//!
//! Record reads return the view shapes in [`crate::views`]. Failures keep the
//! error taxonomy: the body carries a generic `error` message plus the `kind`
//! and `detail` of the underlying failure, and the status follows the kind.
//! Mutations answer `202 Accepted` with the operation handle, since a
//! submitted write is not yet confirmed.

use crate::service::AgentService;
use crate::views::{
    AgentView, AuthorizePaymentBody, CreateAgentBody, DashboardView, PaymentView, SubmittedView,
    UpdateMaxBody,
};
use alloy_primitives::Address;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use evmauth_core::{
    parse_address, AgentId, Amount, CoreError, NewAgent, OperationHandle, PaymentId,
    PaymentRequest,
};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, warn};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    /// Facade every handler calls
    pub service: AgentService,
}

/// Failed request, rendered as `{ error, kind, detail }`
#[derive(Debug)]
pub struct ApiError {
    context: &'static str,
    error: CoreError,
}

impl ApiError {
    /// Failure of the operation named by `context`
    #[must_use]
    pub fn new(context: &'static str, error: CoreError) -> Self {
        Self { context, error }
    }

    /// Status code for a failure kind
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match &self.error {
            CoreError::NotFound { .. } => StatusCode::NOT_FOUND,
            CoreError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            CoreError::MalformedRecord(_) => StatusCode::BAD_GATEWAY,
            CoreError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            CoreError::Rejected(_) | CoreError::StateMachine(_) => StatusCode::CONFLICT,
            CoreError::NotConnected => StatusCode::UNAUTHORIZED,
            CoreError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(kind = self.error.kind(), error = %self.error, "{}", self.context);
        } else {
            warn!(kind = self.error.kind(), error = %self.error, "{}", self.context);
        }
        let body = json!({
            "error": self.context,
            "kind": self.error.kind(),
            "detail": self.error.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

trait Context<T> {
    fn context(self, context: &'static str) -> ApiResult<T>;
}

impl<T> Context<T> for Result<T, CoreError> {
    fn context(self, context: &'static str) -> ApiResult<T> {
        self.map_err(|e| ApiError::new(context, e))
    }
}

fn submitted(handle: OperationHandle) -> (StatusCode, Json<SubmittedView>) {
    (StatusCode::ACCEPTED, Json(SubmittedView::from(handle)))
}

/// Build the router with tracing and permissive CORS
pub fn router(service: AgentService) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/agent/:id", get(get_agent))
        .route("/agent/:id/activate", post(activate_agent))
        .route("/agent/:id/deactivate", post(deactivate_agent))
        .route("/agent/:id/max-daily-spend", post(update_max_daily_spend))
        .route("/payment/:id", get(get_payment))
        .route("/owners/:owner/agents", get(list_agents))
        .route("/owners/:owner/payments", get(list_payments))
        .route("/owners/:owner/dashboard", get(dashboard))
        .route("/agents", post(create_agent))
        .route("/payments", post(authorize_payment))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(AppState { service })
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "mode": state.service.mode(),
        "account": state.service.account(),
        "version": crate::VERSION,
    }))
}

async fn get_agent(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<AgentView>> {
    const CONTEXT: &str = "Failed to fetch agent";
    let id: AgentId = id.parse().context(CONTEXT)?;
    let agent = state.service.agent(id).await.context(CONTEXT)?;
    Ok(Json(agent.into()))
}

async fn get_payment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<PaymentView>> {
    const CONTEXT: &str = "Failed to fetch payment";
    let id: PaymentId = id.parse().context(CONTEXT)?;
    let payment = state.service.payment(id).await.context(CONTEXT)?;
    Ok(Json(payment.into()))
}

async fn list_agents(
    State(state): State<AppState>,
    Path(owner): Path<String>,
) -> ApiResult<Json<Vec<AgentView>>> {
    const CONTEXT: &str = "Failed to fetch agents";
    let owner: Address = parse_address(&owner).context(CONTEXT)?;
    let agents = state.service.list_agents(owner).await.context(CONTEXT)?;
    Ok(Json(agents.into_iter().map(AgentView::from).collect()))
}

async fn list_payments(
    State(state): State<AppState>,
    Path(owner): Path<String>,
) -> ApiResult<Json<Vec<PaymentView>>> {
    const CONTEXT: &str = "Failed to fetch payments";
    let owner: Address = parse_address(&owner).context(CONTEXT)?;
    let payments = state.service.list_payments(owner).await.context(CONTEXT)?;
    Ok(Json(payments.into_iter().map(PaymentView::from).collect()))
}

async fn dashboard(
    State(state): State<AppState>,
    Path(owner): Path<String>,
) -> ApiResult<Json<DashboardView>> {
    const CONTEXT: &str = "Failed to fetch dashboard";
    let owner: Address = parse_address(&owner).context(CONTEXT)?;
    let dashboard = state.service.dashboard(owner).await.context(CONTEXT)?;
    Ok(Json(dashboard.into()))
}

async fn create_agent(
    State(state): State<AppState>,
    Json(body): Json<CreateAgentBody>,
) -> ApiResult<impl IntoResponse> {
    const CONTEXT: &str = "Failed to create agent";
    let max_daily_spend = Amount::parse_decimal(&body.max_daily_spend).context(CONTEXT)?;
    let handle = state
        .service
        .create_agent(NewAgent {
            name: body.name,
            agent_type: body.agent_type,
            max_daily_spend,
        })
        .await
        .context(CONTEXT)?;
    Ok(submitted(handle))
}

async fn activate_agent(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    const CONTEXT: &str = "Failed to activate agent";
    let id: AgentId = id.parse().context(CONTEXT)?;
    let handle = state.service.activate_agent(id).await.context(CONTEXT)?;
    Ok(submitted(handle))
}

async fn deactivate_agent(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    const CONTEXT: &str = "Failed to deactivate agent";
    let id: AgentId = id.parse().context(CONTEXT)?;
    let handle = state.service.deactivate_agent(id).await.context(CONTEXT)?;
    Ok(submitted(handle))
}

async fn update_max_daily_spend(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpdateMaxBody>,
) -> ApiResult<impl IntoResponse> {
    const CONTEXT: &str = "Failed to update daily limit";
    let id: AgentId = id.parse().context(CONTEXT)?;
    let new_max = Amount::parse_decimal(&body.max_daily_spend).context(CONTEXT)?;
    let handle = state
        .service
        .update_max_daily_spend(id, new_max)
        .await
        .context(CONTEXT)?;
    Ok(submitted(handle))
}

async fn authorize_payment(
    State(state): State<AppState>,
    Json(body): Json<AuthorizePaymentBody>,
) -> ApiResult<impl IntoResponse> {
    const CONTEXT: &str = "Failed to authorize payment";
    let request = PaymentRequest {
        agent_id: body.agent_id.parse().context(CONTEXT)?,
        recipient: parse_address(&body.recipient).context(CONTEXT)?,
        amount: Amount::parse_decimal(&body.amount).context(CONTEXT)?,
        memo: body.memo.filter(|m| !m.trim().is_empty()),
    };
    let handle = state.service.authorize_payment(request).await.context(CONTEXT)?;
    Ok(submitted(handle))
}
