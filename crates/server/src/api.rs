//! JSON HTTP surface over the expense services.
//!
//! Callers identify themselves with the `x-user-id` header. Every response that
//! fails carries `{ error, message, hint, correlation_id }`; the correlation id is
//! taken from `x-correlation-id` when present and generated otherwise.

use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use uuid::Uuid;

use expensa_core::approvals::Decision;
use expensa_core::domain::approval::ApprovalRule;
use expensa_core::domain::company::Company;
use expensa_core::domain::expense::{Expense, ExpenseId};
use expensa_core::domain::user::{Role, User, UserId};
use expensa_core::errors::{ApplicationError, DomainError, InterfaceError};
use expensa_core::submission::ExpenseSubmission;
use expensa_db::{
    services::{ApprovalRuleDraft, CompanyRegistration, UserDraft},
    AdminService, DashboardReport, DashboardService, ExpenseWorkflow,
};

const USER_HEADER: &str = "x-user-id";
const CORRELATION_HEADER: &str = "x-correlation-id";

#[derive(Clone)]
pub struct ApiState {
    pub workflow: ExpenseWorkflow,
    pub admin: AdminService,
    pub dashboard: DashboardService,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/companies", post(register_company))
        .route("/api/expenses", post(submit_expense))
        .route("/api/expenses/mine", get(my_expenses))
        .route("/api/expenses/pending-approvals", get(pending_approvals))
        .route("/api/approvals/{expense_id}", post(decide))
        .route("/api/dashboard/stats", get(dashboard_stats))
        .route("/api/users", post(create_user).get(list_users))
        .route("/api/approval-rules", post(create_approval_rule).get(list_approval_rules))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request context
// ---------------------------------------------------------------------------

pub struct CorrelationId(pub String);

impl<S: Send + Sync> FromRequestParts<S> for CorrelationId {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(correlation_id(parts)))
    }
}

/// The authenticated caller of a request.
pub struct Caller {
    pub user_id: UserId,
    pub correlation_id: String,
}

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let correlation_id = correlation_id(parts);
        let raw = parts
            .headers
            .get(USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .unwrap_or_default();

        match raw.parse::<i64>() {
            Ok(id) if id > 0 => Ok(Self { user_id: UserId(id), correlation_id }),
            _ => Err(ApiError(InterfaceError::BadRequest {
                message: format!("header `{USER_HEADER}` must carry a numeric user id"),
                correlation_id,
            })),
        }
    }
}

fn correlation_id(parts: &Parts) -> String {
    parts
        .headers
        .get(CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("req-{}", Uuid::new_v4()))
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct ApiError(pub InterfaceError);

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    pub hint: String,
    pub correlation_id: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
            InterfaceError::Forbidden { .. } => StatusCode::FORBIDDEN,
            InterfaceError::Conflict { .. } => StatusCode::CONFLICT,
            InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody {
            error: self.0.error_class().to_string(),
            message: self.0.message().to_string(),
            hint: self.0.user_message().to_string(),
            correlation_id: self.0.correlation_id().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

fn fail(error: ApplicationError, correlation_id: &str) -> ApiError {
    let detail = error.to_string();
    let interface = error.into_interface(correlation_id);
    match interface {
        InterfaceError::Internal { .. } | InterfaceError::ServiceUnavailable { .. } => error!(
            event_name = "api.request.failed",
            correlation_id = %correlation_id,
            error_class = interface.error_class(),
            error = %detail,
            "request failed"
        ),
        _ => debug!(
            event_name = "api.request.refused",
            correlation_id = %correlation_id,
            error_class = interface.error_class(),
            error = %detail,
            "request refused"
        ),
    }
    ApiError(interface)
}

type ApiResult<T> = Result<(StatusCode, Json<T>), ApiError>;

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct CompanyRegistered {
    pub company: Company,
    pub admin: User,
}

async fn register_company(
    State(state): State<ApiState>,
    CorrelationId(correlation_id): CorrelationId,
    Json(registration): Json<CompanyRegistration>,
) -> ApiResult<CompanyRegistered> {
    let (company, admin) = state
        .admin
        .register_company(registration)
        .await
        .map_err(|error| fail(error, &correlation_id))?;
    Ok((StatusCode::CREATED, Json(CompanyRegistered { company, admin })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SubmitExpenseRequest {
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub expense_date: Option<NaiveDate>,
    pub receipt_ref: Option<String>,
}

async fn submit_expense(
    State(state): State<ApiState>,
    caller: Caller,
    Json(request): Json<SubmitExpenseRequest>,
) -> ApiResult<Expense> {
    let submission = ExpenseSubmission {
        submitter_id: caller.user_id,
        amount: request.amount,
        currency: request.currency,
        category: request.category,
        description: request.description,
        expense_date: request.expense_date,
        receipt_ref: request.receipt_ref,
    };
    let expense = state
        .workflow
        .submit(submission, &caller.correlation_id)
        .await
        .map_err(|error| fail(error, &caller.correlation_id))?;
    Ok((StatusCode::CREATED, Json(expense)))
}

async fn my_expenses(State(state): State<ApiState>, caller: Caller) -> ApiResult<Vec<Expense>> {
    let expenses = state
        .workflow
        .list_my_expenses(caller.user_id)
        .await
        .map_err(|error| fail(error, &caller.correlation_id))?;
    Ok((StatusCode::OK, Json(expenses)))
}

async fn pending_approvals(
    State(state): State<ApiState>,
    caller: Caller,
) -> ApiResult<Vec<Expense>> {
    let expenses = state
        .workflow
        .list_pending_approvals(caller.user_id)
        .await
        .map_err(|error| fail(error, &caller.correlation_id))?;
    Ok((StatusCode::OK, Json(expenses)))
}

#[derive(Debug, Deserialize)]
pub struct DecisionRequest {
    pub decision: String,
    #[serde(default)]
    pub comments: Option<String>,
}

async fn decide(
    State(state): State<ApiState>,
    caller: Caller,
    Path(expense_id): Path<i64>,
    Json(request): Json<DecisionRequest>,
) -> ApiResult<Expense> {
    let decision = request
        .decision
        .parse::<Decision>()
        .map_err(|error| fail(error.into(), &caller.correlation_id))?;
    let expense = state
        .workflow
        .process_decision(
            ExpenseId(expense_id),
            caller.user_id,
            decision,
            request.comments,
            &caller.correlation_id,
        )
        .await
        .map_err(|error| fail(error, &caller.correlation_id))?;
    Ok((StatusCode::OK, Json(expense)))
}

#[derive(Debug, Default, Deserialize)]
pub struct DashboardQuery {
    pub role: Option<String>,
}

async fn dashboard_stats(
    State(state): State<ApiState>,
    caller: Caller,
    Query(query): Query<DashboardQuery>,
) -> ApiResult<DashboardReport> {
    let view = match query.role {
        Some(raw) => {
            raw.parse::<Role>().map_err(|error| fail(error.into(), &caller.correlation_id))?
        }
        None => caller_role(&state, caller.user_id)
            .await
            .map_err(|error| fail(error, &caller.correlation_id))?,
    };
    let report = state
        .dashboard
        .stats(caller.user_id, view, Utc::now())
        .await
        .map_err(|error| fail(error, &caller.correlation_id))?;
    Ok((StatusCode::OK, Json(report)))
}

async fn caller_role(state: &ApiState, user_id: UserId) -> Result<Role, ApplicationError> {
    let user = state.workflow.stores().users.find_by_id(user_id).await?;
    user.map(|user| user.role).ok_or_else(|| DomainError::not_found("user", user_id).into())
}

async fn create_user(
    State(state): State<ApiState>,
    caller: Caller,
    Json(draft): Json<UserDraft>,
) -> ApiResult<User> {
    let user = state
        .admin
        .create_user(caller.user_id, draft)
        .await
        .map_err(|error| fail(error, &caller.correlation_id))?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn list_users(State(state): State<ApiState>, caller: Caller) -> ApiResult<Vec<User>> {
    let users = state
        .admin
        .list_users(caller.user_id)
        .await
        .map_err(|error| fail(error, &caller.correlation_id))?;
    Ok((StatusCode::OK, Json(users)))
}

async fn create_approval_rule(
    State(state): State<ApiState>,
    caller: Caller,
    Json(draft): Json<ApprovalRuleDraft>,
) -> ApiResult<ApprovalRule> {
    let rule = state
        .admin
        .create_approval_rule(caller.user_id, draft)
        .await
        .map_err(|error| fail(error, &caller.correlation_id))?;
    Ok((StatusCode::CREATED, Json(rule)))
}

async fn list_approval_rules(
    State(state): State<ApiState>,
    caller: Caller,
) -> ApiResult<Vec<ApprovalRule>> {
    let rules = state
        .admin
        .list_approval_rules(caller.user_id)
        .await
        .map_err(|error| fail(error, &caller.correlation_id))?;
    Ok((StatusCode::OK, Json(rules)))
}
