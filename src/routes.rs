use chrono::Utc;
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{Catcher, Request, Route, State, catch, catchers, delete, get, post, routes};
use uuid::Uuid;

use crate::auth::{self, CurrentUser, TokenKeys};
use crate::error::{AppError, ErrorBody};
use crate::json::{BodyRejection, JsonBody};
use crate::models::*;
use crate::service;
use crate::store::SharedRepository;
use crate::summary::{Balance, DailySummary, MonthlyBucket};

// Health check
#[get("/health")]
fn health() -> &'static str {
    "OK"
}

// Register - no auth required
#[post("/auth/register", data = "<request>")]
async fn register(
    repo: &State<SharedRepository>,
    keys: &State<TokenKeys>,
    request: JsonBody<RegisterRequest>,
) -> Result<(Status, Json<AuthResponse>), AppError> {
    let response = auth::register(repo.inner().as_ref(), keys, request.into_inner()).await?;
    Ok((Status::Created, Json(response)))
}

// Login - no auth required
#[post("/auth/login", data = "<request>")]
async fn login(
    repo: &State<SharedRepository>,
    keys: &State<TokenKeys>,
    request: JsonBody<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    Ok(Json(auth::login(repo.inner().as_ref(), keys, request.into_inner()).await?))
}

#[post("/auth/logout")]
async fn logout(repo: &State<SharedRepository>, current_user: CurrentUser) -> Result<Status, AppError> {
    auth::logout(repo.inner().as_ref(), &current_user).await?;
    Ok(Status::NoContent)
}

// List expenses, newest first
#[get("/expenses")]
async fn get_expenses(repo: &State<SharedRepository>, current_user: CurrentUser) -> Result<Json<Vec<ExpenseResponse>>, AppError> {
    let expenses = service::list_expenses(repo.inner().as_ref(), &current_user.id).await?;
    Ok(Json(expenses.iter().map(ExpenseResponse::from).collect()))
}

#[post("/expenses", data = "<request>")]
async fn create_expense(
    repo: &State<SharedRepository>,
    current_user: CurrentUser,
    request: JsonBody<CreateExpenseRequest>,
) -> Result<(Status, Json<ExpenseResponse>), AppError> {
    let expense = service::create_expense(repo.inner().as_ref(), &current_user.id, request.into_inner(), Utc::now()).await?;
    Ok((Status::Created, Json(ExpenseResponse::from(&expense))))
}

// Delete expense - only its owner may delete it
#[delete("/expenses/<expense_id>")]
async fn delete_expense(repo: &State<SharedRepository>, current_user: CurrentUser, expense_id: &str) -> Result<Status, AppError> {
    let expense_uuid = Uuid::parse_str(expense_id).map_err(|_| AppError::BadRequest(format!("invalid expense id '{}'", expense_id)))?;
    service::delete_expense(repo.inner().as_ref(), &current_user.id, &expense_uuid).await?;
    Ok(Status::NoContent)
}

#[get("/expenses/summary/monthly")]
async fn monthly_summary(repo: &State<SharedRepository>, current_user: CurrentUser) -> Result<Json<Vec<MonthlyBucket>>, AppError> {
    Ok(Json(service::monthly_summary(repo.inner().as_ref(), &current_user.id).await?))
}

#[get("/expenses/summary/daily?<month>")]
async fn daily_summary(repo: &State<SharedRepository>, current_user: CurrentUser, month: Option<String>) -> Result<Json<DailySummary>, AppError> {
    let month = month.ok_or_else(|| AppError::validation("missing month query parameter (expected YYYY-MM)"))?;
    Ok(Json(service::daily_summary(repo.inner().as_ref(), &current_user.id, &month).await?))
}

// Income minus this month's spend
#[get("/expenses/summary/balance")]
async fn balance(repo: &State<SharedRepository>, current_user: CurrentUser) -> Result<Json<Balance>, AppError> {
    Ok(Json(service::current_balance(repo.inner().as_ref(), &current_user.id, Utc::now()).await?))
}

#[get("/user/income")]
async fn get_income(repo: &State<SharedRepository>, current_user: CurrentUser) -> Result<Json<IncomeResponse>, AppError> {
    Ok(Json(service::get_income(repo.inner().as_ref(), &current_user.id).await?))
}

#[post("/user/income", data = "<request>")]
async fn set_income(
    repo: &State<SharedRepository>,
    current_user: CurrentUser,
    request: JsonBody<IncomeRequest>,
) -> Result<Json<IncomeResponse>, AppError> {
    Ok(Json(service::set_income(repo.inner().as_ref(), &current_user.id, request.into_inner()).await?))
}

pub fn get_routes() -> Vec<Route> {
    routes![
        health,
        register,
        login,
        logout,
        get_expenses,
        create_expense,
        delete_expense,
        monthly_summary,
        daily_summary,
        balance,
        get_income,
        set_income
    ]
}

// Catchers: failures raised outside handlers (guards, body parsing, unknown routes)
fn error_body(message: impl Into<String>) -> Json<ErrorBody> {
    Json(ErrorBody { message: message.into() })
}

#[catch(400)]
fn bad_request(req: &Request) -> Json<ErrorBody> {
    match BodyRejection::of(req) {
        Some(rejection) => error_body(format!("Invalid request body: {}", rejection.0)),
        None => error_body("Bad Request"),
    }
}

#[catch(default)]
fn default_catcher(status: Status, req: &Request) -> (Status, Json<ErrorBody>) {
    let message = match (status.code, BodyRejection::of(req)) {
        (413, Some(rejection)) => format!("Payload Too Large: {}", rejection.0),
        _ => status.reason().unwrap_or("Error").to_string(),
    };
    (status, error_body(message))
}

pub fn get_catchers() -> Vec<Catcher> {
    catchers![bad_request, default_catcher]
}
