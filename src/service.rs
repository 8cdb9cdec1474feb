//! Owner-scoped operations shared by the HTTP routes. Input is validated
//! before the repository is touched.

use chrono::{DateTime, Utc};
use uuid::Uuid;
use validator::Validate;

use crate::error::AppError;
use crate::models::*;
use crate::store::Repository;
use crate::summary::{self, Balance, DailySummary, MonthKey, MonthlyBucket};

pub async fn create_expense(repo: &dyn Repository, owner_id: &Uuid, request: CreateExpenseRequest, now: DateTime<Utc>) -> Result<Expense, AppError> {
    request.validate()?;
    let new_expense = request.into_new_expense(now)?;
    let expense = repo.create_expense(owner_id, &new_expense).await?;
    tracing::debug!(expense_id = %expense.id, owner_id = %owner_id, "expense created");
    Ok(expense)
}

pub async fn list_expenses(repo: &dyn Repository, owner_id: &Uuid) -> Result<Vec<Expense>, AppError> {
    repo.list_expenses(owner_id).await
}

pub async fn delete_expense(repo: &dyn Repository, owner_id: &Uuid, expense_id: &Uuid) -> Result<(), AppError> {
    match repo.delete_expense(expense_id, owner_id).await? {
        DeleteOutcome::Deleted => {
            tracing::debug!(expense_id = %expense_id, owner_id = %owner_id, "expense deleted");
            Ok(())
        }
        DeleteOutcome::NotFound => Err(AppError::NotFound("Expense not found".to_string())),
        DeleteOutcome::Forbidden => {
            tracing::warn!(expense_id = %expense_id, owner_id = %owner_id, "attempt to delete another user's expense");
            Err(AppError::Forbidden)
        }
    }
}

pub async fn monthly_summary(repo: &dyn Repository, owner_id: &Uuid) -> Result<Vec<MonthlyBucket>, AppError> {
    let expenses = repo.list_expenses(owner_id).await?;
    Ok(summary::group_by_month(&expenses))
}

pub async fn daily_summary(repo: &dyn Repository, owner_id: &Uuid, month: &str) -> Result<DailySummary, AppError> {
    let month = MonthKey::parse(month)?;
    let (from, to) = month.bounds()?;
    let expenses = repo.list_expenses_between(owner_id, from, to).await?;
    Ok(summary::group_by_day(month, &expenses))
}

pub async fn current_balance(repo: &dyn Repository, owner_id: &Uuid, now: DateTime<Utc>) -> Result<Balance, AppError> {
    let income = repo.get_monthly_income(owner_id).await?;
    let (from, to) = MonthKey::of(&now).bounds()?;
    let expenses = repo.list_expenses_between(owner_id, from, to).await?;
    Ok(summary::balance_for(&income, &expenses, now))
}

pub async fn get_income(repo: &dyn Repository, owner_id: &Uuid) -> Result<IncomeResponse, AppError> {
    let income = repo.get_monthly_income(owner_id).await?;
    Ok(IncomeResponse { income })
}

pub async fn set_income(repo: &dyn Repository, owner_id: &Uuid, request: IncomeRequest) -> Result<IncomeResponse, AppError> {
    request.validate()?;
    let income = amount_from_f64(request.income)?;
    let income = repo.set_monthly_income(owner_id, &income).await?;
    tracing::debug!(owner_id = %owner_id, "monthly income updated");
    Ok(IncomeResponse { income })
}
