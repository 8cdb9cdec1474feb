use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::*;

#[async_trait]
pub trait UserRepository {
    async fn create_user(&self, name: &str, email: &str, password_hash: &str) -> Result<User, AppError>;
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError>;
    async fn get_monthly_income(&self, user_id: &Uuid) -> Result<BigDecimal, AppError>;
    async fn set_monthly_income(&self, user_id: &Uuid, income: &BigDecimal) -> Result<BigDecimal, AppError>;
}

#[async_trait]
pub trait ExpenseRepository {
    async fn create_expense(&self, owner_id: &Uuid, expense: &NewExpense) -> Result<Expense, AppError>;
    /// All of the owner's expenses, newest first.
    async fn list_expenses(&self, owner_id: &Uuid) -> Result<Vec<Expense>, AppError>;
    /// The owner's expenses dated in `[from, to)`, newest first.
    async fn list_expenses_between(&self, owner_id: &Uuid, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<Expense>, AppError>;
    async fn delete_expense(&self, id: &Uuid, owner_id: &Uuid) -> Result<DeleteOutcome, AppError>;
}

#[async_trait]
pub trait SessionRepository {
    async fn create_session(&self, user_id: &Uuid, expires_at: DateTime<Utc>) -> Result<Session, AppError>;
    async fn get_active_session(&self, session_id: &Uuid, user_id: &Uuid) -> Result<Option<Session>, AppError>;
    async fn delete_session(&self, session_id: &Uuid) -> Result<(), AppError>;
}

pub trait Repository: UserRepository + ExpenseRepository + SessionRepository + Send + Sync {}

impl<T> Repository for T where T: UserRepository + ExpenseRepository + SessionRepository + Send + Sync {}

/// Repository handle kept in Rocket's managed state.
pub type SharedRepository = Arc<dyn Repository>;

#[derive(Clone)]
pub struct PostgresRepository {
    pub pool: PgPool,
}

const USER_COLUMNS: &str = "id, name, email, password_hash, monthly_income, created_at";
const EXPENSE_COLUMNS: &str = "id, user_id, title, amount, category, expense_date, created_at";

#[async_trait]
impl UserRepository for PostgresRepository {
    async fn create_user(&self, name: &str, email: &str, password_hash: &str) -> Result<User, AppError> {
        let row: UserRow = sqlx::query_as(&format!(
            "INSERT INTO users (id, name, email, password_hash, monthly_income, created_at)
             VALUES ($1, $2, $3, $4, 0, $5)
             RETURNING {USER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => AppError::UserAlreadyExists(email.to_string()),
            other => AppError::db("Failed to create user", other),
        })?;

        Ok(row.into())
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let row: Option<UserRow> = sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::db("Failed to fetch user by email", e))?;

        Ok(row.map(User::from))
    }

    async fn get_monthly_income(&self, user_id: &Uuid) -> Result<BigDecimal, AppError> {
        let income: Option<BigDecimal> = sqlx::query_scalar("SELECT monthly_income FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::db("Failed to fetch income", e))?;

        income.ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    async fn set_monthly_income(&self, user_id: &Uuid, income: &BigDecimal) -> Result<BigDecimal, AppError> {
        let updated: Option<BigDecimal> = sqlx::query_scalar("UPDATE users SET monthly_income = $1 WHERE id = $2 RETURNING monthly_income")
            .bind(income)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::db("Failed to update income", e))?;

        updated.ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }
}

#[async_trait]
impl ExpenseRepository for PostgresRepository {
    async fn create_expense(&self, owner_id: &Uuid, expense: &NewExpense) -> Result<Expense, AppError> {
        let row: ExpenseRow = sqlx::query_as(&format!(
            "INSERT INTO expenses (id, user_id, title, amount, category, expense_date, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {EXPENSE_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(owner_id)
        .bind(&expense.title)
        .bind(&expense.amount)
        .bind(expense.category.as_str())
        .bind(expense.date)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::db("Failed to create expense", e))?;

        row.try_into()
    }

    async fn list_expenses(&self, owner_id: &Uuid) -> Result<Vec<Expense>, AppError> {
        let rows: Vec<ExpenseRow> = sqlx::query_as(&format!(
            "SELECT {EXPENSE_COLUMNS} FROM expenses WHERE user_id = $1 ORDER BY expense_date DESC, created_at DESC"
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::db("Failed to fetch expenses", e))?;

        rows.into_iter().map(Expense::try_from).collect()
    }

    async fn list_expenses_between(&self, owner_id: &Uuid, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<Expense>, AppError> {
        let rows: Vec<ExpenseRow> = sqlx::query_as(&format!(
            "SELECT {EXPENSE_COLUMNS} FROM expenses
             WHERE user_id = $1 AND expense_date >= $2 AND expense_date < $3
             ORDER BY expense_date DESC, created_at DESC"
        ))
        .bind(owner_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::db("Failed to fetch expenses in range", e))?;

        rows.into_iter().map(Expense::try_from).collect()
    }

    async fn delete_expense(&self, id: &Uuid, owner_id: &Uuid) -> Result<DeleteOutcome, AppError> {
        let owner: Option<Uuid> = sqlx::query_scalar("SELECT user_id FROM expenses WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::db("Failed to fetch expense", e))?;

        match owner {
            None => Ok(DeleteOutcome::NotFound),
            Some(owner) if owner != *owner_id => Ok(DeleteOutcome::Forbidden),
            Some(_) => {
                // The owner check is repeated in the DELETE so a concurrent delete cannot remove another user's row.
                let result = sqlx::query("DELETE FROM expenses WHERE id = $1 AND user_id = $2")
                    .bind(id)
                    .bind(owner_id)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| AppError::db("Failed to delete expense", e))?;

                if result.rows_affected() == 0 {
                    Ok(DeleteOutcome::NotFound)
                } else {
                    Ok(DeleteOutcome::Deleted)
                }
            }
        }
    }
}

#[async_trait]
impl SessionRepository for PostgresRepository {
    async fn create_session(&self, user_id: &Uuid, expires_at: DateTime<Utc>) -> Result<Session, AppError> {
        sqlx::query("DELETE FROM sessions WHERE user_id = $1 AND expires_at <= now()")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::db("Failed to prune expired sessions", e))?;

        let row: SessionRow = sqlx::query_as(
            "INSERT INTO sessions (id, user_id, created_at, expires_at)
             VALUES ($1, $2, $3, $4)
             RETURNING id, user_id, expires_at",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(Utc::now())
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::db("Failed to create session", e))?;

        Ok(row.into())
    }

    async fn get_active_session(&self, session_id: &Uuid, user_id: &Uuid) -> Result<Option<Session>, AppError> {
        let row: Option<SessionRow> = sqlx::query_as(
            "SELECT id, user_id, expires_at FROM sessions
             WHERE id = $1 AND user_id = $2 AND expires_at > now()",
        )
        .bind(session_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::db("Failed to fetch session", e))?;

        Ok(row.map(Session::from))
    }

    async fn delete_session(&self, session_id: &Uuid) -> Result<(), AppError> {
        sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::db("Failed to delete session", e))?;

        Ok(())
    }
}
