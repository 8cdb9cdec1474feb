use async_trait::async_trait;
use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::*;
use crate::store::{ExpenseRepository, SessionRepository, UserRepository};

#[derive(Default)]
struct State {
    users: HashMap<Uuid, User>,
    expenses: Vec<Expense>,
    sessions: HashMap<Uuid, Session>,
}

/// In-memory repository for route and service tests. Counts every expense
/// query so tests can assert that validation short-circuits store access.
#[derive(Default)]
pub struct MemoryRepository {
    state: Mutex<State>,
    expense_reads: AtomicUsize,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expense_reads(&self) -> usize {
        self.expense_reads.load(Ordering::SeqCst)
    }

    pub fn expense_count(&self) -> usize {
        self.state.lock().unwrap().expenses.len()
    }

    pub fn insert_expense(&self, owner_id: Uuid, amount: BigDecimal, date: DateTime<Utc>) -> Expense {
        let expense = Expense {
            id: Uuid::new_v4(),
            owner_id,
            title: "seeded".to_string(),
            amount,
            category: Category::Other,
            date,
            created_at: date,
        };
        self.state.lock().unwrap().expenses.push(expense.clone());
        expense
    }

    pub fn insert_user(&self, email: &str) -> User {
        let user = User {
            id: Uuid::new_v4(),
            name: "Test User".to_string(),
            email: email.to_string(),
            password_hash: String::new(),
            monthly_income: BigDecimal::zero(),
            created_at: Utc::now(),
        };
        self.state.lock().unwrap().users.insert(user.id, user.clone());
        user
    }

    fn sorted_newest_first(mut expenses: Vec<Expense>) -> Vec<Expense> {
        expenses.sort_by(|a, b| b.date.cmp(&a.date).then(b.created_at.cmp(&a.created_at)));
        expenses
    }
}

#[async_trait]
impl UserRepository for MemoryRepository {
    async fn create_user(&self, name: &str, email: &str, password_hash: &str) -> Result<User, AppError> {
        let mut state = self.state.lock().unwrap();
        if state.users.values().any(|u| u.email == email) {
            return Err(AppError::UserAlreadyExists(email.to_string()));
        }
        let user = User {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            monthly_income: BigDecimal::zero(),
            created_at: Utc::now(),
        };
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        Ok(self.state.lock().unwrap().users.values().find(|u| u.email == email).cloned())
    }

    async fn get_monthly_income(&self, user_id: &Uuid) -> Result<BigDecimal, AppError> {
        self.state
            .lock()
            .unwrap()
            .users
            .get(user_id)
            .map(|u| u.monthly_income.clone())
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    async fn set_monthly_income(&self, user_id: &Uuid, income: &BigDecimal) -> Result<BigDecimal, AppError> {
        let mut state = self.state.lock().unwrap();
        let user = state.users.get_mut(user_id).ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
        user.monthly_income = income.clone();
        Ok(user.monthly_income.clone())
    }
}

#[async_trait]
impl ExpenseRepository for MemoryRepository {
    async fn create_expense(&self, owner_id: &Uuid, expense: &NewExpense) -> Result<Expense, AppError> {
        let expense = Expense {
            id: Uuid::new_v4(),
            owner_id: *owner_id,
            title: expense.title.clone(),
            amount: expense.amount.clone(),
            category: expense.category,
            date: expense.date,
            created_at: Utc::now(),
        };
        self.state.lock().unwrap().expenses.push(expense.clone());
        Ok(expense)
    }

    async fn list_expenses(&self, owner_id: &Uuid) -> Result<Vec<Expense>, AppError> {
        self.expense_reads.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().unwrap();
        let owned = state.expenses.iter().filter(|e| e.owner_id == *owner_id).cloned().collect();
        Ok(Self::sorted_newest_first(owned))
    }

    async fn list_expenses_between(&self, owner_id: &Uuid, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<Expense>, AppError> {
        self.expense_reads.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().unwrap();
        let owned = state
            .expenses
            .iter()
            .filter(|e| e.owner_id == *owner_id && e.date >= from && e.date < to)
            .cloned()
            .collect();
        Ok(Self::sorted_newest_first(owned))
    }

    async fn delete_expense(&self, id: &Uuid, owner_id: &Uuid) -> Result<DeleteOutcome, AppError> {
        let mut state = self.state.lock().unwrap();
        match state.expenses.iter().position(|e| e.id == *id) {
            None => Ok(DeleteOutcome::NotFound),
            Some(index) if state.expenses[index].owner_id != *owner_id => Ok(DeleteOutcome::Forbidden),
            Some(index) => {
                state.expenses.remove(index);
                Ok(DeleteOutcome::Deleted)
            }
        }
    }
}

#[async_trait]
impl SessionRepository for MemoryRepository {
    async fn create_session(&self, user_id: &Uuid, expires_at: DateTime<Utc>) -> Result<Session, AppError> {
        let session = Session {
            id: Uuid::new_v4(),
            user_id: *user_id,
            expires_at,
        };
        self.state.lock().unwrap().sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn get_active_session(&self, session_id: &Uuid, user_id: &Uuid) -> Result<Option<Session>, AppError> {
        let now = Utc::now();
        Ok(self
            .state
            .lock()
            .unwrap()
            .sessions
            .get(session_id)
            .filter(|s| s.user_id == *user_id && s.expires_at > now)
            .cloned())
    }

    async fn delete_session(&self, session_id: &Uuid) -> Result<(), AppError> {
        self.state.lock().unwrap().sessions.remove(session_id);
        Ok(())
    }
}
