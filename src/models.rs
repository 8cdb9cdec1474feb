use bigdecimal::{BigDecimal, ToPrimitive};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sqlx::FromRow;
use std::str::FromStr;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::error::AppError;

// Database row types
#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub monthly_income: BigDecimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ExpenseRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub amount: BigDecimal,
    pub category: String,
    pub expense_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct SessionRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Food,
    Travel,
    Bills,
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Food => "Food",
            Category::Travel => "Travel",
            Category::Bills => "Bills",
            Category::Other => "Other",
        }
    }

    pub fn from_db(value: &str) -> Result<Self, AppError> {
        match value {
            "Food" => Ok(Category::Food),
            "Travel" => Ok(Category::Travel),
            "Bills" => Ok(Category::Bills),
            "Other" => Ok(Category::Other),
            other => Err(AppError::db(
                "Unknown expense category in storage",
                sqlx::Error::Decode(format!("unknown category '{}'", other).into()),
            )),
        }
    }
}

// Domain types
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub monthly_income: BigDecimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expense {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub amount: BigDecimal,
    pub category: Category,
    pub date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Fields of a new expense after validation, ready to be stored.
#[derive(Debug, Clone)]
pub struct NewExpense {
    pub title: String,
    pub amount: BigDecimal,
    pub category: Category,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

// Outcome of an owner-scoped delete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
    Forbidden,
}

// API response types
#[derive(Debug, Clone, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(serialize_with = "serialize_amount")]
    pub monthly_income: BigDecimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExpenseResponse {
    pub id: Uuid,
    pub title: String,
    #[serde(serialize_with = "serialize_amount")]
    pub amount: BigDecimal,
    pub category: Category,
    pub date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: UserResponse,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct IncomeResponse {
    #[serde(serialize_with = "serialize_amount")]
    pub income: BigDecimal,
}

// Request DTOs
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateExpenseRequest {
    #[validate(length(max = 200), custom(function = "validate_not_blank"))]
    pub title: String,
    #[validate(range(min = 0.0))]
    pub amount: f64,
    pub category: Category,
    #[serde(default, deserialize_with = "deserialize_expense_date")]
    pub date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct IncomeRequest {
    #[validate(range(min = 0.0))]
    pub income: f64,
}

fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("must_not_be_blank"));
    }
    Ok(())
}

/// Accepts either an RFC 3339 timestamp or a plain `YYYY-MM-DD` date (taken as midnight UTC).
fn deserialize_expense_date<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    let Some(raw) = raw else {
        return Ok(None);
    };

    if let Ok(timestamp) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(Some(timestamp.with_timezone(&Utc)));
    }

    NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Some(naive.and_utc()))
        .ok_or_else(|| serde::de::Error::custom(format!("invalid date '{}', expected RFC 3339 or YYYY-MM-DD", raw)))
}

pub fn serialize_amount<S: Serializer>(amount: &BigDecimal, serializer: S) -> Result<S::Ok, S::Error> {
    match amount.to_f64().filter(|value| value.is_finite()) {
        Some(value) => serializer.serialize_f64(value),
        None => Err(serde::ser::Error::custom(format!("amount {} is not representable as a JSON number", amount))),
    }
}

/// Converts a JSON number into an exact decimal via its shortest decimal representation.
pub fn amount_from_f64(value: f64) -> Result<BigDecimal, AppError> {
    if !value.is_finite() {
        return Err(AppError::validation("amount must be a finite number"));
    }
    BigDecimal::from_str(&value.to_string()).map_err(|_| AppError::validation(format!("invalid amount {}", value)))
}

impl CreateExpenseRequest {
    pub fn into_new_expense(self, now: DateTime<Utc>) -> Result<NewExpense, AppError> {
        Ok(NewExpense {
            title: self.title.trim().to_string(),
            amount: amount_from_f64(self.amount)?,
            category: self.category,
            date: self.date.unwrap_or(now),
        })
    }
}

// Conversion helpers
impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            name: row.name,
            email: row.email,
            password_hash: row.password_hash,
            monthly_income: row.monthly_income,
            created_at: row.created_at,
        }
    }
}

impl TryFrom<ExpenseRow> for Expense {
    type Error = AppError;

    fn try_from(row: ExpenseRow) -> Result<Self, Self::Error> {
        Ok(Expense {
            id: row.id,
            owner_id: row.user_id,
            title: row.title,
            amount: row.amount,
            category: Category::from_db(&row.category)?,
            date: row.expense_date,
            created_at: row.created_at,
        })
    }
}

impl From<SessionRow> for Session {
    fn from(row: SessionRow) -> Self {
        Session {
            id: row.id,
            user_id: row.user_id,
            expires_at: row.expires_at,
        }
    }
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        UserResponse {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            monthly_income: user.monthly_income.clone(),
            created_at: user.created_at,
        }
    }
}

impl From<&Expense> for ExpenseResponse {
    fn from(expense: &Expense) -> Self {
        ExpenseResponse {
            id: expense.id,
            title: expense.title.clone(),
            amount: expense.amount.clone(),
            category: expense.category,
            date: expense.date,
            created_at: expense.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn amount_keeps_shortest_decimal_form() {
        assert_eq!(amount_from_f64(0.1).unwrap(), BigDecimal::from_str("0.1").unwrap());
        assert_eq!(amount_from_f64(12.5).unwrap(), BigDecimal::from_str("12.5").unwrap());
        assert_eq!(amount_from_f64(100.0).unwrap(), BigDecimal::from(100));
    }

    #[test]
    fn amount_rejects_non_finite_values() {
        assert!(matches!(amount_from_f64(f64::NAN), Err(AppError::Validation(_))));
        assert!(matches!(amount_from_f64(f64::INFINITY), Err(AppError::Validation(_))));
    }

    #[test]
    fn expense_request_accepts_plain_date() {
        let request: CreateExpenseRequest =
            serde_json::from_str(r#"{"title":"Groceries","amount":42.5,"category":"Food","date":"2024-01-05"}"#).unwrap();
        assert_eq!(request.date, Some(Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap()));
    }

    #[test]
    fn expense_request_accepts_rfc3339_with_offset() {
        let request: CreateExpenseRequest =
            serde_json::from_str(r#"{"title":"Train","amount":9,"category":"Travel","date":"2024-01-31T23:30:00-02:00"}"#).unwrap();
        assert_eq!(request.date, Some(Utc.with_ymd_and_hms(2024, 2, 1, 1, 30, 0).unwrap()));
    }

    #[test]
    fn expense_request_date_defaults_to_now() {
        let request: CreateExpenseRequest = serde_json::from_str(r#"{"title":"Rent","amount":900,"category":"Bills"}"#).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        let new_expense = request.into_new_expense(now).unwrap();
        assert_eq!(new_expense.date, now);
        assert_eq!(new_expense.amount, BigDecimal::from(900));
    }

    #[test]
    fn expense_request_rejects_unknown_category() {
        let parsed = serde_json::from_str::<CreateExpenseRequest>(r#"{"title":"x","amount":1,"category":"Toys"}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn expense_request_validation() {
        let blank = CreateExpenseRequest {
            title: "   ".to_string(),
            amount: 10.0,
            category: Category::Other,
            date: None,
        };
        assert!(blank.validate().is_err());

        let negative = CreateExpenseRequest {
            title: "Lunch".to_string(),
            amount: -1.0,
            category: Category::Food,
            date: None,
        };
        assert!(negative.validate().is_err());

        let free = CreateExpenseRequest {
            title: "Sample".to_string(),
            amount: 0.0,
            category: Category::Food,
            date: None,
        };
        assert!(free.validate().is_ok());
    }

    #[test]
    fn income_request_rejects_negative_values() {
        assert!(IncomeRequest { income: -5.0 }.validate().is_err());
        assert!(IncomeRequest { income: 0.0 }.validate().is_ok());
    }

    #[test]
    fn category_round_trips_through_db_text() {
        for category in [Category::Food, Category::Travel, Category::Bills, Category::Other] {
            assert_eq!(Category::from_db(category.as_str()).unwrap(), category);
        }
        assert!(matches!(Category::from_db("garbage"), Err(AppError::Db { .. })));
    }

    #[test]
    fn expense_response_serializes_amount_as_number() {
        let expense = Expense {
            id: Uuid::nil(),
            owner_id: Uuid::nil(),
            title: "Coffee".to_string(),
            amount: BigDecimal::from_str("3.75").unwrap(),
            category: Category::Food,
            date: Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap(),
            created_at: Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap(),
        };
        let json = serde_json::to_value(ExpenseResponse::from(&expense)).unwrap();
        assert_eq!(json["amount"], serde_json::json!(3.75));
        assert_eq!(json["category"], serde_json::json!("Food"));
    }

    #[test]
    fn expense_row_with_unknown_category_is_an_error() {
        let row = ExpenseRow {
            id: Uuid::nil(),
            user_id: Uuid::nil(),
            title: "Mystery".to_string(),
            amount: BigDecimal::from(1),
            category: "Toys".to_string(),
            expense_date: Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap(),
            created_at: Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap(),
        };
        assert!(matches!(Expense::try_from(row), Err(AppError::Db { .. })));
    }

    #[test]
    fn unrepresentable_amount_fails_serialization() {
        let response = IncomeResponse {
            income: BigDecimal::from_str("1e400").unwrap(),
        };
        assert!(serde_json::to_value(response).is_err());
    }
}
