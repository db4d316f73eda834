//! System configuration entries and the library policy derived from them

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

use super::user::UserType;

/// Longest loan, hold or grace period a policy may set
pub const MAX_PERIOD_DAYS: i64 = 3650;

/// Reservation priorities stay within the range staff may set by hand
pub const MAX_PRIORITY: i64 = 100;

/// Largest amount a `NUMERIC(10, 2)` money column holds
pub const MAX_MONEY: Decimal = Decimal::from_parts(1_410_065_407, 2, 0, false, 2);

/// A configuration row (key -> JSON value)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct ConfigEntry {
    pub key: String,
    #[schema(value_type = Object)]
    pub value: Value,
    pub description: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub updated_by: Option<i32>,
}

/// Update request for a configuration key
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateConfigEntry {
    #[schema(value_type = Object)]
    pub value: Value,
    #[validate(length(max = 500))]
    pub description: Option<String>,
}

/// One integer setting per user type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PerUserType {
    pub student: i64,
    pub professor: i64,
    pub librarian: i64,
    pub admin: i64,
    pub staff: i64,
}

impl PerUserType {
    pub fn get(&self, user_type: UserType) -> i64 {
        match user_type {
            UserType::Student => self.student,
            UserType::Professor => self.professor,
            UserType::Librarian => self.librarian,
            UserType::Admin => self.admin,
            UserType::Staff => self.staff,
        }
    }

    fn min(&self) -> i64 {
        UserType::ALL.iter().map(|t| self.get(*t)).min().unwrap_or(0)
    }

    fn max(&self) -> i64 {
        UserType::ALL.iter().map(|t| self.get(*t)).max().unwrap_or(0)
    }

    fn within(&self, low: i64, high: i64) -> bool {
        self.min() >= low && self.max() <= high
    }
}

/// Circulation rules, read from `system_config` with defaults for missing keys
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct LibraryPolicy {
    pub loan_period_days: PerUserType,
    pub max_loans: PerUserType,
    pub max_renewals: i32,
    pub daily_fine_rate: Decimal,
    /// Upper bound of a single loan's fine; `null` for no bound
    pub max_fine_per_loan: Option<Decimal>,
    pub fine_grace_days: i64,
    /// Pending fines above this total block new loans
    pub max_unpaid_fines: Decimal,
    pub reservation_hold_days: i64,
    pub max_reservations: i64,
    pub reservation_priority: PerUserType,
}

impl Default for LibraryPolicy {
    fn default() -> Self {
        Self {
            loan_period_days: PerUserType {
                student: 14,
                professor: 60,
                librarian: 30,
                admin: 30,
                staff: 30,
            },
            max_loans: PerUserType {
                student: 5,
                professor: 15,
                librarian: 10,
                admin: 10,
                staff: 8,
            },
            max_renewals: 2,
            daily_fine_rate: Decimal::new(50, 2),
            max_fine_per_loan: Some(Decimal::new(2000, 2)),
            fine_grace_days: 0,
            max_unpaid_fines: Decimal::new(1000, 2),
            reservation_hold_days: 3,
            max_reservations: 5,
            reservation_priority: PerUserType {
                student: 0,
                professor: 2,
                librarian: 1,
                admin: 1,
                staff: 1,
            },
        }
    }
}

impl LibraryPolicy {
    /// Build the policy from configuration rows. Unknown keys are ignored.
    pub fn from_entries<'a, I>(entries: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = (&'a str, &'a Value)>,
    {
        let map: serde_json::Map<String, Value> = entries
            .into_iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect();

        let policy: LibraryPolicy =
            serde_json::from_value(Value::Object(map)).map_err(|e| e.to_string())?;
        policy.validate()?;
        Ok(policy)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.loan_period_days.within(1, MAX_PERIOD_DAYS) {
            return Err(format!(
                "loan_period_days must be between 1 and {} for every user type",
                MAX_PERIOD_DAYS
            ));
        }
        if self.max_loans.min() < 1 {
            return Err("max_loans must be at least 1 for every user type".into());
        }
        if self.max_renewals < 0 {
            return Err("max_renewals must not be negative".into());
        }
        check_money("daily_fine_rate", self.daily_fine_rate)?;
        if let Some(cap) = self.max_fine_per_loan {
            check_money("max_fine_per_loan", cap)?;
        }
        if !(0..=MAX_PERIOD_DAYS).contains(&self.fine_grace_days) {
            return Err(format!("fine_grace_days must be between 0 and {}", MAX_PERIOD_DAYS));
        }
        check_money("max_unpaid_fines", self.max_unpaid_fines)?;
        if !(1..=MAX_PERIOD_DAYS).contains(&self.reservation_hold_days) {
            return Err(format!("reservation_hold_days must be between 1 and {}", MAX_PERIOD_DAYS));
        }
        if self.max_reservations < 1 {
            return Err("max_reservations must be at least 1".into());
        }
        if !self.reservation_priority.within(-MAX_PRIORITY, MAX_PRIORITY) {
            return Err(format!(
                "reservation_priority must be between -{} and {} for every user type",
                MAX_PRIORITY, MAX_PRIORITY
            ));
        }
        Ok(())
    }

    pub fn loan_period(&self, user_type: UserType) -> Duration {
        Duration::days(self.loan_period_days.get(user_type))
    }

    pub fn max_loans_for(&self, user_type: UserType) -> i64 {
        self.max_loans.get(user_type)
    }

    pub fn priority_for(&self, user_type: UserType) -> i32 {
        let priority = self.reservation_priority.get(user_type).clamp(-MAX_PRIORITY, MAX_PRIORITY);
        i32::try_from(priority).unwrap_or_default()
    }

    pub fn hold_period(&self) -> Duration {
        Duration::days(self.reservation_hold_days)
    }

    /// Chargeable overdue days: whole calendar days from the due date to `at`,
    /// minus the grace days, never negative
    pub fn overdue_days(&self, due_date: DateTime<Utc>, at: DateTime<Utc>) -> i64 {
        let days = (at.date_naive() - due_date.date_naive()).num_days();
        (days - self.fine_grace_days).max(0)
    }

    /// Fine owed for a loan returned at `returned_at`, if any
    pub fn fine_for(&self, due_date: DateTime<Utc>, returned_at: DateTime<Utc>) -> Option<(i64, Decimal)> {
        let days = self.overdue_days(due_date, returned_at);
        if days == 0 {
            return None;
        }

        let cap = self.max_fine_per_loan.unwrap_or(MAX_MONEY).min(MAX_MONEY);
        let amount = self
            .daily_fine_rate
            .checked_mul(Decimal::from(days))
            .map_or(cap, |amount| amount.min(cap));

        (amount > Decimal::ZERO).then_some((days, amount.round_dp(2)))
    }
}

fn check_money(name: &str, amount: Decimal) -> Result<(), String> {
    if amount.is_sign_negative() {
        return Err(format!("{} must not be negative", name));
    }
    if amount > MAX_MONEY {
        return Err(format!("{} must not exceed {}", name, MAX_MONEY));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_defaults_validate() {
        assert!(LibraryPolicy::default().validate().is_ok());
    }

    #[test]
    fn test_missing_keys_take_defaults() {
        let rate = json!("1.25");
        let extra = json!("Main Library");
        let policy = LibraryPolicy::from_entries([
            ("daily_fine_rate", &rate),
            ("library_name", &extra),
        ])
        .unwrap();

        assert_eq!(policy.daily_fine_rate, Decimal::new(125, 2));
        assert_eq!(policy.max_renewals, 2);
        assert_eq!(policy.loan_period(UserType::Professor), Duration::days(60));
    }

    #[test]
    fn test_partial_user_type_map_rejected() {
        let partial = json!({ "student": 10 });
        assert!(LibraryPolicy::from_entries([("max_loans", &partial)]).is_err());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let zero = json!(0);
        assert!(LibraryPolicy::from_entries([("reservation_hold_days", &zero)]).is_err());

        let negative = json!("-1.00");
        assert!(LibraryPolicy::from_entries([("daily_fine_rate", &negative)]).is_err());

        let wrong_type = json!("two");
        assert!(LibraryPolicy::from_entries([("max_renewals", &wrong_type)]).is_err());
    }

    #[test]
    fn test_null_cap_means_unbounded() {
        let null = json!(null);
        let policy = LibraryPolicy::from_entries([("max_fine_per_loan", &null)]).unwrap();
        let (days, amount) = policy.fine_for(at(1, 12), at(31, 12)).unwrap();
        assert_eq!(days, 30);
        assert_eq!(amount, Decimal::new(1500, 2));
    }

    #[test]
    fn test_overdue_days_counts_calendar_days() {
        let policy = LibraryPolicy::default();
        assert_eq!(policy.overdue_days(at(10, 18), at(10, 23)), 0);
        assert_eq!(policy.overdue_days(at(10, 18), at(11, 1)), 1);
        assert_eq!(policy.overdue_days(at(10, 18), at(5, 1)), 0);
    }

    #[test]
    fn test_grace_days() {
        let policy = LibraryPolicy {
            fine_grace_days: 2,
            ..LibraryPolicy::default()
        };
        assert_eq!(policy.overdue_days(at(10, 9), at(12, 9)), 0);
        assert_eq!(policy.overdue_days(at(10, 9), at(15, 9)), 3);
    }

    #[test]
    fn test_fine_amount_and_cap() {
        let policy = LibraryPolicy::default();
        assert!(policy.fine_for(at(10, 9), at(10, 20)).is_none());

        let (days, amount) = policy.fine_for(at(10, 9), at(14, 9)).unwrap();
        assert_eq!(days, 4);
        assert_eq!(amount, Decimal::new(200, 2));

        let (days, amount) = policy.fine_for(at(1, 9), at(28, 9)).unwrap();
        assert_eq!(days, 27);
        assert_eq!(amount, Decimal::new(2000, 2));
    }

    #[test]
    fn test_free_rate_produces_no_fine() {
        let policy = LibraryPolicy {
            daily_fine_rate: Decimal::ZERO,
            ..LibraryPolicy::default()
        };
        assert!(policy.fine_for(at(1, 9), at(20, 9)).is_none());
    }

    #[test]
    fn test_per_user_type_lookups() {
        let policy = LibraryPolicy::default();
        assert_eq!(policy.max_loans_for(UserType::Student), 5);
        assert_eq!(policy.max_loans_for(UserType::Staff), 8);
        assert!(policy.priority_for(UserType::Professor) > policy.priority_for(UserType::Student));
    }

    #[test]
    fn test_money_ceiling_matches_column() {
        assert_eq!(MAX_MONEY.to_string(), "99999999.99");
    }

    #[test]
    fn test_period_upper_bounds() {
        let long = json!({ "student": 14, "professor": 1000000000, "librarian": 30, "admin": 30, "staff": 30 });
        assert!(LibraryPolicy::from_entries([("loan_period_days", &long)]).is_err());

        let hold = json!(MAX_PERIOD_DAYS + 1);
        assert!(LibraryPolicy::from_entries([("reservation_hold_days", &hold)]).is_err());
        assert!(LibraryPolicy::from_entries([("fine_grace_days", &hold)]).is_err());

        let limit = json!(MAX_PERIOD_DAYS);
        assert!(LibraryPolicy::from_entries([("reservation_hold_days", &limit)]).is_ok());
    }

    #[test]
    fn test_priority_bounds() {
        let wide = json!({ "student": 0, "professor": 4294967296i64, "librarian": 1, "admin": 1, "staff": 1 });
        assert!(LibraryPolicy::from_entries([("reservation_priority", &wide)]).is_err());

        let low = json!({ "student": -101, "professor": 2, "librarian": 1, "admin": 1, "staff": 1 });
        assert!(LibraryPolicy::from_entries([("reservation_priority", &low)]).is_err());

        let unchecked = LibraryPolicy {
            reservation_priority: PerUserType {
                student: 0,
                professor: 4_294_967_296,
                librarian: 1,
                admin: 1,
                staff: 1,
            },
            ..LibraryPolicy::default()
        };
        assert_eq!(unchecked.priority_for(UserType::Professor), 100);
    }

    #[test]
    fn test_money_upper_bounds() {
        let huge = json!("100000000.00");
        assert!(LibraryPolicy::from_entries([("daily_fine_rate", &huge)]).is_err());
        assert!(LibraryPolicy::from_entries([("max_fine_per_loan", &huge)]).is_err());
        assert!(LibraryPolicy::from_entries([("max_unpaid_fines", &huge)]).is_err());

        let ceiling = json!("99999999.99");
        assert!(LibraryPolicy::from_entries([("max_unpaid_fines", &ceiling)]).is_ok());
    }

    #[test]
    fn test_unbounded_fine_stays_within_column() {
        let policy = LibraryPolicy {
            daily_fine_rate: MAX_MONEY,
            max_fine_per_loan: None,
            ..LibraryPolicy::default()
        };
        let (days, amount) = policy.fine_for(at(1, 9), at(28, 9)).unwrap();
        assert_eq!(days, 27);
        assert_eq!(amount, MAX_MONEY);

        let overflowing = LibraryPolicy {
            daily_fine_rate: Decimal::MAX,
            ..policy
        };
        let (_, amount) = overflowing.fine_for(at(1, 9), at(28, 9)).unwrap();
        assert_eq!(amount, MAX_MONEY);
    }
}
