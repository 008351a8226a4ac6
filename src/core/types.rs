use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Savings unit every expense is rounded up to.
pub const ROUNDING_UNIT: Decimal = dec!(100);

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Vehicle {
    Nps,
    Index,
}

impl Vehicle {
    pub fn annual_rate(self) -> Decimal {
        match self {
            Vehicle::Nps => dec!(0.0711),
            Vehicle::Index => dec!(0.1449),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expense {
    #[serde(alias = "timestamp", with = "calendar_date")]
    pub date: NaiveDate,
    pub amount: Decimal,
}

/// Transaction as supplied by a caller. Ceiling and remanent are optional and
/// are derived from the amount when either one is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct TransactionInput {
    #[serde(alias = "timestamp", with = "calendar_date")]
    pub date: NaiveDate,
    pub amount: Decimal,
    #[serde(default)]
    pub ceiling: Option<Decimal>,
    #[serde(default)]
    pub remanent: Option<Decimal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(with = "calendar_date")]
    pub date: NaiveDate,
    pub amount: Decimal,
    pub ceiling: Decimal,
    pub remanent: Decimal,
}

/// Reason a transaction was set aside. The display text is the message
/// reported to callers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("duplicate transaction: a transaction dated {0} was already accepted")]
    DuplicateDate(NaiveDate),

    #[error("duplicate transaction: {amount} dated {date} was already admitted")]
    DuplicateEntry { date: NaiveDate, amount: Decimal },

    #[error(
        "remanent {remanent} must be in [0, 100) and equal ceiling {ceiling} minus amount {amount}"
    )]
    InconsistentRemanent {
        amount: Decimal,
        ceiling: Decimal,
        remanent: Decimal,
    },

    #[error("amount must be positive")]
    NonPositiveAmount,

    #[error("negative amounts are not allowed")]
    NegativeAmount,

    #[error("amount {amount} exceeds wage {wage}")]
    ExceedsWage { amount: Decimal, wage: Decimal },

    #[error("remanent {remanent} exceeds maximum invest {max_invest}")]
    ExceedsMaxInvest {
        remanent: Decimal,
        max_invest: Decimal,
    },
}

/// Validator output item: the full transaction plus the first violated rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedTransaction {
    #[serde(flatten)]
    pub transaction: Transaction,
    pub message: String,
}

impl RejectedTransaction {
    pub fn new(transaction: Transaction, reason: &Rejection) -> Self {
        Self {
            transaction,
            message: reason.to_string(),
        }
    }
}

/// Rule engine output item; carries no ceiling or remanent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedEntry {
    #[serde(with = "calendar_date")]
    pub date: NaiveDate,
    pub amount: Decimal,
    pub message: String,
}

/// Accepted and rejected items, each list in input order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Partition<T, R> {
    pub valid: Vec<T>,
    pub invalid: Vec<R>,
}

impl<T, R> Default for Partition<T, R> {
    fn default() -> Self {
        Self {
            valid: Vec::new(),
            invalid: Vec::new(),
        }
    }
}

/// Forces the remanent of matching transactions to `fixed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QPeriod {
    #[serde(alias = "value")]
    pub fixed: Decimal,
    #[serde(with = "calendar_date")]
    pub start: NaiveDate,
    #[serde(with = "calendar_date")]
    pub end: NaiveDate,
}

/// Adds `extra` to the remanent of matching transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PPeriod {
    #[serde(alias = "value")]
    pub extra: Decimal,
    #[serde(with = "calendar_date")]
    pub start: NaiveDate,
    #[serde(with = "calendar_date")]
    pub end: NaiveDate,
}

/// Aggregation window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KPeriod {
    #[serde(with = "calendar_date")]
    pub start: NaiveDate,
    #[serde(with = "calendar_date")]
    pub end: NaiveDate,
}

impl QPeriod {
    pub fn contains(&self, date: NaiveDate) -> bool {
        within(date, self.start, self.end)
    }
}

impl PPeriod {
    pub fn contains(&self, date: NaiveDate) -> bool {
        within(date, self.start, self.end)
    }
}

impl KPeriod {
    pub fn contains(&self, date: NaiveDate) -> bool {
        within(date, self.start, self.end)
    }
}

fn within(date: NaiveDate, start: NaiveDate, end: NaiveDate) -> bool {
    start <= date && date <= end
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeriodSet {
    pub q: Vec<QPeriod>,
    pub p: Vec<PPeriod>,
    pub k: Vec<KPeriod>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SavingsByDate {
    #[serde(with = "calendar_date")]
    pub start: NaiveDate,
    #[serde(with = "calendar_date")]
    pub end: NaiveDate,
    pub amount: Decimal,
}

/// Projection of one k window. NPS results fill `profits`, `tax_benefit` and
/// `tax_saving`; index results fill `real_return`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnResult {
    #[serde(with = "calendar_date")]
    pub start: NaiveDate,
    #[serde(with = "calendar_date")]
    pub end: NaiveDate,
    pub amount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profits: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax_benefit: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax_saving: Option<Decimal>,
    #[serde(rename = "return", skip_serializing_if = "Option::is_none")]
    pub real_return: Option<Decimal>,
}

/// Dates travel as `YYYY-MM-DD`. Date-time input is accepted and truncated to
/// its calendar date.
pub mod calendar_date {
    use chrono::{DateTime, NaiveDate, NaiveDateTime};
    use serde::{Deserialize, Deserializer, Serializer, de};

    const DATE_FORMAT: &str = "%Y-%m-%d";
    const DATE_TIME_FORMATS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
    ];

    pub fn parse(raw: &str) -> Result<NaiveDate, String> {
        let raw = raw.trim();
        if let Ok(date) = NaiveDate::parse_from_str(raw, DATE_FORMAT) {
            return Ok(date);
        }
        for format in DATE_TIME_FORMATS {
            if let Ok(date_time) = NaiveDateTime::parse_from_str(raw, format) {
                return Ok(date_time.date());
            }
        }
        DateTime::parse_from_rfc3339(raw)
            .map(|date_time| date_time.date_naive())
            .map_err(|_| format!("invalid date `{raw}`, expected YYYY-MM-DD or YYYY-MM-DD HH:MM:SS"))
    }

    pub fn serialize<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&date.format(DATE_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(de::Error::custom)
    }
}
