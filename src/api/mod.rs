use axum::{
    Router,
    body::Bytes,
    extract::{Json, Path},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::net::SocketAddr;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::core::{
    CoreError, Expense, FilterOutcome, KPeriod, PPeriod, Partition, PeriodSet, QPeriod,
    RejectedTransaction, ReturnParams, ReturnResult, Transaction, TransactionInput,
    ValidationRules, Vehicle, adjust, aggregate, apply, build_all, project, validate,
};

pub const API_BASE: &str = "/blackrock/challenge/v1";

/// Exclusive upper bound on expense amounts and on q/p period values.
pub const VALUE_LIMIT: Decimal = dec!(500000);

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Operation {
    Parse,
    Validate,
    Filter,
    Returns(Vehicle),
}

impl Operation {
    fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "transactions:parse" => Some(Operation::Parse),
            "transactions:validator" => Some(Operation::Validate),
            "transactions:filter" => Some(Operation::Filter),
            "returns:nps" => Some(Operation::Returns(Vehicle::Nps)),
            "returns:index" => Some(Operation::Returns(Vehicle::Index)),
            _ => None,
        }
    }
}

/// Expenses arrive either as a bare list or wrapped as `{"expenses": [...]}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ExpenseBatch {
    List(Vec<Expense>),
    Wrapped { expenses: Vec<Expense> },
}

impl ExpenseBatch {
    pub fn into_expenses(self) -> Vec<Expense> {
        match self {
            ExpenseBatch::List(expenses) | ExpenseBatch::Wrapped { expenses } => expenses,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatorPayload {
    pub wage: Decimal,
    #[serde(default)]
    pub max_invest: Option<Decimal>,
    pub transactions: Vec<TransactionInput>,
}

/// q periods may also be sent under `a`.
#[derive(Debug, Default, Deserialize)]
pub struct PeriodPayload {
    #[serde(default, alias = "a")]
    pub q: Vec<QPeriod>,
    #[serde(default)]
    pub p: Vec<PPeriod>,
    #[serde(default)]
    pub k: Vec<KPeriod>,
}

impl PeriodPayload {
    fn check_bounds(&self) -> Result<(), ApiError> {
        for period in &self.q {
            ensure_in_range("q fixed", period.fixed)?;
        }
        for period in &self.p {
            ensure_in_range("p extra", period.extra)?;
        }
        Ok(())
    }
}

impl From<PeriodPayload> for PeriodSet {
    fn from(value: PeriodPayload) -> Self {
        PeriodSet {
            q: value.q,
            p: value.p,
            k: value.k,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct FilterPayload {
    #[serde(flatten)]
    pub periods: PeriodPayload,
    pub transactions: Vec<TransactionInput>,
}

#[derive(Debug, Deserialize)]
pub struct ReturnsPayload {
    pub age: u32,
    pub wage: Decimal,
    pub inflation: Decimal,
    #[serde(flatten)]
    pub periods: PeriodPayload,
    pub transactions: Vec<TransactionInput>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnsResponse {
    pub transactions_total_amount: Decimal,
    pub total_ceiling: Decimal,
    pub savings_by_dates: Vec<ReturnResult>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid JSON payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Domain(#[from] CoreError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Payload(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Domain(_) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        warn!(status = status.as_u16(), error = %self, "rejected request");
        error_response(status, &self.to_string())
    }
}

fn ensure_in_range(field: &str, value: Decimal) -> Result<(), ApiError> {
    if value < Decimal::ZERO || value >= VALUE_LIMIT {
        return Err(ApiError::BadRequest(format!(
            "{field} {value} must be in [0, {VALUE_LIMIT})"
        )));
    }
    Ok(())
}

pub fn parse_expenses(batch: ExpenseBatch) -> Result<Vec<Transaction>, ApiError> {
    let expenses = batch.into_expenses();
    for expense in &expenses {
        ensure_in_range("amount", expense.amount)?;
    }
    Ok(build_all(&expenses))
}

pub fn validate_transactions(
    payload: ValidatorPayload,
) -> Result<Partition<Transaction, RejectedTransaction>, ApiError> {
    if payload.wage < Decimal::ZERO {
        return Err(ApiError::BadRequest("wage must be >= 0".to_string()));
    }
    if payload.max_invest.is_some_and(|cap| cap < Decimal::ZERO) {
        return Err(ApiError::BadRequest("maxInvest must be >= 0".to_string()));
    }

    let rules = match payload.max_invest {
        Some(cap) => ValidationRules::new(payload.wage).with_max_invest(cap),
        None => ValidationRules::new(payload.wage),
    };
    let transactions: Vec<_> = payload
        .transactions
        .into_iter()
        .map(TransactionInput::resolve)
        .collect();
    Ok(validate(&transactions, &rules))
}

pub fn filter_transactions(payload: FilterPayload) -> Result<FilterOutcome, ApiError> {
    payload.periods.check_bounds()?;
    Ok(apply(&payload.transactions, &payload.periods.into()))
}

pub fn project_returns(
    payload: ReturnsPayload,
    vehicle: Vehicle,
) -> Result<ReturnsResponse, ApiError> {
    payload.periods.check_bounds()?;
    let params = ReturnParams::new(payload.age, payload.wage, payload.inflation)?;
    let periods: PeriodSet = payload.periods.into();

    // Every transaction sent is projected; there is no admission step here.
    let transactions: Vec<_> = payload
        .transactions
        .into_iter()
        .map(TransactionInput::resolve)
        .collect();
    let (transactions_total_amount, total_ceiling) = transactions
        .iter()
        .fold((Decimal::ZERO, Decimal::ZERO), |(amount, ceiling), t| {
            (amount + t.amount, ceiling + t.ceiling)
        });
    let savings_by_date = aggregate(&adjust(&transactions, &periods), &periods.k);
    debug!(
        transactions = transactions.len(),
        windows = savings_by_date.len(),
        "projecting returns"
    );

    Ok(ReturnsResponse {
        transactions_total_amount,
        total_ceiling,
        savings_by_dates: project(&savings_by_date, &params, vehicle)?,
    })
}

/// Runs a returns projection over a raw JSON request body.
pub fn project_returns_json(json: &str, vehicle: Vehicle) -> Result<ReturnsResponse, ApiError> {
    project_returns(serde_json::from_str(json)?, vehicle)
}

pub fn router() -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route(&format!("{API_BASE}/:operation"), post(operation_handler))
        .fallback(not_found_handler)
}

pub async fn run_http_server(addr: SocketAddr) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "round-up savings API listening");
    info!("endpoints under http://{addr}{API_BASE}/");

    axum::serve(listener, router()).await
}

async fn health_handler() -> Response {
    json_response(StatusCode::OK, serde_json::json!({ "status": "ok" }))
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn operation_handler(Path(segment): Path<String>, body: Bytes) -> Response {
    let Some(operation) = Operation::from_segment(&segment) else {
        return not_found_handler().await;
    };
    debug!(?operation, bytes = body.len(), "handling request");

    match dispatch(operation, &body) {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

fn dispatch(operation: Operation, body: &[u8]) -> Result<Response, ApiError> {
    let response = match operation {
        Operation::Parse => json_response(StatusCode::OK, parse_expenses(decode(body)?)?),
        Operation::Validate => {
            json_response(StatusCode::OK, validate_transactions(decode(body)?)?)
        }
        Operation::Filter => json_response(StatusCode::OK, filter_transactions(decode(body)?)?),
        Operation::Returns(vehicle) => {
            json_response(StatusCode::OK, project_returns(decode(body)?, vehicle)?)
        }
    };
    Ok(response)
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    Ok(serde_json::from_slice(body)?)
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use chrono::NaiveDate;
    use http_body_util::BodyExt;
    use rust_decimal_macros::dec;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    fn expenses() -> Value {
        json!([
            {"timestamp": "2023-10-12 20:15:00", "amount": 250},
            {"timestamp": "2023-02-28 15:49:00", "amount": 375},
            {"timestamp": "2023-07-01 21:59:00", "amount": 620},
            {"timestamp": "2023-12-17 08:09:00", "amount": 480}
        ])
    }

    fn periods() -> Value {
        json!({
            "q": [{"fixed": 0, "start": "2023-07-01 00:00:00", "end": "2023-07-31 23:59:00"}],
            "p": [{"extra": 25, "start": "2023-10-01 08:00:00", "end": "2023-12-31 19:59:00"}],
            "k": [
                {"start": "2023-03-01 00:00:00", "end": "2023-11-30 23:59:00"},
                {"start": "2023-01-01 00:00:00", "end": "2023-12-31 23:59:00"}
            ]
        })
    }

    fn returns_body() -> Value {
        let mut body = periods();
        body["age"] = json!(29);
        body["wage"] = json!(50000);
        body["inflation"] = json!(0.055);
        body["transactions"] = expenses();
        body
    }

    async fn post(operation: &str, body: Value) -> (StatusCode, Value) {
        let response = router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("{API_BASE}/{operation}"))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .expect("request should build"),
            )
            .await
            .expect("router is infallible");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body should collect")
            .to_bytes();
        let json = serde_json::from_slice(&bytes).expect("body should be json");
        (status, json)
    }

    fn number(value: &Value) -> f64 {
        value.as_f64().expect("numeric field")
    }

    #[test]
    fn expense_batch_accepts_bare_and_wrapped_lists() {
        let bare: ExpenseBatch = serde_json::from_value(expenses()).expect("bare list");
        let wrapped: ExpenseBatch =
            serde_json::from_value(json!({ "expenses": expenses() })).expect("wrapped list");
        assert_eq!(bare.into_expenses(), wrapped.into_expenses());
    }

    #[test]
    fn filter_payload_accepts_a_as_q_alias() {
        let mut body = periods();
        let q = body
            .as_object_mut()
            .and_then(|map| map.remove("q"))
            .expect("q present");
        body["a"] = q;
        body["transactions"] = expenses();

        let payload: FilterPayload = serde_json::from_value(body).expect("payload should parse");
        assert_eq!(payload.periods.q.len(), 1);
        let outcome = filter_transactions(payload).expect("periods are in range");
        let sums: Vec<_> = outcome.savings_by_date.iter().map(|s| s.amount).collect();
        assert_eq!(sums, vec![dec!(75), dec!(145)]);
    }

    #[test]
    fn project_returns_json_rejects_bad_age() {
        let mut body = returns_body();
        body["age"] = json!(130);
        let err = project_returns_json(&body.to_string(), Vehicle::Nps)
            .expect_err("age above range must fail");
        assert!(matches!(err, ApiError::Domain(CoreError::AgeOutOfRange(130))));
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn project_returns_totals_every_transaction() {
        let response = project_returns_json(&returns_body().to_string(), Vehicle::Index)
            .expect("projection should succeed");
        assert_eq!(response.transactions_total_amount, dec!(1725));
        assert_eq!(response.total_ceiling, dec!(1900));
        assert_eq!(response.savings_by_dates.len(), 2);
    }

    #[test]
    fn project_returns_keeps_same_day_and_repeated_transactions() {
        let body = json!({
            "age": 29,
            "wage": 50000,
            "inflation": 5.5,
            "k": [{"start": "2023-01-01", "end": "2023-12-31"}],
            "transactions": [
                {"date": "2023-10-12 09:00:00", "amount": 250},
                {"date": "2023-10-12 18:30:00", "amount": 480},
                {"date": "2023-10-12 18:30:00", "amount": 480}
            ]
        });
        let response = project_returns_json(&body.to_string(), Vehicle::Index)
            .expect("projection should succeed");
        assert_eq!(response.transactions_total_amount, dec!(1210));
        assert_eq!(response.total_ceiling, dec!(1300));
        assert_eq!(response.savings_by_dates[0].amount, dec!(90));
    }

    #[test]
    fn parse_rejects_amounts_outside_accepted_range() {
        for amount in [dec!(-1), VALUE_LIMIT] {
            let batch = ExpenseBatch::List(vec![Expense {
                date: NaiveDate::from_ymd_opt(2023, 10, 12).expect("valid date"),
                amount,
            }]);
            let err = parse_expenses(batch).expect_err("amount must be rejected");
            assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        }
    }

    #[tokio::test]
    async fn parse_returns_bare_transaction_list() {
        let (status, json) = post("transactions:parse", json!({ "expenses": expenses() })).await;
        assert_eq!(status, StatusCode::OK);
        let transactions = json.as_array().expect("bare array");
        assert_eq!(transactions.len(), 4);
        let remanent: f64 = transactions.iter().map(|t| number(&t["remanent"])).sum();
        assert_eq!(remanent, 175.0);
        assert_eq!(transactions[0]["date"], "2023-10-12");
    }

    #[tokio::test]
    async fn validator_accepts_parsed_transactions() {
        let (_, parsed) = post("transactions:parse", expenses()).await;
        let (status, json) = post(
            "transactions:validator",
            json!({ "wage": 50000, "transactions": parsed }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["valid"].as_array().map(Vec::len), Some(4));
        assert_eq!(json["invalid"].as_array().map(Vec::len), Some(0));
    }

    #[tokio::test]
    async fn validator_reports_duplicates_with_full_transaction() {
        let (status, json) = post(
            "transactions:validator",
            json!({
                "wage": 50000,
                "maxInvest": 100,
                "transactions": [
                    {"date": "2023-10-12", "amount": 250},
                    {"date": "2023-10-12", "amount": 480}
                ]
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let invalid = &json["invalid"][0];
        assert_eq!(number(&invalid["amount"]), 480.0);
        assert_eq!(number(&invalid["ceiling"]), 500.0);
        assert!(
            invalid["message"]
                .as_str()
                .is_some_and(|m| m.contains("duplicate"))
        );
    }

    #[tokio::test]
    async fn filter_applies_period_rules() {
        let mut body = periods();
        body["transactions"] = expenses();
        let (status, json) = post("transactions:filter", body).await;
        assert_eq!(status, StatusCode::OK);
        let sums: Vec<_> = json["savingsByDates"]
            .as_array()
            .expect("savings list")
            .iter()
            .map(|s| number(&s["amount"]))
            .collect();
        assert_eq!(sums, vec![75.0, 145.0]);
        assert_eq!(json["valid"][1]["inKPeriod"], true);
    }

    #[tokio::test]
    async fn filter_invalid_entries_omit_rounding_fields() {
        let (_, json) = post(
            "transactions:filter",
            json!({ "transactions": [{"date": "2023-10-12", "amount": -5}] }),
        )
        .await;
        let invalid = &json["invalid"][0];
        assert_eq!(invalid["message"], "negative amounts are not allowed");
        assert!(invalid.get("ceiling").is_none());
        assert!(invalid.get("remanent").is_none());
    }

    #[tokio::test]
    async fn returns_nps_reports_profits_and_tax_benefit() {
        let (status, json) = post("returns:nps", returns_body()).await;
        assert_eq!(status, StatusCode::OK);
        let window = &json["savingsByDates"][1];
        assert_eq!(number(&window["amount"]), 145.0);
        assert!((number(&window["profits"]) - 86.88).abs() < 2.0);
        assert_eq!(number(&window["taxBenefit"]), 145.0);
        assert_eq!(number(&window["taxSaving"]), 0.0);
        assert!(window.get("return").is_none());
    }

    #[tokio::test]
    async fn returns_index_reports_real_return() {
        let mut body = returns_body();
        body["inflation"] = json!(5.5);
        let (status, json) = post("returns:index", body).await;
        assert_eq!(status, StatusCode::OK);
        let window = &json["savingsByDates"][1];
        assert!((number(&window["return"]) - 1829.5).abs() < 30.0);
        assert!(window.get("taxBenefit").is_none());
    }

    #[tokio::test]
    async fn malformed_body_is_a_bad_request() {
        let (status, json) = post("returns:nps", json!({ "age": 29 })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(
            json["error"]
                .as_str()
                .is_some_and(|e| e.starts_with("Invalid JSON payload"))
        );
    }

    #[tokio::test]
    async fn zero_wage_is_unprocessable() {
        let mut body = returns_body();
        body["wage"] = json!(0);
        let (status, _) = post("returns:index", body).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn negative_override_is_a_bad_request() {
        let mut body = returns_body();
        body["q"][0]["fixed"] = json!(-5000);
        let (status, json) = post("returns:nps", body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(
            json["error"]
                .as_str()
                .is_some_and(|e| e.starts_with("q fixed -5000"))
        );
    }

    #[tokio::test]
    async fn oversized_extra_is_a_bad_request() {
        let mut body = periods();
        body["p"][0]["extra"] = json!(500000);
        body["transactions"] = expenses();
        let (status, _) = post("transactions:filter", body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn returns_index_counts_same_day_purchases() {
        let body = json!({
            "age": 29,
            "wage": 50000,
            "inflation": 5.5,
            "k": [{"start": "2023-01-01 00:00:00", "end": "2023-12-31 23:59:00"}],
            "transactions": [
                {"date": "2023-10-12 09:00:00", "amount": 250},
                {"date": "2023-10-12 20:15:00", "amount": 480}
            ]
        });
        let (status, json) = post("returns:index", body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(number(&json["transactionsTotalAmount"]), 730.0);
        assert_eq!(number(&json["savingsByDates"][0]["amount"]), 70.0);
    }

    #[tokio::test]
    async fn unknown_operation_is_not_found() {
        let (status, json) = post("transactions:explode", json!({})).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"], "Not found");
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let response = router()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .expect("request should build"),
            )
            .await
            .expect("router is infallible");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CACHE_CONTROL),
            Some(&HeaderValue::from_static("no-store"))
        );
    }
}
