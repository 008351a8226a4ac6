use rust_decimal::Decimal;
use thiserror::Error;

/// Precondition failures of the returns projection. Business-rule violations
/// on individual transactions are never errors; they end up in `invalid`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("age {0} is outside the supported range 0..120")]
    AgeOutOfRange(u32),

    #[error("wage must be positive, got {0}")]
    NonPositiveWage(Decimal),

    #[error("inflation {0} must be a fraction or a percentage between 0 and 100")]
    InflationOutOfRange(Decimal),

    #[error("arithmetic overflow while computing {0}")]
    Overflow(&'static str),
}

pub type Result<T> = std::result::Result<T, CoreError>;
