mod builder;
mod error;
mod returns;
mod rules;
mod types;
mod validator;

pub use builder::{build, build_all, ceiling_of};
pub use error::CoreError;
pub use returns::{
    MAX_AGE, NPS_DEDUCTION_CAP, RETIREMENT_AGE, ReturnParams, compound, income_tax,
    inflation_adjust, normalize_inflation, nps_deduction, project, project_index, project_nps,
    tax_saving, years_to_retirement,
};
pub use rules::{
    AdjustedTransaction, FilterOutcome, adjust, admit, aggregate, apply, apply_extras,
    apply_overrides, extra_for, resolve_override,
};
pub use types::{
    Expense, KPeriod, PPeriod, Partition, PeriodSet, QPeriod, ROUNDING_UNIT, RejectedEntry,
    RejectedTransaction, Rejection, ReturnResult, SavingsByDate, Transaction, TransactionInput,
    Vehicle, calendar_date,
};
pub use validator::{ValidationRules, validate};
