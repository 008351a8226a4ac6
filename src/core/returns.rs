use rust_decimal::{Decimal, MathematicalOps, RoundingStrategy};
use rust_decimal_macros::dec;

use super::error::{CoreError, Result};
use super::types::{ReturnResult, SavingsByDate, Vehicle};

pub const RETIREMENT_AGE: u32 = 60;
pub const MAX_AGE: u32 = 120;
/// Horizon used once the saver is already past retirement age.
const POST_RETIREMENT_YEARS: u32 = 5;

pub const NPS_DEDUCTION_CAP: Decimal = dec!(200000);
const NPS_INCOME_SHARE: Decimal = dec!(0.10);

/// Simplified income tax slabs as (upper bound, marginal rate).
const TAX_SLABS: [(Decimal, Decimal); 5] = [
    (dec!(700000), dec!(0)),
    (dec!(1000000), dec!(0.10)),
    (dec!(1200000), dec!(0.15)),
    (dec!(1500000), dec!(0.20)),
    (Decimal::MAX, dec!(0.30)),
];

/// Validated projection inputs. Inflation is stored as a fraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReturnParams {
    age: u32,
    wage: Decimal,
    inflation: Decimal,
}

impl ReturnParams {
    /// `inflation` may be a percentage (`5.5`) or a fraction (`0.055`).
    pub fn new(age: u32, wage: Decimal, inflation: Decimal) -> Result<Self> {
        if age >= MAX_AGE {
            return Err(CoreError::AgeOutOfRange(age));
        }
        if wage <= Decimal::ZERO {
            return Err(CoreError::NonPositiveWage(wage));
        }
        if inflation < Decimal::ZERO || inflation > dec!(100) {
            return Err(CoreError::InflationOutOfRange(inflation));
        }
        Ok(Self {
            age,
            wage,
            inflation: normalize_inflation(inflation),
        })
    }

    pub fn inflation(&self) -> Decimal {
        self.inflation
    }

    pub fn years_to_retirement(&self) -> u32 {
        years_to_retirement(self.age)
    }

    pub fn annual_income(&self) -> Decimal {
        self.wage * dec!(12)
    }
}

pub fn normalize_inflation(raw: Decimal) -> Decimal {
    if raw > Decimal::ONE {
        raw / dec!(100)
    } else {
        raw
    }
}

pub fn years_to_retirement(age: u32) -> u32 {
    if age >= RETIREMENT_AGE {
        POST_RETIREMENT_YEARS
    } else {
        RETIREMENT_AGE - age
    }
}

/// `principal * (1 + rate)^years`
pub fn compound(principal: Decimal, rate: Decimal, years: u32) -> Result<Decimal> {
    (Decimal::ONE + rate)
        .checked_powu(u64::from(years))
        .and_then(|growth| principal.checked_mul(growth))
        .ok_or(CoreError::Overflow("compound growth"))
}

/// `amount / (1 + inflation)^years`
pub fn inflation_adjust(amount: Decimal, inflation: Decimal, years: u32) -> Result<Decimal> {
    (Decimal::ONE + inflation)
        .checked_powu(u64::from(years))
        .and_then(|deflator| amount.checked_div(deflator))
        .ok_or(CoreError::Overflow("inflation adjustment"))
}

pub fn nps_deduction(invested: Decimal, annual_income: Decimal) -> Decimal {
    invested
        .min(NPS_INCOME_SHARE * annual_income)
        .min(NPS_DEDUCTION_CAP)
}

pub fn income_tax(income: Decimal) -> Decimal {
    let mut tax = Decimal::ZERO;
    let mut lower = Decimal::ZERO;
    for (upper, rate) in TAX_SLABS {
        if income <= lower {
            break;
        }
        tax += (income.min(upper) - lower) * rate;
        lower = upper;
    }
    tax
}

/// Tax actually saved by claiming `deduction` against `annual_income`.
pub fn tax_saving(annual_income: Decimal, deduction: Decimal) -> Decimal {
    income_tax(annual_income) - income_tax(annual_income - deduction)
}

pub fn project(
    savings: &[SavingsByDate],
    params: &ReturnParams,
    vehicle: Vehicle,
) -> Result<Vec<ReturnResult>> {
    let years = params.years_to_retirement();
    savings
        .iter()
        .map(|window| {
            let principal = window.amount;
            let future = compound(principal, vehicle.annual_rate(), years)?;
            let real = inflation_adjust(future, params.inflation(), years)?;

            let mut result = ReturnResult {
                start: window.start,
                end: window.end,
                amount: principal,
                profits: None,
                tax_benefit: None,
                tax_saving: None,
                real_return: None,
            };
            match vehicle {
                Vehicle::Nps => {
                    let deduction = nps_deduction(principal, params.annual_income());
                    result.profits = Some(round_currency(real - principal));
                    result.tax_benefit = Some(deduction);
                    result.tax_saving =
                        Some(round_currency(tax_saving(params.annual_income(), deduction)));
                }
                Vehicle::Index => result.real_return = Some(round_currency(real)),
            }
            Ok(result)
        })
        .collect()
}

pub fn project_nps(savings: &[SavingsByDate], params: &ReturnParams) -> Result<Vec<ReturnResult>> {
    project(savings, params, Vehicle::Nps)
}

pub fn project_index(
    savings: &[SavingsByDate],
    params: &ReturnParams,
) -> Result<Vec<ReturnResult>> {
    project(savings, params, Vehicle::Index)
}

fn round_currency(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}
