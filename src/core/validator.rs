use std::collections::HashSet;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::debug;

use super::types::{Partition, ROUNDING_UNIT, RejectedTransaction, Rejection, Transaction};

/// Account constraints for a single validation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationRules {
    /// Monthly income; no single expense may exceed it.
    pub wage: Decimal,
    /// Upper bound on the savings swept from one transaction.
    pub max_invest: Option<Decimal>,
}

impl ValidationRules {
    pub fn new(wage: Decimal) -> Self {
        Self {
            wage,
            max_invest: None,
        }
    }

    pub fn with_max_invest(mut self, max_invest: Decimal) -> Self {
        self.max_invest = Some(max_invest);
        self
    }
}

pub fn validate(
    transactions: &[Transaction],
    rules: &ValidationRules,
) -> Partition<Transaction, RejectedTransaction> {
    let mut accepted_dates = HashSet::new();
    let mut partition = Partition::default();

    for transaction in transactions {
        match check(transaction, rules, &accepted_dates) {
            Ok(()) => {
                accepted_dates.insert(transaction.date);
                partition.valid.push(*transaction);
            }
            Err(reason) => partition
                .invalid
                .push(RejectedTransaction::new(*transaction, &reason)),
        }
    }

    debug!(
        valid = partition.valid.len(),
        invalid = partition.invalid.len(),
        "validated transactions"
    );
    partition
}

fn check(
    transaction: &Transaction,
    rules: &ValidationRules,
    accepted_dates: &HashSet<NaiveDate>,
) -> Result<(), Rejection> {
    if accepted_dates.contains(&transaction.date) {
        return Err(Rejection::DuplicateDate(transaction.date));
    }

    let remanent = transaction.remanent;
    if remanent < Decimal::ZERO
        || remanent >= ROUNDING_UNIT
        || transaction.ceiling != transaction.amount + remanent
    {
        return Err(Rejection::InconsistentRemanent {
            amount: transaction.amount,
            ceiling: transaction.ceiling,
            remanent,
        });
    }

    if transaction.amount <= Decimal::ZERO {
        return Err(Rejection::NonPositiveAmount);
    }

    if transaction.amount > rules.wage {
        return Err(Rejection::ExceedsWage {
            amount: transaction.amount,
            wage: rules.wage,
        });
    }

    if let Some(max_invest) = rules.max_invest.filter(|cap| remanent > *cap) {
        return Err(Rejection::ExceedsMaxInvest {
            remanent,
            max_invest,
        });
    }

    Ok(())
}
