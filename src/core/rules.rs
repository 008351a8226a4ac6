//! Temporal rule engine: q overrides, p extras and k aggregation windows,
//! applied strictly in that order.

use std::collections::HashSet;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;

use super::types::{
    KPeriod, PPeriod, Partition, PeriodSet, QPeriod, RejectedEntry, Rejection, SavingsByDate,
    Transaction, TransactionInput,
};

/// Transaction after q/p adjustment, tagged with the k windows it fed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustedTransaction {
    #[serde(flatten)]
    pub transaction: Transaction,
    pub in_k_period: bool,
    pub k_periods: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterOutcome {
    pub valid: Vec<AdjustedTransaction>,
    pub invalid: Vec<RejectedEntry>,
    #[serde(rename = "savingsByDates")]
    pub savings_by_date: Vec<SavingsByDate>,
}

pub fn apply(transactions: &[TransactionInput], periods: &PeriodSet) -> FilterOutcome {
    let admitted = admit(transactions);
    let adjusted = adjust(&admitted.valid, periods);
    let savings_by_date = aggregate(&adjusted, &periods.k);

    let valid: Vec<_> = adjusted
        .into_iter()
        .map(|transaction| {
            let k_periods = matching_windows(transaction.date, &periods.k);
            AdjustedTransaction {
                transaction,
                in_k_period: !k_periods.is_empty(),
                k_periods,
            }
        })
        .collect();

    debug!(
        valid = valid.len(),
        invalid = admitted.invalid.len(),
        q = periods.q.len(),
        p = periods.p.len(),
        k = periods.k.len(),
        "applied period rules"
    );

    FilterOutcome {
        valid,
        invalid: admitted.invalid,
        savings_by_date,
    }
}

/// Drops negative amounts and repeated (date, amount) pairs, completing
/// ceiling/remanent on whatever is admitted. Distinct amounts on the same day
/// are separate purchases and are all admitted.
pub fn admit(transactions: &[TransactionInput]) -> Partition<Transaction, RejectedEntry> {
    let mut seen = HashSet::new();
    let mut partition = Partition::default();

    for input in transactions {
        let rejection = if input.amount < Decimal::ZERO {
            Some(Rejection::NegativeAmount)
        } else if !seen.insert((input.date, input.amount)) {
            Some(Rejection::DuplicateEntry {
                date: input.date,
                amount: input.amount,
            })
        } else {
            None
        };

        match rejection {
            Some(reason) => partition.invalid.push(RejectedEntry {
                date: input.date,
                amount: input.amount,
                message: reason.to_string(),
            }),
            None => partition.valid.push(input.resolve()),
        }
    }
    partition
}

/// Fixed value of the q period governing `date`: latest start wins, and on
/// equal starts the period declared first.
pub fn resolve_override(date: NaiveDate, q: &[QPeriod]) -> Option<Decimal> {
    q.iter()
        .filter(|period| period.contains(date))
        .fold(None, |best: Option<&QPeriod>, period| match best {
            Some(current) if current.start >= period.start => Some(current),
            _ => Some(period),
        })
        .map(|period| period.fixed)
}

pub fn extra_for(date: NaiveDate, p: &[PPeriod]) -> Decimal {
    p.iter()
        .filter(|period| period.contains(date))
        .map(|period| period.extra)
        .sum()
}

/// q overrides followed by p extras.
pub fn adjust(transactions: &[Transaction], periods: &PeriodSet) -> Vec<Transaction> {
    apply_extras(&apply_overrides(transactions, &periods.q), &periods.p)
}

pub fn apply_overrides(transactions: &[Transaction], q: &[QPeriod]) -> Vec<Transaction> {
    transactions
        .iter()
        .map(|transaction| Transaction {
            remanent: resolve_override(transaction.date, q).unwrap_or(transaction.remanent),
            ..*transaction
        })
        .collect()
}

pub fn apply_extras(transactions: &[Transaction], p: &[PPeriod]) -> Vec<Transaction> {
    transactions
        .iter()
        .map(|transaction| Transaction {
            remanent: transaction.remanent + extra_for(transaction.date, p),
            ..*transaction
        })
        .collect()
}

/// One entry per k period, in declaration order. Overlapping windows each
/// count a shared transaction.
pub fn aggregate(transactions: &[Transaction], k: &[KPeriod]) -> Vec<SavingsByDate> {
    k.iter()
        .map(|window| SavingsByDate {
            start: window.start,
            end: window.end,
            amount: transactions
                .iter()
                .filter(|transaction| window.contains(transaction.date))
                .map(|transaction| transaction.remanent)
                .sum(),
        })
        .collect()
}

fn matching_windows(date: NaiveDate, k: &[KPeriod]) -> Vec<usize> {
    k.iter()
        .enumerate()
        .filter(|(_, window)| window.contains(date))
        .map(|(index, _)| index)
        .collect()
}
