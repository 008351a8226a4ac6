use chrono::NaiveDate;
use rust_decimal::Decimal;

use super::types::{Expense, ROUNDING_UNIT, Transaction, TransactionInput};

/// Smallest multiple of the rounding unit that is not below `amount`.
pub fn ceiling_of(amount: Decimal) -> Decimal {
    let ceiling = (amount / ROUNDING_UNIT).ceil() * ROUNDING_UNIT;
    // ceil() of a small negative quotient yields -0
    if ceiling.is_zero() {
        Decimal::ZERO
    } else {
        ceiling
    }
}

pub fn build(expense: &Expense) -> Transaction {
    round_up(expense.date, expense.amount)
}

pub fn build_all(expenses: &[Expense]) -> Vec<Transaction> {
    expenses.iter().map(build).collect()
}

fn round_up(date: NaiveDate, amount: Decimal) -> Transaction {
    let ceiling = ceiling_of(amount);
    Transaction {
        date,
        amount,
        ceiling,
        remanent: ceiling - amount,
    }
}

impl TransactionInput {
    /// Completes a caller-supplied transaction. Values present on input are
    /// kept verbatim, even when they contradict the amount.
    pub fn resolve(self) -> Transaction {
        match (self.ceiling, self.remanent) {
            (Some(ceiling), Some(remanent)) => Transaction {
                date: self.date,
                amount: self.amount,
                ceiling,
                remanent,
            },
            _ => round_up(self.date, self.amount),
        }
    }
}
