use rust_decimal::Decimal;

use crate::decimal::{round_half_up, Money, Rate};

/// fractional digits carried through the compounding before the final rounding
const INTERMEDIATE_SCALE: u32 = 16;

/// fixed payment that retires `principal` over `periods` at `periodic_rate`
///
/// `P * r * (1 + r)^n / ((1 + r)^n - 1)` rounded half-up to cents. A zero rate
/// splits the principal evenly; `periods <= 0` yields zero. Terms long enough
/// for `(1 + r)^n` to leave the representable range pay `P * r`, the limit
/// of the formula.
pub fn monthly_payment(principal: Money, periodic_rate: Rate, periods: i64) -> Money {
    if periods <= 0 {
        return Money::ZERO;
    }

    let n = Decimal::from(periods);
    let r = periodic_rate.as_decimal();
    let p = principal.as_decimal();

    if r.is_zero() {
        return Money::from_decimal(p / n).round_half_up(2);
    }

    // P * r / (1 - (1 + r)^-n) keeps every intermediate within range
    let payment = compound_factor(r, periods.unsigned_abs())
        .and_then(|compound| Decimal::ONE.checked_div(compound))
        .and_then(|discount| (p * r).checked_div(Decimal::ONE - discount))
        .unwrap_or(p * r);

    Money::from_decimal(payment).round_half_up(2)
}

/// `(1 + r)^n` by square-and-multiply; `None` once it overflows
fn compound_factor(r: Decimal, periods: u64) -> Option<Decimal> {
    let mut base = Decimal::ONE + r;
    let mut compound = Decimal::ONE;
    let mut remaining = periods;

    while remaining > 0 {
        if remaining & 1 == 1 {
            compound = round_half_up(compound.checked_mul(base)?, INTERMEDIATE_SCALE);
        }
        remaining >>= 1;
        if remaining > 0 {
            base = round_half_up(base.checked_mul(base)?, INTERMEDIATE_SCALE);
        }
    }

    Some(compound)
}

/// one row of an equal-installment schedule
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledPayment {
    pub payment_number: u32,
    pub beginning_balance: Money,
    pub payment_amount: Money,
    pub interest_portion: Money,
    pub principal_portion: Money,
    pub ending_balance: Money,
}

/// equal-installment amortization schedule
#[derive(Debug, Clone)]
pub struct AmortizationSchedule {
    pub principal: Money,
    pub periodic_rate: Rate,
    pub installment: Money,
    pub payments: Vec<ScheduledPayment>,
    pub total_interest: Money,
    pub total_payment: Money,
}

impl AmortizationSchedule {
    /// generate the schedule; the last row absorbs the rounding residue
    pub fn generate(principal: Money, periodic_rate: Rate, periods: u32) -> Self {
        let installment = monthly_payment(principal, periodic_rate, i64::from(periods));
        let r = periodic_rate.as_decimal();

        let mut payments = Vec::with_capacity(periods as usize);
        let mut balance = principal;

        for i in 1..=periods {
            let interest_portion = Money::from_decimal(balance.as_decimal() * r).round_half_up(2);
            let is_last = i == periods;

            let (payment_amount, principal_portion) = if is_last {
                (balance + interest_portion, balance)
            } else {
                (installment, installment - interest_portion)
            };

            let ending_balance = balance - principal_portion;

            payments.push(ScheduledPayment {
                payment_number: i,
                beginning_balance: balance,
                payment_amount,
                interest_portion,
                principal_portion,
                ending_balance,
            });

            balance = ending_balance;
        }

        let total_interest = payments.iter().map(|p| p.interest_portion).sum();
        let total_payment = payments.iter().map(|p| p.payment_amount).sum();

        Self {
            principal,
            periodic_rate,
            installment,
            payments,
            total_interest,
            total_payment,
        }
    }

    /// get payment for specific period (1-based)
    pub fn get_payment(&self, payment_number: u32) -> Option<&ScheduledPayment> {
        payment_number
            .checked_sub(1)
            .and_then(|index| self.payments.get(index as usize))
    }
}
