use std::collections::{BTreeMap, BTreeSet};
use std::iter;

use crate::error::EngineError;
use crate::schemas::{Expense, UserId};
use crate::settlement::Tolerance;

/// Net balance per member. Positive means the member is owed money,
/// negative means the member owes money.
pub type Balances = BTreeMap<UserId, f64>;

/// Folds `expenses` into one balance per member of `members`.
///
/// The payer of each expense is credited with the full amount and every
/// beneficiary is debited an even share of it. Shares are not rounded, so
/// the balances keep summing to zero up to floating point noise.
pub fn compute_balances(expenses: &[Expense], members: &[UserId]) -> Result<Balances, EngineError> {
    let initial: Balances = members.iter().map(|member| (member.clone(), 0.0)).collect();

    expenses.iter().try_fold(initial, |mut balances, expense| {
        apply_expense(&mut balances, expense)?;
        Ok(balances)
    })
}

fn apply_expense(balances: &mut Balances, expense: &Expense) -> Result<(), EngineError> {
    if !expense.amount.is_finite() || expense.amount <= 0.0 {
        return Err(EngineError::NonPositiveAmount {
            expense: expense.id.clone(),
            amount: expense.amount,
        });
    }

    // Beneficiaries form a set: naming someone twice does not double their share.
    let beneficiaries: BTreeSet<&UserId> = expense.beneficiary_ids.iter().collect();
    if beneficiaries.is_empty() {
        return Err(EngineError::NoBeneficiaries {
            expense: expense.id.clone(),
        });
    }

    if let Some(unknown) = iter::once(&expense.payer_id)
        .chain(beneficiaries.iter().copied())
        .find(|member| !balances.contains_key(*member))
    {
        return Err(EngineError::UnknownMember {
            expense: expense.id.clone(),
            member: unknown.clone(),
        });
    }

    if let Some(balance) = balances.get_mut(&expense.payer_id) {
        *balance += expense.amount;
    }
    let amount_per_beneficiary = expense.amount / beneficiaries.len() as f64;
    for beneficiary in beneficiaries {
        if let Some(balance) = balances.get_mut(beneficiary) {
            *balance -= amount_per_beneficiary;
        }
    }
    Ok(())
}

/// Returns the sum of `balances` when it strays further than the tolerance
/// from zero, which means the expenses fed to the calculation were
/// inconsistent.
pub fn imbalance(balances: &Balances, tolerance: &Tolerance) -> Option<f64> {
    let total: f64 = balances.values().sum();
    (total.abs() > tolerance.epsilon).then_some(total)
}
