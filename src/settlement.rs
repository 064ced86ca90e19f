use serde::{Deserialize, Serialize};

use crate::balance::{compute_balances, imbalance, Balances};
use crate::error::EngineError;
use crate::schemas::{Expense, UserId};

/// Comment attached to every settlement the planner produces.
pub const AUTOMATIC_COMMENT: &str = "automatic settlement";
pub const DEFAULT_EPSILON: f64 = 0.01;
pub const DEFAULT_PRECISION: u32 = 2;

/// How close to zero an amount must be to count as settled, and how many
/// decimals emitted transfers are rounded to.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
pub struct Tolerance {
    pub epsilon: f64,
    pub precision: u32,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self {
            epsilon: DEFAULT_EPSILON,
            precision: DEFAULT_PRECISION,
        }
    }
}

impl Tolerance {
    pub fn new(epsilon: f64, precision: u32) -> Self {
        Self { epsilon, precision }
    }

    pub fn is_settled(&self, amount: f64) -> bool {
        amount.abs() <= self.epsilon
    }

    pub fn round(&self, amount: f64) -> f64 {
        let factor = 10f64.powi(self.precision as i32);
        (amount * factor).round() / factor
    }
}

#[derive(Clone, Debug)]
struct PersonalBalance {
    id: UserId,
    balance: f64,
}

/// A transfer the debtor should make to the creditor. It has no id until
/// it gets stored.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PlannedSettlement {
    pub debtor: UserId,
    pub creditor: UserId,
    pub amount: f64,
    pub comment: String,
}

/// Matches the largest creditor with the largest debtor until one side runs out.
///
/// Creditors are walked by decreasing balance and debtors by increasing
/// (most negative first) balance, ties broken by member id, so the same
/// balances always give the same plan. At most `creditors + debtors - 1`
/// settlements are emitted.
///
/// `balances` is expected to sum to zero. When it doesn't, the loop still
/// ends once either side is exhausted, but whatever is left over on the
/// other side is not settled by the plan; the leftover is logged as a
/// warning and is otherwise unspecified.
pub fn plan(balances: &Balances, tolerance: &Tolerance) -> Vec<PlannedSettlement> {
    let (mut creditors, mut debtors) = partition(balances, tolerance);

    let mut settlements = Vec::new();
    let (mut c, mut d) = (0, 0);

    while c < creditors.len() && d < debtors.len() {
        let creditor = &mut creditors[c];
        let debtor = &mut debtors[d];

        let transfer = creditor.balance.min(-debtor.balance);
        if transfer > tolerance.epsilon {
            settlements.push(PlannedSettlement {
                debtor: debtor.id.clone(),
                creditor: creditor.id.clone(),
                amount: tolerance.round(transfer),
                comment: AUTOMATIC_COMMENT.to_string(),
            });
            creditor.balance -= transfer;
            debtor.balance += transfer;
        }

        // `transfer` is the smaller of both sides, so at least one cursor moves.
        if tolerance.is_settled(creditor.balance) {
            c += 1;
        }
        if tolerance.is_settled(debtor.balance) {
            d += 1;
        }
    }

    let leftover: f64 = creditors[c..]
        .iter()
        .chain(debtors[d..].iter())
        .map(|person| person.balance)
        .filter(|balance| !tolerance.is_settled(*balance))
        .sum();
    if leftover != 0.0 {
        tracing::warn!(leftover, "balances did not sum to zero, plan leaves a residue");
    }

    settlements
}

fn partition(
    balances: &Balances,
    tolerance: &Tolerance,
) -> (Vec<PersonalBalance>, Vec<PersonalBalance>) {
    let mut creditors = Vec::new();
    let mut debtors = Vec::new();

    for (id, &balance) in balances {
        if tolerance.is_settled(balance) {
            continue;
        }
        let person = PersonalBalance {
            id: id.clone(),
            balance,
        };
        if balance > 0.0 {
            creditors.push(person);
        } else {
            debtors.push(person);
        }
    }

    creditors.sort_by(|a, b| b.balance.total_cmp(&a.balance).then_with(|| a.id.cmp(&b.id)));
    debtors.sort_by(|a, b| a.balance.total_cmp(&b.balance).then_with(|| a.id.cmp(&b.id)));
    (creditors, debtors)
}

/// Outcome of one full run: balances, the plan, and the imbalance
/// diagnostic if the balances did not sum to zero.
#[derive(Clone, Debug, PartialEq)]
pub struct PlanReport {
    pub balances: Balances,
    pub settlements: Vec<PlannedSettlement>,
    pub residual: Option<f64>,
}

pub fn settle(
    expenses: &[Expense],
    members: &[UserId],
    tolerance: &Tolerance,
) -> Result<PlanReport, EngineError> {
    let balances = compute_balances(expenses, members)?;
    let residual = imbalance(&balances, tolerance);
    let settlements = plan(&balances, tolerance);
    Ok(PlanReport {
        balances,
        settlements,
        residual,
    })
}

/// Balances left once every settlement has been paid: the debtor's side
/// goes up by the amount, the creditor's side goes down.
pub fn apply(balances: &Balances, settlements: &[PlannedSettlement]) -> Balances {
    let mut remaining = balances.clone();
    for settlement in settlements {
        *remaining.entry(settlement.debtor.clone()).or_insert(0.0) += settlement.amount;
        *remaining.entry(settlement.creditor.clone()).or_insert(0.0) -= settlement.amount;
    }
    remaining
}
