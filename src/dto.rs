//! Request and response bodies of the HTTP API.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::balance::Balances;
use crate::schemas::{Expense, ExpenseStatus, Group, GroupId, Settlement, User, UserId};

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct UserRequest {
    pub name: String,
    pub email: String,
    /// Required on creation. On update, `None` keeps the current password.
    pub password: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ActiveRequest {
    pub active: bool,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct GroupRequest {
    pub name: String,
    /// Initial members on creation. On update, `None` keeps the members.
    pub user_ids: Option<Vec<UserId>>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ExpenseRequest {
    #[serde(default)]
    pub description: String,
    pub amount: f64,
    pub payer_id: UserId,
    pub beneficiary_ids: Vec<UserId>,
    pub group_id: GroupId,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct StatusRequest {
    pub status: ExpenseStatus,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SettlementRequest {
    pub amount: f64,
    pub debtor_id: UserId,
    pub creditor_id: UserId,
    pub group_id: GroupId,
    pub comment: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct UserResponse {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub active: bool,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            active: user.active,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct GroupResponse {
    pub id: GroupId,
    pub name: String,
    pub users: Vec<UserId>,
}

impl From<Group> for GroupResponse {
    fn from(group: Group) -> Self {
        Self {
            id: group.id,
            name: group.name,
            users: group.members,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ExpenseResponse {
    pub id: String,
    pub description: String,
    pub amount: f64,
    pub status: ExpenseStatus,
    pub payer_id: UserId,
    pub beneficiary_ids: Vec<UserId>,
    pub group_id: GroupId,
    pub created_at: DateTime<Utc>,
}

impl From<Expense> for ExpenseResponse {
    fn from(expense: Expense) -> Self {
        Self {
            id: expense.id,
            description: expense.description,
            amount: expense.amount,
            status: expense.status,
            payer_id: expense.payer_id,
            beneficiary_ids: expense.beneficiary_ids,
            group_id: expense.group_id,
            created_at: expense.created_at,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct SettlementResponse {
    pub id: String,
    pub amount: f64,
    pub debtor_id: UserId,
    pub creditor_id: UserId,
    pub group_id: GroupId,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

impl From<Settlement> for SettlementResponse {
    fn from(settlement: Settlement) -> Self {
        Self {
            id: settlement.id,
            amount: settlement.amount,
            debtor_id: settlement.debtor_id,
            creditor_id: settlement.creditor_id,
            group_id: settlement.group_id,
            comment: settlement.comment,
            created_at: settlement.created_at,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct UserBalanceResponse {
    pub user_id: UserId,
    pub balance: f64,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct GroupBalancesResponse {
    pub group_id: GroupId,
    pub balances: Balances,
}

pub fn into_responses<T, R: From<T>>(items: Vec<T>) -> Vec<R> {
    items.into_iter().map(R::from).collect()
}
