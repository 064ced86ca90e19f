//! Use cases behind the HTTP API.
//!
//! The service checks everything the engine takes for granted (membership,
//! positive amounts, non-empty beneficiaries) before expenses are stored,
//! and owns the recomputation of a group's settlements.
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use tracing::{info, warn};

use crate::auth::PasswordHasher;
use crate::balance::{compute_balances, Balances};
use crate::dto::{ExpenseRequest, GroupRequest, SettlementRequest, UserRequest};
use crate::error::ServiceError;
use crate::schemas::{new_id, Expense, ExpenseStatus, Group, Settlement, User, UserId};
use crate::settlement::{settle, Tolerance};
use crate::store::Store;

pub const MANUAL_COMMENT: &str = "manual settlement";
const MIN_PASSWORD_LEN: usize = 6;

/// One async mutex per group. Every operation that reads group state and
/// then writes the group, its expenses or its settlements holds it, so a
/// membership check never races the write it guards.
#[derive(Default)]
struct GroupLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl GroupLocks {
    fn for_group(&self, group_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(group_id.to_string()).or_default().clone()
    }
}

#[derive(Clone)]
pub struct Service {
    store: Arc<dyn Store>,
    hasher: PasswordHasher,
    tolerance: Tolerance,
    locks: Arc<GroupLocks>,
}

fn validate_name(name: &str, what: &str) -> Result<String, ServiceError> {
    let name = name.trim();
    let len = name.chars().count();
    if !(2..=50).contains(&len) {
        return Err(ServiceError::Validation(format!(
            "{what} name must be between 2 and 50 characters"
        )));
    }
    Ok(name.to_string())
}

fn validate_email(email: &str) -> Result<String, ServiceError> {
    let email = email.trim();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    };
    if !valid {
        return Err(ServiceError::Validation(format!("`{email}` is not a valid email")));
    }
    Ok(email.to_lowercase())
}

fn validate_password(password: &str) -> Result<(), ServiceError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ServiceError::Validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

fn validate_amount(amount: f64) -> Result<(), ServiceError> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(ServiceError::Validation(String::from(
            "amount must be a positive number",
        )));
    }
    Ok(())
}

/// Keeps the first occurrence of every id.
fn dedup(ids: Vec<UserId>) -> Vec<UserId> {
    let mut seen = BTreeSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}

/// Members an expense of the group points at, whatever its status.
fn referenced_members(expenses: &[Expense]) -> BTreeSet<&str> {
    expenses
        .iter()
        .flat_map(|expense| {
            std::iter::once(expense.payer_id.as_str())
                .chain(expense.beneficiary_ids.iter().map(String::as_str))
        })
        .collect()
}

fn counted(expenses: Vec<Expense>) -> Vec<Expense> {
    expenses
        .into_iter()
        .filter(|expense| expense.status != ExpenseStatus::Cancelled)
        .collect()
}

impl Service {
    pub fn new(store: Arc<dyn Store>, hasher: PasswordHasher, tolerance: Tolerance) -> Self {
        Self {
            store,
            hasher,
            tolerance,
            locks: Arc::default(),
        }
    }

    async fn require_user(&self, id: &str) -> Result<User, ServiceError> {
        self.store
            .find_user(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("user `{id}` not found")))
    }

    async fn require_group(&self, id: &str) -> Result<Group, ServiceError> {
        self.store
            .find_group(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("group `{id}` not found")))
    }

    async fn require_expense(&self, id: &str) -> Result<Expense, ServiceError> {
        self.store
            .find_expense(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("expense `{id}` not found")))
    }

    async fn require_users(&self, ids: &[UserId]) -> Result<(), ServiceError> {
        for id in ids {
            self.require_user(id).await?;
        }
        Ok(())
    }

    // Users

    pub async fn create_user(&self, request: UserRequest) -> Result<User, ServiceError> {
        let name = validate_name(&request.name, "user")?;
        let email = validate_email(&request.email)?;
        let password = request
            .password
            .ok_or_else(|| ServiceError::Validation(String::from("password is required")))?;
        validate_password(&password)?;

        if self.store.find_user_by_email(&email).await?.is_some() {
            return Err(ServiceError::Conflict(format!(
                "a user with email `{email}` already exists"
            )));
        }

        let user = User {
            id: new_id(),
            name,
            email,
            password_hash: self.hasher.hash(&password),
            active: true,
        };
        self.store.insert_user(&user).await?;
        info!(user_id = %user.id, "user created");
        Ok(user)
    }

    pub async fn list_users(&self) -> Result<Vec<User>, ServiceError> {
        Ok(self.store.list_users().await?)
    }

    pub async fn get_user(&self, id: &str) -> Result<User, ServiceError> {
        self.require_user(id).await
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<User, ServiceError> {
        self.store
            .find_user_by_email(&email.trim().to_lowercase())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("no user with email `{email}`")))
    }

    pub async fn update_user(&self, id: &str, request: UserRequest) -> Result<User, ServiceError> {
        let mut user = self.require_user(id).await?;
        let name = validate_name(&request.name, "user")?;
        let email = validate_email(&request.email)?;

        if email != user.email {
            if let Some(other) = self.store.find_user_by_email(&email).await? {
                if other.id != user.id {
                    return Err(ServiceError::Conflict(format!(
                        "email `{email}` is used by another user"
                    )));
                }
            }
        }
        if let Some(password) = request.password {
            validate_password(&password)?;
            user.password_hash = self.hasher.hash(&password);
        }
        user.name = name;
        user.email = email;

        if !self.store.replace_user(&user).await? {
            return Err(ServiceError::NotFound(format!("user `{id}` not found")));
        }
        info!(user_id = %id, "user updated");
        Ok(user)
    }

    pub async fn delete_user(&self, id: &str) -> Result<(), ServiceError> {
        self.require_user(id).await?;
        let groups = self.store.groups_of_user(id).await?;
        if !groups.is_empty() {
            return Err(ServiceError::Conflict(format!(
                "user `{id}` still belongs to {} group(s)",
                groups.len()
            )));
        }
        self.store.delete_user(id).await?;
        info!(user_id = %id, "user deleted");
        Ok(())
    }

    pub async fn set_user_active(&self, id: &str, active: bool) -> Result<User, ServiceError> {
        let mut user = self.require_user(id).await?;
        user.active = active;
        self.store.replace_user(&user).await?;
        info!(user_id = %id, active, "user status changed");
        Ok(user)
    }

    pub async fn users_of_group(&self, group_id: &str) -> Result<Vec<User>, ServiceError> {
        let group = self.require_group(group_id).await?;
        let mut users = Vec::with_capacity(group.members.len());
        for member in &group.members {
            users.push(self.require_user(member).await?);
        }
        Ok(users)
    }

    // Groups

    pub async fn create_group(&self, request: GroupRequest) -> Result<Group, ServiceError> {
        let name = validate_name(&request.name, "group")?;
        if self.store.find_group_by_name(&name).await?.is_some() {
            return Err(ServiceError::Conflict(format!(
                "a group named `{name}` already exists"
            )));
        }
        let members = dedup(request.user_ids.unwrap_or_default());
        self.require_users(&members).await?;

        let group = Group {
            id: new_id(),
            name,
            members,
        };
        self.store.insert_group(&group).await?;
        info!(group_id = %group.id, members = group.members.len(), "group created");
        Ok(group)
    }

    pub async fn list_groups(&self) -> Result<Vec<Group>, ServiceError> {
        Ok(self.store.list_groups().await?)
    }

    pub async fn get_group(&self, id: &str) -> Result<Group, ServiceError> {
        self.require_group(id).await
    }

    pub async fn update_group(
        &self,
        id: &str,
        request: GroupRequest,
    ) -> Result<Group, ServiceError> {
        let lock = self.locks.for_group(id);
        let _guard = lock.lock().await;

        let mut group = self.require_group(id).await?;
        let name = validate_name(&request.name, "group")?;
        if let Some(other) = self.store.find_group_by_name(&name).await? {
            if other.id != group.id {
                return Err(ServiceError::Conflict(format!(
                    "another group is already named `{name}`"
                )));
            }
        }

        if let Some(user_ids) = request.user_ids {
            let members = dedup(user_ids);
            self.require_users(&members).await?;
            let expenses = self.store.expenses_of_group(id).await?;
            if let Some(dropped) = referenced_members(&expenses)
                .into_iter()
                .find(|member| !members.iter().any(|kept| kept.as_str() == *member))
            {
                return Err(ServiceError::Conflict(format!(
                    "user `{dropped}` appears in expenses of group `{id}`"
                )));
            }
            group.members = members;
        }
        group.name = name;

        self.store.replace_group(&group).await?;
        info!(group_id = %id, "group updated");
        Ok(group)
    }

    /// Deletes the group together with its expenses and settlements.
    pub async fn delete_group(&self, id: &str) -> Result<(), ServiceError> {
        let lock = self.locks.for_group(id);
        let _guard = lock.lock().await;

        self.require_group(id).await?;
        let expenses = self.store.delete_group_expenses(id).await?;
        let settlements = self.store.delete_group_settlements(id).await?;
        self.store.delete_group(id).await?;
        info!(group_id = %id, expenses, settlements, "group deleted");
        Ok(())
    }

    pub async fn add_member(&self, group_id: &str, user_id: &str) -> Result<Group, ServiceError> {
        let lock = self.locks.for_group(group_id);
        let _guard = lock.lock().await;

        let mut group = self.require_group(group_id).await?;
        self.require_user(user_id).await?;
        if group.has_member(user_id) {
            return Err(ServiceError::Conflict(format!(
                "user `{user_id}` is already a member of group `{group_id}`"
            )));
        }
        group.members.push(user_id.to_string());
        self.store.replace_group(&group).await?;
        info!(group_id, user_id, "member added");
        Ok(group)
    }

    pub async fn remove_member(
        &self,
        group_id: &str,
        user_id: &str,
    ) -> Result<Group, ServiceError> {
        let lock = self.locks.for_group(group_id);
        let _guard = lock.lock().await;

        let mut group = self.require_group(group_id).await?;
        if !group.has_member(user_id) {
            return Err(ServiceError::Conflict(format!(
                "user `{user_id}` is not a member of group `{group_id}`"
            )));
        }
        let expenses = self.store.expenses_of_group(group_id).await?;
        if referenced_members(&expenses).contains(user_id) {
            return Err(ServiceError::Conflict(format!(
                "user `{user_id}` appears in expenses of group `{group_id}`"
            )));
        }
        group.members.retain(|member| member != user_id);
        self.store.replace_group(&group).await?;
        info!(group_id, user_id, "member removed");
        Ok(group)
    }

    pub async fn groups_of_user(&self, user_id: &str) -> Result<Vec<Group>, ServiceError> {
        self.require_user(user_id).await?;
        Ok(self.store.groups_of_user(user_id).await?)
    }

    /// Live balances of the group, cancelled expenses left out.
    pub async fn group_balances(&self, group_id: &str) -> Result<Balances, ServiceError> {
        let group = self.require_group(group_id).await?;
        let expenses = counted(self.store.expenses_of_group(group_id).await?);
        Ok(compute_balances(&expenses, &group.members)?)
    }

    // Expenses

    async fn checked_expense(
        &self,
        request: ExpenseRequest,
    ) -> Result<(Group, ExpenseRequest), ServiceError> {
        validate_amount(request.amount)?;
        let group = self.require_group(&request.group_id).await?;
        let beneficiary_ids = dedup(request.beneficiary_ids);
        if beneficiary_ids.is_empty() {
            return Err(ServiceError::Validation(String::from(
                "an expense needs at least one beneficiary",
            )));
        }
        if !group.has_member(&request.payer_id) {
            return Err(ServiceError::Validation(format!(
                "payer `{}` is not a member of group `{}`",
                request.payer_id, group.id
            )));
        }
        if let Some(outsider) = beneficiary_ids.iter().find(|id| !group.has_member(id)) {
            return Err(ServiceError::Validation(format!(
                "beneficiary `{outsider}` is not a member of group `{}`",
                group.id
            )));
        }
        Ok((
            group,
            ExpenseRequest {
                beneficiary_ids,
                ..request
            },
        ))
    }

    pub async fn create_expense(&self, request: ExpenseRequest) -> Result<Expense, ServiceError> {
        let lock = self.locks.for_group(&request.group_id);
        let _guard = lock.lock().await;

        let (group, request) = self.checked_expense(request).await?;
        let expense = Expense {
            id: new_id(),
            description: request.description,
            amount: request.amount,
            payer_id: request.payer_id,
            beneficiary_ids: request.beneficiary_ids,
            group_id: group.id,
            status: ExpenseStatus::Pending,
            created_at: Utc::now(),
        };
        self.store.insert_expense(&expense).await?;
        info!(expense_id = %expense.id, group_id = %expense.group_id, amount = expense.amount, "expense created");
        Ok(expense)
    }

    pub async fn list_expenses(&self) -> Result<Vec<Expense>, ServiceError> {
        Ok(self.store.list_expenses().await?)
    }

    pub async fn get_expense(&self, id: &str) -> Result<Expense, ServiceError> {
        self.require_expense(id).await
    }

    pub async fn expenses_of_group(&self, group_id: &str) -> Result<Vec<Expense>, ServiceError> {
        self.require_group(group_id).await?;
        Ok(self.store.expenses_of_group(group_id).await?)
    }

    pub async fn expenses_paid_by(&self, user_id: &str) -> Result<Vec<Expense>, ServiceError> {
        self.require_user(user_id).await?;
        Ok(self.store.expenses_paid_by(user_id).await?)
    }

    pub async fn expenses_of_beneficiary(
        &self,
        group_id: &str,
        user_id: &str,
    ) -> Result<Vec<Expense>, ServiceError> {
        let expenses = self.expenses_of_group(group_id).await?;
        Ok(expenses
            .into_iter()
            .filter(|expense| expense.beneficiary_ids.iter().any(|id| id == user_id))
            .collect())
    }

    pub async fn expenses_with_status(
        &self,
        status: ExpenseStatus,
    ) -> Result<Vec<Expense>, ServiceError> {
        Ok(self.store.expenses_with_status(status).await?)
    }

    pub async fn update_expense(
        &self,
        id: &str,
        request: ExpenseRequest,
    ) -> Result<Expense, ServiceError> {
        let lock = self.locks.for_group(&request.group_id);
        let _guard = lock.lock().await;

        let mut expense = self.require_expense(id).await?;
        if request.group_id != expense.group_id {
            return Err(ServiceError::Validation(String::from(
                "an expense cannot move to another group",
            )));
        }
        let (_, request) = self.checked_expense(request).await?;
        expense.description = request.description;
        expense.amount = request.amount;
        expense.payer_id = request.payer_id;
        expense.beneficiary_ids = request.beneficiary_ids;

        self.store.replace_expense(&expense).await?;
        info!(expense_id = %id, "expense updated");
        Ok(expense)
    }

    pub async fn set_expense_status(
        &self,
        id: &str,
        status: ExpenseStatus,
    ) -> Result<Expense, ServiceError> {
        let group_id = self.require_expense(id).await?.group_id;
        let lock = self.locks.for_group(&group_id);
        let _guard = lock.lock().await;

        let mut expense = self.require_expense(id).await?;
        expense.status = status;
        self.store.replace_expense(&expense).await?;
        info!(expense_id = %id, status = status.as_str(), "expense status changed");
        Ok(expense)
    }

    pub async fn delete_expense(&self, id: &str) -> Result<(), ServiceError> {
        let group_id = self.require_expense(id).await?.group_id;
        let lock = self.locks.for_group(&group_id);
        let _guard = lock.lock().await;

        if !self.store.delete_expense(id).await? {
            return Err(ServiceError::NotFound(format!("expense `{id}` not found")));
        }
        info!(expense_id = %id, "expense deleted");
        Ok(())
    }

    // Settlements

    /// Stores a payment recorded by hand. It does not go through the planner.
    pub async fn record_settlement(
        &self,
        request: SettlementRequest,
    ) -> Result<Settlement, ServiceError> {
        validate_amount(request.amount)?;
        if request.debtor_id == request.creditor_id {
            return Err(ServiceError::Validation(String::from(
                "debtor and creditor must be different users",
            )));
        }
        let lock = self.locks.for_group(&request.group_id);
        let _guard = lock.lock().await;

        let group = self.require_group(&request.group_id).await?;
        self.require_user(&request.debtor_id).await?;
        self.require_user(&request.creditor_id).await?;
        if !group.has_member(&request.debtor_id) || !group.has_member(&request.creditor_id) {
            return Err(ServiceError::Validation(format!(
                "debtor and creditor must both belong to group `{}`",
                group.id
            )));
        }

        let settlement = Settlement {
            id: new_id(),
            amount: self.tolerance.round(request.amount),
            debtor_id: request.debtor_id,
            creditor_id: request.creditor_id,
            group_id: group.id,
            comment: request
                .comment
                .filter(|comment| !comment.trim().is_empty())
                .unwrap_or_else(|| MANUAL_COMMENT.to_string()),
            created_at: Utc::now(),
        };
        self.store
            .insert_settlements(std::slice::from_ref(&settlement))
            .await?;
        info!(settlement_id = %settlement.id, group_id = %settlement.group_id, "settlement recorded");
        Ok(settlement)
    }

    pub async fn list_settlements(&self) -> Result<Vec<Settlement>, ServiceError> {
        Ok(self.store.list_settlements().await?)
    }

    pub async fn get_settlement(&self, id: &str) -> Result<Settlement, ServiceError> {
        self.store
            .find_settlement(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("settlement `{id}` not found")))
    }

    pub async fn settlements_of_group(
        &self,
        group_id: &str,
    ) -> Result<Vec<Settlement>, ServiceError> {
        self.require_group(group_id).await?;
        Ok(self.store.settlements_of_group(group_id).await?)
    }

    pub async fn settlements_of_user(&self, user_id: &str) -> Result<Vec<Settlement>, ServiceError> {
        self.require_user(user_id).await?;
        Ok(self.store.settlements_of_user(user_id).await?)
    }

    /// Replaces the stored settlements of the group with a fresh plan.
    ///
    /// The plan is computed before anything is deleted, so a group whose
    /// expenses break a precondition keeps its previous settlements.
    pub async fn calculate_settlements(
        &self,
        group_id: &str,
    ) -> Result<Vec<Settlement>, ServiceError> {
        let lock = self.locks.for_group(group_id);
        let _guard = lock.lock().await;

        let group = self.require_group(group_id).await?;
        let expenses = counted(self.store.expenses_of_group(group_id).await?);
        let report = settle(&expenses, &group.members, &self.tolerance)?;
        if let Some(residual) = report.residual {
            warn!(group_id, residual, "group balances do not sum to zero");
        }

        let removed = self.store.delete_group_settlements(group_id).await?;
        let created_at = Utc::now();
        let settlements: Vec<Settlement> = report
            .settlements
            .into_iter()
            .map(|planned| Settlement {
                id: new_id(),
                amount: planned.amount,
                debtor_id: planned.debtor,
                creditor_id: planned.creditor,
                group_id: group.id.clone(),
                comment: planned.comment,
                created_at,
            })
            .collect();
        self.store.insert_settlements(&settlements).await?;

        info!(
            group_id,
            expenses = expenses.len(),
            removed,
            created = settlements.len(),
            "settlements recalculated"
        );
        Ok(settlements)
    }

    pub async fn delete_settlement(&self, id: &str) -> Result<(), ServiceError> {
        if !self.store.delete_settlement(id).await? {
            return Err(ServiceError::NotFound(format!("settlement `{id}` not found")));
        }
        info!(settlement_id = %id, "settlement deleted");
        Ok(())
    }

    pub async fn delete_group_settlements(&self, group_id: &str) -> Result<u64, ServiceError> {
        let lock = self.locks.for_group(group_id);
        let _guard = lock.lock().await;

        self.require_group(group_id).await?;
        let removed = self.store.delete_group_settlements(group_id).await?;
        info!(group_id, removed, "group settlements deleted");
        Ok(removed)
    }

    /// What the user is owed minus what they owe, over stored settlements.
    pub async fn user_balance(&self, user_id: &str) -> Result<f64, ServiceError> {
        self.require_user(user_id).await?;
        let balance: f64 = self
            .store
            .settlements_of_user(user_id)
            .await?
            .iter()
            .map(|settlement| {
                if settlement.creditor_id == user_id {
                    settlement.amount
                } else {
                    -settlement.amount
                }
            })
            .sum();
        Ok(self.tolerance.round(balance))
    }
}
