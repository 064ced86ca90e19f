//! Persistence port and its adapters.
//!
//! The service only talks to [`Store`]. [`MongoStore`] keeps one collection
//! per entity, [`MemoryStore`] keeps everything in process and backs the
//! tests and the `memory` database kind.
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, Document},
    options::FindOptions,
    Client, Collection, Database,
};
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::schemas::{Expense, ExpenseStatus, Group, Settlement, User};

#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_user(&self, user: &User) -> Result<(), StoreError>;
    /// Replaces the stored user with the same id. Returns false if none exists.
    async fn replace_user(&self, user: &User) -> Result<bool, StoreError>;
    async fn find_user(&self, id: &str) -> Result<Option<User>, StoreError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn list_users(&self) -> Result<Vec<User>, StoreError>;
    async fn delete_user(&self, id: &str) -> Result<bool, StoreError>;

    async fn insert_group(&self, group: &Group) -> Result<(), StoreError>;
    async fn replace_group(&self, group: &Group) -> Result<bool, StoreError>;
    async fn find_group(&self, id: &str) -> Result<Option<Group>, StoreError>;
    async fn find_group_by_name(&self, name: &str) -> Result<Option<Group>, StoreError>;
    async fn list_groups(&self) -> Result<Vec<Group>, StoreError>;
    async fn groups_of_user(&self, user_id: &str) -> Result<Vec<Group>, StoreError>;
    async fn delete_group(&self, id: &str) -> Result<bool, StoreError>;

    async fn insert_expense(&self, expense: &Expense) -> Result<(), StoreError>;
    async fn replace_expense(&self, expense: &Expense) -> Result<bool, StoreError>;
    async fn find_expense(&self, id: &str) -> Result<Option<Expense>, StoreError>;
    async fn list_expenses(&self) -> Result<Vec<Expense>, StoreError>;
    async fn expenses_of_group(&self, group_id: &str) -> Result<Vec<Expense>, StoreError>;
    async fn expenses_paid_by(&self, user_id: &str) -> Result<Vec<Expense>, StoreError>;
    async fn expenses_with_status(&self, status: ExpenseStatus)
        -> Result<Vec<Expense>, StoreError>;
    async fn delete_expense(&self, id: &str) -> Result<bool, StoreError>;
    async fn delete_group_expenses(&self, group_id: &str) -> Result<u64, StoreError>;

    async fn insert_settlements(&self, settlements: &[Settlement]) -> Result<(), StoreError>;
    async fn find_settlement(&self, id: &str) -> Result<Option<Settlement>, StoreError>;
    async fn list_settlements(&self) -> Result<Vec<Settlement>, StoreError>;
    async fn settlements_of_group(&self, group_id: &str) -> Result<Vec<Settlement>, StoreError>;
    /// Settlements where the user is either the debtor or the creditor.
    async fn settlements_of_user(&self, user_id: &str) -> Result<Vec<Settlement>, StoreError>;
    async fn delete_settlement(&self, id: &str) -> Result<bool, StoreError>;
    async fn delete_group_settlements(&self, group_id: &str) -> Result<u64, StoreError>;
}

pub struct MongoStore {
    users: Collection<User>,
    groups: Collection<Group>,
    expenses: Collection<Expense>,
    settlements: Collection<Settlement>,
}

impl MongoStore {
    pub async fn connect(uri: &str, database: &str) -> Result<Self, StoreError> {
        let client = Client::with_uri_str(uri).await?;
        let database = client.database(database);
        // Fail at startup rather than on the first request.
        database.run_command(doc! { "ping": 1 }, None).await?;
        Ok(Self::new(&database))
    }

    pub fn new(database: &Database) -> Self {
        Self {
            users: database.collection("Users"),
            groups: database.collection("Groups"),
            expenses: database.collection("Expenses"),
            settlements: database.collection("Settlements"),
        }
    }
}

async fn find_all<T>(collection: &Collection<T>, filter: Document) -> Result<Vec<T>, StoreError>
where
    T: DeserializeOwned + Unpin + Send + Sync,
{
    // Ids are object ids, so this is creation order.
    let options = FindOptions::builder().sort(doc! { "id": 1 }).build();
    let cursor = collection.find(filter, options).await?;
    Ok(cursor.try_collect().await?)
}

async fn replace<T>(collection: &Collection<T>, id: &str, value: &T) -> Result<bool, StoreError>
where
    T: Serialize + Send + Sync,
{
    let result = collection.replace_one(doc! { "id": id }, value, None).await?;
    Ok(result.matched_count > 0)
}

async fn delete_one<T>(collection: &Collection<T>, id: &str) -> Result<bool, StoreError>
where
    T: Send + Sync,
{
    let result = collection.delete_one(doc! { "id": id }, None).await?;
    Ok(result.deleted_count > 0)
}

#[async_trait]
impl Store for MongoStore {
    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        self.users.insert_one(user, None).await?;
        Ok(())
    }

    async fn replace_user(&self, user: &User) -> Result<bool, StoreError> {
        replace(&self.users, &user.id, user).await
    }

    async fn find_user(&self, id: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users.find_one(doc! { "id": id }, None).await?)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users.find_one(doc! { "email": email }, None).await?)
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        find_all(&self.users, doc! {}).await
    }

    async fn delete_user(&self, id: &str) -> Result<bool, StoreError> {
        delete_one(&self.users, id).await
    }

    async fn insert_group(&self, group: &Group) -> Result<(), StoreError> {
        self.groups.insert_one(group, None).await?;
        Ok(())
    }

    async fn replace_group(&self, group: &Group) -> Result<bool, StoreError> {
        replace(&self.groups, &group.id, group).await
    }

    async fn find_group(&self, id: &str) -> Result<Option<Group>, StoreError> {
        Ok(self.groups.find_one(doc! { "id": id }, None).await?)
    }

    async fn find_group_by_name(&self, name: &str) -> Result<Option<Group>, StoreError> {
        Ok(self.groups.find_one(doc! { "name": name }, None).await?)
    }

    async fn list_groups(&self) -> Result<Vec<Group>, StoreError> {
        find_all(&self.groups, doc! {}).await
    }

    async fn groups_of_user(&self, user_id: &str) -> Result<Vec<Group>, StoreError> {
        find_all(&self.groups, doc! { "members": user_id }).await
    }

    async fn delete_group(&self, id: &str) -> Result<bool, StoreError> {
        delete_one(&self.groups, id).await
    }

    async fn insert_expense(&self, expense: &Expense) -> Result<(), StoreError> {
        self.expenses.insert_one(expense, None).await?;
        Ok(())
    }

    async fn replace_expense(&self, expense: &Expense) -> Result<bool, StoreError> {
        replace(&self.expenses, &expense.id, expense).await
    }

    async fn find_expense(&self, id: &str) -> Result<Option<Expense>, StoreError> {
        Ok(self.expenses.find_one(doc! { "id": id }, None).await?)
    }

    async fn list_expenses(&self) -> Result<Vec<Expense>, StoreError> {
        find_all(&self.expenses, doc! {}).await
    }

    async fn expenses_of_group(&self, group_id: &str) -> Result<Vec<Expense>, StoreError> {
        find_all(&self.expenses, doc! { "group_id": group_id }).await
    }

    async fn expenses_paid_by(&self, user_id: &str) -> Result<Vec<Expense>, StoreError> {
        find_all(&self.expenses, doc! { "payer_id": user_id }).await
    }

    async fn expenses_with_status(
        &self,
        status: ExpenseStatus,
    ) -> Result<Vec<Expense>, StoreError> {
        find_all(&self.expenses, doc! { "status": status.as_str() }).await
    }

    async fn delete_expense(&self, id: &str) -> Result<bool, StoreError> {
        delete_one(&self.expenses, id).await
    }

    async fn delete_group_expenses(&self, group_id: &str) -> Result<u64, StoreError> {
        let result = self
            .expenses
            .delete_many(doc! { "group_id": group_id }, None)
            .await?;
        Ok(result.deleted_count)
    }

    async fn insert_settlements(&self, settlements: &[Settlement]) -> Result<(), StoreError> {
        // insert_many refuses an empty batch.
        if settlements.is_empty() {
            return Ok(());
        }
        self.settlements.insert_many(settlements, None).await?;
        Ok(())
    }

    async fn find_settlement(&self, id: &str) -> Result<Option<Settlement>, StoreError> {
        Ok(self.settlements.find_one(doc! { "id": id }, None).await?)
    }

    async fn list_settlements(&self) -> Result<Vec<Settlement>, StoreError> {
        find_all(&self.settlements, doc! {}).await
    }

    async fn settlements_of_group(&self, group_id: &str) -> Result<Vec<Settlement>, StoreError> {
        find_all(&self.settlements, doc! { "group_id": group_id }).await
    }

    async fn settlements_of_user(&self, user_id: &str) -> Result<Vec<Settlement>, StoreError> {
        let filter = doc! { "$or": [{ "debtor_id": user_id }, { "creditor_id": user_id }] };
        find_all(&self.settlements, filter).await
    }

    async fn delete_settlement(&self, id: &str) -> Result<bool, StoreError> {
        delete_one(&self.settlements, id).await
    }

    async fn delete_group_settlements(&self, group_id: &str) -> Result<u64, StoreError> {
        let result = self
            .settlements
            .delete_many(doc! { "group_id": group_id }, None)
            .await?;
        Ok(result.deleted_count)
    }
}

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    groups: Vec<Group>,
    expenses: Vec<Expense>,
    settlements: Vec<Settlement>,
}

/// In-process store. Rows are kept in insertion order.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn replace_row<T: Clone>(rows: &mut [T], value: &T, same: impl Fn(&T) -> bool) -> bool {
    match rows.iter_mut().find(|row| same(row)) {
        Some(row) => {
            *row = value.clone();
            true
        }
        None => false,
    }
}

fn remove_rows<T>(rows: &mut Vec<T>, matches: impl Fn(&T) -> bool) -> u64 {
    let before = rows.len();
    rows.retain(|row| !matches(row));
    (before - rows.len()) as u64
}

fn select<T: Clone>(rows: &[T], matches: impl Fn(&T) -> bool) -> Vec<T> {
    rows.iter().filter(|row| matches(row)).cloned().collect()
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        self.tables.write().await.users.push(user.clone());
        Ok(())
    }

    async fn replace_user(&self, user: &User) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        Ok(replace_row(&mut tables.users, user, |row| row.id == user.id))
    }

    async fn find_user(&self, id: &str) -> Result<Option<User>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.users.iter().find(|user| user.id == id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.users.iter().find(|user| user.email == email).cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        Ok(self.tables.read().await.users.clone())
    }

    async fn delete_user(&self, id: &str) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        Ok(remove_rows(&mut tables.users, |user| user.id == id) > 0)
    }

    async fn insert_group(&self, group: &Group) -> Result<(), StoreError> {
        self.tables.write().await.groups.push(group.clone());
        Ok(())
    }

    async fn replace_group(&self, group: &Group) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        Ok(replace_row(&mut tables.groups, group, |row| row.id == group.id))
    }

    async fn find_group(&self, id: &str) -> Result<Option<Group>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.groups.iter().find(|group| group.id == id).cloned())
    }

    async fn find_group_by_name(&self, name: &str) -> Result<Option<Group>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.groups.iter().find(|group| group.name == name).cloned())
    }

    async fn list_groups(&self) -> Result<Vec<Group>, StoreError> {
        Ok(self.tables.read().await.groups.clone())
    }

    async fn groups_of_user(&self, user_id: &str) -> Result<Vec<Group>, StoreError> {
        let tables = self.tables.read().await;
        Ok(select(&tables.groups, |group| group.has_member(user_id)))
    }

    async fn delete_group(&self, id: &str) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        Ok(remove_rows(&mut tables.groups, |group| group.id == id) > 0)
    }

    async fn insert_expense(&self, expense: &Expense) -> Result<(), StoreError> {
        self.tables.write().await.expenses.push(expense.clone());
        Ok(())
    }

    async fn replace_expense(&self, expense: &Expense) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        Ok(replace_row(&mut tables.expenses, expense, |row| {
            row.id == expense.id
        }))
    }

    async fn find_expense(&self, id: &str) -> Result<Option<Expense>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.expenses.iter().find(|expense| expense.id == id).cloned())
    }

    async fn list_expenses(&self) -> Result<Vec<Expense>, StoreError> {
        Ok(self.tables.read().await.expenses.clone())
    }

    async fn expenses_of_group(&self, group_id: &str) -> Result<Vec<Expense>, StoreError> {
        let tables = self.tables.read().await;
        Ok(select(&tables.expenses, |expense| expense.group_id == group_id))
    }

    async fn expenses_paid_by(&self, user_id: &str) -> Result<Vec<Expense>, StoreError> {
        let tables = self.tables.read().await;
        Ok(select(&tables.expenses, |expense| expense.payer_id == user_id))
    }

    async fn expenses_with_status(
        &self,
        status: ExpenseStatus,
    ) -> Result<Vec<Expense>, StoreError> {
        let tables = self.tables.read().await;
        Ok(select(&tables.expenses, |expense| expense.status == status))
    }

    async fn delete_expense(&self, id: &str) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        Ok(remove_rows(&mut tables.expenses, |expense| expense.id == id) > 0)
    }

    async fn delete_group_expenses(&self, group_id: &str) -> Result<u64, StoreError> {
        let mut tables = self.tables.write().await;
        Ok(remove_rows(&mut tables.expenses, |expense| {
            expense.group_id == group_id
        }))
    }

    async fn insert_settlements(&self, settlements: &[Settlement]) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables.settlements.extend_from_slice(settlements);
        Ok(())
    }

    async fn find_settlement(&self, id: &str) -> Result<Option<Settlement>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.settlements.iter().find(|s| s.id == id).cloned())
    }

    async fn list_settlements(&self) -> Result<Vec<Settlement>, StoreError> {
        Ok(self.tables.read().await.settlements.clone())
    }

    async fn settlements_of_group(&self, group_id: &str) -> Result<Vec<Settlement>, StoreError> {
        let tables = self.tables.read().await;
        Ok(select(&tables.settlements, |s| s.group_id == group_id))
    }

    async fn settlements_of_user(&self, user_id: &str) -> Result<Vec<Settlement>, StoreError> {
        let tables = self.tables.read().await;
        Ok(select(&tables.settlements, |s| {
            s.debtor_id == user_id || s.creditor_id == user_id
        }))
    }

    async fn delete_settlement(&self, id: &str) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        Ok(remove_rows(&mut tables.settlements, |s| s.id == id) > 0)
    }

    async fn delete_group_settlements(&self, group_id: &str) -> Result<u64, StoreError> {
        let mut tables = self.tables.write().await;
        Ok(remove_rows(&mut tables.settlements, |s| s.group_id == group_id))
    }
}
