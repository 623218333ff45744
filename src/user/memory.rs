//! In-memory [`IdentityStore`] for tests.
//!
//! A transaction holds the whole store lock and works on a copy of the
//! state, swapped in on commit. Unique constraints are checked on commit
//! the way the database does.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::{Result, ServerError};
use crate::user::{IdentityStore, IdentityTransaction, IpRecord, User};

#[derive(Clone, Debug, Default)]
struct MemoryState {
    users: BTreeMap<i64, User>,
    ip_records: Vec<IpRecord>,
}

impl MemoryState {
    fn taken(&self, user_id: i64, value: &str, field: fn(&User) -> &Option<String>) -> bool {
        !value.is_empty()
            && self
                .users
                .values()
                .any(|user| user.id != user_id && field(user).as_deref() == Some(value))
    }

    fn ip_owner(&self, ip_address: &str) -> Option<i64> {
        self.ip_records
            .iter()
            .find(|record| record.ip_address == ip_address)
            .map(|record| record.user_id)
    }

    fn check_unique(&self) -> Result<()> {
        let columns: [(fn(&User) -> &Option<String>, ServerError); 3] = [
            (|user| &user.nickname, ServerError::DuplicateNickname),
            (|user| &user.phone_number, ServerError::DuplicatePhone),
            (|user| &user.id_no, ServerError::DuplicateIdNumber),
        ];

        for (field, error) in columns {
            let mut seen = HashSet::new();
            let duplicated = self
                .users
                .values()
                .filter_map(|user| field(user).as_deref())
                .filter(|value| !value.is_empty())
                .any(|value| !seen.insert(value));
            if duplicated {
                return Err(error);
            }
        }

        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn with_users(users: impl IntoIterator<Item = User>) -> Self {
        let state = MemoryState {
            users: users.into_iter().map(|user| (user.id, user)).collect(),
            ip_records: Vec::new(),
        };

        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Committed state of `user_id`.
    pub async fn user(&self, user_id: i64) -> Option<User> {
        self.state.lock().await.users.get(&user_id).cloned()
    }

    /// Committed IP log.
    pub async fn ip_records(&self) -> Vec<IpRecord> {
        self.state.lock().await.ip_records.clone()
    }
}

#[async_trait]
impl IdentityStore for MemoryStore {
    async fn find_by_id(&self, user_id: i64) -> Result<User> {
        self.user(user_id).await.ok_or(ServerError::UserNotFound)
    }

    async fn begin(&self) -> Result<Box<dyn IdentityTransaction>> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let staged = guard.clone();

        Ok(Box::new(MemoryTransaction { guard, staged }))
    }

    async fn save_email(
        &self,
        user_id: i64,
        email: &str,
        verified_at: NaiveDateTime,
    ) -> Result<User> {
        let mut state = self.state.lock().await;
        let user = state
            .users
            .get_mut(&user_id)
            .ok_or(ServerError::UserNotFound)?;
        user.email = Some(email.to_owned());
        user.email_verified_at = Some(verified_at);
        Ok(user.clone())
    }
}

struct MemoryTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    staged: MemoryState,
}

impl MemoryTransaction {
    fn save(&mut self, user: &User) -> Result<()> {
        let slot = self
            .staged
            .users
            .get_mut(&user.id)
            .ok_or(ServerError::UserNotFound)?;
        *slot = user.clone();
        Ok(())
    }
}

#[async_trait]
impl IdentityTransaction for MemoryTransaction {
    async fn lock_user(&mut self, user_id: i64) -> Result<User> {
        self.staged
            .users
            .get(&user_id)
            .cloned()
            .ok_or(ServerError::UserNotFound)
    }

    async fn nickname_taken(&mut self, nickname: &str, user_id: i64) -> Result<bool> {
        Ok(self.staged.taken(user_id, nickname, |user| &user.nickname))
    }

    async fn phone_number_taken(
        &mut self,
        phone_number: &str,
        user_id: i64,
    ) -> Result<bool> {
        Ok(self
            .staged
            .taken(user_id, phone_number, |user| &user.phone_number))
    }

    async fn id_no_taken(&mut self, id_no: &str, user_id: i64) -> Result<bool> {
        Ok(self.staged.taken(user_id, id_no, |user| &user.id_no))
    }

    async fn ip_bound_elsewhere(
        &mut self,
        ip_address: &str,
        user_id: i64,
    ) -> Result<bool> {
        Ok(self
            .staged
            .ip_owner(ip_address)
            .is_some_and(|owner| owner != user_id))
    }

    async fn bind_ip(
        &mut self,
        user_id: i64,
        ip_address: &str,
        at: NaiveDateTime,
    ) -> Result<IpRecord> {
        if self
            .staged
            .ip_owner(ip_address)
            .is_some_and(|owner| owner != user_id)
        {
            return Err(ServerError::DuplicateIpBinding);
        }

        let record = IpRecord {
            id: self.staged.ip_records.len() as i64 + 1,
            user_id,
            ip_address: ip_address.to_owned(),
            created_at: at,
        };
        self.staged.ip_records.push(record.clone());

        Ok(record)
    }

    async fn save_profile(&mut self, user: &User) -> Result<()> {
        self.save(user)
    }

    async fn save_identity(&mut self, user: &User) -> Result<()> {
        self.save(user)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryTransaction { mut guard, staged } = *self;
        staged.check_unique()?;
        *guard = staged;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rollback_on_drop() {
        let store = MemoryStore::with_users([User {
            id: 1,
            ..Default::default()
        }]);

        let mut tx = store.begin().await.unwrap();
        let mut user = tx.lock_user(1).await.unwrap();
        user.bio = Some("draft".into());
        tx.save_profile(&user).await.unwrap();
        tx.bind_ip(1, "203.0.113.7", NaiveDateTime::default())
            .await
            .unwrap();
        drop(tx);

        assert_eq!(store.user(1).await.unwrap().bio, None);
        assert!(store.ip_records().await.is_empty());
    }

    #[tokio::test]
    async fn test_commit_enforces_unique_columns() {
        let store = MemoryStore::with_users([
            User {
                id: 1,
                phone_number: Some("+33600000001".into()),
                ..Default::default()
            },
            User {
                id: 2,
                phone_number: Some(String::new()),
                ..Default::default()
            },
            User {
                id: 3,
                phone_number: Some(String::new()),
                ..Default::default()
            },
        ]);

        let mut tx = store.begin().await.unwrap();
        let mut user = tx.lock_user(2).await.unwrap();
        user.phone_number = Some("+33600000001".into());
        tx.save_profile(&user).await.unwrap();

        assert!(matches!(tx.commit().await, Err(ServerError::DuplicatePhone)));
        assert_eq!(
            store.user(2).await.unwrap().phone_number.as_deref(),
            Some("")
        );
    }
}
