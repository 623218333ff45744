//! Persistence ports for verification data.

use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::error::Result;
use crate::user::{IpRecord, User};

/// Storage of users and of the IP evidence log.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Find a user outside of any transaction.
    async fn find_by_id(&self, user_id: i64) -> Result<User>;

    /// Open a unit of work. Dropping it without calling
    /// [`IdentityTransaction::commit`] discards every write.
    async fn begin(&self) -> Result<Box<dyn IdentityTransaction>>;

    /// Set a verified email address on `user_id`.
    async fn save_email(
        &self,
        user_id: i64,
        email: &str,
        verified_at: NaiveDateTime,
    ) -> Result<User>;
}

/// Unit of work holding the submitting user's row lock.
///
/// Existence checks are fast paths giving precise errors. Writes are
/// guarded again by the storage unique constraints, which report the same
/// `Duplicate*` errors.
#[async_trait]
pub trait IdentityTransaction: Send {
    /// Load `user_id` and lock it until commit or rollback.
    async fn lock_user(&mut self, user_id: i64) -> Result<User>;

    /// Another user already owns `nickname`.
    async fn nickname_taken(&mut self, nickname: &str, user_id: i64) -> Result<bool>;

    /// Another user already owns `phone_number`.
    async fn phone_number_taken(
        &mut self,
        phone_number: &str,
        user_id: i64,
    ) -> Result<bool>;

    /// Another user already owns `id_no`.
    async fn id_no_taken(&mut self, id_no: &str, user_id: i64) -> Result<bool>;

    /// `ip_address` is already bound to another user.
    async fn ip_bound_elsewhere(
        &mut self,
        ip_address: &str,
        user_id: i64,
    ) -> Result<bool>;

    /// Append a new [`IpRecord`].
    async fn bind_ip(
        &mut self,
        user_id: i64,
        ip_address: &str,
        at: NaiveDateTime,
    ) -> Result<IpRecord>;

    /// Write profile columns and profile review state.
    async fn save_profile(&mut self, user: &User) -> Result<()>;

    /// Write identity columns, document statuses and identity review state.
    async fn save_identity(&mut self, user: &User) -> Result<()>;

    /// Make every write visible.
    async fn commit(self: Box<Self>) -> Result<()>;
}
