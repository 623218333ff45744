//! PostgreSQL implementation of the identity store.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::postgres::PgQueryResult;
use sqlx::{PgPool, Postgres, Transaction};

use crate::error::{Result, ServerError};
use crate::user::{IdentityStore, IdentityTransaction, IpRecord, User};

const USER_COLUMNS: &str = r#"
    id, nickname, phone_number, avatar, bio,
    facebook, telegram, wechat, skype, whatsapp, line, zalo,
    profile_status, profile_verified_at,
    profile_error_count_today, profile_error_last_at,
    full_name, id_no, country, city,
    id_front_img, id_front_img_status,
    id_reverse_img, id_reverse_img_status,
    self_photo_img, self_photo_img_status,
    identity_status, identity_verified_at,
    identity_error_count_today, identity_error_last_at,
    email, email_verified_at
"#;

/// PostgreSQL identity store.
#[derive(Clone)]
pub struct PgIdentityStore {
    pool: PgPool,
}

impl PgIdentityStore {
    /// Create a new [`PgIdentityStore`].
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    async fn find_by_id(&self, user_id: i64) -> Result<User> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");

        sqlx::query_as::<_, User>(&query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ServerError::UserNotFound)
    }

    async fn begin(&self) -> Result<Box<dyn IdentityTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgIdentityTransaction { tx }))
    }

    async fn save_email(
        &self,
        user_id: i64,
        email: &str,
        verified_at: NaiveDateTime,
    ) -> Result<User> {
        let query = format!(
            "UPDATE users SET email = $2, email_verified_at = $3 WHERE id = $1 RETURNING {USER_COLUMNS}"
        );

        sqlx::query_as::<_, User>(&query)
            .bind(user_id)
            .bind(email)
            .bind(verified_at)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ServerError::UserNotFound)
    }
}

/// Transaction on a [`PgIdentityStore`]. Rolled back when dropped.
pub struct PgIdentityTransaction {
    tx: Transaction<'static, Postgres>,
}

impl PgIdentityTransaction {
    async fn exists(&mut self, query: &str, value: &str, user_id: i64) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(query)
            .bind(value)
            .bind(user_id)
            .fetch_one(&mut *self.tx)
            .await?;

        Ok(exists)
    }
}

#[async_trait]
impl IdentityTransaction for PgIdentityTransaction {
    async fn lock_user(&mut self, user_id: i64) -> Result<User> {
        let query =
            format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1 FOR UPDATE");

        sqlx::query_as::<_, User>(&query)
            .bind(user_id)
            .fetch_optional(&mut *self.tx)
            .await?
            .ok_or(ServerError::UserNotFound)
    }

    async fn nickname_taken(&mut self, nickname: &str, user_id: i64) -> Result<bool> {
        if nickname.is_empty() {
            return Ok(false);
        }

        self.exists(
            "SELECT EXISTS(SELECT 1 FROM users WHERE nickname = $1 AND id <> $2)",
            nickname,
            user_id,
        )
        .await
    }

    async fn phone_number_taken(
        &mut self,
        phone_number: &str,
        user_id: i64,
    ) -> Result<bool> {
        if phone_number.is_empty() {
            return Ok(false);
        }

        self.exists(
            "SELECT EXISTS(SELECT 1 FROM users WHERE phone_number = $1 AND id <> $2)",
            phone_number,
            user_id,
        )
        .await
    }

    async fn id_no_taken(&mut self, id_no: &str, user_id: i64) -> Result<bool> {
        if id_no.is_empty() {
            return Ok(false);
        }

        self.exists(
            "SELECT EXISTS(SELECT 1 FROM users WHERE id_no = $1 AND id <> $2)",
            id_no,
            user_id,
        )
        .await
    }

    async fn ip_bound_elsewhere(
        &mut self,
        ip_address: &str,
        user_id: i64,
    ) -> Result<bool> {
        self.exists(
            "SELECT EXISTS(SELECT 1 FROM ip_owners WHERE ip_address = $1 AND user_id <> $2)",
            ip_address,
            user_id,
        )
        .await
    }

    async fn bind_ip(
        &mut self,
        user_id: i64,
        ip_address: &str,
        at: NaiveDateTime,
    ) -> Result<IpRecord> {
        sqlx::query(
            r#"
            INSERT INTO ip_owners (ip_address, user_id)
            VALUES ($1, $2)
            ON CONFLICT (ip_address) DO NOTHING
            "#,
        )
        .bind(ip_address)
        .bind(user_id)
        .execute(&mut *self.tx)
        .await?;

        // A concurrent submission may have claimed the address first.
        let owner = sqlx::query_scalar::<_, i64>(
            "SELECT user_id FROM ip_owners WHERE ip_address = $1",
        )
        .bind(ip_address)
        .fetch_one(&mut *self.tx)
        .await?;
        if owner != user_id {
            return Err(ServerError::DuplicateIpBinding);
        }

        let record = sqlx::query_as::<_, IpRecord>(
            r#"
            INSERT INTO ip_records (user_id, ip_address, created_at)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, ip_address, created_at
            "#,
        )
        .bind(user_id)
        .bind(ip_address)
        .bind(at)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(record)
    }

    async fn save_profile(&mut self, user: &User) -> Result<()> {
        let result: PgQueryResult = sqlx::query(
            r#"
            UPDATE users
            SET
                nickname = $2,
                phone_number = $3,
                avatar = $4,
                bio = $5,
                facebook = $6,
                telegram = $7,
                wechat = $8,
                skype = $9,
                whatsapp = $10,
                line = $11,
                zalo = $12,
                profile_status = $13,
                profile_verified_at = $14,
                profile_error_count_today = $15,
                profile_error_last_at = $16
            WHERE id = $1
            "#,
        )
        .bind(user.id)
        .bind(&user.nickname)
        .bind(&user.phone_number)
        .bind(&user.avatar)
        .bind(&user.bio)
        .bind(&user.facebook)
        .bind(&user.telegram)
        .bind(&user.wechat)
        .bind(&user.skype)
        .bind(&user.whatsapp)
        .bind(&user.line)
        .bind(&user.zalo)
        .bind(user.profile_status.as_str())
        .bind(user.profile_verified_at)
        .bind(user.profile_error_count_today)
        .bind(user.profile_error_last_at)
        .execute(&mut *self.tx)
        .await
        .map_err(unique_violation)?;

        if result.rows_affected() == 0 {
            return Err(ServerError::UserNotFound);
        }

        Ok(())
    }

    async fn save_identity(&mut self, user: &User) -> Result<()> {
        let result: PgQueryResult = sqlx::query(
            r#"
            UPDATE users
            SET
                full_name = $2,
                id_no = $3,
                country = $4,
                city = $5,
                id_front_img = $6,
                id_front_img_status = $7,
                id_reverse_img = $8,
                id_reverse_img_status = $9,
                self_photo_img = $10,
                self_photo_img_status = $11,
                identity_status = $12,
                identity_verified_at = $13,
                identity_error_count_today = $14,
                identity_error_last_at = $15
            WHERE id = $1
            "#,
        )
        .bind(user.id)
        .bind(&user.full_name)
        .bind(&user.id_no)
        .bind(&user.country)
        .bind(&user.city)
        .bind(&user.id_front_img)
        .bind(user.id_front_img_status.as_str())
        .bind(&user.id_reverse_img)
        .bind(user.id_reverse_img_status.as_str())
        .bind(&user.self_photo_img)
        .bind(user.self_photo_img_status.as_str())
        .bind(user.identity_status.as_str())
        .bind(user.identity_verified_at)
        .bind(user.identity_error_count_today)
        .bind(user.identity_error_last_at)
        .execute(&mut *self.tx)
        .await
        .map_err(unique_violation)?;

        if result.rows_affected() == 0 {
            return Err(ServerError::UserNotFound);
        }

        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await.map_err(unique_violation)
    }
}

/// Map a unique index violation to the matching duplicate error.
fn unique_violation(err: sqlx::Error) -> ServerError {
    let constraint = match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            db.constraint().map(str::to_owned)
        },
        _ => None,
    };

    match constraint.as_deref() {
        Some("users_nickname_key") => ServerError::DuplicateNickname,
        Some("users_phone_number_key") => ServerError::DuplicatePhone,
        Some("users_id_no_key") => ServerError::DuplicateIdNumber,
        Some("ip_owners_pkey") => ServerError::DuplicateIpBinding,
        _ => ServerError::Sql(err),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::NaiveDate;
    use sqlx::{Pool, Postgres};

    use super::*;

    const IP: &str = "203.0.113.7";

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 10)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    async fn count(pool: &PgPool, table: &str) -> i64 {
        sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[sqlx::test(fixtures("../../fixtures/users.sql"))]
    async fn test_unique_violations_are_mapped(pool: Pool<Postgres>) {
        let store = PgIdentityStore::new(pool);

        let mut tx = store.begin().await.unwrap();
        let mut bob = tx.lock_user(2).await.unwrap();
        bob.phone_number = Some("+33600000001".into());
        assert!(matches!(
            tx.save_profile(&bob).await,
            Err(ServerError::DuplicatePhone)
        ));
        drop(tx);

        let mut tx = store.begin().await.unwrap();
        let mut bob = tx.lock_user(2).await.unwrap();
        bob.nickname = Some("alice".into());
        assert!(matches!(
            tx.save_profile(&bob).await,
            Err(ServerError::DuplicateNickname)
        ));
        drop(tx);

        let mut tx = store.begin().await.unwrap();
        let mut bob = tx.lock_user(2).await.unwrap();
        bob.id_no = Some("P-001".into());
        assert!(matches!(
            tx.save_identity(&bob).await,
            Err(ServerError::DuplicateIdNumber)
        ));
        drop(tx);

        let bob = store.find_by_id(2).await.unwrap();
        assert_eq!(bob.nickname.as_deref(), Some("bob"));
        assert_eq!(bob.phone_number.as_deref(), Some(""));
    }

    #[sqlx::test(fixtures("../../fixtures/users.sql"))]
    async fn test_empty_values_are_not_duplicates(pool: Pool<Postgres>) {
        let store = PgIdentityStore::new(pool);
        let mut tx = store.begin().await.unwrap();

        assert!(!tx.phone_number_taken("", 3).await.unwrap());
        assert!(!tx.id_no_taken("", 3).await.unwrap());
        assert!(tx.nickname_taken("alice", 2).await.unwrap());
        assert!(!tx.nickname_taken("alice", 1).await.unwrap());

        let mut carol = tx.lock_user(3).await.unwrap();
        carol.bio = Some("new here".into());
        tx.save_profile(&carol).await.unwrap();
        tx.save_identity(&carol).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(
            store.find_by_id(3).await.unwrap().bio.as_deref(),
            Some("new here")
        );
    }

    #[sqlx::test(fixtures("../../fixtures/users.sql"))]
    async fn test_ip_owned_by_another_user(pool: Pool<Postgres>) {
        let store = PgIdentityStore::new(pool.clone());

        for _ in 0..2 {
            let mut tx = store.begin().await.unwrap();
            let record = tx.bind_ip(1, IP, now()).await.unwrap();
            assert_eq!(record.user_id, 1);
            assert_eq!(record.ip_address, IP);
            assert_eq!(record.created_at, now());
            tx.commit().await.unwrap();
        }

        let mut tx = store.begin().await.unwrap();
        assert!(tx.ip_bound_elsewhere(IP, 2).await.unwrap());
        assert!(!tx.ip_bound_elsewhere(IP, 1).await.unwrap());
        assert!(matches!(
            tx.bind_ip(2, IP, now()).await,
            Err(ServerError::DuplicateIpBinding)
        ));
        drop(tx);

        assert_eq!(count(&pool, "ip_records").await, 2);
        assert_eq!(count(&pool, "ip_owners").await, 1);
        let owner = sqlx::query_scalar::<_, i64>(
            "SELECT user_id FROM ip_owners WHERE ip_address = $1",
        )
        .bind(IP)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(owner, 1);
    }

    #[sqlx::test(fixtures("../../fixtures/users.sql"))]
    async fn test_rollback_on_drop(pool: Pool<Postgres>) {
        let store = PgIdentityStore::new(pool.clone());

        let mut tx = store.begin().await.unwrap();
        let mut alice = tx.lock_user(1).await.unwrap();
        alice.bio = Some("draft".into());
        tx.bind_ip(1, IP, now()).await.unwrap();
        tx.save_profile(&alice).await.unwrap();
        drop(tx);

        assert_eq!(count(&pool, "ip_records").await, 0);
        assert_eq!(count(&pool, "ip_owners").await, 0);
        assert_eq!(store.find_by_id(1).await.unwrap().bio, None);
    }

    #[sqlx::test(fixtures("../../fixtures/users.sql"))]
    async fn test_lock_waits_for_commit(pool: Pool<Postgres>) {
        let store = PgIdentityStore::new(pool);

        let mut tx = store.begin().await.unwrap();
        let mut alice = tx.lock_user(1).await.unwrap();

        let waiter = {
            let store = store.clone();
            tokio::spawn(async move {
                let mut tx = store.begin().await.unwrap();
                tx.lock_user(1).await.unwrap().bio
            })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;

        alice.bio = Some("first".into());
        tx.save_profile(&alice).await.unwrap();
        tx.commit().await.unwrap();

        // The second lock only returns once the first writer committed.
        assert_eq!(waiter.await.unwrap().as_deref(), Some("first"));
    }

    #[sqlx::test(fixtures("../../fixtures/users.sql"))]
    async fn test_save_email(pool: Pool<Postgres>) {
        let store = PgIdentityStore::new(pool);

        let alice = store.save_email(1, "alice@example.com", now()).await.unwrap();
        assert_eq!(alice.email.as_deref(), Some("alice@example.com"));
        assert_eq!(alice.email_verified_at, Some(now()));
        assert_eq!(alice.nickname.as_deref(), Some("alice"));

        assert!(matches!(
            store.save_email(9, "ghost@example.com", now()).await,
            Err(ServerError::UserNotFound)
        ));
    }
}
