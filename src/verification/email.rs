//! Email ownership check with a one-time code.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use rand::Rng;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::clock::Clock;
use crate::error::{Result, ServerError};
use crate::mail::{Mailer, Template};
use crate::user::{IdentityStore, User};

/// Default lifetime of a code.
pub const DEFAULT_CODE_TTL: Duration = Duration::from_secs(15 * 60);

const CODE_MIN: u32 = 100_000;
const CODE_MAX: u32 = 999_999;

/// Ask for a code to be mailed to `email`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct EmailCodeRequest {
    #[validate(email(message = "Email must be formatted."))]
    pub email: String,
}

/// Prove ownership of `email`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct EmailCodeCheck {
    #[validate(email(message = "Email must be formatted."))]
    pub email: String,
    #[validate(range(min = 100000, max = 999999, message = "Code must have 6 digits."))]
    pub code: u32,
}

/// Pending codes and the verified-email write.
#[derive(Clone)]
pub struct EmailVerification {
    codes: Cache<String, u32>,
    store: Arc<dyn IdentityStore>,
    mailer: Arc<dyn Mailer>,
    clock: Arc<dyn Clock>,
}

impl EmailVerification {
    /// Create a new [`EmailVerification`] whose codes expire after `ttl`.
    pub fn new(
        store: Arc<dyn IdentityStore>,
        mailer: Arc<dyn Mailer>,
        clock: Arc<dyn Clock>,
        ttl: Duration,
    ) -> Self {
        Self {
            codes: Cache::builder().time_to_live(ttl).build(),
            store,
            mailer,
            clock,
        }
    }

    /// Mail a code to `email`. A live code is sent again rather than
    /// replaced.
    pub async fn send_code(&self, email: &str) -> Result<()> {
        let code = self
            .codes
            .get_with(email.to_owned(), async {
                OsRng.gen_range(CODE_MIN..=CODE_MAX)
            })
            .await;

        self.mailer.send(email, Template::EmailCode { code }).await?;
        tracing::info!("email code sent");

        Ok(())
    }

    /// Set `email` as the verified address of `user_id` if `code` matches.
    pub async fn verify(&self, user_id: i64, email: &str, code: u32) -> Result<User> {
        match self.codes.get(email).await {
            Some(expected) if expected == code => {},
            _ => return Err(ServerError::InvalidEmailCode),
        }

        let user = self.store.save_email(user_id, email, self.clock.now()).await?;
        self.codes.invalidate(email).await;
        tracing::info!(user_id, "email verified");

        Ok(user)
    }
}
