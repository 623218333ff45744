//! Online-status markers.
//!
//! Best-effort only: entries vanish after their TTL and are lost on restart.

use std::time::Duration;

use moka::future::Cache;

/// Default lifetime of an online marker.
pub const DEFAULT_TTL: Duration = Duration::from_secs(70);

/// Recently active users.
#[derive(Clone)]
pub struct Presence {
    online: Cache<i64, ()>,
}

impl Presence {
    /// Create a new [`Presence`] whose markers expire after `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            online: Cache::builder().time_to_live(ttl).build(),
        }
    }

    /// Mark `user_id` as online for the configured TTL.
    pub async fn mark_online(&self, user_id: i64) {
        self.online.insert(user_id, ()).await;
    }

    /// Whether `user_id` was marked recently.
    pub async fn is_online(&self, user_id: i64) -> bool {
        self.online.get(&user_id).await.is_some()
    }
}

impl Default for Presence {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}
