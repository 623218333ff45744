//! Submission use cases.
//!
//! Each call runs in one store transaction holding the user's row lock:
//! either every write is committed or none is. Reviewer notifications are
//! sent after commit.

use std::sync::Arc;

use crate::clock::Clock;
use crate::error::{Result, ServerError};
use crate::notifier::Notifier;
use crate::storage::{AssetKind, BlobStorage};
use crate::user::{Category, Document, IdentityStore, ReviewStatus, User};
use crate::verification::evaluator::{
    self, ProfileDecision, ProfileOutcome, StoredDocuments,
};
use crate::verification::{
    DocumentVerdicts, IdentitySubmission, ProfileSubmission, ThrottleGuard,
    Verdict, duplicate, review,
};

const SUBMISSIONS_METRIC: &str = "verification_submissions_total";

/// Orchestrates profile and identity submissions and their reviews.
#[derive(Clone)]
pub struct VerificationWorkflow {
    store: Arc<dyn IdentityStore>,
    storage: Arc<dyn BlobStorage>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    throttle: ThrottleGuard,
}

impl VerificationWorkflow {
    /// Create a new [`VerificationWorkflow`].
    pub fn new(
        store: Arc<dyn IdentityStore>,
        storage: Arc<dyn BlobStorage>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            storage,
            notifier,
            clock,
            throttle: ThrottleGuard::default(),
        }
    }

    /// Update the number of rejected reviews allowed per day.
    pub fn max_daily_errors(mut self, max_daily_errors: i32) -> Self {
        self.throttle = ThrottleGuard::new(max_daily_errors);
        self
    }

    /// Find a user.
    pub async fn user(&self, user_id: i64) -> Result<User> {
        self.store.find_by_id(user_id).await
    }

    /// Submit a new public profile.
    pub async fn submit_profile(
        &self,
        user_id: i64,
        submission: ProfileSubmission,
    ) -> Result<ProfileOutcome> {
        let result = self.apply_profile(user_id, submission).await;
        let outcome = match &result {
            Ok(decision) => decision.outcome.as_str(),
            Err(err) => err.code(),
        };
        record_submission(Category::Profile, outcome);
        let decision = result?;

        tracing::info!(user_id, outcome, "profile submitted");
        if decision.outcome == ProfileOutcome::PendingReview {
            self.notifier.send_text(format!(
                "[{}] updated profile\nPlease check and verify",
                decision.user.display_name()
            ));
        }

        Ok(decision.outcome)
    }

    async fn apply_profile(
        &self,
        user_id: i64,
        submission: ProfileSubmission,
    ) -> Result<ProfileDecision> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let user = tx.lock_user(user_id).await?;

        self.throttle.check(Category::Profile, &user, now)?;
        duplicate::check_profile(&mut *tx, user_id, &submission).await?;

        let avatar = self
            .storage
            .store(&submission.avatar, AssetKind::Avatar)
            .await?;
        let decision = evaluator::evaluate_profile(&user, submission, avatar, now);

        tx.save_profile(&decision.user).await?;
        tx.commit().await?;

        Ok(decision)
    }

    /// Submit identity documents from `ip_address`.
    ///
    /// The IP address is bound to the user only if the submission is
    /// accepted.
    pub async fn submit_identity(
        &self,
        user_id: i64,
        submission: IdentitySubmission,
        ip_address: &str,
    ) -> Result<()> {
        let result = self.apply_identity(user_id, submission, ip_address).await;
        let outcome = match &result {
            Ok(_) => ProfileOutcome::PendingReview.as_str(),
            Err(err) => err.code(),
        };
        record_submission(Category::Identity, outcome);
        let user = result?;

        tracing::info!(user_id, "identity submitted");
        self.notifier.send_text(format!(
            "[{}] updated identity\nPlease check and verify",
            user.display_name()
        ));

        Ok(())
    }

    async fn apply_identity(
        &self,
        user_id: i64,
        submission: IdentitySubmission,
        ip_address: &str,
    ) -> Result<User> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let user = tx.lock_user(user_id).await?;

        self.throttle.check(Category::Identity, &user, now)?;
        duplicate::check_ip(&mut *tx, user_id, ip_address).await?;
        duplicate::check_id_no(&mut *tx, user_id, &submission.id_no).await?;

        let mut stored = StoredDocuments::default();
        for document in Document::ALL {
            let url = self
                .storage
                .store(submission.document(document), AssetKind::from(document))
                .await?;
            stored.set(document, url);
        }
        let updated = evaluator::evaluate_identity(&user, submission, stored);

        tx.bind_ip(user_id, ip_address, now).await?;
        tx.save_identity(&updated).await?;
        tx.commit().await?;

        Ok(updated)
    }

    /// Record a reviewer verdict on a pending profile.
    pub async fn review_profile(&self, user_id: i64, verdict: Verdict) -> Result<User> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let mut user = tx.lock_user(user_id).await?;

        if user.profile_status != ReviewStatus::Waiting {
            return Err(ServerError::NotPendingReview(Category::Profile));
        }
        review::review_profile(&mut user, verdict, now);

        tx.save_profile(&user).await?;
        tx.commit().await?;

        tracing::info!(user_id, ?verdict, "profile reviewed");
        Ok(user)
    }

    /// Record reviewer verdicts on a pending identity.
    pub async fn review_identity(
        &self,
        user_id: i64,
        verdicts: DocumentVerdicts,
    ) -> Result<User> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let mut user = tx.lock_user(user_id).await?;

        if user.identity_status != ReviewStatus::Waiting {
            return Err(ServerError::NotPendingReview(Category::Identity));
        }
        review::review_identity(&mut user, verdicts, now);

        tx.save_identity(&user).await?;
        tx.commit().await?;

        tracing::info!(user_id, status = user.identity_status.as_str(), "identity reviewed");
        Ok(user)
    }
}

fn record_submission(category: Category, outcome: &'static str) {
    metrics::counter!(
        SUBMISSIONS_METRIC,
        "category" => category.as_str(),
        "outcome" => outcome
    )
    .increment(1);
}
