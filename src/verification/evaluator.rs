//! Compute the state a submission leads to.
//!
//! Pure functions: uniqueness and throttling are checked beforehand and
//! images are already stored.

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::storage::is_inline_image;
use crate::user::{Document, ReviewStatus, User};
use crate::verification::review::approve_profile;
use crate::verification::{IdentitySubmission, ProfileSubmission};

/// What happened to an accepted profile update.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileOutcome {
    /// A reviewer must look at the profile.
    PendingReview,
    /// Only the avatar changed, the profile is verified right away.
    AutoApproved,
}

impl ProfileOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileOutcome::PendingReview => "pending_review",
            ProfileOutcome::AutoApproved => "auto_approved",
        }
    }
}

/// New profile state of a user.
#[derive(Clone, Debug, PartialEq)]
pub struct ProfileDecision {
    pub user: User,
    pub outcome: ProfileOutcome,
}

/// Final URL of every identity document.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StoredDocuments {
    pub self_photo_img: String,
    pub id_front_img: String,
    pub id_reverse_img: String,
}

impl StoredDocuments {
    pub(crate) fn set(&mut self, document: Document, url: String) {
        match document {
            Document::SelfPhoto => self.self_photo_img = url,
            Document::IdFront => self.id_front_img = url,
            Document::IdReverse => self.id_reverse_img = url,
        }
    }

    fn take(&mut self, document: Document) -> String {
        match document {
            Document::SelfPhoto => std::mem::take(&mut self.self_photo_img),
            Document::IdFront => std::mem::take(&mut self.id_front_img),
            Document::IdReverse => std::mem::take(&mut self.id_reverse_img),
        }
    }
}

/// Stored and submitted values are equal. Missing and empty are the same.
fn same(stored: &Option<String>, submitted: Option<&str>) -> bool {
    stored.as_deref().unwrap_or_default() == submitted.unwrap_or_default()
}

fn is_set(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.is_empty())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Every field but the avatar is unchanged, and the avatar did change.
pub fn only_avatar_changed(user: &User, submission: &ProfileSubmission) -> bool {
    same(&user.nickname, Some(submission.nickname.as_str()))
        && same(&user.bio, submission.bio.as_deref())
        && same(&user.phone_number, Some(submission.phone_number.as_str()))
        && same(&user.facebook, submission.facebook.as_deref())
        && same(&user.telegram, submission.telegram.as_deref())
        && same(&user.wechat, submission.wechat.as_deref())
        && same(&user.skype, submission.skype.as_deref())
        && same(&user.whatsapp, submission.whatsapp.as_deref())
        && same(&user.line, submission.line.as_deref())
        && same(&user.zalo, submission.zalo.as_deref())
        && !same(&user.avatar, Some(submission.avatar.as_str()))
}

/// Apply a profile update.
///
/// Nickname and phone number are write-once: a value already set is kept
/// and the submitted one silently dropped. An avatar-only change skips the
/// review; anything else sends the profile back to review.
pub fn evaluate_profile(
    user: &User,
    submission: ProfileSubmission,
    avatar_url: String,
    now: NaiveDateTime,
) -> ProfileDecision {
    let avatar_only = only_avatar_changed(user, &submission);
    let mut updated = user.clone();

    if !is_set(&updated.nickname) {
        updated.nickname = Some(submission.nickname);
    }
    if !is_set(&updated.phone_number) {
        updated.phone_number = Some(submission.phone_number);
    }
    updated.avatar = Some(avatar_url);
    updated.bio = non_empty(submission.bio);
    updated.facebook = non_empty(submission.facebook);
    updated.telegram = non_empty(submission.telegram);
    updated.wechat = non_empty(submission.wechat);
    updated.skype = non_empty(submission.skype);
    updated.whatsapp = non_empty(submission.whatsapp);
    updated.line = non_empty(submission.line);
    updated.zalo = non_empty(submission.zalo);

    let outcome = if avatar_only {
        approve_profile(&mut updated, now);
        ProfileOutcome::AutoApproved
    } else {
        updated.profile_status = ReviewStatus::Waiting;
        updated.profile_verified_at = None;
        ProfileOutcome::PendingReview
    };

    ProfileDecision {
        user: updated,
        outcome,
    }
}

/// Apply an identity update.
///
/// The record always goes back to review. A document rejected earlier is
/// queued again only when a fresh inline image replaces it; other document
/// statuses are left as they are.
pub fn evaluate_identity(
    user: &User,
    submission: IdentitySubmission,
    mut stored: StoredDocuments,
) -> User {
    let mut updated = user.clone();

    for document in Document::ALL {
        if user.document_status(document) == ReviewStatus::Failed
            && is_inline_image(submission.document(document))
        {
            updated.set_document_status(document, ReviewStatus::Waiting);
        }
        updated.set_document(document, stored.take(document));
    }

    updated.full_name = Some(submission.full_name);
    updated.id_no = Some(submission.id_no);
    updated.country = Some(submission.country);
    updated.city = Some(submission.city);
    updated.identity_status = ReviewStatus::Waiting;
    updated.identity_verified_at = None;

    updated
}
