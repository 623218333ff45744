//! Reviewer verdicts and their effect on review state and error counters.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::user::{Category, Document, ErrorWindow, ReviewStatus, User};

/// Outcome of a review.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Approve,
    Reject,
}

impl Verdict {
    fn status(self) -> ReviewStatus {
        match self {
            Verdict::Approve => ReviewStatus::Ok,
            Verdict::Reject => ReviewStatus::Failed,
        }
    }
}

/// One verdict per identity document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentVerdicts {
    pub id_front_img: Verdict,
    pub id_reverse_img: Verdict,
    pub self_photo_img: Verdict,
}

impl DocumentVerdicts {
    pub fn get(&self, document: Document) -> Verdict {
        match document {
            Document::SelfPhoto => self.self_photo_img,
            Document::IdFront => self.id_front_img,
            Document::IdReverse => self.id_reverse_img,
        }
    }
}

/// Mark the profile as verified at `now`.
pub fn approve_profile(user: &mut User, now: NaiveDateTime) {
    user.profile_status = ReviewStatus::Ok;
    user.profile_verified_at = Some(now);
}

/// Apply a reviewer verdict to a pending profile.
pub fn review_profile(user: &mut User, verdict: Verdict, now: NaiveDateTime) {
    match verdict {
        Verdict::Approve => approve_profile(user, now),
        Verdict::Reject => {
            user.profile_status = ReviewStatus::Failed;
            user.profile_verified_at = None;
            record_error(user, Category::Profile, now);
        },
    }
}

/// Apply per-document verdicts to a pending identity. The record is verified
/// only when every document is approved.
pub fn review_identity(
    user: &mut User,
    verdicts: DocumentVerdicts,
    now: NaiveDateTime,
) {
    for document in Document::ALL {
        user.set_document_status(document, verdicts.get(document).status());
    }

    let approved = Document::ALL
        .iter()
        .all(|document| verdicts.get(*document) == Verdict::Approve);
    if approved {
        user.identity_status = ReviewStatus::Ok;
        user.identity_verified_at = Some(now);
    } else {
        user.identity_status = ReviewStatus::Failed;
        user.identity_verified_at = None;
        record_error(user, Category::Identity, now);
    }
}

/// Count a rejection. The counter restarts when the previous one happened
/// on another calendar day.
fn record_error(user: &mut User, category: Category, now: NaiveDateTime) {
    let previous = user.errors(category);
    let count = match previous.last_at {
        Some(at) if at.date() == now.date() => previous.count + 1,
        _ => 1,
    };

    user.set_errors(
        category,
        ErrorWindow {
            count,
            last_at: Some(now),
        },
    );
}
