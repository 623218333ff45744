//! Profile and identity verification rules.
//!
//! A submission goes through [`ThrottleGuard`], then [`duplicate`] checks,
//! then the pure [`evaluator`] computes the new state, and finally the
//! [`VerificationWorkflow`] persists it in one transaction.

pub mod duplicate;
pub mod email;
pub mod evaluator;
pub mod review;
pub mod throttle;
pub mod workflow;

pub use email::EmailVerification;
pub use review::{DocumentVerdicts, Verdict};
pub use throttle::ThrottleGuard;
pub use workflow::VerificationWorkflow;

use std::sync::LazyLock;

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::user::Document;

static PHONE_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\+?[0-9][0-9 ()\-]{3,30}$").expect("phone number pattern")
});

/// Check `value` looks like a phone number.
pub fn validate_phone_number(value: &str) -> Result<(), ValidationError> {
    if PHONE_NUMBER.is_match(value) {
        Ok(())
    } else {
        Err(ValidationError::new("phone_number"))
    }
}

/// Requested state of the public profile.
///
/// Every field is sent on each update, unchanged ones included.
#[derive(Clone, Debug, Default, PartialEq, Validate, Serialize, Deserialize)]
pub struct ProfileSubmission {
    #[validate(length(min = 1, message = "Avatar is required."))]
    pub avatar: String,
    #[validate(length(
        min = 2,
        max = 50,
        message = "Nickname must be 2 to 50 characters long."
    ))]
    pub nickname: String,
    #[validate(length(max = 255, message = "Biography must be 0 to 255 characters long."))]
    pub bio: Option<String>,
    #[validate(custom(
        function = "crate::verification::validate_phone_number",
        message = "Phone number must be formatted."
    ))]
    pub phone_number: String,
    #[validate(length(max = 100))]
    pub facebook: Option<String>,
    #[validate(length(max = 100))]
    pub telegram: Option<String>,
    #[validate(length(max = 100))]
    pub wechat: Option<String>,
    #[validate(length(max = 100))]
    pub skype: Option<String>,
    #[validate(length(max = 100))]
    pub whatsapp: Option<String>,
    #[validate(length(max = 100))]
    pub line: Option<String>,
    #[validate(length(max = 100))]
    pub zalo: Option<String>,
}

/// Identity (KYC) documents and personal data.
///
/// Images are either inline data or the URL of a previous upload.
#[derive(Clone, Debug, Default, PartialEq, Validate, Serialize, Deserialize)]
pub struct IdentitySubmission {
    #[validate(length(
        min = 1,
        max = 100,
        message = "Full name must be 1 to 100 characters long."
    ))]
    pub full_name: String,
    #[validate(length(
        min = 1,
        max = 64,
        message = "ID number must be 1 to 64 characters long."
    ))]
    pub id_no: String,
    #[validate(length(min = 1, max = 100))]
    pub country: String,
    #[validate(length(min = 1, max = 100))]
    pub city: String,
    #[validate(length(min = 1, message = "Front side of the ID is required."))]
    pub id_front_img: String,
    #[validate(length(min = 1, message = "Reverse side of the ID is required."))]
    pub id_reverse_img: String,
    #[validate(length(min = 1, message = "Selfie is required."))]
    pub self_photo_img: String,
}

impl IdentitySubmission {
    /// Submitted value of `document`.
    pub fn document(&self, document: Document) -> &str {
        match document {
            Document::SelfPhoto => &self.self_photo_img,
            Document::IdFront => &self.id_front_img,
            Document::IdReverse => &self.id_reverse_img,
        }
    }
}
