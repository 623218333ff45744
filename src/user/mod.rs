//! Account data subject to profile and identity verification.

#[cfg(test)]
pub mod memory;
mod postgres;
mod repository;

pub use postgres::*;
pub use repository::*;

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Review state of a whole record or of a single identity document.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub enum ReviewStatus {
    /// Nothing has been submitted yet.
    #[default]
    Init,
    /// Submitted and waiting for a reviewer.
    Waiting,
    #[serde(rename = "OK")]
    Ok,
    Failed,
}

impl ReviewStatus {
    /// Name as stored on database.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Init => "Init",
            ReviewStatus::Waiting => "Waiting",
            ReviewStatus::Ok => "OK",
            ReviewStatus::Failed => "Failed",
        }
    }
}

/// Stored status is not one of [`ReviewStatus`].
#[derive(Debug, thiserror::Error)]
#[error("unknown review status `{0}`")]
pub struct UnknownStatus(String);

impl TryFrom<String> for ReviewStatus {
    type Error = UnknownStatus;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "Init" => Ok(ReviewStatus::Init),
            "Waiting" => Ok(ReviewStatus::Waiting),
            "OK" => Ok(ReviewStatus::Ok),
            "Failed" => Ok(ReviewStatus::Failed),
            _ => Err(UnknownStatus(value)),
        }
    }
}

/// Kind of submission. Each one has its own review gate and its own
/// failed-attempt counter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Category {
    Profile,
    Identity,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Profile => "profile",
            Category::Identity => "identity",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One of the three images attached to an identity record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Document {
    SelfPhoto,
    IdFront,
    IdReverse,
}

impl Document {
    /// Every document, in processing order.
    pub const ALL: [Document; 3] =
        [Document::SelfPhoto, Document::IdFront, Document::IdReverse];

    pub fn as_str(&self) -> &'static str {
        match self {
            Document::SelfPhoto => "self_photo_img",
            Document::IdFront => "id_front_img",
            Document::IdReverse => "id_reverse_img",
        }
    }
}

/// Failed-attempt counter of one [`Category`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ErrorWindow {
    pub count: i32,
    pub last_at: Option<NaiveDateTime>,
}

/// User as saved on database.
///
/// Rows are created at registration; this service only ever updates the
/// verification columns.
#[derive(
    Clone, Debug, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow,
)]
pub struct User {
    pub id: i64,
    pub nickname: Option<String>,
    pub phone_number: Option<String>,
    pub avatar: Option<String>,
    pub bio: Option<String>,
    pub facebook: Option<String>,
    pub telegram: Option<String>,
    pub wechat: Option<String>,
    pub skype: Option<String>,
    pub whatsapp: Option<String>,
    pub line: Option<String>,
    pub zalo: Option<String>,
    #[sqlx(try_from = "String")]
    pub profile_status: ReviewStatus,
    pub profile_verified_at: Option<NaiveDateTime>,
    pub profile_error_count_today: i32,
    pub profile_error_last_at: Option<NaiveDateTime>,
    pub full_name: Option<String>,
    pub id_no: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub id_front_img: Option<String>,
    #[sqlx(try_from = "String")]
    pub id_front_img_status: ReviewStatus,
    pub id_reverse_img: Option<String>,
    #[sqlx(try_from = "String")]
    pub id_reverse_img_status: ReviewStatus,
    pub self_photo_img: Option<String>,
    #[sqlx(try_from = "String")]
    pub self_photo_img_status: ReviewStatus,
    #[sqlx(try_from = "String")]
    pub identity_status: ReviewStatus,
    pub identity_verified_at: Option<NaiveDateTime>,
    pub identity_error_count_today: i32,
    pub identity_error_last_at: Option<NaiveDateTime>,
    pub email: Option<String>,
    pub email_verified_at: Option<NaiveDateTime>,
}

impl User {
    /// Record-level status of `category`.
    pub fn status(&self, category: Category) -> ReviewStatus {
        match category {
            Category::Profile => self.profile_status,
            Category::Identity => self.identity_status,
        }
    }

    /// Failed-attempt counter of `category`.
    pub fn errors(&self, category: Category) -> ErrorWindow {
        match category {
            Category::Profile => ErrorWindow {
                count: self.profile_error_count_today,
                last_at: self.profile_error_last_at,
            },
            Category::Identity => ErrorWindow {
                count: self.identity_error_count_today,
                last_at: self.identity_error_last_at,
            },
        }
    }

    pub(crate) fn set_errors(&mut self, category: Category, window: ErrorWindow) {
        match category {
            Category::Profile => {
                self.profile_error_count_today = window.count;
                self.profile_error_last_at = window.last_at;
            },
            Category::Identity => {
                self.identity_error_count_today = window.count;
                self.identity_error_last_at = window.last_at;
            },
        }
    }

    /// Review status of a single identity document.
    pub fn document_status(&self, document: Document) -> ReviewStatus {
        match document {
            Document::SelfPhoto => self.self_photo_img_status,
            Document::IdFront => self.id_front_img_status,
            Document::IdReverse => self.id_reverse_img_status,
        }
    }

    pub(crate) fn set_document_status(
        &mut self,
        document: Document,
        status: ReviewStatus,
    ) {
        match document {
            Document::SelfPhoto => self.self_photo_img_status = status,
            Document::IdFront => self.id_front_img_status = status,
            Document::IdReverse => self.id_reverse_img_status = status,
        }
    }

    pub(crate) fn set_document(&mut self, document: Document, url: String) {
        let slot = match document {
            Document::SelfPhoto => &mut self.self_photo_img,
            Document::IdFront => &mut self.id_front_img,
            Document::IdReverse => &mut self.id_reverse_img,
        };
        *slot = Some(url);
    }

    /// Name shown to reviewers.
    pub fn display_name(&self) -> String {
        match self.nickname.as_deref() {
            Some(nickname) if !nickname.is_empty() => nickname.to_owned(),
            _ => format!("#{}", self.id),
        }
    }
}

/// Evidence that an identity submission came from `ip_address`.
///
/// Append-only: rows are never updated nor deleted.
#[derive(Clone, Debug, PartialEq, Serialize, sqlx::FromRow)]
pub struct IpRecord {
    pub id: i64,
    pub user_id: i64,
    pub ip_address: String,
    pub created_at: NaiveDateTime,
}
