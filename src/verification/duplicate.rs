//! Uniqueness checks run inside the submission transaction.
//!
//! These give precise errors early. The storage unique constraints stay the
//! authoritative guard against concurrent submissions.

use crate::error::{Result, ServerError};
use crate::user::IdentityTransaction;
use crate::verification::ProfileSubmission;

/// Reject a profile whose nickname or phone number belongs to another user.
/// Nickname is checked first.
pub async fn check_profile(
    tx: &mut dyn IdentityTransaction,
    user_id: i64,
    submission: &ProfileSubmission,
) -> Result<()> {
    if tx.nickname_taken(&submission.nickname, user_id).await? {
        return Err(ServerError::DuplicateNickname);
    }

    if tx.phone_number_taken(&submission.phone_number, user_id).await? {
        return Err(ServerError::DuplicatePhone);
    }

    Ok(())
}

/// Reject a submission from an IP address bound to another user.
pub async fn check_ip(
    tx: &mut dyn IdentityTransaction,
    user_id: i64,
    ip_address: &str,
) -> Result<()> {
    if tx.ip_bound_elsewhere(ip_address, user_id).await? {
        return Err(ServerError::DuplicateIpBinding);
    }

    Ok(())
}

/// Reject an ID number registered by another user.
pub async fn check_id_no(
    tx: &mut dyn IdentityTransaction,
    user_id: i64,
    id_no: &str,
) -> Result<()> {
    if tx.id_no_taken(id_no, user_id).await? {
        return Err(ServerError::DuplicateIdNumber);
    }

    Ok(())
}
