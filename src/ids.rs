//! Client-side id generation.
//!
//! Ids are generated before the row reaches the backend so an optimistic
//! message can be matched against its realtime echo.

use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use uuid::Uuid;

/// `len` random lowercase alphanumerics
pub fn random_suffix(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(|byte| (byte as char).to_ascii_lowercase())
        .collect()
}

/// Chat message id: unix millis plus 8 hex chars of a v4 uuid
pub fn message_id() -> String {
    let entropy = Uuid::new_v4().simple().to_string();
    format!("{}-{}", Utc::now().timestamp_millis(), &entropy[..8])
}

pub fn system_message_id() -> String {
    format!("sys_{}_{}", Utc::now().timestamp_millis(), random_suffix(4))
}

pub fn group_id() -> String {
    format!("group_{}", random_suffix(5))
}

pub fn guest_id() -> String {
    format!("guest_{}", random_suffix(9))
}

pub fn social_id() -> String {
    format!("fb_{}", random_suffix(5))
}
