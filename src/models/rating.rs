// SPDX-License-Identifier: MIT

//! Rating model: one evaluation of a tutor by a requester.

use serde::{Deserialize, Serialize};

/// Stored rating record.
///
/// Document ID is `{session_id}_{from_user}`, which makes the
/// one-rating-per-(session, rater) invariant a key constraint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rating {
    pub session_id: String,
    /// Rater (must equal the session's `from`)
    pub from_user: String,
    /// Rated tutor (must equal the session's `to`)
    pub to_user: String,
    /// Integer score in 1..=5
    pub rating: u8,
    pub created_at: String,
}

impl Rating {
    /// Deterministic document ID; the duplicate-submission fence.
    pub fn doc_id(session_id: &str, from_user: &str) -> String {
        format!("{}_{}", session_id, from_user.to_lowercase())
    }
}
