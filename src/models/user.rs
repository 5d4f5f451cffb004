// SPDX-License-Identifier: MIT

//! User profile model, including the rating aggregate.

use serde::{Deserialize, Serialize};

/// User profile stored in Firestore, keyed by lowercased email.
///
/// Identity provisioning and profile editing happen elsewhere; this
/// service reads profiles for display and owns only the rating aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    /// Email address (also used as document ID)
    pub email: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Profile picture URL
    #[serde(default)]
    pub image: Option<String>,
    /// Skill slugs this user offers to teach
    #[serde(default)]
    pub can_teach: Vec<String>,
    /// Skill slugs this user wants help with
    #[serde(default)]
    pub wants_help_with: Vec<String>,
    #[serde(default)]
    pub onboarding_completed: bool,
    /// Running average of received ratings
    #[serde(default)]
    pub rating_avg: f64,
    /// Number of ratings received
    #[serde(default)]
    pub rating_count: u32,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

impl UserProfile {
    /// A bare profile for a user we have no stored document for yet.
    ///
    /// Missing aggregate fields read as zero, matching documents written
    /// before ratings existed.
    pub fn bare(email: &str) -> Self {
        Self {
            email: email.to_lowercase(),
            name: String::new(),
            image: None,
            can_teach: Vec::new(),
            wants_help_with: Vec::new(),
            onboarding_completed: false,
            rating_avg: 0.0,
            rating_count: 0,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    /// Fold one new rating into the running average.
    pub fn apply_rating(&mut self, rating: u8, now: &str) {
        let old_count = self.rating_count;
        let new_count = old_count + 1;
        self.rating_avg =
            (self.rating_avg * f64::from(old_count) + f64::from(rating)) / f64::from(new_count);
        self.rating_count = new_count;
        self.updated_at = now.to_string();
    }
}
