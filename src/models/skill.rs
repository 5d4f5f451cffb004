// SPDX-License-Identifier: MIT

//! Skill catalog entry, managed elsewhere and read here for display.

use serde::{Deserialize, Serialize};

/// Catalog entry stored in Firestore, keyed by slug.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Skill {
    /// Canonical key; the only thing other documents store
    pub slug: String,
    /// Human-readable label, display only
    pub label: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub active: bool,
}
