// SPDX-License-Identifier: MIT

//! Public skill catalog routes.
//!
//! The catalog itself is maintained by an admin surface elsewhere; this
//! service only reads it, for dropdowns and to label slugs.

use crate::error::Result;
use crate::AppState;
use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/skills", get(get_skills))
}

#[derive(Serialize)]
pub struct SkillEntry {
    pub slug: String,
    pub label: String,
}

#[derive(Serialize)]
pub struct SkillsResponse {
    pub skills: Vec<SkillEntry>,
}

/// List active catalog entries (slug + label projection).
async fn get_skills(State(state): State<Arc<AppState>>) -> Result<Json<SkillsResponse>> {
    let skills = state
        .db
        .get_active_skills()
        .await?
        .into_iter()
        .map(|s| SkillEntry {
            slug: s.slug,
            label: s.label,
        })
        .collect();

    Ok(Json(SkillsResponse { skills }))
}
