// SPDX-License-Identifier: MIT

//! API routes for authenticated users.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{HelpRequest, Session, UserProfile};
use crate::services::{CreateRequestInput, LifecycleEngine, RequestDecision};
use crate::AppState;
use axum::{
    extract::{Path, State},
    routing::{get, patch, post, put},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// API routes (require authentication via JWT).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/me", get(get_me))
        .route("/api/requests", post(create_request).get(get_requests))
        .route("/api/requests/{id}", patch(decide_request))
        .route("/api/sessions", get(list_sessions))
        .route("/api/sessions/{id}", get(get_session))
        .route("/api/sessions/{id}/meeting-place", put(set_meeting_place))
        .route("/api/sessions/{id}/finish", post(finish_session))
        .route("/api/ratings", post(submit_rating))
}

// ─── User Profile ────────────────────────────────────────────

/// Current user response.
#[derive(Serialize)]
pub struct UserResponse {
    pub email: String,
    pub name: String,
    pub image: Option<String>,
    pub can_teach: Vec<String>,
    pub wants_help_with: Vec<String>,
    pub rating_avg: f64,
    pub rating_count: u32,
}

/// Get current user profile, including the rating aggregate.
async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<UserResponse>> {
    let profile = state
        .db
        .get_user_profile(&user.email)
        .await?
        .unwrap_or_else(|| UserProfile::bare(&user.email));

    Ok(Json(UserResponse {
        email: profile.email,
        name: profile.name,
        image: profile.image,
        can_teach: profile.can_teach,
        wants_help_with: profile.wants_help_with,
        rating_avg: profile.rating_avg,
        rating_count: profile.rating_count,
    }))
}

// ─── Skill Label Decoration ──────────────────────────────────

/// Resolve catalog labels for a set of slugs. Slugs missing from the
/// catalog fall back to the slug itself so stale references still render.
async fn skill_labels(
    state: &AppState,
    slugs: impl Iterator<Item = String>,
) -> Result<HashMap<String, String>> {
    let unique: std::collections::HashSet<String> = slugs.collect();
    let mut labels = HashMap::with_capacity(unique.len());
    for slug in unique {
        let label = state
            .db
            .get_skill(&slug)
            .await?
            .map(|s| s.label)
            .unwrap_or_else(|| slug.clone());
        labels.insert(slug, label);
    }
    Ok(labels)
}

/// A request decorated with its skill's display label.
#[derive(Serialize)]
pub struct RequestView {
    #[serde(flatten)]
    pub request: HelpRequest,
    pub skill_label: String,
}

/// A session decorated with its skill's display label.
#[derive(Serialize)]
pub struct SessionView {
    #[serde(flatten)]
    pub session: Session,
    pub skill_label: String,
}

// ─── Requests ────────────────────────────────────────────────

#[derive(Deserialize)]
struct CreateRequestBody {
    to: String,
    skill_slug: String,
    message: Option<String>,
    time_window: Option<String>,
    format: Option<String>,
}

/// Send a help request to another user.
async fn create_request(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<CreateRequestBody>,
) -> Result<Json<HelpRequest>> {
    let engine = LifecycleEngine::new(state.db.clone());
    let request = engine
        .create_request(
            &user.email,
            CreateRequestInput {
                to: body.to,
                skill_slug: body.skill_slug,
                message: body.message,
                time_window: body.time_window,
                format: body.format,
            },
        )
        .await?;

    Ok(Json(request))
}

/// Inbox response: requests addressed to the caller and requests the
/// caller sent, both newest first.
#[derive(Serialize)]
pub struct InboxResponse {
    pub incoming: Vec<RequestView>,
    pub outgoing: Vec<RequestView>,
}

/// List the caller's incoming and outgoing requests.
async fn get_requests(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<InboxResponse>> {
    let incoming = state.db.get_requests_to(&user.email).await?;
    let outgoing = state.db.get_requests_from(&user.email).await?;

    let labels = skill_labels(
        &state,
        incoming
            .iter()
            .chain(outgoing.iter())
            .map(|r| r.skill_slug.clone()),
    )
    .await?;

    let decorate = |requests: Vec<HelpRequest>| {
        requests
            .into_iter()
            .map(|request| {
                let skill_label = labels
                    .get(&request.skill_slug)
                    .cloned()
                    .unwrap_or_else(|| request.skill_slug.clone());
                RequestView {
                    request,
                    skill_label,
                }
            })
            .collect()
    };

    Ok(Json(InboxResponse {
        incoming: decorate(incoming),
        outgoing: decorate(outgoing),
    }))
}

#[derive(Deserialize)]
struct DecideRequestBody {
    /// "accepted" or "rejected"
    status: String,
}

/// Response for a request decision.
#[derive(Serialize)]
pub struct DecideResponse {
    pub ok: bool,
    pub request: HelpRequest,
    /// Present when the request is (now or already) accepted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Accept or reject a pending request (receiver only).
async fn decide_request(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(body): Json<DecideRequestBody>,
) -> Result<Json<DecideResponse>> {
    let decision = RequestDecision::parse(&body.status)?;

    let engine = LifecycleEngine::new(state.db.clone());
    let outcome = engine.decide_request(&user.email, &id, decision).await?;

    Ok(Json(DecideResponse {
        ok: true,
        session_id: outcome.session.map(|s| s.id),
        request: outcome.request,
    }))
}

// ─── Sessions ────────────────────────────────────────────────

#[derive(Serialize)]
pub struct SessionsResponse {
    pub sessions: Vec<SessionView>,
}

/// List the caller's sessions, newest first.
async fn list_sessions(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<SessionsResponse>> {
    let sessions = state.db.get_sessions_for_user(&user.email).await?;

    let labels = skill_labels(&state, sessions.iter().map(|s| s.skill_slug.clone())).await?;

    let sessions = sessions
        .into_iter()
        .map(|session| {
            let skill_label = labels
                .get(&session.skill_slug)
                .cloned()
                .unwrap_or_else(|| session.skill_slug.clone());
            SessionView {
                session,
                skill_label,
            }
        })
        .collect();

    Ok(Json(SessionsResponse { sessions }))
}

/// Get one session. Participants only.
async fn get_session(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<SessionView>> {
    let session = state
        .db
        .get_session(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Session {} not found", id)))?;

    if session.role_of(&user.email).is_none() {
        return Err(AppError::Forbidden(
            "Not a participant of this session".to_string(),
        ));
    }

    let skill_label = state
        .db
        .get_skill(&session.skill_slug)
        .await?
        .map(|s| s.label)
        .unwrap_or_else(|| session.skill_slug.clone());

    Ok(Json(SessionView {
        session,
        skill_label,
    }))
}

#[derive(Deserialize)]
struct MeetingPlaceBody {
    value: String,
}

/// Set the meeting link/address (tutor only, active sessions only).
async fn set_meeting_place(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(body): Json<MeetingPlaceBody>,
) -> Result<Json<Session>> {
    let engine = LifecycleEngine::new(state.db.clone());
    let session = engine
        .set_meeting_place(&user.email, &id, &body.value)
        .await?;

    Ok(Json(session))
}

/// Signal that the caller considers the session finished. When both
/// participants have signaled, the session completes.
async fn finish_session(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<Session>> {
    let engine = LifecycleEngine::new(state.db.clone());
    let session = engine.finish_session(&user.email, &id).await?;

    Ok(Json(session))
}

// ─── Ratings ─────────────────────────────────────────────────

#[derive(Deserialize)]
struct RatingBody {
    session_id: String,
    to_user: String,
    rating: i64,
}

#[derive(Serialize)]
pub struct RatingResponse {
    pub ok: bool,
}

/// Rate the tutor for a completed session (requester only, once).
async fn submit_rating(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<RatingBody>,
) -> Result<Json<RatingResponse>> {
    let engine = LifecycleEngine::new(state.db.clone());
    engine
        .submit_rating(&user.email, &body.session_id, &body.to_user, body.rating)
        .await?;

    Ok(Json(RatingResponse { ok: true }))
}
