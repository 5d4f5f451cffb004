// SPDX-License-Identifier: MIT

//! Session lifecycle engine.
//!
//! The one piece of this system with real invariants: the state machine
//! that turns a help request into a session and walks it to a rated
//! completion.
//!
//! Request:  pending --accept(to)--> accepted (creates/reuses session)
//!           pending --reject(to)--> rejected
//! Session:  active --finish(from) + finish(to)--> completed
//!           completed --rate(from, once)--> rated
//!
//! Validation ordering and permission checks live here; the actual
//! multi-document writes run as Firestore transactions in the db layer.

use crate::db::FirestoreDb;
use crate::error::{AppError, Result};
use crate::models::{
    identity_eq, HelpRequest, MeetingFormat, RequestStatus, Role, Session, SessionStatus,
};
use crate::time_utils::now_rfc3339;

/// Maximum trimmed length of a meeting place value.
const MEETING_PLACE_MAX_LEN: usize = 500;

/// Tutor decision on a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestDecision {
    Accepted,
    Rejected,
}

impl RequestDecision {
    /// Parse a client-supplied decision string.
    pub fn parse(raw: &str) -> Result<Self> {
        match raw {
            "accepted" => Ok(RequestDecision::Accepted),
            "rejected" => Ok(RequestDecision::Rejected),
            _ => Err(AppError::BadRequest(format!(
                "Invalid decision '{}': must be 'accepted' or 'rejected'",
                raw
            ))),
        }
    }
}

/// Input for creating a request.
#[derive(Debug, Clone)]
pub struct CreateRequestInput {
    pub to: String,
    pub skill_slug: String,
    pub message: Option<String>,
    pub time_window: Option<String>,
    pub format: Option<String>,
}

/// Result of deciding a request.
#[derive(Debug, Clone)]
pub struct DecisionOutcome {
    pub request: HelpRequest,
    /// Present when the decision was (or already had been) an accept
    pub session: Option<Session>,
}

/// Orchestrates the request/session/rating state machine.
pub struct LifecycleEngine {
    db: FirestoreDb,
}

impl LifecycleEngine {
    pub fn new(db: FirestoreDb) -> Self {
        Self { db }
    }

    /// Create a new pending request from `actor` to another user.
    pub async fn create_request(
        &self,
        actor: &str,
        input: CreateRequestInput,
    ) -> Result<HelpRequest> {
        let to = input.to.trim().to_lowercase();
        let skill_slug = input.skill_slug.trim().to_string();

        if to.is_empty() || skill_slug.is_empty() {
            return Err(AppError::BadRequest(
                "Missing 'to' or 'skill_slug'".to_string(),
            ));
        }
        if identity_eq(&to, actor) {
            return Err(AppError::BadRequest("Cannot request yourself".to_string()));
        }

        let now = now_rfc3339();
        let request = HelpRequest {
            id: uuid::Uuid::new_v4().to_string(),
            from: actor.to_lowercase(),
            to,
            skill_slug,
            message: input
                .message
                .as_deref()
                .map(str::trim)
                .unwrap_or_default()
                .to_string(),
            time_window: input.time_window.unwrap_or_default(),
            format: MeetingFormat::from_input(input.format.as_deref()),
            status: RequestStatus::Pending,
            session_id: None,
            created_at: now.clone(),
            updated_at: now,
        };

        self.db.set_request(&request).await?;

        tracing::info!(
            request_id = %request.id,
            from = %request.from,
            to = %request.to,
            skill = %request.skill_slug,
            "Request created"
        );

        Ok(request)
    }

    /// Accept or reject a pending request. Only the receiving (tutor)
    /// party may decide. Accept is idempotent: retries return the same
    /// session without creating a duplicate.
    pub async fn decide_request(
        &self,
        actor: &str,
        request_id: &str,
        decision: RequestDecision,
    ) -> Result<DecisionOutcome> {
        let request = self
            .db
            .get_request(request_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Request {} not found", request_id)))?;

        // Only the receiver (tutor) can accept/reject
        if !request.is_receiver(actor) {
            return Err(AppError::Forbidden(
                "Only the receiving user can decide this request".to_string(),
            ));
        }

        match decision {
            RequestDecision::Rejected => {
                let request = self.db.reject_request_atomic(request_id).await?;
                Ok(DecisionOutcome {
                    request,
                    session: None,
                })
            }
            RequestDecision::Accepted => {
                let (request, session) = self.db.accept_request_atomic(request_id).await?;
                Ok(DecisionOutcome {
                    request,
                    session: Some(session),
                })
            }
        }
    }

    /// Set the session's meeting place. Tutor only, active sessions only,
    /// value trimmed to 1..=500 chars. Full overwrite, not a merge.
    pub async fn set_meeting_place(
        &self,
        actor: &str,
        session_id: &str,
        value: &str,
    ) -> Result<Session> {
        let mut session = self
            .db
            .get_session(session_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Session {} not found", session_id)))?;

        match session.role_of(actor) {
            Some(Role::Tutor) => {}
            Some(Role::Requester) => {
                return Err(AppError::Forbidden(
                    "Only the tutor can set meeting details".to_string(),
                ));
            }
            None => {
                return Err(AppError::Forbidden(
                    "Not a participant of this session".to_string(),
                ));
            }
        }

        if session.status != SessionStatus::Active {
            return Err(AppError::Conflict("session already completed".to_string()));
        }

        let value = value.trim();
        if value.is_empty() || value.chars().count() > MEETING_PLACE_MAX_LEN {
            return Err(AppError::BadRequest(format!(
                "Meeting value must be 1..={} characters",
                MEETING_PLACE_MAX_LEN
            )));
        }

        session.set_meeting_place(value.to_string(), actor, &now_rfc3339());
        self.db.set_session(&session).await?;

        tracing::info!(session_id, tutor = %session.to, "Meeting place updated");

        Ok(session)
    }

    /// Record a finish signal from either participant. Completion happens
    /// atomically when the second flag lands; finishing a completed
    /// session is a harmless no-op.
    pub async fn finish_session(&self, actor: &str, session_id: &str) -> Result<Session> {
        let session = self
            .db
            .get_session(session_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Session {} not found", session_id)))?;

        let role = session.role_of(actor).ok_or_else(|| {
            AppError::Forbidden("Not a participant of this session".to_string())
        })?;

        self.db.finish_session_atomic(session_id, role).await
    }

    /// Submit the requester's one-time rating of the tutor.
    ///
    /// Validation is ordered and fail-fast; a failure applies none of the
    /// three effects (rating insert, aggregate update, `rated` flag).
    pub async fn submit_rating(
        &self,
        actor: &str,
        session_id: &str,
        to_user: &str,
        rating: i64,
    ) -> Result<()> {
        // Input shape first, before touching storage
        if !(1..=5).contains(&rating) {
            return Err(AppError::BadRequest(
                "Rating must be an integer from 1 to 5".to_string(),
            ));
        }
        let to_user = to_user.trim();
        if session_id.trim().is_empty() || to_user.is_empty() {
            return Err(AppError::BadRequest(
                "Missing 'session_id' or 'to_user'".to_string(),
            ));
        }

        let session = self
            .db
            .get_session(session_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Session {} not found", session_id)))?;

        // Requester-only rating, and must be rating the tutor
        if session.role_of(actor) != Some(Role::Requester) {
            return Err(AppError::Forbidden(
                "Only the requester can rate".to_string(),
            ));
        }
        if !identity_eq(to_user, &session.to) {
            return Err(AppError::BadRequest("Invalid target user".to_string()));
        }

        if !session.is_ratable() {
            return Err(AppError::Conflict("session not finished".to_string()));
        }

        if self.db.get_rating(session_id, actor).await?.is_some() {
            return Err(AppError::Conflict("already rated".to_string()));
        }

        // The transaction re-checks ratability and the duplicate fence
        // against fresh state before writing.
        self.db
            .submit_rating_atomic(session_id, actor, rating as u8)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_parsing() {
        assert_eq!(
            RequestDecision::parse("accepted").unwrap(),
            RequestDecision::Accepted
        );
        assert_eq!(
            RequestDecision::parse("rejected").unwrap(),
            RequestDecision::Rejected
        );
        assert!(matches!(
            RequestDecision::parse("maybe"),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            RequestDecision::parse("ACCEPTED"),
            Err(AppError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_rating_range_checked_before_storage() {
        // Offline mock: any storage access would error with Database, so
        // getting BadRequest proves validation ran first.
        let engine = LifecycleEngine::new(FirestoreDb::new_mock());

        for bad in [0, 6, -1, 100] {
            let err = engine
                .submit_rating("alice@example.com", "s1", "bob@example.com", bad)
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::BadRequest(_)), "rating {}", bad);
        }
    }

    #[tokio::test]
    async fn test_empty_rating_target_checked_before_storage() {
        let engine = LifecycleEngine::new(FirestoreDb::new_mock());

        let err = engine
            .submit_rating("alice@example.com", "s1", "  ", 4)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_self_request_rejected_before_storage() {
        let engine = LifecycleEngine::new(FirestoreDb::new_mock());

        let err = engine
            .create_request(
                "alice@example.com",
                CreateRequestInput {
                    to: "Alice@Example.com".to_string(),
                    skill_slug: "algebra".to_string(),
                    message: None,
                    time_window: None,
                    format: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
