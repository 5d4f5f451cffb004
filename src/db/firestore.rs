// SPDX-License-Identifier: MIT

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Users (profiles with the rating aggregate)
//! - Skills (catalog entries, read-only here)
//! - Requests (help requests between two users)
//! - Sessions (active/completed help encounters)
//! - Ratings (one per session+rater)
//!
//! The lifecycle state transitions (accept, reject, finish, rate) run
//! through [`firestore::FirestoreDb::run_transaction`]: reads inside the
//! closure go through the transaction's consistency selector, so each
//! transition is a true read-modify-write against the authoritative
//! document state, with automatic retry when a concurrent commit aborts
//! the transaction.

use crate::db::collections;
use crate::error::AppError;
use crate::models::{
    HelpRequest, Rating, RequestStatus, Role, Session, SessionStatus, Skill, UserProfile,
};
use crate::time_utils::now_rfc3339;
use firestore::errors::{BackoffError, FirestoreError};
use futures_util::FutureExt;

/// Classify a Firestore error raised inside a transaction closure.
/// Retryable errors (aborted commits, transient unavailability) feed the
/// backoff loop; everything else ends the transaction.
fn txn_db_err(err: FirestoreError) -> BackoffError<AppError> {
    match &err {
        FirestoreError::DatabaseError(db_err) if db_err.retry_possible => {
            BackoffError::transient(AppError::Database(err.to_string()))
        }
        _ => BackoffError::permanent(AppError::Database(err.to_string())),
    }
}

/// Recover the business error carried out of a failed transaction.
fn unwrap_txn_err(err: FirestoreError) -> AppError {
    match err {
        FirestoreError::ErrorInTransaction(details) => {
            match details.source.downcast::<AppError>() {
                Ok(app_err) => *app_err,
                Err(source) => AppError::Database(source.to_string()),
            }
        }
        other => AppError::Database(other.to_string()),
    }
}

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        // If the emulator environment variable is set, use unauthenticated connection
        // to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        // Use ExternalJwtFunctionSource to provide a dummy token without needing async-trait
        // or a custom TokenSource implementation struct.
        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a mock Firestore client for testing (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    // ─── User Operations ─────────────────────────────────────────

    /// Get a user profile by email (lowercased before lookup).
    pub async fn get_user_profile(&self, email: &str) -> Result<Option<UserProfile>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::USERS)
            .obj()
            .one(&email.to_lowercase())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create or update a user profile.
    pub async fn upsert_user_profile(&self, profile: &UserProfile) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::USERS)
            .document_id(profile.email.to_lowercase())
            .object(profile)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    // ─── Skill Catalog Operations ────────────────────────────────

    /// Get a single catalog entry by slug.
    pub async fn get_skill(&self, slug: &str) -> Result<Option<Skill>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::SKILLS)
            .obj()
            .one(slug)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Get all active catalog entries.
    pub async fn get_active_skills(&self) -> Result<Vec<Skill>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::SKILLS)
            .filter(|q| q.for_all([q.field("active").eq(true)]))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    // ─── Request Operations ──────────────────────────────────────

    /// Get a request by ID.
    pub async fn get_request(&self, request_id: &str) -> Result<Option<HelpRequest>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::REQUESTS)
            .obj()
            .one(request_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Store a request (create or overwrite).
    pub async fn set_request(&self, request: &HelpRequest) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::REQUESTS)
            .document_id(&request.id)
            .object(request)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Get requests addressed to a user, newest first.
    pub async fn get_requests_to(&self, email: &str) -> Result<Vec<HelpRequest>, AppError> {
        self.requests_by_field("to", email).await
    }

    /// Get requests sent by a user, newest first.
    pub async fn get_requests_from(&self, email: &str) -> Result<Vec<HelpRequest>, AppError> {
        self.requests_by_field("from", email).await
    }

    async fn requests_by_field(
        &self,
        field: &str,
        email: &str,
    ) -> Result<Vec<HelpRequest>, AppError> {
        let email = email.to_lowercase();
        let field = field.to_string();
        self.get_client()?
            .fluent()
            .select()
            .from(collections::REQUESTS)
            .filter(move |q| q.for_all([q.field(&field).eq(email.clone())]))
            .order_by([(
                "created_at",
                firestore::FirestoreQueryDirection::Descending,
            )])
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    // ─── Session Operations ──────────────────────────────────────

    /// Get a session by ID.
    pub async fn get_session(&self, session_id: &str) -> Result<Option<Session>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::SESSIONS)
            .obj()
            .one(session_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Get all sessions a user participates in, newest first.
    ///
    /// Firestore cannot OR across two fields in one query, so this runs
    /// one query per role and merges.
    pub async fn get_sessions_for_user(&self, email: &str) -> Result<Vec<Session>, AppError> {
        let mut sessions = self.sessions_by_field("from", email).await?;
        sessions.extend(self.sessions_by_field("to", email).await?);
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    async fn sessions_by_field(&self, field: &str, email: &str) -> Result<Vec<Session>, AppError> {
        let email = email.to_lowercase();
        let field = field.to_string();
        self.get_client()?
            .fluent()
            .select()
            .from(collections::SESSIONS)
            .filter(move |q| q.for_all([q.field(&field).eq(email.clone())]))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Store a session (create or overwrite).
    pub async fn set_session(&self, session: &Session) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::SESSIONS)
            .document_id(&session.id)
            .object(session)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    // ─── Rating Operations ───────────────────────────────────────

    /// Get the rating for a (session, rater) pair, if any.
    pub async fn get_rating(
        &self,
        session_id: &str,
        from_user: &str,
    ) -> Result<Option<Rating>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::RATINGS)
            .obj()
            .one(&Rating::doc_id(session_id, from_user))
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    // ─── Atomic Lifecycle Transitions ────────────────────────────

    /// Atomically accept a request: create or reuse its session, then mark
    /// the request accepted with the session id stored on it.
    ///
    /// Idempotent under retry: a second accept finds the session via the
    /// request's `session_id` and returns it without creating a duplicate.
    /// Returns the updated request and its session.
    pub async fn accept_request_atomic(
        &self,
        request_id: &str,
    ) -> Result<(HelpRequest, Session), AppError> {
        let client = self.get_client()?;
        let request_id = request_id.to_string();

        let (request, session, created) = client
            .run_transaction(|db, transaction| {
                let request_id = request_id.clone();
                async move {
                    let now = now_rfc3339();

                    let request: HelpRequest = db
                        .fluent()
                        .select()
                        .by_id_in(collections::REQUESTS)
                        .obj()
                        .one(&request_id)
                        .await
                        .map_err(txn_db_err)?
                        .ok_or_else(|| {
                            BackoffError::permanent(AppError::NotFound(format!(
                                "Request {} not found",
                                request_id
                            )))
                        })?;

                    if request.status == RequestStatus::Rejected {
                        return Err(BackoffError::permanent(AppError::Conflict(
                            "request already rejected".to_string(),
                        )));
                    }

                    // Reuse the session referenced by the request, if it resolves
                    let existing: Option<Session> = match request.session_id.as_deref() {
                        Some(sid) if !sid.is_empty() => db
                            .fluent()
                            .select()
                            .by_id_in(collections::SESSIONS)
                            .obj()
                            .one(sid)
                            .await
                            .map_err(txn_db_err)?,
                        _ => None,
                    };

                    if let Some(session) = existing {
                        if request.status == RequestStatus::Accepted {
                            // Retried accept: nothing to write
                            return Ok((request, session, false));
                        }

                        // Accepted session exists but the request status was
                        // never flipped (crash between writes): finish the
                        // request update.
                        let mut updated = request;
                        updated.status = RequestStatus::Accepted;
                        updated.session_id = Some(session.id.clone());
                        updated.updated_at = now;
                        db.fluent()
                            .update()
                            .in_col(collections::REQUESTS)
                            .document_id(&updated.id)
                            .object(&updated)
                            .add_to_transaction(transaction)
                            .map_err(txn_db_err)?;
                        return Ok((updated, session, false));
                    }

                    // No session yet: create one and point the request at it
                    let session =
                        Session::from_request(uuid::Uuid::new_v4().to_string(), &request, &now);

                    let mut updated = request;
                    updated.status = RequestStatus::Accepted;
                    updated.session_id = Some(session.id.clone());
                    updated.updated_at = now;

                    db.fluent()
                        .update()
                        .in_col(collections::SESSIONS)
                        .document_id(&session.id)
                        .object(&session)
                        .add_to_transaction(transaction)
                        .map_err(txn_db_err)?;
                    db.fluent()
                        .update()
                        .in_col(collections::REQUESTS)
                        .document_id(&updated.id)
                        .object(&updated)
                        .add_to_transaction(transaction)
                        .map_err(txn_db_err)?;

                    Ok((updated, session, true))
                }
                .boxed()
            })
            .await
            .map_err(unwrap_txn_err)?;

        if created {
            tracing::info!(
                request_id = %request.id,
                session_id = %session.id,
                from = %session.from,
                to = %session.to,
                "Request accepted, session created"
            );
        } else {
            tracing::debug!(
                request_id = %request.id,
                session_id = %session.id,
                "Request already accepted (idempotent skip)"
            );
        }

        Ok((request, session))
    }

    /// Atomically reject a request. Only a `pending` request transitions;
    /// a repeat reject is a no-op and rejecting an accepted request is a
    /// conflict. The status check runs against the in-transaction state,
    /// so a racing accept can never be overwritten.
    pub async fn reject_request_atomic(&self, request_id: &str) -> Result<HelpRequest, AppError> {
        let client = self.get_client()?;
        let request_id = request_id.to_string();

        let (request, changed) = client
            .run_transaction(|db, transaction| {
                let request_id = request_id.clone();
                async move {
                    let request: HelpRequest = db
                        .fluent()
                        .select()
                        .by_id_in(collections::REQUESTS)
                        .obj()
                        .one(&request_id)
                        .await
                        .map_err(txn_db_err)?
                        .ok_or_else(|| {
                            BackoffError::permanent(AppError::NotFound(format!(
                                "Request {} not found",
                                request_id
                            )))
                        })?;

                    match request.status {
                        RequestStatus::Rejected => {
                            // Terminal already; repeat reject is harmless
                            return Ok((request, false));
                        }
                        RequestStatus::Accepted => {
                            return Err(BackoffError::permanent(AppError::Conflict(
                                "request already accepted".to_string(),
                            )));
                        }
                        RequestStatus::Pending => {}
                    }

                    let mut updated = request;
                    updated.status = RequestStatus::Rejected;
                    updated.updated_at = now_rfc3339();

                    db.fluent()
                        .update()
                        .in_col(collections::REQUESTS)
                        .document_id(&updated.id)
                        .object(&updated)
                        .add_to_transaction(transaction)
                        .map_err(txn_db_err)?;

                    Ok((updated, true))
                }
                .boxed()
            })
            .await
            .map_err(unwrap_txn_err)?;

        if changed {
            tracing::info!(request_id = %request.id, "Request rejected");
        }

        Ok(request)
    }

    /// Atomically record a finish signal and, when both participants have
    /// finished, perform the completion transition.
    ///
    /// The flag write and the both-finished check happen in one
    /// transaction against the transactionally read document, so
    /// concurrent finishes cannot each miss the other's flag: one commit
    /// aborts, retries against the updated state, and exactly one commit
    /// performs the transition. Finishing an already-completed session is
    /// a no-op that returns the session unchanged.
    pub async fn finish_session_atomic(
        &self,
        session_id: &str,
        role: Role,
    ) -> Result<Session, AppError> {
        let client = self.get_client()?;
        let session_id = session_id.to_string();

        let (session, completed) = client
            .run_transaction(|db, transaction| {
                let session_id = session_id.clone();
                async move {
                    let mut session: Session = db
                        .fluent()
                        .select()
                        .by_id_in(collections::SESSIONS)
                        .obj()
                        .one(&session_id)
                        .await
                        .map_err(txn_db_err)?
                        .ok_or_else(|| {
                            BackoffError::permanent(AppError::NotFound(format!(
                                "Session {} not found",
                                session_id
                            )))
                        })?;

                    if session.status == SessionStatus::Completed {
                        // Finish on a completed session is a no-op
                        return Ok::<_, BackoffError<AppError>>((session, false));
                    }

                    let completed = session.record_finish(role, &now_rfc3339());

                    db.fluent()
                        .update()
                        .in_col(collections::SESSIONS)
                        .document_id(&session.id)
                        .object(&session)
                        .add_to_transaction(transaction)
                        .map_err(txn_db_err)?;

                    Ok((session, completed))
                }
                .boxed()
            })
            .await
            .map_err(unwrap_txn_err)?;

        if completed {
            tracing::info!(
                session_id = %session.id,
                "Both participants finished, session completed"
            );
        }

        Ok(session)
    }

    /// Atomically record a rating: insert the rating document, fold it
    /// into the tutor's aggregate, and flip the session's `rated` flag.
    ///
    /// The ratability check, the duplicate fence, and the aggregate read
    /// all run against the in-transaction state; the deterministic rating
    /// document id makes the duplicate check a key constraint. A failed
    /// check writes nothing.
    pub async fn submit_rating_atomic(
        &self,
        session_id: &str,
        from_user: &str,
        rating: u8,
    ) -> Result<(), AppError> {
        let client = self.get_client()?;
        let session_id = session_id.to_string();
        let from_user = from_user.to_lowercase();

        let profile = client
            .run_transaction(|db, transaction| {
                let session_id = session_id.clone();
                let from_user = from_user.clone();
                async move {
                    let now = now_rfc3339();

                    let mut session: Session = db
                        .fluent()
                        .select()
                        .by_id_in(collections::SESSIONS)
                        .obj()
                        .one(&session_id)
                        .await
                        .map_err(txn_db_err)?
                        .ok_or_else(|| {
                            BackoffError::permanent(AppError::NotFound(format!(
                                "Session {} not found",
                                session_id
                            )))
                        })?;

                    if !session.is_ratable() {
                        return Err(BackoffError::permanent(AppError::Conflict(
                            "session not finished".to_string(),
                        )));
                    }

                    let existing: Option<Rating> = db
                        .fluent()
                        .select()
                        .by_id_in(collections::RATINGS)
                        .obj()
                        .one(&Rating::doc_id(&session_id, &from_user))
                        .await
                        .map_err(txn_db_err)?;
                    if existing.is_some() {
                        return Err(BackoffError::permanent(AppError::Conflict(
                            "already rated".to_string(),
                        )));
                    }

                    let record = Rating {
                        session_id: session_id.clone(),
                        from_user: from_user.clone(),
                        to_user: session.to.clone(),
                        rating,
                        created_at: now.clone(),
                    };

                    // Missing profile fields read as zero, so tutors rated
                    // before completing onboarding still accumulate correctly.
                    let mut profile: UserProfile = db
                        .fluent()
                        .select()
                        .by_id_in(collections::USERS)
                        .obj()
                        .one(&session.to.to_lowercase())
                        .await
                        .map_err(txn_db_err)?
                        .unwrap_or_else(|| UserProfile::bare(&session.to));
                    profile.apply_rating(rating, &now);

                    session.rated = true;
                    session.updated_at = now;

                    db.fluent()
                        .update()
                        .in_col(collections::RATINGS)
                        .document_id(Rating::doc_id(&session_id, &from_user))
                        .object(&record)
                        .add_to_transaction(transaction)
                        .map_err(txn_db_err)?;
                    db.fluent()
                        .update()
                        .in_col(collections::USERS)
                        .document_id(profile.email.clone())
                        .object(&profile)
                        .add_to_transaction(transaction)
                        .map_err(txn_db_err)?;
                    db.fluent()
                        .update()
                        .in_col(collections::SESSIONS)
                        .document_id(&session.id)
                        .object(&session)
                        .add_to_transaction(transaction)
                        .map_err(txn_db_err)?;

                    Ok(profile)
                }
                .boxed()
            })
            .await
            .map_err(unwrap_txn_err)?;

        tracing::info!(
            session_id = %session_id,
            rater = %from_user,
            tutor = %profile.email,
            rating,
            new_avg = profile.rating_avg,
            new_count = profile.rating_count,
            "Rating recorded"
        );

        Ok(())
    }
}
