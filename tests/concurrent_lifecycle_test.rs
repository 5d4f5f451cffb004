// SPDX-License-Identifier: MIT

//! Concurrent lifecycle transition tests.
//!
//! Every state-machine mutation runs as a transactional read-modify-write,
//! so racing participants must never lose each other's writes: concurrent
//! finishes yield exactly one completion with both flags intact, a reject
//! can never overwrite a committed accept, and concurrent ratings of the
//! same tutor never lose aggregate increments.
//!
//! Requires the Firestore emulator.

use skillswap::error::AppError;
use skillswap::models::{RequestStatus, SessionStatus};
use skillswap::services::{CreateRequestInput, LifecycleEngine, RequestDecision};
use std::sync::Arc;

mod common;
use common::{test_db, unique_email};

async fn create_pending_request(
    engine: &LifecycleEngine,
    requester: &str,
    tutor: &str,
) -> String {
    engine
        .create_request(
            requester,
            CreateRequestInput {
                to: tutor.to_string(),
                skill_slug: "statistics".to_string(),
                message: None,
                time_window: None,
                format: None,
            },
        )
        .await
        .expect("create request")
        .id
}

async fn accepted_session(engine: &LifecycleEngine, requester: &str, tutor: &str) -> String {
    let request_id = create_pending_request(engine, requester, tutor).await;
    engine
        .decide_request(tutor, &request_id, RequestDecision::Accepted)
        .await
        .expect("accept request")
        .session
        .expect("accept yields a session")
        .id
}

#[tokio::test]
async fn test_concurrent_mutual_finish_completes_exactly_once() {
    require_emulator!();

    let db = test_db().await;
    let engine = Arc::new(LifecycleEngine::new(db.clone()));

    // Repeat the race: a single interleaving can get lucky, a batch of
    // them reliably exercises the conflicting-commit path.
    for iteration in 0..20 {
        let (requester, tutor) = (unique_email("req"), unique_email("tut"));
        let session_id = accepted_session(&engine, &requester, &tutor).await;

        let a = {
            let engine = engine.clone();
            let session_id = session_id.clone();
            tokio::spawn(async move { engine.finish_session(&requester, &session_id).await })
        };
        let b = {
            let engine = engine.clone();
            let session_id = session_id.clone();
            tokio::spawn(async move { engine.finish_session(&tutor, &session_id).await })
        };

        let (a, b) = tokio::join!(a, b);
        a.expect("task panicked").expect("requester finish failed");
        b.expect("task panicked").expect("tutor finish failed");

        let session = db.get_session(&session_id).await.unwrap().unwrap();
        assert_eq!(
            session.status,
            SessionStatus::Completed,
            "iteration {}: session not completed",
            iteration
        );
        assert!(
            session.finished_by.from,
            "iteration {}: requester flag lost",
            iteration
        );
        assert!(
            session.finished_by.to,
            "iteration {}: tutor flag lost",
            iteration
        );
        assert!(session.completed_at.is_some(), "iteration {}", iteration);
    }
}

#[tokio::test]
async fn test_concurrent_repeat_finish_is_stable() {
    require_emulator!();

    let db = test_db().await;
    let engine = Arc::new(LifecycleEngine::new(db.clone()));
    let (requester, tutor) = (unique_email("req"), unique_email("tut"));
    let session_id = accepted_session(&engine, &requester, &tutor).await;

    engine.finish_session(&requester, &session_id).await.unwrap();
    engine.finish_session(&tutor, &session_id).await.unwrap();

    let completed_at = db
        .get_session(&session_id)
        .await
        .unwrap()
        .unwrap()
        .completed_at;

    // A burst of late finish signals must not disturb the completed state
    let mut handles = Vec::new();
    for _ in 0..4 {
        for actor in [requester.clone(), tutor.clone()] {
            let engine = engine.clone();
            let session_id = session_id.clone();
            handles.push(tokio::spawn(async move {
                engine.finish_session(&actor, &session_id).await
            }));
        }
    }
    for handle in handles {
        handle.await.expect("task panicked").expect("late finish errored");
    }

    let session = db.get_session(&session_id).await.unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.completed_at, completed_at, "completed_at changed");
}

#[tokio::test]
async fn test_concurrent_accept_and_reject_stays_terminal() {
    require_emulator!();

    let db = test_db().await;
    let engine = Arc::new(LifecycleEngine::new(db.clone()));

    for iteration in 0..10 {
        let (requester, tutor) = (unique_email("req"), unique_email("tut"));
        let request_id = create_pending_request(&engine, &requester, &tutor).await;

        let accept = {
            let engine = engine.clone();
            let tutor = tutor.clone();
            let request_id = request_id.clone();
            tokio::spawn(async move {
                engine
                    .decide_request(&tutor, &request_id, RequestDecision::Accepted)
                    .await
            })
        };
        let reject = {
            let engine = engine.clone();
            let tutor = tutor.clone();
            let request_id = request_id.clone();
            tokio::spawn(async move {
                engine
                    .decide_request(&tutor, &request_id, RequestDecision::Rejected)
                    .await
            })
        };

        let (accept, reject) = tokio::join!(accept, reject);
        let accept = accept.expect("task panicked");
        let reject = reject.expect("task panicked");

        // Exactly one decision wins; the loser observes the terminal state
        // as a conflict, never a silent overwrite.
        assert_eq!(
            accept.is_ok() as u8 + reject.is_ok() as u8,
            1,
            "iteration {}: expected exactly one winning decision",
            iteration
        );
        for err in [accept.as_ref().err(), reject.as_ref().err()].into_iter().flatten() {
            assert!(
                matches!(err, AppError::Conflict(_)),
                "iteration {}: loser got {:?}, expected conflict",
                iteration,
                err
            );
        }

        let request = db.get_request(&request_id).await.unwrap().unwrap();
        match request.status {
            RequestStatus::Accepted => {
                let session_id = request.session_id.expect("accepted without session id");
                let session = db.get_session(&session_id).await.unwrap().unwrap();
                assert_eq!(session.status, SessionStatus::Active, "iteration {}", iteration);
            }
            RequestStatus::Rejected => {
                assert!(
                    request.session_id.is_none(),
                    "iteration {}: rejected request points at a session",
                    iteration
                );
            }
            RequestStatus::Pending => {
                panic!("iteration {}: request left pending after a decision", iteration)
            }
        }
    }
}

#[tokio::test]
async fn test_concurrent_ratings_never_lose_increments() {
    require_emulator!();

    let db = test_db().await;
    let engine = Arc::new(LifecycleEngine::new(db.clone()));
    let tutor = unique_email("tut");

    // Two completed sessions with the same tutor, different requesters
    let mut raters = Vec::new();
    for _ in 0..2 {
        let requester = unique_email("req");
        let session_id = accepted_session(&engine, &requester, &tutor).await;
        engine.finish_session(&requester, &session_id).await.unwrap();
        engine.finish_session(&tutor, &session_id).await.unwrap();
        raters.push((requester, session_id));
    }

    let mut handles = Vec::new();
    for (rating, (requester, session_id)) in [5u8, 3].into_iter().zip(raters) {
        let engine = engine.clone();
        let tutor = tutor.clone();
        handles.push(tokio::spawn(async move {
            engine
                .submit_rating(&requester, &session_id, &tutor, i64::from(rating))
                .await
        }));
    }
    for handle in handles {
        handle.await.expect("task panicked").expect("rating failed");
    }

    // Both increments land in the aggregate, whichever commit went second
    let profile = db.get_user_profile(&tutor).await.unwrap().unwrap();
    assert_eq!(profile.rating_count, 2);
    assert!(
        (profile.rating_avg - 4.0).abs() < 1e-9,
        "expected avg 4.0, got {}",
        profile.rating_avg
    );
}
