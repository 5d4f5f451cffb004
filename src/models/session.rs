// SPDX-License-Identifier: MIT

//! Session model and its state transitions.
//!
//! A session is created from exactly one accepted request and is owned
//! jointly by the requester (`from`) and the tutor (`to`). The pure
//! transition logic lives here; persistence and validation ordering live
//! in the db and service layers.

use serde::{Deserialize, Serialize};

use crate::models::{identity_eq, MeetingFormat};

/// Session lifecycle status. `Completed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
}

/// A participant's role in a session, derived from the two identity
/// fields rather than stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The `from` party (sent the original request)
    Requester,
    /// The `to` party (accepted the request; sets meeting details)
    Tutor,
}

/// Agreed meeting details, set only by the tutor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingPlace {
    /// Derived from the session format at write time, not client-settable
    pub kind: MeetingFormat,
    /// Link or address (1..=500 chars, trimmed)
    pub value: String,
    pub updated_by: String,
    pub updated_at: String,
}

/// Per-participant finish flags. One-way: once true, never reverts.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct FinishedBy {
    #[serde(default)]
    pub from: bool,
    #[serde(default)]
    pub to: bool,
}

/// Stored session record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Generated document ID
    pub id: String,
    /// Requester identity (email, lowercased)
    pub from: String,
    /// Tutor identity (email, lowercased)
    pub to: String,
    /// Skill catalog slug, inherited from the request
    pub skill_slug: String,
    /// Inherited from the request at creation, immutable
    pub format: MeetingFormat,
    pub status: SessionStatus,
    #[serde(default)]
    pub meeting_place: Option<MeetingPlace>,
    #[serde(default)]
    pub finished_by: FinishedBy,
    /// Set exactly once, when both finish flags become true
    #[serde(default)]
    pub completed_at: Option<String>,
    /// Flips false -> true exactly once, on a successful rating
    #[serde(default)]
    pub rated: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl Session {
    /// Build a fresh active session from an accepted request.
    pub fn from_request(id: String, request: &crate::models::HelpRequest, now: &str) -> Self {
        Self {
            id,
            from: request.from.to_lowercase(),
            to: request.to.to_lowercase(),
            skill_slug: request.skill_slug.clone(),
            format: request.format,
            status: SessionStatus::Active,
            meeting_place: None,
            finished_by: FinishedBy::default(),
            completed_at: None,
            rated: false,
            created_at: now.to_string(),
            updated_at: now.to_string(),
        }
    }

    /// Compute the role of `identity` in this session, if any.
    ///
    /// All participant checks go through this rather than ad-hoc string
    /// equality, so case differences never lock a legitimate participant
    /// out.
    pub fn role_of(&self, identity: &str) -> Option<Role> {
        if identity_eq(&self.from, identity) {
            Some(Role::Requester)
        } else if identity_eq(&self.to, identity) {
            Some(Role::Tutor)
        } else {
            None
        }
    }

    /// Record a finish signal from one participant.
    ///
    /// Sets that participant's flag (repeat calls are no-ops) and, when
    /// both flags are set on a still-active session, performs the
    /// completion transition. Returns `true` if this call completed the
    /// session.
    pub fn record_finish(&mut self, role: Role, now: &str) -> bool {
        match role {
            Role::Requester => self.finished_by.from = true,
            Role::Tutor => self.finished_by.to = true,
        }
        self.updated_at = now.to_string();

        if self.finished_by.from && self.finished_by.to && self.status == SessionStatus::Active {
            self.status = SessionStatus::Completed;
            self.completed_at = Some(now.to_string());
            return true;
        }
        false
    }

    /// Overwrite the meeting place. The kind is derived from the stored
    /// session format, never taken from the caller.
    ///
    /// Callers are responsible for tutor/status/length validation.
    pub fn set_meeting_place(&mut self, value: String, updated_by: &str, now: &str) {
        self.meeting_place = Some(MeetingPlace {
            kind: self.format,
            value,
            updated_by: updated_by.to_string(),
            updated_at: now.to_string(),
        });
        self.updated_at = now.to_string();
    }

    /// Whether this session may accept a rating: completed, with the full
    /// finish handshake recorded (defends against a completed flag set
    /// without both finish flags, e.g. data migrated from an older shape).
    pub fn is_ratable(&self) -> bool {
        self.status == SessionStatus::Completed && self.finished_by.from && self.finished_by.to
    }
}
