// SPDX-License-Identifier: MIT

//! Help-request model for storage and API.

use serde::{Deserialize, Serialize};

/// Session format, chosen by the requester and inherited by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MeetingFormat {
    Online,
    InPerson,
}

impl MeetingFormat {
    /// Parse a client-supplied format, coercing anything unknown to online.
    pub fn from_input(raw: Option<&str>) -> Self {
        match raw {
            Some("in-person") => MeetingFormat::InPerson,
            _ => MeetingFormat::Online,
        }
    }
}

/// Request lifecycle status. `Accepted` and `Rejected` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Rejected,
}

/// Stored request record: one person's ask for help from another.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelpRequest {
    /// Generated document ID
    pub id: String,
    /// Requester identity (email, lowercased)
    pub from: String,
    /// Prospective tutor identity (email, lowercased)
    pub to: String,
    /// Skill catalog slug (the topic)
    pub skill_slug: String,
    /// Free-form context, immutable after creation
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub time_window: String,
    pub format: MeetingFormat,
    pub status: RequestStatus,
    /// Set exactly when the request becomes accepted
    #[serde(default)]
    pub session_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl HelpRequest {
    /// Whether `identity` is the receiving (tutor) party, the only one
    /// allowed to move the request off `pending`.
    pub fn is_receiver(&self, identity: &str) -> bool {
        crate::models::identity_eq(&self.to, identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_coercion() {
        assert_eq!(
            MeetingFormat::from_input(Some("in-person")),
            MeetingFormat::InPerson
        );
        assert_eq!(MeetingFormat::from_input(Some("online")), MeetingFormat::Online);
        assert_eq!(MeetingFormat::from_input(Some("hologram")), MeetingFormat::Online);
        assert_eq!(MeetingFormat::from_input(None), MeetingFormat::Online);
    }

    #[test]
    fn test_receiver_check_is_case_insensitive() {
        let request = HelpRequest {
            id: "r1".to_string(),
            from: "alice@example.com".to_string(),
            to: "bob@example.com".to_string(),
            skill_slug: "algebra".to_string(),
            message: String::new(),
            time_window: String::new(),
            format: MeetingFormat::Online,
            status: RequestStatus::Pending,
            session_id: None,
            created_at: "2024-01-15T10:00:00Z".to_string(),
            updated_at: "2024-01-15T10:00:00Z".to_string(),
        };

        assert!(request.is_receiver("Bob@Example.COM"));
        assert!(!request.is_receiver("alice@example.com"));
    }
}
