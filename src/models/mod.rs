// SPDX-License-Identifier: MIT

//! Data models for the application.

pub mod rating;
pub mod request;
pub mod session;
pub mod skill;
pub mod user;

pub use rating::Rating;
pub use request::{HelpRequest, MeetingFormat, RequestStatus};
pub use session::{FinishedBy, MeetingPlace, Role, Session, SessionStatus};
pub use skill::Skill;
pub use user::UserProfile;

/// Case-insensitive identity comparison.
///
/// Identities are emails issued by the external identity provider. They
/// are lowercased at the auth boundary, but stored documents may predate
/// that normalization, so every participant check goes through here.
pub fn identity_eq(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}
