//! Database layer (Firestore).

pub mod firestore;

pub use firestore::FirestoreDb;

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    pub const SKILLS: &str = "skills";
    pub const REQUESTS: &str = "requests";
    pub const SESSIONS: &str = "sessions";
    pub const RATINGS: &str = "ratings";
}
