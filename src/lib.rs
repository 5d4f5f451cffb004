// SPDX-License-Identifier: MIT

//! SkillSwap: student talent-exchange backend.
//!
//! This crate provides the API for exchanging help sessions between
//! students: sending requests, accepting them into sessions, agreeing on
//! a meeting place, mutually confirming completion, and rating the tutor.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::FirestoreDb;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: FirestoreDb,
}
