// SPDX-License-Identifier: MIT

//! Services module - business logic layer.

pub mod lifecycle;

pub use lifecycle::{CreateRequestInput, DecisionOutcome, LifecycleEngine, RequestDecision};
