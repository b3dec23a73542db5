//! The decision pipeline: state model, cost, retrieval, scoring, the
//! confirmation protocol and the outcome loop, sequenced by the
//! [`orchestrator`].

pub mod audit;
pub mod confirmation;
pub mod cost;
pub mod impact;
pub mod intake;
pub mod orchestrator;
pub mod outcome;
pub mod retrieval;
pub mod scoring;
pub mod state;

pub use orchestrator::{ChatRequest, ChatResponse, Orchestrator};
