//! stride-core — Learning progress evaluation engine.
//!
//! Turns a learner's recorded attempts into task evaluations, rolls completed
//! tasks up into program metrics, and maintains a single program-level
//! evaluation with qualitative feedback in several languages.
//!
//! Persistence and text generation are consumed through the traits in
//! [`traits`]; [`store::InMemoryStore`] is the reference store.

pub mod coordinator;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod feedback;
pub mod language;
pub mod metrics;
pub mod model;
pub mod qualitative;
pub mod settle;
pub mod store;
pub mod traits;

#[cfg(test)]
pub(crate) mod testing;
