//! Deterministic collaborators for pipeline tests.

pub mod fixtures;
mod graph;
mod llm;

pub use graph::StubGraphClient;
pub use llm::{FailingThenOk, Reply, ScriptedCompletion};
