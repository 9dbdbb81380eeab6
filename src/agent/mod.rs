pub mod orchestrator;

pub use orchestrator::{ChatOutcome, Orchestrator};
