// Job search pipeline: provider → optional analysis → export, tracked in the progress store.

pub mod export;
pub mod handlers;
pub mod orchestrator;
pub mod progress;
pub mod provider;
pub mod sanitize;
