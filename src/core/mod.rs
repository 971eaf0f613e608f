//! Core data model: tasks, steps, guards, and the hook graph.

pub mod graph;
pub mod task;
