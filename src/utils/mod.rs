//! Utility functions and data structures shared across the crate.

pub mod graph;
