//! Property-based tests

mod queue_proptest;
mod task_proptest;
