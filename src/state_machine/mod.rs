//! Run state lifecycle for delegated operation documents
//!
//! Transitions are written by the repository; this module only defines the
//! states and which moves between them are legal.

pub mod states;

pub use states::RunState;
