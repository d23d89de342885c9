//! Core data structures for key handling.

pub mod nibbles;

pub use nibbles::Nibbles;
