//! # Review Harness Core
//!
//! Shared logic for Review Harness that carries no runtime, filesystem,
//! or network dependencies: chunk models, the paragraph chunker, vector
//! utilities, and the [`VectorIndex`](index::VectorIndex) abstraction with
//! its in-memory implementation.

pub mod chunk;
pub mod index;
pub mod models;
pub mod vector;
