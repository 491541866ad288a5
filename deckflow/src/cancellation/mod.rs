//! Cooperative job cancellation.
//!
//! A [`CancellationToken`] is checked by the job runner at stage boundaries.
//! In-flight collaborator calls are never interrupted.

mod token;

pub use token::CancellationToken;
