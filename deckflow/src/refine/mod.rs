//! The validator-fix loop primitive.
//!
//! Every validated stage drives a [`Refiner`] through a [`FixLoop`]:
//! generate once, validate, then fix and re-validate while the score is
//! below threshold and rounds remain. What comes back on exhaustion is
//! decided by the [`RetentionPolicy`].

mod fix_loop;

pub use fix_loop::{
    Candidate, FixLoop, LoopConfig, LoopObserver, LoopOutcome, NoOpObserver, Refiner,
    RetentionPolicy,
};
