//! Mathematical utilities.
//!
//! Quaternion operations, SO(3) helpers, finite-difference derivatives,
//! signal filtering, and a seedable random number generator.

pub mod derivative;
pub mod filtering;
pub mod quaternion;
pub mod rng;
pub mod rotation;

pub use derivative::*;
pub use filtering::*;
pub use quaternion::*;
pub use rng::*;
pub use rotation::*;
