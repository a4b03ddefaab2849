//! Combinators for structured concurrency and resource safety.
//!
//! - [`bracket`](mod@bracket): acquire/use/release with guaranteed release
//! - [`resource`]: composable resources released in reverse order
//! - [`par`]: fail-fast parallel map and traversal
//! - [`race`]: first-to-finish races
//! - [`timeout`]: races against a timer
//! - [`boundary`]: explicit checkpoints and masking

pub mod boundary;
pub mod bracket;
pub mod par;
pub mod race;
pub mod resource;
pub mod timeout;

pub use boundary::{cancel_boundary, never, uncancellable};
pub use bracket::{bracket, bracket_case, guarantee, guarantee_case, on_cancel};
pub use par::{
    Traversable, par_map2, par_map3, par_sequence, par_traverse, par_traverse_n,
};
pub use race::{Either, Race3, RacePair, RaceTriple, race_n, race_pair, race_triple, race3};
pub use resource::{ReleaseStack, Resource};
pub use timeout::timeout_or_none;
