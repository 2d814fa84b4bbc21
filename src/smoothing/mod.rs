//! Building blocks shared by every extractor: exponential accumulators and
//! fixed-capacity histories.

pub mod ema;
pub mod ring;

pub use ema::{Ema, EmaArray};
pub use ring::{FrameRing, RingBuffer};
