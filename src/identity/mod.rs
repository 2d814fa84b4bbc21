//! Extractors that turn the per-tick spectrum into longer-lived descriptors.
//!
//! Each extractor owns its state outright and is driven once per tick by
//! [`crate::audio::analysis::Analyzer`]. They never see each other.

pub mod dna;
pub mod extractor;
pub mod instruments;
pub mod serenity;
pub mod visual;

pub use dna::{MusicalDna, MusicalDnaExtractor};
pub use extractor::{GenreIndicators, IdentityExtractor, IdentityRecord};
pub use instruments::{InstrumentDetector, InstrumentEvents};
pub use serenity::{SerenityState, SerenityTracker};
pub use visual::{FlowDynamics, ParticleBehavior, VisualMapping};
