//! Utterance segmentation: energy measurement and the silence/speaking
//! state machine.

pub mod energy;
pub mod machine;

pub use energy::calculate_rms;
pub use machine::{Segmenter, SegmenterConfig};
