//! Adaptive bitrate ladder planning
//!
//! This module decides which renditions the encoder is asked for:
//! - Step-down of the source frame size along a fixed height table
//! - Orientation-independent size derivation (portrait is swapped)
//! - Codec fan-out for high resolution sizes
//! - Bitrate targets from bits-per-pixel

pub mod planner;
pub mod size;

pub use planner::{fan_out, plan_ladder, plan_sizes, CodecChoice, LadderPlan, Variant};
pub use size::{RoundingPolicy, VideoSize};
