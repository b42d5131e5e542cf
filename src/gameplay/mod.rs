pub mod abstraction;
pub mod action;
pub mod bucket;
pub mod config;
pub mod game;
pub mod infoset;
pub mod seat;
pub mod showdown;

use crate::Chips;

/// money is rounded to cents at the kernel boundary so that fraction
/// sizing and float folds never accumulate drift.
pub fn snap(chips: Chips) -> Chips {
    (chips * 100.0).round() / 100.0
}

/// tolerance for comparing snapped chip amounts
pub const EPSILON: Chips = 1e-6;
