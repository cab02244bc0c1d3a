use serde::{Deserialize, Serialize};
use std::fmt;

/// Predicted direction of the next bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Up,
    NotUp,
}

impl Direction {
    pub fn from_label(label: u8) -> Self {
        if label == 1 {
            Direction::Up
        } else {
            Direction::NotUp
        }
    }

    pub fn label(&self) -> u8 {
        match self {
            Direction::Up => 1,
            Direction::NotUp => 0,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "UP"),
            Direction::NotUp => write!(f, "NOT UP"),
        }
    }
}

/// Prediction for the most recent bar of a series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectionSignal {
    pub timestamp: i64,
    pub close: f64,
    pub direction: Direction,
    /// Probability of `Up` as scored by the ensemble.
    pub probability: f64,
}

impl DirectionSignal {
    pub fn is_buy(&self) -> bool {
        self.direction == Direction::Up
    }
}
