// Indicator features derived from bar series
pub mod feature_engineering_service;

// Labeling, boosted trees and the direction classifier
pub mod ml;

// Extract -> label -> train / predict orchestration
pub mod pipeline;
