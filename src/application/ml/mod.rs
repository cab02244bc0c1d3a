pub mod boosting;
pub mod direction_classifier;
pub mod labeler;
