//! Optional pre-trained traffic classifier behind a fixed 9-feature vector.

pub mod classifier_adapter;
pub mod linear_model;
pub mod types;
