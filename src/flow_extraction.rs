pub mod extractor;
pub mod types;
