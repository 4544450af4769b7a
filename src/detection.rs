pub mod detection_engine;
pub mod source_window;
pub mod types;
