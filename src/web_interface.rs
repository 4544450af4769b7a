// Web Interface module root
pub mod routes;
pub mod types;
pub mod web_server;

// Re-export commonly used items
pub use routes::api_routes;
pub use web_server::{ApiState, WebServer};
