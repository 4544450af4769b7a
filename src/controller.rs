pub mod controller_handler;
pub mod types;

#[cfg(test)]
mod integration_tests;
