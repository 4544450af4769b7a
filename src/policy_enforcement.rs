pub mod policy_enforcer;
pub mod types;
