pub mod config;
pub mod crosswalk;
pub mod dosing;
pub mod error;
pub mod identifier;
pub mod margin;
pub mod pipeline;
pub mod ranking;
pub mod record;
pub mod risk;
pub mod types;
pub mod validation;
