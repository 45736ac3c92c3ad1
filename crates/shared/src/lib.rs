pub mod analytics;
pub mod domain;
pub mod error;
pub mod protocol;
