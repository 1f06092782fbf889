//! Lead intake, scoring, and automation for multi-tenant intake forms.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
