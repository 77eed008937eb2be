//! CLI command implementations.

mod cache;
mod config;
mod costs;
mod doctor;
mod process;
mod templates;

pub use cache::{run_cache_clear, run_cache_prune};
pub use config::run_config;
pub use costs::{run_costs_clear, run_costs_show};
pub use doctor::run_doctor;
pub use process::run_process;
pub use templates::run_templates;
