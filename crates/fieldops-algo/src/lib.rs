//! Solvers for the four planning stages (§4): frequency, weekly scheduling,
//! daily routing and agent matching. Each module is independent and can be
//! driven per branch/supervisor/day by the batch orchestrator.

pub mod freq;
pub mod match_;
pub mod route;
pub mod schedule;
