pub mod deflated;
pub mod engine;
pub mod metrics;
pub mod models;
pub mod monte_carlo;
pub mod permutation;


pub use deflated::{deflated_sharpe_ratio, DeflatedSharpe};
pub use engine::VectorEngine;
pub use metrics::compute_metrics;
pub use models::*;
pub use monte_carlo::monte_carlo_var95;
pub use permutation::permutation_pvalue;
