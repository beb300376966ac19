//! Splitting, fitting, scoring and registering regression models.

pub mod estimator;
pub mod metrics;
pub mod params;
pub mod register;
pub mod runner;
pub mod split;

pub use estimator::{Estimator, RegressionModel};
pub use metrics::{RegressionMetrics, r2_score};
pub use params::{EstimatorChoice, TrainParams};
pub use register::{RegisterRequest, RegisteredCandidate, default_candidates, train_and_register};
pub use runner::{TrainOutputs, TrainReport, run_training, write_outputs};
pub use split::{SplitIndices, train_test_split};
