//! Model registry workflows: promoting the best run and resolving a model
//! by alias or legacy stage.

pub mod promote;
pub mod resolve;

pub use promote::{PromoteRequest, PromotionOutcome, PromotionReport, promote_best, select_best_run};
pub use resolve::{LoadedModel, ResolveRequest, ResolvedVia, load_model};

/// Version tag carrying a human-readable promotion note.
pub const PROMOTION_NOTE_TAG: &str = "promotion_note";
