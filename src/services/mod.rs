//! Domain services for the marketplace engine
//!
//! - `levels`: static citizen-level table and the pure level evaluator
//! - `applications`: application lifecycle state machine
//! - `admission`: capacity admission control for accept transitions
//! - `settlement`: the per-participant reward pipeline at mission completion

pub mod admission;
pub mod applications;
pub mod levels;
pub mod settlement;

pub use admission::AdmissionController;
pub use applications::ApplicationService;
pub use levels::{evaluate, level_for_points, Level, LevelChange, LEVELS};
pub use settlement::{
    MintOutcome, ParticipantResult, PaymentOutcome, SettlementOrchestrator, SettlementOutcome,
};
