//! Key-version rotation for TaskVault.
//!
//! Wrapped DEKs carry a key version in their metadata. This crate owns the
//! immutable registry of supported versions and turns a set of stored
//! wrapped DEKs into rotation work: analysis (which keys need rotating and
//! why), planning (which master keys are required, what it will roughly
//! cost), validation, and partial-failure-tolerant bulk execution via
//! `taskvault_crypto::rotate_dek`.

mod planner;
mod registry;

pub use planner::{
    KeyRotationInfo, PlanValidation, RotationAnalysis, RotationOutcome, RotationPlan,
    RotationPolicy, RotationPriority, RotationReason, RotationRecommendation, RotationTask,
    analyze_rotation_requirements, bulk_rotate_deks, generate_rotation_plan, key_rotation_info,
    validate_rotation_plan,
};
pub use registry::{KeyVersionEntry, KeyVersionRegistry};

#[derive(Debug, thiserror::Error)]
pub enum RotationError {
    #[error("no master key supplied for version {version}")]
    MissingMasterKey { version: u32 },

    #[error("version registry must contain at least one entry")]
    EmptyRegistry,

    #[error(transparent)]
    Crypto(#[from] taskvault_crypto::CryptoError),
}

pub type RotationResult<T> = Result<T, RotationError>;
