//! Rotation-need analysis, plan construction/validation, and bulk execution.
//!
//! Analysis emits recommendations per key along independent dimensions (age,
//! version lag, deprecation, forced). A single key can trigger several
//! recommendations at once; callers that want one verdict per key can
//! collapse them, but the multiplicity carries diagnostic value and is kept.
//!
//! All records here are ephemeral planning/result data, never persisted.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tracing::warn;

use taskvault_crypto::{MasterKey, WrappedDek, rotate_dek};

use crate::registry::KeyVersionRegistry;
use crate::{RotationError, RotationResult};

/// Rough per-task cost used for the plan's duration estimate. An
/// order-of-magnitude figure, not a measured SLA.
const ESTIMATED_TASK_COST_MS: u64 = 50;

/// Aggregate view over a set of stored wrapped DEKs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyRotationInfo {
    /// The version newly wrapped keys receive (registry latest).
    pub current_version: u32,
    /// Unique versions present in the input, descending.
    pub available_versions: Vec<u32>,
    /// True iff the highest version present is below the registry latest.
    pub rotation_needed: bool,
}

/// Computes the aggregate rotation view for a set of wrapped DEKs.
pub fn key_rotation_info(
    wrapped_deks: &[WrappedDek],
    registry: &KeyVersionRegistry,
) -> KeyRotationInfo {
    let latest = registry.latest_version();

    let unique: BTreeSet<u32> = wrapped_deks.iter().map(|w| w.metadata.version).collect();
    let available_versions: Vec<u32> = unique.into_iter().rev().collect();

    let rotation_needed = available_versions
        .first()
        .is_some_and(|&max| max < latest);

    KeyRotationInfo {
        current_version: latest,
        available_versions,
        rotation_needed,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RotationPriority {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RotationReason {
    /// Key older than the policy's maximum age.
    Age,
    /// Key version below the target version.
    Version,
    /// Key version is deprecated (or unknown).
    Deprecation,
    /// Policy demanded rotation regardless of state.
    Forced,
}

/// Policy knobs for rotation analysis.
#[derive(Clone, Debug)]
pub struct RotationPolicy {
    /// Keys older than this are flagged. Default 365 days.
    pub max_age: TimeDelta,
    /// Overrides the registry latest as the comparison/target version.
    pub max_version: Option<u32>,
    /// Emit a recommendation for every key regardless of state.
    pub force_rotation: bool,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            max_age: TimeDelta::days(365),
            max_version: None,
            force_rotation: false,
        }
    }
}

/// One flagged key along one dimension.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationRecommendation {
    /// Index into the analyzed slice.
    pub key_index: usize,
    pub current_version: u32,
    pub recommended_version: u32,
    pub reason: RotationReason,
    pub priority: RotationPriority,
    pub detail: String,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationAnalysis {
    pub recommendations: Vec<RotationRecommendation>,
    pub info: KeyRotationInfo,
}

/// Analyzes stored wrapped DEKs against the policy.
///
/// The age, version, and deprecation checks are independent dimensions —
/// one key may yield up to four recommendations.
pub fn analyze_rotation_requirements(
    wrapped_deks: &[WrappedDek],
    policy: &RotationPolicy,
    registry: &KeyVersionRegistry,
) -> RotationAnalysis {
    let target = policy.max_version.unwrap_or_else(|| registry.latest_version());
    let now = Utc::now();

    let mut recommendations = Vec::new();
    for (key_index, wrapped) in wrapped_deks.iter().enumerate() {
        let version = wrapped.metadata.version;
        let deprecated = registry.is_deprecated(version);

        if age_of(wrapped.metadata.created_at, now) > policy.max_age {
            recommendations.push(RotationRecommendation {
                key_index,
                current_version: version,
                recommended_version: target,
                reason: RotationReason::Age,
                priority: RotationPriority::High,
                detail: format!(
                    "key created {} exceeds the {}-day age limit",
                    wrapped.metadata.created_at,
                    policy.max_age.num_days()
                ),
            });
        }

        if version < target {
            recommendations.push(RotationRecommendation {
                key_index,
                current_version: version,
                recommended_version: target,
                reason: RotationReason::Version,
                priority: if deprecated {
                    RotationPriority::Critical
                } else {
                    RotationPriority::Medium
                },
                detail: format!("key version {version} is behind target {target}"),
            });
        }

        if deprecated {
            recommendations.push(RotationRecommendation {
                key_index,
                current_version: version,
                recommended_version: target,
                reason: RotationReason::Deprecation,
                priority: RotationPriority::Critical,
                detail: format!("key version {version} is deprecated"),
            });
        }

        if policy.force_rotation {
            recommendations.push(RotationRecommendation {
                key_index,
                current_version: version,
                recommended_version: target,
                reason: RotationReason::Forced,
                priority: RotationPriority::High,
                detail: "rotation forced by policy".to_string(),
            });
        }
    }

    RotationAnalysis {
        recommendations,
        info: key_rotation_info(wrapped_deks, registry),
    }
}

fn age_of(created_at: DateTime<Utc>, now: DateTime<Utc>) -> TimeDelta {
    now.signed_duration_since(created_at)
}

/// One unit of rotation work: rewrap one key to the target version.
#[derive(Clone, Debug)]
pub struct RotationTask {
    /// Index into the slice the plan was generated from.
    pub key_index: usize,
    pub wrapped: WrappedDek,
    pub source_version: u32,
    pub target_version: u32,
    /// Highest priority among the key's recommendations.
    pub priority: RotationPriority,
    /// Reason of the highest-priority recommendation.
    pub reason: RotationReason,
}

#[derive(Clone, Debug)]
pub struct RotationPlan {
    pub tasks: Vec<RotationTask>,
    /// Task count × fixed per-task cost. Order of magnitude only.
    pub estimated_duration: Duration,
    pub created_at: DateTime<Utc>,
}

/// Builds a rotation plan from an analysis pass.
///
/// Requires a master key in `master_keys` for every source version that
/// appears in the recommendations and for the target version, failing with
/// the first missing version otherwise.
pub fn generate_rotation_plan(
    wrapped_deks: &[WrappedDek],
    master_keys: &HashMap<u32, MasterKey>,
    policy: &RotationPolicy,
    registry: &KeyVersionRegistry,
) -> RotationResult<RotationPlan> {
    let analysis = analyze_rotation_requirements(wrapped_deks, policy, registry);
    let target = policy.max_version.unwrap_or_else(|| registry.latest_version());

    let flagged: BTreeSet<usize> = analysis
        .recommendations
        .iter()
        .map(|r| r.key_index)
        .collect();

    let mut required: BTreeSet<u32> = flagged
        .iter()
        .map(|&i| wrapped_deks[i].metadata.version)
        .collect();
    if !flagged.is_empty() {
        required.insert(target);
    }
    for version in &required {
        if !master_keys.contains_key(version) {
            return Err(RotationError::MissingMasterKey { version: *version });
        }
    }

    let tasks: Vec<RotationTask> = flagged
        .into_iter()
        .map(|key_index| {
            // Max priority wins; ties resolved by recommendation order.
            let top = analysis
                .recommendations
                .iter()
                .filter(|r| r.key_index == key_index)
                .max_by_key(|r| r.priority)
                .expect("flagged index came from recommendations");

            RotationTask {
                key_index,
                wrapped: wrapped_deks[key_index].clone(),
                source_version: wrapped_deks[key_index].metadata.version,
                target_version: target,
                priority: top.priority,
                reason: top.reason,
            }
        })
        .collect();

    let estimated_duration = Duration::from_millis(ESTIMATED_TASK_COST_MS * tasks.len() as u64);

    Ok(RotationPlan {
        tasks,
        estimated_duration,
        created_at: Utc::now(),
    })
}

/// Static checks over a plan before execution.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanValidation {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// Versions the executor must supply master keys for (sources + targets).
    pub required_versions: Vec<u32>,
}

pub fn validate_rotation_plan(
    plan: &RotationPlan,
    registry: &KeyVersionRegistry,
) -> PlanValidation {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let mut seen = BTreeSet::new();
    for task in &plan.tasks {
        if !seen.insert(task.key_index) {
            errors.push(format!("duplicate task for key index {}", task.key_index));
        }
        if !registry.is_supported(task.target_version) {
            errors.push(format!(
                "task for key index {} targets unsupported version {}",
                task.key_index, task.target_version
            ));
        }
    }

    let critical = plan
        .tasks
        .iter()
        .filter(|t| t.priority == RotationPriority::Critical)
        .count();
    if critical > 0 {
        warnings.push(format!(
            "{critical} task(s) carry critical priority; execute promptly"
        ));
    }
    if plan.tasks.is_empty() {
        warnings.push("plan contains no tasks".to_string());
    }

    let required_versions: Vec<u32> = plan
        .tasks
        .iter()
        .flat_map(|t| [t.source_version, t.target_version])
        .collect::<BTreeSet<u32>>()
        .into_iter()
        .collect();

    PlanValidation {
        valid: errors.is_empty(),
        errors,
        warnings,
        required_versions,
    }
}

/// Outcome of one task in a bulk rotation. Reported in input order.
#[derive(Clone, Debug)]
pub struct RotationOutcome {
    pub key_index: usize,
    pub success: bool,
    pub rotated: Option<WrappedDek>,
    pub error: Option<String>,
}

/// Executes rotation tasks independently.
///
/// A failure in one task never aborts the batch; each outcome records its
/// own success or error, in the same order as the input tasks. Tasks share
/// no state, so implementations are free to parallelize as long as the
/// reported order is preserved.
pub fn bulk_rotate_deks(
    tasks: &[RotationTask],
    master_keys: &HashMap<u32, MasterKey>,
) -> Vec<RotationOutcome> {
    tasks
        .iter()
        .map(|task| {
            let result = rotate_task(task, master_keys);
            match result {
                Ok(rotated) => RotationOutcome {
                    key_index: task.key_index,
                    success: true,
                    rotated: Some(rotated),
                    error: None,
                },
                Err(err) => {
                    warn!(
                        "rotation of key index {} (v{} -> v{}) failed: {err}",
                        task.key_index, task.source_version, task.target_version
                    );
                    RotationOutcome {
                        key_index: task.key_index,
                        success: false,
                        rotated: None,
                        error: Some(err.to_string()),
                    }
                }
            }
        })
        .collect()
}

fn rotate_task(
    task: &RotationTask,
    master_keys: &HashMap<u32, MasterKey>,
) -> RotationResult<WrappedDek> {
    let old_key = master_keys
        .get(&task.source_version)
        .ok_or(RotationError::MissingMasterKey {
            version: task.source_version,
        })?;
    let new_key = master_keys
        .get(&task.target_version)
        .ok_or(RotationError::MissingMasterKey {
            version: task.target_version,
        })?;

    Ok(rotate_dek(
        &task.wrapped,
        old_key,
        new_key,
        Some(task.target_version),
    )?)
}
