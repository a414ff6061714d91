//! Firmware upgrade-path planning (pure logic).
//!
//! Decides whether a target firmware version can be installed directly or
//! needs a two-stage upgrade through an intermediate version, and whether
//! a given user selection may be submitted at all.
//!
//! Plans are cheap and must be recomputed on every version selection.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::firmware::{version_names, FirmwareVersion};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Versions known to need a two-stage upgrade regardless of their number.
///
/// Matched as substrings of the target version.
pub const TWO_STAGE_DENYLIST: &[&str] = &[
    "3.2(1d)B",
    "3.2(1d)C",
    "3.2(2b)C",
    "3.2(2c)C",
    "3.2(2c)B",
];

/// Lowest major version that may be installed in a single stage.
pub const MIN_DIRECT_MAJOR: u32 = 4;

/// Leading `<major>.<minor>` of a version string.
const VERSION_PREFIX_PATTERN: &str = r"^(\d+)\.(\d+)";

static VERSION_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(VERSION_PREFIX_PATTERN).expect("valid regex"));

// ---------------------------------------------------------------------------
// Version parsing
// ---------------------------------------------------------------------------

/// Numeric prefix of a firmware version string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VersionPrefix {
    pub major: u32,
    pub minor: u32,
}

/// Parse the leading `<major>.<minor>` of `version`.
///
/// Returns `None` when the string does not start with that pattern (or a
/// component overflows `u32`).
pub fn parse_version_prefix(version: &str) -> Option<VersionPrefix> {
    let caps = VERSION_PREFIX_RE.captures(version)?;
    let major = caps.get(1)?.as_str().parse().ok()?;
    let minor = caps.get(2)?.as_str().parse().ok()?;
    Some(VersionPrefix { major, minor })
}

/// Why a target version needs a two-stage upgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TwoStageReason {
    /// The target matched an entry of [`TWO_STAGE_DENYLIST`].
    Denylisted,
    /// The target's major version is below [`MIN_DIRECT_MAJOR`].
    BelowMinimumMajor { major: u32 },
}

/// Decide whether `target_version` needs a two-stage upgrade.
///
/// An unparseable version is logged and treated as direct-upgradable.
pub fn two_stage_reason(target_version: &str) -> Option<TwoStageReason> {
    if TWO_STAGE_DENYLIST
        .iter()
        .any(|listed| target_version.contains(listed))
    {
        return Some(TwoStageReason::Denylisted);
    }

    match parse_version_prefix(target_version) {
        Some(prefix) if prefix.major < MIN_DIRECT_MAJOR => {
            Some(TwoStageReason::BelowMinimumMajor {
                major: prefix.major,
            })
        }
        Some(_) => None,
        None => {
            tracing::warn!(
                target_version,
                "Could not parse version number, skipping two-stage check",
            );
            None
        }
    }
}

// ---------------------------------------------------------------------------
// UpgradePlan
// ---------------------------------------------------------------------------

/// Outcome of planning an upgrade to one target version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpgradePlan {
    pub target_version: String,
    pub needs_two_stage: bool,
    pub two_stage_reason: Option<TwoStageReason>,
    /// An intermediate version must be chosen before submitting.
    pub intermediate_version_required: bool,
    /// The user overrode the two-stage requirement.
    pub forced_direct: bool,
    /// Candidate intermediate versions (catalogue minus target minus blanks).
    pub available_intermediates: Vec<String>,
    /// The target is what the server already runs.
    pub target_is_current: bool,
}

impl UpgradePlan {
    /// Whether the intermediate-version selector should be shown.
    pub fn offers_intermediate_selector(&self) -> bool {
        self.needs_two_stage && !self.forced_direct && !self.available_intermediates.is_empty()
    }

    /// Whether the "force direct upgrade" override should be shown.
    pub fn offers_force_direct(&self) -> bool {
        self.needs_two_stage
    }

    /// Apply or withdraw the force-direct override.
    ///
    /// Has no effect on plans that do not need two stages.
    pub fn with_force_direct(mut self, force_direct: bool) -> Self {
        if self.needs_two_stage {
            self.forced_direct = force_direct;
            self.intermediate_version_required = !force_direct;
        }
        self
    }
}

/// Plan an upgrade from `current_version` to `target_version`.
pub fn plan(current_version: &str, target_version: &str, available_versions: &[String]) -> UpgradePlan {
    let reason = two_stage_reason(target_version);
    let needs_two_stage = reason.is_some();

    let available_intermediates = if needs_two_stage {
        available_versions
            .iter()
            .filter(|v| !v.trim().is_empty() && v.as_str() != target_version)
            .cloned()
            .collect()
    } else {
        Vec::new()
    };

    UpgradePlan {
        target_version: target_version.to_string(),
        needs_two_stage,
        two_stage_reason: reason,
        intermediate_version_required: needs_two_stage,
        forced_direct: false,
        available_intermediates,
        target_is_current: !current_version.is_empty() && current_version == target_version,
    }
}

/// Plan against the firmware catalogue.
///
/// Like [`plan`], but also treats the target as current when the server
/// reports one of the target package's bundle versions.
pub fn plan_from_catalogue(
    current_version: &str,
    target_version: &str,
    catalogue: &[FirmwareVersion],
) -> UpgradePlan {
    let mut plan = plan(current_version, target_version, &version_names(catalogue));
    let bundle_installed = catalogue
        .iter()
        .filter(|fw| fw.name == target_version)
        .any(|fw| fw.is_installed(current_version));
    plan.target_is_current |= bundle_installed;
    plan
}

// ---------------------------------------------------------------------------
// Submission guard
// ---------------------------------------------------------------------------

/// The user's choices on the upgrade form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpgradeSelection {
    pub force_direct: bool,
    /// Kept even while `force_direct` hides the selector.
    pub intermediate_version: Option<String>,
}

impl UpgradeSelection {
    /// The selected intermediate version, ignoring blank values.
    pub fn intermediate(&self) -> Option<&str> {
        self.intermediate_version
            .as_deref()
            .filter(|v| !v.trim().is_empty())
    }
}

/// Reasons an upgrade may not be submitted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmissionBlock {
    #[error("No target firmware version selected")]
    MissingTarget,

    #[error("The selected version is the server's current version")]
    TargetIsCurrent,

    #[error("The server is already being upgraded")]
    ActiveUpgradeInProgress,

    #[error("No intermediate version is available; force a direct upgrade to continue")]
    NoIntermediateAvailable,

    #[error("An intermediate version must be selected")]
    IntermediateNotSelected,

    #[error("'{0}' is not a valid intermediate version")]
    InvalidIntermediate(String),
}

/// Check whether `selection` may be submitted for `plan`.
///
/// `has_active_upgrade` reports whether the target server already has a
/// pending or running job.
pub fn check_submission(
    plan: &UpgradePlan,
    selection: &UpgradeSelection,
    has_active_upgrade: bool,
) -> Result<(), SubmissionBlock> {
    if plan.target_version.trim().is_empty() {
        return Err(SubmissionBlock::MissingTarget);
    }
    if plan.target_is_current {
        return Err(SubmissionBlock::TargetIsCurrent);
    }
    if has_active_upgrade {
        return Err(SubmissionBlock::ActiveUpgradeInProgress);
    }

    let effective = plan.clone().with_force_direct(selection.force_direct);
    if !effective.intermediate_version_required {
        return Ok(());
    }
    if effective.available_intermediates.is_empty() {
        return Err(SubmissionBlock::NoIntermediateAvailable);
    }
    match selection.intermediate() {
        None => Err(SubmissionBlock::IntermediateNotSelected),
        Some(v) if !effective.available_intermediates.iter().any(|a| a == v) => {
            Err(SubmissionBlock::InvalidIntermediate(v.to_string()))
        }
        Some(_) => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
