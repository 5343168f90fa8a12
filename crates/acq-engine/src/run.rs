//! The acquisition run controller.
//!
//! Walks the position list once, applying the per-position pipeline:
//!
//! 1. parse the label and detect well boundaries
//! 2. skip if the well's FOV budget is spent
//! 3. reset the z reference and move the stage
//! 4. autofocus on the nuclear stain (with retries)
//! 5. snap and score confluency
//! 6. autoexposure on the signal channel, at most once per well
//! 7. capture one z-stack per channel
//!
//! Recoverable failures skip the position with a recorded reason; setup
//! failures, malformed labels, capture faults, and too many consecutive
//! stage failures abort the run. The datastore is finalized exactly once
//! at the end of a completed run.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use acq_core::capabilities::{AlwaysAccept, ConfluencyCheck, MicroscopeGateway};
use acq_core::error::{AcqError, AcqResult, DeviceFault, FaultKind};
use acq_core::position::Position;
use acq_core::settings::{AcquisitionSettings, AutoexposureResult, Env};
use acq_core::store::SUMMARY_FILE;

use crate::autoexposure::AutoexposureEngine;
use crate::autofocus::AutofocusController;
use crate::tracker::WellSiteTracker;

/// Lifecycle of an acquisition run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    Running,
    Completed,
    Aborted,
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            RunPhase::Idle => "idle",
            RunPhase::Running => "running",
            RunPhase::Completed => "completed",
            RunPhase::Aborted => "aborted",
        };
        write!(f, "{}", label)
    }
}

/// Why a position was skipped rather than acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    BudgetExhausted,
    MoveFailed,
    AutofocusFailed,
    SnapFailed,
    ConfluencyRejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedPosition {
    pub index: usize,
    pub label: String,
    pub reason: SkipReason,
}

/// Outcome counters for one run; persisted to the data directory as JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub positions_visited: usize,
    pub fovs_accepted: usize,
    pub autoexposure_runs: usize,
    pub stacks_captured: usize,
    pub skipped: Vec<SkippedPosition>,
}

impl RunSummary {
    fn skip(&mut self, index: usize, label: &str, reason: SkipReason) {
        warn!(index, label, ?reason, "skipping position");
        self.skipped.push(SkippedPosition {
            index,
            label: label.to_string(),
            reason,
        });
    }

    fn persist(&self, dir: &Path) -> AcqResult<()> {
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(dir.join(SUMMARY_FILE), text)?;
        Ok(())
    }
}

/// Drives a full plate acquisition against a [`MicroscopeGateway`].
pub struct AcquisitionController {
    settings: AcquisitionSettings,
    scope: Arc<dyn MicroscopeGateway>,
    confluency: Box<dyn ConfluencyCheck>,
    phase: RunPhase,
}

impl AcquisitionController {
    pub fn new(settings: AcquisitionSettings, scope: Arc<dyn MicroscopeGateway>) -> Self {
        Self {
            settings,
            scope,
            confluency: Box::new(AlwaysAccept),
            phase: RunPhase::Idle,
        }
    }

    pub fn with_confluency(mut self, check: Box<dyn ConfluencyCheck>) -> Self {
        self.confluency = check;
        self
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Reset the piezo z reference, then move the XY stage.
    async fn approach(&self, position: &Position) -> Result<(), DeviceFault> {
        self.scope.reset_z_reference().await?;
        self.scope.move_to(position).await
    }

    /// Apply the retry policy around the single-attempt focus call.
    /// Transient and warm-up faults are retried up to the configured
    /// attempt count; well-permanent faults are not, since retrying in
    /// the same well cannot succeed.
    async fn focus_with_retries(&self, autofocus: &AutofocusController) -> bool {
        for attempt in 1..=self.settings.autofocus_attempts.max(1) {
            match autofocus.focus(self.scope.as_ref()).await {
                Ok(()) => return true,
                Err(fault) => {
                    warn!(attempt, %fault, "autofocus attempt failed");
                    if fault.kind == FaultKind::WellPermanent {
                        return false;
                    }
                }
            }
        }
        false
    }

    /// Run the acquisition to completion.
    pub async fn run(&mut self) -> AcqResult<RunSummary> {
        self.phase = RunPhase::Running;
        match self.run_inner().await {
            Ok(summary) => {
                self.phase = RunPhase::Completed;
                Ok(summary)
            }
            Err(e) => {
                error!(error = %e, "acquisition aborted");
                self.phase = RunPhase::Aborted;
                Err(e)
            }
        }
    }

    async fn run_inner(&mut self) -> AcqResult<RunSummary> {
        self.settings.validate()?;
        if self.settings.env == Env::Prod && self.settings.data_dir.is_none() {
            return Err(AcqError::Setup(
                "a data directory is required in prod".to_string(),
            ));
        }
        if let Some(dir) = &self.settings.data_dir {
            std::fs::create_dir_all(dir)
                .map_err(|e| AcqError::Setup(format!("data directory unusable: {}", e)))?;
        }

        let positions = self.scope.position_list().await?;
        if positions.is_empty() {
            warn!("position list is empty, nothing to acquire");
        }
        info!(
            num_positions = positions.len(),
            env = ?self.settings.env,
            "starting acquisition"
        );

        let autofocus = AutofocusController::new(self.settings.focus_channel.clone());
        let autoexposure = AutoexposureEngine::new(self.settings.autoexposure.clone());
        let mut tracker = WellSiteTracker::new(self.settings.well_marker);
        let mut summary = RunSummary::default();
        let mut consecutive_move_failures: u32 = 0;
        let mut well_exposure: Option<AutoexposureResult> = None;

        for position in &positions {
            summary.positions_visited += 1;

            // Label parse failures abort: budgets and the well-scoped
            // fault policy are meaningless without a well identity.
            let new_well = tracker.observe(position)?;
            if new_well {
                well_exposure = None;
            }
            if tracker.budget_exhausted(self.settings.max_fovs_per_well) {
                summary.skip(position.index, &position.label, SkipReason::BudgetExhausted);
                continue;
            }

            if let Err(fault) = self.approach(position).await {
                consecutive_move_failures += 1;
                if consecutive_move_failures > self.settings.max_consecutive_move_failures {
                    error!(
                        failures = consecutive_move_failures,
                        "stage is not recovering, aborting"
                    );
                    return Err(fault.into());
                }
                warn!(%fault, "stage move failed");
                summary.skip(position.index, &position.label, SkipReason::MoveFailed);
                continue;
            }
            consecutive_move_failures = 0;

            if !self.focus_with_retries(&autofocus).await {
                summary.skip(position.index, &position.label, SkipReason::AutofocusFailed);
                continue;
            }

            // The focus channel is still selected at defaults.
            let snapshot = match self.scope.snap().await {
                Ok(image) => image,
                Err(fault) => {
                    warn!(%fault, "confluency snapshot failed");
                    summary.skip(position.index, &position.label, SkipReason::SnapFailed);
                    continue;
                }
            };
            if !self.confluency.evaluate(&snapshot) {
                summary.skip(
                    position.index,
                    &position.label,
                    SkipReason::ConfluencyRejected,
                );
                continue;
            }

            // At most one autoexposure per well, on the first FOV that
            // survives the checks above.
            let exposure = match well_exposure {
                Some(exposure) => exposure,
                None => {
                    let result = autoexposure
                        .run(self.scope.as_ref(), &self.settings.signal_channel)
                        .await;
                    summary.autoexposure_runs += 1;
                    well_exposure = Some(result);
                    result
                }
            };

            // Capture faults abort; a dead camera or full disk means
            // nothing further will be stored.
            self.scope
                .acquire_stack(
                    &self.settings.focus_channel,
                    &self.settings.stack,
                    self.settings.focus_channel.default_exposure_time,
                    self.settings.focus_channel.default_laser_power,
                )
                .await?;
            self.scope
                .acquire_stack(
                    &self.settings.signal_channel,
                    &self.settings.stack,
                    exposure.exposure_time_ms,
                    exposure.laser_power,
                )
                .await?;
            summary.stacks_captured += 2;

            tracker.record_accept();
            summary.fovs_accepted += 1;
        }

        self.scope.finalize_store().await?;
        if let Some(dir) = &self.settings.data_dir {
            summary.persist(dir)?;
        }
        info!(
            visited = summary.positions_visited,
            accepted = summary.fovs_accepted,
            skipped = summary.skipped.len(),
            "acquisition complete"
        );
        Ok(summary)
    }
}
