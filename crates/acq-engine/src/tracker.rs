//! Well and site bookkeeping during position iteration.
//!
//! The tracker turns the flat position list into per-well structure: it
//! detects well boundaries, counts accepted FOVs, and answers whether the
//! current well's budget is exhausted. Labels that fail to parse are a hard
//! error in both marker modes; budgets and well-scoped fault policy cannot
//! work without a well identity.

use tracing::debug;

use acq_core::error::AcqResult;
use acq_core::position::{parse_site_label, Position, WellId, WellMarker};

/// Tracks the current well and its accepted-FOV count across positions.
#[derive(Debug)]
pub struct WellSiteTracker {
    marker: WellMarker,
    current_well: Option<WellId>,
    accepted_in_well: u32,
}

impl WellSiteTracker {
    pub fn new(marker: WellMarker) -> Self {
        Self {
            marker,
            current_well: None,
            accepted_in_well: 0,
        }
    }

    /// Record a visit to `position`. Returns true when the position starts
    /// a new well, which resets the accepted-FOV count.
    pub fn observe(&mut self, position: &Position) -> AcqResult<bool> {
        let (well, site) = parse_site_label(&position.label)?;
        let new_well = match self.marker {
            WellMarker::ParsedSite => site == 0,
            WellMarker::SiteLabel => WellMarker::SITE_LABEL_MARKERS
                .iter()
                .any(|marker| position.label.contains(marker)),
        };
        if new_well {
            debug!(well = %well, "entering new well");
            self.current_well = Some(well);
            self.accepted_in_well = 0;
        }
        Ok(new_well)
    }

    pub fn current_well(&self) -> Option<WellId> {
        self.current_well
    }

    /// Whether the current well has already accepted `max_fovs` FOVs.
    pub fn budget_exhausted(&self, max_fovs: u32) -> bool {
        self.accepted_in_well >= max_fovs
    }

    pub fn record_accept(&mut self) {
        self.accepted_in_well += 1;
    }

    pub fn accepted_in_well(&self) -> u32 {
        self.accepted_in_well
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use acq_core::error::AcqError;

    fn positions(labels: &[&str]) -> Vec<Position> {
        labels
            .iter()
            .enumerate()
            .map(|(i, l)| Position::new(i, *l))
            .collect()
    }

    #[test]
    fn parsed_site_mode_flags_exactly_first_sites() {
        let mut tracker = WellSiteTracker::new(WellMarker::ParsedSite);
        let flags: Vec<bool> = positions(&[
            "A1-Site_0",
            "A1-Site_1",
            "A1-Site_2",
            "B7-Site_0",
            "B7-Site_1",
        ])
        .iter()
        .map(|p| tracker.observe(p).unwrap())
        .collect();
        assert_eq!(flags, vec![true, false, false, true, false]);
        assert_eq!(tracker.current_well(), Some(WellId::new('B', 7)));
    }

    #[test]
    fn site_label_mode_uses_marker_substring() {
        let mut tracker = WellSiteTracker::new(WellMarker::SiteLabel);
        assert!(tracker.observe(&Position::new(0, "A1-Site_0")).unwrap());
        assert!(!tracker.observe(&Position::new(1, "A1-Site_1")).unwrap());
        assert!(tracker.observe(&Position::new(2, "A2-Site_0")).unwrap());
    }

    #[test]
    fn malformed_label_is_a_hard_error_in_both_modes() {
        for marker in [WellMarker::ParsedSite, WellMarker::SiteLabel] {
            let mut tracker = WellSiteTracker::new(marker);
            let err = tracker
                .observe(&Position::new(0, "Well_3_Point_2"))
                .unwrap_err();
            assert!(matches!(err, AcqError::MalformedLabel(_)));
        }
    }

    #[test]
    fn budget_resets_on_well_boundary() {
        let mut tracker = WellSiteTracker::new(WellMarker::ParsedSite);
        tracker.observe(&Position::new(0, "A1-Site_0")).unwrap();
        tracker.record_accept();
        tracker.record_accept();
        assert!(tracker.budget_exhausted(2));
        assert!(!tracker.budget_exhausted(3));

        tracker.observe(&Position::new(1, "A2-Site_0")).unwrap();
        assert!(!tracker.budget_exhausted(2));
        assert_eq!(tracker.accepted_in_well(), 0);
    }
}
