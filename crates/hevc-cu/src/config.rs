use std::fmt::Display;

use crate::enums::{CostMode, FastSearch};
use crate::error::CuError;

/// Neighbor-strip widths supported by the similarity probes.
const SUPPORTED_RADII: [u32; 4] = [8, 16, 32, 64];

/// Options read by the CU analysis core.
///
/// Everything here either alters the candidate set evaluated per quadtree
/// node or the QP range iterated per candidate. Validation happens once at
/// encoder construction; an inconsistent configuration is fatal.
#[derive(Debug, Clone)]
pub struct CuAnalysisConfig {
    /// Similarity-based depth pruning per CTU (inter slices only).
    pub use_sbd: bool,
    /// Reduced-region similarity pruning per 32×32 sub-CTU (inter slices only).
    pub use_rrsp: bool,
    /// Neighbor-strip width in samples consulted by the probes.
    pub sbd_radius: u32,
    /// Pin the QP range to the rate controller's current target.
    pub use_rate_control: bool,
    /// Apply an activity-derived QP offset per CU.
    pub use_adaptive_qp: bool,
    /// Clamp for the adaptive-QP offset.
    pub qp_adaptation_range: i8,
    /// Collect per-coefficient magnitude statistics from inter luma residuals.
    pub use_adapt_qp_select: bool,
    /// Stop recursing below a node whose winner is fully skipped.
    pub use_early_cu: bool,
    /// Evaluate inter 2N×2N before merge and honor the merge early-out.
    pub use_early_skip_detection: bool,
    /// Skip sibling partition shapes once a winner has a zero root CBF.
    pub use_cbf_fast_mode: bool,
    /// Restrict merge evaluation once a skipped winner is found.
    pub use_fast_decision_for_merge: bool,
    /// Motion search strategy forwarded to the prediction service.
    pub fast_search: FastSearch,
    /// Half-width of the QP range tried at CUs that may code a delta QP.
    pub max_delta_qp: i8,
    /// Cost combination rule.
    pub cost_mode: CostMode,
    /// Forced value of the per-CU transquant-bypass flag, when configured.
    pub tqb_force_value: bool,
}

impl Default for CuAnalysisConfig {
    fn default() -> Self {
        Self {
            use_sbd: false,
            use_rrsp: false,
            sbd_radius: 8,
            use_rate_control: false,
            use_adaptive_qp: false,
            qp_adaptation_range: 6,
            use_adapt_qp_select: false,
            use_early_cu: false,
            use_early_skip_detection: false,
            use_cbf_fast_mode: false,
            use_fast_decision_for_merge: false,
            fast_search: FastSearch::Normal,
            max_delta_qp: 0,
            cost_mode: CostMode::Standard,
            tqb_force_value: false,
        }
    }
}

impl Display for CuAnalysisConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "CuAnalysisConfig {{ sbd: {}, rrsp: {}, radius: {}, dqp: {}, cost: {:?} }}",
            self.use_sbd, self.use_rrsp, self.sbd_radius, self.max_delta_qp, self.cost_mode
        )
    }
}

impl CuAnalysisConfig {
    pub fn builder() -> CuAnalysisConfigBuilder {
        CuAnalysisConfigBuilder::default()
    }

    /// Reject inconsistent option combinations. Called once at encoder
    /// construction; failures are fatal.
    pub fn validate(&self) -> Result<(), CuError> {
        if self.use_sbd && !SUPPORTED_RADII.contains(&self.sbd_radius) {
            return Err(CuError::InvalidConfig(format!(
                "similarity radius {} not in {:?}",
                self.sbd_radius, SUPPORTED_RADII
            )));
        }
        if self.max_delta_qp < 0 {
            return Err(CuError::InvalidConfig(format!(
                "max delta QP must be non-negative, got {}",
                self.max_delta_qp
            )));
        }
        if self.use_adaptive_qp && self.qp_adaptation_range <= 0 {
            return Err(CuError::InvalidConfig(format!(
                "QP adaptation range must be positive, got {}",
                self.qp_adaptation_range
            )));
        }
        Ok(())
    }
}

/// Builder for [`CuAnalysisConfig`].
#[derive(Debug, Clone, Default)]
pub struct CuAnalysisConfigBuilder {
    config: CuAnalysisConfig,
}

impl CuAnalysisConfigBuilder {
    pub fn sbd(mut self, enabled: bool) -> Self {
        self.config.use_sbd = enabled;
        self
    }

    pub fn rrsp(mut self, enabled: bool) -> Self {
        self.config.use_rrsp = enabled;
        self
    }

    pub fn sbd_radius(mut self, radius: u32) -> Self {
        self.config.sbd_radius = radius;
        self
    }

    pub fn rate_control(mut self, enabled: bool) -> Self {
        self.config.use_rate_control = enabled;
        self
    }

    pub fn adaptive_qp(mut self, enabled: bool, range: i8) -> Self {
        self.config.use_adaptive_qp = enabled;
        self.config.qp_adaptation_range = range;
        self
    }

    pub fn adapt_qp_select(mut self, enabled: bool) -> Self {
        self.config.use_adapt_qp_select = enabled;
        self
    }

    pub fn early_cu(mut self, enabled: bool) -> Self {
        self.config.use_early_cu = enabled;
        self
    }

    pub fn early_skip_detection(mut self, enabled: bool) -> Self {
        self.config.use_early_skip_detection = enabled;
        self
    }

    pub fn cbf_fast_mode(mut self, enabled: bool) -> Self {
        self.config.use_cbf_fast_mode = enabled;
        self
    }

    pub fn fast_decision_for_merge(mut self, enabled: bool) -> Self {
        self.config.use_fast_decision_for_merge = enabled;
        self
    }

    pub fn fast_search(mut self, mode: FastSearch) -> Self {
        self.config.fast_search = mode;
        self
    }

    pub fn max_delta_qp(mut self, delta: i8) -> Self {
        self.config.max_delta_qp = delta;
        self
    }

    pub fn cost_mode(mut self, mode: CostMode) -> Self {
        self.config.cost_mode = mode;
        self
    }

    pub fn tqb_force_value(mut self, value: bool) -> Self {
        self.config.tqb_force_value = value;
        self
    }

    pub fn build(self) -> CuAnalysisConfig {
        self.config
    }
}
