//! Per-depth QP loop planning.
//!
//! The candidate loop iterates an explicit sequence of [`QpPoint`]s instead
//! of aliasing a scalar loop variable through a sentinel: when transquant
//! bypass is available the lossless point comes first, then the lossy QPs.

use crate::MAX_QP;
use crate::config::CuAnalysisConfig;
use crate::picture::SequenceParams;
use crate::services::EncoderServices;

/// One iteration of the per-depth QP loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QpPoint {
    /// Transquant-bypass evaluation at the lowest QP.
    Lossless,
    /// Lossy evaluation at the given QP.
    Lossy(i8),
}

/// QP loop bounds for one quadtree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct QpRangePlan {
    pub min_qp: i8,
    pub max_qp: i8,
    /// Prepend a lossless iteration.
    pub lossless_first: bool,
    /// QP substituted for the lossless iteration.
    pub lowest_qp: i8,
}

impl QpRangePlan {
    pub(crate) fn points(&self) -> impl Iterator<Item = QpPoint> + use<> {
        let lossless = self.lossless_first.then_some(QpPoint::Lossless);
        lossless
            .into_iter()
            .chain((self.min_qp..=self.max_qp).map(QpPoint::Lossy))
    }
}

/// Compute the QP loop bounds for a CU of `width` at `(x, y)`.
///
/// `cur_qp` is the QP inherited by the node from its parent tentative; it
/// pins the range once the CU is smaller than the minimum delta-QP size.
#[allow(clippy::too_many_arguments)]
pub(crate) fn plan<S: EncoderServices>(
    cfg: &CuAnalysisConfig,
    params: &SequenceParams,
    services: &S,
    slice_qp: i8,
    cur_qp: i8,
    x: u32,
    y: u32,
    width: u32,
) -> QpRangePlan {
    let lowest_qp = -params.qp_bd_offset_y;
    let (mut min_qp, mut max_qp);
    if width >= params.min_cu_dqp_size() {
        let mut base = slice_qp;
        if cfg.use_adaptive_qp {
            let offset = services
                .activity_qp_offset(x, y, width)
                .clamp(-cfg.qp_adaptation_range, cfg.qp_adaptation_range);
            base = (base + offset).clamp(lowest_qp, MAX_QP);
        }
        min_qp = (base - cfg.max_delta_qp).max(lowest_qp);
        max_qp = (base + cfg.max_delta_qp).min(MAX_QP);
    } else {
        // At or below the minimum delta-QP size no new QP may be coded.
        min_qp = cur_qp;
        max_qp = cur_qp;
    }
    if cfg.use_rate_control {
        let rc_qp = services.rate_control_qp();
        min_qp = rc_qp;
        max_qp = rc_qp;
    }
    let lossless_first = params.tqb_enabled;
    if lossless_first && cfg.tqb_force_value {
        max_qp = min_qp;
    }
    QpRangePlan {
        min_qp,
        max_qp,
        lossless_first,
        lowest_qp,
    }
}
