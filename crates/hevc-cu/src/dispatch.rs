//! Per-depth candidate enumeration.
//!
//! The dispatcher turns (depth, slice type, sequence options) into an
//! ordered list of tagged candidate descriptors. Conditions that depend on
//! how the node's evaluation is going (early skip, CBF fast mode, PCM
//! worthiness) travel as gates the driver re-checks right before each
//! evaluation.

use crate::config::CuAnalysisConfig;
use crate::cu::CuNode;
use crate::enums::{PartSize, PredMode, SliceType};
use crate::picture::SequenceParams;
use crate::services::rd_cost;
use crate::{CTU_SIZE, MAX_CU_DEPTH, MIN_CU_SIZE};

/// What a candidate evaluates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CandidateMode {
    /// Merge/skip 2N×2N over the merge candidate list.
    MergeSkip2Nx2N,
    /// Motion search with the given shape.
    Inter(PartSize),
    /// The asymmetric shapes; orientation resolved by [`select_amp`] at
    /// evaluation time.
    Amp,
    /// Intra search with the given shape.
    Intra(PartSize),
    /// Raw-sample coding.
    Ipcm,
}

/// Dynamic admission condition of a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Gate {
    Always,
    /// Blocked once merge evaluation detected an early skip.
    NotEarlySkip,
    /// Additionally blocked while CBF fast mode holds the PU shapes back.
    NotEarlySkipUnblocked,
    /// Intra in an inter slice needs residual evidence in the best so far.
    IntraAdmission,
    /// IPCM only when it can undercut the current best.
    PcmAdmission,
}

/// Evaluation-time state the gates consult.
#[derive(Debug, Clone, Copy)]
pub(crate) struct GateContext {
    pub early_skip: bool,
    pub pu_blocked: bool,
    pub slice_intra: bool,
    pub best_has_residual: bool,
    pub best_bits: u32,
    pub best_cost: f64,
    pub pcm_bits: u32,
    pub lambda: f64,
}

impl Gate {
    pub(crate) fn admits(self, ctx: &GateContext) -> bool {
        match self {
            Gate::Always => true,
            Gate::NotEarlySkip => !ctx.early_skip,
            Gate::NotEarlySkipUnblocked => !ctx.early_skip && !ctx.pu_blocked,
            Gate::IntraAdmission => {
                ctx.slice_intra || (!ctx.early_skip && ctx.best_has_residual)
            }
            Gate::PcmAdmission => {
                !ctx.early_skip
                    && (ctx.best_bits > ctx.pcm_bits
                        || ctx.best_cost > rd_cost(ctx.lambda, ctx.pcm_bits, 0))
            }
        }
    }
}

/// One candidate descriptor.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Candidate {
    pub mode: CandidateMode,
    pub gate: Gate,
}

/// Raw bit cost of coding a CU of `width` as IPCM (8-bit 4:2:0 samples).
pub(crate) fn pcm_raw_bits(width: u32) -> u32 {
    let luma = width * width * 8;
    let chroma = 2 * (width / 2) * (width / 2) * 8;
    luma + chroma
}

/// Ordered candidate list for one quadtree node.
pub(crate) fn candidate_plan(
    cfg: &CuAnalysisConfig,
    params: &SequenceParams,
    slice: SliceType,
    depth: u8,
    width: u32,
) -> Vec<Candidate> {
    let mut plan = Vec::new();
    let push = |plan: &mut Vec<Candidate>, mode, gate| plan.push(Candidate { mode, gate });
    let deepest = depth as usize == MAX_CU_DEPTH - 1;

    if slice.is_inter() {
        if cfg.use_early_skip_detection {
            push(&mut plan, CandidateMode::Inter(PartSize::Size2Nx2N), Gate::Always);
            push(&mut plan, CandidateMode::MergeSkip2Nx2N, Gate::Always);
        } else {
            push(&mut plan, CandidateMode::MergeSkip2Nx2N, Gate::Always);
            push(&mut plan, CandidateMode::Inter(PartSize::Size2Nx2N), Gate::Always);
        }
        if deepest && width > MIN_CU_SIZE {
            push(
                &mut plan,
                CandidateMode::Inter(PartSize::SizeNxN),
                Gate::NotEarlySkipUnblocked,
            );
        }
        push(
            &mut plan,
            CandidateMode::Inter(PartSize::SizeNx2N),
            Gate::NotEarlySkipUnblocked,
        );
        push(
            &mut plan,
            CandidateMode::Inter(PartSize::Size2NxN),
            Gate::NotEarlySkipUnblocked,
        );
        if params.amp_enabled && width > MIN_CU_SIZE {
            push(&mut plan, CandidateMode::Amp, Gate::NotEarlySkipUnblocked);
        }
    }

    push(
        &mut plan,
        CandidateMode::Intra(PartSize::Size2Nx2N),
        Gate::IntraAdmission,
    );
    if deepest && width > (1 << params.log2_min_tu_size) {
        push(
            &mut plan,
            CandidateMode::Intra(PartSize::SizeNxN),
            Gate::IntraAdmission,
        );
    }
    if params.pcm_size_admits(width) {
        push(&mut plan, CandidateMode::Ipcm, Gate::PcmAdmission);
    }
    plan
}

/// Which asymmetric orientations to evaluate, and whether restricted to
/// merge candidates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct AmpSelection {
    pub hor: bool,
    pub ver: bool,
    pub hor_merge: bool,
    pub ver_merge: bool,
}

/// Resolve the AMP orientations from the parent decision and the node's
/// current best.
pub(crate) fn select_amp(
    parent: Option<(PredMode, PartSize)>,
    best: &CuNode,
) -> AmpSelection {
    let mut sel = AmpSelection::default();
    let best_unit = best.first_unit();
    let best_part = best_unit.part_size;

    match parent {
        Some((PredMode::Inter, PartSize::Size2NxN)) => sel.hor = true,
        Some((PredMode::Inter, PartSize::SizeNx2N)) => sel.ver = true,
        Some((PredMode::Inter, PartSize::Size2Nx2N)) => {
            if !best_unit.merge && !best_unit.skip {
                sel.hor = true;
                sel.ver = true;
            }
        }
        Some((PredMode::Inter, p)) if p.is_amp() => {
            sel.hor_merge = true;
            sel.ver_merge = true;
        }
        Some((PredMode::Intra, _)) => match best_part {
            Some(PartSize::Size2NxN) => sel.hor_merge = true,
            Some(PartSize::SizeNx2N) => sel.ver_merge = true,
            _ => {}
        },
        _ => {}
    }
    if best_part == Some(PartSize::Size2Nx2N) && !best_unit.skip {
        sel.hor_merge = true;
        sel.ver_merge = true;
    }
    // Full AMP search is never run at 64×64.
    if best.width == CTU_SIZE {
        sel.hor = false;
        sel.ver = false;
    }
    sel
}

#[cfg(test)]
#[cfg_attr(all(test, coverage_nightly), coverage(off))]
mod tests {
    use super::*;

    fn modes(plan: &[Candidate]) -> Vec<CandidateMode> {
        plan.iter().map(|c| c.mode).collect()
    }

    #[test]
    fn test_intra_slice_plan() {
        let cfg = CuAnalysisConfig::default();
        let params = SequenceParams::new(128, 128);
        let plan = candidate_plan(&cfg, &params, SliceType::I, 0, 64);
        assert_eq!(
            modes(&plan),
            vec![CandidateMode::Intra(PartSize::Size2Nx2N)]
        );
        // The deepest CU also looks at intra N×N.
        let plan = candidate_plan(&cfg, &params, SliceType::I, 3, 8);
        assert_eq!(
            modes(&plan),
            vec![
                CandidateMode::Intra(PartSize::Size2Nx2N),
                CandidateMode::Intra(PartSize::SizeNxN)
            ]
        );
    }

    #[test]
    fn test_inter_plan_order_with_early_skip_detection() {
        let cfg = CuAnalysisConfig::builder().early_skip_detection(true).build();
        let params = SequenceParams::new(128, 128);
        let plan = candidate_plan(&cfg, &params, SliceType::P, 1, 32);
        assert_eq!(
            modes(&plan)[..2],
            [
                CandidateMode::Inter(PartSize::Size2Nx2N),
                CandidateMode::MergeSkip2Nx2N
            ]
        );
    }

    #[test]
    fn test_amp_in_plan_only_above_min_size() {
        let cfg = CuAnalysisConfig::default();
        let mut params = SequenceParams::new(128, 128);
        params.amp_enabled = true;
        let plan = candidate_plan(&cfg, &params, SliceType::B, 1, 32);
        assert!(modes(&plan).contains(&CandidateMode::Amp));
        let plan = candidate_plan(&cfg, &params, SliceType::B, 3, 8);
        assert!(!modes(&plan).contains(&CandidateMode::Amp));
    }

    #[test]
    fn test_pcm_candidate_needs_size_window() {
        let cfg = CuAnalysisConfig::default();
        let mut params = SequenceParams::new(128, 128);
        params.pcm_enabled = true;
        let plan = candidate_plan(&cfg, &params, SliceType::I, 1, 32);
        assert!(modes(&plan).contains(&CandidateMode::Ipcm));
        let plan = candidate_plan(&cfg, &params, SliceType::I, 0, 64);
        assert!(!modes(&plan).contains(&CandidateMode::Ipcm));
    }

    #[test]
    fn test_gates() {
        let mut ctx = GateContext {
            early_skip: false,
            pu_blocked: false,
            slice_intra: false,
            best_has_residual: true,
            best_bits: 100,
            best_cost: 5000.0,
            pcm_bits: 3000,
            lambda: 1.0,
        };
        assert!(Gate::NotEarlySkip.admits(&ctx));
        assert!(Gate::IntraAdmission.admits(&ctx));
        assert!(Gate::PcmAdmission.admits(&ctx));
        ctx.early_skip = true;
        assert!(!Gate::NotEarlySkip.admits(&ctx));
        assert!(!Gate::IntraAdmission.admits(&ctx));
        assert!(!Gate::PcmAdmission.admits(&ctx));
        ctx.slice_intra = true;
        assert!(Gate::IntraAdmission.admits(&ctx));
        ctx.early_skip = false;
        ctx.pu_blocked = true;
        assert!(!Gate::NotEarlySkipUnblocked.admits(&ctx));
    }

    #[test]
    fn test_pcm_gate_cost_test() {
        let ctx = GateContext {
            early_skip: false,
            pu_blocked: false,
            slice_intra: true,
            best_has_residual: false,
            best_bits: 100,
            best_cost: 500.0,
            pcm_bits: 3000,
            lambda: 1.0,
        };
        // Cheap best: raw PCM cannot undercut it.
        assert!(!Gate::PcmAdmission.admits(&ctx));
    }

    #[test]
    fn test_amp_follows_horizontal_parent() {
        let mut best = CuNode::new(1);
        best.init_root(0, 0, 30);
        best.fill_inter(PartSize::Size2Nx2N);
        let sel = select_amp(Some((PredMode::Inter, PartSize::Size2NxN)), &best);
        assert!(sel.hor);
        assert!(!sel.ver);
    }

    #[test]
    fn test_amp_both_for_unmerged_square_parent() {
        let mut best = CuNode::new(1);
        best.init_root(0, 0, 30);
        best.fill_inter(PartSize::SizeNx2N);
        let sel = select_amp(Some((PredMode::Inter, PartSize::Size2Nx2N)), &best);
        assert!(sel.hor && sel.ver);
    }

    #[test]
    fn test_amp_merge_only_for_asymmetric_parent() {
        let mut best = CuNode::new(2);
        best.init_root(0, 0, 30);
        best.fill_intra(PartSize::SizeNxN, 1);
        let sel = select_amp(Some((PredMode::Inter, PartSize::Size2NxnU)), &best);
        assert!(!sel.hor && !sel.ver);
        assert!(sel.hor_merge && sel.ver_merge);
    }

    #[test]
    fn test_amp_disabled_at_64() {
        let mut best = CuNode::new(0);
        best.init_root(0, 0, 30);
        best.fill_inter(PartSize::Size2Nx2N);
        let sel = select_amp(Some((PredMode::Inter, PartSize::Size2Nx2N)), &best);
        assert!(!sel.hor && !sel.ver);
        // Merge AMP stays available for the unskipped square best.
        assert!(sel.hor_merge && sel.ver_merge);
    }
}
