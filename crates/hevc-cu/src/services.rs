//! Contracts of the external collaborators the core drives.
//!
//! The analysis core owns the quadtree search; motion estimation, intra
//! search, transform/quantization and CABAC bit accounting live behind
//! these traits and return synchronously. Their failures propagate through
//! the core unchanged.

use crate::cu::CuNode;
use crate::enums::{FastSearch, PartSize, PredMode};
use crate::error::CuError;
use crate::picture::{MinUnit, MvField};
use crate::yuv::YuvBuffer;

/// Pure rate-distortion cost combiner.
pub fn rd_cost(lambda: f64, bits: u32, distortion: u64) -> f64 {
    lambda * bits as f64 + distortion as f64
}

/// One entry of the merge candidate list.
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeCandidate {
    pub mv_field: [MvField; 2],
    /// Bitmask of used prediction lists: bit 0 for L0, bit 1 for L1.
    pub inter_dir: u8,
}

/// Working sample buffers handed to a collaborator for one evaluation.
pub struct EvalBuffers<'a> {
    pub orig: &'a YuvBuffer,
    pub pred: &'a mut YuvBuffer,
    pub resi: &'a mut YuvBuffer,
    pub reco: &'a mut YuvBuffer,
}

/// Entropy coder: CABAC state snapshots plus symbol emission.
///
/// `State` snapshots are cheap value-typed copies; the driver keeps a
/// depth × role matrix of them around the recursion. Bit and bin counters
/// accumulate from the last [`reset_bits`](EntropyCoder::reset_bits).
pub trait EntropyCoder {
    type State: Clone + Default + PartialEq + std::fmt::Debug;

    fn save_state(&self) -> Self::State;
    fn load_state(&mut self, state: &Self::State);

    fn reset_bits(&mut self);
    fn bits_written(&self) -> u32;
    fn bins_written(&self) -> u32;

    fn code_split_flag(&mut self, split: bool, depth: u8);
    fn code_tqb_flag(&mut self, flag: bool);
    fn code_skip_flag(&mut self, skip: bool);
    fn code_merge_index(&mut self, index: u8);
    fn code_pred_mode(&mut self, mode: PredMode);
    fn code_part_size(&mut self, part: PartSize, depth: u8);
    /// IPCM flag plus raw sample payload for an intra 2N×2N CU.
    fn code_ipcm_info(&mut self, unit: &MinUnit);
    /// Prediction info (motion data or intra directions) of a decided CU.
    fn code_pred_info(&mut self, units: &[MinUnit]);
    fn code_delta_qp(&mut self, delta: i8);
    fn code_chroma_qp_adj(&mut self, idc: u8);
    /// Residual coefficients (and the transform tree) of a decided CU.
    fn code_coefficients(&mut self, units: &[MinUnit]);
    fn code_terminating_bit(&mut self, last: bool);
}

/// Everything the recursive driver calls out to.
///
/// One implementor bundles the prediction search, residual coding,
/// merge-candidate derivation, rate control, adaptive-QP activity and ARL
/// statistics collaborators on top of the entropy coder. Methods that
/// evaluate a candidate fill the tentative CU's units and update its total
/// bits, bins and distortion; the driver combines them into a cost.
pub trait EncoderServices: EntropyCoder {
    /// One-time setup of the motion search strategy, called at encoder
    /// construction.
    fn configure_search(&mut self, mode: FastSearch) {
        let _ = mode;
    }

    /// Lagrangian multiplier for `qp`; `lossless` selects the variant used
    /// for transquant-bypass evaluation.
    fn lambda(&self, qp: i8, lossless: bool) -> f64;

    /// Derive the merge candidate list for `cu`, at most
    /// [`MRG_MAX_NUM_CANDS`](crate::MRG_MAX_NUM_CANDS) entries.
    fn merge_candidates(&mut self, cu: &CuNode) -> Result<Vec<MergeCandidate>, CuError>;

    /// Motion-compensate `cu` with the given merge candidate.
    fn motion_compensation(
        &mut self,
        cu: &mut CuNode,
        bufs: EvalBuffers<'_>,
        cand: &MergeCandidate,
    ) -> Result<(), CuError>;

    /// Encode the inter residual of a motion-compensated tentative and
    /// update its totals. With `skip_residual` the residual is forced to
    /// zero and the CU coded as skip.
    fn encode_inter_residual(
        &mut self,
        cu: &mut CuNode,
        bufs: EvalBuffers<'_>,
        skip_residual: bool,
    ) -> Result<(), CuError>;

    /// Motion search for shape `part`; returns false when no useful motion
    /// was found and the candidate should be abandoned. With `merge_only`
    /// the search is restricted to merge candidates (AMP fast path).
    fn inter_search(
        &mut self,
        cu: &mut CuNode,
        bufs: EvalBuffers<'_>,
        part: PartSize,
        merge_only: bool,
    ) -> Result<bool, CuError>;

    /// Intra direction search plus residual coding for shape `part`.
    fn intra_search(
        &mut self,
        cu: &mut CuNode,
        bufs: EvalBuffers<'_>,
        part: PartSize,
    ) -> Result<(), CuError>;

    /// Raw-sample (IPCM) coding; reconstruction equals the original.
    fn ipcm_encode(&mut self, cu: &mut CuNode, bufs: EvalBuffers<'_>) -> Result<(), CuError>;

    /// Current target QP of the rate controller.
    fn rate_control_qp(&self) -> i8;

    /// Activity-derived QP offset for the CU at `(x, y)` of size `width`.
    fn activity_qp_offset(&self, x: u32, y: u32, width: u32) -> i8 {
        let _ = (x, y, width);
        0
    }

    /// Per-coefficient magnitude histogram sink, fed from inter luma
    /// residuals only.
    fn collect_arl_stats(&mut self, cu: &CuNode, resi: &YuvBuffer) {
        let _ = (cu, resi);
    }
}
