//! Deterministic mock collaborators for exercising the analysis core.
//!
//! [`MockServices`] stands in for the whole prediction/transform/entropy
//! stack: evaluations charge fixed bit counts and per-area distortions so
//! tests can steer which candidate wins, and every collaborator call is
//! recorded in [`calls`](MockServices::calls) for inspection.

use crate::cu::CuNode;
use crate::dispatch::pcm_raw_bits;
use crate::enums::{FastSearch, PartSize, PredMode};
use crate::error::CuError;
use crate::picture::{MinUnit, MotionVector, MvField};
use crate::services::{EncoderServices, EntropyCoder, EvalBuffers, MergeCandidate};
use crate::yuv::YuvBuffer;

/// Initialize tracing for tests with appropriate settings
#[cfg(test)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer() // Write to test output
        .try_init();
}

/// Mock of every external collaborator, with a rolling-hash entropy state.
#[derive(Debug, Clone)]
pub struct MockServices {
    /// Entropy-coder state; evolves with every coded symbol.
    pub state: u64,
    /// Bits written since the last reset.
    pub bits: u32,
    /// Bins written since the last reset.
    pub bins: u32,
    /// Log of collaborator invocations, in order.
    pub calls: Vec<String>,
    /// Number of merge candidates handed out.
    pub merge_count: usize,
    /// Per-64-sample distortion of a merge CU coded with residual.
    pub merge_distortion: u64,
    /// Per-64-sample distortion of a skipped CU.
    pub skip_distortion: u64,
    /// Per-64-sample distortion of a motion-searched CU.
    pub inter_distortion: u64,
    /// Per-64-sample distortion of an intra CU.
    pub intra_distortion: u64,
    /// Bit cost charged per candidate evaluation.
    pub mode_bits: u32,
    /// Lagrangian multiplier, independent of QP for predictability.
    pub lambda_value: f64,
    /// Rate-controller target QP.
    pub rc_qp: i8,
    /// Activity-derived QP offset.
    pub activity_offset: i8,
    /// Whether motion search reports a usable result.
    pub inter_search_succeeds: bool,
    /// Whether residual coding leaves coefficients behind.
    pub residual_nonzero: bool,
    /// Extra distortion charged to CUs at least this wide; drives tests
    /// that need the recursion to descend.
    pub penalize_width_at_least: Option<u32>,
    /// Amount of that extra distortion.
    pub width_penalty: u64,
    /// Number of ARL statistic collections.
    pub arl_collected: u32,
}

impl Default for MockServices {
    fn default() -> Self {
        Self {
            state: 0,
            bits: 0,
            bins: 0,
            calls: Vec::new(),
            merge_count: 2,
            merge_distortion: 110,
            skip_distortion: 120,
            inter_distortion: 100,
            intra_distortion: 130,
            mode_bits: 8,
            lambda_value: 1.0,
            rc_qp: 30,
            activity_offset: 0,
            inter_search_succeeds: true,
            residual_nonzero: true,
            penalize_width_at_least: None,
            width_penalty: 0,
            arl_collected: 0,
        }
    }
}

impl MockServices {
    fn mix(&mut self, value: u64) {
        self.state = self.state.rotate_left(7) ^ value.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    }

    fn emit(&mut self, call: String, bits: u32) {
        self.mix(bits as u64 ^ call.len() as u64);
        self.bits += bits;
        self.bins += bits;
        self.calls.push(call);
    }

    fn area_distortion(&self, cu: &CuNode, per_64: u64) -> u64 {
        let area = (cu.width * cu.width) as u64;
        let mut distortion = per_64 * area / 64;
        if let Some(threshold) = self.penalize_width_at_least {
            if cu.width >= threshold {
                distortion += self.width_penalty;
            }
        }
        distortion
    }

    fn charge(&mut self, cu: &mut CuNode, bits: u32, distortion: u64) {
        self.bits += bits;
        self.bins += bits;
        self.mix(bits as u64 ^ distortion);
        cu.total_bits += bits;
        cu.total_bins += bits;
        cu.total_distortion = distortion;
    }
}

impl EntropyCoder for MockServices {
    type State = u64;

    fn save_state(&self) -> u64 {
        self.state
    }

    fn load_state(&mut self, state: &u64) {
        self.state = *state;
    }

    fn reset_bits(&mut self) {
        self.bits = 0;
        self.bins = 0;
    }

    fn bits_written(&self) -> u32 {
        self.bits
    }

    fn bins_written(&self) -> u32 {
        self.bins
    }

    fn code_split_flag(&mut self, split: bool, depth: u8) {
        self.emit(format!("code_split_flag {split} d{depth}"), 1);
    }

    fn code_tqb_flag(&mut self, flag: bool) {
        self.emit(format!("code_tqb_flag {flag}"), 1);
    }

    fn code_skip_flag(&mut self, skip: bool) {
        self.emit(format!("code_skip_flag {skip}"), 1);
    }

    fn code_merge_index(&mut self, index: u8) {
        self.emit(format!("code_merge_index {index}"), 2);
    }

    fn code_pred_mode(&mut self, mode: PredMode) {
        self.emit(format!("code_pred_mode {mode:?}"), 1);
    }

    fn code_part_size(&mut self, part: PartSize, depth: u8) {
        self.emit(format!("code_part_size {part:?} d{depth}"), 3);
    }

    fn code_ipcm_info(&mut self, unit: &MinUnit) {
        self.emit(format!("code_ipcm_info ipcm={}", unit.ipcm), 4);
    }

    fn code_pred_info(&mut self, units: &[MinUnit]) {
        self.emit(format!("code_pred_info {}", units.len()), 16);
    }

    fn code_delta_qp(&mut self, delta: i8) {
        self.emit(format!("code_delta_qp {delta}"), 3);
    }

    fn code_chroma_qp_adj(&mut self, idc: u8) {
        self.emit(format!("code_chroma_qp_adj {idc}"), 2);
    }

    fn code_coefficients(&mut self, units: &[MinUnit]) {
        let bits = if units.iter().any(|u| u.has_residual()) {
            32
        } else {
            2
        };
        self.emit(format!("code_coefficients {}", units.len()), bits);
    }

    fn code_terminating_bit(&mut self, last: bool) {
        self.emit(format!("code_terminating_bit {last}"), 1);
    }
}

impl EncoderServices for MockServices {
    fn configure_search(&mut self, mode: FastSearch) {
        self.calls.push(format!("configure_search {mode:?}"));
    }

    fn lambda(&self, _qp: i8, _lossless: bool) -> f64 {
        self.lambda_value
    }

    fn merge_candidates(&mut self, cu: &CuNode) -> Result<Vec<MergeCandidate>, CuError> {
        self.calls.push(format!("merge_candidates w{}", cu.width));
        Ok((0..self.merge_count)
            .map(|i| MergeCandidate {
                mv_field: [
                    MvField {
                        mv: MotionVector {
                            x: i as i16,
                            y: i as i16,
                        },
                        ref_idx: 0,
                    },
                    MvField::default(),
                ],
                inter_dir: 1,
            })
            .collect())
    }

    fn motion_compensation(
        &mut self,
        cu: &mut CuNode,
        bufs: EvalBuffers<'_>,
        _cand: &MergeCandidate,
    ) -> Result<(), CuError> {
        self.calls
            .push(format!("motion_compensation w{}", cu.width));
        bufs.pred.y.copy_from_slice(&bufs.orig.y);
        Ok(())
    }

    fn encode_inter_residual(
        &mut self,
        cu: &mut CuNode,
        bufs: EvalBuffers<'_>,
        skip_residual: bool,
    ) -> Result<(), CuError> {
        self.calls.push(format!(
            "encode_inter_residual w{} skip={}",
            cu.width, skip_residual
        ));
        bufs.reco.y.copy_from_slice(&bufs.pred.y);
        let (factor, bits) = if skip_residual {
            (self.skip_distortion, self.mode_bits)
        } else if cu.first_unit().merge {
            (self.merge_distortion, self.mode_bits + 4)
        } else {
            (self.inter_distortion, self.mode_bits + 4)
        };
        if !skip_residual && self.residual_nonzero {
            for unit in &mut cu.units {
                unit.cbf_y = true;
            }
        }
        let distortion = self.area_distortion(cu, factor);
        self.charge(cu, bits, distortion);
        Ok(())
    }

    fn inter_search(
        &mut self,
        cu: &mut CuNode,
        _bufs: EvalBuffers<'_>,
        part: PartSize,
        merge_only: bool,
    ) -> Result<bool, CuError> {
        self.calls.push(format!(
            "inter_search {part:?} w{} merge_only={merge_only}",
            cu.width
        ));
        if !self.inter_search_succeeds {
            return Ok(false);
        }
        for unit in &mut cu.units {
            unit.mv[0] = MvField {
                mv: MotionVector { x: 1, y: -1 },
                ref_idx: 0,
            };
        }
        Ok(true)
    }

    fn intra_search(
        &mut self,
        cu: &mut CuNode,
        bufs: EvalBuffers<'_>,
        part: PartSize,
    ) -> Result<(), CuError> {
        self.calls
            .push(format!("intra_search {part:?} w{}", cu.width));
        bufs.reco.y.copy_from_slice(&bufs.orig.y);
        for unit in &mut cu.units {
            unit.intra_dir = 10;
            unit.cbf_y = self.residual_nonzero;
        }
        let distortion = self.area_distortion(cu, self.intra_distortion);
        self.charge(cu, self.mode_bits + 4, distortion);
        Ok(())
    }

    fn ipcm_encode(&mut self, cu: &mut CuNode, bufs: EvalBuffers<'_>) -> Result<(), CuError> {
        self.calls.push(format!("ipcm_encode w{}", cu.width));
        bufs.reco.y.copy_from_slice(&bufs.orig.y);
        let bits = pcm_raw_bits(cu.width);
        self.charge(cu, bits, 0);
        Ok(())
    }

    fn rate_control_qp(&self) -> i8 {
        self.rc_qp
    }

    fn activity_qp_offset(&self, _x: u32, _y: u32, _width: u32) -> i8 {
        self.activity_offset
    }

    fn collect_arl_stats(&mut self, _cu: &CuNode, _resi: &YuvBuffer) {
        self.arl_collected += 1;
        self.calls.push("collect_arl_stats".to_string());
    }
}
