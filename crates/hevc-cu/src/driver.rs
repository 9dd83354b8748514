//! Recursive rate-distortion driver.
//!
//! `compress_ctu` walks the quadtree of one CTU depth-first. At each node it
//! evaluates the admitted prediction candidates against the per-depth best
//! buffer, recurses into the four Z-order children, and keeps whichever of
//! unsplit/split costs less. Entropy-coder snapshots move through a
//! depth × role matrix so bit costs accumulate consistently with the final
//! emission order.

use tracing::{debug, trace};

use crate::config::CuAnalysisConfig;
use crate::context::{ContextMatrix, ContextRole};
use crate::cu::CuNode;
use crate::depth_set::DepthSet;
use crate::dispatch::{self, Candidate, CandidateMode, GateContext};
use crate::encode;
use crate::enums::{CostMode, PartSize, PredMode};
use crate::error::CuError;
use crate::neighbor::{CtuNeighborhood, ProbeTables};
use crate::picture::{Picture, PictureRegistry};
use crate::qp::{self, QpPoint};
use crate::rrsp::{self, RrspTables};
use crate::sbd;
use crate::services::{EncoderServices, EvalBuffers, rd_cost};
use crate::yuv::YuvBuffer;
use crate::zscan::ZscanTables;
use crate::{MAX_CU_DEPTH, MRG_MAX_NUM_CANDS, cu_size_at_depth};

/// Decision of the parent node, forwarded to the dispatcher.
type ParentInfo = Option<(PredMode, PartSize)>;

/// The CU analysis engine. Owns the per-depth working buffers and the
/// entropy-context matrix; drives the collaborator services.
pub struct CuEncoder<S: EncoderServices> {
    cfg: CuAnalysisConfig,
    services: S,
    tables: ZscanTables,
    probes: ProbeTables,
    rrsp_tables: RrspTables,
    best_cu: Vec<CuNode>,
    temp_cu: Vec<CuNode>,
    orig_yuv: Vec<YuvBuffer>,
    pred_best: Vec<YuvBuffer>,
    pred_temp: Vec<YuvBuffer>,
    resi_best: Vec<YuvBuffer>,
    resi_temp: Vec<YuvBuffer>,
    reco_best: Vec<YuvBuffer>,
    reco_temp: Vec<YuvBuffer>,
    ctx: ContextMatrix<S::State>,
    range_depths: DepthSet,
    reduced_range: DepthSet,
    only_depth0: bool,
    check_64x64: bool,
}

impl<S: EncoderServices> CuEncoder<S> {
    pub fn new(cfg: CuAnalysisConfig, mut services: S) -> Result<Self, CuError> {
        cfg.validate()?;
        services.configure_search(cfg.fast_search);
        let depths = 0..MAX_CU_DEPTH as u8;
        let buffers = || {
            depths
                .clone()
                .map(|d| YuvBuffer::new(cu_size_at_depth(d), cu_size_at_depth(d)))
                .collect::<Vec<_>>()
        };
        Ok(Self {
            cfg,
            services,
            tables: ZscanTables::new(),
            probes: ProbeTables::new(),
            rrsp_tables: RrspTables::new(),
            best_cu: depths.clone().map(CuNode::new).collect(),
            temp_cu: depths.clone().map(CuNode::new).collect(),
            orig_yuv: buffers(),
            pred_best: buffers(),
            pred_temp: buffers(),
            resi_best: buffers(),
            resi_temp: buffers(),
            reco_best: buffers(),
            reco_temp: buffers(),
            ctx: ContextMatrix::new(),
            range_depths: DepthSet::all_cu_depths(),
            reduced_range: DepthSet::all_reduced_depths(),
            only_depth0: false,
            check_64x64: true,
        })
    }

    pub fn config(&self) -> &CuAnalysisConfig {
        &self.cfg
    }

    pub fn services(&self) -> &S {
        &self.services
    }

    pub fn services_mut(&mut self) -> &mut S {
        &mut self.services
    }

    /// Compress one CTU: decide its quadtree, write the decision into the
    /// picture's CU store and its reconstruction into the picture planes.
    pub fn compress_ctu(
        &mut self,
        refs: &PictureRegistry,
        pic: &mut Picture,
        ctu: usize,
    ) -> Result<(), CuError> {
        let (x, y) = pic.ctu_origin(ctu);
        self.best_cu[0].init_root(x, y, pic.slice_qp);
        self.temp_cu[0].init_root(x, y, pic.slice_qp);
        let entry = self.services.save_state();
        self.ctx.store(0, ContextRole::CurrBest, entry);

        self.range_depths = DepthSet::all_cu_depths();
        self.reduced_range = DepthSet::all_reduced_depths();
        self.only_depth0 = false;
        self.check_64x64 = true;
        if pic.slice_type.is_inter() && (self.cfg.use_sbd || self.cfg.use_rrsp) {
            let nb = CtuNeighborhood::gather(
                pic,
                refs,
                ctu,
                self.cfg.sbd_radius,
                &self.probes,
                &self.tables,
            );
            if self.cfg.use_sbd {
                self.range_depths = sbd::classify(&nb);
            }
            if self.cfg.use_rrsp {
                let d0 = rrsp::classify_depth0(pic, refs, ctu, pic.slice_qp, &nb);
                self.only_depth0 = d0.only_depth0;
                self.check_64x64 = d0.check_64x64;
            }
        }

        self.compress_node(refs, pic, ctu, 0, None)?;

        let root = &self.best_cu[0];
        debug!(
            ctu,
            cost = root.total_cost,
            bits = root.total_bits,
            depth0 = root.first_unit().depth,
            "CTU compressed"
        );
        Ok(())
    }

    /// Run the serialization walk for a compressed CTU, starting from the
    /// entropy context compression started from.
    pub fn encode_ctu(&mut self, pic: &Picture, ctu: usize) {
        let state = self.ctx.get(0, ContextRole::CurrBest).clone();
        self.services.load_state(&state);
        encode::encode_ctu(&mut self.services, &self.tables, pic, ctu);
    }

    fn compress_node(
        &mut self,
        refs: &PictureRegistry,
        pic: &mut Picture,
        ctu: usize,
        depth: usize,
        parent: ParentInfo,
    ) -> Result<(), CuError> {
        let width = cu_size_at_depth(depth as u8);
        let (x, y) = (self.best_cu[depth].x, self.best_cu[depth].y);
        self.orig_yuv[depth].copy_from_picture(&pic.orig, x, y);

        let in_boundary = pic.cu_in_boundary(x, y, width);
        let slice_intra = pic.slice_type.is_intra();
        let sbd_active = self.cfg.use_sbd && !slice_intra;
        let rrsp_active = self.cfg.use_rrsp && !slice_intra;

        let sbd_self = !sbd_active || self.range_depths.contains_depth(depth as u8);
        let rrsp_self = !rrsp_active
            || match depth {
                0 => self.check_64x64 || self.only_depth0,
                d => self.reduced_range.contains_depth(d as u8 - 1),
            };
        let allow_self = in_boundary && sbd_self && rrsp_self;

        let can_split = depth + 1 < MAX_CU_DEPTH;
        let sbd_split = !sbd_active || self.range_depths.any_deeper_than(depth as u8);
        let rrsp_split = !rrsp_active
            || match depth {
                0 => !self.only_depth0,
                d => self.reduced_range.any_deeper_than(d as u8 - 1),
            };
        let allow_split = if in_boundary {
            can_split && sbd_split && rrsp_split
        } else {
            // Boundary nodes never evaluate themselves, they only recurse.
            can_split
        };

        let mut early_skip = false;
        if allow_self {
            self.evaluate_candidates(pic, depth, parent, &mut early_skip)?;
            if can_split && self.best_cu[depth].has_valid_decision() {
                self.add_unsplit_flag_bits(depth);
            }
        }

        let mut sub_branch = true;
        if allow_self && self.best_cu[depth].has_valid_decision() {
            if self.cfg.use_early_cu && self.best_cu[depth].is_fully_skipped() {
                sub_branch = false;
            } else if self.cfg.use_early_skip_detection && early_skip {
                sub_branch = false;
            }
        }

        if allow_split && sub_branch {
            self.compress_split(refs, pic, ctu, depth, in_boundary)?;
        }

        self.assert_decided(pic, ctu, depth);
        let best = &self.best_cu[depth];
        pic.write_ctu_region(ctu, best.z_offset, &best.units);
        self.reco_best[depth].copy_to_picture(&mut pic.reco, x, y);
        Ok(())
    }

    /// The sentinel-failure check of the node procedure: a finished node
    /// must carry a finite cost and a full decision over its in-picture
    /// units. Out-of-picture units of boundary CTUs stay undecided.
    fn assert_decided(&self, pic: &Picture, ctu: usize, depth: usize) {
        let best = &self.best_cu[depth];
        if best.total_cost >= f64::MAX {
            panic!(
                "no finite-cost decision at CTU {} depth {} (origin {},{})",
                ctu, depth, best.x, best.y
            );
        }
        let (ctu_x, ctu_y) = pic.ctu_origin(ctu);
        for (i, unit) in best.units.iter().enumerate() {
            let (dx, dy) = self.tables.pixel_of_zscan(best.z_offset + i);
            let (ux, uy) = (ctu_x + dx, ctu_y + dy);
            if ux >= pic.params.pic_width || uy >= pic.params.pic_height {
                continue;
            }
            if unit.part_size.is_none() || unit.pred_mode.is_none() {
                panic!(
                    "undecided minimum unit {} at CTU {} depth {}",
                    best.z_offset + i,
                    ctu,
                    depth
                );
            }
        }
    }

    /// Evaluate the four children as a split tentative and keep the winner.
    fn compress_split(
        &mut self,
        refs: &PictureRegistry,
        pic: &mut Picture,
        ctu: usize,
        depth: usize,
        in_boundary: bool,
    ) -> Result<(), CuError> {
        let width = cu_size_at_depth(depth as u8);
        let half = width / 2;
        let node_qp = self.temp_cu[depth].qp;
        let (x, y) = (self.temp_cu[depth].x, self.temp_cu[depth].y);
        let z_offset = self.temp_cu[depth].z_offset;
        let quarter_units = self.temp_cu[depth].units.len() / 4;
        self.temp_cu[depth].prepare_split(node_qp);

        let parent_info: ParentInfo = {
            let unit = self.best_cu[depth].first_unit();
            match (unit.pred_mode, unit.part_size) {
                (Some(mode), Some(part)) if self.best_cu[depth].has_valid_decision() => {
                    Some((mode, part))
                }
                _ => None,
            }
        };

        let saved_range = self.range_depths;
        let saved_reduced = self.reduced_range;
        for child in 0..4 {
            let cx = x + (child as u32 & 1) * half;
            let cy = y + (child as u32 >> 1) * half;
            if cx >= pic.params.pic_width || cy >= pic.params.pic_height {
                continue;
            }
            let cz = z_offset + child * quarter_units;
            self.best_cu[depth + 1].init_at(cx, cy, cz, node_qp);
            self.temp_cu[depth + 1].init_at(cx, cy, cz, node_qp);

            if depth == 0 && pic.slice_type.is_inter() && self.cfg.use_rrsp {
                self.reduced_range = match pic.colocated {
                    Some(coloc_idx) => rrsp::classify_sub_ctu(
                        refs,
                        coloc_idx,
                        ctu,
                        child,
                        pic.slice_qp,
                        &self.rrsp_tables,
                        &self.tables,
                        true,
                    ),
                    None => DepthSet::all_reduced_depths(),
                };
                let coloc_is_intra = pic
                    .colocated
                    .and_then(|i| refs.get(i))
                    .is_some_and(|p| p.slice_type.is_intra());
                if coloc_is_intra && y < 32 {
                    self.reduced_range.insert_depth(0);
                }
            }
            if !in_boundary {
                // Forced split: the child depth is always admissible.
                self.range_depths.insert_depth(depth as u8 + 1);
                self.reduced_range.insert_depth(depth as u8);
            }

            let state = if child == 0 {
                self.ctx.get(depth, ContextRole::CurrBest).clone()
            } else {
                self.ctx.get(depth + 1, ContextRole::NextBest).clone()
            };
            self.services.load_state(&state);
            self.ctx.store(depth + 1, ContextRole::CurrBest, state);

            self.compress_node(refs, pic, ctu, depth + 1, parent_info)?;

            self.temp_cu[depth].absorb_child(&self.best_cu[depth + 1], child);
            self.reco_temp[depth].copy_part_from(&self.reco_best[depth + 1], cx - x, cy - y);
        }
        self.range_depths = saved_range;
        self.reduced_range = saved_reduced;

        // Split flag, then the delta QP at the level that codes it.
        let state = self.ctx.get(depth + 1, ContextRole::NextBest).clone();
        self.services.load_state(&state);
        self.services.reset_bits();
        self.services.code_split_flag(true, depth as u8);
        if pic.params.delta_qp_enabled && width == pic.params.min_cu_dqp_size() {
            if self.temp_cu[depth].root_cbf() {
                let delta = self.temp_cu[depth].first_unit().qp - node_qp;
                self.services.code_delta_qp(delta);
            } else {
                // No coded coefficient below: children inherit the
                // reference QP instead of coding a delta.
                self.temp_cu[depth].set_qp_all(node_qp);
            }
        }
        let lambda = self.services.lambda(node_qp, false);
        let temp = &mut self.temp_cu[depth];
        temp.total_bits += self.services.bits_written();
        temp.total_bins += self.services.bins_written();
        temp.total_cost = rd_cost(lambda, temp.total_bits, temp.total_distortion);
        self.ctx
            .store(depth, ContextRole::TempBest, self.services.save_state());

        if pic.slice_budget_reached {
            // Once the byte budget is gone, splitting must lose.
            let penalty = match self.cfg.cost_mode {
                CostMode::Standard => 1.0,
                CostMode::MixedLosslessLossyCoding => 1.0 / lambda,
            };
            self.temp_cu[depth].total_cost += penalty;
        }

        if self.temp_cu[depth].total_cost < self.best_cu[depth].total_cost {
            trace!(depth, cost = self.temp_cu[depth].total_cost, "split wins");
            std::mem::swap(&mut self.best_cu[depth], &mut self.temp_cu[depth]);
            std::mem::swap(&mut self.reco_best[depth], &mut self.reco_temp[depth]);
            self.ctx
                .copy((depth, ContextRole::TempBest), (depth, ContextRole::NextBest));
        }
        Ok(())
    }

    /// Account the unsplit flag into the winning candidate's cost.
    fn add_unsplit_flag_bits(&mut self, depth: usize) {
        let state = self.ctx.get(depth, ContextRole::NextBest).clone();
        self.services.load_state(&state);
        self.services.reset_bits();
        self.services.code_split_flag(false, depth as u8);
        let bits = self.services.bits_written();
        let bins = self.services.bins_written();
        let best = &mut self.best_cu[depth];
        let lambda = self.services.lambda(best.qp, best.tqb);
        best.total_bits += bits;
        best.total_bins += bins;
        best.total_cost = rd_cost(lambda, best.total_bits, best.total_distortion);
        self.ctx
            .store(depth, ContextRole::NextBest, self.services.save_state());
    }

    /// Steps 1–6 of the node procedure: the per-QP candidate loop.
    fn evaluate_candidates(
        &mut self,
        pic: &Picture,
        depth: usize,
        parent: ParentInfo,
        early_skip: &mut bool,
    ) -> Result<(), CuError> {
        let width = cu_size_at_depth(depth as u8);
        let (x, y) = (self.best_cu[depth].x, self.best_cu[depth].y);
        let qp_plan = qp::plan(
            &self.cfg,
            &pic.params,
            &self.services,
            pic.slice_qp,
            self.best_cu[depth].qp,
            x,
            y,
            width,
        );
        let plan = dispatch::candidate_plan(
            &self.cfg,
            &pic.params,
            pic.slice_type,
            depth as u8,
            width,
        );
        let pcm_bits = dispatch::pcm_raw_bits(width);
        let mut pu_blocked = false;

        for point in qp_plan.points() {
            let (qp, lossless) = match point {
                QpPoint::Lossless => (qp_plan.lowest_qp, true),
                QpPoint::Lossy(q) => (q, false),
            };
            let tqb = if pic.params.tqb_enabled && self.cfg.tqb_force_value {
                true
            } else {
                lossless
            };
            let lambda = self.services.lambda(qp, lossless);

            for cand in &plan {
                let gate_ctx = self.gate_context(depth, pic, *early_skip, pu_blocked, pcm_bits, lambda);
                if !cand.gate.admits(&gate_ctx) {
                    continue;
                }
                self.evaluate_one(depth, parent, cand, qp, tqb, lambda, early_skip)?;
                if self.cfg.use_cbf_fast_mode
                    && matches!(cand.mode, CandidateMode::Inter(_) | CandidateMode::Amp)
                    && self.best_cu[depth].has_valid_decision()
                {
                    pu_blocked = !self.best_cu[depth].root_cbf();
                }
            }
        }
        Ok(())
    }

    fn gate_context(
        &self,
        depth: usize,
        pic: &Picture,
        early_skip: bool,
        pu_blocked: bool,
        pcm_bits: u32,
        lambda: f64,
    ) -> GateContext {
        let best = &self.best_cu[depth];
        let valid = best.has_valid_decision();
        GateContext {
            early_skip,
            pu_blocked,
            slice_intra: pic.slice_type.is_intra(),
            best_has_residual: valid && best.root_cbf(),
            best_bits: best.total_bits,
            best_cost: best.total_cost,
            pcm_bits,
            lambda,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn evaluate_one(
        &mut self,
        depth: usize,
        parent: ParentInfo,
        cand: &Candidate,
        qp: i8,
        tqb: bool,
        lambda: f64,
        early_skip: &mut bool,
    ) -> Result<(), CuError> {
        match cand.mode {
            CandidateMode::MergeSkip2Nx2N => {
                self.check_merge(depth, qp, tqb, lambda, early_skip)?;
            }
            CandidateMode::Inter(part) => {
                self.check_inter(depth, qp, tqb, lambda, part, false)?;
            }
            CandidateMode::Amp => {
                let sel = dispatch::select_amp(parent, &self.best_cu[depth]);
                if sel.hor {
                    self.check_inter(depth, qp, tqb, lambda, PartSize::Size2NxnU, false)?;
                    self.check_inter(depth, qp, tqb, lambda, PartSize::Size2NxnD, false)?;
                } else if sel.hor_merge {
                    self.check_inter(depth, qp, tqb, lambda, PartSize::Size2NxnU, true)?;
                    self.check_inter(depth, qp, tqb, lambda, PartSize::Size2NxnD, true)?;
                }
                if sel.ver {
                    self.check_inter(depth, qp, tqb, lambda, PartSize::SizenLx2N, false)?;
                    self.check_inter(depth, qp, tqb, lambda, PartSize::SizenRx2N, false)?;
                } else if sel.ver_merge {
                    self.check_inter(depth, qp, tqb, lambda, PartSize::SizenLx2N, true)?;
                    self.check_inter(depth, qp, tqb, lambda, PartSize::SizenRx2N, true)?;
                }
            }
            CandidateMode::Intra(part) => {
                self.check_intra(depth, qp, tqb, lambda, part)?;
            }
            CandidateMode::Ipcm => {
                self.check_ipcm(depth, qp, tqb, lambda)?;
            }
        }
        Ok(())
    }

    /// Load the node-entry context and re-arm the temp CU for a candidate.
    fn begin_candidate(&mut self, depth: usize, qp: i8, tqb: bool) {
        self.temp_cu[depth].prepare_candidate(qp, tqb);
        let state = self.ctx.get(depth, ContextRole::CurrBest).clone();
        self.services.load_state(&state);
        self.services.reset_bits();
    }

    /// Strict less-than comparison against the depth's best; on a win swap
    /// the CU and sample buffers and snapshot the winner's entropy state.
    fn check_best(&mut self, depth: usize, lambda: f64) -> bool {
        let temp = &mut self.temp_cu[depth];
        temp.total_cost = rd_cost(lambda, temp.total_bits, temp.total_distortion);
        if temp.total_cost >= self.best_cu[depth].total_cost {
            return false;
        }
        std::mem::swap(&mut self.best_cu[depth], &mut self.temp_cu[depth]);
        std::mem::swap(&mut self.pred_best[depth], &mut self.pred_temp[depth]);
        std::mem::swap(&mut self.resi_best[depth], &mut self.resi_temp[depth]);
        std::mem::swap(&mut self.reco_best[depth], &mut self.reco_temp[depth]);
        self.ctx
            .store(depth, ContextRole::NextBest, self.services.save_state());
        true
    }

    fn check_merge(
        &mut self,
        depth: usize,
        qp: i8,
        tqb: bool,
        lambda: f64,
        early_skip: &mut bool,
    ) -> Result<(), CuError> {
        self.temp_cu[depth].prepare_candidate(qp, tqb);
        let mut cands = self.services.merge_candidates(&self.temp_cu[depth])?;
        cands.truncate(MRG_MAX_NUM_CANDS);
        let mut best_is_skip = false;
        for (index, cand) in cands.iter().enumerate() {
            for skip_residual in [false, true] {
                if !skip_residual && self.cfg.use_fast_decision_for_merge && best_is_skip {
                    continue;
                }
                self.begin_candidate(depth, qp, tqb);
                self.temp_cu[depth].fill_merge(cand, index as u8, skip_residual);
                self.services.motion_compensation(
                    &mut self.temp_cu[depth],
                    EvalBuffers {
                        orig: &self.orig_yuv[depth],
                        pred: &mut self.pred_temp[depth],
                        resi: &mut self.resi_temp[depth],
                        reco: &mut self.reco_temp[depth],
                    },
                    cand,
                )?;
                self.services.encode_inter_residual(
                    &mut self.temp_cu[depth],
                    EvalBuffers {
                        orig: &self.orig_yuv[depth],
                        pred: &mut self.pred_temp[depth],
                        resi: &mut self.resi_temp[depth],
                        reco: &mut self.reco_temp[depth],
                    },
                    skip_residual,
                )?;
                if self.check_best(depth, lambda) {
                    best_is_skip = self.best_cu[depth].is_fully_skipped();
                }
            }
        }
        if self.cfg.use_early_skip_detection
            && self.best_cu[depth].has_valid_decision()
            && self.best_cu[depth].is_fully_skipped()
        {
            *early_skip = true;
        }
        Ok(())
    }

    fn check_inter(
        &mut self,
        depth: usize,
        qp: i8,
        tqb: bool,
        lambda: f64,
        part: PartSize,
        merge_only: bool,
    ) -> Result<(), CuError> {
        self.begin_candidate(depth, qp, tqb);
        self.temp_cu[depth].fill_inter(part);
        let found = self.services.inter_search(
            &mut self.temp_cu[depth],
            EvalBuffers {
                orig: &self.orig_yuv[depth],
                pred: &mut self.pred_temp[depth],
                resi: &mut self.resi_temp[depth],
                reco: &mut self.reco_temp[depth],
            },
            part,
            merge_only,
        )?;
        if !found {
            return Ok(());
        }
        self.services.encode_inter_residual(
            &mut self.temp_cu[depth],
            EvalBuffers {
                orig: &self.orig_yuv[depth],
                pred: &mut self.pred_temp[depth],
                resi: &mut self.resi_temp[depth],
                reco: &mut self.reco_temp[depth],
            },
            false,
        )?;
        if self.cfg.use_adapt_qp_select {
            self.services
                .collect_arl_stats(&self.temp_cu[depth], &self.resi_temp[depth]);
        }
        self.check_best(depth, lambda);
        Ok(())
    }

    fn check_intra(
        &mut self,
        depth: usize,
        qp: i8,
        tqb: bool,
        lambda: f64,
        part: PartSize,
    ) -> Result<(), CuError> {
        self.begin_candidate(depth, qp, tqb);
        self.temp_cu[depth].fill_intra(part, 0);
        self.services.intra_search(
            &mut self.temp_cu[depth],
            EvalBuffers {
                orig: &self.orig_yuv[depth],
                pred: &mut self.pred_temp[depth],
                resi: &mut self.resi_temp[depth],
                reco: &mut self.reco_temp[depth],
            },
            part,
        )?;
        self.check_best(depth, lambda);
        Ok(())
    }

    fn check_ipcm(
        &mut self,
        depth: usize,
        qp: i8,
        tqb: bool,
        lambda: f64,
    ) -> Result<(), CuError> {
        self.begin_candidate(depth, qp, tqb);
        self.temp_cu[depth].fill_ipcm();
        self.services.ipcm_encode(
            &mut self.temp_cu[depth],
            EvalBuffers {
                orig: &self.orig_yuv[depth],
                pred: &mut self.pred_temp[depth],
                resi: &mut self.resi_temp[depth],
                reco: &mut self.reco_temp[depth],
            },
        )?;
        self.check_best(depth, lambda);
        Ok(())
    }

    /// Totals of the last compressed CTU's winning decision.
    pub(crate) fn root_totals(&self) -> (u32, u32, u64, f64) {
        let root = &self.best_cu[0];
        (
            root.total_bits,
            root.total_bins,
            root.total_distortion,
            root.total_cost,
        )
    }

    #[cfg(test)]
    pub(crate) fn entry_context(&self) -> &S::State {
        self.ctx.get(0, ContextRole::CurrBest)
    }
}

#[cfg(test)]
#[cfg_attr(all(test, coverage_nightly), coverage(off))]
mod tests {
    use super::*;
    use crate::NUM_MIN_UNITS;
    use crate::enums::SliceType;
    use crate::picture::SequenceParams;
    use crate::test_utils::{MockServices, init_tracing};

    fn encoder(cfg: CuAnalysisConfig) -> CuEncoder<MockServices> {
        init_tracing(); // Initialize tracing for logging
        CuEncoder::new(cfg, MockServices::default()).unwrap()
    }

    fn intra_pic() -> Picture {
        Picture::new(SequenceParams::new(64, 64), SliceType::I, 32, None)
    }

    fn calls_mention(enc: &CuEncoder<MockServices>, needle: &str) -> bool {
        enc.services().calls.iter().any(|c| c.contains(needle))
    }

    #[test]
    fn test_single_ctu_intra_slice() {
        let mut enc = encoder(CuAnalysisConfig::default());
        let refs = PictureRegistry::new();
        let mut pic = intra_pic();
        enc.compress_ctu(&refs, &mut pic, 0).unwrap();
        for z in 0..NUM_MIN_UNITS {
            let unit = pic.unit(0, z);
            assert_eq!(unit.depth, 0);
            assert_eq!(unit.pred_mode, Some(PredMode::Intra));
            assert_eq!(unit.part_size, Some(PartSize::Size2Nx2N));
        }
        assert!(enc.root_totals().3.is_finite());
        // Intra slice: the merge machinery never runs.
        assert!(!calls_mention(&enc, "merge_candidates"));
    }

    #[test]
    fn test_sbd_restricts_search_to_colocated_depth() {
        // First inter frame at the picture corner: α holds only the
        // colocated CTU (all at depth 0), similarity is high, and the
        // driver never descends below 64×64.
        let mut refs = PictureRegistry::new();
        let reference = Picture::new(SequenceParams::new(64, 64), SliceType::P, 32, None);
        let coloc_idx = refs.push(reference);
        let mut pic = Picture::new(SequenceParams::new(64, 64), SliceType::P, 32, Some(coloc_idx));

        let cfg = CuAnalysisConfig::builder().sbd(true).sbd_radius(8).build();
        let mut enc = encoder(cfg);
        enc.compress_ctu(&refs, &mut pic, 0).unwrap();
        for z in 0..NUM_MIN_UNITS {
            assert_eq!(pic.unit(0, z).depth, 0);
        }
        assert!(!calls_mention(&enc, "w32"));
    }

    #[test]
    fn test_rrsp_only_depth0_blocks_recursion() {
        // Fully 64×64 neighborhood with no grandfather frame to consult.
        let mut refs = PictureRegistry::new();
        let reference = Picture::new(SequenceParams::new(64, 64), SliceType::P, 32, None);
        let coloc_idx = refs.push(reference);
        let mut pic = Picture::new(SequenceParams::new(64, 64), SliceType::P, 32, Some(coloc_idx));

        let cfg = CuAnalysisConfig::builder().rrsp(true).build();
        let mut enc = encoder(cfg);
        enc.compress_ctu(&refs, &mut pic, 0).unwrap();
        assert_eq!(pic.unit(0, 0).depth, 0);
        assert!(!calls_mention(&enc, "w32"));
    }

    #[test]
    fn test_early_cu_stops_below_skipped_winner() {
        init_tracing();
        let cfg = CuAnalysisConfig::builder().early_cu(true).build();
        let mut enc = CuEncoder::new(
            cfg,
            MockServices {
                skip_distortion: 10,
                ..MockServices::default()
            },
        )
        .unwrap();
        let refs = PictureRegistry::new();
        let mut pic = Picture::new(SequenceParams::new(64, 64), SliceType::P, 32, None);
        enc.compress_ctu(&refs, &mut pic, 0).unwrap();
        // The skipped winner holds the whole CTU at its own depth.
        for z in 0..NUM_MIN_UNITS {
            let unit = pic.unit(0, z);
            assert_eq!(unit.depth, 0);
            assert!(unit.skip);
        }
        assert!(!calls_mention(&enc, "w32"));
    }

    #[test]
    fn test_entry_context_survives_compression() {
        let mut enc = encoder(CuAnalysisConfig::default());
        enc.services_mut().state = 42;
        let refs = PictureRegistry::new();
        let mut pic = intra_pic();
        enc.compress_ctu(&refs, &mut pic, 0).unwrap();
        // The serialization walk starts from the same snapshot compression
        // started from.
        assert_eq!(*enc.entry_context(), 42);
    }

    #[test]
    fn test_boundary_ctu_forces_split() {
        // 96-wide picture: the second CTU covers a 32-wide column and must
        // split without evaluating itself.
        let params = SequenceParams::new(96, 64);
        let mut enc = encoder(CuAnalysisConfig::default());
        let refs = PictureRegistry::new();
        let mut pic = Picture::new(params, SliceType::I, 32, None);
        enc.compress_ctu(&refs, &mut pic, 1).unwrap();
        assert!(!calls_mention(&enc, "intra_search Size2Nx2N w64"));
        // In-picture halves are decided at depth 1.
        for z in [0usize, 128] {
            let unit = pic.unit(1, z);
            assert_eq!(unit.depth, 1);
            assert!(unit.part_size.is_some());
        }
        // Out-of-picture quadrants stay undecided.
        assert!(pic.unit(1, 64).part_size.is_none());
    }

    #[test]
    fn test_tqb_lossless_iteration_wins_ties() {
        let mut params = SequenceParams::new(64, 64);
        params.tqb_enabled = true;
        let mut enc = encoder(CuAnalysisConfig::default());
        let refs = PictureRegistry::new();
        let mut pic = Picture::new(params, SliceType::I, 32, None);
        enc.compress_ctu(&refs, &mut pic, 0).unwrap();
        // The lossless point runs first and a lossy tie cannot displace it.
        assert!(pic.unit(0, 0).tqb);
    }

    #[test]
    fn test_pcm_admission_at_minimum_size() {
        init_tracing();
        let mut params = SequenceParams::new(64, 64);
        params.pcm_enabled = true;
        params.pcm_log2_min_size = 3;
        params.pcm_log2_max_size = 3;
        let mut enc = CuEncoder::new(
            CuAnalysisConfig::default(),
            MockServices {
                intra_distortion: 100_000,
                ..MockServices::default()
            },
        )
        .unwrap();
        let refs = PictureRegistry::new();
        let mut pic = Picture::new(params, SliceType::I, 32, None);
        enc.compress_ctu(&refs, &mut pic, 0).unwrap();
        for z in 0..NUM_MIN_UNITS {
            let unit = pic.unit(0, z);
            assert_eq!(unit.depth, 3);
            assert!(unit.ipcm, "raw coding undercuts a ruinous intra cost");
        }
        assert_eq!(enc.root_totals().2, 0, "IPCM reconstruction is exact");
    }

    #[test]
    fn test_cbf_fast_mode_blocks_rectangular_shapes() {
        init_tracing();
        let cfg = CuAnalysisConfig::builder().cbf_fast_mode(true).build();
        let mut enc = CuEncoder::new(
            cfg,
            MockServices {
                residual_nonzero: false,
                ..MockServices::default()
            },
        )
        .unwrap();
        let refs = PictureRegistry::new();
        let mut pic = Picture::new(SequenceParams::new(64, 64), SliceType::P, 32, None);
        enc.compress_ctu(&refs, &mut pic, 0).unwrap();
        // The zero-CBF 2N×2N winner blocks the rectangular shapes.
        assert!(!calls_mention(&enc, "SizeNx2N"));
        assert!(!calls_mention(&enc, "Size2NxN "));
    }

    #[test]
    fn test_amp_shapes_follow_square_parent() {
        init_tracing();
        let mut params = SequenceParams::new(64, 64);
        params.amp_enabled = true;
        let mut enc = CuEncoder::new(
            CuAnalysisConfig::default(),
            MockServices {
                penalize_width_at_least: Some(64),
                width_penalty: 10_000_000,
                ..MockServices::default()
            },
        )
        .unwrap();
        let refs = PictureRegistry::new();
        let mut pic = Picture::new(params, SliceType::P, 32, None);
        enc.compress_ctu(&refs, &mut pic, 0).unwrap();
        // The 64×64 candidates are ruinous, so the CTU splits; at 32×32 the
        // unmerged square parent admits both AMP orientations in full.
        assert!(calls_mention(&enc, "inter_search Size2NxnU w32 merge_only=false"));
        assert!(calls_mention(&enc, "inter_search SizenRx2N w32 merge_only=false"));
        assert_eq!(pic.unit(0, 0).depth, 1);
    }

    #[test]
    fn test_arl_statistics_collected_from_inter_luma() {
        let cfg = CuAnalysisConfig::builder().adapt_qp_select(true).build();
        let mut enc = encoder(cfg);
        let refs = PictureRegistry::new();
        let mut pic = Picture::new(SequenceParams::new(64, 64), SliceType::P, 32, None);
        enc.compress_ctu(&refs, &mut pic, 0).unwrap();
        assert!(enc.services().arl_collected > 0);
    }
}
