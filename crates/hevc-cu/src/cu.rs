use crate::enums::{PartSize, PredMode};
use crate::picture::{MinUnit, MvField};
use crate::services::MergeCandidate;
use crate::{CTU_SIZE, num_units_at_depth};

/// A tentative or best decision for one quadtree node.
///
/// The driver keeps a best/temp pair of these per depth; swapping winner and
/// loser is a plain `std::mem::swap` of value structs.
#[derive(Debug, Clone)]
pub struct CuNode {
    pub depth: u8,
    /// Z-scan address of the first covered minimum unit within the CTU.
    pub z_offset: usize,
    /// Absolute pixel origin in the picture.
    pub x: u32,
    pub y: u32,
    pub width: u32,
    /// Working QP of the current tentative.
    pub qp: i8,
    /// Whether the current tentative codes lossless.
    pub tqb: bool,
    /// Per covered minimum unit, in Z-scan order.
    pub units: Vec<MinUnit>,
    pub total_bits: u32,
    pub total_bins: u32,
    pub total_distortion: u64,
    pub total_cost: f64,
}

impl CuNode {
    pub fn new(depth: u8) -> Self {
        Self {
            depth,
            z_offset: 0,
            x: 0,
            y: 0,
            width: CTU_SIZE >> depth,
            qp: 0,
            tqb: false,
            units: vec![MinUnit::default(); num_units_at_depth(depth)],
            total_bits: 0,
            total_bins: 0,
            total_distortion: 0,
            total_cost: f64::MAX,
        }
    }

    /// Reset this node as the CTU root at pixel origin `(x, y)`.
    pub fn init_root(&mut self, x: u32, y: u32, qp: i8) {
        self.reset(x, y, 0, qp);
    }

    /// Reset this node at an arbitrary position within the CTU.
    pub fn init_at(&mut self, x: u32, y: u32, z_offset: usize, qp: i8) {
        self.reset(x, y, z_offset, qp);
    }

    /// Reset this node as child `idx` (Z order) of `parent`.
    pub fn init_child(&mut self, parent: &CuNode, idx: usize) {
        debug_assert!(idx < 4);
        let half = parent.width / 2;
        let x = parent.x + (idx as u32 & 1) * half;
        let y = parent.y + (idx as u32 >> 1) * half;
        let z_offset = parent.z_offset + idx * parent.units.len() / 4;
        self.reset(x, y, z_offset, parent.qp);
    }

    fn reset(&mut self, x: u32, y: u32, z_offset: usize, qp: i8) {
        self.x = x;
        self.y = y;
        self.z_offset = z_offset;
        self.qp = qp;
        self.tqb = false;
        for unit in &mut self.units {
            *unit = MinUnit {
                depth: self.depth,
                qp,
                ..MinUnit::default()
            };
        }
        self.reset_totals();
    }

    /// Clear the totals; the cost returns to the uninitialized sentinel.
    pub fn reset_totals(&mut self) {
        self.total_bits = 0;
        self.total_bins = 0;
        self.total_distortion = 0;
        self.total_cost = f64::MAX;
    }

    /// Re-arm this node for the next candidate at `qp`, keeping its geometry.
    pub fn prepare_candidate(&mut self, qp: i8, tqb: bool) {
        let (x, y, z) = (self.x, self.y, self.z_offset);
        self.reset(x, y, z, qp);
        self.tqb = tqb;
        for unit in &mut self.units {
            unit.tqb = tqb;
        }
    }

    /// Re-arm this node as the split accumulator: children add into it.
    pub fn prepare_split(&mut self, qp: i8) {
        let (x, y, z) = (self.x, self.y, self.z_offset);
        self.reset(x, y, z, qp);
        self.total_cost = 0.0;
    }

    /// Copy a decided child into quadrant `idx` and accumulate its totals.
    pub fn absorb_child(&mut self, child: &CuNode, idx: usize) {
        let quarter = self.units.len() / 4;
        debug_assert_eq!(child.units.len(), quarter);
        self.units[idx * quarter..(idx + 1) * quarter].copy_from_slice(&child.units);
        self.total_bits += child.total_bits;
        self.total_bins += child.total_bins;
        self.total_distortion += child.total_distortion;
    }

    pub fn first_unit(&self) -> &MinUnit {
        &self.units[0]
    }

    /// Whether the whole node is coded as skip.
    pub fn is_fully_skipped(&self) -> bool {
        self.units.iter().all(|u| u.skip)
    }

    /// Whether any covered unit carries residual coefficients.
    pub fn root_cbf(&self) -> bool {
        self.units.iter().any(|u| u.has_residual())
    }

    /// Fill every unit as an inter CU of shape `part`.
    pub fn fill_inter(&mut self, part: PartSize) {
        for unit in &mut self.units {
            unit.pred_mode = Some(PredMode::Inter);
            unit.part_size = Some(part);
            unit.skip = false;
            unit.merge = false;
            unit.ipcm = false;
        }
    }

    /// Fill every unit as a merge/skip 2N×2N CU using `cand`.
    pub fn fill_merge(&mut self, cand: &MergeCandidate, index: u8, skip: bool) {
        for unit in &mut self.units {
            unit.pred_mode = Some(PredMode::Inter);
            unit.part_size = Some(PartSize::Size2Nx2N);
            unit.skip = skip;
            unit.merge = true;
            unit.merge_index = index;
            unit.mv = cand.mv_field;
            unit.ipcm = false;
            if skip {
                unit.cbf_y = false;
                unit.cbf_cb = false;
                unit.cbf_cr = false;
            }
        }
    }

    /// Fill every unit as an intra CU of shape `part`.
    pub fn fill_intra(&mut self, part: PartSize, dir: u8) {
        for unit in &mut self.units {
            unit.pred_mode = Some(PredMode::Intra);
            unit.part_size = Some(part);
            unit.skip = false;
            unit.merge = false;
            unit.intra_dir = dir;
            unit.mv = [MvField::default(); 2];
            unit.ipcm = false;
        }
    }

    /// Fill every unit as an IPCM CU.
    pub fn fill_ipcm(&mut self) {
        for unit in &mut self.units {
            unit.pred_mode = Some(PredMode::Intra);
            unit.part_size = Some(PartSize::Size2Nx2N);
            unit.skip = false;
            unit.merge = false;
            unit.ipcm = true;
            unit.cbf_y = false;
            unit.cbf_cb = false;
            unit.cbf_cr = false;
        }
    }

    /// Propagate `qp` to every covered unit.
    pub fn set_qp_all(&mut self, qp: i8) {
        self.qp = qp;
        for unit in &mut self.units {
            unit.qp = qp;
        }
    }

    /// Whether the node holds a complete decision with a finite cost.
    pub fn has_valid_decision(&self) -> bool {
        self.total_cost < f64::MAX
            && self
                .units
                .iter()
                .all(|u| u.part_size.is_some() && u.pred_mode.is_some())
    }
}

#[cfg(test)]
#[cfg_attr(all(test, coverage_nightly), coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_child_geometry() {
        let mut parent = CuNode::new(0);
        parent.init_root(64, 0, 30);
        let mut child = CuNode::new(1);
        child.init_child(&parent, 3);
        assert_eq!((child.x, child.y), (96, 32));
        assert_eq!(child.z_offset, 192);
        assert_eq!(child.units.len(), 64);
        assert_eq!(child.qp, 30);
    }

    #[test]
    fn test_absorb_child_accumulates() {
        let mut parent = CuNode::new(1);
        parent.init_root(0, 0, 28);
        parent.prepare_split(28);
        let mut child = CuNode::new(2);
        child.init_child(&parent, 2);
        child.fill_inter(PartSize::Size2Nx2N);
        child.total_bits = 10;
        child.total_distortion = 100;
        parent.absorb_child(&child, 2);
        assert_eq!(parent.total_bits, 10);
        assert_eq!(parent.total_distortion, 100);
        assert_eq!(
            parent.units[32].pred_mode,
            Some(PredMode::Inter),
            "third quadrant holds the child decision"
        );
        assert!(parent.units[0].pred_mode.is_none());
    }

    #[test]
    fn test_skip_and_cbf_queries() {
        let mut cu = CuNode::new(3);
        cu.init_root(0, 0, 30);
        let cand = MergeCandidate::default();
        cu.fill_merge(&cand, 1, true);
        assert!(cu.is_fully_skipped());
        assert!(!cu.root_cbf());
        cu.units[0].cbf_y = true;
        assert!(cu.root_cbf());
    }
}
