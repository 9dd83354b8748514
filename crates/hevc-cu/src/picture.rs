use crate::enums::{PartSize, PredMode, SliceType};
use crate::neighbor::NeighborPos;
use crate::yuv::PictureYuv;
use crate::{CTU_SIZE, NUM_MIN_UNITS};

/// Quarter-sample motion vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MotionVector {
    pub x: i16,
    pub y: i16,
}

/// Motion vector plus reference index for one prediction list.
///
/// A negative reference index means the list is unused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MvField {
    pub mv: MotionVector,
    pub ref_idx: i8,
}

impl Default for MvField {
    fn default() -> Self {
        Self {
            mv: MotionVector::default(),
            ref_idx: -1,
        }
    }
}

/// Decision record for one 4×4 minimum unit of the partition grid.
#[derive(Debug, Clone, Copy, Default)]
pub struct MinUnit {
    /// Chosen quadtree depth of the CU covering this unit.
    pub depth: u8,
    /// Partition shape; `None` only while a decision is pending.
    pub part_size: Option<PartSize>,
    /// Prediction mode; `None` only while a decision is pending.
    pub pred_mode: Option<PredMode>,
    pub skip: bool,
    pub merge: bool,
    pub merge_index: u8,
    pub mv: [MvField; 2],
    /// Intra luma prediction direction.
    pub intra_dir: u8,
    pub cbf_y: bool,
    pub cbf_cb: bool,
    pub cbf_cr: bool,
    pub qp: i8,
    /// Transform sub-tree index below this CU.
    pub tr_idx: u8,
    pub ipcm: bool,
    /// Transquant bypass (lossless) flag.
    pub tqb: bool,
}

impl MinUnit {
    /// Whether any coded-block flag is set.
    pub fn has_residual(&self) -> bool {
        self.cbf_y || self.cbf_cb || self.cbf_cr
    }
}

/// Sequence/picture parameters consulted by the analysis core.
#[derive(Debug, Clone, Copy)]
pub struct SequenceParams {
    pub pic_width: u32,
    pub pic_height: u32,
    /// Extension of the luma QP range below zero for high bit depths.
    pub qp_bd_offset_y: i8,
    pub pcm_enabled: bool,
    /// log2 of the smallest CU size that may code IPCM.
    pub pcm_log2_min_size: u8,
    /// log2 of the largest CU size that may code IPCM.
    pub pcm_log2_max_size: u8,
    pub delta_qp_enabled: bool,
    /// Depth down to which a delta QP may be coded.
    pub max_cu_dqp_depth: u8,
    pub chroma_qp_adj_enabled: bool,
    /// Depth down to which a chroma QP adjustment may be coded.
    pub max_cu_chroma_qp_adj_depth: u8,
    pub amp_enabled: bool,
    /// Transquant bypass available in this sequence.
    pub tqb_enabled: bool,
    /// log2 of the smallest transform size.
    pub log2_min_tu_size: u8,
}

impl SequenceParams {
    pub fn new(pic_width: u32, pic_height: u32) -> Self {
        Self {
            pic_width,
            pic_height,
            qp_bd_offset_y: 0,
            pcm_enabled: false,
            pcm_log2_min_size: 3,
            pcm_log2_max_size: 5,
            delta_qp_enabled: false,
            max_cu_dqp_depth: 0,
            chroma_qp_adj_enabled: false,
            max_cu_chroma_qp_adj_depth: 0,
            amp_enabled: false,
            tqb_enabled: false,
            log2_min_tu_size: 2,
        }
    }

    pub fn pic_width_in_ctus(&self) -> u32 {
        self.pic_width.div_ceil(CTU_SIZE)
    }

    pub fn pic_height_in_ctus(&self) -> u32 {
        self.pic_height.div_ceil(CTU_SIZE)
    }

    pub fn num_ctus(&self) -> usize {
        (self.pic_width_in_ctus() * self.pic_height_in_ctus()) as usize
    }

    /// Smallest CU size at which a delta QP is still coded.
    pub fn min_cu_dqp_size(&self) -> u32 {
        CTU_SIZE >> self.max_cu_dqp_depth
    }

    /// Whether a CU of `width` may code IPCM.
    pub fn pcm_size_admits(&self, width: u32) -> bool {
        self.pcm_enabled
            && width >= (1 << self.pcm_log2_min_size)
            && width <= (1 << self.pcm_log2_max_size)
    }
}

/// One picture: slice-level state, the persistent per-minimum-unit CU store,
/// and the original/reconstructed sample planes.
///
/// Temporal neighbors are addressed by index into a [`PictureRegistry`]; no
/// pointer graph exists between pictures.
#[derive(Debug, Clone)]
pub struct Picture {
    pub params: SequenceParams,
    pub slice_type: SliceType,
    pub slice_qp: i8,
    /// Registry index of the colocated reference picture, if any.
    pub colocated: Option<usize>,
    /// Set by the outer rate loop once the slice byte budget is exhausted;
    /// biases the split decision toward not splitting.
    pub slice_budget_reached: bool,
    pub orig: PictureYuv,
    pub reco: PictureYuv,
    units: Vec<MinUnit>,
}

impl Picture {
    pub fn new(
        params: SequenceParams,
        slice_type: SliceType,
        slice_qp: i8,
        colocated: Option<usize>,
    ) -> Self {
        let units = vec![MinUnit::default(); params.num_ctus() * NUM_MIN_UNITS];
        Self {
            params,
            slice_type,
            slice_qp,
            colocated,
            slice_budget_reached: false,
            orig: PictureYuv::new(params.pic_width, params.pic_height),
            reco: PictureYuv::new(params.pic_width, params.pic_height),
            units,
        }
    }

    pub fn num_ctus(&self) -> usize {
        self.params.num_ctus()
    }

    /// Pixel origin of the CTU at raster address `ctu`.
    pub fn ctu_origin(&self, ctu: usize) -> (u32, u32) {
        let per_row = self.params.pic_width_in_ctus() as usize;
        let x = (ctu % per_row) as u32 * CTU_SIZE;
        let y = (ctu / per_row) as u32 * CTU_SIZE;
        (x, y)
    }

    /// The stored minimum units of one CTU, in Z-scan order.
    pub fn ctu_units(&self, ctu: usize) -> &[MinUnit] {
        &self.units[ctu * NUM_MIN_UNITS..(ctu + 1) * NUM_MIN_UNITS]
    }

    pub fn unit(&self, ctu: usize, z: usize) -> &MinUnit {
        &self.units[ctu * NUM_MIN_UNITS + z]
    }

    pub fn unit_mut(&mut self, ctu: usize, z: usize) -> &mut MinUnit {
        &mut self.units[ctu * NUM_MIN_UNITS + z]
    }

    /// Overwrite the stored region `[z_offset, z_offset + units.len())` of a
    /// CTU with a decided CU.
    pub fn write_ctu_region(&mut self, ctu: usize, z_offset: usize, units: &[MinUnit]) {
        let start = ctu * NUM_MIN_UNITS + z_offset;
        self.units[start..start + units.len()].copy_from_slice(units);
    }

    /// Raster address of the CTU `(dx, dy)` grid steps away, or `None` when
    /// it falls outside the picture.
    pub fn ctu_at_offset(&self, ctu: usize, dx: i32, dy: i32) -> Option<usize> {
        let per_row = self.params.pic_width_in_ctus() as i32;
        let rows = self.params.pic_height_in_ctus() as i32;
        let nx = (ctu % per_row as usize) as i32 + dx;
        let ny = (ctu / per_row as usize) as i32 + dy;
        if nx < 0 || ny < 0 || nx >= per_row || ny >= rows {
            None
        } else {
            Some((ny * per_row + nx) as usize)
        }
    }

    /// Raster address of a spatial neighbor CTU, or `None` when it falls
    /// outside the picture. [`NeighborPos::Colocated`] maps to the same
    /// address (the colocated picture shares the CTU grid).
    pub fn neighbor_ctu(&self, ctu: usize, pos: NeighborPos) -> Option<usize> {
        let (dx, dy) = match pos {
            NeighborPos::Left => (-1, 0),
            NeighborPos::Above => (0, -1),
            NeighborPos::AboveLeft => (-1, -1),
            NeighborPos::AboveRight => (1, -1),
            NeighborPos::Right => (1, 0),
            NeighborPos::Bottom => (0, 1),
            NeighborPos::Colocated => (0, 0),
        };
        self.ctu_at_offset(ctu, dx, dy)
    }

    /// Whether the square of `size` at `(x, y)` lies fully inside the picture.
    pub fn cu_in_boundary(&self, x: u32, y: u32, size: u32) -> bool {
        x + size <= self.params.pic_width && y + size <= self.params.pic_height
    }
}

/// Previously decoded pictures, addressed by index.
///
/// Compression reads reference pictures from here; the current picture is
/// pushed only after it is fully compressed, so registry entries are
/// immutable by the time they are consulted.
#[derive(Debug, Default)]
pub struct PictureRegistry {
    pictures: Vec<Picture>,
}

impl PictureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, picture: Picture) -> usize {
        self.pictures.push(picture);
        self.pictures.len() - 1
    }

    pub fn get(&self, index: usize) -> Option<&Picture> {
        self.pictures.get(index)
    }

    pub fn len(&self) -> usize {
        self.pictures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pictures.is_empty()
    }
}
