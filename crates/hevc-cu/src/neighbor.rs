//! Neighborhood probe: which depths did a CTU's neighbors adopt?
//!
//! A probe walks the 8×8-aligned minimum units of a border strip of width
//! `R` samples along the edge a neighbor shares with the current CTU and
//! collects the adopted depths into a [`DepthSet`]. Any CU of 8×8 or larger
//! covers whole 8×8 blocks, so reading the top-left minimum unit of each
//! block is exact.

use crate::depth_set::DepthSet;
use crate::picture::{Picture, PictureRegistry};
use crate::zscan::ZscanTables;
use crate::{MIN_UNITS_PER_ROW, NUM_MIN_UNITS};

/// Probed neighbor positions of a CTU.
///
/// `Right` and `Bottom` are only meaningful in the colocated picture; in
/// the current picture those CTUs have not been decided yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeighborPos {
    Left,
    Above,
    AboveLeft,
    AboveRight,
    Right,
    Bottom,
    Colocated,
}

/// 8×8 blocks per CTU row.
const BLOCKS_PER_ROW: usize = 8;

const SPATIAL_POSITIONS: [NeighborPos; 6] = [
    NeighborPos::Left,
    NeighborPos::Above,
    NeighborPos::AboveLeft,
    NeighborPos::AboveRight,
    NeighborPos::Right,
    NeighborPos::Bottom,
];

/// Fixed per-radius, per-position address tables: raster minimum-unit
/// indices of the probed 8×8 blocks inside the neighbor CTU.
#[derive(Debug, Clone)]
pub(crate) struct ProbeTables {
    strips: [[Vec<u16>; 6]; 4],
}

pub(crate) fn radius_index(radius: u32) -> usize {
    match radius {
        8 => 0,
        16 => 1,
        32 => 2,
        _ => 3,
    }
}

impl ProbeTables {
    pub(crate) fn new() -> Self {
        let strips = [8u32, 16, 32, 64].map(|radius| {
            let blocks = (radius / 8) as usize;
            SPATIAL_POSITIONS.map(|pos| strip_blocks(pos, blocks))
        });
        Self { strips }
    }

    pub(crate) fn strip(&self, radius: u32, pos: NeighborPos) -> &[u16] {
        let pos_idx = SPATIAL_POSITIONS
            .iter()
            .position(|p| *p == pos)
            .expect("colocated probes have no strip table");
        &self.strips[radius_index(radius)][pos_idx]
    }
}

/// Raster unit addresses of the 8×8 blocks within `blocks * 8` samples of
/// the edge shared with the current CTU.
fn strip_blocks(pos: NeighborPos, blocks: usize) -> Vec<u16> {
    let full = 0..BLOCKS_PER_ROW;
    let near_edge = BLOCKS_PER_ROW - blocks..BLOCKS_PER_ROW;
    let far_edge = 0..blocks;
    let (xs, ys) = match pos {
        NeighborPos::Left => (near_edge, full),
        NeighborPos::Above => (full, near_edge),
        NeighborPos::AboveLeft => (near_edge.clone(), near_edge),
        NeighborPos::AboveRight => (far_edge, near_edge),
        NeighborPos::Right => (far_edge, full),
        NeighborPos::Bottom => (full, far_edge),
        NeighborPos::Colocated => unreachable!(),
    };
    let mut out = Vec::with_capacity(xs.len() * ys.len());
    for by in ys {
        for bx in xs.clone() {
            out.push((2 * by * MIN_UNITS_PER_ROW + 2 * bx) as u16);
        }
    }
    out
}

/// Adopted depths along one strip of a present CTU.
pub(crate) fn probe_strip(
    pic: &Picture,
    ctu: usize,
    table: &[u16],
    z: &ZscanTables,
) -> DepthSet {
    let mut set = DepthSet::empty();
    for &raster in table {
        let unit = pic.unit(ctu, z.raster_to_zscan(raster as usize));
        set.insert_depth(unit.depth);
    }
    set
}

/// Adopted depths across a whole CTU (the colocated probe).
pub(crate) fn probe_full(pic: &Picture, ctu: usize) -> DepthSet {
    let mut set = DepthSet::empty();
    for z in 0..NUM_MIN_UNITS {
        set.insert_depth(pic.unit(ctu, z).depth);
    }
    set
}

/// Number of 32×32 quadrants of a CTU that were decided as 32×32 CUs.
pub(crate) fn count_depth1_quadrants(pic: &Picture, ctu: usize) -> u32 {
    [0usize, 64, 128, 192]
        .iter()
        .filter(|&&z| pic.unit(ctu, z).depth == 1)
        .count() as u32
}

/// Depth adoption of every probed neighbor of one CTU.
///
/// An absent neighbor yields an empty set; a present CTU always reports at
/// least one depth, so emptiness doubles as the missing flag.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct CtuNeighborhood {
    pub left: DepthSet,
    pub above: DepthSet,
    pub above_left: DepthSet,
    pub above_right: DepthSet,
    /// Full adoption bitmap of the colocated CTU, R=64 semantics.
    pub colocated: DepthSet,
    pub coloc_left: DepthSet,
    pub coloc_above: DepthSet,
    pub coloc_right: DepthSet,
    pub coloc_bottom: DepthSet,
}

impl CtuNeighborhood {
    pub(crate) fn gather(
        cur: &Picture,
        refs: &PictureRegistry,
        ctu: usize,
        radius: u32,
        probes: &ProbeTables,
        z: &ZscanTables,
    ) -> Self {
        let mut nb = CtuNeighborhood::default();
        let spatial = |pos: NeighborPos| -> DepthSet {
            match cur.neighbor_ctu(ctu, pos) {
                Some(n) => probe_strip(cur, n, probes.strip(radius, pos), z),
                None => DepthSet::empty(),
            }
        };
        nb.left = spatial(NeighborPos::Left);
        nb.above = spatial(NeighborPos::Above);
        nb.above_left = spatial(NeighborPos::AboveLeft);
        nb.above_right = spatial(NeighborPos::AboveRight);

        if let Some(coloc) = cur.colocated.and_then(|i| refs.get(i)) {
            nb.colocated = probe_full(coloc, ctu);
            let temporal = |pos: NeighborPos| -> DepthSet {
                match coloc.neighbor_ctu(ctu, pos) {
                    Some(n) => probe_strip(coloc, n, probes.strip(radius, pos), z),
                    None => DepthSet::empty(),
                }
            };
            nb.coloc_left = temporal(NeighborPos::Left);
            nb.coloc_above = temporal(NeighborPos::Above);
            nb.coloc_right = temporal(NeighborPos::Right);
            nb.coloc_bottom = temporal(NeighborPos::Bottom);
        }
        nb
    }
}
