//! Reduced-region similarity partitioning (RRSP): depth pruning at 32×32
//! granularity, driven by the colocated picture.
//!
//! At depth 0 the classifier decides whether 64×64 needs to be evaluated at
//! all, and whether anything below it does. Per 32×32 sub-CTU it builds
//! reduced α/β groups over the 8×8 blocks of the colocated region and the
//! strips bordering it, then admits a subset of the sub-64 depths. Reduced
//! depth `r` stands for CU depth `r + 1`; a bordering 64×64 CU is clamped
//! onto the 32×32 bucket at double weight.

use tracing::trace;

use crate::MIN_UNITS_PER_ROW;
use crate::depth_set::DepthSet;
use crate::neighbor::{CtuNeighborhood, count_depth1_quadrants};
use crate::picture::{Picture, PictureRegistry};
use crate::zscan::ZscanTables;

/// Number of reduced (sub-64) depths.
const NUM_REDUCED: usize = 3;

/// QP above which a fully-agreeing 64×64 neighborhood ends the search.
const HIGH_QP: i8 = 35;

/// Depth-0 outcome: whether only 64×64 is searched, and whether 64×64 is
/// searched at all.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RrspDepth0 {
    pub only_depth0: bool,
    pub check_64x64: bool,
}

/// Reduced-group similarity, from the number of unrepresented depths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RrspSimilarity {
    Low,
    Medium,
    High,
}

/// Per-position address tables of the reduced α/β strips, in 8×8-block
/// coordinates relative to the colocated CTU (entries may index into its
/// neighbors). Built once at startup.
#[derive(Debug, Clone)]
pub(crate) struct RrspTables {
    alpha: [Vec<(i32, i32)>; 4],
    beta: [Vec<(i32, i32)>; 4],
}

impl RrspTables {
    pub(crate) fn new() -> Self {
        let alpha = [0usize, 1, 2, 3].map(|child| {
            let (bx0, by0) = region_base(child);
            let mut blocks = Vec::new();
            // Corner, top strip, left strip, then the region itself.
            blocks.push((bx0 - 1, by0 - 1));
            for bx in bx0..bx0 + 4 {
                blocks.push((bx, by0 - 1));
            }
            for by in by0..by0 + 4 {
                blocks.push((bx0 - 1, by));
            }
            for by in by0..by0 + 4 {
                for bx in bx0..bx0 + 4 {
                    blocks.push((bx, by));
                }
            }
            blocks
        });
        let beta = [0usize, 1, 2, 3].map(|child| {
            let (bx0, by0) = region_base(child);
            let mut blocks = Vec::new();
            for by in by0..by0 + 4 {
                blocks.push((bx0 + 4, by));
            }
            for bx in bx0..bx0 + 4 {
                blocks.push((bx, by0 + 4));
            }
            blocks.push((bx0 + 4, by0 + 4));
            blocks
        });
        Self { alpha, beta }
    }
}

/// Top-left 8×8-block coordinate of the 32×32 region of child `i`.
fn region_base(child: usize) -> (i32, i32) {
    ((child as i32 & 1) * 4, (child as i32 >> 1) * 4)
}

/// Weighted adoption counters over one strip table. The first table entry
/// of the α tables is the above-left corner; its contribution is returned
/// separately for the uniqueness rule.
fn tally(
    pic: &Picture,
    ctu: usize,
    blocks: &[(i32, i32)],
    z: &ZscanTables,
    corner_first: bool,
) -> ([u32; NUM_REDUCED], [u32; NUM_REDUCED]) {
    let mut counts = [0u32; NUM_REDUCED];
    let mut corner = [0u32; NUM_REDUCED];
    for (i, &(bx, by)) in blocks.iter().enumerate() {
        let (ctu_dx, local_x) = (bx.div_euclid(8), bx.rem_euclid(8));
        let (ctu_dy, local_y) = (by.div_euclid(8), by.rem_euclid(8));
        let Some(target) = pic.ctu_at_offset(ctu, ctu_dx, ctu_dy) else {
            continue;
        };
        let raster = 2 * local_y as usize * MIN_UNITS_PER_ROW + 2 * local_x as usize;
        let depth = pic.unit(target, z.raster_to_zscan(raster)).depth;
        let reduced = depth.saturating_sub(1) as usize;
        let weight = 1 + u32::from(depth == 0);
        counts[reduced] += weight;
        if corner_first && i == 0 {
            corner[reduced] += weight;
        }
    }
    (counts, corner)
}

fn adopted_set(counts: &[u32; NUM_REDUCED]) -> DepthSet {
    let mut set = DepthSet::empty();
    for (rd, &count) in counts.iter().enumerate() {
        if count > 0 {
            set.insert_depth(rd as u8);
        }
    }
    set
}

/// Depth-0 classification over the full-64×64 adoption of groups A and B.
pub(crate) fn classify_depth0(
    cur: &Picture,
    refs: &PictureRegistry,
    ctu: usize,
    qp: i8,
    nb: &CtuNeighborhood,
) -> RrspDepth0 {
    let a_members = [nb.left, nb.above, nb.above_left, nb.colocated];
    let b_members = [
        nb.above_right,
        nb.coloc_above,
        nb.coloc_left,
        nb.coloc_right,
        nb.coloc_bottom,
    ];
    let contributors = a_members
        .iter()
        .chain(b_members.iter())
        .filter(|s| !s.is_empty())
        .count();
    let all_adopt_64 = contributors > 0
        && a_members
            .iter()
            .chain(b_members.iter())
            .filter(|s| !s.is_empty())
            .all(|s| s.contains_depth(0));

    let coloc = cur.colocated.and_then(|i| refs.get(i));
    let mut only_depth0 = false;
    if all_adopt_64 {
        let grandfather = coloc
            .and_then(|p| p.colocated)
            .and_then(|i| refs.get(i));
        only_depth0 = match grandfather {
            None => true,
            Some(gf) => qp > HIGH_QP || crate::neighbor::probe_full(gf, ctu).contains_depth(0),
        };
    }

    // 64×64 is worth checking when anything in the neighborhood used it, or
    // when half the A-group quadrants settled on 32×32 (one step away), or
    // near the top of a scene cut in the reference.
    let a_any_64 = a_members.iter().any(|s| s.contains_depth(0));
    let b_any_64 = b_members.iter().any(|s| s.contains_depth(0));
    let coloc_intra_top = coloc.is_some_and(|p| p.slice_type.is_intra()) && {
        let (_, y) = cur.ctu_origin(ctu);
        y < 32
    };
    let mut num_a = 0u32;
    let mut count_32 = 0u32;
    for (i, set) in a_members.iter().enumerate() {
        if set.is_empty() {
            continue;
        }
        num_a += 1;
        count_32 += match i {
            0 => cur
                .neighbor_ctu(ctu, crate::neighbor::NeighborPos::Left)
                .map_or(0, |n| count_depth1_quadrants(cur, n)),
            1 => cur
                .neighbor_ctu(ctu, crate::neighbor::NeighborPos::Above)
                .map_or(0, |n| count_depth1_quadrants(cur, n)),
            2 => cur
                .neighbor_ctu(ctu, crate::neighbor::NeighborPos::AboveLeft)
                .map_or(0, |n| count_depth1_quadrants(cur, n)),
            _ => coloc.map_or(0, |p| count_depth1_quadrants(p, ctu)),
        };
    }
    let check_64x64 = contributors == 0
        || a_any_64
        || coloc_intra_top
        || b_any_64
        || (num_a > 0 && count_32 >= num_a * 4 / 2);

    let out = RrspDepth0 {
        only_depth0,
        check_64x64,
    };
    trace!(ctu, ?out, "reduced-region depth-0 classification");
    out
}

/// Admitted sub-64 depths for child `child` of the CTU, classified from the
/// colocated picture at registry index `coloc_idx`.
///
/// `allow_grandfather` guards the one-deep temporal recursion of the
/// high-similarity branch; the recursive call always passes `false`.
#[allow(clippy::too_many_arguments)]
pub(crate) fn classify_sub_ctu(
    refs: &PictureRegistry,
    coloc_idx: usize,
    ctu: usize,
    child: usize,
    qp: i8,
    tables: &RrspTables,
    z: &ZscanTables,
    allow_grandfather: bool,
) -> DepthSet {
    let Some(coloc) = refs.get(coloc_idx) else {
        return DepthSet::all_reduced_depths();
    };
    let (alpha, corner) = tally(coloc, ctu, &tables.alpha[child], z, true);
    let adopted = adopted_set(&alpha);
    if adopted.is_empty() {
        return DepthSet::all_reduced_depths();
    }
    let zeros = alpha.iter().filter(|&&c| c == 0).count();
    let sim = match zeros {
        0 => RrspSimilarity::Low,
        1 => RrspSimilarity::Medium,
        _ => RrspSimilarity::High,
    };
    let (beta, _) = tally(coloc, ctu, &tables.beta[child], z, false);

    let range = match sim {
        RrspSimilarity::High => classify_high(
            refs, coloc, ctu, child, qp, tables, z, allow_grandfather, adopted, &beta,
        ),
        RrspSimilarity::Medium => classify_medium(adopted, &alpha, &corner, &beta),
        RrspSimilarity::Low => classify_low(&alpha, &beta),
    };
    trace!(ctu, child, ?sim, ?range, "reduced-region classification");
    range
}

#[allow(clippy::too_many_arguments)]
fn classify_high(
    refs: &PictureRegistry,
    coloc: &Picture,
    ctu: usize,
    child: usize,
    qp: i8,
    tables: &RrspTables,
    z: &ZscanTables,
    allow_grandfather: bool,
    adopted: DepthSet,
    beta: &[u32; NUM_REDUCED],
) -> DepthSet {
    let a = adopted.shallowest().expect("single adopted reduced depth");
    let mut range = adopted;
    let extra = (0..NUM_REDUCED as u8)
        .filter(|&rd| rd != a && beta[rd as usize] > 0)
        .max_by_key(|&rd| beta[rd as usize]);
    if let Some(toward) = extra {
        // β disagrees: take one step toward it.
        let step = if toward > a { a + 1 } else { a - 1 };
        range.insert_depth(step);
        return range;
    }
    // β matches α. Consult the frame before the reference once; when the
    // guard is already spent (or there is nothing to consult) the
    // predecessor depth is admitted outright.
    if a > 0 {
        let grandfather = coloc.colocated.filter(|_| allow_grandfather && qp <= HIGH_QP);
        match grandfather {
            Some(gf_idx) => {
                let gf_range =
                    classify_sub_ctu(refs, gf_idx, ctu, child, qp, tables, z, false);
                if gf_range.contains_depth(a - 1) {
                    range.insert_depth(a - 1);
                }
            }
            None => range.insert_depth(a - 1),
        }
    }
    range
}

fn classify_medium(
    adopted: DepthSet,
    alpha: &[u32; NUM_REDUCED],
    corner: &[u32; NUM_REDUCED],
    beta: &[u32; NUM_REDUCED],
) -> DepthSet {
    // A strong shallow/deep split around the region resolves to 32×32.
    if alpha[0] > 1 && alpha[NUM_REDUCED - 1] >= 16 {
        return DepthSet::D0;
    }
    // A depth missing from α but well represented in β joins the range.
    const BETA_MINIMUM: [u32; NUM_REDUCED] = [4, 2, 2];
    let newcomer = (0..NUM_REDUCED)
        .find(|&rd| alpha[rd] == 0 && beta[rd] >= BETA_MINIMUM[rd]);
    if let Some(rd) = newcomer {
        return adopted | DepthSet::from_depth(rd as u8);
    }
    // A depth contributed only by the corner block, with no β support, is
    // dropped.
    let mut range = adopted;
    for rd in adopted.depths() {
        if alpha[rd as usize] == 1 && corner[rd as usize] == 1 && beta[rd as usize] == 0 {
            range.remove_depth(rd);
            break;
        }
    }
    if range.is_empty() { adopted } else { range }
}

fn classify_low(alpha: &[u32; NUM_REDUCED], beta: &[u32; NUM_REDUCED]) -> DepthSet {
    let mut range = DepthSet::all_reduced_depths();
    let deepest = NUM_REDUCED - 1;
    if alpha[0] > 20 {
        range.remove_depth(deepest as u8);
    } else if alpha[deepest] > 20 {
        range.remove_depth(0);
    } else if alpha[deepest] <= 2 {
        if alpha[deepest] < 2 || beta[deepest] == 0 {
            range.remove_depth(deepest as u8);
        }
    } else if alpha[0] < 4 && beta[0] == 0 {
        range.remove_depth(0);
    }
    range
}

#[cfg(test)]
#[cfg_attr(all(test, coverage_nightly), coverage(off))]
mod tests {
    use super::*;
    use crate::NUM_MIN_UNITS;
    use crate::enums::SliceType;
    use crate::picture::SequenceParams;

    fn picture(slice_type: SliceType) -> Picture {
        Picture::new(SequenceParams::new(192, 192), slice_type, 32, None)
    }

    fn fill_ctu_depth(pic: &mut Picture, ctu: usize, depth: u8) {
        for z in 0..NUM_MIN_UNITS {
            pic.unit_mut(ctu, z).depth = depth;
        }
    }

    /// Set the depth of one 32×32 quadrant of a CTU.
    fn fill_quadrant_depth(pic: &mut Picture, ctu: usize, child: usize, depth: u8) {
        for z in child * 64..(child + 1) * 64 {
            pic.unit_mut(ctu, z).depth = depth;
        }
    }

    fn neighborhood_all(set: DepthSet) -> CtuNeighborhood {
        CtuNeighborhood {
            left: set,
            above: set,
            above_left: set,
            above_right: set,
            colocated: set,
            coloc_left: set,
            coloc_above: set,
            coloc_right: set,
            coloc_bottom: set,
        }
    }

    #[test]
    fn test_only_depth0_at_high_qp() {
        // Every neighbor at 64×64 and QP above the threshold: the search
        // stays at depth 0 even though the grandfather disagrees.
        let mut refs = PictureRegistry::new();
        let mut gf = picture(SliceType::P);
        fill_ctu_depth(&mut gf, 4, 2);
        let gf_idx = refs.push(gf);
        let mut coloc = picture(SliceType::P);
        coloc.colocated = Some(gf_idx);
        let coloc_idx = refs.push(coloc);

        let mut cur = picture(SliceType::P);
        cur.colocated = Some(coloc_idx);
        let nb = neighborhood_all(DepthSet::D0);
        let out = classify_depth0(&cur, &refs, 4, 37, &nb);
        assert!(out.only_depth0);
    }

    #[test]
    fn test_only_depth0_needs_agreeing_grandfather_at_low_qp() {
        let mut refs = PictureRegistry::new();
        let mut gf = picture(SliceType::P);
        fill_ctu_depth(&mut gf, 4, 2);
        let gf_idx = refs.push(gf);
        let mut coloc = picture(SliceType::P);
        coloc.colocated = Some(gf_idx);
        let coloc_idx = refs.push(coloc);

        let mut cur = picture(SliceType::P);
        cur.colocated = Some(coloc_idx);
        let nb = neighborhood_all(DepthSet::D0);
        let out = classify_depth0(&cur, &refs, 4, 30, &nb);
        assert!(!out.only_depth0, "grandfather disagrees and QP is low");
        assert!(out.check_64x64);
    }

    #[test]
    fn test_only_depth0_when_grandfather_missing() {
        let mut refs = PictureRegistry::new();
        let coloc_idx = refs.push(picture(SliceType::P));
        let mut cur = picture(SliceType::P);
        cur.colocated = Some(coloc_idx);
        let nb = neighborhood_all(DepthSet::D0);
        let out = classify_depth0(&cur, &refs, 4, 30, &nb);
        assert!(out.only_depth0);
    }

    #[test]
    fn test_check_64x64_from_quadrant_majority() {
        // Nobody adopted 64×64, but the A group is dominated by 32×32
        // quadrants, so 64×64 is still evaluated.
        let mut refs = PictureRegistry::new();
        let mut coloc = picture(SliceType::P);
        fill_ctu_depth(&mut coloc, 4, 1);
        let coloc_idx = refs.push(coloc);
        let mut cur = picture(SliceType::P);
        cur.colocated = Some(coloc_idx);
        // Spatial A members are all 32×32 too.
        for ctu in [3usize, 1, 0] {
            fill_ctu_depth(&mut cur, ctu, 1);
        }
        let nb = neighborhood_all(DepthSet::D1);
        let out = classify_depth0(&cur, &refs, 4, 30, &nb);
        assert!(!out.only_depth0);
        assert!(out.check_64x64);
    }

    #[test]
    fn test_sub_ctu_high_similarity_single_depth() {
        let mut refs = PictureRegistry::new();
        let mut coloc = picture(SliceType::P);
        for ctu in 0..coloc.num_ctus() {
            fill_ctu_depth(&mut coloc, ctu, 1);
        }
        let coloc_idx = refs.push(coloc);
        let range = classify_sub_ctu(
            &refs,
            coloc_idx,
            4,
            0,
            30,
            &RrspTables::new(),
            &ZscanTables::new(),
            true,
        );
        // Reduced depth 0 (32×32), with no grandfather to consult and a
        // positive predecessor missing, stays alone.
        assert_eq!(range, DepthSet::D0);
    }

    #[test]
    fn test_sub_ctu_high_beta_pulls_one_step() {
        let mut refs = PictureRegistry::new();
        let mut coloc = picture(SliceType::P);
        for ctu in 0..coloc.num_ctus() {
            fill_ctu_depth(&mut coloc, ctu, 1);
        }
        // The strip right of child 0's region lies in child 1: make it 8×8.
        fill_quadrant_depth(&mut coloc, 4, 1, 3);
        let coloc_idx = refs.push(coloc);
        let range = classify_sub_ctu(
            &refs,
            coloc_idx,
            4,
            0,
            30,
            &RrspTables::new(),
            &ZscanTables::new(),
            true,
        );
        assert_eq!(range, DepthSet::D0 | DepthSet::D1);
    }

    #[test]
    fn test_sub_ctu_high_spent_guard_admits_predecessor() {
        let mut refs = PictureRegistry::new();
        let mut coloc = picture(SliceType::P);
        for ctu in 0..coloc.num_ctus() {
            fill_ctu_depth(&mut coloc, ctu, 2);
        }
        let coloc_idx = refs.push(coloc);
        let range = classify_sub_ctu(
            &refs,
            coloc_idx,
            4,
            0,
            30,
            &RrspTables::new(),
            &ZscanTables::new(),
            false,
        );
        assert_eq!(range, DepthSet::D0 | DepthSet::D1);
    }

    #[test]
    fn test_sub_ctu_medium_resolves_to_32x32() {
        // Region split between 16×16 CUs and 8×8 everywhere deep: the
        // shallow count and a massive deep count trip the direct rule.
        let mut refs = PictureRegistry::new();
        let mut coloc = picture(SliceType::P);
        for ctu in 0..coloc.num_ctus() {
            fill_ctu_depth(&mut coloc, ctu, 3);
        }
        // Two 64×64 CTUs border child 0's strips from the left and above.
        fill_ctu_depth(&mut coloc, 3, 0);
        fill_ctu_depth(&mut coloc, 1, 0);
        let coloc_idx = refs.push(coloc);
        let range = classify_sub_ctu(
            &refs,
            coloc_idx,
            4,
            0,
            30,
            &RrspTables::new(),
            &ZscanTables::new(),
            true,
        );
        assert_eq!(range, DepthSet::D0);
    }

    #[test]
    fn test_sub_ctu_low_drops_scarce_deepest() {
        // All three reduced depths appear in α, the deepest only once: it
        // is dropped.
        let mut refs = PictureRegistry::new();
        let mut coloc = picture(SliceType::P);
        for ctu in 0..coloc.num_ctus() {
            fill_ctu_depth(&mut coloc, ctu, 2);
        }
        // 32×32 CUs border child 0's strips from the left and above.
        fill_ctu_depth(&mut coloc, 1, 1);
        fill_ctu_depth(&mut coloc, 3, 1);
        // One single 8×8 CU inside child 0's region.
        coloc.unit_mut(4, 0).depth = 3;
        let coloc_idx = refs.push(coloc);
        let range = classify_sub_ctu(
            &refs,
            coloc_idx,
            4,
            0,
            30,
            &RrspTables::new(),
            &ZscanTables::new(),
            true,
        );
        assert_eq!(range, DepthSet::D0 | DepthSet::D1);
    }
}
