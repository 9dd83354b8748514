//! Similarity-based decision (SBD): prune the depth set of a whole CTU from
//! the depths its spatial and temporal neighbors adopted.
//!
//! Group α is {Left, Above, AboveLeft, Colocated}; group β is {AboveRight}
//! plus the colocated CTU's own four neighbors. The number of distinct
//! depths adopted across α is the similarity level; each level restricts
//! the admitted depth set differently.

use tracing::trace;

use crate::MAX_CU_DEPTH;
use crate::depth_set::DepthSet;
use crate::neighbor::CtuNeighborhood;

/// Similarity level derived from the count of α-adopted depths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SimLevel {
    High,
    MediumHigh,
    MediumLow,
    Low,
}

impl SimLevel {
    fn from_adopted_count(count: u32) -> Self {
        // With a total depth of 5 the levels sit at 1, 2, 3 and 4 adopted
        // depths.
        match count {
            1 => SimLevel::High,
            2 => SimLevel::MediumHigh,
            3 => SimLevel::MediumLow,
            _ => SimLevel::Low,
        }
    }
}

/// Per-depth adoption counters over a neighbor group.
#[derive(Debug, Default)]
struct GroupCounters {
    counts: [u32; MAX_CU_DEPTH],
    members: u32,
}

impl GroupCounters {
    fn tally(sets: &[DepthSet]) -> Self {
        let mut group = GroupCounters::default();
        for set in sets {
            if set.is_empty() {
                continue;
            }
            group.members += 1;
            for depth in set.depths() {
                group.counts[depth as usize] += 1;
            }
        }
        group
    }

    fn adopted(&self) -> DepthSet {
        let mut set = DepthSet::empty();
        for (depth, &count) in self.counts.iter().enumerate() {
            if count > 0 {
                set.insert_depth(depth as u8);
            }
        }
        set
    }
}

/// Depth set the driver may evaluate at this CTU.
pub(crate) fn classify(nb: &CtuNeighborhood) -> DepthSet {
    let alpha = GroupCounters::tally(&[nb.left, nb.above, nb.above_left, nb.colocated]);
    let alpha_adopted = alpha.adopted();
    if alpha_adopted.is_empty() {
        // No neighbor contributed; nothing to prune from.
        return DepthSet::all_cu_depths();
    }

    let level = SimLevel::from_adopted_count(alpha_adopted.count());
    let range = match level {
        SimLevel::High => classify_high(nb, alpha_adopted),
        SimLevel::MediumHigh => classify_medium_high(nb, &alpha, alpha_adopted),
        SimLevel::MediumLow => classify_medium_low(&alpha, alpha_adopted),
        SimLevel::Low => classify_low(nb, &alpha),
    };
    trace!(?level, ?range, "similarity classification");
    range
}

fn beta_counters(nb: &CtuNeighborhood) -> GroupCounters {
    GroupCounters::tally(&[
        nb.above_right,
        nb.coloc_left,
        nb.coloc_above,
        nb.coloc_right,
        nb.coloc_bottom,
    ])
}

/// All neighbors agree on a single depth.
fn classify_high(nb: &CtuNeighborhood, alpha_adopted: DepthSet) -> DepthSet {
    let beta_adopted = beta_counters(nb).adopted();
    if (beta_adopted & !alpha_adopted).is_empty() {
        return alpha_adopted;
    }
    // β disagrees: widen by one depth next to the α depth.
    let only = alpha_adopted.shallowest().expect("single adopted depth");
    let deepest = (alpha_adopted | beta_adopted)
        .deepest()
        .expect("non-empty overall set");
    let mut range = alpha_adopted;
    if alpha_adopted.contains_depth(deepest) {
        if deepest > 0 {
            range.insert_depth(deepest - 1);
        }
    } else if (only as usize) + 1 < MAX_CU_DEPTH {
        range.insert_depth(only + 1);
    }
    range
}

fn classify_medium_high(
    nb: &CtuNeighborhood,
    alpha: &GroupCounters,
    alpha_adopted: DepthSet,
) -> DepthSet {
    let beta = beta_counters(nb);
    let beta_adopted = beta.adopted();
    let extra = beta_adopted & !alpha_adopted;
    if extra.is_empty() {
        // A depth seen only through the above-left corner is dropped.
        let only_corner = alpha_adopted
            .depths()
            .any(|d| alpha.counts[d as usize] == 1 && nb.above_left.contains_depth(d));
        if only_corner {
            let reduced = alpha_adopted & !nb.above_left;
            if !reduced.is_empty() {
                return reduced;
            }
        }
        return alpha_adopted;
    }
    // β introduces new depths: admit the most frequent of them.
    let newcomer = extra
        .depths()
        .max_by_key(|&d| (beta.counts[d as usize], std::cmp::Reverse(d)))
        .expect("extra set is non-empty");
    alpha_adopted | DepthSet::from_depth(newcomer)
}

fn classify_medium_low(alpha: &GroupCounters, alpha_adopted: DepthSet) -> DepthSet {
    let mut range = alpha_adopted;
    if alpha.members <= 1 {
        return range;
    }
    // When one depth is adopted by every α neighbor and a second depth by
    // exactly one of them, the unique one is dropped: that CU merely strayed
    // one size away from the consensus.
    let universal = alpha_adopted
        .depths()
        .find(|&d| alpha.counts[d as usize] == alpha.members);
    if let Some(u) = universal {
        let unique = alpha_adopted
            .depths()
            .filter(|&v| v != u && alpha.counts[v as usize] == 1)
            .min_by_key(|&v| (u.abs_diff(v), std::cmp::Reverse(v)));
        if let Some(v) = unique {
            range.remove_depth(v);
        }
    }
    range
}

fn classify_low(nb: &CtuNeighborhood, alpha: &GroupCounters) -> DepthSet {
    let mut range = DepthSet::all_cu_depths();
    let min_count = alpha
        .counts
        .iter()
        .copied()
        .min()
        .expect("counters are non-empty");
    let tied: Vec<u8> = (0..MAX_CU_DEPTH as u8)
        .filter(|&d| alpha.counts[d as usize] == min_count)
        .collect();
    if let [single] = tied[..] {
        range.remove_depth(single);
        return range;
    }
    // Tie: bias the remaining search away from the side the colocated CTU
    // favors by dropping a tied depth from that side.
    let coloc = nb.colocated;
    let low_side = coloc.contains_depth(0) as u32 + coloc.contains_depth(1) as u32;
    let high_side = coloc.contains_depth(2) as u32 + coloc.contains_depth(3) as u32;
    let winning_low = low_side >= high_side;
    let drop = tied
        .iter()
        .copied()
        .find(|&d| if winning_low { d < 2 } else { d >= 2 })
        .unwrap_or(tied[0]);
    range.remove_depth(drop);
    range
}
