//! Per-slice compression loop: raster-order CTU compression followed by
//! the serialization walk.

use tracing::debug;

use crate::driver::CuEncoder;
use crate::error::CuError;
use crate::picture::{Picture, PictureRegistry};
use crate::services::EncoderServices;

/// Aggregate outcome of compressing one slice.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SliceStats {
    pub ctus: usize,
    pub bits: u64,
    pub bins: u64,
    pub distortion: u64,
    pub cost: f64,
}

/// Compress every CTU of `pic` in raster order, then emit them all.
///
/// A CTU's decisions land in the picture's CU store before the next CTU
/// starts, so later CTUs see them as spatial neighbors; the walk only runs
/// once the whole slice is decided.
pub fn compress_slice<S: EncoderServices>(
    encoder: &mut CuEncoder<S>,
    refs: &PictureRegistry,
    pic: &mut Picture,
) -> Result<SliceStats, CuError> {
    let mut stats = SliceStats::default();
    for ctu in 0..pic.num_ctus() {
        encoder.compress_ctu(refs, pic, ctu)?;
        let (bits, bins, distortion, cost) = encoder.root_totals();
        stats.ctus += 1;
        stats.bits += u64::from(bits);
        stats.bins += u64::from(bins);
        stats.distortion += distortion;
        stats.cost += cost;
    }
    for ctu in 0..pic.num_ctus() {
        encoder.encode_ctu(pic, ctu);
    }
    debug!(
        ctus = stats.ctus,
        bits = stats.bits,
        cost = stats.cost,
        "slice compressed"
    );
    Ok(stats)
}

#[cfg(test)]
#[cfg_attr(all(test, coverage_nightly), coverage(off))]
mod tests {
    use super::*;
    use crate::config::CuAnalysisConfig;
    use crate::enums::SliceType;
    use crate::picture::SequenceParams;
    use crate::test_utils::{MockServices, init_tracing};

    #[test]
    fn test_slice_walkthrough() {
        init_tracing(); // Initialize tracing for logging
        let params = SequenceParams::new(128, 64);
        let mut encoder =
            CuEncoder::new(CuAnalysisConfig::default(), MockServices::default()).unwrap();
        let refs = PictureRegistry::new();
        let mut pic = Picture::new(params, SliceType::I, 32, None);
        let stats = compress_slice(&mut encoder, &refs, &mut pic).unwrap();
        assert_eq!(stats.ctus, 2);
        assert!(stats.bits > 0);
        assert!(stats.cost.is_finite());
        // Every minimum unit of both CTUs ended up decided.
        for ctu in 0..2 {
            for z in 0..crate::NUM_MIN_UNITS {
                assert!(pic.unit(ctu, z).part_size.is_some());
            }
        }
        // The walk emitted a terminating bit between the two CTUs.
        let terms = encoder
            .services()
            .calls
            .iter()
            .filter(|c| c.starts_with("code_terminating_bit"))
            .count();
        assert_eq!(terms, 1);
    }

    #[test]
    fn test_compression_is_deterministic() {
        init_tracing();
        let params = SequenceParams::new(128, 64);
        let refs = PictureRegistry::new();

        let run = || {
            let mut encoder =
                CuEncoder::new(CuAnalysisConfig::default(), MockServices::default()).unwrap();
            let mut pic = Picture::new(params, SliceType::P, 32, None);
            let stats = compress_slice(&mut encoder, &refs, &mut pic).unwrap();
            let depths: Vec<u8> = (0..pic.num_ctus())
                .flat_map(|ctu| pic.ctu_units(ctu).iter().map(|u| u.depth).collect::<Vec<_>>())
                .collect();
            (stats, depths)
        };
        assert_eq!(run(), run());
    }
}
