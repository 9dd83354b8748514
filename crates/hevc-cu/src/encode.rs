//! Serialization walk: emit the decided quadtree of a compressed CTU.
//!
//! The walk revisits the stored minimum units in Z order, writing split
//! flags where the stored depth exceeds the walk depth, then the per-CU
//! syntax in the order the decoder expects it.

use crate::enums::PredMode;
use crate::picture::Picture;
use crate::services::EntropyCoder;
use crate::zscan::ZscanTables;
use crate::{MAX_CU_DEPTH, cu_size_at_depth, num_units_at_depth};

/// Emit one compressed CTU. The terminating bit is written when further
/// CTUs follow in the slice.
pub(crate) fn encode_ctu<E: EntropyCoder>(
    coder: &mut E,
    tables: &ZscanTables,
    pic: &Picture,
    ctu: usize,
) {
    encode_cu(coder, tables, pic, ctu, 0, 0);
    if ctu + 1 < pic.num_ctus() {
        coder.code_terminating_bit(false);
    }
}

fn encode_cu<E: EntropyCoder>(
    coder: &mut E,
    tables: &ZscanTables,
    pic: &Picture,
    ctu: usize,
    z_offset: usize,
    depth: u8,
) {
    let params = &pic.params;
    let width = cu_size_at_depth(depth);
    let (ctu_x, ctu_y) = pic.ctu_origin(ctu);
    let (dx, dy) = tables.pixel_of_zscan(z_offset);
    let (x, y) = (ctu_x + dx, ctu_y + dy);
    let unit = *pic.unit(ctu, z_offset);

    let in_pic = pic.cu_in_boundary(x, y, width);
    let can_split = (depth as usize) + 1 < MAX_CU_DEPTH;
    if in_pic && can_split {
        coder.code_split_flag(unit.depth > depth, depth);
    }
    if can_split && (unit.depth > depth || !in_pic) {
        let quarter = num_units_at_depth(depth) / 4;
        for child in 0..4 {
            let cz = z_offset + child * quarter;
            let (cdx, cdy) = tables.pixel_of_zscan(cz);
            if ctu_x + cdx >= params.pic_width || ctu_y + cdy >= params.pic_height {
                continue;
            }
            encode_cu(coder, tables, pic, ctu, cz, depth + 1);
        }
        return;
    }

    if params.tqb_enabled {
        coder.code_tqb_flag(unit.tqb);
    }
    if pic.slice_type.is_inter() {
        coder.code_skip_flag(unit.skip);
    }
    if unit.skip {
        coder.code_merge_index(unit.merge_index);
        return;
    }

    let (mode, part) = match (unit.pred_mode, unit.part_size) {
        (Some(mode), Some(part)) => (mode, part),
        _ => panic!("serialization of undecided unit {} at CTU {}", z_offset, ctu),
    };
    if pic.slice_type.is_inter() {
        coder.code_pred_mode(mode);
    }
    coder.code_part_size(part, depth);
    if mode == PredMode::Intra && part == crate::enums::PartSize::Size2Nx2N {
        coder.code_ipcm_info(&unit);
        if unit.ipcm {
            return;
        }
    }

    let units = &pic.ctu_units(ctu)[z_offset..z_offset + num_units_at_depth(depth)];
    coder.code_pred_info(units);
    if params.delta_qp_enabled && width >= params.min_cu_dqp_size() && unit.has_residual() {
        coder.code_delta_qp(unit.qp - pic.slice_qp);
    }
    if params.chroma_qp_adj_enabled
        && width >= (crate::CTU_SIZE >> params.max_cu_chroma_qp_adj_depth)
        && (unit.cbf_cb || unit.cbf_cr)
    {
        coder.code_chroma_qp_adj(0);
    }
    coder.code_coefficients(units);
}

#[cfg(test)]
#[cfg_attr(all(test, coverage_nightly), coverage(off))]
mod tests {
    use super::*;
    use crate::enums::{PartSize, SliceType};
    use crate::picture::SequenceParams;
    use crate::test_utils::MockServices;

    /// Store a decided CU over `[z, z + len)` of a CTU.
    fn store_cu(pic: &mut Picture, ctu: usize, z: usize, len: usize, depth: u8, skip: bool) {
        for i in z..z + len {
            let unit = pic.unit_mut(ctu, i);
            unit.depth = depth;
            unit.part_size = Some(PartSize::Size2Nx2N);
            unit.pred_mode = Some(crate::enums::PredMode::Inter);
            unit.skip = skip;
        }
    }

    #[test]
    fn test_unsplit_skip_ctu() {
        let mut pic = Picture::new(SequenceParams::new(128, 64), SliceType::P, 30, None);
        store_cu(&mut pic, 0, 0, 256, 0, true);
        let mut coder = MockServices::default();
        encode_ctu(&mut coder, &ZscanTables::new(), &pic, 0);
        assert_eq!(
            coder.calls,
            vec![
                "code_split_flag false d0",
                "code_skip_flag true",
                "code_merge_index 0",
                "code_terminating_bit false",
            ]
        );
    }

    #[test]
    fn test_split_walk_emits_children_in_z_order() {
        let mut pic = Picture::new(SequenceParams::new(64, 64), SliceType::P, 30, None);
        // Three 32×32 CUs and one further split into 16×16 skip CUs.
        store_cu(&mut pic, 0, 0, 64, 1, false);
        store_cu(&mut pic, 0, 64, 64, 1, true);
        store_cu(&mut pic, 0, 128, 64, 1, false);
        for quadrant in 0..4 {
            store_cu(&mut pic, 0, 192 + quadrant * 16, 16, 2, true);
        }
        let mut coder = MockServices::default();
        encode_ctu(&mut coder, &ZscanTables::new(), &pic, 0);
        let splits: Vec<&str> = coder
            .calls
            .iter()
            .filter(|c| c.starts_with("code_split_flag"))
            .map(|s| s.as_str())
            .collect();
        assert_eq!(
            splits,
            vec![
                "code_split_flag true d0",
                "code_split_flag false d1",
                "code_split_flag false d1",
                "code_split_flag false d1",
                "code_split_flag true d1",
                "code_split_flag false d2",
                "code_split_flag false d2",
                "code_split_flag false d2",
                "code_split_flag false d2",
            ]
        );
        // Single CTU in the picture: no terminating bit.
        assert!(!coder.calls.iter().any(|c| c.starts_with("code_terminating")));
    }

    #[test]
    fn test_boundary_ctu_walk_skips_outside_children() {
        // 96 samples wide: the second CTU covers only a 32-wide column.
        let mut pic = Picture::new(SequenceParams::new(96, 64), SliceType::P, 30, None);
        store_cu(&mut pic, 1, 0, 64, 1, false);
        store_cu(&mut pic, 1, 128, 64, 1, false);
        let mut coder = MockServices::default();
        encode_ctu(&mut coder, &ZscanTables::new(), &pic, 1);
        // No split flag at depth 0 (boundary split is implicit), and only
        // the two in-picture children emit anything.
        assert!(!coder.calls.contains(&"code_split_flag true d0".to_string()));
        let d1_flags = coder
            .calls
            .iter()
            .filter(|c| *c == "code_split_flag false d1")
            .count();
        assert_eq!(d1_flags, 2);
    }

    #[test]
    fn test_ipcm_cu_stops_after_payload() {
        let mut pic = Picture::new(SequenceParams::new(64, 64), SliceType::I, 30, None);
        for i in 0..256 {
            let unit = pic.unit_mut(0, i);
            unit.depth = 0;
            unit.part_size = Some(PartSize::Size2Nx2N);
            unit.pred_mode = Some(crate::enums::PredMode::Intra);
            unit.ipcm = true;
        }
        let mut coder = MockServices::default();
        encode_ctu(&mut coder, &ZscanTables::new(), &pic, 0);
        assert!(coder.calls.iter().any(|c| c.starts_with("code_ipcm_info")));
        assert!(!coder.calls.iter().any(|c| c.starts_with("code_coefficients")));
        // I slice: no skip flag, no pred mode.
        assert!(!coder.calls.iter().any(|c| c.starts_with("code_skip_flag")));
        assert!(!coder.calls.iter().any(|c| c.starts_with("code_pred_mode")));
    }
}
