//! Coding-unit analysis core for an HEVC-style encoder.
//!
//! For every 64×64 coding tree unit (CTU) of a picture, this crate searches
//! the recursive quadtree of coding units (depths 0..=3, 64×64 down to 8×8)
//! for the partitioning, prediction mode, partition shape and QP with the
//! lowest rate-distortion cost. Two neighbor-driven heuristics, the
//! similarity-based decision (SBD) and reduced-region similarity
//! partitioning (RRSP), prune the candidate depth set per CTU and per 32×32
//! sub-CTU so the search stays tractable.
//!
//! Motion estimation, intra angle search, transform/quantization and CABAC
//! bit accounting are external collaborators reached through the
//! [`EncoderServices`] seam; the core drives them and keeps the winner.
//!
//! ```
//! use hevc_cu::test_utils::MockServices;
//! use hevc_cu::{
//!     CuAnalysisConfig, CuEncoder, Picture, PictureRegistry, SequenceParams, SliceType,
//! };
//!
//! # fn test() -> Result<(), hevc_cu::CuError> {
//! let params = SequenceParams::new(64, 64);
//! let mut encoder = CuEncoder::new(CuAnalysisConfig::default(), MockServices::default())?;
//!
//! let refs = PictureRegistry::new();
//! let mut pic = Picture::new(params, SliceType::I, 32, None);
//! encoder.compress_ctu(&refs, &mut pic, 0)?;
//! encoder.encode_ctu(&pic, 0);
//!
//! assert!(pic.unit(0, 0).part_size.is_some());
//! # Ok(())
//! # }
//! # test().expect("failed to run test");
//! ```
//!
//! ## License
//!
//! This project is licensed under the MIT or Apache-2.0 license.
//! You can choose between one of them if you use this work.
//!
//! `SPDX-License-Identifier: MIT OR Apache-2.0`
#![cfg_attr(all(coverage_nightly, test), feature(coverage_attribute))]
#![deny(unsafe_code)]

mod config;
mod context;
mod cu;
mod depth_set;
mod dispatch;
mod driver;
mod encode;
mod enums;
mod error;
mod neighbor;
mod picture;
mod qp;
mod rrsp;
mod sbd;
mod services;
mod slice;
pub mod test_utils;
mod yuv;
mod zscan;

pub use config::{CuAnalysisConfig, CuAnalysisConfigBuilder};
pub use context::ContextRole;
pub use cu::CuNode;
pub use depth_set::DepthSet;
pub use driver::CuEncoder;
pub use enums::*;
pub use error::CuError;
pub use neighbor::NeighborPos;
pub use picture::{MinUnit, MotionVector, MvField, Picture, PictureRegistry, SequenceParams};
pub use qp::QpPoint;
pub use services::{EncoderServices, EntropyCoder, EvalBuffers, MergeCandidate, rd_cost};
pub use slice::{SliceStats, compress_slice};
pub use yuv::{Pel, PictureYuv, YuvBuffer};
pub use zscan::ZscanTables;

/// Width and height of a coding tree unit in luma samples.
pub const CTU_SIZE: u32 = 64;

/// Width and height of a minimum unit, the granularity of the partition grid.
pub const MIN_UNIT_SIZE: u32 = 4;

/// Smallest coding unit the quadtree may produce.
pub const MIN_CU_SIZE: u32 = 8;

/// Minimum units per CTU row (and column).
pub const MIN_UNITS_PER_ROW: usize = (CTU_SIZE / MIN_UNIT_SIZE) as usize;

/// Minimum units covered by one CTU.
pub const NUM_MIN_UNITS: usize = MIN_UNITS_PER_ROW * MIN_UNITS_PER_ROW;

/// Total depth of the addressing hierarchy. Coding units live at depths
/// `0..MAX_CU_DEPTH`; the last level exists only for addressing granularity.
pub const TOTAL_DEPTH: usize = 5;

/// Number of usable coding-unit depths (64/32/16/8).
pub const MAX_CU_DEPTH: usize = 4;

/// Largest lossy quantization parameter.
pub const MAX_QP: i8 = 51;

/// Cap on the merge candidate list produced by the merge service.
pub const MRG_MAX_NUM_CANDS: usize = 5;

/// Number of minimum units covered by a CU at the given depth.
pub const fn num_units_at_depth(depth: u8) -> usize {
    NUM_MIN_UNITS >> (2 * depth)
}

/// CU width in luma samples at the given depth.
pub const fn cu_size_at_depth(depth: u8) -> u32 {
    CTU_SIZE >> depth
}
