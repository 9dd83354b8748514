mod cost_mode;
mod fast_search;
mod part_size;
mod pred_mode;
mod slice_type;

pub use cost_mode::CostMode;
pub use fast_search::FastSearch;
pub use part_size::PartSize;
pub use pred_mode::PredMode;
pub use slice_type::SliceType;
