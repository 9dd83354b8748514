/// Motion search strategy requested from the prediction service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FastSearch {
    /// Full-behavior search.
    #[default]
    Normal,
    /// Selective search that skips refinement for unpromising candidates.
    Selective,
}
