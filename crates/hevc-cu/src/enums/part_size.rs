/// Prediction partition shape of a coding unit.
///
/// The four asymmetric shapes (AMP) split one axis 1:3 or 3:1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartSize {
    /// One square prediction unit covering the whole CU.
    Size2Nx2N,
    /// Two horizontal halves.
    Size2NxN,
    /// Two vertical halves.
    SizeNx2N,
    /// Four quadrants; only admitted at the deepest CU size.
    SizeNxN,
    /// Asymmetric horizontal split, upper quarter.
    Size2NxnU,
    /// Asymmetric horizontal split, lower quarter.
    Size2NxnD,
    /// Asymmetric vertical split, left quarter.
    SizenLx2N,
    /// Asymmetric vertical split, right quarter.
    SizenRx2N,
}

impl PartSize {
    /// Whether this is one of the four asymmetric motion partitions.
    pub fn is_amp(self) -> bool {
        matches!(
            self,
            PartSize::Size2NxnU | PartSize::Size2NxnD | PartSize::SizenLx2N | PartSize::SizenRx2N
        )
    }

    /// Whether this shape splits the CU horizontally (full or asymmetric).
    pub fn is_horizontal(self) -> bool {
        matches!(
            self,
            PartSize::Size2NxN | PartSize::Size2NxnU | PartSize::Size2NxnD
        )
    }

    /// Whether this shape splits the CU vertically (full or asymmetric).
    pub fn is_vertical(self) -> bool {
        matches!(
            self,
            PartSize::SizeNx2N | PartSize::SizenLx2N | PartSize::SizenRx2N
        )
    }
}
