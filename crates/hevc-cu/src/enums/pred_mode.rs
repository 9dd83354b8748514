/// Prediction mode of a coding unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredMode {
    /// Motion-compensated prediction from reference pictures.
    Inter,
    /// Spatial prediction from reconstructed neighbors.
    Intra,
}
