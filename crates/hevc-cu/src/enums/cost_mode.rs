/// How rate-distortion costs are combined and compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CostMode {
    /// `cost = lambda * bits + distortion` everywhere.
    #[default]
    Standard,
    /// Lossless CUs compete against lossy ones; cost penalties applied to
    /// split decisions are expressed in bits (scaled by `1/lambda`) instead
    /// of distortion units.
    MixedLosslessLossyCoding,
}
