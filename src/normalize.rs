use serde::{Deserialize, Serialize};

/// Maps a cosine distance in `[0, 2]` onto a relevance in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalizer {
    /// `1 - distance`. Anti-correlated text (distance past 1) scores 0.
    #[default]
    Cosine,
    /// `1 - distance / 2`, spreading the whole distance range over `[0, 1]`.
    HalfCosine,
}

impl Normalizer {
    pub fn normalize(self, distance: f32) -> f32 {
        if distance.is_nan() {
            return 0.0;
        }
        let relevance = match self {
            Normalizer::Cosine => 1.0 - distance,
            Normalizer::HalfCosine => 1.0 - distance / 2.0,
        };
        relevance.clamp(0.0, 1.0)
    }
}
