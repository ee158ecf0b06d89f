//! Host-supplied engine configuration
//!
//! Every knob is optional with a stated default, so hosts can pass an empty
//! JSON object and get the reference behavior.

use serde::{Deserialize, Serialize};

use crate::types::DEFAULT_VARIANT;

/// Options for the persona scorer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringOptions {
    /// Minimum confidence for a best match to be accepted
    pub min_confidence: f64,
    /// Cap on the alternative-match list
    pub max_alternatives: usize,
}

impl Default for ScoringOptions {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
            max_alternatives: 2,
        }
    }
}

/// Options for the content variant selector.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionOptions {
    /// Confidence below this uses the fallback variant
    pub confidence_threshold: f64,
    /// Minimum confidence improvement required before switching away from an
    /// already-active non-default persona
    pub confidence_hysteresis: f64,
    /// Whether sub-threshold matches fall back instead of keeping the
    /// previous variant
    pub use_fallback: bool,
    /// Variant used when falling back
    pub fallback_variant: String,
}

impl Default for SelectionOptions {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            confidence_hysteresis: 0.05,
            use_fallback: true,
            fallback_variant: DEFAULT_VARIANT.to_string(),
        }
    }
}

/// Animation style the renderer applies during a swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapAnimation {
    Crossfade,
    Slide,
    None,
}

/// Transition animation configuration.
///
/// The transition window exists only for the consuming renderer to animate;
/// content is swapped before the window opens, never gated on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationConfig {
    pub enabled: bool,
    pub transition_duration_ms: u64,
    pub swap_animation: SwapAnimation,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            transition_duration_ms: 300,
            swap_animation: SwapAnimation::Crossfade,
        }
    }
}

impl AnimationConfig {
    /// Effective transition window length. Zero when animations are disabled
    /// or the swap animation is `None`.
    pub fn effective_duration_ms(&self) -> u64 {
        if !self.enabled || self.swap_animation == SwapAnimation::None {
            0
        } else {
            self.transition_duration_ms
        }
    }
}

/// Full engine configuration bundle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    pub scoring: ScoringOptions,
    pub selection: SelectionOptions,
    pub animation: AnimationConfig,
}
