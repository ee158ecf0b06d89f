//! Content variant selection
//!
//! Given a persona match (or none) and the previously active variant, applies
//! the confidence-threshold + hysteresis policy and resolves per-section
//! content. Pure policy over in-memory data: selection never errors and
//! always resolves to displayable content.

use crate::config::SelectionOptions;
use crate::types::{
    ContentSelectionResult, PersonaMatch, RuntimeSection, SectionContent, SelectionReason,
    DEFAULT_VARIANT,
};

/// What the selector knows about the engine's current position.
#[derive(Debug, Clone)]
pub struct SelectionContext {
    /// Variant currently shown
    pub previous_variant: String,
    /// Confidence recorded when the current variant was accepted
    pub last_confidence: f64,
}

impl Default for SelectionContext {
    fn default() -> Self {
        Self {
            previous_variant: DEFAULT_VARIANT.to_string(),
            last_confidence: 0.0,
        }
    }
}

/// Decide which variant to show.
///
/// Policy, in order:
/// 1. no match → stay on default, or fall back if already off-default
/// 2. sub-threshold confidence → fallback variant (or keep previous when
///    fallback is disabled)
/// 3. no section defines content for the matched persona → default
/// 4. hysteresis guard: keep an already-active non-default variant unless the
///    new confidence beats the last accepted confidence by the margin
/// 5. accept the matched persona
pub fn select_content(
    sections: &[RuntimeSection],
    persona_match: Option<&PersonaMatch>,
    ctx: &SelectionContext,
    options: &SelectionOptions,
) -> ContentSelectionResult {
    let previous = ctx.previous_variant.as_str();

    let (variant_id, reason, confidence) = match persona_match {
        None => {
            if previous == DEFAULT_VARIANT {
                (DEFAULT_VARIANT.to_string(), SelectionReason::InitialLoad, 0.0)
            } else {
                (
                    options.fallback_variant.clone(),
                    SelectionReason::FallbackUsed,
                    0.0,
                )
            }
        }
        Some(m) if m.confidence < options.confidence_threshold => {
            let variant = if options.use_fallback {
                options.fallback_variant.clone()
            } else {
                previous.to_string()
            };
            (variant, SelectionReason::FallbackUsed, m.confidence)
        }
        Some(m) if !any_variant_defined(sections, &m.persona_id) => (
            DEFAULT_VARIANT.to_string(),
            SelectionReason::NoVariantAvailable,
            m.confidence,
        ),
        Some(m)
            if previous != DEFAULT_VARIANT
                && previous != m.persona_id
                && m.confidence < ctx.last_confidence + options.confidence_hysteresis =>
        {
            // Not enough new evidence to justify flapping away
            (
                previous.to_string(),
                SelectionReason::ConfidenceIncreased,
                m.confidence,
            )
        }
        Some(m) => {
            let reason = if previous == m.persona_id {
                SelectionReason::InitialLoad
            } else if previous == DEFAULT_VARIANT {
                SelectionReason::PersonaDetected
            } else {
                SelectionReason::PersonaChanged
            };
            (m.persona_id.clone(), reason, m.confidence)
        }
    };

    let changed_sections = changed_sections(sections, previous, &variant_id);
    let was_swapped = variant_id != previous;

    ContentSelectionResult {
        variant_id,
        was_swapped,
        previous_variant: Some(previous.to_string()),
        reason,
        confidence,
        changed_sections,
    }
}

/// Resolve the content a section shows under a variant.
///
/// Falls back to `default_content` unconditionally when the section defines
/// no variant for the persona; never errors.
pub fn section_content<'a>(section: &'a RuntimeSection, variant_id: &str) -> &'a SectionContent {
    section
        .persona_variants
        .get(variant_id)
        .unwrap_or(&section.default_content)
}

/// Whether a section is visible under a variant.
///
/// The hide list wins; a non-empty show-only list hides every variant not in
/// it. Independent of content resolution.
pub fn section_visible(section: &RuntimeSection, variant_id: &str) -> bool {
    match &section.visibility {
        None => true,
        Some(v) => {
            if v.hide_for_personas.iter().any(|p| p == variant_id) {
                return false;
            }
            if !v.show_only_for_personas.is_empty() {
                return v.show_only_for_personas.iter().any(|p| p == variant_id);
            }
            true
        }
    }
}

/// Sections whose resolved content differs between two variants.
pub fn changed_sections(
    sections: &[RuntimeSection],
    from_variant: &str,
    to_variant: &str,
) -> Vec<String> {
    if from_variant == to_variant {
        return Vec::new();
    }
    sections
        .iter()
        .filter(|s| {
            content_differs(
                section_content(s, from_variant),
                section_content(s, to_variant),
            )
        })
        .map(|s| s.section_id.clone())
        .collect()
}

fn any_variant_defined(sections: &[RuntimeSection], persona_id: &str) -> bool {
    sections
        .iter()
        .any(|s| s.persona_variants.contains_key(persona_id))
}

/// Shallow-then-deep content diff: the headline fields first, then the
/// features list and component-specific extras by serialized equality.
fn content_differs(a: &SectionContent, b: &SectionContent) -> bool {
    if a.headline != b.headline
        || a.subheadline != b.subheadline
        || a.description != b.description
        || a.cta_text != b.cta_text
    {
        return true;
    }
    if serialized(&a.features) != serialized(&b.features) {
        return true;
    }
    serialized(&a.extra) != serialized(&b.extra)
}

fn serialized<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_default()
}
