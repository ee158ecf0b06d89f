//! Core types for the persona engine
//!
//! This module defines the data structures that flow through each stage of the
//! engine: the raw behavior snapshot, extracted behavior signals, persona
//! definitions, match results, runtime sections, selection results, and the
//! externally observable engine state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::EngineError;

/// Variant id used when no persona-specific content is active.
pub const DEFAULT_VARIANT: &str = "default";

/// Detection rule / behavior signal taxonomy.
///
/// Rules and signals share one type space: a rule of a given type only ever
/// evaluates signals of the same type (except `DeviceType` and
/// `ContentInteraction`, which read the aggregate snapshot directly).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    ClickPattern,
    ScrollBehavior,
    TimeOnPage,
    Referrer,
    UtmParameter,
    ContentInteraction,
    FormField,
    PageSequence,
    DeviceType,
    SearchQuery,
}

impl RuleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleType::ClickPattern => "click_pattern",
            RuleType::ScrollBehavior => "scroll_behavior",
            RuleType::TimeOnPage => "time_on_page",
            RuleType::Referrer => "referrer",
            RuleType::UtmParameter => "utm_parameter",
            RuleType::ContentInteraction => "content_interaction",
            RuleType::FormField => "form_field",
            RuleType::PageSequence => "page_sequence",
            RuleType::DeviceType => "device_type",
            RuleType::SearchQuery => "search_query",
        }
    }
}

/// Visitor device class, derived by the host from the user agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    #[default]
    Desktop,
    Mobile,
    Tablet,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Desktop => "desktop",
            DeviceType::Mobile => "mobile",
            DeviceType::Tablet => "tablet",
        }
    }
}

/// A single click recorded by the host's tracking hook.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClickEvent {
    /// Section the click landed in, when the host could attribute it
    #[serde(default)]
    pub section_id: Option<String>,
    /// Element identifier or label
    #[serde(default)]
    pub element: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// A scroll-depth record (one per scroll burst or page segment).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScrollRecord {
    /// Maximum depth reached, percent of page height (0-100)
    #[serde(default)]
    pub max_depth: f64,
    /// Time spent scrolling to that depth, seconds
    #[serde(default)]
    pub duration_sec: f64,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Time spent with a section in the viewport.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DwellRecord {
    pub section_id: String,
    /// Dwell time in seconds
    #[serde(default)]
    pub seconds: f64,
}

/// UTM parameters captured from the landing URL.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UtmParameters {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub medium: Option<String>,
    #[serde(default)]
    pub campaign: Option<String>,
    #[serde(default)]
    pub term: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

/// A form interaction (focus, input, or submit on a form field).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormInteraction {
    /// Field name or form identifier
    #[serde(default)]
    pub field: String,
    /// Whether the surrounding form was completed/submitted
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// In-memory behavior snapshot for one visitor session.
///
/// Supplied by the host's tracking hook. Every field defaults so partial
/// snapshots parse; missing telemetry degrades to empty lists, never to an
/// error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserBehavior {
    #[serde(default)]
    pub clicks: Vec<ClickEvent>,
    #[serde(default)]
    pub scrolls: Vec<ScrollRecord>,
    #[serde(default)]
    pub section_dwell: Vec<DwellRecord>,
    #[serde(default)]
    pub referrer: Option<String>,
    #[serde(default)]
    pub utm: Option<UtmParameters>,
    #[serde(default)]
    pub form_interactions: Vec<FormInteraction>,
    /// Pages visited this session, in order
    #[serde(default)]
    pub navigation_path: Vec<String>,
    #[serde(default)]
    pub device_type: DeviceType,
    #[serde(default)]
    pub search_queries: Vec<String>,
    /// Sections the visitor engaged with (hover, expand, media play)
    #[serde(default)]
    pub interacted_sections: Vec<String>,
}

/// Typed payload carried by a behavior signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignalValue {
    Click {
        section_id: Option<String>,
        element: Option<String>,
    },
    Scroll {
        max_depth: f64,
        duration_sec: f64,
    },
    Dwell {
        section_id: String,
        seconds: f64,
    },
    Referrer {
        url: String,
    },
    Utm {
        source: Option<String>,
        medium: Option<String>,
        campaign: Option<String>,
    },
    Form {
        field: String,
        completed: bool,
    },
    Path {
        pages: Vec<String>,
    },
    Device {
        device: DeviceType,
    },
    Search {
        query: String,
    },
}

/// A typed, weighted observation derived from the behavior snapshot.
///
/// Ephemeral: produced fresh on every scoring pass and never persisted.
/// The intrinsic `weight` reflects how reliable the signal class is and is
/// independent of any rule weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorSignal {
    pub signal_type: RuleType,
    pub value: SignalValue,
    pub timestamp: DateTime<Utc>,
    pub weight: f64,
}

/// A weighted detection condition owned by a persona.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionRule {
    pub id: String,
    #[serde(rename = "type")]
    pub rule_type: RuleType,
    /// Free-text keyword expression, interpreted per rule type
    #[serde(default)]
    pub condition: String,
    /// Optional threshold or keyword override
    #[serde(default)]
    pub value: Option<String>,
    /// Rule weight in [0, 1]; negative input is clamped at compile time
    #[serde(default = "default_rule_weight")]
    pub weight: f64,
}

fn default_rule_weight() -> f64 {
    1.0
}

/// A visitor archetype with detection rules, owned by the surrounding
/// product and read-only to this engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Persona {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub detection_rules: Vec<DetectionRule>,
    /// Prior/trust multiplier in [0, 1]
    #[serde(default = "default_confidence_score")]
    pub confidence_score: f64,
    #[serde(default = "default_is_active")]
    pub is_active: bool,
}

fn default_confidence_score() -> f64 {
    1.0
}

fn default_is_active() -> bool {
    true
}

/// A rule that matched during scoring, with its evidence contribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedRule {
    pub rule_id: String,
    pub rule_type: RuleType,
    /// The rule's weight (rules match boolean; there is no partial credit)
    pub contribution: f64,
}

/// A runner-up persona in a scoring pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlternativeMatch {
    pub persona_id: String,
    pub confidence: f64,
}

/// Best-match result of one scoring pass over all active personas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaMatch {
    pub persona_id: String,
    /// Normalized confidence in [0, 1]
    pub confidence: f64,
    pub matched_rules: Vec<MatchedRule>,
    /// Signals that contributed evidence to the matched rules
    pub signals: Vec<BehaviorSignal>,
    pub alternative_matches: Vec<AlternativeMatch>,
}

/// Content for one section under one variant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SectionContent {
    #[serde(default)]
    pub headline: Option<String>,
    #[serde(default)]
    pub subheadline: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub cta_text: Option<String>,
    #[serde(default)]
    pub features: Vec<String>,
    /// Component-specific fields preserved verbatim for the renderer
    #[serde(default)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Per-persona visibility rule for a section.
///
/// The hide list wins over the show-only list; a non-empty show-only list
/// hides every variant not in it, including `default` unless listed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SectionVisibility {
    #[serde(default)]
    pub hide_for_personas: Vec<String>,
    #[serde(default)]
    pub show_only_for_personas: Vec<String>,
}

/// A page section with its default content and persona variants.
///
/// Immutable for the life of an engine instance. A section with no variant
/// for the active persona falls back to `default_content`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeSection {
    pub section_id: String,
    pub default_content: SectionContent,
    #[serde(default)]
    pub persona_variants: HashMap<String, SectionContent>,
    #[serde(default)]
    pub visibility: Option<SectionVisibility>,
}

/// Why the selector chose a variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionReason {
    InitialLoad,
    PersonaDetected,
    PersonaChanged,
    ConfidenceIncreased,
    FallbackUsed,
    NoVariantAvailable,
    ManualOverride,
}

impl SelectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionReason::InitialLoad => "initial_load",
            SelectionReason::PersonaDetected => "persona_detected",
            SelectionReason::PersonaChanged => "persona_changed",
            SelectionReason::ConfidenceIncreased => "confidence_increased",
            SelectionReason::FallbackUsed => "fallback_used",
            SelectionReason::NoVariantAvailable => "no_variant_available",
            SelectionReason::ManualOverride => "manual_override",
        }
    }
}

/// Outcome of one content selection pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentSelectionResult {
    /// `"default"` or a persona id
    pub variant_id: String,
    pub was_swapped: bool,
    pub previous_variant: Option<String>,
    pub reason: SelectionReason,
    pub confidence: f64,
    /// Sections whose resolved content actually differs between variants
    pub changed_sections: Vec<String>,
}

/// Snapshot of an in-flight content swap.
///
/// Exists only while a swap is in flight; reset to inactive on completion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransitionState {
    pub is_active: bool,
    pub transitioning_sections: Vec<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub duration_ms: u64,
}

/// Externally observable engine state for one page view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeState {
    /// Unique id for this engine instance (one per page view)
    pub engine_id: String,
    pub page_id: String,
    pub website_id: String,
    pub session_id: String,
    pub visitor_id: String,
    pub active_variant: String,
    pub current_persona: Option<String>,
    pub previous_persona: Option<String>,
    pub is_transitioning: bool,
    pub last_adaptation_at: Option<DateTime<Utc>>,
    /// Host-level error surfaced for UI display; never gates detection
    pub error: Option<String>,
}

/// Parse a persona list from host-supplied JSON.
pub fn parse_personas(json: &str) -> Result<Vec<Persona>, EngineError> {
    serde_json::from_str(json)
        .map_err(|e| EngineError::ParseError(format!("Failed to parse persona list: {}", e)))
}

/// Parse a behavior snapshot from host-supplied JSON.
pub fn parse_behavior(json: &str) -> Result<UserBehavior, EngineError> {
    serde_json::from_str(json)
        .map_err(|e| EngineError::ParseError(format!("Failed to parse behavior snapshot: {}", e)))
}

/// Parse a runtime section list from host-supplied JSON.
pub fn parse_sections(json: &str) -> Result<Vec<RuntimeSection>, EngineError> {
    serde_json::from_str(json)
        .map_err(|e| EngineError::ParseError(format!("Failed to parse section list: {}", e)))
}
