//! Adaptation orchestration
//!
//! The engine owns one page view: it runs detections through the scorer and
//! selector, sequences accepted swaps through an Idle → Transitioning → Idle
//! state machine, keeps the public content map current, and notifies host
//! listeners.
//!
//! Calls are serialized by `&mut self`; hosts feeding the engine from several
//! tasks wrap it in a `Mutex`. A detection accepted while a transition window
//! is open is queued in a single pending slot (newer replaces older) and
//! applied when the window closes.

use chrono::Utc;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::EngineOptions;
use crate::error::EngineError;
use crate::events::{EngineEvent, EventBus, ListenerId};
use crate::scoring::{match_persona, CompiledPersona};
use crate::selection::{
    changed_sections, section_content, section_visible, select_content, SelectionContext,
};
use crate::signals::extract_signals;
use crate::types::{
    ContentSelectionResult, Persona, PersonaMatch, RuntimeSection, RuntimeState, SectionContent,
    SelectionReason, TransitionState, UserBehavior, DEFAULT_VARIANT,
};

/// Everything needed to construct an engine for one page view.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct EngineDescriptor {
    #[serde(default)]
    pub page_id: String,
    #[serde(default)]
    pub website_id: String,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub visitor_id: String,
    pub sections: Vec<RuntimeSection>,
    #[serde(default)]
    pub personas: Vec<Persona>,
    #[serde(default)]
    pub options: EngineOptions,
}

impl EngineDescriptor {
    /// Parse a descriptor from host-supplied JSON.
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        serde_json::from_str(json)
            .map_err(|e| EngineError::ParseError(format!("Failed to parse descriptor: {}", e)))
    }
}

/// Outcome of feeding one behavior snapshot to the engine.
#[derive(Debug)]
pub enum DetectionOutcome {
    /// The selection ran; the result says whether content swapped
    Applied(ContentSelectionResult),
    /// A transition window is open; any match was queued (latest wins)
    Deferred,
}

impl DetectionOutcome {
    /// The selection result, when the detection was applied.
    pub fn applied(self) -> Option<ContentSelectionResult> {
        match self {
            DetectionOutcome::Applied(result) => Some(result),
            DetectionOutcome::Deferred => None,
        }
    }
}

/// Persona-adaptive content engine for a single page view.
///
/// Constructed with an immutable section list and a compiled persona set;
/// discarded when the page view ends. No state survives the instance.
pub struct AdaptationEngine {
    sections: Vec<RuntimeSection>,
    personas: Vec<CompiledPersona>,
    options: EngineOptions,
    state: RuntimeState,
    transition: TransitionState,
    transition_started: Option<Instant>,
    /// Confidence recorded when the active variant was accepted
    last_confidence: f64,
    /// Detection queued while a transition window was open (latest wins)
    pending: Option<PersonaMatch>,
    bus: EventBus,
    /// Resolved content per section for the active variant
    content: HashMap<String, SectionContent>,
}

impl AdaptationEngine {
    pub fn new(descriptor: EngineDescriptor) -> Self {
        let personas: Vec<CompiledPersona> = descriptor
            .personas
            .iter()
            .map(CompiledPersona::compile)
            .collect();

        let state = RuntimeState {
            engine_id: Uuid::new_v4().to_string(),
            page_id: descriptor.page_id,
            website_id: descriptor.website_id,
            session_id: descriptor.session_id,
            visitor_id: descriptor.visitor_id,
            active_variant: DEFAULT_VARIANT.to_string(),
            current_persona: None,
            previous_persona: None,
            is_transitioning: false,
            last_adaptation_at: None,
            error: None,
        };

        info!(
            engine_id = %state.engine_id,
            sections = descriptor.sections.len(),
            personas = personas.len(),
            "engine created"
        );

        let mut engine = Self {
            sections: descriptor.sections,
            personas,
            options: descriptor.options,
            state,
            transition: TransitionState::default(),
            transition_started: None,
            last_confidence: 0.0,
            pending: None,
            bus: EventBus::new(),
            content: HashMap::new(),
        };
        engine.rebuild_content_map();
        engine
    }

    /// Score a behavior snapshot and apply the selection policy.
    ///
    /// When a transition window is open, the match (if any) is queued instead
    /// and applied on window close; a newer deferred match replaces an older
    /// one.
    pub fn process_detection(&mut self, behavior: &UserBehavior) -> DetectionOutcome {
        self.poll_transition();

        let signals = extract_signals(behavior);
        let persona_match =
            match_persona(&self.personas, &signals, behavior, &self.options.scoring);

        if self.transition.is_active {
            if persona_match.is_some() {
                self.pending = persona_match;
            }
            return DetectionOutcome::Deferred;
        }

        DetectionOutcome::Applied(self.apply_match(persona_match))
    }

    /// Manually override the active variant, bypassing the confidence and
    /// hysteresis policy. Runs through the same transition lifecycle.
    ///
    /// Forcing the already-active variant is a no-op.
    pub fn force_variant(&mut self, variant_id: &str) -> ContentSelectionResult {
        // An open window yields to the override
        self.complete_transition();
        self.pending = None;

        let previous = self.state.active_variant.clone();
        let result = ContentSelectionResult {
            variant_id: variant_id.to_string(),
            was_swapped: variant_id != previous,
            previous_variant: Some(previous.clone()),
            reason: SelectionReason::ManualOverride,
            confidence: 1.0,
            changed_sections: changed_sections(&self.sections, &previous, variant_id),
        };

        if result.was_swapped {
            self.last_confidence = 1.0;
            self.begin_swap(&result);
        }
        result
    }

    /// Close the transition window if its duration has elapsed.
    ///
    /// Returns true when a window was closed. Any queued detection is applied
    /// immediately after.
    pub fn poll_transition(&mut self) -> bool {
        if !self.transition.is_active {
            return false;
        }
        let elapsed = self
            .transition_started
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(u64::MAX);
        if elapsed >= self.transition.duration_ms {
            self.complete_transition();
            true
        } else {
            false
        }
    }

    /// Block for the remainder of the transition window, then close it.
    ///
    /// No-op when idle; returns immediately when animations are disabled
    /// (the window then has zero duration and never stays open).
    pub fn wait_for_transition(&mut self) {
        if !self.transition.is_active {
            return;
        }
        let elapsed = self
            .transition_started
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0);
        if elapsed < self.transition.duration_ms {
            std::thread::sleep(Duration::from_millis(self.transition.duration_ms - elapsed));
        }
        self.complete_transition();
    }

    /// Close the transition window unconditionally (e.g. the renderer
    /// finished its animation early), emitting `content_swap_complete` and
    /// applying any queued detection.
    pub fn complete_transition(&mut self) {
        if !self.transition.is_active {
            return;
        }
        let elapsed_ms = self
            .transition_started
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0);
        let sections = std::mem::take(&mut self.transition.transitioning_sections);

        self.transition = TransitionState::default();
        self.transition_started = None;
        self.state.is_transitioning = false;

        info!(
            variant = %self.state.active_variant,
            elapsed_ms,
            "content swap complete"
        );
        self.bus.emit(&EngineEvent::ContentSwapComplete {
            engine_id: self.state.engine_id.clone(),
            variant_id: self.state.active_variant.clone(),
            sections,
            duration_ms: elapsed_ms,
            timestamp: Utc::now(),
        });

        if let Some(pending) = self.pending.take() {
            self.apply_match(Some(pending));
        }
    }

    fn apply_match(&mut self, persona_match: Option<PersonaMatch>) -> ContentSelectionResult {
        let ctx = SelectionContext {
            previous_variant: self.state.active_variant.clone(),
            last_confidence: self.last_confidence,
        };
        let result = select_content(
            &self.sections,
            persona_match.as_ref(),
            &ctx,
            &self.options.selection,
        );

        if result.was_swapped {
            self.last_confidence = result.confidence;
            self.begin_swap(&result);
        } else if let Some(m) = &persona_match {
            // Same persona reconfirmed with more evidence: raise the bar
            // future challengers must clear
            if m.persona_id == result.variant_id && m.confidence > self.last_confidence {
                self.last_confidence = m.confidence;
            }
        }
        result
    }

    /// Enter Transitioning: record the window, notify listeners, and swap
    /// the public content map. Content is swapped before the window closes;
    /// the window exists only for the renderer to animate.
    fn begin_swap(&mut self, result: &ContentSelectionResult) {
        let now = Utc::now();
        let from = self.state.active_variant.clone();
        let to = result.variant_id.clone();

        self.state.previous_persona = self.state.current_persona.take();
        if to != DEFAULT_VARIANT {
            self.state.current_persona = Some(to.clone());
        }
        self.state.active_variant = to.clone();
        self.state.last_adaptation_at = Some(now);

        let duration_ms = self.options.animation.effective_duration_ms();
        self.transition = TransitionState {
            is_active: true,
            transitioning_sections: result.changed_sections.clone(),
            started_at: Some(now),
            duration_ms,
        };
        self.transition_started = Some(Instant::now());
        self.state.is_transitioning = true;

        info!(
            from = %from,
            to = %to,
            reason = result.reason.as_str(),
            confidence = result.confidence,
            sections = result.changed_sections.len(),
            "content swap accepted"
        );
        self.bus.emit(&EngineEvent::ContentAdaptation {
            engine_id: self.state.engine_id.clone(),
            from_variant: from,
            to_variant: to,
            sections: result.changed_sections.clone(),
            confidence: result.confidence,
            reason: result.reason,
            timestamp: now,
        });

        self.rebuild_content_map();

        if duration_ms == 0 {
            self.complete_transition();
        }
    }

    fn rebuild_content_map(&mut self) {
        let variant = self.state.active_variant.clone();
        self.content = self
            .sections
            .iter()
            .map(|s| (s.section_id.clone(), section_content(s, &variant).clone()))
            .collect();
    }

    // ---- pull API ----

    /// Resolved content per section for the active variant.
    pub fn content_map(&self) -> &HashMap<String, SectionContent> {
        &self.content
    }

    /// Resolved content for one section, `None` when the id is unknown.
    pub fn section_content(&self, section_id: &str) -> Option<&SectionContent> {
        self.content.get(section_id)
    }

    pub fn state(&self) -> &RuntimeState {
        &self.state
    }

    pub fn transition_state(&self) -> &TransitionState {
        &self.transition
    }

    pub fn active_variant(&self) -> &str {
        &self.state.active_variant
    }

    /// Whether a section is visible under the active variant. Unknown
    /// section ids are not visible.
    pub fn is_section_visible(&self, section_id: &str) -> bool {
        self.sections
            .iter()
            .find(|s| s.section_id == section_id)
            .map(|s| section_visible(s, &self.state.active_variant))
            .unwrap_or(false)
    }

    // ---- push API ----

    /// Subscribe to engine events. Returns an id for
    /// [`AdaptationEngine::remove_event_listener`].
    pub fn add_event_listener<F>(&mut self, listener: F) -> ListenerId
    where
        F: Fn(&EngineEvent) + Send + 'static,
    {
        self.bus.subscribe(listener)
    }

    pub fn remove_event_listener(&mut self, id: ListenerId) -> bool {
        self.bus.unsubscribe(id)
    }

    // ---- host error surface ----

    /// Record a host-level error for UI display. Does not halt detection.
    pub fn set_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!(engine_id = %self.state.engine_id, error = %message, "host error recorded");
        self.state.error = Some(message);
    }

    pub fn clear_error(&mut self) {
        self.state.error = None;
    }
}

impl std::fmt::Debug for AdaptationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptationEngine")
            .field("engine_id", &self.state.engine_id)
            .field("active_variant", &self.state.active_variant)
            .field("is_transitioning", &self.state.is_transitioning)
            .field("personas", &self.personas.len())
            .field("sections", &self.sections.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AnimationConfig, EngineOptions};
    use crate::types::{ClickEvent, DetectionRule, RuleType, SectionVisibility};
    use pretty_assertions::assert_eq;
    use std::sync::{Arc, Mutex};

    fn persona(id: &str, keyword: &str, confidence_score: f64) -> Persona {
        Persona {
            id: id.to_string(),
            name: id.to_string(),
            detection_rules: vec![DetectionRule {
                id: format!("{}-r1", id),
                rule_type: RuleType::ClickPattern,
                condition: keyword.to_string(),
                value: None,
                weight: 0.8,
            }],
            confidence_score,
            is_active: true,
        }
    }

    fn section(id: &str, variants: &[(&str, &str)]) -> RuntimeSection {
        RuntimeSection {
            section_id: id.to_string(),
            default_content: SectionContent {
                headline: Some(format!("{} default", id)),
                ..Default::default()
            },
            persona_variants: variants
                .iter()
                .map(|(p, h)| {
                    (
                        p.to_string(),
                        SectionContent {
                            headline: Some(h.to_string()),
                            ..Default::default()
                        },
                    )
                })
                .collect(),
            visibility: None,
        }
    }

    fn clicks_on(section_id: &str, n: usize) -> UserBehavior {
        UserBehavior {
            clicks: (0..n)
                .map(|_| ClickEvent {
                    section_id: Some(section_id.to_string()),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    fn descriptor(animations: bool) -> EngineDescriptor {
        EngineDescriptor {
            page_id: "page-1".to_string(),
            website_id: "site-1".to_string(),
            session_id: "sess-1".to_string(),
            visitor_id: "vis-1".to_string(),
            sections: vec![
                section("hero", &[("exec", "Cut costs 40%"), ("dev", "Ship faster")]),
                section("cta", &[("exec", "Talk to sales")]),
            ],
            personas: vec![persona("exec", "pricing", 0.7), persona("dev", "docs", 1.0)],
            options: EngineOptions {
                animation: AnimationConfig {
                    enabled: animations,
                    ..Default::default()
                },
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_initial_state_is_default_idle() {
        let engine = AdaptationEngine::new(descriptor(false));

        assert_eq!(engine.active_variant(), "default");
        assert!(!engine.state().is_transitioning);
        assert!(engine.state().current_persona.is_none());
        assert_eq!(
            engine.section_content("hero").unwrap().headline.as_deref(),
            Some("hero default")
        );
    }

    #[test]
    fn test_detection_swaps_content_and_state() {
        let mut engine = AdaptationEngine::new(descriptor(false));

        let result = engine
            .process_detection(&clicks_on("pricing-table", 4))
            .applied()
            .unwrap();

        assert!(result.was_swapped);
        assert_eq!(result.variant_id, "exec");
        assert_eq!(result.reason, SelectionReason::PersonaDetected);
        assert_eq!(engine.active_variant(), "exec");
        assert_eq!(engine.state().current_persona.as_deref(), Some("exec"));
        assert!(engine.state().last_adaptation_at.is_some());
        // Animations disabled: the window opens and closes synchronously
        assert!(!engine.state().is_transitioning);
        assert_eq!(
            engine.section_content("hero").unwrap().headline.as_deref(),
            Some("Cut costs 40%")
        );
    }

    #[test]
    fn test_event_ordering_adaptation_then_complete() {
        let mut engine = AdaptationEngine::new(descriptor(false));
        let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

        let log_clone = Arc::clone(&log);
        engine.add_event_listener(move |event| {
            let name = match event {
                EngineEvent::ContentAdaptation { to_variant, .. } => {
                    format!("adaptation:{}", to_variant)
                }
                EngineEvent::ContentSwapComplete { variant_id, .. } => {
                    format!("complete:{}", variant_id)
                }
            };
            log_clone.lock().unwrap().push(name);
        });

        engine.process_detection(&clicks_on("pricing-table", 4));

        let log = log.lock().unwrap();
        assert_eq!(
            *log,
            vec!["adaptation:exec".to_string(), "complete:exec".to_string()]
        );
    }

    #[test]
    fn test_no_match_keeps_default_silently() {
        let mut engine = AdaptationEngine::new(descriptor(false));
        let result = engine
            .process_detection(&UserBehavior::default())
            .applied()
            .unwrap();

        assert!(!result.was_swapped);
        assert_eq!(result.reason, SelectionReason::InitialLoad);
        assert_eq!(engine.active_variant(), "default");
    }

    #[test]
    fn test_force_variant_always_swaps() {
        let mut engine = AdaptationEngine::new(descriptor(false));

        let result = engine.force_variant("exec");
        assert!(result.was_swapped);
        assert_eq!(result.reason, SelectionReason::ManualOverride);
        assert_eq!(result.confidence, 1.0);
        assert_eq!(engine.active_variant(), "exec");

        // Forcing the active variant is a no-op
        let again = engine.force_variant("exec");
        assert!(!again.was_swapped);
        assert_eq!(again.reason, SelectionReason::ManualOverride);
    }

    #[test]
    fn test_queue_and_coalesce_latest_within_window() {
        let mut desc = descriptor(true);
        desc.options.animation.transition_duration_ms = 60_000;
        let mut engine = AdaptationEngine::new(desc);

        // First detection opens a long window
        let first = engine.process_detection(&clicks_on("pricing-table", 4));
        assert!(matches!(first, DetectionOutcome::Applied(_)));
        assert!(engine.state().is_transitioning);
        assert_eq!(engine.active_variant(), "exec");

        // Second detection lands inside the window and is deferred
        let second = engine.process_detection(&clicks_on("docs-quickstart", 4));
        assert!(matches!(second, DetectionOutcome::Deferred));
        assert_eq!(engine.active_variant(), "exec");

        // Closing the window applies the queued match; dev at 1.0 clears
        // exec's 0.7 + hysteresis
        engine.complete_transition();
        assert_eq!(engine.active_variant(), "dev");
        assert_eq!(engine.state().previous_persona.as_deref(), Some("exec"));

        engine.complete_transition();
        assert!(!engine.state().is_transitioning);
    }

    #[test]
    fn test_hysteresis_via_engine() {
        let mut desc = descriptor(false);
        // dev prior lowered so its score lands inside exec's hysteresis band
        desc.personas[1].confidence_score = 0.72;
        let mut engine = AdaptationEngine::new(desc);

        engine.process_detection(&clicks_on("pricing-table", 4)); // exec at 0.7

        let result = engine
            .process_detection(&clicks_on("docs-quickstart", 2)) // dev at 0.72
            .applied()
            .unwrap();

        assert!(!result.was_swapped);
        assert_eq!(result.reason, SelectionReason::ConfidenceIncreased);
        assert_eq!(engine.active_variant(), "exec");
    }

    #[test]
    fn test_visibility_follows_active_variant() {
        let mut desc = descriptor(false);
        desc.sections.push(RuntimeSection {
            section_id: "dev-banner".to_string(),
            default_content: SectionContent::default(),
            persona_variants: HashMap::new(),
            visibility: Some(SectionVisibility {
                hide_for_personas: vec![],
                show_only_for_personas: vec!["dev".to_string()],
            }),
        });
        let mut engine = AdaptationEngine::new(desc);

        assert!(!engine.is_section_visible("dev-banner"));
        assert!(engine.is_section_visible("hero"));
        assert!(!engine.is_section_visible("no-such-section"));

        engine.force_variant("dev");
        assert!(engine.is_section_visible("dev-banner"));
    }

    #[test]
    fn test_host_error_does_not_gate_detection() {
        let mut engine = AdaptationEngine::new(descriptor(false));

        engine.set_error("tracking session failed to initialize");
        assert!(engine.state().error.is_some());

        let result = engine
            .process_detection(&clicks_on("pricing-table", 4))
            .applied()
            .unwrap();
        assert!(result.was_swapped);

        engine.clear_error();
        assert!(engine.state().error.is_none());
    }

    #[test]
    fn test_remove_event_listener() {
        let mut engine = AdaptationEngine::new(descriptor(false));
        let seen = Arc::new(Mutex::new(0usize));

        let seen_clone = Arc::clone(&seen);
        let id = engine.add_event_listener(move |_| {
            *seen_clone.lock().unwrap() += 1;
        });

        assert!(engine.remove_event_listener(id));
        engine.process_detection(&clicks_on("pricing-table", 4));
        assert_eq!(*seen.lock().unwrap(), 0);
    }

    #[test]
    fn test_wait_for_transition_closes_window() {
        let mut desc = descriptor(true);
        desc.options.animation.transition_duration_ms = 10;
        let mut engine = AdaptationEngine::new(desc);

        engine.process_detection(&clicks_on("pricing-table", 4));
        assert!(engine.state().is_transitioning);

        engine.wait_for_transition();
        assert!(!engine.state().is_transitioning);
        assert!(!engine.transition_state().is_active);
    }

    #[test]
    fn test_descriptor_from_json() {
        let json = r#"{
            "page_id": "p1",
            "sections": [
                { "section_id": "hero", "default_content": { "headline": "Hi" } }
            ],
            "personas": [],
            "options": {}
        }"#;

        let descriptor = EngineDescriptor::from_json(json).unwrap();
        let engine = AdaptationEngine::new(descriptor);
        assert_eq!(engine.state().page_id, "p1");
        assert_eq!(engine.content_map().len(), 1);
    }
}
