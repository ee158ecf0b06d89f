//! Persona Engine - Deterministic persona detection and content adaptation
//!
//! The engine turns raw visitor behavior into adapted page content through a
//! deterministic pipeline: signal extraction → rule evaluation → persona
//! scoring → content variant selection → transition orchestration.
//!
//! ## Modules
//!
//! - **Signals**: Extract weighted behavior signals from a raw behavior snapshot
//! - **Conditions**: Rule condition DSL, parsed once at persona load
//! - **Scoring**: Evaluate personas against signals and rank matches
//! - **Selection**: Confidence/hysteresis policy mapping a match to a variant
//! - **Engine**: Per-page-view orchestrator with a transition state machine

pub mod condition;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod scoring;
pub mod selection;
pub mod signals;
pub mod types;

pub use config::{AnimationConfig, EngineOptions, ScoringOptions, SelectionOptions, SwapAnimation};
pub use engine::{AdaptationEngine, DetectionOutcome, EngineDescriptor};
pub use error::EngineError;
pub use events::{EngineEvent, EventBus, ListenerId};
pub use scoring::{lint_personas, match_persona, CompiledPersona, RuleWarning};
pub use selection::{select_content, SelectionContext};
pub use signals::extract_signals;

// Core data model exports
pub use types::{
    parse_behavior, parse_personas, parse_sections, ContentSelectionResult, Persona, PersonaMatch,
    RuntimeSection, RuntimeState, SectionContent, SelectionReason, TransitionState, UserBehavior,
    DEFAULT_VARIANT,
};

/// Engine version embedded in event payloads and CLI reports
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for event payloads and CLI reports
pub const PRODUCER_NAME: &str = "persona-engine";
