//! Rule evaluation and persona scoring
//!
//! Interprets each persona's detection rules against the extracted behavior
//! signals and aggregates rule contributions into a normalized confidence
//! score. Evaluation is pure: rules match or they do not, contributing
//! signal indices are returned instead of mutating signal state, and
//! malformed input is treated as a non-match, never an error.

use serde::Serialize;
use tracing::debug;

use crate::condition::Condition;
use crate::config::ScoringOptions;
use crate::types::{
    AlternativeMatch, BehaviorSignal, MatchedRule, Persona, PersonaMatch, RuleType, UserBehavior,
};

/// A detection rule with its condition parsed ahead of evaluation.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub id: String,
    pub rule_type: RuleType,
    /// Weight in [0, 1]; negative input clamps to zero
    pub weight: f64,
    pub condition: Condition,
}

/// A persona compiled for repeated scoring passes.
#[derive(Debug, Clone)]
pub struct CompiledPersona {
    pub id: String,
    pub name: String,
    /// Prior/trust multiplier, clamped to [0, 1]
    pub confidence_score: f64,
    pub is_active: bool,
    pub rules: Vec<CompiledRule>,
}

impl CompiledPersona {
    /// Compile a persona record: parse every rule condition once and clamp
    /// weights into range.
    pub fn compile(persona: &Persona) -> Self {
        let rules = persona
            .detection_rules
            .iter()
            .map(|rule| CompiledRule {
                id: rule.id.clone(),
                rule_type: rule.rule_type,
                weight: rule.weight.clamp(0.0, 1.0),
                condition: Condition::parse(
                    rule.rule_type,
                    &rule.condition,
                    rule.value.as_deref(),
                ),
            })
            .collect();

        Self {
            id: persona.id.clone(),
            name: persona.name.clone(),
            confidence_score: persona.confidence_score.clamp(0.0, 1.0),
            is_active: persona.is_active,
            rules,
        }
    }
}

/// Result of scoring one persona against one signal set.
#[derive(Debug, Clone)]
pub struct PersonaScore {
    pub persona_id: String,
    /// Normalized confidence in [0, 1]
    pub score: f64,
    pub matched_rules: Vec<MatchedRule>,
    /// Indices into the signal slice that contributed evidence
    pub contributing_signals: Vec<usize>,
}

/// Score a single persona.
///
/// Score = (Σ weight of matched rules) / (Σ weight of all rules), multiplied
/// by the persona's prior `confidence_score`. A persona with zero rules (or
/// zero total weight) scores 0.
pub fn score_persona(
    persona: &CompiledPersona,
    signals: &[BehaviorSignal],
    behavior: &UserBehavior,
) -> PersonaScore {
    let total_weight: f64 = persona.rules.iter().map(|r| r.weight).sum();

    let mut matched_rules = Vec::new();
    let mut matched_weight = 0.0;
    let mut contributing_signals: Vec<usize> = Vec::new();

    for rule in &persona.rules {
        let (matched, indices) = rule.condition.evaluate(signals, behavior);
        if matched {
            matched_weight += rule.weight;
            matched_rules.push(MatchedRule {
                rule_id: rule.id.clone(),
                rule_type: rule.rule_type,
                contribution: rule.weight,
            });
            contributing_signals.extend(indices);
        }
    }

    contributing_signals.sort_unstable();
    contributing_signals.dedup();

    let score = if total_weight > 0.0 {
        ((matched_weight / total_weight) * persona.confidence_score).clamp(0.0, 1.0)
    } else {
        0.0
    };

    debug!(
        persona_id = %persona.id,
        score,
        matched = matched_rules.len(),
        total = persona.rules.len(),
        "scored persona"
    );

    PersonaScore {
        persona_id: persona.id.clone(),
        score,
        matched_rules,
        contributing_signals,
    }
}

/// Rank all active personas and return the best match, if any clears the
/// confidence floor.
///
/// Alternatives are every other persona scoring at least
/// `min_confidence × 0.7`, capped to `max_alternatives`. Returns `None` when
/// no persona clears the floor or there are zero active personas.
pub fn match_persona(
    personas: &[CompiledPersona],
    signals: &[BehaviorSignal],
    behavior: &UserBehavior,
    options: &ScoringOptions,
) -> Option<PersonaMatch> {
    let mut scores: Vec<PersonaScore> = personas
        .iter()
        .filter(|p| p.is_active)
        .map(|p| score_persona(p, signals, behavior))
        .collect();

    if scores.is_empty() {
        return None;
    }

    scores.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let best = scores.remove(0);
    if best.score < options.min_confidence {
        return None;
    }

    let alternative_floor = options.min_confidence * 0.7;
    let alternative_matches: Vec<AlternativeMatch> = scores
        .iter()
        .filter(|s| s.score >= alternative_floor)
        .take(options.max_alternatives)
        .map(|s| AlternativeMatch {
            persona_id: s.persona_id.clone(),
            confidence: s.score,
        })
        .collect();

    let contributing = best
        .contributing_signals
        .iter()
        .filter_map(|&i| signals.get(i).cloned())
        .collect();

    Some(PersonaMatch {
        persona_id: best.persona_id,
        confidence: best.score,
        matched_rules: best.matched_rules,
        signals: contributing,
        alternative_matches,
    })
}

/// A non-fatal issue found while linting persona rule definitions.
#[derive(Debug, Clone, Serialize)]
pub struct RuleWarning {
    pub persona_id: String,
    pub rule_id: Option<String>,
    pub message: String,
}

/// Lint persona definitions for issues that silently weaken detection.
///
/// Warnings only; a persona that lints dirty still scores (malformed rules
/// degrade to non-matches at evaluation time).
pub fn lint_personas(personas: &[Persona]) -> Vec<RuleWarning> {
    let mut warnings = Vec::new();

    for persona in personas {
        if persona.detection_rules.is_empty() {
            warnings.push(RuleWarning {
                persona_id: persona.id.clone(),
                rule_id: None,
                message: "persona has no detection rules and will always score 0".to_string(),
            });
        }
        if persona.confidence_score <= 0.0 {
            warnings.push(RuleWarning {
                persona_id: persona.id.clone(),
                rule_id: None,
                message: "confidence_score is 0; persona can never clear the floor".to_string(),
            });
        }

        for rule in &persona.detection_rules {
            if rule.weight < 0.0 {
                warnings.push(RuleWarning {
                    persona_id: persona.id.clone(),
                    rule_id: Some(rule.id.clone()),
                    message: "negative weight will be clamped to 0".to_string(),
                });
            }
            if let Some(value) = &rule.value {
                let numeric_types = matches!(
                    rule.rule_type,
                    RuleType::TimeOnPage | RuleType::ScrollBehavior
                );
                if numeric_types && value.trim().parse::<f64>().is_err() {
                    warnings.push(RuleWarning {
                        persona_id: persona.id.clone(),
                        rule_id: Some(rule.id.clone()),
                        message: format!(
                            "value {:?} is not numeric; default threshold will be used",
                            value
                        ),
                    });
                }
            }
            if Condition::parse(rule.rule_type, &rule.condition, rule.value.as_deref())
                == Condition::Never
            {
                warnings.push(RuleWarning {
                    persona_id: persona.id.clone(),
                    rule_id: Some(rule.id.clone()),
                    message: "condition parses to a rule that can never match".to_string(),
                });
            }
        }
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::extract_signals;
    use crate::types::{ClickEvent, DetectionRule};

    fn persona_with_rules(id: &str, confidence_score: f64, rules: Vec<DetectionRule>) -> Persona {
        Persona {
            id: id.to_string(),
            name: id.to_string(),
            detection_rules: rules,
            confidence_score,
            is_active: true,
        }
    }

    fn click_rule(id: &str, condition: &str, weight: f64) -> DetectionRule {
        DetectionRule {
            id: id.to_string(),
            rule_type: RuleType::ClickPattern,
            condition: condition.to_string(),
            value: None,
            weight,
        }
    }

    fn pricing_clicks(n: usize) -> UserBehavior {
        UserBehavior {
            clicks: (0..n)
                .map(|i| ClickEvent {
                    section_id: Some(format!("pricing-row-{}", i)),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_zero_rules_scores_zero() {
        let persona = CompiledPersona::compile(&persona_with_rules("empty", 1.0, vec![]));
        let behavior = pricing_clicks(5);
        let signals = extract_signals(&behavior);

        let score = score_persona(&persona, &signals, &behavior);
        assert_eq!(score.score, 0.0);
        assert!(score.matched_rules.is_empty());
    }

    #[test]
    fn test_pricing_click_scenario() {
        // 4 pricing-related clicks against a single click_pattern rule with
        // weight 0.8: contribution 0.8, normalized score 0.8 (sole rule),
        // multiplied by the persona prior.
        let persona = CompiledPersona::compile(&persona_with_rules(
            "buyer",
            0.9,
            vec![click_rule("r1", "pricing", 0.8)],
        ));
        let behavior = pricing_clicks(4);
        let signals = extract_signals(&behavior);

        let score = score_persona(&persona, &signals, &behavior);
        assert_eq!(score.matched_rules.len(), 1);
        assert_eq!(score.matched_rules[0].contribution, 0.8);
        // Sole rule: matched/total = 0.8/0.8 = 1.0, times prior 0.9
        assert!((score.score - 0.9).abs() < 1e-9);
        assert_eq!(score.contributing_signals.len(), 4);
    }

    #[test]
    fn test_normalization_over_unmatched_rules() {
        let persona = CompiledPersona::compile(&persona_with_rules(
            "mixed",
            1.0,
            vec![
                click_rule("r1", "pricing", 0.8),
                click_rule("r2", "careers", 0.2),
            ],
        ));
        let behavior = pricing_clicks(2);
        let signals = extract_signals(&behavior);

        let score = score_persona(&persona, &signals, &behavior);
        // 0.8 matched out of 1.0 total weight
        assert!((score.score - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_negative_weight_clamped() {
        let persona = CompiledPersona::compile(&persona_with_rules(
            "clamped",
            1.0,
            vec![click_rule("r1", "pricing", -0.5)],
        ));
        assert_eq!(persona.rules[0].weight, 0.0);

        let behavior = pricing_clicks(1);
        let signals = extract_signals(&behavior);
        let score = score_persona(&persona, &signals, &behavior);
        assert_eq!(score.score, 0.0);
    }

    #[test]
    fn test_score_bounds_and_alternative_cap() {
        let personas: Vec<CompiledPersona> = (0..5)
            .map(|i| {
                CompiledPersona::compile(&persona_with_rules(
                    &format!("p{}", i),
                    1.0,
                    vec![click_rule("r", "pricing", 0.8)],
                ))
            })
            .collect();

        let behavior = pricing_clicks(3);
        let signals = extract_signals(&behavior);
        let options = ScoringOptions::default();

        let matched = match_persona(&personas, &signals, &behavior, &options).unwrap();
        assert!(matched.confidence >= 0.0 && matched.confidence <= 1.0);
        assert!(matched.alternative_matches.len() <= options.max_alternatives);
        assert_eq!(matched.alternative_matches.len(), 2);
        for alt in &matched.alternative_matches {
            assert!(alt.confidence >= options.min_confidence * 0.7);
        }
    }

    #[test]
    fn test_no_match_below_floor() {
        let persona = CompiledPersona::compile(&persona_with_rules(
            "weak",
            0.3, // prior caps the score below the 0.5 floor
            vec![click_rule("r1", "pricing", 0.8)],
        ));
        let behavior = pricing_clicks(4);
        let signals = extract_signals(&behavior);

        let result = match_persona(
            &[persona],
            &signals,
            &behavior,
            &ScoringOptions::default(),
        );
        assert!(result.is_none());
    }

    #[test]
    fn test_inactive_personas_ignored() {
        let mut persona = persona_with_rules("ghost", 1.0, vec![click_rule("r1", "pricing", 0.8)]);
        persona.is_active = false;
        let compiled = CompiledPersona::compile(&persona);

        let behavior = pricing_clicks(4);
        let signals = extract_signals(&behavior);
        let result = match_persona(
            &[compiled],
            &signals,
            &behavior,
            &ScoringOptions::default(),
        );
        assert!(result.is_none());
    }

    #[test]
    fn test_match_carries_contributing_signals() {
        let persona = CompiledPersona::compile(&persona_with_rules(
            "buyer",
            1.0,
            vec![click_rule("r1", "pricing", 0.8)],
        ));
        let behavior = pricing_clicks(2);
        let signals = extract_signals(&behavior);

        let matched = match_persona(
            &[persona],
            &signals,
            &behavior,
            &ScoringOptions::default(),
        )
        .unwrap();
        assert_eq!(matched.signals.len(), 2);
        assert!(matched
            .signals
            .iter()
            .all(|s| s.signal_type == RuleType::ClickPattern));
    }

    #[test]
    fn test_lint_flags_weak_definitions() {
        let personas = vec![
            persona_with_rules("empty", 1.0, vec![]),
            persona_with_rules(
                "bad-value",
                1.0,
                vec![DetectionRule {
                    id: "r1".to_string(),
                    rule_type: RuleType::TimeOnPage,
                    condition: String::new(),
                    value: Some("thirty".to_string()),
                    weight: 0.5,
                }],
            ),
            persona_with_rules(
                "never",
                1.0,
                vec![DetectionRule {
                    id: "r2".to_string(),
                    rule_type: RuleType::DeviceType,
                    condition: "smartwatch".to_string(),
                    value: None,
                    weight: 0.5,
                }],
            ),
        ];

        let warnings = lint_personas(&personas);
        assert!(warnings.iter().any(|w| w.persona_id == "empty"));
        assert!(warnings
            .iter()
            .any(|w| w.persona_id == "bad-value" && w.rule_id.as_deref() == Some("r1")));
        assert!(warnings
            .iter()
            .any(|w| w.persona_id == "never" && w.rule_id.as_deref() == Some("r2")));
    }
}
