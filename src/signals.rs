//! Behavior signal extraction
//!
//! Converts a raw behavior snapshot into a flat list of typed, weighted
//! behavior signals. Pure and infallible: missing telemetry degrades to
//! fewer signals, never to an error.
//!
//! The intrinsic weight constants are part of the engine contract and must
//! stay stable for observable parity across hosts.

use chrono::Utc;

use crate::types::{BehaviorSignal, RuleType, SignalValue, UserBehavior};

/// Intrinsic weight of a click signal
pub const CLICK_SIGNAL_WEIGHT: f64 = 0.8;
/// Intrinsic weight of a scroll-depth signal
pub const SCROLL_SIGNAL_WEIGHT: f64 = 0.5;
/// Intrinsic weight of a time-on-section signal
pub const DWELL_SIGNAL_WEIGHT: f64 = 0.6;
/// Intrinsic weight of a referrer signal
pub const REFERRER_SIGNAL_WEIGHT: f64 = 0.4;
/// Intrinsic weight of a UTM bundle signal
pub const UTM_SIGNAL_WEIGHT: f64 = 0.5;
/// Intrinsic weight of a completed form interaction
pub const FORM_COMPLETED_SIGNAL_WEIGHT: f64 = 0.9;
/// Intrinsic weight of an incomplete form interaction
pub const FORM_INCOMPLETE_SIGNAL_WEIGHT: f64 = 0.4;
/// Intrinsic weight of a navigation-path signal
pub const PAGE_SEQUENCE_SIGNAL_WEIGHT: f64 = 0.6;
/// Intrinsic weight of the device-type signal
pub const DEVICE_SIGNAL_WEIGHT: f64 = 0.2;
/// Intrinsic weight of a search-query signal
pub const SEARCH_SIGNAL_WEIGHT: f64 = 0.7;

/// Extract behavior signals from a snapshot.
///
/// One signal is emitted per click, scroll record, dwell entry, form
/// interaction, and search query; one for the referrer (if present), the UTM
/// bundle (if source or campaign present), and the navigation path (if it
/// spans more than one page); the device-type signal is always emitted.
pub fn extract_signals(behavior: &UserBehavior) -> Vec<BehaviorSignal> {
    let now = Utc::now();
    let mut signals = Vec::new();

    for click in &behavior.clicks {
        signals.push(BehaviorSignal {
            signal_type: RuleType::ClickPattern,
            value: SignalValue::Click {
                section_id: click.section_id.clone(),
                element: click.element.clone(),
            },
            timestamp: click.timestamp.unwrap_or(now),
            weight: CLICK_SIGNAL_WEIGHT,
        });
    }

    for scroll in &behavior.scrolls {
        signals.push(BehaviorSignal {
            signal_type: RuleType::ScrollBehavior,
            value: SignalValue::Scroll {
                max_depth: scroll.max_depth,
                duration_sec: scroll.duration_sec,
            },
            timestamp: scroll.timestamp.unwrap_or(now),
            weight: SCROLL_SIGNAL_WEIGHT,
        });
    }

    for dwell in &behavior.section_dwell {
        signals.push(BehaviorSignal {
            signal_type: RuleType::TimeOnPage,
            value: SignalValue::Dwell {
                section_id: dwell.section_id.clone(),
                seconds: dwell.seconds,
            },
            timestamp: now,
            weight: DWELL_SIGNAL_WEIGHT,
        });
    }

    if let Some(referrer) = &behavior.referrer {
        if !referrer.is_empty() {
            signals.push(BehaviorSignal {
                signal_type: RuleType::Referrer,
                value: SignalValue::Referrer {
                    url: referrer.clone(),
                },
                timestamp: now,
                weight: REFERRER_SIGNAL_WEIGHT,
            });
        }
    }

    if let Some(utm) = &behavior.utm {
        if utm.source.is_some() || utm.campaign.is_some() {
            signals.push(BehaviorSignal {
                signal_type: RuleType::UtmParameter,
                value: SignalValue::Utm {
                    source: utm.source.clone(),
                    medium: utm.medium.clone(),
                    campaign: utm.campaign.clone(),
                },
                timestamp: now,
                weight: UTM_SIGNAL_WEIGHT,
            });
        }
    }

    for form in &behavior.form_interactions {
        signals.push(BehaviorSignal {
            signal_type: RuleType::FormField,
            value: SignalValue::Form {
                field: form.field.clone(),
                completed: form.completed,
            },
            timestamp: form.timestamp.unwrap_or(now),
            weight: if form.completed {
                FORM_COMPLETED_SIGNAL_WEIGHT
            } else {
                FORM_INCOMPLETE_SIGNAL_WEIGHT
            },
        });
    }

    if behavior.navigation_path.len() > 1 {
        signals.push(BehaviorSignal {
            signal_type: RuleType::PageSequence,
            value: SignalValue::Path {
                pages: behavior.navigation_path.clone(),
            },
            timestamp: now,
            weight: PAGE_SEQUENCE_SIGNAL_WEIGHT,
        });
    }

    signals.push(BehaviorSignal {
        signal_type: RuleType::DeviceType,
        value: SignalValue::Device {
            device: behavior.device_type,
        },
        timestamp: now,
        weight: DEVICE_SIGNAL_WEIGHT,
    });

    for query in &behavior.search_queries {
        signals.push(BehaviorSignal {
            signal_type: RuleType::SearchQuery,
            value: SignalValue::Search {
                query: query.clone(),
            },
            timestamp: now,
            weight: SEARCH_SIGNAL_WEIGHT,
        });
    }

    signals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        ClickEvent, DeviceType, DwellRecord, FormInteraction, ScrollRecord, UtmParameters,
    };

    fn signals_of_type(signals: &[BehaviorSignal], t: RuleType) -> Vec<&BehaviorSignal> {
        signals.iter().filter(|s| s.signal_type == t).collect()
    }

    #[test]
    fn test_empty_snapshot_emits_only_device_signal() {
        let signals = extract_signals(&UserBehavior::default());

        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].signal_type, RuleType::DeviceType);
        assert_eq!(signals[0].weight, DEVICE_SIGNAL_WEIGHT);
    }

    #[test]
    fn test_one_signal_per_click() {
        let behavior = UserBehavior {
            clicks: vec![
                ClickEvent {
                    section_id: Some("pricing".to_string()),
                    ..Default::default()
                },
                ClickEvent {
                    section_id: Some("features".to_string()),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };

        let signals = extract_signals(&behavior);
        let clicks = signals_of_type(&signals, RuleType::ClickPattern);
        assert_eq!(clicks.len(), 2);
        assert!(clicks.iter().all(|s| s.weight == CLICK_SIGNAL_WEIGHT));
    }

    #[test]
    fn test_form_weight_depends_on_completion() {
        let behavior = UserBehavior {
            form_interactions: vec![
                FormInteraction {
                    field: "email".to_string(),
                    completed: true,
                    timestamp: None,
                },
                FormInteraction {
                    field: "company".to_string(),
                    completed: false,
                    timestamp: None,
                },
            ],
            ..Default::default()
        };

        let signals = extract_signals(&behavior);
        let forms = signals_of_type(&signals, RuleType::FormField);
        assert_eq!(forms.len(), 2);
        assert_eq!(forms[0].weight, FORM_COMPLETED_SIGNAL_WEIGHT);
        assert_eq!(forms[1].weight, FORM_INCOMPLETE_SIGNAL_WEIGHT);
    }

    #[test]
    fn test_single_page_path_emits_no_sequence_signal() {
        let behavior = UserBehavior {
            navigation_path: vec!["/".to_string()],
            ..Default::default()
        };
        let signals = extract_signals(&behavior);
        assert!(signals_of_type(&signals, RuleType::PageSequence).is_empty());

        let behavior = UserBehavior {
            navigation_path: vec!["/".to_string(), "/pricing".to_string()],
            ..Default::default()
        };
        let signals = extract_signals(&behavior);
        let paths = signals_of_type(&signals, RuleType::PageSequence);
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].weight, PAGE_SEQUENCE_SIGNAL_WEIGHT);
    }

    #[test]
    fn test_utm_requires_source_or_campaign() {
        let behavior = UserBehavior {
            utm: Some(UtmParameters {
                medium: Some("cpc".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let signals = extract_signals(&behavior);
        assert!(signals_of_type(&signals, RuleType::UtmParameter).is_empty());

        let behavior = UserBehavior {
            utm: Some(UtmParameters {
                source: Some("linkedin".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let signals = extract_signals(&behavior);
        assert_eq!(signals_of_type(&signals, RuleType::UtmParameter).len(), 1);
    }

    #[test]
    fn test_intrinsic_weight_constants() {
        let behavior = UserBehavior {
            clicks: vec![ClickEvent::default()],
            scrolls: vec![ScrollRecord::default()],
            section_dwell: vec![DwellRecord::default()],
            referrer: Some("https://google.com".to_string()),
            search_queries: vec!["pricing".to_string()],
            device_type: DeviceType::Mobile,
            ..Default::default()
        };

        let signals = extract_signals(&behavior);
        let weight_of = |t: RuleType| signals_of_type(&signals, t)[0].weight;

        assert_eq!(weight_of(RuleType::ClickPattern), 0.8);
        assert_eq!(weight_of(RuleType::ScrollBehavior), 0.5);
        assert_eq!(weight_of(RuleType::TimeOnPage), 0.6);
        assert_eq!(weight_of(RuleType::Referrer), 0.4);
        assert_eq!(weight_of(RuleType::DeviceType), 0.2);
        assert_eq!(weight_of(RuleType::SearchQuery), 0.7);
    }
}
