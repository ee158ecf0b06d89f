//! Detection rule condition micro-language
//!
//! Rule conditions arrive as free-text keyword expressions. They are parsed
//! once at persona-load time into a tagged [`Condition`] so evaluation never
//! re-interprets strings. Interpretation is keyword-substring based, not a
//! formal grammar; anything unrecognized degrades to the numeric-threshold
//! fallback for the rule type, or to [`Condition::Never`], never to an error.

use crate::types::{BehaviorSignal, DeviceType, RuleType, SignalValue, UserBehavior};

/// Default click-count threshold for generic click rules
const DEFAULT_MIN_CLICKS: u32 = 3;
/// Default scroll-depth threshold (percent) for generic scroll rules
const DEFAULT_MIN_SCROLL_DEPTH: f64 = 50.0;
/// Default dwell threshold (seconds) for time-on-page rules
const DEFAULT_MIN_DWELL_SEC: f64 = 30.0;
/// Default interaction-count threshold for generic content rules
const DEFAULT_MIN_INTERACTIONS: u32 = 1;

/// Quick-scan scroll pattern: shallow read at speed
const QUICK_SCAN_MIN_DEPTH: f64 = 70.0;
const QUICK_SCAN_MAX_DURATION_SEC: f64 = 30.0;
/// Deep-read scroll pattern: full read with sustained attention
const DEEP_READ_MIN_DEPTH: f64 = 80.0;
const DEEP_READ_MIN_DURATION_SEC: f64 = 120.0;

/// A parsed rule condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Any click landed in a section whose id contains the keyword
    SectionKeyword(String),
    /// At least this many clicks anywhere
    MinClicks(u32),
    /// Scroll depth > 70% within 30 s
    QuickScan,
    /// Scroll depth > 80% over more than 120 s
    DeepRead,
    /// Any scroll record reached this depth
    MinScrollDepth(f64),
    /// Any section dwell of at least this many seconds
    MinDwellSeconds(f64),
    /// Referrer url contains any of the needles
    ReferrerContains(Vec<String>),
    /// UTM source/medium/campaign contains any of the needles
    UtmContains(Vec<String>),
    /// An interacted section id contains the keyword (aggregate snapshot)
    ContentKeyword(String),
    /// At least this many interacted sections (aggregate snapshot)
    MinInteractions(u32),
    /// A form interaction whose field contains the needle; empty needle
    /// matches any field
    FormFieldContains {
        field: String,
        require_completed: bool,
    },
    /// Any visited page in the navigation path contains the needle
    PathContains(String),
    /// Snapshot device type equals this device
    Device(DeviceType),
    /// Any search query contains the needle
    SearchContains(String),
    /// Malformed condition; never matches
    Never,
}

impl Condition {
    /// Parse a rule's condition string for its rule type. Infallible.
    pub fn parse(rule_type: RuleType, condition: &str, value: Option<&str>) -> Condition {
        let cond = condition.trim().to_lowercase();

        match rule_type {
            RuleType::ClickPattern => {
                if is_generic_token(&cond) {
                    Condition::MinClicks(parse_u32(value, DEFAULT_MIN_CLICKS))
                } else {
                    Condition::SectionKeyword(cond)
                }
            }
            RuleType::ScrollBehavior => {
                if cond.contains("quick_scan") {
                    Condition::QuickScan
                } else if cond.contains("deep_read") {
                    Condition::DeepRead
                } else {
                    Condition::MinScrollDepth(parse_f64(value, DEFAULT_MIN_SCROLL_DEPTH))
                }
            }
            RuleType::TimeOnPage => {
                Condition::MinDwellSeconds(parse_f64(value, DEFAULT_MIN_DWELL_SEC))
            }
            RuleType::Referrer => match traffic_needles(&cond, value) {
                Some(needles) => Condition::ReferrerContains(needles),
                None => Condition::Never,
            },
            RuleType::UtmParameter => match traffic_needles(&cond, value) {
                Some(needles) => Condition::UtmContains(needles),
                None => Condition::Never,
            },
            RuleType::ContentInteraction => {
                if is_generic_token(&cond) {
                    Condition::MinInteractions(parse_u32(value, DEFAULT_MIN_INTERACTIONS))
                } else {
                    Condition::ContentKeyword(cond)
                }
            }
            RuleType::FormField => {
                let require_completed = cond.contains("completed");
                let field = match value {
                    Some(v) if !v.trim().is_empty() => v.trim().to_lowercase(),
                    _ => cond.replace("completed", "").trim().to_string(),
                };
                Condition::FormFieldContains {
                    field,
                    require_completed,
                }
            }
            RuleType::PageSequence => {
                let needle = non_empty(&cond).or_else(|| {
                    value.and_then(|v| non_empty(&v.trim().to_lowercase()))
                });
                match needle {
                    Some(n) => Condition::PathContains(n),
                    None => Condition::Never,
                }
            }
            RuleType::DeviceType => {
                if cond.contains("mobile") {
                    Condition::Device(DeviceType::Mobile)
                } else if cond.contains("tablet") {
                    Condition::Device(DeviceType::Tablet)
                } else if cond.contains("desktop") {
                    Condition::Device(DeviceType::Desktop)
                } else {
                    Condition::Never
                }
            }
            RuleType::SearchQuery => match non_empty(&cond) {
                Some(n) => Condition::SearchContains(n),
                None => Condition::Never,
            },
        }
    }

    /// Evaluate against the extracted signals and the aggregate snapshot.
    ///
    /// Returns whether the condition matched and the indices of the signals
    /// that contributed evidence. Pure: nothing is mutated.
    pub fn evaluate(
        &self,
        signals: &[BehaviorSignal],
        behavior: &UserBehavior,
    ) -> (bool, Vec<usize>) {
        match self {
            Condition::SectionKeyword(keyword) => collect_matching(signals, |v| match v {
                SignalValue::Click { section_id, .. } => section_id
                    .as_deref()
                    .map(|s| s.to_lowercase().contains(keyword))
                    .unwrap_or(false),
                _ => false,
            }),
            Condition::MinClicks(min) => {
                let clicks: Vec<usize> = signals
                    .iter()
                    .enumerate()
                    .filter(|(_, s)| s.signal_type == RuleType::ClickPattern)
                    .map(|(i, _)| i)
                    .collect();
                if clicks.len() as u32 >= *min {
                    (true, clicks)
                } else {
                    (false, Vec::new())
                }
            }
            Condition::QuickScan => collect_matching(signals, |v| match v {
                SignalValue::Scroll {
                    max_depth,
                    duration_sec,
                } => *max_depth > QUICK_SCAN_MIN_DEPTH && *duration_sec < QUICK_SCAN_MAX_DURATION_SEC,
                _ => false,
            }),
            Condition::DeepRead => collect_matching(signals, |v| match v {
                SignalValue::Scroll {
                    max_depth,
                    duration_sec,
                } => *max_depth > DEEP_READ_MIN_DEPTH && *duration_sec > DEEP_READ_MIN_DURATION_SEC,
                _ => false,
            }),
            Condition::MinScrollDepth(min_depth) => collect_matching(signals, |v| match v {
                SignalValue::Scroll { max_depth, .. } => *max_depth >= *min_depth,
                _ => false,
            }),
            Condition::MinDwellSeconds(min_sec) => collect_matching(signals, |v| match v {
                SignalValue::Dwell { seconds, .. } => *seconds >= *min_sec,
                _ => false,
            }),
            Condition::ReferrerContains(needles) => collect_matching(signals, |v| match v {
                SignalValue::Referrer { url } => {
                    let url = url.to_lowercase();
                    needles.iter().any(|n| url.contains(n))
                }
                _ => false,
            }),
            Condition::UtmContains(needles) => collect_matching(signals, |v| match v {
                SignalValue::Utm {
                    source,
                    medium,
                    campaign,
                } => [source, medium, campaign].iter().any(|field| {
                    field
                        .as_deref()
                        .map(|f| {
                            let f = f.to_lowercase();
                            needles.iter().any(|n| f.contains(n))
                        })
                        .unwrap_or(false)
                }),
                _ => false,
            }),
            Condition::ContentKeyword(keyword) => {
                let matched = behavior
                    .interacted_sections
                    .iter()
                    .any(|s| s.to_lowercase().contains(keyword));
                (matched, Vec::new())
            }
            Condition::MinInteractions(min) => {
                (behavior.interacted_sections.len() as u32 >= *min, Vec::new())
            }
            Condition::FormFieldContains {
                field,
                require_completed,
            } => collect_matching(signals, |v| match v {
                SignalValue::Form {
                    field: signal_field,
                    completed,
                } => {
                    (!require_completed || *completed)
                        && (field.is_empty() || signal_field.to_lowercase().contains(field))
                }
                _ => false,
            }),
            Condition::PathContains(needle) => collect_matching(signals, |v| match v {
                SignalValue::Path { pages } => {
                    pages.iter().any(|p| p.to_lowercase().contains(needle))
                }
                _ => false,
            }),
            Condition::Device(device) => {
                if behavior.device_type == *device {
                    // Attribute the always-present device signal as evidence
                    let idx = signals
                        .iter()
                        .position(|s| s.signal_type == RuleType::DeviceType);
                    (true, idx.into_iter().collect())
                } else {
                    (false, Vec::new())
                }
            }
            Condition::SearchContains(needle) => collect_matching(signals, |v| match v {
                SignalValue::Search { query } => query.to_lowercase().contains(needle),
                _ => false,
            }),
            Condition::Never => (false, Vec::new()),
        }
    }
}

/// Condition tokens that mean "count clicks/interactions" rather than
/// "match this keyword".
fn is_generic_token(cond: &str) -> bool {
    cond.is_empty()
        || matches!(
            cond,
            "any" | "frequent_clicks" | "click_count" | "frequent" | "multiple"
        )
}

/// Expand traffic-source shortcuts into substring needles.
///
/// Returns `None` when neither the condition nor the value yields a usable
/// needle (the rule then never matches).
fn traffic_needles(cond: &str, value: Option<&str>) -> Option<Vec<String>> {
    if cond.contains("linkedin") {
        return Some(vec!["linkedin".to_string()]);
    }
    if cond.contains("google") {
        return Some(vec!["google".to_string()]);
    }
    if cond.contains("twitter") || cond.contains("x.com") {
        return Some(vec!["twitter".to_string(), "x.com".to_string()]);
    }
    if let Some(n) = non_empty(cond) {
        return Some(vec![n]);
    }
    value
        .and_then(|v| non_empty(&v.trim().to_lowercase()))
        .map(|n| vec![n])
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

fn parse_u32(value: Option<&str>, default: u32) -> u32 {
    value
        .and_then(|v| v.trim().parse::<u32>().ok())
        .unwrap_or(default)
}

fn parse_f64(value: Option<&str>, default: f64) -> f64 {
    value
        .and_then(|v| v.trim().parse::<f64>().ok())
        .unwrap_or(default)
}

fn collect_matching<F>(signals: &[BehaviorSignal], predicate: F) -> (bool, Vec<usize>)
where
    F: Fn(&SignalValue) -> bool,
{
    let indices: Vec<usize> = signals
        .iter()
        .enumerate()
        .filter(|(_, s)| predicate(&s.value))
        .map(|(i, _)| i)
        .collect();
    (!indices.is_empty(), indices)
}
