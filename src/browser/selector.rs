//! Selector synthesis and candidate scoring.
//!
//! Given a structural snapshot of a picked element, synthesize candidate
//! CSS selectors from most to least specific. The picker verifies each one
//! against the live page and keeps the first that uniquely round-trips, so
//! synthesis here is pure and never touches the document.

use std::collections::HashMap;

use serde::Deserialize;

/// Attributes worth anchoring a selector on, in preference order. Test ids
/// first since they are the only attribute class meant to be stable.
const ANCHOR_ATTRIBUTES: &[&str] = &["data-testid", "aria-label", "name", "role", "placeholder"];

/// Class names that track transient UI state rather than identity. A
/// selector anchored on one of these breaks the moment the state flips.
const STATE_CLASSES: &[&str] = &[
    "active", "checked", "selected", "on", "open", "hover", "focus", "focused", "disabled",
    "hidden", "visible", "loading", "pending", "expanded", "collapsed", "highlighted",
];

/// Structural snapshot of one element, captured in-page by the picker.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ElementDescriptor {
    pub tag: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub classes: Vec<String>,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    /// Ancestor chain from the outermost captured ancestor down to the
    /// element's parent.
    #[serde(default)]
    pub path: Vec<PathSegment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathSegment {
    pub tag: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub class: Option<String>,
}

/// True when `class` names transient state rather than identity. Suffix
/// segments count too, so `btn-active` and `is_selected` are both state.
pub fn is_state_class(class: &str) -> bool {
    let lower = class.to_ascii_lowercase();
    STATE_CLASSES.iter().any(|state| {
        lower == *state
            || lower.ends_with(&format!("-{state}"))
            || lower.ends_with(&format!("_{state}"))
    })
}

/// Escape a value for embedding inside `[attr="..."]`.
fn css_attr_escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// True when `name` is usable bare after `#` or `.` without escaping.
fn is_css_ident(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit() || c == '-')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn segment_token(segment: &PathSegment) -> String {
    if let Some(id) = segment.id.as_deref().filter(|id| is_css_ident(id)) {
        return format!("#{id}");
    }
    if let Some(class) = segment
        .class
        .as_deref()
        .filter(|c| is_css_ident(c) && !is_state_class(c))
    {
        return format!("{}.{}", segment.tag, class);
    }
    segment.tag.clone()
}

/// First identity-carrying class, if any.
fn stable_class(descriptor: &ElementDescriptor) -> Option<&str> {
    descriptor
        .classes
        .iter()
        .map(String::as_str)
        .find(|c| is_css_ident(c) && !is_state_class(c))
}

/// Candidate selectors for `descriptor`, most specific first. The caller
/// verifies uniqueness; duplicates are already removed here.
pub fn candidate_selectors(descriptor: &ElementDescriptor) -> Vec<String> {
    let mut candidates = Vec::new();
    let mut push = |selector: String| {
        if !candidates.contains(&selector) {
            candidates.push(selector);
        }
    };

    if let Some(id) = descriptor.id.as_deref().filter(|id| !id.is_empty()) {
        if is_css_ident(id) {
            push(format!("#{id}"));
        } else {
            push(format!("[id=\"{}\"]", css_attr_escape(id)));
        }
    }

    for attr in ANCHOR_ATTRIBUTES {
        if let Some(value) = descriptor.attributes.get(*attr).filter(|v| !v.is_empty()) {
            push(format!(
                "{}[{}=\"{}\"]",
                descriptor.tag,
                attr,
                css_attr_escape(value)
            ));
        }
    }

    if let Some(class) = stable_class(descriptor) {
        push(format!("{}.{}", descriptor.tag, class));
    }

    if let Some(ty) = descriptor.attributes.get("type").filter(|v| !v.is_empty()) {
        push(format!("{}[type=\"{}\"]", descriptor.tag, css_attr_escape(ty)));
    }

    push(descriptor.tag.clone());

    if !descriptor.path.is_empty() {
        let mut parts: Vec<String> = descriptor.path.iter().map(segment_token).collect();
        parts.push(
            stable_class(descriptor)
                .map(|c| format!("{}.{}", descriptor.tag, c))
                .unwrap_or_else(|| descriptor.tag.clone()),
        );
        push(parts.join(" > "));
    }

    candidates
}

/// One auto-detect candidate: its snapshot plus the fixed-order feature
/// vector the probe script computed for it.
#[derive(Debug, Clone, Deserialize)]
pub struct AutoCandidate {
    pub descriptor: ElementDescriptor,
    pub features: Vec<bool>,
}

impl AutoCandidate {
    pub fn score(&self) -> usize {
        self.features.iter().filter(|f| **f).count()
    }
}

/// Pick the strongest candidate. Ties go to the earliest candidate, which
/// the probe script emits in document order. Confidence is the fraction of
/// features the winner satisfied.
pub fn best_candidate(candidates: &[AutoCandidate]) -> Option<(&AutoCandidate, f64)> {
    let mut best: Option<(&AutoCandidate, usize)> = None;
    for candidate in candidates {
        let score = candidate.score();
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((candidate, score));
        }
    }
    best.map(|(candidate, score)| {
        let total = candidate.features.len().max(1);
        (candidate, score as f64 / total as f64)
    })
}
