//! Data models for site profiles and the socket wire protocol.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Which text-input implementation pattern a site's editor uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditorKind {
    /// Plain `<textarea>`/`<input>`: assign `.value`, raise input + change.
    PlainValue,
    /// Rich contenteditable editor: replace content with one paragraph,
    /// raise an insertText InputEvent.
    RichInnerHtml,
    /// Editors that only react to platform edit commands (Lexical, some
    /// contenteditable stacks): `insertText` command with a content-replace
    /// fallback, plus key-shaped notifications.
    ExecCommand,
}

/// How the submit control is triggered once resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitTechnique {
    /// Single programmatic click.
    Click,
    /// mousedown, mouseup, click in order, for handlers wired to the
    /// lower-level pointer sequence.
    MultiPhaseClick,
    /// Click when the control resolved; synthetic Enter on the input
    /// element when it did not. The only technique for which a missing
    /// submit control is non-fatal.
    EnterKeyFallback,
}

/// Site-specific convention for "this control is actually actionable".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReadinessCheck {
    /// Native `disabled` property must be false.
    NativeDisabled,
    /// `aria-disabled` attribute must not be the literal string "true".
    AriaDisabled,
    /// The nearest ancestor matching `container` must not carry
    /// `class_name`. `closest()` matches the element itself first, so this
    /// also covers disabled-class conventions on the control proper.
    AncestorClass {
        container: String,
        class_name: String,
    },
}

/// An optional on/off control on the target site (web search, extended
/// reasoning) that delivery reconciles toward the configured state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability {
    pub id: String,
    pub name: String,
    /// Visible label text used to disambiguate when the selector matches
    /// several controls.
    pub label: String,
    pub selector: String,
    /// Desired state; the live toggle is clicked only on mismatch.
    pub enabled: bool,
}

/// A prompt template wrapping the selected text before delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureTemplate {
    pub name: String,
    /// Prompt text containing the `${text}` placeholder.
    pub prompt: String,
    pub order: u32,
}

impl FeatureTemplate {
    /// Substitute the selection into the `${text}` placeholder.
    pub fn expand(&self, text: &str) -> String {
        self.prompt.replace("${text}", text)
    }
}

/// Full automation profile for one target site.
///
/// Owned by the configuration store; the engine reads it per run and never
/// mutates it. Inference results flow back through the store, not through
/// the profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteProfile {
    pub id: String,
    pub name: String,
    pub url: String,
    pub enabled: bool,
    pub order: u32,
    pub input_selector: String,
    pub submit_selector: String,
    pub editor_kind: EditorKind,
    pub submit_technique: SubmitTechnique,
    /// Readiness gate applied when waiting for the submit control. `None`
    /// means DOM presence alone qualifies.
    #[serde(default)]
    pub readiness: Option<ReadinessCheck>,
    #[serde(default)]
    pub capabilities: Vec<Capability>,
    #[serde(default)]
    pub features: HashMap<String, FeatureTemplate>,
    /// Key into `features` selecting the active template.
    #[serde(default)]
    pub current_feature: Option<String>,
}

impl SiteProfile {
    /// Wrap `text` in the active feature template, or pass it through when
    /// no template is configured.
    pub fn wrap_text(&self, text: &str) -> String {
        self.current_feature
            .as_ref()
            .and_then(|id| self.features.get(id))
            .map(|feature| feature.expand(text))
            .unwrap_or_else(|| text.to_string())
    }
}

/// Transient handoff between a trigger and its consumption by the
/// orchestrator. At most one outstanding per site; a second trigger before
/// the first is consumed overwrites it (accepted last-write-wins race).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDelivery {
    pub site_id: String,
    pub text: String,
}

/// Which trigger actually fired the submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitRoute {
    Click,
    PointerSequence,
    EnterKey,
}

/// Successful delivery report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryOutcome {
    pub site_id: String,
    pub via: SubmitRoute,
}

/// One request line on the control socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireRequest {
    pub id: String,
    #[serde(default = "default_version")]
    pub v: u32,
    pub method: String,
    #[serde(default)]
    pub params: HashMap<String, serde_json::Value>,
}

fn default_version() -> u32 {
    1
}

/// One response line on the control socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireResponse {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WireResponse {
    pub fn ok(id: &str, result: serde_json::Value) -> Self {
        Self {
            id: id.to_string(),
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: &str, message: impl Into<String>) -> Self {
        Self {
            id: id.to_string(),
            result: None,
            error: Some(message.into()),
        }
    }
}
