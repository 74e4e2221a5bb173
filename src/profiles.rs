//! Configuration store for site profiles.
//!
//! Profiles live as pretty-printed JSON under `~/.prompt-relay/` and are
//! seeded from built-in defaults covering the common assistant sites. The
//! engine consumes them read-only; only selector write-back from the
//! inference tool and explicit edits mutate the file.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::models::{
    Capability, EditorKind, FeatureTemplate, ReadinessCheck, SiteProfile, SubmitTechnique,
};

/// Which selector of a profile an inference result targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectorKind {
    TextArea,
    SubmitButton,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredProfiles {
    profiles: Vec<SiteProfile>,
    saved_at: String,
}

/// On-disk profile store with built-in defaults.
pub struct ProfileStore {
    path: PathBuf,
    profiles: Vec<SiteProfile>,
}

impl ProfileStore {
    /// Load the store from `path`, falling back to defaults when the file
    /// does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let profiles = if path.exists() {
            let bytes = std::fs::read(&path)
                .with_context(|| format!("Failed to read profiles from {}", path.display()))?;
            let stored: StoredProfiles =
                serde_json::from_slice(&bytes).context("Failed to parse profile store")?;
            stored.profiles
        } else {
            default_profiles()
        };
        Ok(Self { path, profiles })
    }

    /// Store rooted in the conventional home-directory location.
    pub fn open_default() -> Result<Self> {
        Self::open(default_store_path())
    }

    pub fn get(&self, site_id: &str) -> Option<&SiteProfile> {
        self.profiles.iter().find(|p| p.id == site_id)
    }

    /// All profiles, enabled-first and ordered by their configured order.
    pub fn get_all(&self) -> Vec<&SiteProfile> {
        let mut all: Vec<&SiteProfile> = self.profiles.iter().collect();
        all.sort_by_key(|p| (!p.enabled, p.order));
        all
    }

    /// Write an inferred selector back into a profile and persist.
    pub fn set_selector(
        &mut self,
        site_id: &str,
        kind: SelectorKind,
        selector: &str,
    ) -> Result<()> {
        let profile = self
            .profiles
            .iter_mut()
            .find(|p| p.id == site_id)
            .with_context(|| format!("Unknown site: {}", site_id))?;
        match kind {
            SelectorKind::TextArea => profile.input_selector = selector.to_string(),
            SelectorKind::SubmitButton => profile.submit_selector = selector.to_string(),
        }
        self.save()
    }

    /// Drop all customizations and restore the built-in defaults.
    pub fn reset(&mut self) -> Result<()> {
        self.profiles = default_profiles();
        self.save()
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let stored = StoredProfiles {
            profiles: self.profiles.clone(),
            saved_at: Utc::now().to_rfc3339(),
        };
        let serialized = serde_json::to_vec_pretty(&stored)?;
        std::fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        Ok(())
    }
}

/// `~/.prompt-relay/profiles.json`
pub fn default_store_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".prompt-relay")
        .join("profiles.json")
}

/// The shared prompt templates every default profile starts with.
fn default_features() -> HashMap<String, FeatureTemplate> {
    let mut features = HashMap::new();
    features.insert(
        "ask".to_string(),
        FeatureTemplate {
            name: "Question Mode".into(),
            prompt: "What is ${text}? Can you explain it?".into(),
            order: 0,
        },
    );
    features.insert(
        "explain".to_string(),
        FeatureTemplate {
            name: "Explain Mode".into(),
            prompt: "Please explain in detail the principles and uses of ${text}.".into(),
            order: 1,
        },
    );
    features.insert(
        "summarize".to_string(),
        FeatureTemplate {
            name: "Summarize".into(),
            prompt: "Please provide a concise summary of:\n${text}".into(),
            order: 2,
        },
    );
    features.insert(
        "research".to_string(),
        FeatureTemplate {
            name: "Research Mode".into(),
            prompt: "Please provide a detailed analysis of ${text}, including:\n1. Key concepts\n2. Historical context\n3. Current developments\n4. Future implications".into(),
            order: 3,
        },
    );
    features
}

fn capability(id: &str, name: &str, label: &str, selector: &str) -> Capability {
    Capability {
        id: id.into(),
        name: name.into(),
        label: label.into(),
        selector: selector.into(),
        enabled: false,
    }
}

/// Built-in profiles for the supported assistant sites.
pub fn default_profiles() -> Vec<SiteProfile> {
    let features = default_features();
    let base = |id: &str, name: &str, url: &str, order: u32| SiteProfile {
        id: id.into(),
        name: name.into(),
        url: url.into(),
        enabled: true,
        order,
        input_selector: String::new(),
        submit_selector: String::new(),
        editor_kind: EditorKind::PlainValue,
        submit_technique: SubmitTechnique::Click,
        readiness: None,
        capabilities: vec![],
        features: features.clone(),
        current_feature: Some("ask".to_string()),
    };

    vec![
        SiteProfile {
            input_selector: "#prompt-textarea".into(),
            submit_selector: "button[data-testid=\"send-button\"]".into(),
            editor_kind: EditorKind::RichInnerHtml,
            submit_technique: SubmitTechnique::EnterKeyFallback,
            readiness: Some(ReadinessCheck::NativeDisabled),
            capabilities: vec![capability(
                "reason",
                "Reason",
                "Reason",
                "button[aria-label=\"Reason\"]",
            )],
            ..base("chatgpt", "ChatGPT", "https://chatgpt.com/", 0)
        },
        SiteProfile {
            input_selector: "textarea[placeholder]".into(),
            submit_selector: "div[role=\"button\"][aria-disabled]".into(),
            readiness: Some(ReadinessCheck::AriaDisabled),
            capabilities: vec![
                capability(
                    "deep_think",
                    "DeepThink",
                    "DeepThink (R1)",
                    "div[role=\"button\"]",
                ),
                capability("search", "Search", "Search", "div[role=\"button\"]"),
            ],
            ..base("deepseek", "DeepSeek AI", "https://chat.deepseek.com/", 1)
        },
        SiteProfile {
            input_selector: ".ql-editor.textarea".into(),
            submit_selector: "button.send-button[aria-label]".into(),
            editor_kind: EditorKind::RichInnerHtml,
            readiness: Some(ReadinessCheck::AriaDisabled),
            ..base("gemini", "Google Gemini", "https://gemini.google.com/app", 2)
        },
        SiteProfile {
            input_selector: "textarea[placeholder]".into(),
            submit_selector: "button[aria-label*=\"Submit\"]".into(),
            readiness: Some(ReadinessCheck::NativeDisabled),
            ..base("perplexity", "Perplexity", "https://www.perplexity.ai/", 3)
        },
        SiteProfile {
            input_selector: "textarea:first-of-type".into(),
            submit_selector: "button[type=\"submit\"]".into(),
            readiness: Some(ReadinessCheck::NativeDisabled),
            ..base("grok", "Grok", "https://grok.com/", 4)
        },
        SiteProfile {
            input_selector: "textarea[placeholder]".into(),
            submit_selector: "button[aria-label*=\"Submit\"]".into(),
            readiness: Some(ReadinessCheck::NativeDisabled),
            ..base(
                "copilot",
                "Microsoft Copilot",
                "https://copilot.microsoft.com/",
                5,
            )
        },
        SiteProfile {
            input_selector: ".ant-input".into(),
            submit_selector: "div[class*=\"operateBtn\"]".into(),
            submit_technique: SubmitTechnique::MultiPhaseClick,
            readiness: Some(ReadinessCheck::AncestorClass {
                container: "div[class*=\"operateBtn\"]".into(),
                class_name: "disabled".into(),
            }),
            ..base("qianwen", "Qianwen", "https://tongyi.aliyun.com/qianwen/", 6)
        },
        SiteProfile {
            input_selector: ".chat-input-editor[data-lexical-editor=\"true\"]".into(),
            submit_selector: ".send-button".into(),
            editor_kind: EditorKind::ExecCommand,
            readiness: Some(ReadinessCheck::AncestorClass {
                container: ".send-button-container".into(),
                class_name: "disabled".into(),
            }),
            capabilities: vec![
                capability("thinking", "Thinking", "Thinking", ".k15-switch"),
                capability(
                    "search",
                    "Internet Search",
                    "Internet Search",
                    ".search-switch",
                ),
            ],
            ..base("kimi", "Kimi", "https://kimi.moonshot.cn/", 7)
        },
        SiteProfile {
            input_selector: ".yc-editor[contenteditable=\"true\"]".into(),
            submit_selector: "#sendBtn".into(),
            editor_kind: EditorKind::ExecCommand,
            readiness: Some(ReadinessCheck::NativeDisabled),
            ..base("yiyan", "Wenxin Yiyan", "https://yiyan.baidu.com/", 8)
        },
    ]
}
