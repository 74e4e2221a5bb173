//! Page driver seam between the orchestrator and the live document.
//!
//! The orchestrator talks to a `PageDriver` so its sequencing, fallback and
//! reconciliation policy can be exercised against a scripted double; the
//! production implementation evaluates the generated scripts on a CDP page.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::page::Page;
use serde::Deserialize;

use crate::browser::input::insert_script;
use crate::browser::submit::{
    capability_probe_script, click_script, enter_key_script, multi_phase_click_script,
};
use crate::browser::waiter::{wait_script, ElementRef, WaitSpec};
use crate::models::{Capability, EditorKind};

/// Result of a one-shot capability toggle probe.
#[derive(Debug, Clone)]
pub struct CapabilityProbe {
    pub element: ElementRef,
    pub active: bool,
}

/// Everything the orchestrator needs from a live page. Each call re-probes
/// the document at execution time; `false`/`None` results mean the target
/// element was absent, which callers map to their own policy.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Resolve `spec`, yielding `None` when nothing matched before the
    /// deadline. Absence is a valid outcome, never an error.
    async fn wait_for(&self, spec: &WaitSpec) -> Result<Option<ElementRef>>;

    /// Insert text with the strategy for `kind`; `false` when the element
    /// went stale between resolution and insertion.
    async fn insert_text(&self, element: &ElementRef, kind: EditorKind, text: &str)
        -> Result<bool>;

    async fn click(&self, control: &ElementRef) -> Result<bool>;

    async fn multi_phase_click(&self, control: &ElementRef) -> Result<bool>;

    async fn press_enter(&self, input: &ElementRef) -> Result<bool>;

    /// Locate a capability toggle and report its current state.
    async fn capability_probe(&self, cap: &Capability) -> Result<Option<CapabilityProbe>>;
}

/// CDP-backed driver over one page.
pub struct CdpDriver {
    page: Page,
}

#[derive(Debug, Deserialize)]
struct ProbeState {
    active: bool,
}

impl CdpDriver {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    /// Evaluate a generated script that resolves to a boolean.
    async fn eval_bool(&self, script: String) -> Result<bool> {
        self.page
            .evaluate(script)
            .await
            .context("Script evaluation failed")?
            .into_value()
            .context("Script did not return a boolean")
    }
}

#[async_trait]
impl PageDriver for CdpDriver {
    async fn wait_for(&self, spec: &WaitSpec) -> Result<Option<ElementRef>> {
        let element_ref = ElementRef::generate();
        let script = wait_script(spec, &element_ref);
        let params = EvaluateParams::builder()
            .expression(script)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build evaluate params: {e}"))?;
        let found: bool = self
            .page
            .evaluate(params)
            .await
            .context("Wait script evaluation failed")?
            .into_value()
            .context("Wait script did not resolve a boolean")?;
        Ok(found.then_some(element_ref))
    }

    async fn insert_text(
        &self,
        element: &ElementRef,
        kind: EditorKind,
        text: &str,
    ) -> Result<bool> {
        self.eval_bool(insert_script(element, kind, text)).await
    }

    async fn click(&self, control: &ElementRef) -> Result<bool> {
        self.eval_bool(click_script(control)).await
    }

    async fn multi_phase_click(&self, control: &ElementRef) -> Result<bool> {
        self.eval_bool(multi_phase_click_script(control)).await
    }

    async fn press_enter(&self, input: &ElementRef) -> Result<bool> {
        self.eval_bool(enter_key_script(input)).await
    }

    async fn capability_probe(&self, cap: &Capability) -> Result<Option<CapabilityProbe>> {
        let element_ref = ElementRef::generate();
        let script = capability_probe_script(cap, &element_ref);
        let state: Option<ProbeState> = self
            .page
            .evaluate(script)
            .await
            .context("Capability probe evaluation failed")?
            .into_value()
            .context("Capability probe returned an unexpected shape")?;
        Ok(state.map(|s| CapabilityProbe {
            element: element_ref,
            active: s.active,
        }))
    }
}
