//! Delivery orchestration: the fixed sequence that turns a resolved page
//! into a submitted prompt.
//!
//! Order is load-bearing. The input element is resolved and filled before
//! capability toggles are touched, because several sites only render their
//! toolbars once the composer holds text. The submit control is resolved
//! last, under the profile's readiness gate, so a control that exists but
//! is still disabled does not count as found.

use std::time::Duration;

use tracing::{debug, warn};

use crate::browser::driver::PageDriver;
use crate::browser::waiter::WaitSpec;
use crate::error::DeliveryError;
use crate::models::{Capability, DeliveryOutcome, SiteProfile, SubmitRoute, SubmitTechnique};

const DEFAULT_ELEMENT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_CAPABILITY_TIMEOUT: Duration = Duration::from_secs(3);
const CAPABILITY_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Runs deliveries against any `PageDriver`.
pub struct Orchestrator {
    element_timeout: Duration,
    capability_timeout: Duration,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self {
            element_timeout: DEFAULT_ELEMENT_TIMEOUT,
            capability_timeout: DEFAULT_CAPABILITY_TIMEOUT,
        }
    }
}

impl Orchestrator {
    pub fn new(element_timeout: Duration, capability_timeout: Duration) -> Self {
        Self {
            element_timeout,
            capability_timeout,
        }
    }

    /// Deliver `text` to the page behind `driver` per `profile`.
    pub async fn deliver(
        &self,
        driver: &dyn PageDriver,
        profile: &SiteProfile,
        text: &str,
    ) -> Result<DeliveryOutcome, DeliveryError> {
        // Presence alone qualifies the input; readiness conventions apply
        // to the submit control only.
        let input_spec = WaitSpec::new(profile.input_selector.clone(), self.element_timeout);
        let input = driver
            .wait_for(&input_spec)
            .await?
            .ok_or_else(|| DeliveryError::NotFound(profile.input_selector.clone()))?;
        debug!(site = %profile.id, selector = %profile.input_selector, "input resolved");

        if !driver
            .insert_text(&input, profile.editor_kind, text)
            .await?
        {
            return Err(DeliveryError::NotFound(profile.input_selector.clone()));
        }

        for cap in &profile.capabilities {
            self.reconcile_capability(driver, &profile.id, cap).await;
        }

        let submit_spec = WaitSpec::with_readiness(
            profile.submit_selector.clone(),
            profile.readiness.clone(),
            self.element_timeout,
        );
        let control = driver.wait_for(&submit_spec).await?;

        let via = match (profile.submit_technique, control) {
            (SubmitTechnique::EnterKeyFallback, None) => {
                debug!(site = %profile.id, "submit control absent, falling back to Enter");
                if !driver.press_enter(&input).await? {
                    return Err(DeliveryError::NotFound(profile.input_selector.clone()));
                }
                SubmitRoute::EnterKey
            }
            (_, None) => {
                return Err(DeliveryError::NotFound(profile.submit_selector.clone()));
            }
            (SubmitTechnique::MultiPhaseClick, Some(control)) => {
                if !driver.multi_phase_click(&control).await? {
                    return Err(DeliveryError::NotFound(profile.submit_selector.clone()));
                }
                SubmitRoute::PointerSequence
            }
            (_, Some(control)) => {
                if !driver.click(&control).await? {
                    return Err(DeliveryError::NotFound(profile.submit_selector.clone()));
                }
                SubmitRoute::Click
            }
        };

        debug!(site = %profile.id, ?via, "delivery submitted");
        Ok(DeliveryOutcome {
            site_id: profile.id.clone(),
            via,
        })
    }

    /// Drive one capability toggle toward its configured state. Best
    /// effort: failures are logged and never abort the delivery.
    async fn reconcile_capability(&self, driver: &dyn PageDriver, site: &str, cap: &Capability) {
        let deadline = tokio::time::Instant::now() + self.capability_timeout;
        loop {
            match driver.capability_probe(cap).await {
                Ok(Some(probe)) => {
                    if probe.active != cap.enabled {
                        match driver.click(&probe.element).await {
                            Ok(true) => {
                                debug!(site, capability = %cap.id, target = cap.enabled, "toggled capability")
                            }
                            Ok(false) => {
                                warn!(site, capability = %cap.id, "capability toggle went stale")
                            }
                            Err(e) => {
                                warn!(site, capability = %cap.id, error = %e, "capability toggle click failed")
                            }
                        }
                    } else {
                        debug!(site, capability = %cap.id, "capability already in desired state");
                    }
                    return;
                }
                Ok(None) => {
                    if tokio::time::Instant::now() >= deadline {
                        warn!(site, capability = %cap.id, selector = %cap.selector, "capability control never appeared");
                        return;
                    }
                    tokio::time::sleep(CAPABILITY_POLL_INTERVAL).await;
                }
                Err(e) => {
                    warn!(site, capability = %cap.id, error = %e, "capability probe failed");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::driver::CapabilityProbe;
    use crate::browser::waiter::ElementRef;
    use crate::models::{EditorKind, ReadinessCheck};
    use anyhow::Result;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Scripted driver double. Each wait consumes the next queued answer;
    /// every interaction is appended to the call log.
    struct MockDriver {
        wait_answers: Mutex<Vec<Option<&'static str>>>,
        insert_ok: bool,
        probe_answers: Mutex<Vec<Option<CapabilityProbe>>>,
        calls: Mutex<Vec<String>>,
    }

    impl MockDriver {
        fn new(wait_answers: Vec<Option<&'static str>>) -> Self {
            Self {
                wait_answers: Mutex::new(wait_answers),
                insert_ok: true,
                probe_answers: Mutex::new(vec![]),
                calls: Mutex::new(vec![]),
            }
        }

        fn log(&self, call: impl Into<String>) {
            self.calls.lock().unwrap().push(call.into());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn count(&self, prefix: &str) -> usize {
            self.calls()
                .iter()
                .filter(|c| c.starts_with(prefix))
                .count()
        }
    }

    #[async_trait]
    impl PageDriver for MockDriver {
        async fn wait_for(&self, spec: &WaitSpec) -> Result<Option<ElementRef>> {
            self.log(format!("wait:{}", spec.selector));
            let mut answers = self.wait_answers.lock().unwrap();
            if answers.is_empty() {
                return Ok(None);
            }
            Ok(answers.remove(0).map(ElementRef::new))
        }

        async fn insert_text(
            &self,
            element: &ElementRef,
            _kind: EditorKind,
            text: &str,
        ) -> Result<bool> {
            self.log(format!("insert:{}:{}", element.token(), text));
            Ok(self.insert_ok)
        }

        async fn click(&self, control: &ElementRef) -> Result<bool> {
            self.log(format!("click:{}", control.token()));
            Ok(true)
        }

        async fn multi_phase_click(&self, control: &ElementRef) -> Result<bool> {
            self.log(format!("multi_phase_click:{}", control.token()));
            Ok(true)
        }

        async fn press_enter(&self, input: &ElementRef) -> Result<bool> {
            self.log(format!("press_enter:{}", input.token()));
            Ok(true)
        }

        async fn capability_probe(&self, cap: &Capability) -> Result<Option<CapabilityProbe>> {
            self.log(format!("probe:{}", cap.id));
            let mut answers = self.probe_answers.lock().unwrap();
            if answers.is_empty() {
                return Ok(None);
            }
            Ok(answers.remove(0))
        }
    }

    fn profile(technique: SubmitTechnique) -> SiteProfile {
        SiteProfile {
            id: "testsite".into(),
            name: "Test Site".into(),
            url: "https://example.com/".into(),
            enabled: true,
            order: 0,
            input_selector: "#composer".into(),
            submit_selector: "#send".into(),
            editor_kind: EditorKind::PlainValue,
            submit_technique: technique,
            readiness: Some(ReadinessCheck::NativeDisabled),
            capabilities: vec![],
            features: HashMap::new(),
            current_feature: None,
        }
    }

    fn fast() -> Orchestrator {
        Orchestrator::new(Duration::from_millis(50), Duration::from_millis(50))
    }

    #[tokio::test]
    async fn test_click_delivery_happy_path() {
        let driver = MockDriver::new(vec![Some("in"), Some("btn")]);
        let outcome = fast()
            .deliver(&driver, &profile(SubmitTechnique::Click), "hello")
            .await
            .unwrap();
        assert_eq!(outcome.via, SubmitRoute::Click);
        assert_eq!(
            driver.calls(),
            vec!["wait:#composer", "insert:in:hello", "wait:#send", "click:btn"]
        );
    }

    #[tokio::test]
    async fn test_multi_phase_click_routes_pointer_sequence() {
        let driver = MockDriver::new(vec![Some("in"), Some("btn")]);
        let outcome = fast()
            .deliver(&driver, &profile(SubmitTechnique::MultiPhaseClick), "x")
            .await
            .unwrap();
        assert_eq!(outcome.via, SubmitRoute::PointerSequence);
        assert_eq!(driver.count("multi_phase_click:"), 1);
        assert_eq!(driver.count("click:"), 0);
    }

    #[tokio::test]
    async fn test_missing_input_fails_before_any_insert() {
        let driver = MockDriver::new(vec![None]);
        let err = fast()
            .deliver(&driver, &profile(SubmitTechnique::Click), "x")
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::NotFound(ref s) if s == "#composer"));
        assert_eq!(driver.count("insert:"), 0);
        assert_eq!(driver.count("click:"), 0);
    }

    #[tokio::test]
    async fn test_missing_submit_is_fatal_without_fallback() {
        let driver = MockDriver::new(vec![Some("in"), None]);
        let err = fast()
            .deliver(&driver, &profile(SubmitTechnique::Click), "x")
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::NotFound(ref s) if s == "#send"));
        assert_eq!(driver.count("press_enter:"), 0);
    }

    #[tokio::test]
    async fn test_enter_fallback_fires_on_missing_submit() {
        let driver = MockDriver::new(vec![Some("in"), None]);
        let outcome = fast()
            .deliver(&driver, &profile(SubmitTechnique::EnterKeyFallback), "x")
            .await
            .unwrap();
        assert_eq!(outcome.via, SubmitRoute::EnterKey);
        // Enter targets the input element, not the absent control.
        assert_eq!(driver.calls().last().unwrap(), "press_enter:in");
    }

    #[tokio::test]
    async fn test_enter_fallback_still_clicks_when_control_resolves() {
        let driver = MockDriver::new(vec![Some("in"), Some("btn")]);
        let outcome = fast()
            .deliver(&driver, &profile(SubmitTechnique::EnterKeyFallback), "x")
            .await
            .unwrap();
        assert_eq!(outcome.via, SubmitRoute::Click);
        assert_eq!(driver.count("press_enter:"), 0);
    }

    #[tokio::test]
    async fn test_stale_insert_surfaces_not_found() {
        let mut driver = MockDriver::new(vec![Some("in"), Some("btn")]);
        driver.insert_ok = false;
        let err = fast()
            .deliver(&driver, &profile(SubmitTechnique::Click), "x")
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::NotFound(_)));
    }

    fn capability(enabled: bool) -> Capability {
        Capability {
            id: "search".into(),
            name: "Search".into(),
            label: "Search".into(),
            selector: ".toggle".into(),
            enabled,
        }
    }

    #[tokio::test]
    async fn test_capability_clicked_only_on_mismatch() {
        let driver = MockDriver::new(vec![Some("in"), Some("btn")]);
        driver.probe_answers.lock().unwrap().push(Some(CapabilityProbe {
            element: ElementRef::new("cap"),
            active: false,
        }));
        let mut profile = profile(SubmitTechnique::Click);
        profile.capabilities = vec![capability(true)];
        fast().deliver(&driver, &profile, "x").await.unwrap();
        assert_eq!(driver.count("click:cap"), 1);
    }

    #[tokio::test]
    async fn test_capability_in_desired_state_is_left_alone() {
        let driver = MockDriver::new(vec![Some("in"), Some("btn")]);
        driver.probe_answers.lock().unwrap().push(Some(CapabilityProbe {
            element: ElementRef::new("cap"),
            active: true,
        }));
        let mut profile = profile(SubmitTechnique::Click);
        profile.capabilities = vec![capability(true)];
        fast().deliver(&driver, &profile, "x").await.unwrap();
        assert_eq!(driver.count("click:cap"), 0);
        // The submit click still happens.
        assert_eq!(driver.count("click:btn"), 1);
    }

    #[tokio::test]
    async fn test_absent_capability_never_blocks_delivery() {
        let driver = MockDriver::new(vec![Some("in"), Some("btn")]);
        let mut profile = profile(SubmitTechnique::Click);
        profile.capabilities = vec![capability(true)];
        let outcome = fast().deliver(&driver, &profile, "x").await.unwrap();
        assert_eq!(outcome.via, SubmitRoute::Click);
        assert!(driver.count("probe:search") >= 1);
    }

    #[tokio::test]
    async fn test_capabilities_reconciled_after_insert_before_submit_wait() {
        let driver = MockDriver::new(vec![Some("in"), Some("btn")]);
        driver.probe_answers.lock().unwrap().push(Some(CapabilityProbe {
            element: ElementRef::new("cap"),
            active: true,
        }));
        let mut profile = profile(SubmitTechnique::Click);
        profile.capabilities = vec![capability(true)];
        fast().deliver(&driver, &profile, "x").await.unwrap();
        let calls = driver.calls();
        let insert = calls.iter().position(|c| c.starts_with("insert:")).unwrap();
        let probe = calls.iter().position(|c| c.starts_with("probe:")).unwrap();
        let submit_wait = calls.iter().position(|c| c == "wait:#send").unwrap();
        assert!(insert < probe && probe < submit_wait);
    }
}
