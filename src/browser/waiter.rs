//! Element waiter: resolve a selector against a live, externally-mutating
//! document, optionally gated by a readiness predicate.
//!
//! The wait runs inside the target page as a generated promise script: an
//! immediate probe, then a MutationObserver over the whole subtree that
//! re-probes on every notification batch, with a deadline timer resolving
//! `null`. Exactly one resolution path fires and the observer is torn down
//! on success and on timeout alike. On success the matched element is
//! tagged with a unique `data-relay-ref` token so later actions can re-probe
//! it freshly instead of caching a node across waits.

use std::time::Duration;

use crate::models::ReadinessCheck;

/// Attribute used to hand resolved elements back to the driver.
pub const REF_ATTRIBUTE: &str = "data-relay-ref";

/// One outstanding "wait for element" request.
#[derive(Debug, Clone)]
pub struct WaitSpec {
    pub selector: String,
    pub readiness: Option<ReadinessCheck>,
    pub timeout: Duration,
}

impl WaitSpec {
    pub fn new(selector: impl Into<String>, timeout: Duration) -> Self {
        Self {
            selector: selector.into(),
            readiness: None,
            timeout,
        }
    }

    pub fn with_readiness(
        selector: impl Into<String>,
        readiness: Option<ReadinessCheck>,
        timeout: Duration,
    ) -> Self {
        Self {
            selector: selector.into(),
            readiness,
            timeout,
        }
    }
}

/// Handle to an element resolved by a wait: a selector over the tag
/// attribute, valid for fresh re-probes until the page discards the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementRef {
    token: String,
}

impl ElementRef {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    /// Fresh token for tagging a newly resolved element.
    pub fn generate() -> Self {
        Self::new(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// CSS selector that re-locates the tagged element.
    pub fn selector(&self) -> String {
        format!("[{}='{}']", REF_ATTRIBUTE, self.token)
    }
}

/// JS predicate source for a readiness check, bound as `(el) => bool`.
pub fn readiness_predicate(check: &ReadinessCheck) -> String {
    match check {
        ReadinessCheck::NativeDisabled => "(el) => !el.disabled".to_string(),
        ReadinessCheck::AriaDisabled => {
            "(el) => el.getAttribute('aria-disabled') !== 'true'".to_string()
        }
        ReadinessCheck::AncestorClass {
            container,
            class_name,
        } => format!(
            "(el) => {{ const c = el.closest({container}); return !(c && c.classList.contains({class})); }}",
            container = js_string(container),
            class = js_string(class_name),
        ),
    }
}

/// Build the promise script for one wait. Resolves `true` after tagging the
/// first matching+ready element, `false` at the deadline.
pub fn wait_script(spec: &WaitSpec, element_ref: &ElementRef) -> String {
    let selector = js_string(&spec.selector);
    let token = js_string(element_ref.token());
    let ready = spec
        .readiness
        .as_ref()
        .map(|check| readiness_predicate(check))
        .unwrap_or_else(|| "() => true".to_string());
    let timeout_ms = spec.timeout.as_millis();

    format!(
        r#"(() => new Promise((resolve) => {{
  const ready = {ready};
  const probe = () => {{
    const el = document.querySelector({selector});
    if (!el) return null;
    if (!ready(el)) return null;
    return el;
  }};
  let observer = null;
  let timer = null;
  const settle = (el) => {{
    if (timer !== null) {{ clearTimeout(timer); timer = null; }}
    if (observer !== null) {{ observer.disconnect(); observer = null; }}
    if (el) {{
      el.setAttribute('{ref_attr}', {token});
      resolve(true);
    }} else {{
      resolve(false);
    }}
  }};
  const first = probe();
  if (first) {{ settle(first); return; }}
  timer = setTimeout(() => settle(null), {timeout_ms});
  const subscribe = () => {{
    observer = new MutationObserver(() => {{
      const el = probe();
      if (el) settle(el);
    }});
    observer.observe(document.body, {{ childList: true, subtree: true, attributes: true }});
  }};
  if (document.body) {{
    subscribe();
  }} else {{
    document.addEventListener('DOMContentLoaded', () => {{
      if (timer === null) return;
      const el = probe();
      if (el) {{ settle(el); return; }}
      subscribe();
    }});
  }}
}}))()"#,
        ready = ready,
        selector = selector,
        ref_attr = REF_ATTRIBUTE,
        token = token,
        timeout_ms = timeout_ms,
    )
}

/// JSON-encode a string for safe embedding in generated JS.
pub fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_ref_selector_shape() {
        let el = ElementRef::new("abc123");
        assert_eq!(el.selector(), "[data-relay-ref='abc123']");
    }

    #[test]
    fn test_generated_tokens_are_unique() {
        assert_ne!(ElementRef::generate().token(), ElementRef::generate().token());
    }

    #[test]
    fn test_wait_script_embeds_selector_and_deadline() {
        let spec = WaitSpec::new("#prompt-textarea", Duration::from_secs(10));
        let el = ElementRef::new("t1");
        let script = wait_script(&spec, &el);
        assert!(script.contains("\"#prompt-textarea\""));
        assert!(script.contains("setTimeout(() => settle(null), 10000)"));
        assert!(script.contains("data-relay-ref"));
    }

    #[test]
    fn test_wait_script_single_teardown_path() {
        let spec = WaitSpec::new("button", Duration::from_secs(5));
        let script = wait_script(&spec, &ElementRef::new("t"));
        // Observer teardown and timer clearing happen only inside settle().
        assert_eq!(script.matches("observer.disconnect()").count(), 1);
        assert_eq!(script.matches("clearTimeout").count(), 1);
        // Both probing paths funnel through the same settle().
        assert!(script.contains("settle(first)"));
        assert!(script.contains("settle(null)"));
    }

    #[test]
    fn test_wait_script_defers_subscription_until_body_exists() {
        let spec = WaitSpec::new("div", Duration::from_secs(1));
        let script = wait_script(&spec, &ElementRef::new("t"));
        assert!(script.contains("if (document.body)"));
        assert!(script.contains("DOMContentLoaded"));
    }

    #[test]
    fn test_readiness_native_disabled() {
        let js = readiness_predicate(&ReadinessCheck::NativeDisabled);
        assert_eq!(js, "(el) => !el.disabled");
    }

    #[test]
    fn test_readiness_aria_disabled_compares_literal_true() {
        let js = readiness_predicate(&ReadinessCheck::AriaDisabled);
        assert!(js.contains("aria-disabled"));
        assert!(js.contains("!== 'true'"));
    }

    #[test]
    fn test_readiness_ancestor_class_uses_closest() {
        let js = readiness_predicate(&ReadinessCheck::AncestorClass {
            container: ".send-button-container".into(),
            class_name: "disabled".into(),
        });
        assert!(js.contains("closest(\".send-button-container\")"));
        assert!(js.contains("classList.contains(\"disabled\")"));
    }

    #[test]
    fn test_no_readiness_accepts_any_match() {
        let spec = WaitSpec::new("textarea", Duration::from_secs(1));
        let script = wait_script(&spec, &ElementRef::new("t"));
        assert!(script.contains("const ready = () => true;"));
    }

    #[test]
    fn test_js_string_escapes_quotes() {
        assert_eq!(js_string(r#"a"b"#), r#""a\"b""#);
    }
}
