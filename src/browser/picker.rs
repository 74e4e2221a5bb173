//! Interactive selector inference: a pick overlay injected into the live
//! page, candidate synthesis, and round-trip verification.
//!
//! The pick session is start-then-poll: one script installs a dimmed
//! backdrop, an instruction banner with a Cancel button, and a hover
//! highlight, then returns immediately, parking the eventual result on a
//! window-scoped state object. Rust polls that state with short evaluates,
//! so the session can outlive any single CDP request and ends only when
//! the user selects, cancels, or the page is torn down. Text inputs are
//! selected on hover (a real click into a composer could submit or steal
//! focus); submit buttons are selected by a click that is swallowed before
//! the page can react. The picked element is tagged with a one-shot
//! `data-relay-pick` token and described structurally; synthesis and
//! scoring then happen in Rust, and every synthesized selector is verified
//! against the live page before it is trusted.

use std::time::Duration;

use anyhow::{Context, Result};
use chromiumoxide::page::Page;
use serde::Deserialize;
use tracing::debug;

use crate::browser::selector::{best_candidate, candidate_selectors, AutoCandidate, ElementDescriptor};
use crate::browser::waiter::js_string;
use crate::profiles::SelectorKind;

/// Attribute used to mark pick candidates for verification.
pub const PICK_ATTRIBUTE: &str = "data-relay-pick";

/// How often the pick session state is polled.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// An inferred selector plus how confident the inference is. Interactive
/// picks are always 1.0; auto-detection reports its feature coverage.
#[derive(Debug, Clone)]
pub struct Inference {
    pub selector: String,
    pub confidence: f64,
}

/// One poll of a pick session. `missing` means the window state vanished,
/// which only happens when the page navigated mid-pick.
#[derive(Debug, Deserialize)]
struct PickPoll {
    done: bool,
    #[serde(default)]
    missing: bool,
    #[serde(default)]
    result: Option<ElementDescriptor>,
}

fn candidate_matcher(kind: SelectorKind) -> &'static str {
    match kind {
        // Known rich-editor classes included so hovering Quill, Lexical and
        // similar editors matches the editable root, not an inner span.
        SelectorKind::TextArea => {
            r#"'textarea, [contenteditable="true"], [contenteditable=""], [role="textbox"], .ql-editor, [data-lexical-editor], .yc-editor'"#
        }
        SelectorKind::SubmitButton => {
            r#"'button, [role="button"], input[type="submit"], [type="submit"]'"#
        }
    }
}

fn banner_text(kind: SelectorKind) -> &'static str {
    match kind {
        SelectorKind::TextArea => "Hover over the message input to select it.",
        SelectorKind::SubmitButton => "Click the send button to select it.",
    }
}

/// Build the script that starts a pick session. Returns immediately after
/// installing the overlay; the outcome lands on `window.__relayPicks` under
/// `token`, with `result` null on cancel.
pub fn pick_script(kind: SelectorKind, token: &str) -> String {
    let matcher = candidate_matcher(kind);
    let banner = js_string(banner_text(kind));
    let token = js_string(token);
    let hover_selects = matches!(kind, SelectorKind::TextArea);
    format!(
        r#"(() => {{
  const matcher = {matcher};
  const hoverSelects = {hover_selects};
  window.__relayPicks = window.__relayPicks || {{}};
  const state = {{ done: false, result: null }};
  window.__relayPicks[{token}] = state;

  const backdrop = document.createElement('div');
  backdrop.style.cssText = 'position:fixed;inset:0;z-index:2147483646;' +
    'background:rgba(0,0,0,0.25);pointer-events:none;';
  const banner = document.createElement('div');
  banner.style.cssText = 'position:fixed;top:12px;left:50%;transform:translateX(-50%);' +
    'z-index:2147483647;background:#1a1a2e;color:#fff;padding:8px 16px;' +
    'border-radius:6px;font:13px sans-serif;display:flex;gap:12px;align-items:center;';
  const label = document.createElement('span');
  label.textContent = {banner};
  const cancel = document.createElement('button');
  cancel.textContent = 'Cancel';
  cancel.style.cssText = 'background:#e94560;color:#fff;border:none;' +
    'border-radius:4px;padding:2px 10px;font:inherit;cursor:pointer;';
  banner.appendChild(label);
  banner.appendChild(cancel);
  document.documentElement.appendChild(backdrop);
  document.documentElement.appendChild(banner);

  let marked = null;
  let savedOutline = '';
  const mark = (el) => {{
    if (marked === el) return;
    unmark();
    marked = el;
    savedOutline = el.style.outline;
    el.style.outline = '2px solid #e94560';
  }};
  const unmark = () => {{
    if (!marked) return;
    marked.style.outline = savedOutline;
    marked = null;
  }};
  const target = (event) => {{
    if (banner.contains(event.target)) return null;
    return event.target && event.target.closest ? event.target.closest(matcher) : null;
  }};
  const describe = (el) => {{
    const attributes = {{}};
    for (const name of ['data-testid', 'aria-label', 'name', 'role', 'placeholder', 'type']) {{
      const value = el.getAttribute(name);
      if (value) attributes[name] = value;
    }}
    const path = [];
    let node = el.parentElement;
    for (let depth = 0; node && node !== document.body && depth < 3; depth++) {{
      path.unshift({{
        tag: node.tagName.toLowerCase(),
        id: node.id || null,
        class: node.classList.length ? node.classList[0] : null
      }});
      node = node.parentElement;
    }}
    return {{
      tag: el.tagName.toLowerCase(),
      id: el.id || null,
      classes: Array.from(el.classList),
      attributes,
      path
    }};
  }};
  const finish = (result) => {{
    unmark();
    backdrop.remove();
    banner.remove();
    document.removeEventListener('mouseover', onHover, true);
    document.removeEventListener('click', onClick, true);
    document.removeEventListener('keydown', onKey, true);
    state.result = result;
    state.done = true;
  }};
  const select = (el) => {{
    el.setAttribute('{pick_attr}', {token});
    finish(describe(el));
  }};
  const onHover = (event) => {{
    const el = target(event);
    if (!el) {{ unmark(); return; }}
    mark(el);
    if (hoverSelects) select(el);
  }};
  const onClick = (event) => {{
    if (event.target === cancel) {{
      event.preventDefault();
      event.stopImmediatePropagation();
      finish(null);
      return;
    }}
    const el = target(event);
    if (!el) return;
    event.preventDefault();
    event.stopImmediatePropagation();
    if (!hoverSelects) select(el);
  }};
  const onKey = (event) => {{
    if (event.key !== 'Escape') return;
    event.preventDefault();
    finish(null);
  }};
  document.addEventListener('mouseover', onHover, true);
  document.addEventListener('click', onClick, true);
  document.addEventListener('keydown', onKey, true);
  return true;
}})()"#,
        pick_attr = PICK_ATTRIBUTE,
    )
}

/// Poll a pick session. Consumes the state entry once the session is done;
/// reports `missing` when the entry is gone entirely.
pub fn poll_pick_script(token: &str) -> String {
    let token = js_string(token);
    format!(
        r#"(() => {{
  const picks = window.__relayPicks || {{}};
  const state = picks[{token}];
  if (!state) return {{ done: false, missing: true, result: null }};
  if (!state.done) return {{ done: false, missing: false, result: null }};
  delete picks[{token}];
  return {{ done: true, missing: false, result: state.result }};
}})()"#
    )
}

/// True only when `candidate` matches exactly one element and that element
/// is the one carrying `token`.
pub fn verify_script(candidate: &str, token: &str) -> String {
    let candidate = js_string(candidate);
    let token = js_string(token);
    format!(
        r#"(() => {{
  let matches;
  try {{ matches = document.querySelectorAll({candidate}); }} catch (e) {{ return false; }}
  return matches.length === 1 && matches[0].getAttribute('{pick_attr}') === {token};
}})()"#,
        pick_attr = PICK_ATTRIBUTE,
    )
}

/// Collect every pick candidate on the page with its feature vector, in
/// document order, each tagged `<prefix>-<index>` for later verification.
///
/// The feature order is fixed and shared with the scorer: visibility,
/// viewport presence, lower-half placement, size or labeling cues, and an
/// enabled state. Descriptors carry the same ancestor chain the interactive
/// pick captures, so path-based synthesis works for both.
pub fn auto_probe_script(kind: SelectorKind, token_prefix: &str) -> String {
    let matcher = candidate_matcher(kind);
    let prefix = js_string(token_prefix);
    let kind_features = match kind {
        SelectorKind::TextArea => {
            r#"[
      visible,
      inViewport,
      lowerHalf,
      rect.width * rect.height > 5000,
      !!(el.getAttribute('placeholder') || el.getAttribute('aria-label')),
      !el.disabled && el.getAttribute('aria-disabled') !== 'true'
    ]"#
        }
        SelectorKind::SubmitButton => {
            r#"[
      visible,
      inViewport,
      lowerHalf,
      /send|submit|发送/i.test((el.getAttribute('aria-label') || '') + ' ' +
        (el.getAttribute('data-testid') || '') + ' ' + (el.textContent || '').trim()),
      !!el.querySelector('svg'),
      !el.disabled && el.getAttribute('aria-disabled') !== 'true'
    ]"#
        }
    };
    format!(
        r#"(() => {{
  const matcher = {matcher};
  const candidates = Array.from(document.querySelectorAll(matcher)).slice(0, 20);
  return candidates.map((el, index) => {{
    el.setAttribute('{pick_attr}', {prefix} + '-' + index);
    const rect = el.getBoundingClientRect();
    const visible = rect.width > 0 && rect.height > 0;
    const inViewport = rect.bottom > 0 && rect.top < window.innerHeight;
    const lowerHalf = rect.top > window.innerHeight / 2;
    const attributes = {{}};
    for (const name of ['data-testid', 'aria-label', 'name', 'role', 'placeholder', 'type']) {{
      const value = el.getAttribute(name);
      if (value) attributes[name] = value;
    }}
    const path = [];
    let node = el.parentElement;
    for (let depth = 0; node && node !== document.body && depth < 3; depth++) {{
      path.unshift({{
        tag: node.tagName.toLowerCase(),
        id: node.id || null,
        class: node.classList.length ? node.classList[0] : null
      }});
      node = node.parentElement;
    }}
    return {{
      descriptor: {{
        tag: el.tagName.toLowerCase(),
        id: el.id || null,
        classes: Array.from(el.classList),
        attributes,
        path
      }},
      features: {kind_features}
    }};
  }});
}})()"#,
        pick_attr = PICK_ATTRIBUTE,
    )
}

/// Remove every pick mark left behind by an inference pass.
pub fn clear_marks_script() -> String {
    format!(
        r#"(() => {{
  for (const el of document.querySelectorAll('[{pick_attr}]')) {{
    el.removeAttribute('{pick_attr}');
  }}
  return true;
}})()"#,
        pick_attr = PICK_ATTRIBUTE,
    )
}

async fn verify(page: &Page, candidate: &str, token: &str) -> Result<bool> {
    page.evaluate(verify_script(candidate, token))
        .await
        .context("Selector verification failed")?
        .into_value()
        .context("Verification script did not return a boolean")
}

async fn clear_marks(page: &Page) {
    // Cleanup only; the page may have navigated away by now.
    let _ = page.evaluate(clear_marks_script()).await;
}

/// Run an interactive pick and return the first synthesized selector that
/// uniquely round-trips on the live page. `None` when the user cancelled or
/// nothing synthesizable survives verification. The wait for the user is
/// open-ended; only selection, cancel, or losing the page ends it.
pub async fn infer(page: &Page, kind: SelectorKind) -> Result<Option<Inference>> {
    let token = uuid::Uuid::new_v4().simple().to_string();
    page.evaluate(pick_script(kind, &token))
        .await
        .context("Failed to start pick overlay")?;

    let descriptor = loop {
        tokio::time::sleep(POLL_INTERVAL).await;
        let poll: PickPoll = page
            .evaluate(poll_pick_script(&token))
            .await
            .context("Pick poll failed")?
            .into_value()
            .context("Pick poll returned an unexpected shape")?;
        if poll.missing {
            anyhow::bail!("Pick session lost; the page navigated away");
        }
        if poll.done {
            break poll.result;
        }
    };
    let Some(descriptor) = descriptor else {
        debug!(?kind, "pick cancelled");
        return Ok(None);
    };

    let mut chosen = None;
    for candidate in candidate_selectors(&descriptor) {
        if verify(page, &candidate, &token).await? {
            debug!(?kind, selector = %candidate, "selector verified");
            chosen = Some(Inference {
                selector: candidate,
                confidence: 1.0,
            });
            break;
        }
    }
    clear_marks(page).await;
    Ok(chosen)
}

/// Unsupervised detection: score every candidate on the page and verify a
/// selector for the winner. `None` when nothing plausible was found.
pub async fn auto_detect(page: &Page, kind: SelectorKind) -> Result<Option<Inference>> {
    let prefix = uuid::Uuid::new_v4().simple().to_string();
    let candidates: Vec<AutoCandidate> = page
        .evaluate(auto_probe_script(kind, &prefix))
        .await
        .context("Auto-detect probe failed")?
        .into_value()
        .context("Auto-detect probe returned an unexpected shape")?;
    let Some((winner, confidence)) = best_candidate(&candidates) else {
        clear_marks(page).await;
        return Ok(None);
    };
    let index = candidates
        .iter()
        .position(|c| std::ptr::eq(c, winner))
        .unwrap_or(0);
    let token = format!("{prefix}-{index}");

    let mut chosen = None;
    for candidate in candidate_selectors(&winner.descriptor) {
        if verify(page, &candidate, &token).await? {
            debug!(?kind, selector = %candidate, confidence, "auto-detected selector");
            chosen = Some(Inference {
                selector: candidate,
                confidence,
            });
            break;
        }
    }
    clear_marks(page).await;
    Ok(chosen)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pick_script_returns_immediately_and_parks_state() {
        let script = pick_script(SelectorKind::TextArea, "tok");
        // No promise: the session outcome lives on window state so no
        // single CDP request has to outlast the user's decision.
        assert!(!script.contains("new Promise"));
        assert!(script.contains("window.__relayPicks[\"tok\"] = state"));
        assert!(script.contains("state.done = true"));
        assert!(script.trim_end().ends_with("})()"));
        assert!(script.contains("return true;"));
    }

    #[test]
    fn test_poll_script_consumes_finished_state() {
        let script = poll_pick_script("tok");
        assert!(script.contains("delete picks[\"tok\"]"));
        assert!(script.contains("done: true"));
        // A vanished entry is reported distinctly from a pending one.
        assert!(script.contains("missing: true"));
        assert!(script.contains("if (!state.done) return { done: false, missing: false"));
    }

    #[test]
    fn test_button_pick_swallows_the_selecting_click() {
        let script = pick_script(SelectorKind::SubmitButton, "tok");
        assert!(script.contains("const hoverSelects = false"));
        assert!(script.contains("event.preventDefault()"));
        assert!(script.contains("event.stopImmediatePropagation()"));
        // Listeners are registered in the capture phase.
        assert!(script.contains("addEventListener('click', onClick, true)"));
    }

    #[test]
    fn test_text_input_pick_selects_on_hover() {
        let script = pick_script(SelectorKind::TextArea, "tok");
        assert!(script.contains("const hoverSelects = true"));
        assert!(script.contains("if (hoverSelects) select(el)"));
    }

    #[test]
    fn test_pick_script_tags_before_describing() {
        let script = pick_script(SelectorKind::TextArea, "tok");
        let tag = script.find("setAttribute('data-relay-pick'").unwrap();
        let describe = script.find("finish(describe(el))").unwrap();
        assert!(tag < describe);
    }

    #[test]
    fn test_pick_script_cleans_up_on_every_path() {
        let script = pick_script(SelectorKind::TextArea, "tok");
        // Overlay removal and listener teardown live in the shared finish().
        assert_eq!(script.matches("backdrop.remove()").count(), 1);
        assert_eq!(script.matches("banner.remove()").count(), 1);
        assert_eq!(script.matches("removeEventListener").count(), 3);
        // Cancel button and Escape both resolve null through it.
        assert_eq!(script.matches("finish(null)").count(), 2);
    }

    #[test]
    fn test_overlay_backdrop_never_intercepts_events() {
        let script = pick_script(SelectorKind::SubmitButton, "tok");
        assert!(script.contains("pointer-events:none"));
        assert!(script.contains("rgba(0,0,0,0.25)"));
    }

    #[test]
    fn test_matchers_differ_by_kind() {
        let text = pick_script(SelectorKind::TextArea, "t");
        let button = pick_script(SelectorKind::SubmitButton, "t");
        assert!(text.contains("contenteditable"));
        assert!(text.contains("textarea"));
        assert!(text.contains(".ql-editor"));
        assert!(text.contains("[data-lexical-editor]"));
        assert!(button.contains("[role=\"button\"]"));
        assert!(button.contains("input[type=\"submit\"]"));
    }

    #[test]
    fn test_verify_requires_unique_match_and_token() {
        let script = verify_script("#composer", "tok");
        assert!(script.contains("matches.length === 1"));
        assert!(script.contains("getAttribute('data-relay-pick') === \"tok\""));
        // An invalid synthesized selector must fail closed, not throw.
        assert!(script.contains("catch (e) { return false; }"));
    }

    #[test]
    fn test_auto_probe_tags_candidates_by_index() {
        let script = auto_probe_script(SelectorKind::TextArea, "pfx");
        assert!(script.contains("\"pfx\" + '-' + index"));
        assert!(script.contains(".slice(0, 20)"));
    }

    #[test]
    fn test_auto_probe_captures_ancestor_path() {
        for kind in [SelectorKind::TextArea, SelectorKind::SubmitButton] {
            let script = auto_probe_script(kind, "p");
            // Same three-level chain as the interactive describe(), so the
            // path-based selector fallback fires for auto-detection too.
            assert!(script.contains("path.unshift"), "{kind:?}");
            assert!(script.contains("depth < 3"), "{kind:?}");
            assert!(!script.contains("path: []"), "{kind:?}");
        }
    }

    #[test]
    fn test_auto_probe_feature_vectors_share_length() {
        for kind in [SelectorKind::TextArea, SelectorKind::SubmitButton] {
            let script = auto_probe_script(kind, "p");
            assert_eq!(script.matches("lowerHalf").count(), 2, "{kind:?}");
            assert!(script.contains("aria-disabled"));
        }
    }

    #[test]
    fn test_clear_marks_targets_only_pick_attribute() {
        let script = clear_marks_script();
        assert!(script.contains("[data-relay-pick]"));
        assert!(script.contains("removeAttribute('data-relay-pick')"));
    }
}
