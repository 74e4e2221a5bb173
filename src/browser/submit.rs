//! Submission triggers, one per submit technique, plus the capability
//! probe used for toggle reconciliation.

use crate::browser::waiter::{js_string, ElementRef};
use crate::models::Capability;

/// Single programmatic click on the resolved control.
pub fn click_script(control: &ElementRef) -> String {
    let selector = js_string(&control.selector());
    format!(
        r#"(() => {{
  const el = document.querySelector({selector});
  if (!el) return false;
  el.click();
  return true;
}})()"#
    )
}

/// mousedown, mouseup, click in order, for sites whose handler listens to
/// the lower-level pointer sequence rather than a synthesized click.
pub fn multi_phase_click_script(control: &ElementRef) -> String {
    let selector = js_string(&control.selector());
    format!(
        r#"(() => {{
  const el = document.querySelector({selector});
  if (!el) return false;
  for (const type of ['mousedown', 'mouseup', 'click']) {{
    el.dispatchEvent(new MouseEvent(type, {{
      bubbles: true,
      cancelable: true,
      view: window
    }}));
  }}
  return true;
}})()"#
    )
}

/// Synthetic Enter keydown against the text element, used when the submit
/// control never resolved under the enter-key fallback technique.
pub fn enter_key_script(input: &ElementRef) -> String {
    let selector = js_string(&input.selector());
    format!(
        r#"(() => {{
  const el = document.querySelector({selector});
  if (!el) return false;
  el.dispatchEvent(new KeyboardEvent('keydown', {{
    key: 'Enter',
    code: 'Enter',
    keyCode: 13,
    which: 13,
    bubbles: true,
    cancelable: true
  }}));
  return true;
}})()"#
    )
}

/// One-shot capability probe: find the toggle by selector plus visible
/// label text, tag it, and report its current on/off state.
///
/// State detection is the generic rule: `aria-pressed`/`aria-checked` true,
/// or an active-looking class on the control or its parent. Site-specific
/// heuristics beyond this are not modeled; for unlisted sites the generic
/// rule is a best effort.
pub fn capability_probe_script(cap: &Capability, element_ref: &ElementRef) -> String {
    let selector = js_string(&cap.selector);
    let label = js_string(&cap.label);
    let token = js_string(element_ref.token());
    format!(
        r#"(() => {{
  const label = {label};
  const candidates = Array.from(document.querySelectorAll({selector}));
  const target = candidates.find((el) => {{
    const text = (el.textContent || '').trim();
    if (label && !text.includes(label)) return false;
    const rect = el.getBoundingClientRect();
    return rect.width > 0 && rect.height > 0;
  }});
  if (!target) return null;
  target.setAttribute('data-relay-ref', {token});
  const flagged = (el) => el && el.classList &&
    Array.from(el.classList).some((c) => /(^|[-_])(active|checked|selected|on)$/.test(c));
  const pressed = target.getAttribute('aria-pressed') === 'true'
    || target.getAttribute('aria-checked') === 'true';
  return {{ active: pressed || flagged(target) || flagged(target.parentElement) }};
}})()"#
    )
}
