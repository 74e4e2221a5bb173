//! Text-insertion strategies, one per editor kind.
//!
//! Each strategy is a generated script run against a previously resolved
//! element ref. The scripts re-probe the element by its tag selector at
//! execution time (no cached node), return `false` when it has gone stale,
//! and raise the notifications the host page's framework listens for.

use crate::browser::waiter::{js_string, ElementRef};
use crate::models::EditorKind;

/// Strip raw angle brackets so inserted text can never be interpreted as
/// markup by a naive consumer downstream.
pub fn sanitize_text(text: &str) -> String {
    text.chars().filter(|c| *c != '<' && *c != '>').collect()
}

/// Build the insertion script for `kind`. `text` is sanitized here so the
/// guarantee holds for every strategy.
pub fn insert_script(element: &ElementRef, kind: EditorKind, text: &str) -> String {
    let selector = js_string(&element.selector());
    let text = js_string(&sanitize_text(text));
    match kind {
        EditorKind::PlainValue => plain_value(&selector, &text),
        EditorKind::RichInnerHtml => rich_inner_html(&selector, &text),
        EditorKind::ExecCommand => exec_command(&selector, &text),
    }
}

fn plain_value(selector: &str, text: &str) -> String {
    format!(
        r#"(() => {{
  const el = document.querySelector({selector});
  if (!el) return false;
  el.value = {text};
  el.dispatchEvent(new Event('input', {{ bubbles: true }}));
  el.dispatchEvent(new Event('change', {{ bubbles: true }}));
  return true;
}})()"#
    )
}

fn rich_inner_html(selector: &str, text: &str) -> String {
    format!(
        r#"(() => {{
  const el = document.querySelector({selector});
  if (!el) return false;
  const p = document.createElement('p');
  p.textContent = {text};
  el.replaceChildren(p);
  el.dispatchEvent(new InputEvent('input', {{
    bubbles: true,
    cancelable: true,
    inputType: 'insertText',
    data: {text}
  }}));
  return true;
}})()"#
    )
}

fn exec_command(selector: &str, text: &str) -> String {
    format!(
        r#"(() => {{
  const el = document.querySelector({selector});
  if (!el) return false;
  el.focus();
  document.execCommand('insertText', false, {text});
  if (!el.textContent) {{
    const p = document.createElement('p');
    p.textContent = {text};
    el.replaceChildren(p);
  }}
  for (const type of ['input', 'change']) {{
    el.dispatchEvent(new Event(type, {{ bubbles: true }}));
  }}
  for (const type of ['keydown', 'keyup']) {{
    el.dispatchEvent(new KeyboardEvent(type, {{ bubbles: true }}));
  }}
  return true;
}})()"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn el() -> ElementRef {
        ElementRef::new("tok")
    }

    #[test]
    fn test_sanitize_strips_angle_brackets() {
        assert_eq!(
            sanitize_text("<script>alert(1)</script>"),
            "scriptalert(1)/script"
        );
        assert_eq!(sanitize_text("plain text"), "plain text");
    }

    #[test]
    fn test_every_strategy_sanitizes() {
        for kind in [
            EditorKind::PlainValue,
            EditorKind::RichInnerHtml,
            EditorKind::ExecCommand,
        ] {
            let script = insert_script(&el(), kind, "<script>x</script>");
            assert!(
                !script.contains("<script>"),
                "{:?} leaked markup into the page script",
                kind
            );
        }
    }

    #[test]
    fn test_plain_value_is_assignment_not_append() {
        let script = insert_script(&el(), EditorKind::PlainValue, "hello");
        // Straight assignment keeps repeated inserts idempotent.
        assert!(script.contains("el.value = \"hello\""));
        assert!(!script.contains("el.value +="));
        assert!(script.contains("new Event('input'"));
        assert!(script.contains("new Event('change'"));
    }

    #[test]
    fn test_rich_inner_html_uses_text_content() {
        let script = insert_script(&el(), EditorKind::RichInnerHtml, "hi & bye");
        assert!(script.contains("p.textContent ="));
        assert!(!script.contains("innerHTML"));
        assert!(script.contains("inputType: 'insertText'"));
        assert!(script.contains("data: \"hi & bye\""));
    }

    #[test]
    fn test_exec_command_has_replace_fallback_and_key_events() {
        let script = insert_script(&el(), EditorKind::ExecCommand, "hi");
        assert!(script.contains("document.execCommand('insertText', false, \"hi\")"));
        assert!(script.contains("if (!el.textContent)"));
        assert!(script.contains("'keydown', 'keyup'"));
        assert!(script.contains("'input', 'change'"));
    }

    #[test]
    fn test_scripts_reprobe_by_ref_selector() {
        let script = insert_script(&el(), EditorKind::PlainValue, "x");
        assert!(script.contains("document.querySelector(\"[data-relay-ref='tok']\")"));
        assert!(script.contains("if (!el) return false;"));
    }

    #[test]
    fn test_text_is_json_encoded_for_embedding() {
        let script = insert_script(&el(), EditorKind::PlainValue, "line\n\"quoted\"");
        assert!(script.contains(r#""line\n\"quoted\"""#));
    }
}
