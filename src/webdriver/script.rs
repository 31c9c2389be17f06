//! Script injected through `execute/sync`
//!
//! One script serves every lookup. `arguments[0].op` selects the operation:
//! - `collect`: candidates for `arguments[0].query` with their state
//! - `frames`: iframe elements matching `arguments[0].css`
//! - `select`: choose `arguments[0].option` in the `<select>` `arguments[1]`
//!
//! Roles and accessible names follow the common HTML mappings; it is an
//! approximation of the accessibility tree, not a full implementation.

use serde_json::{json, Value};

use crate::browser::{By, Selector};
use crate::common::{Error, Result};

pub const PAGE_SCRIPT: &str = r##"
const req = arguments[0];

const isVisible = (el) => {
  const style = window.getComputedStyle(el);
  if (style.visibility === 'hidden' || style.display === 'none') return false;
  const rect = el.getBoundingClientRect();
  return rect.width > 0 && rect.height > 0;
};

const hiddenFromTree = (el) => {
  for (let n = el; n; n = n.parentElement) {
    if (n.getAttribute('aria-hidden') === 'true') return true;
    if (window.getComputedStyle(n).display === 'none') return true;
  }
  return window.getComputedStyle(el).visibility === 'hidden';
};

const implicitRole = (el) => {
  const tag = el.tagName.toLowerCase();
  const type = (el.getAttribute('type') || '').toLowerCase();
  switch (tag) {
    case 'a': case 'area': return el.hasAttribute('href') ? 'link' : null;
    case 'button': return 'button';
    case 'h1': case 'h2': case 'h3': case 'h4': case 'h5': case 'h6': return 'heading';
    case 'input':
      if (['button', 'submit', 'reset', 'image'].includes(type)) return 'button';
      if (type === 'checkbox') return 'checkbox';
      if (type === 'radio') return 'radio';
      if (type === 'range') return 'slider';
      if (type === 'number') return 'spinbutton';
      if (type === 'search') return el.hasAttribute('list') ? 'combobox' : 'searchbox';
      if (['', 'text', 'email', 'tel', 'url'].includes(type)) return el.hasAttribute('list') ? 'combobox' : 'textbox';
      return null;
    case 'textarea': return 'textbox';
    case 'select': return (el.multiple || el.size > 1) ? 'listbox' : 'combobox';
    case 'option': return 'option';
    case 'img': return el.getAttribute('alt') === '' ? 'presentation' : 'img';
    case 'nav': return 'navigation';
    case 'main': return 'main';
    case 'form': return 'form';
    case 'ul': case 'ol': return 'list';
    case 'li': return 'listitem';
    case 'table': return 'table';
    case 'dialog': return 'dialog';
    case 'article': return 'article';
    case 'aside': return 'complementary';
    case 'header': return el.closest('article, aside, main, nav, section') ? null : 'banner';
    case 'footer': return el.closest('article, aside, main, nav, section') ? null : 'contentinfo';
    case 'section': return (el.hasAttribute('aria-label') || el.hasAttribute('aria-labelledby')) ? 'region' : null;
  }
  return null;
};

const roleOf = (el) => {
  const explicit = (el.getAttribute('role') || '').trim().split(/\s+/)[0];
  return explicit || implicitRole(el);
};

const accessibleName = (el) => {
  const labelledBy = el.getAttribute('aria-labelledby');
  if (labelledBy) {
    const text = labelledBy.split(/\s+/)
      .map((id) => document.getElementById(id))
      .filter(Boolean)
      .map((n) => n.textContent)
      .join(' ');
    if (text.trim()) return text;
  }
  const aria = el.getAttribute('aria-label');
  if (aria && aria.trim()) return aria;
  const tag = el.tagName.toLowerCase();
  if (tag === 'input' || tag === 'textarea' || tag === 'select') {
    const type = (el.getAttribute('type') || '').toLowerCase();
    if (tag === 'input' && ['button', 'submit', 'reset'].includes(type)) return el.value || '';
    const fromLabels = el.labels ? Array.from(el.labels).map((l) => l.textContent).join(' ') : '';
    if (fromLabels.trim()) return fromLabels;
    return el.getAttribute('placeholder') || el.getAttribute('title') || '';
  }
  if (tag === 'img') return el.getAttribute('alt') || el.getAttribute('title') || '';
  const text = el.textContent || '';
  if (text.trim()) return text;
  return el.getAttribute('title') || '';
};

const NOT_EDITABLE = ['button', 'submit', 'reset', 'checkbox', 'radio', 'image', 'hidden', 'file', 'range', 'color'];

const describe = (el, parent) => {
  const attributes = {};
  for (const a of el.attributes) attributes[a.name] = a.value;
  const tag = el.tagName.toLowerCase();
  const role = el.getAttribute('role');
  const disabled = el.disabled === true
    || el.getAttribute('aria-disabled') === 'true'
    || el.closest('fieldset:disabled') !== null;
  const textEntry = (tag === 'input' && !NOT_EDITABLE.includes((el.type || '').toLowerCase()))
    || tag === 'textarea'
    || el.isContentEditable;
  const editable = !disabled && textEntry && !el.readOnly;
  const nativeCheck = tag === 'input' && (el.type === 'checkbox' || el.type === 'radio');
  const ariaCheck = ['checkbox', 'radio', 'switch', 'menuitemcheckbox', 'menuitemradio'].includes(role);
  let checked = null;
  if (nativeCheck) checked = el.checked;
  else if (ariaCheck) checked = el.getAttribute('aria-checked') === 'true';
  const value = (tag === 'input' || tag === 'textarea' || tag === 'select') ? String(el.value) : null;
  return {
    element: el,
    parent,
    tag,
    name: accessibleName(el),
    text: el.textContent || '',
    visible: isVisible(el),
    enabled: !disabled,
    editable,
    checked,
    value,
    attributes,
  };
};

const SKIPPED_TAGS = ['SCRIPT', 'STYLE', 'NOSCRIPT', 'TEMPLATE'];

const collect = (q) => {
  let nodes;
  switch (q.kind) {
    case 'id': {
      const n = document.getElementById(q.id);
      nodes = n ? [n] : [];
      break;
    }
    case 'css':
      nodes = Array.from(document.querySelectorAll(q.css));
      break;
    case 'test_id':
      nodes = Array.from(document.querySelectorAll('[data-testid]'))
        .filter((n) => n.getAttribute('data-testid') === q.id);
      break;
    case 'role':
      nodes = Array.from(document.querySelectorAll('*'))
        .filter((n) => roleOf(n) === q.role && !hiddenFromTree(n));
      break;
    case 'label':
      nodes = Array.from(document.querySelectorAll('input, textarea, select, [aria-label], [aria-labelledby]'));
      break;
    case 'placeholder':
      nodes = Array.from(document.querySelectorAll('[placeholder]'));
      break;
    case 'text':
      nodes = Array.from(document.body ? document.body.querySelectorAll('*') : [])
        .filter((n) => !SKIPPED_TAGS.includes(n.tagName) && (n.textContent || '').trim() !== '');
      break;
    default:
      throw new Error('unknown query kind: ' + q.kind);
  }
  const index = new Map(nodes.map((n, i) => [n, i]));
  return nodes.map((n) => {
    let parent = null;
    for (let p = n.parentElement; p; p = p.parentElement) {
      if (index.has(p)) { parent = index.get(p); break; }
    }
    return describe(n, parent);
  });
};

switch (req.op) {
  case 'collect':
    return collect(req.query);
  case 'frames':
    return Array.from(document.querySelectorAll(req.css))
      .filter((n) => n.tagName === 'IFRAME' || n.tagName === 'FRAME');
  case 'select': {
    const el = arguments[1];
    if (!el || el.tagName !== 'SELECT') return 'element is not a <select>';
    const opt = Array.from(el.options).find((o) =>
      o.value === req.option || o.label.trim() === req.option || o.textContent.trim() === req.option);
    if (!opt) return 'no option ' + JSON.stringify(req.option);
    el.value = opt.value;
    el.dispatchEvent(new Event('input', { bubbles: true }));
    el.dispatchEvent(new Event('change', { bubbles: true }));
    return null;
  }
  default:
    throw new Error('unknown op: ' + req.op);
}
"##;

/// Arguments for a `collect` call for the selector's innermost part
pub fn collect_args(selector: &Selector) -> Result<Value> {
    let query = match &selector.leaf().by {
        By::Role { role, .. } => json!({ "kind": "role", "role": role }),
        By::Id(id) => json!({ "kind": "id", "id": id }),
        By::Css(css) => json!({ "kind": "css", "css": css }),
        By::TestId(id) => json!({ "kind": "test_id", "id": id }),
        By::Text(_) => json!({ "kind": "text" }),
        By::Label(_) => json!({ "kind": "label" }),
        By::Placeholder(_) => json!({ "kind": "placeholder" }),
        By::Frame { .. } => {
            return Err(Error::Internal(format!(
                "frame selector {} has no innermost query",
                selector
            )))
        }
    };
    Ok(json!({ "op": "collect", "query": query }))
}

pub fn frames_args(css: &str) -> Value {
    json!({ "op": "frames", "css": css })
}

pub fn select_args(option: &str) -> Value {
    json!({ "op": "select", "option": option })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_args_use_leaf_of_frame() {
        let selector = Selector::in_frame("iframe", Selector::text("reCAPTCHA"));
        let args = collect_args(&selector).unwrap();
        assert_eq!(args["op"], "collect");
        assert_eq!(args["query"]["kind"], "text");
    }

    #[test]
    fn test_collect_args_role_and_id() {
        let args = collect_args(&Selector::role("textbox", Some("First Name"))).unwrap();
        assert_eq!(args["query"], json!({ "kind": "role", "role": "textbox" }));

        let args = collect_args(&Selector::id("last4Ssn")).unwrap();
        assert_eq!(args["query"]["id"], "last4Ssn");
    }

    #[test]
    fn test_script_handles_every_op() {
        for op in ["'collect'", "'frames'", "'select'"] {
            assert!(PAGE_SCRIPT.contains(&format!("case {}", op)));
        }
    }
}
