//! Page-side scripts evaluated through `Runtime.evaluate`
//!
//! Every script is a self-invoking function that returns a JSON string, so
//! the Rust side only ever parses one value. Arguments are spliced in as JSON
//! literals.

use serde::Deserialize;
use serde_json::json;
use wp_core::driver::{ElementTarget, FramePath, InputEvent};

/// `{url, title, ready}` of the top document
pub const PAGE_STATE: &str = r#"JSON.stringify({
  url: location.href,
  title: document.title,
  ready: document.readyState === 'complete'
})"#;

/// Shared helpers: frame resolution and element lookup
const PRELUDE: &str = r#"
  function frameId(f) {
    let id = f.getAttribute('data-wp-frame');
    if (!id) {
      const owner = f.ownerDocument;
      owner.__wpFrameSeq = (owner.__wpFrameSeq || 0) + 1;
      id = 'f' + owner.__wpFrameSeq;
      f.setAttribute('data-wp-frame', id);
    }
    return id;
  }
  function innerDoc(f) {
    try { return f.contentDocument; } catch (e) { return null; }
  }
  function resolve(path) {
    let doc = document, ox = 0, oy = 0;
    for (const id of path) {
      const f = doc.querySelector('[data-wp-frame="' + CSS.escape(id) + '"]');
      if (!f) return { error: 'frame ' + id + ' not found' };
      const inner = innerDoc(f);
      if (!inner) return { error: 'frame ' + id + ' not accessible' };
      const r = f.getBoundingClientRect();
      ox += r.left + f.clientLeft;
      oy += r.top + f.clientTop;
      doc = inner;
    }
    return { doc: doc, ox: ox, oy: oy };
  }
  function byXPath(doc, xpath) {
    return doc.evaluate(xpath, doc, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue;
  }
"#;

const TREE_BODY: &str = r#"
  const frame = resolve(PATH);
  if (frame.error) return JSON.stringify({ error: frame.error });
  const doc = frame.doc, view = doc.defaultView;

  function xpathOf(el) {
    const parts = [];
    for (let n = el; n && n.nodeType === 1; n = n.parentElement) {
      let i = 1;
      for (let s = n.previousElementSibling; s; s = s.previousElementSibling) {
        if (s.tagName === n.tagName) i++;
      }
      parts.unshift(n.tagName.toLowerCase() + '[' + i + ']');
    }
    return '/' + parts.join('/');
  }
  function ownText(el) {
    let text = '';
    for (const c of el.childNodes) if (c.nodeType === 3) text += c.textContent;
    return text.replace(/\s+/g, ' ').trim().slice(0, 200);
  }
  function visit(el) {
    const tag = el.tagName.toLowerCase();
    const style = view.getComputedStyle(el);
    const r = el.getBoundingClientRect();
    const visible = style.display !== 'none' && style.visibility !== 'hidden' && style.opacity !== '0';
    const attributes = {};
    for (const a of el.attributes) {
      if (a.name.startsWith('data-wp-')) continue;
      attributes[a.name] = a.value.slice(0, 200);
    }
    if ((tag === 'input' || tag === 'textarea' || tag === 'select') && el.value) {
      attributes.value = String(el.value).slice(0, 200);
    }
    let obscured = false;
    const cx = r.left + r.width / 2, cy = r.top + r.height / 2;
    if (visible && r.width > 0 && r.height > 0 && cx >= 0 && cy >= 0 && cx < view.innerWidth && cy < view.innerHeight) {
      const hit = doc.elementFromPoint(cx, cy);
      obscured = !!hit && hit !== el && !el.contains(hit) && !hit.contains(el);
    }
    const node = {
      tag: tag,
      role: el.getAttribute('role'),
      text: ownText(el),
      attributes: attributes,
      rect: { x: r.left + frame.ox, y: r.top + frame.oy, width: r.width, height: r.height },
      visible: visible,
      obscured: obscured,
      cursor: style.cursor,
      editable: el.isContentEditable,
      scrollable: (el.scrollHeight > el.clientHeight + 1 && /(auto|scroll)/.test(style.overflowY))
        || (el.scrollWidth > el.clientWidth + 1 && /(auto|scroll)/.test(style.overflowX)),
      xpath: xpathOf(el),
      frame: null,
      children: []
    };
    if (tag === 'iframe' || tag === 'frame') {
      node.frame = { id: frameId(el), src: el.getAttribute('src'), cross_origin: innerDoc(el) === null };
    }
    for (const child of el.children) node.children.push(visit(child));
    return node;
  }
  return JSON.stringify({ roots: doc.documentElement ? [visit(doc.documentElement)] : [] });
"#;

const INPUT_BODY: &str = r#"
  const frame = resolve(TARGET.frame_path);
  if (frame.error) return JSON.stringify({ ok: false, missing: true, error: frame.error });
  const el = byXPath(frame.doc, TARGET.locator);
  if (!el) return JSON.stringify({ ok: false, missing: true, error: 'no element at ' + TARGET.locator });
  const view = frame.doc.defaultView;

  function fire(type, init) {
    el.dispatchEvent(new view.Event(type, Object.assign({ bubbles: true, cancelable: true }, init || {})));
  }
  function mouse(type) {
    const r = el.getBoundingClientRect();
    el.dispatchEvent(new view.MouseEvent(type, {
      bubbles: true, cancelable: true, view: view,
      clientX: r.left + r.width / 2, clientY: r.top + r.height / 2
    }));
  }
  // Framework-controlled inputs track the native setter, not the property
  function setValue(value) {
    const proto = el instanceof view.HTMLTextAreaElement ? view.HTMLTextAreaElement.prototype
      : el instanceof view.HTMLSelectElement ? view.HTMLSelectElement.prototype
      : view.HTMLInputElement.prototype;
    const setter = Object.getOwnPropertyDescriptor(proto, 'value').set;
    setter.call(el, value);
    fire('input');
    fire('change');
  }

  el.scrollIntoView({ block: 'center', inline: 'center' });
  switch (EVENT.type) {
    case 'click':
      mouse('mouseover'); mouse('mousedown');
      if (el.focus) el.focus();
      mouse('mouseup');
      el.click();
      break;
    case 'hover':
      mouse('mouseover'); mouse('mouseenter'); mouse('mousemove');
      break;
    case 'type':
      el.focus();
      if (el.isContentEditable) {
        el.textContent = EVENT.clear ? EVENT.text : el.textContent + EVENT.text;
        fire('input');
      } else {
        setValue(EVENT.clear ? EVENT.text : (el.value || '') + EVENT.text);
      }
      break;
    case 'scroll':
      el.scrollBy(EVENT.dx, EVENT.dy);
      break;
    case 'key':
      el.focus();
      break;
    case 'select': {
      const options = Array.from(el.options || []);
      const match = options.find(o => o.value === EVENT.value)
        || options.find(o => o.text.trim() === EVENT.value);
      if (!match) return JSON.stringify({ ok: false, error: 'no option ' + EVENT.value });
      setValue(match.value);
      break;
    }
  }
  return JSON.stringify({ ok: true });
"#;

const EVAL_BODY: &str = r#"
    const fn = (FUNCTION);
    if (typeof fn !== 'function') return JSON.stringify({ ok: false, error: 'script is not a function' });
    let value;
    if (TARGET) {
      const frame = resolve(TARGET.frame_path);
      if (frame.error) return JSON.stringify({ ok: false, missing: true, error: frame.error });
      const el = byXPath(frame.doc, TARGET.locator);
      if (!el) return JSON.stringify({ ok: false, missing: true, error: 'element not found' });
      value = await fn(el, ...ARGS);
    } else {
      value = await fn(...ARGS);
    }
    return JSON.stringify({ ok: true, value: value === undefined ? null : value });
"#;

/// Script returning the raw tree of the frame document at `path`
pub fn tree_query(path: &FramePath) -> String {
    wrap(&[("PATH", json!(path.segments()))], TREE_BODY)
}

/// Script routing `event` to `target`. Keys are pressed afterwards through
/// the protocol since synthetic key events are untrusted.
pub fn dispatch_input(target: &ElementTarget, event: &InputEvent) -> String {
    wrap(
        &[
            ("TARGET", json!({ "frame_path": target.frame_path.segments(), "locator": target.locator })),
            ("EVENT", serde_json::to_value(event).unwrap_or_default()),
        ],
        INPUT_BODY,
    )
}

/// Async script calling the page function `function`, with the target
/// element first when given. Must be evaluated with promise awaiting.
pub fn evaluate_function(function: &str, args: &[serde_json::Value], target: Option<&ElementTarget>) -> String {
    let target = target.map_or(serde_json::Value::Null, |t| {
        json!({ "frame_path": t.frame_path.segments(), "locator": t.locator })
    });
    let body = EVAL_BODY.replace("(FUNCTION)", &format!("({})", function));
    wrap_with(
        "(async function () {\n",
        &[("TARGET", target), ("ARGS", serde_json::Value::Array(args.to_vec()))],
        &body,
    )
}

pub fn scroll_viewport(dy: f64) -> String {
    format!("window.scrollBy(0, {}); true", dy)
}

fn wrap(args: &[(&str, serde_json::Value)], body: &str) -> String {
    wrap_with("(function () {\n", args, body)
}

fn wrap_with(opening: &str, args: &[(&str, serde_json::Value)], body: &str) -> String {
    let mut script = String::from(opening);
    for (name, value) in args {
        script.push_str(&format!("  const {} = {};\n", name, value));
    }
    script.push_str(PRELUDE);
    script.push_str("  try {");
    script.push_str(body);
    script.push_str("  } catch (e) { return JSON.stringify({ error: String(e), ok: false }); }\n})()");
    script
}

/// Reply of [`tree_query`]
#[derive(Debug, Deserialize)]
pub struct TreeReply {
    #[serde(default)]
    pub roots: Vec<wp_core::driver::RawNode>,
    pub error: Option<String>,
}

/// Reply of [`dispatch_input`]
#[derive(Debug, Deserialize)]
pub struct InputReply {
    pub ok: bool,
    #[serde(default)]
    pub missing: bool,
    pub error: Option<String>,
}

/// Reply of [`evaluate_function`]
#[derive(Debug, Deserialize)]
pub struct EvalReply {
    pub ok: bool,
    #[serde(default)]
    pub missing: bool,
    #[serde(default)]
    pub value: serde_json::Value,
    pub error: Option<String>,
}
