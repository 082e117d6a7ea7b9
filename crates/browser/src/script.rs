//! JavaScript snippets evaluated in page context.
//!
//! Every user-supplied string is embedded as a JSON string literal, so selectors
//! and texts containing quotes or backslashes cannot break out of the snippet.

/// Quote `s` as a JS string literal.
pub fn js_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

/// Elements considered clickable by the text-scan fallback.
const INTERACTIVE: &str = r#"button, [role="button"], a"#;

pub fn selector_exists(selector: &str) -> String {
    format!("!!document.querySelector({})", js_string(selector))
}

pub fn selector_visible(selector: &str) -> String {
    format!(
        concat!(
            "(function() {{ var el = document.querySelector({});",
            " if (!el) return false;",
            " var r = el.getBoundingClientRect();",
            " var s = window.getComputedStyle(el);",
            " return r.width > 0 && r.height > 0 && s.visibility !== 'hidden' && s.display !== 'none'; }})()"
        ),
        js_string(selector)
    )
}

pub fn click_selector(selector: &str) -> String {
    format!(
        concat!(
            "(function() {{ var el = document.querySelector({});",
            " if (!el) return false;",
            " el.scrollIntoView({{block: 'center'}});",
            " el.click(); return true; }})()"
        ),
        js_string(selector)
    )
}

/// Click the first interactive element whose visible text contains `text`.
pub fn click_by_text(text: &str) -> String {
    format!(
        concat!(
            "(function() {{ var needle = {};",
            " var all = Array.from(document.querySelectorAll({}));",
            " var el = all.find(function(b) {{ return b.innerText && b.innerText.includes(needle); }});",
            " if (!el) return false;",
            " el.scrollIntoView({{block: 'center'}});",
            " el.click(); return true; }})()"
        ),
        js_string(text),
        js_string(INTERACTIVE)
    )
}

/// `innerText` of the last element matching `selector`, or `null`.
pub fn last_text(selector: &str) -> String {
    format!(
        concat!(
            "(function() {{ var m = document.querySelectorAll({});",
            " return m.length ? m[m.length - 1].innerText : null; }})()"
        ),
        js_string(selector)
    )
}

pub fn focus_selector(selector: &str) -> String {
    format!(
        concat!(
            "(function() {{ var el = document.querySelector({});",
            " if (!el) return false;",
            " el.focus(); return document.activeElement === el; }})()"
        ),
        js_string(selector)
    )
}

pub const DOM_READY: &str = "document.readyState !== 'loading'";

pub const LOCATION_HREF: &str = "location.href";

/// Call a no-argument method on a media element, e.g. `pause` or `play`.
/// Evaluates to false when the element is gone.
pub fn media_call(element_id: &str, method: &str) -> String {
    format!(
        concat!(
            "(function() {{ var v = document.getElementById({});",
            " if (!v) return false;",
            " var r = v[{}]();",
            " if (r && r.catch) r.catch(function() {{}});",
            " return true; }})()"
        ),
        js_string(element_id),
        js_string(method)
    )
}

pub fn request_fullscreen(element_id: &str) -> String {
    format!(
        concat!(
            "(function() {{ var v = document.getElementById({});",
            " if (!v) return Promise.resolve(false);",
            " return v.requestFullscreen().then(function() {{ return true; }}); }})()"
        ),
        js_string(element_id)
    )
}
