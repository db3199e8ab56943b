//! Synthetic pointer events for inline handlers
//!
//! Payloads reflected into attributes such as `onmouseover` never run on a
//! passive load. After the document loads, every element carrying an inline
//! handler for one of the pointer events below receives a bubbling,
//! cancelable `MouseEvent` of that kind.

/// Pointer event kinds that are provoked, in dispatch order
pub const POINTER_EVENTS: [&str; 10] = [
    "click",
    "contextmenu",
    "dblclick",
    "mousedown",
    "mouseenter",
    "mouseleave",
    "mousemove",
    "mouseover",
    "mouseout",
    "mouseup",
];

const SCRIPT_TEMPLATE: &str = r#"(function () {
    var handlers = {{HANDLERS}};
    var dispatched = 0;
    handlers.forEach(function (handler) {
        var kind = handler[0];
        var targets = document.querySelectorAll(handler[1]);
        Array.prototype.forEach.call(targets, function (element) {
            element.dispatchEvent(new MouseEvent(kind, {
                bubbles: true,
                cancelable: true,
                view: window
            }));
            dispatched++;
        });
    });
    return dispatched;
})()"#;

/// Script that dispatches every pointer event to its inline handlers and
/// evaluates to the number of events dispatched
pub fn provocation_script() -> String {
    let handlers: Vec<(&str, String)> = POINTER_EVENTS.iter().copied().zip(handler_selectors()).collect();
    let handlers = serde_json::to_string(&handlers).unwrap_or_else(|_| "[]".to_string());
    SCRIPT_TEMPLATE.replace("{{HANDLERS}}", &handlers)
}

/// Attribute selectors matched by the provocation script, one per entry of
/// `POINTER_EVENTS`
pub fn handler_selectors() -> impl Iterator<Item = String> {
    POINTER_EVENTS.iter().map(|kind| format!("[on{}]", kind))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_pairs_every_event_with_its_selector() {
        let script = provocation_script();
        assert!(!script.contains("{{HANDLERS}}"));
        for (kind, selector) in POINTER_EVENTS.iter().zip(handler_selectors()) {
            let pair = format!("[\"{}\",\"{}\"]", kind, selector);
            assert!(script.contains(&pair), "missing {}", pair);
        }
        assert!(script.contains("querySelectorAll(handler[1])"));
        assert!(script.contains("bubbles: true"));
        assert!(script.contains("cancelable: true"));
    }

    #[test]
    fn selectors_target_inline_handlers() {
        let selectors: Vec<String> = handler_selectors().collect();
        assert_eq!(selectors.len(), 10);
        assert_eq!(selectors[0], "[onclick]");
        assert!(selectors.contains(&"[onmouseover]".to_string()));
    }
}
