//! A page that reflects request parameters, unsanitized, into the classic
//! markup, attribute and script contexts.

use std::collections::HashMap;
use std::sync::Once;
use tiny_http::{Response, Server};

static INIT: Once = Once::new();
const FIXTURE_ADDR: &str = "127.0.0.1:18091";

pub const CONTEXTS: [&str; 16] = [
    "tagName",
    "attributeName",
    "singleQuotedAttributeValue",
    "doubleQuotedAttributeValue",
    "unquotedAttributeValue",
    "html",
    "htmlComment",
    "styleTag",
    "styleAttribute",
    "idAttribute",
    "classAttribute",
    "jsSingleQuotedString",
    "jsDoubleQuotedString",
    "jsSingleLineComment",
    "jsMultiLineComment",
    "js",
];

/// Build the fixture document for the given parameters
pub fn reflect(params: &HashMap<String, String>) -> String {
    let p = |name: &str| params.get(name).map(String::as_str).unwrap_or("");

    let tag = match params.get("tagName") {
        Some(t) => format!("<{t}>&nbsp;</{t}>", t = t),
        None => String::new(),
    };
    let attribute = match params.get("attributeName") {
        Some(a) => format!("{}=\"\"", a),
        None => String::new(),
    };

    format!(
        r#"<!doctype html>
<html>
<head><meta charset="utf-8"><title>Reflection fixture</title></head>
<body>
<div class="hidden">
{tag}
<div {attribute}>&nbsp;</div>
<div custAttr='{single}'>&nbsp;</div>
<div custAttr="{double}">&nbsp;</div>
<div custAttr={unquoted}>&nbsp;</div>
{html}
<!-- {comment} -->
<style>{style_tag}</style>
<div style="{style_attr}">&nbsp;</div>
<div id="{id}">&nbsp;</div>
<div class="{class}">&nbsp;</div>
</div>
<script>
var singleQuotedString = '{js_single}';
var doubleQuotedString = "{js_double}";
// {js_line}
/* {js_block} */
{js};
</script>
</body>
</html>"#,
        tag = tag,
        attribute = attribute,
        single = p("singleQuotedAttributeValue"),
        double = p("doubleQuotedAttributeValue"),
        unquoted = p("unquotedAttributeValue"),
        html = p("html"),
        comment = p("htmlComment"),
        style_tag = p("styleTag"),
        style_attr = p("styleAttribute"),
        id = p("idAttribute"),
        class = p("classAttribute"),
        js_single = p("jsSingleQuotedString"),
        js_double = p("jsDoubleQuotedString"),
        js_line = p("jsSingleLineComment"),
        js_block = p("jsMultiLineComment"),
        js = p("js"),
    )
}

/// Start the fixture server once and return its base URL.
///
/// Parameters are taken from the query string and, for POST, from a
/// form-encoded body.
pub fn start_fixture_server() -> String {
    INIT.call_once(|| {
        std::thread::spawn(|| {
            let server = Server::http(FIXTURE_ADDR).unwrap();
            for mut request in server.incoming_requests() {
                let mut params: HashMap<String, String> = HashMap::new();
                if let Some((_, query)) = request.url().split_once('?') {
                    params.extend(url::form_urlencoded::parse(query.as_bytes()).into_owned());
                }
                let mut body = Vec::new();
                let _ = request.as_reader().read_to_end(&mut body);
                params.extend(url::form_urlencoded::parse(&body).into_owned());

                let cookie = request
                    .headers()
                    .iter()
                    .find(|h| h.field.equiv("Cookie"))
                    .map(|h| h.value.as_str().to_string());
                if let Some(cookie) = cookie {
                    params.insert("html".into(), format!("{}<p id=cookie>{}</p>", params.get("html").cloned().unwrap_or_default(), cookie));
                }

                let mut html = reflect(&params);
                html = html.replace("<body>", &format!("<body data-method=\"{}\">", request.method()));

                let resp = Response::from_string(html).with_header(
                    "Content-Type: text/html; charset=utf-8"
                        .parse::<tiny_http::Header>()
                        .unwrap(),
                );
                let _ = request.respond(resp);
            }
        });
        std::thread::sleep(std::time::Duration::from_millis(100));
    });

    format!("http://{}/demo-xss-site", FIXTURE_ADDR)
}

#[test]
fn reflects_each_context_raw() {
    let mut params = HashMap::new();
    for name in CONTEXTS {
        params.insert(name.to_string(), format!("<{}!>", name));
    }
    let html = reflect(&params);
    for name in CONTEXTS {
        if name != "tagName" {
            assert!(html.contains(&format!("<{}!>", name)), "{} not reflected", name);
        }
    }
    assert!(html.contains("<<tagName!>>&nbsp;</<tagName!>>"));
}
