//! Render results and their JSON wire representation

use serde::{Deserialize, Serialize};

use crate::capture::Captured;
use crate::codec::{decode_json, decode_text, encode_json, encode_text};
use crate::error::{DecodeError, Error, Result};
use crate::LoadStatus;

/// How the render ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderStatus {
    /// The page loaded
    #[default]
    Success,
    /// The engine reported a failed load; content and collections are partial
    Fail,
    /// The load did not finish in time; everything else is empty
    Timeout,
}

impl From<&LoadStatus> for RenderStatus {
    fn from(status: &LoadStatus) -> Self {
        match status {
            LoadStatus::Success => RenderStatus::Success,
            LoadStatus::Fail(_) => RenderStatus::Fail,
        }
    }
}

/// The rendered document and everything the page did while loading
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderResult {
    pub html: String,
    pub errors: Vec<String>,
    pub console_messages: Vec<String>,
    pub alerts: Vec<String>,
    pub confirms: Vec<String>,
    pub prompts: Vec<String>,
    pub status: RenderStatus,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResult {
    html: String,
    errors: String,
    console_messages: String,
    alerts: String,
    confirms: String,
    prompts: String,
    #[serde(default)]
    status: RenderStatus,
}

impl RenderResult {
    /// Package a finished session
    pub fn from_capture(html: String, captured: Captured, status: RenderStatus) -> Self {
        Self {
            html,
            errors: captured.errors,
            console_messages: captured.console_messages,
            alerts: captured.alerts,
            confirms: captured.confirms,
            prompts: captured.prompts,
            status,
        }
    }

    /// The empty result returned when the load timed out
    pub fn timed_out() -> Self {
        Self {
            status: RenderStatus::Timeout,
            ..Self::default()
        }
    }

    /// Whether any dialog fired
    pub fn has_dialogs(&self) -> bool {
        !(self.alerts.is_empty() && self.confirms.is_empty() && self.prompts.is_empty())
    }

    /// Encode as the JSON response body.
    ///
    /// Every field is base64 encoded on its own; the four message collections
    /// are first serialized as JSON arrays.
    pub fn to_wire(&self) -> String {
        let wire = WireResult {
            html: encode_text(&self.html),
            errors: encode_json(&self.errors),
            console_messages: encode_json(&self.console_messages),
            alerts: encode_json(&self.alerts),
            confirms: encode_json(&self.confirms),
            prompts: encode_json(&self.prompts),
            status: self.status,
        };
        // Plain strings and a unit enum always serialize.
        serde_json::to_string(&wire).unwrap_or_default()
    }

    /// Decode a JSON response body produced by `to_wire`
    pub fn from_wire(body: &str) -> Result<Self> {
        let wire: WireResult = serde_json::from_str(body).map_err(|e| {
            Error::Decode(DecodeError::InvalidJson {
                field: "response",
                reason: e.to_string(),
            })
        })?;

        Ok(Self {
            html: decode_text("html", &wire.html)?,
            errors: decode_json("errors", &wire.errors)?,
            console_messages: decode_json("consoleMessages", &wire.console_messages)?,
            alerts: decode_json("alerts", &wire.alerts)?,
            confirms: decode_json("confirms", &wire.confirms)?,
            prompts: decode_json("prompts", &wire.prompts)?,
            status: wire.status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RenderResult {
        RenderResult {
            html: "<html><body><script>alert(\"x\")</script>\u{2603}</body></html>".into(),
            errors: vec!["ReferenceError: foo is not defined".into()],
            console_messages: vec!["hello".into(), "</script>".into()],
            alerts: vec!["x".into()],
            confirms: vec![],
            prompts: vec!["name?".into()],
            status: RenderStatus::Fail,
        }
    }

    #[test]
    fn wire_fields_carry_no_raw_content() {
        let body = sample().to_wire();
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();

        for field in ["html", "errors", "consoleMessages", "alerts", "confirms", "prompts"] {
            let encoded = value[field].as_str().unwrap();
            assert!(!encoded.contains('<'), "{} leaked markup", field);
        }
        assert_eq!(value["status"], "fail");
        assert_eq!(decode_text("confirms", value["confirms"].as_str().unwrap()).unwrap(), "[]");
    }

    #[test]
    fn wire_decoding_restores_result() {
        let result = sample();
        assert_eq!(RenderResult::from_wire(&result.to_wire()).unwrap(), result);
    }

    #[test]
    fn status_defaults_when_absent() {
        let empty = encode_json(&Vec::<String>::new());
        let body = serde_json::json!({
            "html": encode_text("<p>"),
            "errors": empty,
            "consoleMessages": empty,
            "alerts": empty,
            "confirms": empty,
            "prompts": empty,
        })
        .to_string();
        let result = RenderResult::from_wire(&body).unwrap();
        assert_eq!(result.status, RenderStatus::Success);
        assert_eq!(result.html, "<p>");
        assert!(!result.has_dialogs());
    }

    #[test]
    fn timed_out_is_empty() {
        let result = RenderResult::timed_out();
        assert_eq!(result.status, RenderStatus::Timeout);
        assert!(result.html.is_empty());
        assert!(!result.has_dialogs());
        assert!(result.errors.is_empty() && result.console_messages.is_empty());
    }
}
