//! Render requests and their form-encoded wire representation

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::form_urlencoded;
use url::Url;

use crate::codec::{decode_json, decode_text, encode_json, encode_text};
use crate::error::DecodeError;

/// Navigation method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            _ => Err(DecodeError::InvalidMethod(s.to_string())),
        }
    }
}

/// Cookie expiry as submitted by the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CookieExpiry {
    /// Seconds since the Unix epoch
    Timestamp(f64),
    /// A date string; forwarded only by engines that understand it
    Text(String),
}

/// A cookie to install before navigation.
///
/// Field names follow the PhantomJS `addCookie` record; the camel-case CDP
/// spellings are accepted as aliases. Nothing here is interpreted beyond
/// forwarding to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CookieRecord {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, alias = "httpOnly", alias = "http_only", skip_serializing_if = "Option::is_none")]
    pub httponly: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secure: Option<bool>,
    #[serde(default, alias = "expiry", skip_serializing_if = "Option::is_none")]
    pub expires: Option<CookieExpiry>,
    #[serde(default, alias = "sameSite", alias = "same_site", skip_serializing_if = "Option::is_none")]
    pub samesite: Option<String>,
}

impl CookieRecord {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            url: None,
            domain: None,
            path: None,
            httponly: None,
            secure: None,
            expires: None,
            samesite: None,
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

/// Wire field names
pub mod fields {
    pub const URL: &str = "url";
    pub const METHOD: &str = "method";
    pub const BODY: &str = "body";
    pub const HEADERS: &str = "headers";
    pub const COOKIES: &str = "cookies";
    pub const PROVOKE_PAGE_EVENTS: &str = "provokePageEvents";
}

/// A decoded description of the navigation to perform
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    pub url: String,
    pub method: Method,
    /// Request payload; only used when `method` is POST
    pub body: Option<String>,
    /// Extra headers to send with the navigation
    pub headers: Option<HashMap<String, String>>,
    /// Cookies to install before navigating
    pub cookies: Option<Vec<CookieRecord>>,
    /// Dispatch synthetic pointer events to inline handlers after load
    pub provoke_events: bool,
}

impl RenderRequest {
    /// A GET request for `url` with every optional field unset
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Method::Get,
            body: None,
            headers: None,
            cookies: None,
            provoke_events: false,
        }
    }

    /// A POST request for `url` carrying `body`
    pub fn post(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            method: Method::Post,
            body: Some(body.into()),
            ..Self::get(url)
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .get_or_insert_with(HashMap::new)
            .insert(name.into(), value.into());
        self
    }

    pub fn with_cookie(mut self, cookie: CookieRecord) -> Self {
        self.cookies.get_or_insert_with(Vec::new).push(cookie);
        self
    }

    pub fn provoke_events(mut self, provoke: bool) -> Self {
        self.provoke_events = provoke;
        self
    }

    /// The payload to send with the navigation.
    ///
    /// GET never carries one; POST without a body sends an empty string.
    pub fn payload(&self) -> Option<&str> {
        match self.method {
            Method::Get => None,
            Method::Post => Some(self.body.as_deref().unwrap_or("")),
        }
    }

    /// Decode a form-encoded (`application/x-www-form-urlencoded`) body.
    ///
    /// Only `url` is mandatory. When a field is repeated the last value wins.
    pub fn from_form(form: &[u8]) -> Result<Self, DecodeError> {
        let pairs: HashMap<String, String> = form_urlencoded::parse(form).into_owned().collect();
        Self::from_fields(&pairs)
    }

    /// Decode from already separated form fields
    pub fn from_fields(fields: &HashMap<String, String>) -> Result<Self, DecodeError> {
        let raw_url = fields
            .get(fields::URL)
            .ok_or(DecodeError::MissingField(fields::URL))?;
        let url = decode_text(fields::URL, raw_url)?;
        Url::parse(&url).map_err(|_| DecodeError::InvalidUrl(url.clone()))?;

        let method = match fields.get(fields::METHOD) {
            Some(m) => m.parse()?,
            None => Method::Get,
        };

        let body = fields
            .get(fields::BODY)
            .map(|b| decode_text(fields::BODY, b))
            .transpose()?;

        let headers = fields
            .get(fields::HEADERS)
            .map(|h| decode_json::<HashMap<String, String>>(fields::HEADERS, h))
            .transpose()?;

        let cookies = fields
            .get(fields::COOKIES)
            .map(|c| decode_json::<Vec<CookieRecord>>(fields::COOKIES, c))
            .transpose()?;

        let provoke_events = match fields.get(fields::PROVOKE_PAGE_EVENTS) {
            Some(v) => parse_flag(fields::PROVOKE_PAGE_EVENTS, v)?,
            None => false,
        };

        Ok(Self {
            url,
            method,
            body,
            headers,
            cookies,
            provoke_events,
        })
    }

    /// Encode as wire form fields (the inverse of `from_fields`)
    pub fn to_fields(&self) -> Vec<(&'static str, String)> {
        let mut out = vec![
            (fields::URL, encode_text(&self.url)),
            (fields::METHOD, self.method.as_str().to_string()),
        ];
        if let Some(body) = &self.body {
            out.push((fields::BODY, encode_text(body)));
        }
        if let Some(headers) = &self.headers {
            out.push((fields::HEADERS, encode_json(headers)));
        }
        if let Some(cookies) = &self.cookies {
            out.push((fields::COOKIES, encode_json(cookies)));
        }
        out.push((fields::PROVOKE_PAGE_EVENTS, self.provoke_events.to_string()));
        out
    }

    /// Encode as a form body
    pub fn to_form(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.to_fields())
            .finish()
    }
}

fn parse_flag(field: &'static str, value: &str) -> Result<bool, DecodeError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" | "" => Ok(false),
        _ => Err(DecodeError::InvalidFlag {
            field,
            value: value.to_string(),
        }),
    }
}
