//! Endpoint templates and their per-job overrides.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{HarvestError, Result};
use crate::harvest::{CollectionRef, PagingRules};
use crate::http_client::{ApiRequest, TokenPlacement};
use crate::normalize::NormalizeContext;

/// HTTP method of a collection endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointMethod {
    #[default]
    Get,
    Post,
}

/// `[jobs.endpoint]` table. Every field is optional and replaces the job's default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// URL template with `{placeholder}`s filled from the collection context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<EndpointMethod>,
    /// Extra query parameters; values are templates. Merged over the defaults.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
    /// JSON body for POST endpoints; string values are templates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor_param: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub records_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size_param: Option<String>,
    /// `"bearer"` or `"query"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_placement: Option<String>,
    /// Query parameter carrying the token when `token_placement = "query"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_param: Option<String>,
}

/// A resolved endpoint template, ready to be rendered per collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    pub url: String,
    pub method: EndpointMethod,
    pub params: BTreeMap<String, String>,
    pub body: Option<Value>,
    pub page_size: Option<u32>,
    pub page_size_param: String,
    pub paging: PagingRules,
}

impl Endpoint {
    /// GET endpoint with Google-style paging (`pageToken` / `nextPageToken`).
    pub fn google(url: &str, records_path: &str) -> Self {
        Self {
            url: url.to_string(),
            method: EndpointMethod::Get,
            params: BTreeMap::new(),
            body: None,
            page_size: None,
            page_size_param: "pageSize".to_string(),
            paging: PagingRules {
                cursor_param: "pageToken".to_string(),
                cursor_path: "nextPageToken".to_string(),
                records_path: records_path.to_string(),
                token_placement: TokenPlacement::Bearer,
            },
        }
    }

    pub fn param(mut self, key: &str, value: &str) -> Self {
        self.params.insert(key.to_string(), value.to_string());
        self
    }

    pub fn page_size(mut self, size: u32) -> Self {
        self.page_size = Some(size);
        self
    }

    /// Apply a `[jobs.endpoint]` override on top of this default.
    pub fn with_overrides(mut self, overrides: Option<&EndpointConfig>) -> Result<Self> {
        let Some(o) = overrides else {
            return Ok(self);
        };

        if let Some(ref url) = o.url {
            self.url = url.clone();
        }
        if let Some(method) = o.method {
            self.method = method;
        }
        for (key, value) in &o.params {
            self.params.insert(key.clone(), value.clone());
        }
        if let Some(ref body) = o.body {
            self.body = Some(body.clone());
        }
        if let Some(ref param) = o.cursor_param {
            self.paging.cursor_param = param.clone();
        }
        if let Some(ref path) = o.cursor_path {
            self.paging.cursor_path = path.clone();
        }
        if let Some(ref path) = o.records_path {
            self.paging.records_path = path.clone();
        }
        if let Some(size) = o.page_size {
            self.page_size = Some(size);
        }
        if let Some(ref param) = o.page_size_param {
            self.page_size_param = param.clone();
        }

        let token_param = o.token_param.clone().unwrap_or_else(|| match self.paging.token_placement {
            TokenPlacement::Query(ref p) => p.clone(),
            TokenPlacement::Bearer => "access_token".to_string(),
        });
        match o.token_placement.as_deref() {
            None if o.token_param.is_some() => {
                self.paging.token_placement = TokenPlacement::Query(token_param)
            }
            None => {}
            Some("bearer") => self.paging.token_placement = TokenPlacement::Bearer,
            Some("query") => self.paging.token_placement = TokenPlacement::Query(token_param),
            Some(other) => {
                return Err(HarvestError::Config(format!(
                    "unknown token_placement '{}' (expected 'bearer' or 'query')",
                    other
                )))
            }
        }

        if self.method == EndpointMethod::Post && self.body.is_none() {
            self.body = Some(Value::Object(Default::default()));
        }
        Ok(self)
    }

    /// Render the template for one collection.
    pub fn collection(&self, label: &str, context: &NormalizeContext) -> Result<CollectionRef> {
        let url = render_template(&self.url, context)?;
        url::Url::parse(&url)
            .map_err(|e| HarvestError::Config(format!("invalid URL '{}': {}", url, e)))?;

        let mut request = match self.method {
            EndpointMethod::Get => ApiRequest::get(url),
            EndpointMethod::Post => {
                let body = match self.body {
                    Some(ref body) => render_json(body, context)?,
                    None => Value::Object(Default::default()),
                };
                ApiRequest::post(url, body)
            }
        };

        if let Some(size) = self.page_size {
            match request.body {
                Some(Value::Object(ref mut map)) => {
                    map.insert(self.page_size_param.clone(), Value::from(size));
                }
                _ => request
                    .query
                    .push((self.page_size_param.clone(), size.to_string())),
            }
        }
        for (key, value) in &self.params {
            request = request.query(key, render_template(value, context)?);
        }

        Ok(CollectionRef {
            label: label.to_string(),
            request,
            paging: self.paging.clone(),
        })
    }
}

/// Substitute `{name}` placeholders from `context`.
///
/// Braces that do not enclose an identifier are copied verbatim. A
/// placeholder with no value in the context is a configuration error.
pub fn render_template(template: &str, context: &NormalizeContext) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let name_len = after
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(after.len());

        if name_len > 0 && after[name_len..].starts_with('}') {
            let name = &after[..name_len];
            let value = context.get(name).ok_or_else(|| {
                HarvestError::Config(format!(
                    "unresolved placeholder '{{{}}}' in '{}'",
                    name, template
                ))
            })?;
            out.push_str(value);
            rest = &after[name_len + 1..];
        } else {
            out.push('{');
            rest = after;
        }
    }

    out.push_str(rest);
    Ok(out)
}

fn render_json(value: &Value, context: &NormalizeContext) -> Result<Value> {
    Ok(match value {
        Value::String(s) => Value::String(render_template(s, context)?),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| render_json(v, context))
                .collect::<Result<_>>()?,
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| Ok((k.clone(), render_json(v, context)?)))
                .collect::<Result<_>>()?,
        ),
        other => other.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> NormalizeContext {
        NormalizeContext::new()
            .with("account", "accounts/1")
            .with("location", "locations/9")
    }

    #[test]
    fn test_render_template() {
        assert_eq!(
            render_template("https://x/v4/{account}/{location}/reviews", &ctx()).unwrap(),
            "https://x/v4/accounts/1/locations/9/reviews"
        );
    }

    #[test]
    fn test_render_leaves_non_placeholders() {
        assert_eq!(
            render_template("permissions(id,role) {} {a-b}", &ctx()).unwrap(),
            "permissions(id,role) {} {a-b}"
        );
    }

    #[test]
    fn test_unresolved_placeholder_is_config_error() {
        assert!(matches!(
            render_template("https://x/{page_id}/insights", &ctx()),
            Err(HarvestError::Config(_))
        ));
    }

    #[test]
    fn test_collection_get() {
        let endpoint = Endpoint::google("https://x/v1/{account}/locations", "locations")
            .page_size(100)
            .param("readMask", "name,storeCode");
        let collection = endpoint.collection("locations accounts/1", &ctx()).unwrap();

        assert_eq!(collection.request.url, "https://x/v1/accounts/1/locations");
        assert_eq!(
            collection.request.query,
            vec![
                ("pageSize".to_string(), "100".to_string()),
                ("readMask".to_string(), "name,storeCode".to_string()),
            ]
        );
        assert_eq!(collection.paging.records_path, "locations");
    }

    #[test]
    fn test_overrides() {
        let overrides = EndpointConfig {
            url: Some("https://x/v4/{account}/locations:batchGetReviews".into()),
            method: Some(EndpointMethod::Post),
            body: Some(json!({"locationNames": ["{account}/{location}"]})),
            records_path: Some("locationReviews".into()),
            page_size: Some(50),
            ..Default::default()
        };
        let endpoint = Endpoint::google("https://x/v4/{account}/{location}/reviews", "reviews")
            .with_overrides(Some(&overrides))
            .unwrap();
        let collection = endpoint.collection("batch", &ctx()).unwrap();

        assert_eq!(collection.request.method, reqwest::Method::POST);
        assert_eq!(
            collection.request.body,
            Some(json!({"locationNames": ["accounts/1/locations/9"], "pageSize": 50}))
        );
        assert!(collection.request.query.is_empty());
        assert_eq!(collection.paging.records_path, "locationReviews");
    }

    #[test]
    fn test_token_placement_override() {
        let overrides = EndpointConfig {
            token_placement: Some("query".into()),
            ..Default::default()
        };
        let endpoint = Endpoint::google("https://x", "data")
            .with_overrides(Some(&overrides))
            .unwrap();
        assert_eq!(
            endpoint.paging.token_placement,
            TokenPlacement::Query("access_token".into())
        );

        let bad = EndpointConfig {
            token_placement: Some("cookie".into()),
            ..Default::default()
        };
        assert!(matches!(
            Endpoint::google("https://x", "data").with_overrides(Some(&bad)),
            Err(HarvestError::Config(_))
        ));
    }
}
