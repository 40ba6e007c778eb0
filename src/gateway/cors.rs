//! CORS preflight policy

use crate::error::{AppError, Result};
use chrono::Duration;
use serde_json::{json, Map, Value};

pub const ALL_ORIGINS: &[&str] = &["*"];

pub const ALL_METHODS: &[&str] = &["OPTIONS", "GET", "PUT", "POST", "DELETE", "PATCH", "HEAD"];

pub const DEFAULT_HEADERS: &[&str] = &[
    "Content-Type",
    "X-Amz-Date",
    "Authorization",
    "X-Api-Key",
    "X-Amz-Security-Token",
    "X-Amz-User-Agent",
];

const DEFAULT_STATUS_CODE: u16 = 204;

/// Which cross-origin callers, methods and headers the gateway accepts.
///
/// A wildcard origin together with `allow_credentials` is accepted as
/// declared; [`CorsPolicy::is_credentialed_wildcard`] reports it so callers
/// can surface the combination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorsPolicy {
    pub allow_origins: Vec<String>,
    /// `None` allows every method
    pub allow_methods: Option<Vec<String>>,
    /// `None` allows [`DEFAULT_HEADERS`]
    pub allow_headers: Option<Vec<String>>,
    pub allow_credentials: bool,
    pub expose_headers: Option<Vec<String>>,
    pub max_age: Option<Duration>,
    pub disable_cache: bool,
    pub status_code: Option<u16>,
}

impl Default for CorsPolicy {
    fn default() -> Self {
        Self {
            allow_origins: all_origins(),
            allow_methods: None,
            allow_headers: None,
            allow_credentials: false,
            expose_headers: None,
            max_age: None,
            disable_cache: false,
            status_code: None,
        }
    }
}

pub fn all_origins() -> Vec<String> {
    ALL_ORIGINS.iter().map(|s| s.to_string()).collect()
}

pub fn all_methods() -> Vec<String> {
    ALL_METHODS.iter().map(|s| s.to_string()).collect()
}

/// The default header set plus `extra`
pub fn default_headers_with(extra: &[&str]) -> Vec<String> {
    DEFAULT_HEADERS
        .iter()
        .chain(extra.iter())
        .map(|s| s.to_string())
        .collect()
}

impl CorsPolicy {
    pub fn is_credentialed_wildcard(&self) -> bool {
        self.allow_credentials && self.allow_origins.iter().any(|o| o == "*")
    }

    pub fn check(&self) -> Result<()> {
        if self.allow_origins.is_empty() {
            return Err(AppError::invalid(
                "cors.allow_origins",
                "must contain at least one origin",
            ));
        }
        if self.allow_origins.len() > 1 && self.allow_origins.iter().any(|o| o == "*") {
            return Err(AppError::invalid(
                "cors.allow_origins",
                format!(
                    "cannot mix '*' with specific origins: {}",
                    self.allow_origins.join(",")
                ),
            ));
        }
        if let Some(methods) = &self.allow_methods {
            if methods.is_empty() {
                return Err(AppError::invalid("cors.allow_methods", "must not be empty"));
            }
            if methods.iter().any(|m| m == "ANY") && methods.len() > 1 {
                return Err(AppError::invalid(
                    "cors.allow_methods",
                    "'ANY' cannot be used with any other method",
                ));
            }
        }
        // Header values are rendered inside single-quoted mapping expressions
        let header_values = [
            ("cors.allow_origins", Some(&self.allow_origins)),
            ("cors.allow_methods", self.allow_methods.as_ref()),
            ("cors.allow_headers", self.allow_headers.as_ref()),
            ("cors.expose_headers", self.expose_headers.as_ref()),
        ];
        for (field, values) in header_values {
            if let Some(bad) = values.into_iter().flatten().find(|v| v.contains('\'')) {
                return Err(AppError::invalid(
                    field,
                    format!("'{}' must not contain a single quote", bad),
                ));
            }
        }
        if let Some(bad) = self.allow_origins.iter().find(|o| o.contains('"')) {
            return Err(AppError::invalid(
                "cors.allow_origins",
                format!("'{}' must not contain a double quote", bad),
            ));
        }
        if self.disable_cache && self.max_age.is_some() {
            return Err(AppError::invalid(
                "cors.max_age",
                "cannot be combined with disable_cache",
            ));
        }
        if let Some(code) = self.status_code {
            if !(100..=599).contains(&code) {
                return Err(AppError::invalid(
                    "cors.status_code",
                    format!("{} is not an HTTP status code", code),
                ));
            }
        }
        Ok(())
    }

    fn methods(&self) -> Vec<String> {
        match &self.allow_methods {
            None => all_methods(),
            Some(methods) if methods.iter().any(|m| m == "ANY") => all_methods(),
            Some(methods) => methods.clone(),
        }
    }

    fn response_headers(&self) -> Vec<(String, String)> {
        let mut headers = Vec::new();
        let allow_headers = self
            .allow_headers
            .clone()
            .unwrap_or_else(|| default_headers_with(&[]));
        headers.push(("Access-Control-Allow-Headers", allow_headers.join(",")));

        let initial_origin = self.allow_origins.first().cloned().unwrap_or_default();
        headers.push(("Access-Control-Allow-Origin", initial_origin.clone()));
        if initial_origin != "*" {
            headers.push(("Vary", "Origin".to_string()));
        }
        headers.push(("Access-Control-Allow-Methods", self.methods().join(",")));
        if self.allow_credentials {
            headers.push(("Access-Control-Allow-Credentials", "true".to_string()));
        }
        if self.disable_cache {
            headers.push(("Access-Control-Max-Age", "-1".to_string()));
        } else if let Some(max_age) = self.max_age {
            headers.push(("Access-Control-Max-Age", max_age.num_seconds().to_string()));
        }
        if let Some(expose) = &self.expose_headers {
            headers.push(("Access-Control-Expose-Headers", expose.join(",")));
        }
        headers
            .into_iter()
            .map(|(name, value)| (format!("method.response.header.{}", name), format!("'{}'", value)))
            .collect()
    }

    /// With several origins the response echoes the caller's origin when it matches one of them
    fn response_templates(&self) -> Option<Value> {
        if self.allow_origins.len() < 2 {
            return None;
        }
        let conditions: Vec<String> = self
            .allow_origins
            .iter()
            .skip(1)
            .map(|o| format!("$origin.matches(\"{}\")", o))
            .collect();
        let template = [
            "#set($origin = $input.params().header.get(\"Origin\"))".to_string(),
            "#if($origin == \"\") #set($origin = $input.params().header.get(\"origin\")) #end".to_string(),
            format!("#if({})", conditions.join(" || ")),
            "  #set($context.responseOverride.header.Access-Control-Allow-Origin = $origin)".to_string(),
            "#end".to_string(),
        ]
        .join("\n");
        Some(json!({ "application/json": template }))
    }

    /// `Integration` and `MethodResponses` of the `OPTIONS` method
    pub(crate) fn preflight(&self) -> (Value, Value) {
        let status_code = self.status_code.unwrap_or(DEFAULT_STATUS_CODE).to_string();
        let headers = self.response_headers();

        let mut integration_params = Map::new();
        let mut method_params = Map::new();
        for (name, value) in headers {
            method_params.insert(name.clone(), json!(true));
            integration_params.insert(name, json!(value));
        }

        let mut integration_response = json!({
            "StatusCode": status_code,
            "ResponseParameters": integration_params,
        });
        if let (Some(templates), Some(obj)) =
            (self.response_templates(), integration_response.as_object_mut())
        {
            obj.insert("ResponseTemplates".to_string(), templates);
        }

        let integration = json!({
            "Type": "MOCK",
            "RequestTemplates": { "application/json": "{ statusCode: 200 }" },
            "IntegrationResponses": [integration_response],
        });
        let method_responses = json!([{
            "StatusCode": status_code,
            "ResponseParameters": method_params,
        }]);
        (integration, method_responses)
    }
}
