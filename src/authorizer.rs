//! Cognito authorizer
//!
//! An authorizer is declared on its own and bound to a REST API the first
//! time a method uses it. Binding it to a second API is rejected.

use crate::construct::{CfnResource, ConstructPath, Stack};
use crate::error::{AppError, Result};
use crate::identity::IdentityDirectoryHandle;
use crate::token::Token;
use chrono::Duration;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

pub const DEFAULT_IDENTITY_SOURCE: &str = "method.request.header.Authorization";

const MAX_RESULTS_CACHE_TTL_SECS: i64 = 3600;

#[derive(Debug, Clone, PartialEq)]
pub struct AuthorizerConfig {
    /// Directories whose tokens the authorizer accepts; must not be empty
    pub identity_directories: Vec<IdentityDirectoryHandle>,
    pub authorizer_name: Option<String>,
    pub identity_source: String,
    pub results_cache_ttl: Option<Duration>,
}

impl AuthorizerConfig {
    pub fn new(identity_directories: Vec<IdentityDirectoryHandle>) -> Self {
        Self {
            identity_directories,
            authorizer_name: None,
            identity_source: DEFAULT_IDENTITY_SOURCE.to_string(),
            results_cache_ttl: None,
        }
    }

    fn render(&self, default_name: &str) -> Result<Value> {
        if self.identity_directories.is_empty() {
            return Err(AppError::invalid(
                "identity_directories",
                "at least one identity directory is required",
            ));
        }
        if !self.identity_source.starts_with("method.request.") {
            return Err(AppError::invalid(
                "identity_source",
                format!("'{}' must start with 'method.request.'", self.identity_source),
            ));
        }
        let mut props = Map::new();
        props.insert("Type".to_string(), json!("COGNITO_USER_POOLS"));
        props.insert(
            "Name".to_string(),
            json!(self.authorizer_name.as_deref().unwrap_or(default_name)),
        );
        props.insert("IdentitySource".to_string(), json!(self.identity_source));
        let arns: Vec<Token> = self
            .identity_directories
            .iter()
            .map(IdentityDirectoryHandle::user_pool_arn)
            .collect();
        props.insert("ProviderARNs".to_string(), json!(arns));
        if let Some(ttl) = self.results_cache_ttl {
            let secs = ttl.num_seconds();
            if !(0..=MAX_RESULTS_CACHE_TTL_SECS).contains(&secs) {
                return Err(AppError::invalid(
                    "results_cache_ttl",
                    format!("must be between 0 and {} seconds", MAX_RESULTS_CACHE_TTL_SECS),
                ));
            }
            props.insert("AuthorizerResultTtlInSeconds".to_string(), json!(secs));
        }
        Ok(Value::Object(props))
    }
}

/// Reference to a declared authorizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizerHandle {
    path: ConstructPath,
    logical_id: String,
}

impl AuthorizerHandle {
    pub fn path(&self) -> &ConstructPath {
        &self.path
    }

    pub fn logical_id(&self) -> &str {
        &self.logical_id
    }

    pub fn authorizer_id(&self) -> Token {
        Token::reference(&self.logical_id)
    }

    /// Bind to `rest_api`; a no-op when already bound to it
    pub(crate) fn bind(&self, stack: &mut Stack, rest_api: &str) -> Result<()> {
        let resource = stack.resource_mut(&self.logical_id)?;
        let api_ref = json!(Token::reference(rest_api));
        match resource.property("RestApiId") {
            Some(existing) if *existing == api_ref => Ok(()),
            Some(_) => Err(AppError::invalid(
                "authorizer",
                format!(
                    "Cannot attach authorizer '{}' to a different rest api",
                    self.path
                ),
            )),
            None => {
                resource.set_property("RestApiId", api_ref);
                debug!(authorizer = %self.logical_id, rest_api, "Bound authorizer");
                Ok(())
            }
        }
    }
}

pub struct Authorizer;

impl Authorizer {
    pub fn new(stack: &mut Stack, id: &str, config: AuthorizerConfig) -> Result<AuthorizerHandle> {
        let path = ConstructPath::root(id)?;
        let default_name = format!(
            "{}{}",
            stack.name().replace('-', ""),
            crate::construct::logical_id(&path.components())?
        );
        let properties = config.render(&default_name)?;
        stack.register(&path)?;
        let logical_id = stack.add_resource(
            &path.child("Resource")?,
            CfnResource::new("AWS::ApiGateway::Authorizer", properties),
        )?;

        info!(
            stack = %stack.name(),
            id,
            logical_id = %logical_id,
            directories = config.identity_directories.len(),
            "Declared authorizer"
        );
        Ok(AuthorizerHandle { path, logical_id })
    }
}
