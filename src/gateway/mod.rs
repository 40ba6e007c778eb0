//! REST gateway (API Gateway REST API)
//!
//! The gateway owns a tree of path resources rooted at `/`. Each method binds
//! one integration and at most one authorizer. With `deploy` enabled a
//! deployment and stage are declared up front and every method added later
//! becomes a dependency of the deployment.

pub mod cors;
pub mod integration;

pub use cors::CorsPolicy;
pub use integration::Integration;

use crate::authorizer::AuthorizerHandle;
use crate::construct::{logical_id, CfnResource, ConstructPath, Stack};
use crate::error::{AppError, Result};
use crate::token::{pseudo, Token};
use serde_json::{json, Map, Value};
use tracing::info;

pub const DEFAULT_STAGE_NAME: &str = "prod";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    pub rest_api_name: Option<String>,
    pub description: Option<String>,
    /// Adds an `OPTIONS` preflight method to the root and every child resource
    pub default_cors_preflight_options: Option<CorsPolicy>,
    pub deploy: bool,
    pub stage_name: String,
    /// Declare the account-level role the gateway uses to write logs
    pub cloud_watch_role: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            rest_api_name: None,
            description: None,
            default_cors_preflight_options: None,
            deploy: true,
            stage_name: DEFAULT_STAGE_NAME.to_string(),
            cloud_watch_role: true,
        }
    }
}

/// Who may call a method
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodAuthorization {
    None,
    Iam,
    /// Callers present a token issued by one of the authorizer's directories
    Cognito(AuthorizerHandle),
}

impl MethodAuthorization {
    pub fn authorization_type(&self) -> &'static str {
        match self {
            MethodAuthorization::None => "NONE",
            MethodAuthorization::Iam => "AWS_IAM",
            MethodAuthorization::Cognito(_) => "COGNITO_USER_POOLS",
        }
    }
}

/// A node in the gateway's path tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayResource {
    path: ConstructPath,
    rest_api: String,
    resource_id: Token,
    resource_path: String,
}

impl GatewayResource {
    pub fn path(&self) -> &ConstructPath {
        &self.path
    }

    pub fn resource_id(&self) -> &Token {
        &self.resource_id
    }

    /// HTTP path, `/` for the root
    pub fn resource_path(&self) -> &str {
        &self.resource_path
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodHandle {
    path: ConstructPath,
    logical_id: String,
    http_method: String,
    resource_path: String,
}

impl MethodHandle {
    pub fn path(&self) -> &ConstructPath {
        &self.path
    }

    pub fn logical_id(&self) -> &str {
        &self.logical_id
    }

    pub fn http_method(&self) -> &str {
        &self.http_method
    }

    pub fn resource_path(&self) -> &str {
        &self.resource_path
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Deployment {
    deployment_id: String,
    stage_id: String,
}

#[derive(Debug, Clone)]
pub struct Gateway {
    path: ConstructPath,
    logical_id: String,
    root: GatewayResource,
    cors: Option<CorsPolicy>,
    deployment: Option<Deployment>,
    region: Token,
    account: Token,
}

impl Gateway {
    pub fn new(stack: &mut Stack, id: &str, config: GatewayConfig) -> Result<Self> {
        if let Some(cors) = &config.default_cors_preflight_options {
            cors.check()?;
        }
        if config.deploy && !valid_stage_name(&config.stage_name) {
            return Err(AppError::invalid(
                "stage_name",
                format!("'{}' may only contain alphanumerics, '-' and '_'", config.stage_name),
            ));
        }

        let path = ConstructPath::root(id)?;
        stack.register(&path)?;

        let mut props = Map::new();
        props.insert(
            "Name".to_string(),
            json!(config.rest_api_name.as_deref().unwrap_or(id)),
        );
        if let Some(description) = &config.description {
            props.insert("Description".to_string(), json!(description));
        }
        let logical_id = stack.add_resource(
            &path.child("Resource")?,
            CfnResource::new("AWS::ApiGateway::RestApi", Value::Object(props)),
        )?;

        if config.cloud_watch_role {
            declare_cloud_watch_role(stack, &path, &logical_id)?;
        }

        let deployment = if config.deploy {
            Some(declare_deployment(stack, &path, &logical_id, &config.stage_name)?)
        } else {
            None
        };

        let root_path = path.child(crate::construct::path::DEFAULT_CHILD_ID)?;
        stack.register(&root_path)?;
        let root = GatewayResource {
            path: root_path,
            rest_api: logical_id.clone(),
            resource_id: Token::get_att(&logical_id, "RootResourceId"),
            resource_path: "/".to_string(),
        };

        let gateway = Self {
            path,
            logical_id,
            root,
            cors: config.default_cors_preflight_options,
            deployment,
            region: stack.env().region_token(),
            account: stack.env().account_token(),
        };

        if let Some(cors) = &gateway.cors {
            if cors.is_credentialed_wildcard() {
                stack.add_warning(
                    &gateway.path,
                    "CORS allows credentialed requests from any origin ('*' with allow_credentials)",
                );
            }
        }
        gateway.add_preflight(stack, &gateway.root)?;

        info!(
            stack = %stack.name(),
            id,
            logical_id = %gateway.logical_id,
            deploy = gateway.deployment.is_some(),
            cors = gateway.cors.is_some(),
            "Declared gateway"
        );
        Ok(gateway)
    }

    pub fn path(&self) -> &ConstructPath {
        &self.path
    }

    pub fn logical_id(&self) -> &str {
        &self.logical_id
    }

    pub fn rest_api_id(&self) -> Token {
        Token::reference(&self.logical_id)
    }

    pub fn root(&self) -> &GatewayResource {
        &self.root
    }

    pub fn cors(&self) -> Option<&CorsPolicy> {
        self.cors.as_ref()
    }

    /// Base URL of the deployment stage
    pub fn url(&self) -> Result<Token> {
        let deployment = self.deployment.as_ref().ok_or_else(|| {
            AppError::invalid("deploy", "the gateway URL requires a deployment stage")
        })?;
        Ok(Token::join(vec![
            "https://".into(),
            self.rest_api_id(),
            ".execute-api.".into(),
            self.region.clone(),
            ".".into(),
            Token::pseudo(pseudo::URL_SUFFIX),
            "/".into(),
            Token::reference(&deployment.stage_id),
            "/".into(),
        ]))
    }

    /// Add a child path resource under `parent`
    pub fn add_resource(
        &self,
        stack: &mut Stack,
        parent: &GatewayResource,
        path_part: &str,
    ) -> Result<GatewayResource> {
        self.check_owned(parent)?;
        if !valid_path_part(path_part) {
            return Err(AppError::invalid(
                "path_part",
                format!("'{}' is not a valid resource path part", path_part),
            ));
        }

        let path = parent.path.child(path_part)?;
        stack.register(&path)?;
        let logical_id = stack.add_resource(
            &path.child("Resource")?,
            CfnResource::new(
                "AWS::ApiGateway::Resource",
                json!({
                    "ParentId": parent.resource_id,
                    "PathPart": path_part,
                    "RestApiId": self.rest_api_id(),
                }),
            ),
        )?;

        let resource_path = if parent.resource_path == "/" {
            format!("/{}", path_part)
        } else {
            format!("{}/{}", parent.resource_path, path_part)
        };
        let resource = GatewayResource {
            path,
            rest_api: self.logical_id.clone(),
            resource_id: Token::reference(logical_id),
            resource_path,
        };
        self.add_preflight(stack, &resource)?;
        Ok(resource)
    }

    /// Bind `integration` and `authorization` to `http_method` on `resource`
    pub fn add_method(
        &self,
        stack: &mut Stack,
        resource: &GatewayResource,
        http_method: &str,
        integration: Integration,
        authorization: MethodAuthorization,
    ) -> Result<MethodHandle> {
        self.check_owned(resource)?;
        let http_method = http_method.to_uppercase();
        if http_method != "ANY" && !cors::ALL_METHODS.contains(&http_method.as_str()) {
            return Err(AppError::invalid(
                "http_method",
                format!("'{}' is not a supported HTTP method", http_method),
            ));
        }

        if let MethodAuthorization::Cognito(authorizer) = &authorization {
            authorizer.bind(stack, &self.logical_id)?;
        }

        let path = resource.path.child(&http_method)?;
        stack.register(&path)?;

        if let Integration::Lambda(function) = &integration {
            self.grant_invoke(stack, function, &http_method, &resource.resource_path)?;
        }

        let mut props = Map::new();
        props.insert("HttpMethod".to_string(), json!(http_method));
        props.insert("ResourceId".to_string(), json!(resource.resource_id));
        props.insert("RestApiId".to_string(), json!(self.rest_api_id()));
        props.insert(
            "AuthorizationType".to_string(),
            json!(authorization.authorization_type()),
        );
        if let MethodAuthorization::Cognito(authorizer) = &authorization {
            props.insert("AuthorizerId".to_string(), json!(authorizer.authorizer_id()));
        }
        props.insert("Integration".to_string(), integration.render());

        let logical_id = stack.add_resource(
            &path.child("Resource")?,
            CfnResource::new("AWS::ApiGateway::Method", Value::Object(props)),
        )?;
        self.track_method(stack, &logical_id)?;

        info!(
            stack = %stack.name(),
            method = %http_method,
            resource = %resource.resource_path,
            authorization = authorization.authorization_type(),
            "Declared gateway method"
        );
        Ok(MethodHandle {
            path,
            logical_id,
            http_method,
            resource_path: resource.resource_path.clone(),
        })
    }

    fn check_owned(&self, resource: &GatewayResource) -> Result<()> {
        if resource.rest_api != self.logical_id {
            return Err(AppError::invalid(
                "resource",
                format!(
                    "'{}' belongs to a different gateway than '{}'",
                    resource.path, self.path
                ),
            ));
        }
        Ok(())
    }

    fn add_preflight(&self, stack: &mut Stack, resource: &GatewayResource) -> Result<()> {
        let Some(cors) = &self.cors else {
            return Ok(());
        };
        let (integration, method_responses) = cors.preflight();
        let path = resource.path.child("OPTIONS")?;
        stack.register(&path)?;
        let logical_id = stack.add_resource(
            &path.child("Resource")?,
            CfnResource::new(
                "AWS::ApiGateway::Method",
                json!({
                    "HttpMethod": "OPTIONS",
                    "ResourceId": resource.resource_id,
                    "RestApiId": self.rest_api_id(),
                    "AuthorizationType": "NONE",
                    "Integration": integration,
                    "MethodResponses": method_responses,
                }),
            ),
        )?;
        self.track_method(stack, &logical_id)
    }

    fn track_method(&self, stack: &mut Stack, method_logical_id: &str) -> Result<()> {
        if let Some(deployment) = &self.deployment {
            stack
                .resource_mut(&deployment.deployment_id)?
                .add_dependency(method_logical_id);
        }
        Ok(())
    }

    /// Allow the gateway to invoke `function`, from the stage and from the console's test-invoke
    fn grant_invoke(
        &self,
        stack: &mut Stack,
        function: &crate::compute::ComputeEndpointHandle,
        http_method: &str,
        resource_path: &str,
    ) -> Result<()> {
        let stage = match &self.deployment {
            Some(deployment) => Token::reference(&deployment.stage_id),
            None => Token::literal("*"),
        };
        let method = if http_method == "ANY" { "*" } else { http_method };
        let description = format!(
            "{}{}.{}.{}",
            stack.name().replace('-', ""),
            self.logical_id,
            http_method,
            resource_path.replace('/', ".")
        );

        for (prefix, stage) in [
            ("ApiPermission", stage),
            ("ApiPermission.Test", Token::literal("test-invoke-stage")),
        ] {
            let source_arn = Token::join(vec![
                "arn:".into(),
                Token::pseudo(pseudo::PARTITION),
                ":execute-api:".into(),
                self.region.clone(),
                ":".into(),
                self.account.clone(),
                ":".into(),
                self.rest_api_id(),
                "/".into(),
                stage,
                format!("/{}{}", method, resource_path).into(),
            ]);
            let path = function.path().child(&format!("{}.{}", prefix, description))?;
            stack.add_resource(
                &path,
                CfnResource::new(
                    "AWS::Lambda::Permission",
                    json!({
                        "Action": "lambda:InvokeFunction",
                        "FunctionName": function.function_arn(),
                        "Principal": "apigateway.amazonaws.com",
                        "SourceArn": source_arn,
                    }),
                ),
            )?;
        }
        Ok(())
    }
}

fn declare_cloud_watch_role(stack: &mut Stack, api: &ConstructPath, rest_api: &str) -> Result<()> {
    let role_path = api.child("CloudWatchRole")?;
    stack.register(&role_path)?;
    let role = stack.add_resource(
        &role_path.child("Resource")?,
        CfnResource::new(
            "AWS::IAM::Role",
            json!({
                "AssumeRolePolicyDocument": {
                    "Statement": [{
                        "Action": "sts:AssumeRole",
                        "Effect": "Allow",
                        "Principal": { "Service": "apigateway.amazonaws.com" }
                    }],
                    "Version": "2012-10-17"
                },
                "ManagedPolicyArns": [Token::join(vec![
                    "arn:".into(),
                    Token::pseudo(pseudo::PARTITION),
                    ":iam::aws:policy/service-role/AmazonAPIGatewayPushToCloudWatchLogs".into(),
                ])]
            }),
        ),
    )?;
    stack.add_resource(
        &api.child("Account")?,
        CfnResource::new(
            "AWS::ApiGateway::Account",
            json!({ "CloudWatchRoleArn": Token::get_att(&role, "Arn") }),
        )
        .with_dependency(rest_api),
    )?;
    Ok(())
}

fn declare_deployment(
    stack: &mut Stack,
    api: &ConstructPath,
    rest_api: &str,
    stage_name: &str,
) -> Result<Deployment> {
    let deployment_path = api.child("Deployment")?;
    stack.register(&deployment_path)?;
    let deployment_id = stack.add_resource(
        &deployment_path.child("Resource")?,
        CfnResource::new(
            "AWS::ApiGateway::Deployment",
            json!({
                "RestApiId": Token::reference(rest_api),
                "Description": "Automatically created by the RestApi construct",
            }),
        ),
    )?;

    let stage_path = api.child(&format!("DeploymentStage.{}", stage_name))?;
    stack.register(&stage_path)?;
    let stage_id = stack.add_resource(
        &stage_path.child("Resource")?,
        CfnResource::new(
            "AWS::ApiGateway::Stage",
            json!({
                "RestApiId": Token::reference(rest_api),
                "DeploymentId": Token::reference(&deployment_id),
                "StageName": stage_name,
            }),
        ),
    )?;
    Ok(Deployment {
        deployment_id,
        stage_id,
    })
}

fn valid_stage_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Plain segments, `{param}` or greedy `{param+}`
fn valid_path_part(part: &str) -> bool {
    let plain = |s: &str| {
        !s.is_empty()
            && s
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | ':'))
    };
    match part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
        Some(inner) => plain(inner.strip_suffix('+').unwrap_or(inner)),
        None => plain(part),
    }
}

/// Logical id a method on `resource` would get; used by tests and tooling
pub fn method_logical_id(resource: &GatewayResource, http_method: &str) -> Result<String> {
    let path = resource.path.child(&http_method.to_uppercase())?.child("Resource")?;
    logical_id(&path.components())
}
