//! Compute endpoint (Lambda function)
//!
//! A function is declared together with its execution role. The returned
//! handle is the integration target for gateway methods.

pub mod asset;

use crate::construct::{CfnResource, ConstructPath, Environment, Stack};
use crate::error::{AppError, Result};
use crate::token::{pseudo, Token};
use asset::{asset_bucket, Asset};
use chrono::Duration;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use tracing::info;

const MAX_INLINE_CODE_LEN: usize = 4096;
const MAX_TIMEOUT_SECS: i64 = 900;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Runtime {
    Nodejs12x,
    Nodejs14x,
    Nodejs18x,
    Nodejs20x,
    Python39,
    Python312,
    ProvidedAl2023,
}

impl Runtime {
    pub fn name(&self) -> &'static str {
        match self {
            Runtime::Nodejs12x => "nodejs12.x",
            Runtime::Nodejs14x => "nodejs14.x",
            Runtime::Nodejs18x => "nodejs18.x",
            Runtime::Nodejs20x => "nodejs20.x",
            Runtime::Python39 => "python3.9",
            Runtime::Python312 => "python3.12",
            Runtime::ProvidedAl2023 => "provided.al2023",
        }
    }

    /// Module file extensions the runtime loads handlers from; empty for custom runtimes
    fn module_extensions(&self) -> &'static [&'static str] {
        match self {
            Runtime::Nodejs12x | Runtime::Nodejs14x | Runtime::Nodejs18x | Runtime::Nodejs20x => {
                &["js", "mjs", "cjs"]
            }
            Runtime::Python39 | Runtime::Python312 => &["py"],
            Runtime::ProvidedAl2023 => &[],
        }
    }

    fn supports_inline(&self) -> bool {
        !self.module_extensions().is_empty()
    }
}

/// Where the function's code comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Code {
    /// Local directory or archive, uploaded as a content-addressed asset
    Asset(PathBuf),
    Inline(String),
    Bucket { bucket: String, key: String },
}

impl Code {
    pub fn from_asset(path: impl Into<PathBuf>) -> Self {
        Code::Asset(path.into())
    }

    pub fn from_inline(source: impl Into<String>) -> Self {
        Code::Inline(source.into())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComputeEndpointConfig {
    pub runtime: Runtime,
    pub code: Code,
    /// `<module>.<function>`
    pub handler: String,
    pub description: Option<String>,
    pub timeout: Option<Duration>,
    pub memory_size: Option<u32>,
    pub environment: BTreeMap<String, String>,
}

impl ComputeEndpointConfig {
    pub fn new(runtime: Runtime, code: Code, handler: &str) -> Self {
        Self {
            runtime,
            code,
            handler: handler.to_string(),
            description: None,
            timeout: None,
            memory_size: None,
            environment: BTreeMap::new(),
        }
    }

    fn split_handler(&self) -> Result<(&str, &str)> {
        match self.handler.rsplit_once('.') {
            Some((module, function)) if !module.is_empty() && !function.is_empty() => {
                Ok((module, function))
            }
            _ => Err(AppError::invalid(
                "handler",
                format!("'{}' must be of the form <module>.<function>", self.handler),
            )),
        }
    }

    fn check_limits(&self) -> Result<()> {
        if let Some(timeout) = self.timeout {
            let secs = timeout.num_seconds();
            if secs < 1 || secs > MAX_TIMEOUT_SECS || timeout != Duration::seconds(secs) {
                return Err(AppError::invalid(
                    "timeout",
                    format!("must be whole seconds between 1 and {}", MAX_TIMEOUT_SECS),
                ));
            }
        }
        if let Some(memory) = self.memory_size {
            if !(128..=10240).contains(&memory) {
                return Err(AppError::invalid(
                    "memory_size",
                    format!("{} MB is outside 128..=10240", memory),
                ));
            }
        }
        if let Some(key) = self.environment.keys().find(|k| k.starts_with("AWS_")) {
            return Err(AppError::invalid(
                "environment",
                format!("'{}' is reserved by the runtime", key),
            ));
        }
        Ok(())
    }

    /// Resolve the handler against the code and render the `Code` property
    fn resolve_code(&self, env: &Environment) -> Result<(Value, Option<Asset>)> {
        let (module, function) = self.split_handler()?;
        match &self.code {
            Code::Asset(path) => {
                let asset = Asset::stage(path)?;
                let extensions = self.runtime.module_extensions();
                if path.is_dir() && !extensions.is_empty() {
                    let source = extensions
                        .iter()
                        .map(|ext| path.join(format!("{}.{}", module, ext)))
                        .find(|candidate| candidate.is_file())
                        .ok_or_else(|| {
                            AppError::invalid(
                                "handler",
                                format!(
                                    "module '{}' not found in asset {}",
                                    module,
                                    path.display()
                                ),
                            )
                        })?;
                    let contents = fs::read_to_string(&source)?;
                    if !contents.contains(function) {
                        return Err(AppError::invalid(
                            "handler",
                            format!(
                                "function '{}' is not defined in {}",
                                function,
                                source.display()
                            ),
                        ));
                    }
                }
                let code = json!({
                    "S3Bucket": asset_bucket(env),
                    "S3Key": asset.object_key(),
                });
                Ok((code, Some(asset)))
            }
            Code::Inline(source) => {
                if !self.runtime.supports_inline() {
                    return Err(AppError::invalid(
                        "code",
                        format!("inline code is not supported by {}", self.runtime.name()),
                    ));
                }
                if source.len() > MAX_INLINE_CODE_LEN {
                    return Err(AppError::invalid(
                        "code",
                        format!(
                            "inline source is too large, must be <= {} but is {}",
                            MAX_INLINE_CODE_LEN,
                            source.len()
                        ),
                    ));
                }
                if module != "index" {
                    return Err(AppError::invalid(
                        "handler",
                        format!("inline code is loaded as 'index', got module '{}'", module),
                    ));
                }
                if !source.contains(function) {
                    return Err(AppError::invalid(
                        "handler",
                        format!("function '{}' is not defined in the inline source", function),
                    ));
                }
                Ok((json!({ "ZipFile": source }), None))
            }
            Code::Bucket { bucket, key } => {
                if bucket.is_empty() || key.is_empty() {
                    return Err(AppError::invalid("code", "bucket and key must not be empty"));
                }
                Ok((json!({ "S3Bucket": bucket, "S3Key": key }), None))
            }
        }
    }
}

/// Reference to a declared function
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputeEndpointHandle {
    path: ConstructPath,
    logical_id: String,
    role_logical_id: String,
}

impl ComputeEndpointHandle {
    pub fn path(&self) -> &ConstructPath {
        &self.path
    }

    pub fn logical_id(&self) -> &str {
        &self.logical_id
    }

    pub fn function_name(&self) -> Token {
        Token::reference(&self.logical_id)
    }

    pub fn function_arn(&self) -> Token {
        Token::get_att(&self.logical_id, "Arn")
    }

    pub fn role_arn(&self) -> Token {
        Token::get_att(&self.role_logical_id, "Arn")
    }
}

pub struct ComputeEndpoint;

impl ComputeEndpoint {
    pub fn new(stack: &mut Stack, id: &str, config: ComputeEndpointConfig) -> Result<ComputeEndpointHandle> {
        config.check_limits()?;
        let (code, asset) = config.resolve_code(stack.env())?;

        let path = ConstructPath::root(id)?;
        stack.register(&path)?;

        let role_path = path.child("ServiceRole")?;
        stack.register(&role_path)?;
        let role_logical_id = stack.add_resource(
            &role_path.child("Resource")?,
            CfnResource::new(
                "AWS::IAM::Role",
                json!({
                    "AssumeRolePolicyDocument": {
                        "Statement": [{
                            "Action": "sts:AssumeRole",
                            "Effect": "Allow",
                            "Principal": { "Service": "lambda.amazonaws.com" }
                        }],
                        "Version": "2012-10-17"
                    },
                    "ManagedPolicyArns": [Token::join(vec![
                        "arn:".into(),
                        Token::pseudo(pseudo::PARTITION),
                        ":iam::aws:policy/service-role/AWSLambdaBasicExecutionRole".into(),
                    ])]
                }),
            ),
        )?;

        let mut props = Map::new();
        props.insert("Code".to_string(), code);
        props.insert("Role".to_string(), json!(Token::get_att(&role_logical_id, "Arn")));
        if let Some(description) = &config.description {
            props.insert("Description".to_string(), json!(description));
        }
        if !config.environment.is_empty() {
            props.insert(
                "Environment".to_string(),
                json!({ "Variables": config.environment }),
            );
        }
        props.insert("Handler".to_string(), json!(config.handler));
        if let Some(memory) = config.memory_size {
            props.insert("MemorySize".to_string(), json!(memory));
        }
        props.insert("Runtime".to_string(), json!(config.runtime.name()));
        if let Some(timeout) = config.timeout {
            props.insert("Timeout".to_string(), json!(timeout.num_seconds()));
        }

        let mut function = CfnResource::new("AWS::Lambda::Function", Value::Object(props))
            .with_dependency(&role_logical_id);
        if let Some(asset) = &asset {
            function = function
                .with_metadata("aws:asset:path", json!(asset.source.display().to_string()))
                .with_metadata("aws:asset:property", json!("Code"));
            stack.add_asset(asset.manifest_entry());
        }
        let logical_id = stack.add_resource(&path.child("Resource")?, function)?;

        info!(
            stack = %stack.name(),
            id,
            logical_id = %logical_id,
            runtime = config.runtime.name(),
            handler = %config.handler,
            "Declared compute endpoint"
        );
        Ok(ComputeEndpointHandle {
            path,
            logical_id,
            role_logical_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::construct::StackProps;
    use std::path::Path;
    use tempfile::TempDir;

    fn stack() -> Stack {
        Stack::new("ComputeStack", StackProps::default()).unwrap()
    }

    fn bundle() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("example.js"),
            "exports.handler = async (event) => ({ statusCode: 200, body: 'ok' });\n",
        )
        .unwrap();
        dir
    }

    fn asset_config(dir: &Path, handler: &str) -> ComputeEndpointConfig {
        ComputeEndpointConfig::new(Runtime::Nodejs12x, Code::from_asset(dir), handler)
    }

    #[test]
    fn test_function_and_role_declared() {
        let dir = bundle();
        let mut stack = stack();
        let function = ComputeEndpoint::new(
            &mut stack,
            "ExampleHandler",
            asset_config(dir.path(), "example.handler"),
        )
        .unwrap();

        let resource = stack.resource(function.logical_id()).unwrap();
        assert_eq!(resource.resource_type, "AWS::Lambda::Function");
        assert_eq!(resource.properties["Runtime"], "nodejs12.x");
        assert_eq!(resource.properties["Handler"], "example.handler");
        assert_eq!(resource.depends_on.len(), 1);
        assert_eq!(resource.properties["Role"], json!(function.role_arn()));

        let role = stack.resource(&resource.depends_on[0]).unwrap();
        assert_eq!(role.resource_type, "AWS::IAM::Role");
        assert_eq!(stack.assets().len(), 1);
        assert_eq!(
            resource.properties["Code"]["S3Key"],
            json!(stack.assets()[0].object_key)
        );
    }

    #[test]
    fn test_handler_module_must_exist() {
        let dir = bundle();
        let mut stack = stack();
        let err = ComputeEndpoint::new(&mut stack, "Fn", asset_config(dir.path(), "missing.handler"))
            .unwrap_err();
        assert!(err.to_string().contains("module 'missing'"));
        assert!(stack.registrations().is_empty());
    }

    #[test]
    fn test_handler_function_must_exist() {
        let dir = bundle();
        let mut stack = stack();
        let err = ComputeEndpoint::new(&mut stack, "Fn", asset_config(dir.path(), "example.main"))
            .unwrap_err();
        assert!(err.to_string().contains("function 'main'"));
    }

    #[test]
    fn test_malformed_handler_rejected() {
        let dir = bundle();
        let mut stack = stack();
        for handler in ["example", ".handler", "example."] {
            assert!(ComputeEndpoint::new(&mut stack, "Fn", asset_config(dir.path(), handler)).is_err());
        }
    }

    #[test]
    fn test_missing_asset_rejected() {
        let mut stack = stack();
        let err = ComputeEndpoint::new(
            &mut stack,
            "Fn",
            asset_config(Path::new("/no/such/lambda"), "example.handler"),
        )
        .unwrap_err();
        assert!(err.to_string().contains("Cannot find asset"));
    }

    #[test]
    fn test_inline_code() {
        let mut stack = stack();
        let function = ComputeEndpoint::new(
            &mut stack,
            "Inline",
            ComputeEndpointConfig::new(
                Runtime::Nodejs18x,
                Code::from_inline("exports.handler = async () => 'hi';"),
                "index.handler",
            ),
        )
        .unwrap();
        let props = &stack.resource(function.logical_id()).unwrap().properties;
        assert!(props["Code"]["ZipFile"].as_str().unwrap().contains("handler"));
        assert!(stack.assets().is_empty());
    }

    #[test]
    fn test_inline_code_must_be_index_module() {
        let mut stack = stack();
        let result = ComputeEndpoint::new(
            &mut stack,
            "Inline",
            ComputeEndpointConfig::new(
                Runtime::Nodejs18x,
                Code::from_inline("exports.handler = async () => 'hi';"),
                "example.handler",
            ),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_limits() {
        let mut stack = stack();
        let mut config = ComputeEndpointConfig::new(
            Runtime::Python312,
            Code::Bucket {
                bucket: "artifacts".to_string(),
                key: "fn.zip".to_string(),
            },
            "app.handler",
        );
        config.timeout = Some(Duration::minutes(20));
        assert!(ComputeEndpoint::new(&mut stack, "Fn", config.clone()).is_err());

        config.timeout = Some(Duration::seconds(30));
        config.memory_size = Some(64);
        assert!(ComputeEndpoint::new(&mut stack, "Fn", config.clone()).is_err());

        config.memory_size = Some(512);
        config
            .environment
            .insert("AWS_REGION".to_string(), "x".to_string());
        assert!(ComputeEndpoint::new(&mut stack, "Fn", config.clone()).is_err());

        config.environment.clear();
        config.environment.insert("STAGE".to_string(), "prod".to_string());
        let function = ComputeEndpoint::new(&mut stack, "Fn", config).unwrap();
        let props = &stack.resource(function.logical_id()).unwrap().properties;
        assert_eq!(props["Timeout"], 30);
        assert_eq!(props["Environment"]["Variables"]["STAGE"], "prod");
    }
}
