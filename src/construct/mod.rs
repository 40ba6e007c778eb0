//! Construction context
//!
//! An [`App`] holds stacks; a [`Stack`] holds the construct tree, the
//! resource declarations rendered while constructs are built, and the
//! outputs. Constructs register themselves here as they are created, so the
//! order in which the caller builds them is the order they are declared.

pub mod path;
pub mod template;

pub use path::{logical_id, node_address, ConstructPath};
pub use template::{CfnOutput, CfnResource, Template};

use crate::compute::asset::AssetManifestEntry;
use crate::error::{AppError, Result};
use crate::token::{pseudo, Token};
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const MAX_STACK_NAME_LEN: usize = 128;

/// Target account and region. `None` defers to the provisioning engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    pub account: Option<String>,
    pub region: Option<String>,
}

impl Environment {
    pub fn account_token(&self) -> Token {
        match &self.account {
            Some(account) => Token::literal(account),
            None => Token::pseudo(pseudo::ACCOUNT_ID),
        }
    }

    pub fn region_token(&self) -> Token {
        match &self.region {
            Some(region) => Token::literal(region),
            None => Token::pseudo(pseudo::REGION),
        }
    }

    pub fn is_agnostic(&self) -> bool {
        self.account.is_none() && self.region.is_none()
    }
}

#[derive(Debug, Clone, Default)]
pub struct StackProps {
    pub env: Environment,
    pub description: Option<String>,
}

/// A non-fatal finding attached to a construct
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub path: String,
    pub message: String,
}

/// Root of the construct tree
#[derive(Debug, Default)]
pub struct App {
    stacks: Vec<Stack>,
}

impl App {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.stacks.iter().any(|s| s.name == name)
    }

    /// Register a fully assembled stack. Names are unique within an app.
    pub fn add_stack(&mut self, stack: Stack) -> Result<&Stack> {
        if self.contains(&stack.name) {
            return Err(AppError::Conflict(format!(
                "There is already a stack named '{}' in this app",
                stack.name
            )));
        }
        info!(stack = %stack.name, "Registered stack");
        self.stacks.push(stack);
        Ok(&self.stacks[self.stacks.len() - 1])
    }

    pub fn stack(&self, name: &str) -> Option<&Stack> {
        self.stacks.iter().find(|s| s.name == name)
    }

    pub fn stacks(&self) -> &[Stack] {
        &self.stacks
    }

    /// Write `<stack>.template.json` and `<stack>.assets.json` for every stack
    pub fn synth(&self, outdir: &Path) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(outdir)?;
        let mut written = Vec::new();
        for stack in &self.stacks {
            let template = stack.synth()?;
            let template_path = outdir.join(format!("{}.template.json", stack.name));
            fs::write(&template_path, template.to_json_pretty()?)?;
            written.push(template_path);

            let assets_path = outdir.join(format!("{}.assets.json", stack.name));
            fs::write(&assets_path, serde_json::to_string_pretty(&stack.assets)?)?;
            written.push(assets_path);

            info!(
                stack = %stack.name,
                resources = template.resources.len(),
                outdir = %outdir.display(),
                "Synthesized stack"
            );
        }
        Ok(written)
    }
}

/// A unit of deployment
#[derive(Debug, Clone)]
pub struct Stack {
    name: String,
    env: Environment,
    description: Option<String>,
    paths: HashSet<String>,
    registrations: Vec<ConstructPath>,
    resources: Vec<(String, CfnResource)>,
    outputs: Vec<(String, CfnOutput)>,
    assets: Vec<AssetManifestEntry>,
    warnings: Vec<Warning>,
}

impl Stack {
    pub fn new(name: &str, props: StackProps) -> Result<Self> {
        validate_stack_name(name)?;
        Ok(Self {
            name: name.to_string(),
            env: props.env,
            description: props.description,
            paths: HashSet::new(),
            registrations: Vec::new(),
            resources: Vec::new(),
            outputs: Vec::new(),
            assets: Vec::new(),
            warnings: Vec::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    /// Claim a construct path. Siblings must have distinct ids.
    pub fn register(&mut self, path: &ConstructPath) -> Result<()> {
        let key = path.to_string();
        if !self.paths.insert(key.clone()) {
            let parent = key
                .rsplit_once('/')
                .map(|(parent, _)| parent.to_string())
                .unwrap_or_else(|| self.name.clone());
            return Err(AppError::Conflict(format!(
                "There is already a construct with name '{}' in {}",
                path.id(),
                parent
            )));
        }
        debug!(stack = %self.name, path = %key, "Registered construct");
        self.registrations.push(path.clone());
        Ok(())
    }

    /// Construct paths in registration order
    pub fn registrations(&self) -> &[ConstructPath] {
        &self.registrations
    }

    /// Declare a resource at `path`; returns its logical id
    pub fn add_resource(&mut self, path: &ConstructPath, resource: CfnResource) -> Result<String> {
        let logical_id = logical_id(&path.components())?;
        if self.resource(&logical_id).is_some() {
            return Err(AppError::Conflict(format!(
                "Logical id '{}' for '{}' is already in use",
                logical_id, path
            )));
        }
        self.register(path)?;
        self.resources.push((logical_id.clone(), resource));
        Ok(logical_id)
    }

    /// Declared resources in declaration order
    pub fn resources(&self) -> &[(String, CfnResource)] {
        &self.resources
    }

    pub fn resource(&self, logical_id: &str) -> Option<&CfnResource> {
        self.resources
            .iter()
            .find(|(id, _)| id == logical_id)
            .map(|(_, r)| r)
    }

    pub fn resource_mut(&mut self, logical_id: &str) -> Result<&mut CfnResource> {
        self.resources
            .iter_mut()
            .find(|(id, _)| id == logical_id)
            .map(|(_, r)| r)
            .ok_or_else(|| AppError::NotFound(format!("resource '{}'", logical_id)))
    }

    pub fn add_output(&mut self, id: &str, value: Token, description: Option<String>) -> Result<()> {
        let path = ConstructPath::root(id)?;
        let logical_id = logical_id(&path.components())?;
        if self.outputs.iter().any(|(existing, _)| *existing == logical_id) {
            return Err(AppError::Conflict(format!(
                "Output id '{}' for '{}' is already in use",
                logical_id, id
            )));
        }
        self.register(&path)?;
        self.outputs
            .push((logical_id, CfnOutput { value, description }));
        Ok(())
    }

    pub fn outputs(&self) -> &[(String, CfnOutput)] {
        &self.outputs
    }

    /// Address of the construct at `path`, unique across the app
    pub fn node_address(&self, path: &ConstructPath) -> String {
        let mut components = vec![self.name.as_str()];
        components.extend(path.components());
        node_address(&components)
    }

    pub fn add_asset(&mut self, entry: AssetManifestEntry) {
        if !self.assets.iter().any(|a| a.hash == entry.hash) {
            self.assets.push(entry);
        }
    }

    pub fn assets(&self) -> &[AssetManifestEntry] {
        &self.assets
    }

    pub fn add_warning(&mut self, path: &ConstructPath, message: impl Into<String>) {
        let warning = Warning {
            path: format!("/{}/{}", self.name, path),
            message: message.into(),
        };
        warn!(path = %warning.path, "{}", warning.message);
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Render the template, checking late-bound wiring first
    pub fn synth(&self) -> Result<Template> {
        self.check_references()?;
        self.check_gateway_wiring()?;

        let mut metadata = Map::new();
        if !self.env.is_agnostic() {
            metadata.insert(
                "authstack:environment".to_string(),
                json!({ "account": self.env.account, "region": self.env.region }),
            );
        }

        Ok(Template {
            description: self.description.clone(),
            metadata,
            resources: self.resources.clone(),
            outputs: self.outputs.clone(),
        })
    }

    fn check_references(&self) -> Result<()> {
        for (id, output) in &self.outputs {
            for target in output.value.references() {
                if self.resource(target).is_none() {
                    return Err(AppError::Synthesis(format!(
                        "output '{}' references unknown resource '{}'",
                        id, target
                    )));
                }
            }
        }
        for (id, resource) in &self.resources {
            let mut targets = Vec::new();
            for value in resource.properties.values() {
                collect_references(value, &mut targets);
            }
            if let Some(target) = targets.into_iter().find(|t| self.resource(t).is_none()) {
                return Err(AppError::Synthesis(format!(
                    "resource '{}' references unknown resource '{}'",
                    id, target
                )));
            }
            for dependency in &resource.depends_on {
                if self.resource(dependency).is_none() {
                    return Err(AppError::Synthesis(format!(
                        "resource '{}' depends on unknown resource '{}'",
                        id, dependency
                    )));
                }
            }
        }
        Ok(())
    }

    fn check_gateway_wiring(&self) -> Result<()> {
        for (id, resource) in &self.resources {
            match resource.resource_type.as_str() {
                "AWS::ApiGateway::Authorizer" if resource.property("RestApiId").is_none() => {
                    return Err(AppError::Synthesis(format!(
                        "Authorizer '{}' must be attached to a RestApi",
                        id
                    )));
                }
                "AWS::ApiGateway::Deployment" if resource.depends_on.is_empty() => {
                    return Err(AppError::Synthesis(format!(
                        "The REST API of deployment '{}' doesn't contain any methods",
                        id
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Logical ids named by `Ref` and `Fn::GetAtt` anywhere inside `value`
fn collect_references<'a>(value: &'a Value, out: &mut Vec<&'a str>) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(id)) = map.get("Ref") {
                if !id.starts_with("AWS::") {
                    out.push(id);
                }
            }
            match map.get("Fn::GetAtt") {
                Some(Value::Array(args)) => {
                    if let Some(Value::String(id)) = args.first() {
                        out.push(id);
                    }
                }
                Some(Value::String(dotted)) => {
                    if let Some((id, _)) = dotted.split_once('.') {
                        out.push(id);
                    }
                }
                _ => {}
            }
            for nested in map.values() {
                collect_references(nested, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_references(item, out);
            }
        }
        _ => {}
    }
}

fn validate_stack_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let starts_with_letter = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
    let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || c == '-');
    if !starts_with_letter || !rest_ok || name.len() > MAX_STACK_NAME_LEN {
        return Err(AppError::invalid(
            "stack_name",
            format!(
                "'{}' must match [A-Za-z][A-Za-z0-9-]* and be at most {} characters",
                name, MAX_STACK_NAME_LEN
            ),
        ));
    }
    Ok(())
}
