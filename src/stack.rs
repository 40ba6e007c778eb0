//! Example identity-backed API stack
//!
//! Declares, in order: the user pool, its web client, the REST gateway, the
//! function behind `GET /example`, and the authorizer that guards it. The
//! stack is assembled detached and only added to the app once every step
//! has succeeded.

use crate::authorizer::{Authorizer, AuthorizerConfig};
use crate::client::{AuthFlows, ClientRegistrationConfig, OAuthFlows, OAuthScope, OAuthSettings};
use crate::compute::{Code, ComputeEndpoint, ComputeEndpointConfig, Runtime};
use crate::construct::{App, Stack, StackProps};
use crate::error::{AppError, Result};
use crate::gateway::cors::{all_methods, all_origins, default_headers_with};
use crate::gateway::{CorsPolicy, Gateway, GatewayConfig, Integration, MethodAuthorization};
use crate::identity::{
    AccountRecovery, AutoVerify, CustomAttribute, IdentityDirectory, IdentityDirectoryConfig,
    PasswordPolicy, SignInAliases, StandardAttributes, StringAttribute, UserVerification,
    VerificationEmailStyle, NAME_ATTRIBUTE_BOUNDS, REQUIRED_EMAIL,
};
use crate::token::Token;
use chrono::Duration;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

pub const DEFAULT_STACK_NAME: &str = "AwscdkamplifycognitoStack";
pub const DEFAULT_ASSET_DIR: &str = "lambda";

pub const USER_POOL_ID: &str = "awscdk-amplify-cognito";
pub const WEB_CLIENT_ID: &str = "UserPoolWebClient";
pub const API_ID: &str = "exampleapi";
pub const HANDLER_ID: &str = "ExampleHandler";
pub const AUTHORIZER_ID: &str = "exampleAuth";
pub const EXAMPLE_PATH_PART: &str = "example";

const VERIFICATION_MESSAGE: &str = "Hello, this is your account verification code  {####}";

/// Values exported by the stack
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StackOutputs {
    #[serde(rename = "UserPoolId")]
    pub user_pool_id: Token,
    #[serde(rename = "UserPoolWebClientId")]
    pub user_pool_web_client_id: Token,
    /// Node address of the web client construct
    #[serde(rename = "UserSignupURL")]
    pub user_signup_url: String,
    #[serde(rename = "API Gateway URL")]
    pub api_gateway_url: Token,
}

pub fn identity_directory_config() -> IdentityDirectoryConfig {
    let mut custom_attributes = BTreeMap::new();
    custom_attributes.insert(
        "name".to_string(),
        CustomAttribute::String(StringAttribute {
            min_len: Some(*NAME_ATTRIBUTE_BOUNDS.start()),
            max_len: Some(*NAME_ATTRIBUTE_BOUNDS.end()),
            mutable: false,
        }),
    );

    IdentityDirectoryConfig {
        user_pool_name: None,
        sign_in_aliases: SignInAliases {
            username: true,
            email: true,
            phone: false,
            preferred_username: true,
        },
        self_sign_up_enabled: true,
        account_recovery: AccountRecovery::EmailOnly,
        user_verification: UserVerification {
            email_subject: "Please verify your email".to_string(),
            email_body: VERIFICATION_MESSAGE.to_string(),
            email_style: VerificationEmailStyle::Code,
            sms_message: VERIFICATION_MESSAGE.to_string(),
        },
        auto_verify: AutoVerify {
            email: true,
            phone: false,
        },
        standard_attributes: StandardAttributes {
            email: Some(REQUIRED_EMAIL),
            ..Default::default()
        },
        custom_attributes,
        password_policy: PasswordPolicy {
            temp_password_validity: Duration::days(3),
            ..Default::default()
        },
    }
}

pub fn web_client_config() -> ClientRegistrationConfig {
    ClientRegistrationConfig {
        generate_secret: false,
        auth_flows: AuthFlows {
            user_password: true,
            user_srp: true,
            ..Default::default()
        },
        o_auth: Some(OAuthSettings {
            flows: OAuthFlows {
                authorization_code_grant: true,
                ..Default::default()
            },
            scopes: vec![
                OAuthScope::Email,
                OAuthScope::Phone,
                OAuthScope::Profile,
                OAuthScope::CognitoAdmin,
                OAuthScope::OpenId,
            ],
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Open to every origin and method, with credentials allowed
pub fn gateway_config() -> GatewayConfig {
    GatewayConfig {
        rest_api_name: Some("exampleApi".to_string()),
        description: Some("Example endpoint".to_string()),
        default_cors_preflight_options: Some(CorsPolicy {
            allow_origins: all_origins(),
            allow_methods: Some(all_methods()),
            allow_headers: Some(default_headers_with(&["x-api-key"])),
            allow_credentials: true,
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn handler_config(asset_dir: &Path) -> ComputeEndpointConfig {
    ComputeEndpointConfig::new(
        Runtime::Nodejs12x,
        Code::from_asset(asset_dir),
        "example.handler",
    )
}

/// Define the stack in `app` using the default asset directory
pub fn define(app: &mut App, name: &str, props: StackProps) -> Result<StackOutputs> {
    define_with_assets(app, name, props, Path::new(DEFAULT_ASSET_DIR))
}

/// Define the stack in `app`, bundling the function from `asset_dir`.
/// Nothing is added to `app` unless the whole stack assembles.
pub fn define_with_assets(
    app: &mut App,
    name: &str,
    props: StackProps,
    asset_dir: &Path,
) -> Result<StackOutputs> {
    if app.contains(name) {
        return Err(AppError::Conflict(format!(
            "There is already a stack named '{}' in this app",
            name
        )));
    }
    let (stack, outputs) = build(name, props, asset_dir)?;
    app.add_stack(stack)?;
    Ok(outputs)
}

/// Assemble the stack without attaching it to an app
pub fn build(name: &str, props: StackProps, asset_dir: &Path) -> Result<(Stack, StackOutputs)> {
    let mut stack = Stack::new(name, props)?;

    let user_pool = IdentityDirectory::new(&mut stack, USER_POOL_ID, identity_directory_config())?;
    let web_client = user_pool.add_client(&mut stack, WEB_CLIENT_ID, web_client_config())?;
    let api = Gateway::new(&mut stack, API_ID, gateway_config())?;
    let handler = ComputeEndpoint::new(&mut stack, HANDLER_ID, handler_config(asset_dir))?;
    let authorizer = Authorizer::new(
        &mut stack,
        AUTHORIZER_ID,
        AuthorizerConfig::new(vec![user_pool.clone()]),
    )?;

    let example = api.add_resource(&mut stack, api.root(), EXAMPLE_PATH_PART)?;
    api.add_method(
        &mut stack,
        &example,
        "GET",
        Integration::lambda(&handler),
        MethodAuthorization::Cognito(authorizer),
    )?;

    let outputs = StackOutputs {
        user_pool_id: user_pool.user_pool_id(),
        user_pool_web_client_id: web_client.client_id(),
        user_signup_url: web_client.node_address().to_string(),
        api_gateway_url: api.url()?,
    };
    stack.add_output("UserPoolId", outputs.user_pool_id.clone(), None)?;
    stack.add_output(
        "UserPoolWebClientId",
        outputs.user_pool_web_client_id.clone(),
        None,
    )?;
    stack.add_output(
        "UserSignupURL",
        Token::literal(&outputs.user_signup_url),
        None,
    )?;
    stack.add_output("API Gateway URL", outputs.api_gateway_url.clone(), None)?;

    info!(
        stack = %stack.name(),
        resources = stack.resources().len(),
        warnings = stack.warnings().len(),
        "Assembled stack"
    );
    Ok((stack, outputs))
}
