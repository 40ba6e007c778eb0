//! Client registration (Cognito user pool client)

use crate::construct::{CfnResource, ConstructPath, Stack};
use crate::error::{AppError, Result};
use crate::identity::IdentityDirectoryHandle;
use crate::token::Token;
use serde_json::{json, Map, Value};
use tracing::info;

const DEFAULT_CALLBACK_URL: &str = "https://example.com";

/// Authentication flows the client may use against the directory
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuthFlows {
    pub admin_user_password: bool,
    pub custom: bool,
    pub user_password: bool,
    pub user_srp: bool,
}

impl AuthFlows {
    /// Refresh-token auth is always added once any flow is enabled
    fn render(&self) -> Option<Vec<&'static str>> {
        let mut flows = Vec::new();
        if self.admin_user_password {
            flows.push("ALLOW_ADMIN_USER_PASSWORD_AUTH");
        }
        if self.custom {
            flows.push("ALLOW_CUSTOM_AUTH");
        }
        if self.user_password {
            flows.push("ALLOW_USER_PASSWORD_AUTH");
        }
        if self.user_srp {
            flows.push("ALLOW_USER_SRP_AUTH");
        }
        if flows.is_empty() {
            return None;
        }
        flows.push("ALLOW_REFRESH_TOKEN_AUTH");
        Some(flows)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OAuthFlows {
    pub authorization_code_grant: bool,
    pub implicit_code_grant: bool,
    pub client_credentials: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OAuthScope {
    Email,
    Phone,
    Profile,
    OpenId,
    /// Grants access to the directory's own user-administration APIs
    CognitoAdmin,
    Custom(String),
}

impl OAuthScope {
    pub fn as_str(&self) -> &str {
        match self {
            OAuthScope::Email => "email",
            OAuthScope::Phone => "phone",
            OAuthScope::Profile => "profile",
            OAuthScope::OpenId => "openid",
            OAuthScope::CognitoAdmin => "aws.cognito.signin.user.admin",
            OAuthScope::Custom(name) => name,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OAuthSettings {
    pub flows: OAuthFlows,
    /// Empty means every built-in scope
    pub scopes: Vec<OAuthScope>,
    pub callback_urls: Option<Vec<String>>,
    pub logout_urls: Option<Vec<String>>,
}

impl OAuthSettings {
    fn render_into(&self, generate_secret: bool, props: &mut Map<String, Value>) -> Result<()> {
        let flows = &self.flows;
        if !flows.authorization_code_grant && !flows.implicit_code_grant && !flows.client_credentials
        {
            return Err(AppError::invalid(
                "o_auth.flows",
                "one of authorization_code_grant, implicit_code_grant or client_credentials must be enabled",
            ));
        }
        if flows.client_credentials && (flows.authorization_code_grant || flows.implicit_code_grant) {
            return Err(AppError::invalid(
                "o_auth.flows",
                "client_credentials cannot be selected along with authorization_code_grant or implicit_code_grant",
            ));
        }
        if flows.client_credentials && !generate_secret {
            return Err(AppError::invalid(
                "o_auth.flows.client_credentials",
                "requires a client secret (generate_secret = true)",
            ));
        }

        let mut allowed = Vec::new();
        if flows.client_credentials {
            allowed.push("client_credentials");
        }
        if flows.implicit_code_grant {
            allowed.push("implicit");
        }
        if flows.authorization_code_grant {
            allowed.push("code");
        }

        let scopes = if self.scopes.is_empty() {
            vec![
                OAuthScope::Phone,
                OAuthScope::Email,
                OAuthScope::OpenId,
                OAuthScope::Profile,
                OAuthScope::CognitoAdmin,
            ]
        } else {
            self.scopes.clone()
        };
        let mut scope_names: Vec<&str> = Vec::with_capacity(scopes.len());
        for scope in &scopes {
            let name = scope.as_str();
            if name.is_empty() || name.chars().any(char::is_whitespace) {
                return Err(AppError::invalid(
                    "o_auth.scopes",
                    format!("invalid scope '{}'", name),
                ));
            }
            if !scope_names.contains(&name) {
                scope_names.push(name);
            }
        }

        let callback_urls = match &self.callback_urls {
            None if flows.authorization_code_grant || flows.implicit_code_grant => {
                Some(vec![DEFAULT_CALLBACK_URL.to_string()])
            }
            Some(urls)
                if urls.is_empty()
                    && (flows.authorization_code_grant || flows.implicit_code_grant) =>
            {
                return Err(AppError::invalid(
                    "o_auth.callback_urls",
                    "must not be empty when authorization code or implicit grant is enabled",
                ));
            }
            other => other.clone(),
        };

        props.insert("AllowedOAuthFlows".to_string(), json!(allowed));
        props.insert("AllowedOAuthFlowsUserPoolClient".to_string(), json!(true));
        props.insert("AllowedOAuthScopes".to_string(), json!(scope_names));
        if let Some(urls) = callback_urls {
            props.insert("CallbackURLs".to_string(), json!(urls));
        }
        if let Some(urls) = &self.logout_urls {
            props.insert("LogoutURLs".to_string(), json!(urls));
        }
        Ok(())
    }
}

/// How a client application authenticates against the directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientRegistrationConfig {
    pub client_name: Option<String>,
    /// `false` registers a public client with no stored secret
    pub generate_secret: bool,
    pub auth_flows: AuthFlows,
    pub o_auth: Option<OAuthSettings>,
    pub prevent_user_existence_errors: bool,
}

impl ClientRegistrationConfig {
    fn render(&self, user_pool: &IdentityDirectoryHandle) -> Result<Value> {
        let mut props = Map::new();
        props.insert("UserPoolId".to_string(), json!(user_pool.user_pool_id()));
        if let Some(name) = &self.client_name {
            props.insert("ClientName".to_string(), json!(name));
        }
        if let Some(flows) = self.auth_flows.render() {
            props.insert("ExplicitAuthFlows".to_string(), json!(flows));
        }
        props.insert("GenerateSecret".to_string(), json!(self.generate_secret));
        if let Some(o_auth) = &self.o_auth {
            o_auth.render_into(self.generate_secret, &mut props)?;
        }
        if self.prevent_user_existence_errors {
            props.insert(
                "PreventUserExistenceErrors".to_string(),
                json!("ENABLED"),
            );
        }
        Ok(Value::Object(props))
    }
}

/// Reference to a declared client registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRegistrationHandle {
    path: ConstructPath,
    logical_id: String,
    node_address: String,
}

impl ClientRegistrationHandle {
    pub fn path(&self) -> &ConstructPath {
        &self.path
    }

    pub fn logical_id(&self) -> &str {
        &self.logical_id
    }

    pub fn client_id(&self) -> Token {
        Token::reference(&self.logical_id)
    }

    /// App-wide unique address of the client construct
    pub fn node_address(&self) -> &str {
        &self.node_address
    }
}

pub struct ClientRegistration;

impl ClientRegistration {
    pub fn new(
        stack: &mut Stack,
        id: &str,
        user_pool: &IdentityDirectoryHandle,
        config: ClientRegistrationConfig,
    ) -> Result<ClientRegistrationHandle> {
        let properties = config.render(user_pool)?;
        let path = ConstructPath::root(id)?;
        stack.register(&path)?;
        let logical_id = stack.add_resource(
            &path.child("Resource")?,
            CfnResource::new("AWS::Cognito::UserPoolClient", properties),
        )?;
        let node_address = stack.node_address(&path);

        info!(
            stack = %stack.name(),
            id,
            logical_id = %logical_id,
            public = !config.generate_secret,
            "Declared client registration"
        );
        Ok(ClientRegistrationHandle {
            path,
            logical_id,
            node_address,
        })
    }
}
