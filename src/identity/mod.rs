//! Identity directory (Cognito user pool)
//!
//! Holds the sign-up, sign-in and verification policy for end users. The
//! handle returned by [`IdentityDirectory::new`] is what client
//! registrations and authorizers take to prove the directory exists.

pub mod attributes;
pub mod password;

pub use attributes::{
    CustomAttribute, StandardAttribute, StandardAttributes, StringAttribute, NAME_ATTRIBUTE_BOUNDS,
    REQUIRED_EMAIL,
};
pub use password::PasswordPolicy;

use crate::client::{ClientRegistration, ClientRegistrationConfig, ClientRegistrationHandle};
use crate::construct::{CfnResource, ConstructPath, Stack};
use crate::error::{AppError, Result};
use crate::token::Token;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use tracing::info;

const CODE_PLACEHOLDER: &str = "{####}";
const LINK_PLACEHOLDER: &str = "{##Verify Email##}";

/// Identifiers a user may sign in with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignInAliases {
    pub username: bool,
    pub email: bool,
    pub phone: bool,
    pub preferred_username: bool,
}

impl Default for SignInAliases {
    fn default() -> Self {
        Self {
            username: true,
            email: false,
            phone: false,
            preferred_username: false,
        }
    }
}

/// How a user recovers a forgotten password
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccountRecovery {
    EmailAndPhoneWithoutMfa,
    #[default]
    PhoneWithoutMfaAndEmail,
    EmailOnly,
    PhoneOnlyWithoutMfa,
    /// Let the directory pick (phone with MFA, then email)
    PhoneAndEmail,
    /// Only an administrator can reset passwords
    None,
}

impl AccountRecovery {
    fn render(&self) -> Option<Value> {
        let mechanisms: &[&str] = match self {
            AccountRecovery::EmailAndPhoneWithoutMfa => &["verified_email", "verified_phone_number"],
            AccountRecovery::PhoneWithoutMfaAndEmail => &["verified_phone_number", "verified_email"],
            AccountRecovery::EmailOnly => &["verified_email"],
            AccountRecovery::PhoneOnlyWithoutMfa => &["verified_phone_number"],
            AccountRecovery::None => &["admin_only"],
            AccountRecovery::PhoneAndEmail => return None,
        };
        let mechanisms: Vec<Value> = mechanisms
            .iter()
            .enumerate()
            .map(|(i, name)| json!({ "Name": name, "Priority": i + 1 }))
            .collect();
        Some(json!({ "RecoveryMechanisms": mechanisms }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VerificationEmailStyle {
    #[default]
    Code,
    Link,
}

/// Messages sent to verify a new user's contact details
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserVerification {
    pub email_subject: String,
    pub email_body: String,
    pub email_style: VerificationEmailStyle,
    pub sms_message: String,
}

impl Default for UserVerification {
    fn default() -> Self {
        Self {
            email_subject: "Verify your new account".to_string(),
            email_body: "The verification code to your new account is {####}".to_string(),
            email_style: VerificationEmailStyle::Code,
            sms_message: "The verification code to your new account is {####}".to_string(),
        }
    }
}

impl UserVerification {
    fn check(&self) -> Result<()> {
        if self.email_subject.trim().is_empty() {
            return Err(AppError::invalid(
                "user_verification.email_subject",
                "must not be empty",
            ));
        }
        let placeholder = match self.email_style {
            VerificationEmailStyle::Code => CODE_PLACEHOLDER,
            VerificationEmailStyle::Link => LINK_PLACEHOLDER,
        };
        if !self.email_body.contains(placeholder) {
            return Err(AppError::invalid(
                "user_verification.email_body",
                format!("must contain the template string '{}'", placeholder),
            ));
        }
        if !self.sms_message.contains(CODE_PLACEHOLDER) {
            return Err(AppError::invalid(
                "user_verification.sms_message",
                format!("must contain the template string '{}'", CODE_PLACEHOLDER),
            ));
        }
        Ok(())
    }

    fn render_into(&self, props: &mut Map<String, Value>) {
        let template = match self.email_style {
            VerificationEmailStyle::Code => {
                props.insert("EmailVerificationMessage".to_string(), json!(self.email_body));
                props.insert("EmailVerificationSubject".to_string(), json!(self.email_subject));
                json!({
                    "DefaultEmailOption": "CONFIRM_WITH_CODE",
                    "EmailMessage": self.email_body,
                    "EmailSubject": self.email_subject,
                    "SmsMessage": self.sms_message,
                })
            }
            VerificationEmailStyle::Link => json!({
                "DefaultEmailOption": "CONFIRM_WITH_LINK",
                "EmailMessageByLink": self.email_body,
                "EmailSubjectByLink": self.email_subject,
                "SmsMessage": self.sms_message,
            }),
        };
        props.insert("SmsVerificationMessage".to_string(), json!(self.sms_message));
        props.insert("VerificationMessageTemplate".to_string(), template);
    }
}

/// Contact attributes verified automatically on sign-up
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AutoVerify {
    pub email: bool,
    pub phone: bool,
}

/// Sign-up, sign-in and verification policy of a directory
#[derive(Debug, Clone, PartialEq)]
pub struct IdentityDirectoryConfig {
    pub user_pool_name: Option<String>,
    pub sign_in_aliases: SignInAliases,
    pub self_sign_up_enabled: bool,
    pub account_recovery: AccountRecovery,
    pub user_verification: UserVerification,
    pub auto_verify: AutoVerify,
    pub standard_attributes: StandardAttributes,
    pub custom_attributes: BTreeMap<String, CustomAttribute>,
    pub password_policy: PasswordPolicy,
}

impl Default for IdentityDirectoryConfig {
    fn default() -> Self {
        Self {
            user_pool_name: None,
            sign_in_aliases: SignInAliases::default(),
            self_sign_up_enabled: false,
            account_recovery: AccountRecovery::default(),
            user_verification: UserVerification::default(),
            auto_verify: AutoVerify::default(),
            standard_attributes: StandardAttributes {
                email: Some(REQUIRED_EMAIL),
                ..Default::default()
            },
            custom_attributes: BTreeMap::new(),
            password_policy: PasswordPolicy::default(),
        }
    }
}

impl IdentityDirectoryConfig {
    fn render(&self) -> Result<Value> {
        let aliases = &self.sign_in_aliases;
        if !aliases.username && !aliases.email && !aliases.phone {
            return Err(AppError::invalid(
                "sign_in_aliases",
                "at least one of username, email or phone must be enabled",
            ));
        }
        if aliases.preferred_username && !aliases.username {
            return Err(AppError::invalid(
                "sign_in_aliases.preferred_username",
                "can only be enabled when username is enabled",
            ));
        }
        if self.standard_attributes.email != Some(REQUIRED_EMAIL) {
            return Err(AppError::invalid(
                "standard_attributes.email",
                "must be declared required and immutable",
            ));
        }
        self.user_verification.check()?;
        self.password_policy.check()?;
        let schema = attributes::render_schema(&self.standard_attributes, &self.custom_attributes)?;

        let mut props = Map::new();
        if let Some(name) = &self.user_pool_name {
            props.insert("UserPoolName".to_string(), json!(name));
        }

        // With usernames enabled the other identifiers are aliases; without
        // them email/phone become the username itself.
        let mut alias_attrs = Vec::new();
        let mut username_attrs = Vec::new();
        let target = if aliases.username {
            &mut alias_attrs
        } else {
            &mut username_attrs
        };
        if aliases.email {
            target.push("email");
        }
        if aliases.phone {
            target.push("phone_number");
        }
        if aliases.preferred_username {
            alias_attrs.push("preferred_username");
        }
        if !alias_attrs.is_empty() {
            props.insert("AliasAttributes".to_string(), json!(alias_attrs));
        }
        if !username_attrs.is_empty() {
            props.insert("UsernameAttributes".to_string(), json!(username_attrs));
        }

        if let Some(recovery) = self.account_recovery.render() {
            props.insert("AccountRecoverySetting".to_string(), recovery);
        }
        props.insert(
            "AdminCreateUserConfig".to_string(),
            json!({ "AllowAdminCreateUserOnly": !self.self_sign_up_enabled }),
        );

        let mut auto_verified = Vec::new();
        if self.auto_verify.email {
            auto_verified.push("email");
        }
        if self.auto_verify.phone {
            auto_verified.push("phone_number");
        }
        if !auto_verified.is_empty() {
            props.insert("AutoVerifiedAttributes".to_string(), json!(auto_verified));
        }

        props.insert("Policies".to_string(), self.password_policy.render());
        if !schema.is_empty() {
            props.insert("Schema".to_string(), json!(schema));
        }
        self.user_verification.render_into(&mut props);

        Ok(Value::Object(props))
    }
}

/// Reference to a declared identity directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityDirectoryHandle {
    path: ConstructPath,
    logical_id: String,
}

impl IdentityDirectoryHandle {
    pub fn path(&self) -> &ConstructPath {
        &self.path
    }

    pub fn logical_id(&self) -> &str {
        &self.logical_id
    }

    pub fn user_pool_id(&self) -> Token {
        Token::reference(&self.logical_id)
    }

    pub fn user_pool_arn(&self) -> Token {
        Token::get_att(&self.logical_id, "Arn")
    }

    pub fn provider_url(&self) -> Token {
        Token::get_att(&self.logical_id, "ProviderURL")
    }

    /// Register a client application against this directory
    pub fn add_client(
        &self,
        stack: &mut Stack,
        id: &str,
        config: ClientRegistrationConfig,
    ) -> Result<ClientRegistrationHandle> {
        ClientRegistration::new(stack, id, self, config)
    }
}

pub struct IdentityDirectory;

impl IdentityDirectory {
    /// Validate `config` and declare the user pool under `id`
    pub fn new(
        stack: &mut Stack,
        id: &str,
        config: IdentityDirectoryConfig,
    ) -> Result<IdentityDirectoryHandle> {
        let properties = config.render()?;
        let path = ConstructPath::root(id)?;
        stack.register(&path)?;
        let logical_id = stack.add_resource(
            &path.child("Resource")?,
            CfnResource::new("AWS::Cognito::UserPool", properties),
        )?;

        info!(stack = %stack.name(), id, logical_id = %logical_id, "Declared identity directory");
        Ok(IdentityDirectoryHandle { path, logical_id })
    }
}
