//! Late-bound values
//!
//! Resource ids, ARNs and URLs only exist once the provisioning engine has
//! created the resources. A [`Token`] stands in for such a value and renders
//! to the matching CloudFormation intrinsic function.

use serde::{Serialize, Serializer};
use serde_json::json;
use std::fmt;

/// Pseudo parameters resolved by the provisioning engine
pub mod pseudo {
    pub const ACCOUNT_ID: &str = "AWS::AccountId";
    pub const PARTITION: &str = "AWS::Partition";
    pub const REGION: &str = "AWS::Region";
    pub const URL_SUFFIX: &str = "AWS::URLSuffix";
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Literal(String),
    Ref(String),
    GetAtt(String, String),
    Join(String, Vec<Token>),
    Sub(String),
}

impl Token {
    pub fn literal(value: impl Into<String>) -> Self {
        Token::Literal(value.into())
    }

    pub fn reference(logical_id: impl Into<String>) -> Self {
        Token::Ref(logical_id.into())
    }

    pub fn get_att(logical_id: impl Into<String>, attribute: impl Into<String>) -> Self {
        Token::GetAtt(logical_id.into(), attribute.into())
    }

    /// Concatenate parts; adjacent literals are merged.
    pub fn join(parts: Vec<Token>) -> Self {
        let mut merged: Vec<Token> = Vec::with_capacity(parts.len());
        for part in parts {
            match (merged.last_mut(), part) {
                (Some(Token::Literal(prev)), Token::Literal(next)) => prev.push_str(&next),
                (_, part) => merged.push(part),
            }
        }
        match merged.as_slice() {
            [Token::Literal(only)] => Token::Literal(only.clone()),
            _ => Token::Join(String::new(), merged),
        }
    }

    pub fn sub(template: impl Into<String>) -> Self {
        Token::Sub(template.into())
    }

    pub fn pseudo(name: &str) -> Self {
        Token::Ref(name.to_string())
    }

    pub fn as_literal(&self) -> Option<&str> {
        match self {
            Token::Literal(s) => Some(s),
            _ => None,
        }
    }

    /// Logical ids this value reads from
    pub fn references(&self) -> Vec<&str> {
        match self {
            Token::Literal(_) | Token::Sub(_) => vec![],
            Token::Ref(id) if id.starts_with("AWS::") => vec![],
            Token::Ref(id) | Token::GetAtt(id, _) => vec![id.as_str()],
            Token::Join(_, parts) => parts.iter().flat_map(Token::references).collect(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Token::Literal(s) => json!(s),
            Token::Ref(id) => json!({ "Ref": id }),
            Token::GetAtt(id, attr) => json!({ "Fn::GetAtt": [id, attr] }),
            Token::Join(sep, parts) => {
                let parts: Vec<_> = parts.iter().map(Token::to_json).collect();
                json!({ "Fn::Join": [sep, parts] })
            }
            Token::Sub(template) => json!({ "Fn::Sub": template }),
        }
    }
}

impl From<&str> for Token {
    fn from(value: &str) -> Self {
        Token::literal(value)
    }
}

impl From<String> for Token {
    fn from(value: String) -> Self {
        Token::Literal(value)
    }
}

impl Serialize for Token {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Literal(s) => f.write_str(s),
            Token::Ref(id) => write!(f, "${{Token[Ref:{}]}}", id),
            Token::GetAtt(id, attr) => write!(f, "${{Token[{}.{}]}}", id, attr),
            Token::Join(sep, parts) => {
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        f.write_str(sep)?;
                    }
                    write!(f, "{}", part)?;
                }
                Ok(())
            }
            Token::Sub(template) => f.write_str(template),
        }
    }
}
