//! Method integrations

use crate::compute::ComputeEndpointHandle;
use crate::token::{pseudo, Token};
use serde_json::{json, Value};

/// Backend a gateway method forwards to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Integration {
    /// Proxy the whole request to a function
    Lambda(ComputeEndpointHandle),
    /// Answer from the gateway itself with an empty `200`
    Mock,
}

impl Integration {
    pub fn lambda(function: &ComputeEndpointHandle) -> Self {
        Integration::Lambda(function.clone())
    }

    pub(crate) fn render(&self) -> Value {
        match self {
            Integration::Lambda(function) => json!({
                "Type": "AWS_PROXY",
                "IntegrationHttpMethod": "POST",
                "Uri": Token::join(vec![
                    "arn:".into(),
                    Token::pseudo(pseudo::PARTITION),
                    ":apigateway:".into(),
                    Token::pseudo(pseudo::REGION),
                    ":lambda:path/2015-03-31/functions/".into(),
                    function.function_arn(),
                    "/invocations".into(),
                ]),
            }),
            Integration::Mock => json!({
                "Type": "MOCK",
                "RequestTemplates": { "application/json": "{ statusCode: 200 }" },
                "IntegrationResponses": [{ "StatusCode": "200" }],
            }),
        }
    }
}
