//! authstack - identity-backed REST API declared as a CloudFormation stack
//!
//! This crate provides typed constructs for a Cognito user pool, its client
//! registrations, an API Gateway REST API, a Lambda function and a Cognito
//! authorizer, plus the stack definition that wires them together and
//! synthesizes a template.

pub mod authorizer;
pub mod client;
pub mod compute;
pub mod config;
pub mod construct;
pub mod error;
pub mod gateway;
pub mod identity;
pub mod stack;
pub mod telemetry;
pub mod token;

// Re-export commonly used types
pub use config::Config;
pub use construct::{App, Environment, Stack, StackProps};
pub use error::{AppError, Result};
pub use stack::StackOutputs;
pub use token::Token;
