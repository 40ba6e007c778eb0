use authstack::client::ClientRegistration;
use authstack::construct::{logical_id, node_address, App, Environment, Stack, StackProps};
use authstack::identity::IdentityDirectory;
use authstack::stack::{self, StackOutputs, API_ID, DEFAULT_STACK_NAME, USER_POOL_ID, WEB_CLIENT_ID};
use authstack::token::{pseudo, Token};
use authstack::AppError;
use pretty_assertions::assert_eq;
use rstest::rstest;
use serde_json::json;
use std::path::PathBuf;

fn asset_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("lambda")
}

fn build(props: StackProps) -> (Stack, StackOutputs) {
    stack::build(DEFAULT_STACK_NAME, props, &asset_dir()).unwrap()
}

fn explicit_env() -> StackProps {
    StackProps {
        env: Environment {
            account: Some("123456789012".to_string()),
            region: Some("us-west-2".to_string()),
        },
        description: None,
    }
}

#[test]
fn test_constructs_registered_in_dependency_order() {
    let (stack, _) = build(StackProps::default());
    let order: Vec<String> = stack
        .registrations()
        .iter()
        .filter(|p| p.is_top_level() || p.to_string() == "exampleapi/Default/example/GET")
        .map(|p| p.to_string())
        .collect();
    assert_eq!(
        order,
        vec![
            "awscdk-amplify-cognito",
            "UserPoolWebClient",
            "exampleapi",
            "ExampleHandler",
            "exampleAuth",
            "exampleapi/Default/example/GET",
            "UserPoolId",
            "UserPoolWebClientId",
            "UserSignupURL",
            "API Gateway URL",
        ]
    );
}

#[test]
fn test_exactly_four_outputs_with_expected_values() {
    let (stack, outputs) = build(StackProps::default());
    let template = stack.synth().unwrap();

    let names: Vec<&str> = template.outputs.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(
        names,
        vec!["UserPoolId", "UserPoolWebClientId", "UserSignupURL", "APIGatewayURL"]
    );

    let pool_id = logical_id(&[USER_POOL_ID, "Resource"]).unwrap();
    let client_id = logical_id(&[WEB_CLIENT_ID, "Resource"]).unwrap();
    assert_eq!(outputs.user_pool_id, Token::reference(&pool_id));
    assert_eq!(outputs.user_pool_web_client_id, Token::reference(&client_id));
    assert_eq!(
        template.output("UserPoolId").unwrap().value,
        outputs.user_pool_id
    );

    let address = node_address(&[DEFAULT_STACK_NAME, WEB_CLIENT_ID]);
    assert_eq!(outputs.user_signup_url, address);
    assert!(address.starts_with("c8"));
    assert_eq!(address.len(), 42);
    assert_eq!(
        template.output("UserSignupURL").unwrap().value,
        Token::literal(address)
    );

    assert_eq!(
        template.output("APIGatewayURL").unwrap().value,
        outputs.api_gateway_url
    );
}

#[test]
fn test_get_method_is_cognito_authorized() {
    let (stack, _) = build(StackProps::default());
    let template = stack.synth().unwrap();

    let get: Vec<_> = template
        .resources_of_type("AWS::ApiGateway::Method")
        .filter(|(_, r)| r.properties["HttpMethod"] == "GET")
        .collect();
    assert_eq!(get.len(), 1);
    let (_, method) = get[0];
    assert_eq!(method.properties["AuthorizationType"], "COGNITO_USER_POOLS");
    assert!(!method.properties["AuthorizerId"].is_null());
    assert_eq!(method.properties["Integration"]["Type"], "AWS_PROXY");

    let (auth_id, authorizer) = template
        .resources_of_type("AWS::ApiGateway::Authorizer")
        .next()
        .unwrap();
    assert_eq!(method.properties["AuthorizerId"], json!({ "Ref": auth_id }));
    let api_id = logical_id(&[API_ID, "Resource"]).unwrap();
    assert_eq!(authorizer.properties["RestApiId"], json!({ "Ref": api_id }));
}

#[test]
fn test_user_pool_policy() {
    let (stack, outputs) = build(StackProps::default());
    let template = stack.synth().unwrap();
    let pool_id = outputs.user_pool_id.references()[0].to_string();
    let pool = &template.resource(&pool_id).unwrap().properties;

    assert_eq!(pool["AliasAttributes"], json!(["email", "preferred_username"]));
    assert_eq!(pool["AutoVerifiedAttributes"], json!(["email"]));
    assert_eq!(
        pool["AdminCreateUserConfig"]["AllowAdminCreateUserOnly"],
        false
    );
    assert_eq!(
        pool["AccountRecoverySetting"]["RecoveryMechanisms"],
        json!([{ "Name": "verified_email", "Priority": 1 }])
    );
    assert_eq!(pool["EmailVerificationSubject"], "Please verify your email");
    assert_eq!(
        pool["SmsVerificationMessage"],
        "Hello, this is your account verification code  {####}"
    );

    let password = &pool["Policies"]["PasswordPolicy"];
    assert_eq!(password["MinimumLength"], 8);
    assert_eq!(password["RequireSymbols"], true);
    assert_eq!(password["TemporaryPasswordValidityDays"], 3);

    let schema = pool["Schema"].as_array().unwrap();
    let name = schema.iter().find(|a| a["Name"] == "name").unwrap();
    assert_eq!(name["Mutable"], false);
    assert_eq!(
        name["StringAttributeConstraints"],
        json!({ "MinLength": "3", "MaxLength": "35" })
    );
    let email = schema.iter().find(|a| a["Name"] == "email").unwrap();
    assert_eq!(email["Required"], true);
    assert_eq!(email["Mutable"], false);
}

#[test]
fn test_web_client_is_public_code_grant() {
    let (stack, outputs) = build(StackProps::default());
    let client_id = outputs.user_pool_web_client_id.references()[0].to_string();
    let client = &stack.resource(&client_id).unwrap().properties;
    assert_eq!(client["GenerateSecret"], false);
    assert_eq!(client["AllowedOAuthFlows"], json!(["code"]));
    assert_eq!(
        client["AllowedOAuthScopes"],
        json!(["email", "phone", "profile", "aws.cognito.signin.user.admin", "openid"])
    );
    assert_eq!(client["UserPoolId"], json!(outputs.user_pool_id));
}

#[test]
fn test_permissive_cors_is_flagged_not_rejected() {
    let (stack, _) = build(StackProps::default());
    assert_eq!(stack.warnings().len(), 1);
    let warning = &stack.warnings()[0];
    assert_eq!(warning.path, "/AwscdkamplifycognitoStack/exampleapi");
    assert!(warning.message.contains("credentialed"));

    let template = stack.synth().unwrap();
    let preflights = template
        .resources_of_type("AWS::ApiGateway::Method")
        .filter(|(_, r)| r.properties["HttpMethod"] == "OPTIONS")
        .count();
    assert_eq!(preflights, 2);
}

#[test]
fn test_construction_is_deterministic() {
    let (first, _) = build(explicit_env());
    let (second, _) = build(explicit_env());
    assert_eq!(
        first.synth().unwrap().to_json_pretty().unwrap(),
        second.synth().unwrap().to_json_pretty().unwrap()
    );
}

#[test]
fn test_unset_environment_uses_pseudo_parameters() {
    let (stack, outputs) = build(StackProps::default());
    let template = stack.synth().unwrap();
    assert!(template.metadata.is_empty());

    let url = outputs.api_gateway_url.to_json();
    let parts = url["Fn::Join"][1].as_array().unwrap();
    assert!(parts.contains(&json!({ "Ref": pseudo::REGION })));
    assert!(parts.contains(&json!({ "Ref": pseudo::URL_SUFFIX })));
}

#[test]
fn test_explicit_environment_is_inlined() {
    let (stack, outputs) = build(explicit_env());
    let url = outputs.api_gateway_url.to_json();
    let parts = url["Fn::Join"][1].as_array().unwrap();
    assert_eq!(parts[2], ".execute-api.us-west-2.");

    let template = stack.synth().unwrap();
    assert_eq!(
        template.metadata["authstack:environment"]["region"],
        "us-west-2"
    );
    let (_, function) = template
        .resources_of_type("AWS::Lambda::Function")
        .next()
        .unwrap();
    assert_eq!(
        function.properties["Code"]["S3Bucket"],
        "cdk-hnb659fds-assets-123456789012-us-west-2"
    );
}

#[test]
fn test_second_definition_with_same_name_is_rejected() {
    let mut app = App::new();
    stack::define_with_assets(&mut app, DEFAULT_STACK_NAME, StackProps::default(), &asset_dir())
        .unwrap();
    let err = stack::define_with_assets(
        &mut app,
        DEFAULT_STACK_NAME,
        StackProps::default(),
        &asset_dir(),
    )
    .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    assert_eq!(app.stacks().len(), 1);

    stack::define_with_assets(&mut app, "SecondStack", StackProps::default(), &asset_dir()).unwrap();
    assert_eq!(app.stacks().len(), 2);
}

#[rstest]
#[case("")]
#[case("1-starts-with-digit")]
#[case("has_underscore")]
fn test_invalid_stack_name_leaves_app_empty(#[case] name: &str) {
    let mut app = App::new();
    let err =
        stack::define_with_assets(&mut app, name, StackProps::default(), &asset_dir()).unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert!(app.stacks().is_empty());
}

#[test]
fn test_handler_must_exist_in_bundle() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("other.js"), "exports.handler = () => {};").unwrap();
    let err = stack::build(DEFAULT_STACK_NAME, StackProps::default(), dir.path()).unwrap_err();
    assert!(err.to_string().contains("module 'example'"));
}

#[test]
fn test_handle_from_another_stack_fails_synthesis() {
    let mut pools = Stack::new("PoolStack", StackProps::default()).unwrap();
    let pool = IdentityDirectory::new(&mut pools, USER_POOL_ID, stack::identity_directory_config())
        .unwrap();

    let mut clients = Stack::new("ClientStack", StackProps::default()).unwrap();
    ClientRegistration::new(&mut clients, WEB_CLIENT_ID, &pool, stack::web_client_config()).unwrap();

    assert!(pools.synth().is_ok());
    let err = clients.synth().unwrap_err();
    assert!(matches!(err, AppError::Synthesis(_)));
    assert!(err.to_string().contains(pool.logical_id()));
}
