use authstack::construct::{App, StackProps};
use authstack::stack::{self, DEFAULT_STACK_NAME};
use pretty_assertions::assert_eq;
use rstest::rstest;
use serde_json::Value;
use std::fs;
use std::path::PathBuf;

fn asset_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("lambda")
}

fn synthesized_app() -> (App, tempfile::TempDir, Vec<PathBuf>) {
    let mut app = App::new();
    stack::define_with_assets(&mut app, DEFAULT_STACK_NAME, StackProps::default(), &asset_dir())
        .unwrap();
    let outdir = tempfile::tempdir().unwrap();
    let written = app.synth(outdir.path()).unwrap();
    (app, outdir, written)
}

fn read_json(path: &PathBuf) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn test_synth_writes_template_and_asset_manifest() {
    let (_app, outdir, written) = synthesized_app();
    assert_eq!(
        written,
        vec![
            outdir.path().join("AwscdkamplifycognitoStack.template.json"),
            outdir.path().join("AwscdkamplifycognitoStack.assets.json"),
        ]
    );

    let template = read_json(&written[0]);
    let assets = read_json(&written[1]);
    let assets = assets.as_array().unwrap();
    assert_eq!(assets.len(), 1);

    let function = template["Resources"]
        .as_object()
        .unwrap()
        .values()
        .find(|r| r["Type"] == "AWS::Lambda::Function")
        .unwrap();
    assert_eq!(function["Properties"]["Code"]["S3Key"], assets[0]["objectKey"]);
    assert_eq!(function["Properties"]["Runtime"], "nodejs12.x");
    assert_eq!(function["Properties"]["Handler"], "example.handler");
    assert_eq!(function["Metadata"]["aws:asset:property"], "Code");
}

#[rstest]
#[case("AWS::Cognito::UserPool", 1)]
#[case("AWS::Cognito::UserPoolClient", 1)]
#[case("AWS::ApiGateway::RestApi", 1)]
#[case("AWS::ApiGateway::Resource", 1)]
#[case("AWS::ApiGateway::Method", 3)]
#[case("AWS::ApiGateway::Authorizer", 1)]
#[case("AWS::ApiGateway::Deployment", 1)]
#[case("AWS::ApiGateway::Stage", 1)]
#[case("AWS::ApiGateway::Account", 1)]
#[case("AWS::Lambda::Function", 1)]
#[case("AWS::Lambda::Permission", 2)]
#[case("AWS::IAM::Role", 2)]
fn test_template_resource_counts(#[case] resource_type: &str, #[case] expected: usize) {
    let (_app, _outdir, written) = synthesized_app();
    let template = read_json(&written[0]);
    let count = template["Resources"]
        .as_object()
        .unwrap()
        .values()
        .filter(|r| r["Type"] == resource_type)
        .count();
    assert_eq!(count, expected);
}

#[test]
fn test_written_outputs_keep_declaration_order() {
    let (_app, _outdir, written) = synthesized_app();
    let raw = fs::read_to_string(&written[0]).unwrap();
    let outputs_at = raw.find("\"Outputs\"").unwrap();
    let positions: Vec<usize> = [
        "\"UserPoolId\"",
        "\"UserPoolWebClientId\"",
        "\"UserSignupURL\"",
        "\"APIGatewayURL\"",
    ]
    .iter()
    .map(|key| outputs_at + raw[outputs_at..].find(key).unwrap())
    .collect();
    let mut sorted = positions.clone();
    sorted.sort_unstable();
    assert_eq!(positions, sorted);
}

#[test]
fn test_deployment_waits_for_every_method() {
    let (app, _outdir, _) = synthesized_app();
    let template = app.stack(DEFAULT_STACK_NAME).unwrap().synth().unwrap();
    let methods: Vec<&str> = template
        .resources_of_type("AWS::ApiGateway::Method")
        .map(|(id, _)| id)
        .collect();
    let (_, deployment) = template
        .resources_of_type("AWS::ApiGateway::Deployment")
        .next()
        .unwrap();
    assert_eq!(deployment.depends_on, methods);
}

#[test]
fn test_synth_is_repeatable() {
    let (app, _outdir, written) = synthesized_app();
    let first = fs::read_to_string(&written[0]).unwrap();
    let again = tempfile::tempdir().unwrap();
    let rewritten = app.synth(again.path()).unwrap();
    assert_eq!(first, fs::read_to_string(&rewritten[0]).unwrap());
}
