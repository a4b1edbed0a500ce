// Copyright cfn-policy-audit contributors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::convert::TryFrom;

use pretty_assertions::assert_eq;

use cfn_policy_audit::{
    analyze_template, run_audit, Catalog, Environment, Principal, PrincipalKind, Severity, Value,
};

// Three-resource fixture exercising the shape tolerances end to end: a
// bucket policy whose Statement is a single mapping, a repository policy
// embedded as a JSON string, and a bucket policy whose Resource is built
// with Fn::Join over a parameter that has no supplied value, fenced by an
// aws:Referer condition.
const FIXTURE_TEMPLATE: &str = r###"
Parameters:
  myExampleBucket:
    Type: String
Resources:
  WebsiteBucket:
    Type: AWS::S3::Bucket
    Properties:
      BucketName: website-bucket
  WebsiteBucketPolicy:
    Type: AWS::S3::BucketPolicy
    Properties:
      Bucket: !Ref WebsiteBucket
      PolicyDocument:
        Version: "2012-10-17"
        Statement:
          Effect: Allow
          Principal: "*"
          Action: s3:GetObject
          Resource: arn:aws:s3:::website-bucket/*
  Ecr:
    Type: AWS::ECR::Repository
    Properties:
      RepositoryName: builds
      RepositoryPolicyText: '{"Version":"2012-10-17","Statement":[{"Sid":"CodeBuildAccess","Effect":"Allow","Principal":{"Service":"codebuild.amazonaws.com"},"Action":["ecr:GetDownloadUrlForLayer","ecr:BatchGetImage"]}]}'
  SampleBucketPolicy:
    Type: AWS::S3::BucketPolicy
    Properties:
      Bucket: !Ref myExampleBucket
      PolicyDocument:
        Version: "2012-10-17"
        Statement:
          - Sid: AllowGetByReferer
            Effect: Allow
            Principal: "*"
            Action:
              - s3:GetObject
            Resource:
              Fn::Join:
                - ""
                - - "arn:aws:s3:::"
                  - Ref: myExampleBucket
                  - "/*"
            Condition:
              StringLike:
                aws:Referer:
                  - http://www.example.com/*
                  - http://example.net/*
"###;

fn fixture() -> Value {
    let yaml: serde_yaml::Value = serde_yaml::from_str(FIXTURE_TEMPLATE).unwrap();
    Value::try_from(&yaml).unwrap()
}

fn audit_fixture() -> cfn_policy_audit::AuditReport {
    let template = fixture();
    let env = Environment::from_template(&template);
    analyze_template(&template, &env, &Catalog::builtin()).unwrap()
}

#[test]
fn scenario_a_single_mapping_statement_yields_one_high_finding() {
    let report = audit_fixture();
    let website = report
        .findings
        .iter()
        .filter(|finding| finding.location.resource == "WebsiteBucketPolicy")
        .collect::<Vec<_>>();
    assert_eq!(website.len(), 1);
    assert_eq!(website[0].rule_id, "PA001");
    assert_eq!(website[0].severity, Severity::High);
    assert_eq!(
        website[0].location.path.to_string(),
        "Properties/PolicyDocument/Statement/0"
    );
}

#[test]
fn scenario_b_embedded_json_string_policy_yields_no_wildcard_finding() {
    let report = audit_fixture();
    assert!(report
        .findings
        .iter()
        .all(|finding| finding.location.resource != "Ecr"));
    assert!(report
        .errors
        .iter()
        .all(|error| error.location.resource != "Ecr"));
}

#[test]
fn scenario_b_service_principal_is_tagged() {
    let template = fixture();
    let env = Environment::from_template(&template);
    let extracted =
        cfn_policy_audit::analysis::extract::extract_policies(&template, &Catalog::builtin())
            .unwrap();
    let ecr = extracted
        .documents
        .iter()
        .find(|document| document.location.resource == "Ecr")
        .unwrap();
    let normalized =
        cfn_policy_audit::analysis::normalize::normalize_document(ecr, &env).unwrap();
    assert_eq!(normalized.statements.len(), 1);
    let statement = &normalized.statements[0];
    assert_eq!(statement.sid.as_deref(), Some("CodeBuildAccess"));
    match &statement.principal {
        Principal::Specifiers(specifiers) => {
            assert_eq!(specifiers.len(), 1);
            assert_eq!(specifiers[0].kind, PrincipalKind::Service);
            assert_eq!(
                specifiers[0].value.as_resolved(),
                Some("codebuild.amazonaws.com")
            );
        }
        other => panic!("Expected service principal, got {:?}", other),
    }
    assert!(!statement.principal.includes_anyone());
}

#[test]
fn scenario_c_referer_condition_and_unresolved_resource() {
    let report = audit_fixture();
    let sample = report
        .findings
        .iter()
        .filter(|finding| finding.location.resource == "SampleBucketPolicy")
        .collect::<Vec<_>>();
    assert_eq!(sample.len(), 2);

    // findings are ordered by rule id within one location
    assert_eq!(sample[0].rule_id, "PA002");
    assert_eq!(sample[0].severity, Severity::Medium);
    assert!(sample[0].message.contains("spoofable"));

    assert_eq!(sample[1].rule_id, "PA003");
    assert_eq!(sample[1].severity, Severity::Low);

    // deploy-time-only resource scope is a finding, not a structural error
    assert!(report.errors.is_empty());
}

#[test]
fn supplying_the_parameter_resolves_the_resource_and_drops_the_low_finding() {
    let template = fixture();
    let mut env = Environment::from_template(&template);
    let mut supplied = HashMap::new();
    supplied.insert("myExampleBucket".to_string(), "sample-bucket".to_string());
    env.supply_parameters(&supplied);

    let report = analyze_template(&template, &env, &Catalog::builtin()).unwrap();
    assert!(report
        .findings
        .iter()
        .all(|finding| finding.rule_id != "PA003"));
    // the referer-fenced public grant is still there
    assert!(report
        .findings
        .iter()
        .any(|finding| finding.rule_id == "PA002"));
}

#[test]
fn findings_are_ordered_by_location_then_rule_id() {
    let report = audit_fixture();
    let keys = report
        .findings
        .iter()
        .map(|finding| (finding.location.resource.clone(), finding.rule_id))
        .collect::<Vec<(String, &str)>>();
    assert_eq!(
        keys,
        vec![
            ("SampleBucketPolicy".to_string(), "PA002"),
            ("SampleBucketPolicy".to_string(), "PA003"),
            ("WebsiteBucketPolicy".to_string(), "PA001"),
        ]
    );
}

#[test]
fn run_audit_returns_json_with_findings_and_errors() {
    let output = run_audit(FIXTURE_TEMPLATE, &HashMap::new()).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
    let findings = parsed["findings"].as_array().unwrap();
    assert_eq!(findings.len(), 3);
    assert_eq!(findings[2]["rule_id"], "PA001");
    assert_eq!(findings[2]["severity"], "High");
    assert!(parsed["errors"].as_array().unwrap().is_empty());
}

#[test]
fn json_and_yaml_inputs_produce_the_same_report() {
    let yaml: serde_yaml::Value = serde_yaml::from_str(FIXTURE_TEMPLATE).unwrap();
    let json_text = serde_json::to_string(&yaml).unwrap();
    let from_yaml = run_audit(FIXTURE_TEMPLATE, &HashMap::new()).unwrap();
    let from_json = run_audit(&json_text, &HashMap::new()).unwrap();
    assert_eq!(from_yaml, from_json);
}

#[test]
fn malformed_policies_never_abort_the_run() {
    const BROKEN_AND_GOOD: &str = r###"
Resources:
  Broken:
    Type: AWS::S3::BucketPolicy
    Properties:
      PolicyDocument:
        Version: "2012-10-17"
  Public:
    Type: AWS::S3::BucketPolicy
    Properties:
      PolicyDocument:
        Statement:
          - Effect: Allow
            Principal: "*"
            Action: s3:GetObject
            Resource: arn:aws:s3:::open/*
"###;
    let yaml: serde_yaml::Value = serde_yaml::from_str(BROKEN_AND_GOOD).unwrap();
    let template = Value::try_from(&yaml).unwrap();
    let report =
        analyze_template(&template, &Environment::new(), &Catalog::builtin()).unwrap();

    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].location.resource, "Broken");
    assert!(report.errors[0].reason.contains("no Statement key"));

    assert_eq!(report.findings.len(), 1);
    assert_eq!(report.findings[0].rule_id, "PA001");
    assert_eq!(report.findings[0].location.resource, "Public");
}
