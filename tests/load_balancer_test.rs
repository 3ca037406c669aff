mod common;

use az_failure::backend::Tag;
use az_failure::config::{ElbConfig, ElbV2Config};
use az_failure::services::{elb, elbv2};
use az_failure::{
    fail_az, recover_az, AzError, ExecutionStatus, FailRequest, RecoverRequest, RecoveryStatus,
    ServiceKind,
};
use common::{failure_tag, MockCloud};

const ALL_ZONES: [&str; 3] = ["us-east-1a", "us-east-1b", "us-east-1c"];

fn classic(az: &str) -> ElbConfig {
    ElbConfig {
        az: az.to_string(),
        dry_run: false,
        ..ElbConfig::default()
    }
}

fn application(az: &str) -> ElbV2Config {
    ElbV2Config {
        az: az.to_string(),
        dry_run: false,
        ..ElbV2Config::default()
    }
}

#[tokio::test]
async fn test_vpc_balancer_detaches_zone_subnets() {
    let dir = tempfile::tempdir().unwrap();
    let cloud = MockCloud::new();
    cloud.add_classic("web", Some("vpc-main"), &ALL_ZONES, vec![failure_tag()]);
    let ctx = cloud.context(dir.path());

    let run = elb::fail_az(&ctx, &classic("us-east-1a")).await.unwrap();
    assert_eq!(run.summary().succeeded, 1);
    assert_eq!(cloud.mutations(), vec!["DetachLoadBalancerFromSubnets web"]);

    let lb = cloud.classic("web").unwrap();
    assert_eq!(lb.subnet_ids, vec!["subnet-b", "subnet-c"]);
    assert_eq!(lb.availability_zones, vec!["us-east-1b", "us-east-1c"]);

    let result = elb::recover_az(&ctx, None).await.unwrap();
    assert_eq!(result.status, RecoveryStatus::Recovered);
    assert_eq!(
        cloud.classic("web").unwrap().subnet_ids,
        vec!["subnet-a", "subnet-b", "subnet-c"]
    );
}

#[tokio::test]
async fn test_default_vpc_balancer_disables_zone() {
    let dir = tempfile::tempdir().unwrap();
    let cloud = MockCloud::new();
    cloud.add_classic("legacy", None, &["us-east-1a", "us-east-1b"], vec![failure_tag()]);
    cloud.add_classic(
        "default-vpc",
        Some("vpc-default"),
        &["us-east-1a", "us-east-1b"],
        vec![failure_tag()],
    );
    let ctx = cloud.context(dir.path());

    let run = elb::fail_az(&ctx, &classic("us-east-1a")).await.unwrap();
    assert_eq!(run.summary().succeeded, 2);
    assert_eq!(
        cloud.classic("legacy").unwrap().availability_zones,
        vec!["us-east-1b"]
    );
    assert!(cloud
        .mutations()
        .iter()
        .all(|op| op.starts_with("DisableAvailabilityZonesForLoadBalancer")));
    assert_eq!(cloud.calls("DescribeSubnets"), 0);

    elb::recover_az(&ctx, None).await.unwrap();
    assert_eq!(
        cloud.classic("default-vpc").unwrap().availability_zones,
        vec!["us-east-1a", "us-east-1b"]
    );
}

#[tokio::test]
async fn test_named_balancers_without_tags() {
    let dir = tempfile::tempdir().unwrap();
    let cloud = MockCloud::new();
    cloud.add_classic("web", Some("vpc-main"), &ALL_ZONES, vec![]);
    cloud.add_classic("api", Some("vpc-main"), &ALL_ZONES, vec![]);
    let ctx = cloud.context(dir.path());

    let config = ElbConfig {
        tags: vec![],
        lb_names: vec!["api".to_string()],
        ..classic("us-east-1b")
    };
    let run = elb::fail_az(&ctx, &config).await.unwrap();
    assert_eq!(run.entry.resources.len(), 1);
    assert_eq!(run.entry.resources[0].load_balancer_name, "api");
    assert_eq!(cloud.classic("web").unwrap().subnet_ids.len(), 3);

    let config = ElbConfig {
        tags: vec![],
        ..classic("us-east-1b")
    };
    let err = elb::fail_az(&ctx, &config).await.unwrap_err();
    assert!(matches!(err, AzError::Validation(_)));
}

#[tokio::test]
async fn test_last_subnet_is_never_detached() {
    let dir = tempfile::tempdir().unwrap();
    let cloud = MockCloud::new();
    cloud.add_classic("single", Some("vpc-main"), &["us-east-1a"], vec![failure_tag()]);
    let ctx = cloud.context(dir.path());

    let run = elb::fail_az(&ctx, &classic("us-east-1a")).await.unwrap();
    assert_eq!(run.entry.outcomes[0].status, ExecutionStatus::Skipped);
    assert!(run.state_path.is_none());
    assert!(cloud.mutations().is_empty());
}

#[tokio::test]
async fn test_deleted_classic_balancer_is_skipped_on_recovery() {
    let dir = tempfile::tempdir().unwrap();
    let cloud = MockCloud::new();
    cloud.add_classic("web", Some("vpc-main"), &ALL_ZONES, vec![failure_tag()]);
    let ctx = cloud.context(dir.path());
    elb::fail_az(&ctx, &classic("us-east-1c")).await.unwrap();

    cloud.with(|inv| inv.classic.clear());
    let result = elb::recover_az(&ctx, None).await.unwrap();
    assert_eq!(result.status, RecoveryStatus::Recovered);
    assert_eq!(result.outcomes[0].status, ExecutionStatus::Skipped);
}

#[tokio::test]
async fn test_application_balancer_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let cloud = MockCloud::new();
    let arn = cloud.add_alb("web", &ALL_ZONES, vec![failure_tag()]);
    let ctx = cloud.context(dir.path());

    let report = fail_az(&ctx, FailRequest::ElbV2(application("us-east-1c")))
        .await
        .unwrap();
    assert_eq!(report.service, ServiceKind::ElbV2);
    assert_eq!(report.summary.succeeded, 1);
    assert!(report.state_path.is_some());
    assert_eq!(cloud.alb_subnets(&arn), vec!["subnet-a", "subnet-b"]);
    assert_eq!(
        report.entry["resources"][0]["before_subnets"],
        serde_json::json!(["subnet-a", "subnet-b", "subnet-c"])
    );

    let request = RecoverRequest {
        service: ServiceKind::ElbV2,
        state_path: None,
    };
    let result = recover_az(&ctx, request.clone()).await.unwrap();
    assert_eq!(result.status, RecoveryStatus::Recovered);
    assert_eq!(cloud.alb_subnets(&arn), vec!["subnet-a", "subnet-b", "subnet-c"]);

    let again = recover_az(&ctx, request).await.unwrap();
    assert!(matches!(again.status, RecoveryStatus::NothingToRecover { .. }));
}

#[tokio::test]
async fn test_two_zone_application_balancer_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let cloud = MockCloud::new();
    let arn = cloud.add_alb("small", &["us-east-1a", "us-east-1b"], vec![failure_tag()]);
    let ctx = cloud.context(dir.path());

    let run = elbv2::fail_az(&ctx, &application("us-east-1a")).await.unwrap();
    let outcome = &run.entry.outcomes[0];
    assert_eq!(outcome.resource_id, arn);
    assert_eq!(outcome.status, ExecutionStatus::Skipped);
    assert!(run.entry.resources.is_empty());
    assert!(run.state_path.is_none());
    assert!(cloud.mutations().is_empty());
    assert_eq!(cloud.alb_subnets(&arn).len(), 2);
}

#[tokio::test]
async fn test_only_active_application_balancers() {
    let dir = tempfile::tempdir().unwrap();
    let cloud = MockCloud::new();
    cloud.add_alb("net", &ALL_ZONES, vec![failure_tag()]);
    cloud.add_alb("booting", &ALL_ZONES, vec![failure_tag()]);
    cloud.with(|inv| {
        inv.albs[0].lb_type = "network".to_string();
        inv.albs[1].state = "provisioning".to_string();
    });
    let ctx = cloud.context(dir.path());

    let run = elbv2::fail_az(&ctx, &application("us-east-1a")).await.unwrap();
    assert_eq!(run.summary().skipped, 2);
    assert!(cloud.mutations().is_empty());
}

#[tokio::test]
async fn test_tag_queries_are_chunked() {
    let dir = tempfile::tempdir().unwrap();
    let cloud = MockCloud::new();
    for i in 0..25 {
        cloud.add_alb(&format!("lb-{i:02}"), &ALL_ZONES, vec![failure_tag()]);
    }
    cloud.add_alb("other-team", &ALL_ZONES, vec![Tag::new("team", "other")]);
    let ctx = cloud.context(dir.path());

    let run = elbv2::fail_az(&ctx, &application("us-east-1b")).await.unwrap();
    assert_eq!(run.summary().succeeded, 25);
    assert_eq!(cloud.calls("DescribeTagsV2"), 2);
}

#[tokio::test]
async fn test_failed_set_subnets_is_retained_for_recovery() {
    let dir = tempfile::tempdir().unwrap();
    let cloud = MockCloud::new();
    let web = cloud.add_alb("web", &ALL_ZONES, vec![failure_tag()]);
    let api = cloud.add_alb("api", &ALL_ZONES, vec![failure_tag()]);
    let ctx = cloud.context(dir.path());
    elbv2::fail_az(&ctx, &application("us-east-1a")).await.unwrap();

    cloud.fail_on(
        "SetSubnets",
        &api,
        az_failure::ProviderError::from_code("InvalidConfigurationRequest", "in use"),
    );
    let result = elbv2::recover_az(&ctx, None).await.unwrap();
    assert_eq!(result.status, RecoveryStatus::Partial);
    assert_eq!(cloud.alb_subnets(&web).len(), 3);
    assert_eq!(cloud.alb_subnets(&api).len(), 2);

    cloud.clear_failures();
    let result = elbv2::recover_az(&ctx, None).await.unwrap();
    assert_eq!(result.status, RecoveryStatus::Recovered);
    assert_eq!(result.outcomes.len(), 1);
    assert_eq!(cloud.alb_subnets(&api).len(), 3);
}
