//! Action manifest
//!
//! Built from the service catalog and the serialized defaults of each target
//! config, so the manifest always matches the structs the actions accept.

use serde::Serialize;
use serde_json::Value;

use crate::config::{
    AsgConfig, EksConfig, ElastiCacheConfig, ElbConfig, ElbV2Config, Ec2Config, MqConfig, RdsConfig,
};
use crate::services::ServiceKind;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Manifest {
    pub name: &'static str,
    pub version: &'static str,
    pub services: Vec<ServiceManifest>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceManifest {
    pub service: ServiceKind,
    pub description: &'static str,
    pub actions: Vec<ActionManifest>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionManifest {
    pub name: &'static str,
    pub description: String,
    pub arguments: Vec<Argument>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Argument {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    pub description: &'static str,
}

fn defaults(service: ServiceKind) -> Value {
    let value = match service {
        ServiceKind::Asg => serde_json::to_value(AsgConfig::default()),
        ServiceKind::Ec2 => serde_json::to_value(Ec2Config::default()),
        ServiceKind::Elb => serde_json::to_value(ElbConfig::default()),
        ServiceKind::ElbV2 => serde_json::to_value(ElbV2Config::default()),
        ServiceKind::Rds => serde_json::to_value(RdsConfig::default()),
        ServiceKind::ElastiCache => serde_json::to_value(ElastiCacheConfig::default()),
        ServiceKind::Eks => serde_json::to_value(EksConfig::default()),
        ServiceKind::Mq => serde_json::to_value(MqConfig::default()),
    };
    value.unwrap_or(Value::Null)
}

fn argument_type(name: &str, value: &Value) -> &'static str {
    match value {
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
        Value::Null if name == "state_path" => "path",
        Value::Null => "string",
    }
}

fn argument_description(name: &str) -> &'static str {
    match name {
        "az" => "Availability zone to fail",
        "dry_run" => "Discover and plan without mutating anything",
        "tags" => "Tags every selected resource must carry",
        "filters" => "EC2 describe filters ({Name, Values})",
        "failure_type" => "network (ACL blackhole) or instance (stop/terminate)",
        "lb_names" => "Restrict discovery to these load balancer names",
        "replication_groups" => "Cluster-mode enabled shards to fail over",
        "wait_for_recovery" => "Wait for each replication group to become available again",
        "state_path" => "Recovery state file location",
        "overwrite_state" => "Replace an existing live state file",
        _ => "",
    }
}

/// Arguments accepted by `fail_az` for `service`.
///
/// An empty string default marks a required argument.
pub fn fail_arguments(service: ServiceKind) -> Vec<Argument> {
    let Value::Object(fields) = defaults(service) else {
        return Vec::new();
    };

    fields
        .into_iter()
        .map(|(name, value)| {
            let required = value.as_str().is_some_and(str::is_empty);
            Argument {
                kind: argument_type(&name, &value),
                required,
                default: (!required && !value.is_null()).then_some(value),
                description: argument_description(&name),
                name,
            }
        })
        .collect()
}

fn recover_arguments() -> Vec<Argument> {
    vec![Argument {
        name: "state_path".to_string(),
        kind: "path",
        required: false,
        default: None,
        description: argument_description("state_path"),
    }]
}

/// Manifest of every action this build exposes
pub fn manifest() -> Manifest {
    let services = ServiceKind::ALL
        .into_iter()
        .map(|service| {
            let mut actions = vec![ActionManifest {
                name: "fail_az",
                description: format!("Simulate an availability zone failure for {}", service.description()),
                arguments: fail_arguments(service),
            }];
            if service.supports_recovery() {
                actions.push(ActionManifest {
                    name: "recover_az",
                    description: format!("Reverse a previous fail_az for {}", service.description()),
                    arguments: recover_arguments(),
                });
            }
            ServiceManifest {
                service,
                description: service.description(),
                actions,
            }
        })
        .collect();

    Manifest {
        name: env!("CARGO_PKG_NAME"),
        version: crate::VERSION,
        services,
    }
}
