use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// `"<containerPort>/tcp"` -> publish rules, in command-line order.
pub type PortMap = BTreeMap<String, Vec<PortConfig>>;

/// Network name -> relation name (e.g. `gateway_to`) -> target networks.
pub type NetworkMap = BTreeMap<String, BTreeMap<String, Vec<String>>>;

pub const GATEWAY_RELATION: &str = "gateway_to";

pub fn port_key(container_port: u16) -> String {
    format!("{container_port}/tcp")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortConfig {
    pub published_port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    #[serde(default)]
    pub whitelisted_cidrs: Vec<String>,
}

impl PortConfig {
    pub fn new(published_port: u16, network: Option<String>) -> Self {
        PortConfig {
            published_port,
            network,
            whitelisted_cidrs: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeConfig {
    pub size: String,
}

/// Request body of `POST /applications/{application}/services/{service}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceSpec {
    #[serde(rename = "namespace")]
    pub application: String,
    #[serde(skip)]
    pub service: String,
    pub repository: String,
    pub repository_tag: String,
    pub container_model: String,
    pub container_number: u32,
    pub restart_policy: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_command: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_entrypoint: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_workdir: Option<String>,
    pub container_environment: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub volumes: BTreeMap<String, VolumeConfig>,
    pub links: BTreeMap<String, String>,
    pub container_network: NetworkMap,
    pub container_ports: PortMap,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool: Option<String>,
}

impl ServiceSpec {
    pub fn path(&self) -> String {
        service_path(&self.application, &self.service)
    }
}

pub fn service_path(application: &str, service: &str) -> String {
    format!("/applications/{application}/services/{service}")
}

/// Body of the redeploy call: the parts of a [`ServiceSpec`] an existing service can change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RedeploySpec {
    #[serde(rename = "namespace")]
    pub application: String,
    pub repository: String,
    pub repository_tag: String,
    pub container_model: String,
    pub restart_policy: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_command: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_entrypoint: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_workdir: Option<String>,
    pub container_environment: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub volumes: BTreeMap<String, VolumeConfig>,
    pub links: BTreeMap<String, String>,
    pub container_network: NetworkMap,
    pub container_ports: PortMap,
}

impl From<&ServiceSpec> for RedeploySpec {
    fn from(spec: &ServiceSpec) -> Self {
        RedeploySpec {
            application: spec.application.clone(),
            repository: spec.repository.clone(),
            repository_tag: spec.repository_tag.clone(),
            container_model: spec.container_model.clone(),
            restart_policy: spec.restart_policy.clone(),
            container_command: spec.container_command.clone(),
            container_entrypoint: spec.container_entrypoint.clone(),
            container_user: spec.container_user.clone(),
            container_workdir: spec.container_workdir.clone(),
            container_environment: spec.container_environment.clone(),
            volumes: spec.volumes.clone(),
            links: spec.links.clone(),
            container_network: spec.container_network.clone(),
            container_ports: spec.container_ports.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal() -> ServiceSpec {
        ServiceSpec {
            application: "devel".to_string(),
            service: "web".to_string(),
            repository: "nginx".to_string(),
            repository_tag: "latest".to_string(),
            container_model: "x1".to_string(),
            container_number: 1,
            restart_policy: "no".to_string(),
            container_command: None,
            container_entrypoint: None,
            container_user: None,
            container_workdir: None,
            container_environment: Vec::new(),
            volumes: BTreeMap::new(),
            links: BTreeMap::new(),
            container_network: NetworkMap::new(),
            container_ports: PortMap::new(),
            pool: None,
        }
    }

    #[test]
    fn empty_collections_stay_on_the_wire() {
        let value = serde_json::to_value(minimal()).unwrap();
        assert_eq!(
            value,
            json!({
                "namespace": "devel",
                "repository": "nginx",
                "repository_tag": "latest",
                "container_model": "x1",
                "container_number": 1,
                "restart_policy": "no",
                "container_environment": [],
                "links": {},
                "container_network": {},
                "container_ports": {},
            })
        );
    }

    #[test]
    fn port_config_wire_form() {
        let mut spec = minimal();
        spec.container_ports.insert(
            port_key(80),
            vec![
                PortConfig::new(8080, None),
                PortConfig {
                    published_port: 80,
                    network: Some("public".to_string()),
                    whitelisted_cidrs: vec!["10.0.0.0/8".to_string()],
                },
            ],
        );
        let value = serde_json::to_value(&spec).unwrap();
        assert_eq!(
            value["container_ports"],
            json!({
                "80/tcp": [
                    {"published_port": 8080, "whitelisted_cidrs": []},
                    {"published_port": 80, "network": "public", "whitelisted_cidrs": ["10.0.0.0/8"]},
                ]
            })
        );
    }

    #[test]
    fn pretty_body_uses_two_space_indent() {
        let body = serde_json::to_string_pretty(&minimal()).unwrap();
        assert!(body.starts_with("{\n  \"namespace\": \"devel\""));
    }

    #[test]
    fn redeploy_view_drops_pool_and_number() {
        let mut spec = minimal();
        spec.pool = Some("dedicated".to_string());
        spec.container_number = 3;
        let value = serde_json::to_value(RedeploySpec::from(&spec)).unwrap();
        assert!(value.get("pool").is_none());
        assert!(value.get("container_number").is_none());
        assert_eq!(value["repository"], "nginx");
        assert_eq!(spec.pool.as_deref(), Some("dedicated"));
    }

    #[test]
    fn path_uses_application_and_service() {
        assert_eq!(minimal().path(), "/applications/devel/services/web");
    }
}
