//! Compiles `service add` flag values into a [`ServiceSpec`].
//!
//! Parsing order is fixed: names, command/entrypoint, volumes, links, networks, legacy
//! gateways, published ports, then whitelists. Whitelists without a port attach to every
//! publish rule already registered, so they must come after the publish rules.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::name::{NameError, check_name};
use crate::services::spec::{
    GATEWAY_RELATION, NetworkMap, PortConfig, PortMap, ServiceSpec, VolumeConfig, port_key,
};

pub const DEFAULT_MODEL: &str = "x1";
pub const DEFAULT_RESTART_POLICY: &str = "no";
pub const DEFAULT_VOLUME_SIZE: &str = "10";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SpecError {
    #[error(transparent)]
    InvalidName(#[from] NameError),

    #[error("Invalid port number '{0}': should be between 1 and 65535")]
    InvalidPort(String),

    #[error(
        "Invalid port expose rule '{0}': expected containerPort, publishedPort:containerPort, network:containerPort, network::containerPort or network:publishedPort:containerPort"
    )]
    InvalidPublishRule(String),

    #[error("Invalid allowed network '{0}': should be 1.2.3.4[/24][:80]")]
    InvalidWhitelist(String),

    #[error("Volume parameter '{0}' not formatted correctly: expected /path[:size]")]
    InvalidVolume(String),

    #[error("Invalid link '{0}': expected name[:alias]")]
    InvalidLink(String),

    #[error(
        "Invalid gateway parameter '{0}': should be \"input:output\". Typically, output will be one of 'predictor', 'public'"
    )]
    InvalidGateway(String),

    #[error("Cannot split {flag} '{value}': unbalanced quotes or trailing escape")]
    ShellSplit { flag: &'static str, value: String },

    #[error("Container number must be at least 1")]
    InvalidContainerNumber,
}

/// Everything `service add` collects from the command line, assembled once by the CLI layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddOptions {
    pub application: String,
    pub service: String,
    pub repository: String,
    pub tag: String,
    pub model: String,
    pub number: u32,
    pub restart: String,
    pub command: Option<String>,
    pub entrypoint: Option<String>,
    pub user: Option<String>,
    pub workdir: Option<String>,
    pub environment: Vec<String>,
    pub volumes: Vec<String>,
    pub links: Vec<String>,
    pub networks: Vec<String>,
    pub gateways: Vec<String>,
    pub publish: Vec<String>,
    pub network_allow: Vec<String>,
    pub pool: Option<String>,
}

impl AddOptions {
    pub fn new(application: &str, service: &str, repository: &str, tag: &str) -> Self {
        AddOptions {
            application: application.to_string(),
            service: service.to_string(),
            repository: repository.to_string(),
            tag: tag.to_string(),
            model: DEFAULT_MODEL.to_string(),
            number: 1,
            restart: DEFAULT_RESTART_POLICY.to_string(),
            command: None,
            entrypoint: None,
            user: None,
            workdir: None,
            environment: Vec::new(),
            volumes: Vec::new(),
            links: Vec::new(),
            networks: Vec::new(),
            gateways: Vec::new(),
            publish: Vec::new(),
            network_allow: Vec::new(),
            pool: None,
        }
    }
}

pub fn compile(options: AddOptions) -> Result<ServiceSpec, SpecError> {
    check_name(&options.application)?;
    check_name(&options.repository)?;
    check_name(&options.service)?;
    if options.number == 0 {
        return Err(SpecError::InvalidContainerNumber);
    }

    let container_command = split_words("command", options.command.as_deref())?;
    let container_entrypoint = split_words("entrypoint", options.entrypoint.as_deref())?;
    let volumes = parse_volumes(&options.volumes)?;
    let links = parse_links(&options.links)?;

    let mut container_network: NetworkMap = options
        .networks
        .iter()
        .map(|n| (n.clone(), BTreeMap::new()))
        .collect();
    apply_gateways(&options.gateways, &mut container_network)?;

    let mut container_ports = parse_published_ports(&options.publish)?;
    attach_published_networks(&container_ports, &mut container_network);
    apply_whitelist(&options.network_allow, &mut container_ports)?;

    Ok(ServiceSpec {
        application: options.application,
        service: options.service,
        repository: options.repository,
        repository_tag: options.tag,
        container_model: options.model,
        container_number: options.number,
        restart_policy: options.restart,
        container_command,
        container_entrypoint,
        container_user: options.user.filter(|u| !u.is_empty()),
        container_workdir: options.workdir.filter(|w| !w.is_empty()),
        container_environment: options.environment,
        volumes,
        links,
        container_network,
        container_ports,
        pool: options.pool.filter(|p| !p.is_empty()),
    })
}

/// Networks named only by a publish rule still get an entry in the network map.
fn attach_published_networks(ports: &PortMap, networks: &mut NetworkMap) {
    for network in ports.values().flatten().filter_map(|c| c.network.as_ref()) {
        networks.entry(network.clone()).or_default();
    }
}

fn split_words(flag: &'static str, raw: Option<&str>) -> Result<Option<Vec<String>>, SpecError> {
    match raw {
        None | Some("") => Ok(None),
        Some(value) => shlex::split(value).map(Some).ok_or(SpecError::ShellSplit {
            flag,
            value: value.to_string(),
        }),
    }
}

pub fn parse_port(raw: &str) -> Result<u16, SpecError> {
    match raw.parse::<u32>() {
        Ok(port) if (1..=65535).contains(&port) => Ok(port as u16),
        _ => Err(SpecError::InvalidPort(raw.to_string())),
    }
}

fn network_name(raw: &str) -> Option<String> {
    (!raw.is_empty()).then(|| raw.to_string())
}

/// Append one publish rule to `ports`. A container port may be published several times.
pub fn add_publish_rule(ports: &mut PortMap, rule: &str) -> Result<(), SpecError> {
    let parts: Vec<&str> = rule.split(':').collect();
    let (container, config) = match parts.as_slice() {
        [container] => {
            let container = parse_port(container)?;
            (container, PortConfig::new(container, None))
        }
        [first, container] => {
            let container = parse_port(container)?;
            // Numeric first token is always a published port, never a network name.
            if first.parse::<i64>().is_ok() {
                (container, PortConfig::new(parse_port(first)?, None))
            } else {
                (container, PortConfig::new(container, network_name(first)))
            }
        }
        [network, published, container] => {
            let container = parse_port(container)?;
            let published = if published.is_empty() {
                container
            } else {
                parse_port(published)?
            };
            (container, PortConfig::new(published, network_name(network)))
        }
        _ => return Err(SpecError::InvalidPublishRule(rule.to_string())),
    };
    ports.entry(port_key(container)).or_default().push(config);
    Ok(())
}

pub fn parse_published_ports(rules: &[String]) -> Result<PortMap, SpecError> {
    let mut ports = PortMap::new();
    for rule in rules {
        add_publish_rule(&mut ports, rule)?;
    }
    Ok(ports)
}

/// Attach `address[/mask][:port]` entries to the publish rules currently in `ports`.
pub fn apply_whitelist(entries: &[String], ports: &mut PortMap) -> Result<(), SpecError> {
    for entry in entries {
        let parts: Vec<&str> = entry.split(':').collect();
        match parts.as_slice() {
            [address] => {
                for config in ports.values_mut().flatten() {
                    config.whitelisted_cidrs.push(address.to_string());
                }
            }
            [address, port] => {
                let key = port_key(parse_port(port)?);
                match ports.get_mut(&key) {
                    Some(configs) => {
                        for config in configs {
                            config.whitelisted_cidrs.push(address.to_string());
                        }
                    }
                    None => log::warn!(
                        "--network-allow {entry}: port {port} is not published, ignoring"
                    ),
                }
            }
            _ => return Err(SpecError::InvalidWhitelist(entry.clone())),
        }
    }
    Ok(())
}

pub fn parse_volumes(raw: &[String]) -> Result<BTreeMap<String, VolumeConfig>, SpecError> {
    let mut volumes = BTreeMap::new();
    for volume in raw {
        let (path, size) = match volume.split(':').collect::<Vec<_>>().as_slice() {
            [path] => (*path, DEFAULT_VOLUME_SIZE),
            [path, size] => (*path, *size),
            _ => return Err(SpecError::InvalidVolume(volume.clone())),
        };
        if path.is_empty() {
            return Err(SpecError::InvalidVolume(volume.clone()));
        }
        volumes.insert(
            path.to_string(),
            VolumeConfig {
                size: size.to_string(),
            },
        );
    }
    Ok(volumes)
}

pub fn parse_links(raw: &[String]) -> Result<BTreeMap<String, String>, SpecError> {
    let mut links = BTreeMap::new();
    for link in raw {
        let (name, alias) = match link.split(':').collect::<Vec<_>>().as_slice() {
            [name] => (*name, *name),
            [name, ""] => (*name, *name),
            [name, alias] => (*name, *alias),
            _ => return Err(SpecError::InvalidLink(link.clone())),
        };
        if name.is_empty() {
            return Err(SpecError::InvalidLink(link.clone()));
        }
        links.insert(name.to_string(), alias.to_string());
    }
    Ok(links)
}

/// Legacy `--gateway input:output`, expressed as a `gateway_to` relation on `input`.
pub fn apply_gateways(raw: &[String], networks: &mut NetworkMap) -> Result<(), SpecError> {
    for gateway in raw {
        log::warn!("--gateway is deprecated, use --network with gateway configuration instead");

        let (input, output) = match gateway.split(':').collect::<Vec<_>>().as_slice() {
            [input, output] if !input.is_empty() && !output.is_empty() => {
                (input.to_string(), output.to_string())
            }
            _ => return Err(SpecError::InvalidGateway(gateway.clone())),
        };
        for network in [&input, &output] {
            if !networks.contains_key(network) {
                log::warn!("Automatically adding {network} to network list");
                networks.insert(network.clone(), BTreeMap::new());
            }
        }
        networks
            .entry(input)
            .or_default()
            .entry(GATEWAY_RELATION.to_string())
            .or_default()
            .push(output);
    }
    Ok(())
}
