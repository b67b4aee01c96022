use std::sync::Arc;

use anyhow::{Result, anyhow};
use clap::{Arg, ArgAction, ArgMatches, Command};
use reqwest::Client;

use crate::config::CliConfig;
use crate::name::{DEFAULT_TAG, check_name, parse_resource_name};
use crate::transport::{HttpTransport, Transport};

pub mod add;
pub mod compile;
pub mod redeploy;
pub mod spec;
pub mod start;

use add::{DeployOptions, DeployOutcome, Deployer, StartSequence};
use compile::AddOptions;

/// Comma-separated, repeatable list flag.
fn list_arg(id: &'static str, help: &'static str) -> Arg {
    Arg::new(id)
        .long(id)
        .help(help)
        .action(ArgAction::Append)
        .value_delimiter(',')
}

fn add_command() -> Command {
    Command::new("add")
        .alias("create")
        .alias("a")
        .alias("c")
        .about("Add a new docker service")
        .after_help(
            "The service is started once created. Unless --batch is given, the console is \
             attached and the command returns when the service containers stop.",
        )
        .arg(
            Arg::new("repository")
                .help("[<application>/]<repository>[:tag]")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::new("service")
                .help("Service name (defaults to the repository name)")
                .index(2),
        )
        .arg(
            Arg::new("model")
                .long("model")
                .help("Container model")
                .default_value(compile::DEFAULT_MODEL),
        )
        .arg(
            Arg::new("number")
                .long("number")
                .help("Number of containers to run")
                .value_parser(clap::value_parser!(u32).range(1..))
                .default_value("1"),
        )
        .arg(list_arg("link", "Link to another service: name[:alias]"))
        .arg(list_arg("network", "Attach to a network: public|private|<network name>"))
        .arg(list_arg(
            "network-allow",
            "Whitelist source addresses: ip[/mask][:port]",
        ))
        .arg(
            list_arg(
                "publish",
                "Publish a container port: network:publishedPort:containerPort, \
                 network::containerPort, publishedPort:containerPort or containerPort",
            )
            .short('p'),
        )
        .arg(list_arg(
            "gateway",
            "DEPRECATED: network-input:network-output",
        ))
        .arg(
            Arg::new("restart")
                .long("restart")
                .help("Restart policy: {no|always[:<max>]|on-failure[:<max>]}")
                .default_value(compile::DEFAULT_RESTART_POLICY),
        )
        .arg(list_arg("volume", "Mount a volume: /path[:size] (size in GB)"))
        .arg(
            Arg::new("env")
                .long("env")
                .short('e')
                .help("Override docker environment: KEY=value")
                .action(ArgAction::Append),
        )
        .arg(Arg::new("command").long("command").help("Override docker run command"))
        .arg(Arg::new("entrypoint").long("entrypoint").help("Override docker entrypoint"))
        .arg(
            Arg::new("container_user")
                .long("container-user")
                .help("Override docker user"),
        )
        .arg(Arg::new("workdir").long("workdir").help("Override docker workdir"))
        .arg(Arg::new("tag").long("tag").help("Deploy this image tag"))
        .arg(Arg::new("pool").long("pool").help("Deploy on the dedicated host pool <name>"))
        .arg(
            Arg::new("batch")
                .long("batch")
                .help("Do not attach console on start")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("redeploy")
                .long("redeploy")
                .help("If the service already exists, redeploy instead")
                .action(ArgAction::SetTrue),
        )
}

pub fn command() -> Command {
    Command::new("service")
        .alias("services")
        .alias("s")
        .about("Manage services")
        .subcommand_required(true)
        .subcommand(add_command())
        .subcommand(
            Command::new("start")
                .about("Start a service and attach to its console")
                .arg(
                    Arg::new("service")
                        .help("[<application>/]<service>")
                        .required(true)
                        .index(1),
                )
                .arg(
                    Arg::new("batch")
                        .long("batch")
                        .help("Do not attach console on start")
                        .action(ArgAction::SetTrue),
                ),
        )
}

pub async fn handle(
    config: &mut CliConfig,
    http_client: &Client,
    matches: &ArgMatches,
) -> Result<()> {
    match matches.subcommand() {
        Some(("add", args)) => {
            let options = add_options(config, args)?;
            let spec = compile::compile(options)?;
            log::debug!("Compiled service spec for {}", spec.path());

            let transport: Arc<dyn Transport> =
                Arc::new(HttpTransport::new(http_client.clone(), config)?);
            let start: Arc<dyn StartSequence> =
                Arc::new(start::HttpStartSequence::new(transport.clone()));
            let deploy_options = DeployOptions {
                redeploy: args.get_flag("redeploy"),
                batch: args.get_flag("batch"),
            };
            let redeploy = redeploy::HttpRedeploySequence::new(
                transport.clone(),
                start.clone(),
                deploy_options.batch,
            );

            let progress = crate::default_spinner();
            let outcome = Deployer::new(transport.as_ref(), start.as_ref(), &redeploy)
                .with_progress(progress)
                .deploy(&spec, deploy_options)
                .await?;
            log::debug!("Deployment finished: {outcome:?}");
            if let DeployOutcome::Redeployed = outcome {
                log::info!("{} redeployed", spec.path());
            }
            Ok(())
        }
        Some(("start", args)) => {
            let raw = args
                .get_one::<String>("service")
                .ok_or_else(|| anyhow!("Missing service argument"))?;
            let name = parse_resource_name(raw)?;
            config.check_host(name.host.as_deref())?;
            let application = default_application(config, name.application)?;
            let service = name.repository;
            check_name(&application)?;
            check_name(&service)?;

            let transport: Arc<dyn Transport> =
                Arc::new(HttpTransport::new(http_client.clone(), config)?);
            start::HttpStartSequence::new(transport)
                .start(&application, &service, args.get_flag("batch"))
                .await
        }
        _ => Err(anyhow!("Unknown service command")),
    }
}

fn default_application(config: &CliConfig, application: Option<String>) -> Result<String> {
    application
        .or_else(|| config.user().map(str::to_string))
        .ok_or_else(|| {
            anyhow!("No application given and no user configured to default to: use <application>/<name>")
        })
}

fn strings(args: &ArgMatches, id: &str) -> Vec<String> {
    args.get_many::<String>(id)
        .map(|values| values.cloned().collect())
        .unwrap_or_default()
}

fn add_options(config: &CliConfig, args: &ArgMatches) -> Result<AddOptions> {
    let raw = args
        .get_one::<String>("repository")
        .ok_or_else(|| anyhow!("Missing repository argument"))?;
    let name = parse_resource_name(raw)?;
    config.check_host(name.host.as_deref())?;

    let application = default_application(config, name.application)?;
    let service = args
        .get_one::<String>("service")
        .cloned()
        .unwrap_or_else(|| name.repository.clone());
    let tag = args
        .get_one::<String>("tag")
        .cloned()
        .or(name.tag)
        .unwrap_or_else(|| DEFAULT_TAG.to_string());

    let mut options = AddOptions::new(&application, &service, &name.repository, &tag);
    if let Some(model) = args.get_one::<String>("model") {
        options.model = model.clone();
    }
    if let Some(number) = args.get_one::<u32>("number") {
        options.number = *number;
    }
    if let Some(restart) = args.get_one::<String>("restart") {
        options.restart = restart.clone();
    }
    options.command = args.get_one::<String>("command").cloned();
    options.entrypoint = args.get_one::<String>("entrypoint").cloned();
    options.user = args.get_one::<String>("container_user").cloned();
    options.workdir = args.get_one::<String>("workdir").cloned();
    options.pool = args.get_one::<String>("pool").cloned();
    options.environment = strings(args, "env");
    options.volumes = strings(args, "volume");
    options.links = strings(args, "link");
    options.networks = strings(args, "network");
    options.gateways = strings(args, "gateway");
    options.publish = strings(args, "publish");
    options.network_allow = strings(args, "network-allow");
    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> ArgMatches {
        let matches = command()
            .try_get_matches_from(std::iter::once("service").chain(args.iter().copied()))
            .unwrap();
        matches.subcommand_matches("add").unwrap().clone()
    }

    fn config() -> CliConfig {
        CliConfig::new("sailabove.io", Some("alice".to_string()), None)
    }

    #[test]
    fn add_options_from_flags() {
        let args = parse(&[
            "add",
            "devel/nginx:1.27",
            "web",
            "-p",
            "public:80,8443:443",
            "--publish",
            "22",
            "--network-allow",
            "10.0.0.0/8",
            "-e",
            "A=1,2",
            "--volume",
            "/data:20",
            "--number",
            "3",
            "--command",
            "nginx -g 'daemon off;'",
            "--redeploy",
        ]);
        let options = add_options(&config(), &args).unwrap();
        assert_eq!(options.application, "devel");
        assert_eq!(options.service, "web");
        assert_eq!(options.repository, "nginx");
        assert_eq!(options.tag, "1.27");
        assert_eq!(options.number, 3);
        assert_eq!(options.publish, vec!["public:80", "8443:443", "22"]);
        assert_eq!(options.environment, vec!["A=1,2"]);
        assert_eq!(options.volumes, vec!["/data:20"]);
        assert_eq!(options.command.as_deref(), Some("nginx -g 'daemon off;'"));
        assert!(args.get_flag("redeploy"));
        assert!(!args.get_flag("batch"));
    }

    #[test]
    fn defaults_to_user_application_and_repository_service() {
        let args = parse(&["add", "redis"]);
        let options = add_options(&config(), &args).unwrap();
        assert_eq!(options.application, "alice");
        assert_eq!(options.service, "redis");
        assert_eq!(options.tag, "latest");
        assert_eq!(options.model, "x1");
        assert_eq!(options.restart, "no");
    }

    #[test]
    fn tag_flag_overrides_resource_tag() {
        let args = parse(&["add", "devel/nginx:1.27", "--tag", "1.28"]);
        assert_eq!(add_options(&config(), &args).unwrap().tag, "1.28");
    }

    #[test]
    fn foreign_host_is_rejected() {
        let args = parse(&["add", "other.io/devel/nginx"]);
        assert!(add_options(&config(), &args).is_err());
    }

    #[test]
    fn missing_application_without_user_is_rejected() {
        let args = parse(&["add", "nginx"]);
        let config = CliConfig::new("sailabove.io", None, None);
        assert!(add_options(&config, &args).is_err());
    }

    #[test]
    fn zero_containers_rejected_by_parser() {
        let result = command().try_get_matches_from(["service", "add", "nginx", "--number", "0"]);
        assert!(result.is_err());
    }
}
