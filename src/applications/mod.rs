use anyhow::{Result, anyhow};
use clap::{Arg, ArgMatches, Command};
use reqwest::Client;

use crate::config::CliConfig;
use crate::name::check_name;
use crate::transport::HttpTransport;

mod webhook;

const WEBHOOK_ABOUT: &str = "Events are posted as JSON to every webhook of the application. \
Unreachable webhooks are retried up to 10 times over roughly two hours, so events may arrive \
out of order.";

fn target_args(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("first")
            .value_name("APPLICATION")
            .help("Application name (defaults to the configured user) when followed by a URL")
            .required(true)
            .index(1),
    )
    .arg(
        Arg::new("second")
            .value_name("URL")
            .help("Webhook URL")
            .index(2),
    )
}

pub fn command() -> Command {
    Command::new("application")
        .alias("applications")
        .alias("app")
        .about("Manage applications")
        .subcommand_required(true)
        .subcommand(
            Command::new("webhook")
                .about("Manage application webhooks")
                .long_about(WEBHOOK_ABOUT)
                .subcommand_required(true)
                .subcommand(
                    Command::new("list")
                        .alias("ls")
                        .about("List the webhooks of an application")
                        .arg(
                            Arg::new("application")
                                .help("Application name (defaults to the configured user)")
                                .index(1),
                        ),
                )
                .subcommand(target_args(
                    Command::new("add")
                        .about("Add a webhook to an application")
                        .after_help("The endpoint must accept POST requests with a JSON body."),
                ))
                .subcommand(target_args(
                    Command::new("delete")
                        .alias("del")
                        .alias("rm")
                        .about("Delete a webhook from an application"),
                )),
        )
}

pub async fn handle(
    config: &mut CliConfig,
    http_client: &Client,
    matches: &ArgMatches,
) -> Result<()> {
    let Some(("webhook", webhook_matches)) = matches.subcommand() else {
        return Err(anyhow!("Unknown application command"));
    };

    match webhook_matches.subcommand() {
        Some(("list", args)) => {
            let application =
                application_or_user(config, args.get_one::<String>("application").cloned())?;
            let transport = HttpTransport::new(http_client.clone(), config)?;
            webhook::list(&transport, &application).await
        }
        Some((action @ ("add" | "delete"), args)) => {
            let (application, url) = target(config, args)?;
            let transport = HttpTransport::new(http_client.clone(), config)?;
            if action == "add" {
                webhook::add(&transport, &application, &url).await
            } else {
                webhook::delete(&transport, &application, &url).await
            }
        }
        _ => Err(anyhow!("Unknown webhook command")),
    }
}

fn application_or_user(config: &CliConfig, application: Option<String>) -> Result<String> {
    let application = application
        .or_else(|| config.user().map(str::to_string))
        .ok_or_else(|| anyhow!("No application given and no user configured"))?;
    check_name(&application)?;
    Ok(application)
}

/// `<url>` alone targets the user's application, `<application> <url>` an explicit one.
fn target(config: &CliConfig, args: &ArgMatches) -> Result<(String, String)> {
    let first = args
        .get_one::<String>("first")
        .cloned()
        .ok_or_else(|| anyhow!("Missing webhook URL"))?;
    match args.get_one::<String>("second") {
        Some(url) => Ok((application_or_user(config, Some(first))?, url.clone())),
        None => Ok((application_or_user(config, None)?, first)),
    }
}
