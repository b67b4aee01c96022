use anyhow::Result;
use clap::Command;
use reqwest::Client;

fn cli() -> Command {
    Command::new("sail")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Deploy and manage containerized services on the Sailabove platform")
        .subcommand_required(true)
        .args(sail::config::global_args())
        .subcommand(sail::services::command())
        .subcommand(sail::applications::command())
        .subcommand(sail::config::command())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let matches = cli().get_matches();

    let default_level = if matches.get_flag("verbose") {
        "debug"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_millis()
        .init();

    let r = match sail::config::CliConfig::from_matches(&matches) {
        Ok(mut config) => {
            let http_client = Client::new();
            match matches.subcommand() {
                Some(("service", service_matches)) => {
                    sail::services::handle(&mut config, &http_client, service_matches).await
                }
                Some(("application", application_matches)) => {
                    sail::applications::handle(&mut config, &http_client, application_matches)
                        .await
                }
                Some(("config", config_matches)) => {
                    sail::config::handle(&config, config_matches)
                }
                _ => {
                    eprintln!("Unknown command");
                    Ok(())
                }
            }
        }
        Err(e) => Err(e),
    };

    if let Err(e) = r {
        log::debug!("Error: {e:?}");
        eprintln!("{} {}", console::style("error:").red().bold(), e);
        std::process::exit(1);
    }

    Ok(())
}
