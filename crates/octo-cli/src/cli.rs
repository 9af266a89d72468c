//! Argument parsing and command dispatch.

use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use octo_client::{ClientConfig, NetworkCredentials, Session};
use tracing::debug;
use url::Url;

use crate::client::{CliResult, parse_timespan, parse_url};
use crate::commands::deploy::handle_deploy_release;
use crate::logging::{LogFormat, LoggingConfig, init_logging};

const DEFAULT_TIMEOUT_SECS: u64 = 100;

/// Parses CLI arguments, installs logging, and executes the requested command.
/// Returns the process exit code.
pub async fn run() -> i32 {
    let cli = Cli::parse();

    if let Err(err) = init_logging(&LoggingConfig::for_run(cli.debug, cli.log_format)) {
        eprintln!("warning: {err:#}");
    }

    match dispatch(cli).await {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("error: {}", err.display_message());
            err.exit_code()
        }
    }
}

async fn dispatch(cli: Cli) -> CliResult<()> {
    match cli.command {
        Command::DeployRelease(args) => {
            let session = args.api.connect(cli.debug)?;
            handle_deploy_release(&session, &args).await
        }
    }
}

#[derive(Parser)]
#[command(name = "octo", about = "Command-line client for the deployment server")]
pub(crate) struct Cli {
    /// Log every outbound request.
    #[arg(long, global = true)]
    pub(crate) debug: bool,
    /// Log output format; defaults to pretty in debug builds and JSON otherwise.
    #[arg(long, global = true, value_enum)]
    pub(crate) log_format: Option<LogFormat>,
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Deploys an existing release.
    DeployRelease(DeployReleaseArgs),
}

/// Connection options shared by every command that talks to the server.
#[derive(Args, Clone)]
pub(crate) struct ApiArgs {
    /// Base URL of the server, e.g. <http://localhost:8065/octopus>.
    #[arg(long, env = "OCTO_SERVER", value_parser = parse_url)]
    pub(crate) server: Url,
    /// API key used to authenticate every request.
    #[arg(long, alias = "apiKey", env = "OCTO_API_KEY", hide_env_values = true)]
    pub(crate) api_key: String,
    /// User name for servers behind HTTP basic authentication.
    #[arg(long, env = "OCTO_USER")]
    pub(crate) user: Option<String>,
    /// Password for servers behind HTTP basic authentication.
    #[arg(long, env = "OCTO_PASS", hide_env_values = true)]
    pub(crate) pass: Option<String>,
    /// Per-request HTTP timeout in seconds.
    #[arg(long, env = "OCTO_HTTP_TIMEOUT_SECS", default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub(crate) timeout: u64,
}

impl ApiArgs {
    pub(crate) fn client_config(&self, debug: bool) -> ClientConfig {
        let mut config = ClientConfig::new(self.server.clone(), self.api_key.clone());
        config.debug = debug;
        config.request_timeout = Duration::from_secs(self.timeout);
        config.credentials = self.user.as_ref().map(|username| NetworkCredentials {
            username: username.clone(),
            password: self.pass.clone(),
        });
        config
    }

    pub(crate) fn connect(&self, debug: bool) -> CliResult<Session> {
        let config = self.client_config(debug);
        debug!(server = %config.server, request_id = %config.request_id, "connecting");
        Ok(Session::new(&config)?)
    }
}

#[derive(Args, Clone)]
pub(crate) struct DeployReleaseArgs {
    #[command(flatten)]
    pub(crate) api: ApiArgs,
    /// Name of the project.
    #[arg(long)]
    pub(crate) project: Option<String>,
    /// Environment to deploy to, e.g. Production; repeat for several environments.
    #[arg(long = "deployto")]
    pub(crate) deploy_to: Vec<String>,
    /// Version number of the release to deploy.
    #[arg(long = "version", visible_alias = "releaseNumber")]
    pub(crate) version: Option<String>,
    /// Environment to take the release from instead of naming a version.
    #[arg(long = "deployfrom")]
    pub(crate) deploy_from: Option<String>,
    /// Force redeployment of already installed packages.
    #[arg(long)]
    pub(crate) force: bool,
    /// Force downloading of already installed packages.
    #[arg(long = "forcepackagedownload")]
    pub(crate) force_package_download: bool,
    /// Wait for the deployments to finish.
    #[arg(long = "waitfordeployment")]
    pub(crate) wait_for_deployment: bool,
    /// Maximum time the deployments may take, as hh:mm:ss or seconds.
    #[arg(long = "deploymenttimeout", value_parser = parse_timespan, default_value = "00:10:00")]
    pub(crate) deployment_timeout: Duration,
    /// Time between deployment status checks, as hh:mm:ss or seconds.
    #[arg(
        long = "deploymentchecksleepcycle",
        value_parser = parse_timespan,
        default_value = "00:00:10"
    )]
    pub(crate) deployment_check_sleep_cycle: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn deploy_release_parses_every_option() {
        let cli = Cli::try_parse_from([
            "octo",
            "deploy-release",
            "--server",
            "http://localhost:8065/octopus",
            "--api-key",
            "API-KEY",
            "--user",
            "deployer",
            "--pass",
            "hunter2",
            "--project",
            "Web",
            "--deployto",
            "Test",
            "--deployto",
            "Production",
            "--releaseNumber",
            "1.2.0",
            "--force",
            "--waitfordeployment",
            "--deploymenttimeout",
            "00:05:00",
            "--deploymentchecksleepcycle",
            "3",
            "--debug",
        ])
        .expect("valid arguments");

        assert!(cli.debug);
        let Command::DeployRelease(args) = cli.command;
        assert_eq!(args.project.as_deref(), Some("Web"));
        assert_eq!(args.deploy_to, vec!["Test", "Production"]);
        assert_eq!(args.version.as_deref(), Some("1.2.0"));
        assert!(args.force);
        assert!(!args.force_package_download);
        assert!(args.wait_for_deployment);
        assert_eq!(args.deployment_timeout, Duration::from_secs(300));
        assert_eq!(args.deployment_check_sleep_cycle, Duration::from_secs(3));

        let config = args.api.client_config(cli.debug);
        assert!(config.debug);
        assert_eq!(config.api_key, "API-KEY");
        assert_eq!(config.request_timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        let credentials = config.credentials.expect("credentials");
        assert_eq!(credentials.username, "deployer");
        assert_eq!(credentials.password.as_deref(), Some("hunter2"));
    }

    #[test]
    fn deploy_release_defaults_match_the_watcher_defaults() {
        let cli = Cli::try_parse_from([
            "octo",
            "deploy-release",
            "--server",
            "http://localhost:8065/",
            "--api-key",
            "API-KEY",
        ])
        .expect("valid arguments");

        let Command::DeployRelease(args) = cli.command;
        assert_eq!(
            args.deployment_timeout,
            octo_client::watcher::DEFAULT_DEPLOYMENT_TIMEOUT
        );
        assert_eq!(
            args.deployment_check_sleep_cycle,
            octo_client::watcher::DEFAULT_POLL_INTERVAL
        );
        assert!(args.api.client_config(false).credentials.is_none());
    }
}
