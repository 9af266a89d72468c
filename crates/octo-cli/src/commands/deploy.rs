//! `deploy-release`: deploy an existing release to one or more environments.

use octo_client::{
    DeploymentWatcher, Resource, ResourceCollection, Session, TaskReference, expand_link,
};
use tracing::{debug, info};

use crate::cli::DeployReleaseArgs;
use crate::client::{CliError, CliResult};
use crate::output::render_watch_report;
use crate::resources::{Deployment, Environment, Project, Release};

pub(crate) const PROJECTS_ALL_PATH: &str = "/api/projects/all";
pub(crate) const ENVIRONMENTS_ALL_PATH: &str = "/api/environments/all";

/// Where the release to deploy comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ReleaseSource {
    Version(String),
    DeployedTo(String),
}

pub(crate) async fn handle_deploy_release(
    session: &Session,
    args: &DeployReleaseArgs,
) -> CliResult<()> {
    let project_name = non_blank(args.project.as_deref()).ok_or_else(|| {
        CliError::validation("Please specify a project name using the parameter: --project=XYZ")
    })?;
    if args.deploy_to.is_empty() {
        return Err(CliError::validation(
            "Please specify an environment using the parameter: --deployto=XYZ",
        ));
    }
    let source = match (
        non_blank(args.deploy_from.as_deref()),
        non_blank(args.version.as_deref()),
    ) {
        (Some(environment), _) => ReleaseSource::DeployedTo(environment.to_string()),
        (None, Some(version)) => ReleaseSource::Version(version.to_string()),
        (None, None) => {
            return Err(CliError::validation(
                "Please specify a release version or deploy from environment using the parameter: \
                 --version=1.0.0.0 or --deployfrom=dev",
            ));
        }
    };

    debug!(project = project_name, "finding project");
    let project = find_project(session, project_name).await?;

    debug!("finding environments");
    let environments: Vec<Environment> = session.list(ENVIRONMENTS_ALL_PATH).await?;
    let targets = select_environments(&environments, &args.deploy_to)?;

    let release = match &source {
        ReleaseSource::Version(version) => {
            debug!(version = %version, "finding release");
            find_release_by_version(session, &project, version).await?
        }
        ReleaseSource::DeployedTo(name) => {
            let from = select_environments(&environments, std::slice::from_ref(name))?;
            find_latest_deployed_release(session, &project, &from[0]).await?
        }
    };

    let tasks = create_deployments(
        session,
        &project,
        &release,
        &targets,
        args.force,
        args.force_package_download,
    )
    .await?;

    if !args.wait_for_deployment {
        return Ok(());
    }

    let watcher = DeploymentWatcher::new(
        args.deployment_timeout,
        args.deployment_check_sleep_cycle,
    );
    let report = watcher.watch(session, tasks).await;
    render_watch_report(&report);
    report.into_result()?;
    Ok(())
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

async fn find_project(session: &Session, name: &str) -> CliResult<Project> {
    let projects: Vec<Project> = session.list(PROJECTS_ALL_PATH).await?;
    projects
        .into_iter()
        .find(|project| project.name.eq_ignore_ascii_case(name))
        .ok_or_else(|| CliError::validation(format!("Could not find a project named '{name}'")))
}

/// Match requested environment names against the server's environments, keeping the
/// requested order and dropping duplicates.
fn select_environments(
    environments: &[Environment],
    names: &[String],
) -> CliResult<Vec<Environment>> {
    let mut selected: Vec<Environment> = Vec::with_capacity(names.len());
    let mut missing = Vec::new();

    for name in names {
        let name = name.trim();
        match environments
            .iter()
            .find(|environment| environment.name.eq_ignore_ascii_case(name))
        {
            Some(environment) => {
                if !selected.iter().any(|known| known.id == environment.id) {
                    selected.push(environment.clone());
                }
            }
            None => missing.push(name.to_string()),
        }
    }

    if !missing.is_empty() {
        return Err(CliError::validation(format!(
            "Could not find the following environment(s): {}",
            missing.join(", ")
        )));
    }
    Ok(selected)
}

async fn find_release_by_version(
    session: &Session,
    project: &Project,
    version: &str,
) -> CliResult<Release> {
    let path = expand_link(project.link("Releases")?, &[("version", version)]);
    match session.get::<Release>(&path).await {
        Ok(release) => Ok(release),
        Err(err) if err.status() == Some(404) => Err(CliError::validation(format!(
            "Could not find release '{version}' of project '{}'",
            project.name
        ))),
        Err(err) => Err(err.into()),
    }
}

async fn find_latest_deployed_release(
    session: &Session,
    project: &Project,
    environment: &Environment,
) -> CliResult<Release> {
    let root = session.root_document().await?;
    let project_id = project.id().unwrap_or_default();
    let environment_id = environment.id().unwrap_or_default();

    let path = expand_link(
        root.link("Deployments")?,
        &[("projects", project_id), ("environments", environment_id)],
    );
    let deployments: ResourceCollection<Deployment> = session.get(&path).await?;
    let latest = deployments
        .items
        .into_iter()
        .find(|deployment| deployment.environment_id == environment_id)
        .ok_or_else(|| {
            CliError::validation(format!(
                "No release of project '{}' has been deployed to '{}'",
                project.name, environment.name
            ))
        })?;

    debug!(release = %latest.release_id, environment = %environment.name, "using the release deployed to the source environment");
    let path = expand_link(root.link("Releases")?, &[("id", latest.release_id.as_str())]);
    Ok(session.get(&path).await?)
}

async fn create_deployments(
    session: &Session,
    project: &Project,
    release: &Release,
    environments: &[Environment],
    force: bool,
    force_package_download: bool,
) -> CliResult<Vec<TaskReference>> {
    let root = session.root_document().await?;
    let deployments_path = root.link("Deployments")?;
    let release_id = release
        .id()
        .ok_or_else(|| CliError::validation("the selected release has no identifier"))?;

    let mut tasks = Vec::with_capacity(environments.len());
    for environment in environments {
        let draft = Deployment {
            id: None,
            release_id: release_id.to_string(),
            environment_id: environment.id().unwrap_or_default().to_string(),
            force_package_redeployment: force,
            force_package_download,
            task_id: None,
            links: octo_client::Links::default(),
        };

        info!(
            project = %project.name,
            version = %release.version,
            environment = %environment.name,
            "deploying release"
        );
        let created = session.create(deployments_path, &draft).await?;

        let task_link = created.link("Task")?.to_string();
        let task_id = created.task_id.clone().unwrap_or_else(|| task_link.clone());
        match created.links().get("Web").map(|path| session.web_link(path)) {
            Some(Ok(web)) => println!(
                "Deploying {} {} to {}: {web}",
                project.name, release.version, environment.name
            ),
            _ => println!(
                "Deploying {} {} to {}",
                project.name, release.version, environment.name
            ),
        }
        tasks.push(TaskReference::new(task_id, environment.name.clone(), task_link));
    }
    Ok(tasks)
}
