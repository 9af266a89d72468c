//! Server resources the commands read and create.

use octo_client::{Links, Resource};
use serde::{Deserialize, Serialize};

/// A deployable project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct Project {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) id: Option<String>,
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) links: Links,
}

/// A deployment target environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct Environment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) id: Option<String>,
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) links: Links,
}

/// A versioned release of a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct Release {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) id: Option<String>,
    pub(crate) version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) project_id: Option<String>,
    #[serde(default)]
    pub(crate) links: Links,
}

/// A request to deploy a release to one environment, and the server's record of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct Deployment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) id: Option<String>,
    pub(crate) release_id: String,
    pub(crate) environment_id: String,
    #[serde(default)]
    pub(crate) force_package_redeployment: bool,
    #[serde(default)]
    pub(crate) force_package_download: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) task_id: Option<String>,
    #[serde(default)]
    pub(crate) links: Links,
}

macro_rules! impl_resource {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl Resource for $ty {
                fn id(&self) -> Option<&str> {
                    self.id.as_deref()
                }

                fn links(&self) -> &Links {
                    &self.links
                }
            }
        )+
    };
}

impl_resource!(Project, Environment, Release, Deployment);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_deployment_omits_server_assigned_fields() -> anyhow::Result<()> {
        let deployment = Deployment {
            id: None,
            release_id: "Releases-1".to_string(),
            environment_id: "Environments-2".to_string(),
            force_package_redeployment: true,
            force_package_download: false,
            task_id: None,
            links: Links::default(),
        };
        assert_eq!(
            serde_json::to_value(&deployment)?,
            json!({
                "ReleaseId": "Releases-1",
                "EnvironmentId": "Environments-2",
                "ForcePackageRedeployment": true,
                "ForcePackageDownload": false,
                "Links": {}
            })
        );
        Ok(())
    }

    #[test]
    fn release_reads_server_payload() -> anyhow::Result<()> {
        let release: Release = serde_json::from_value(json!({
            "Id": "Releases-9",
            "Version": "1.4.0",
            "ProjectId": "Projects-1",
            "ReleaseNotes": "ignored",
            "Links": { "Self": "/api/releases/Releases-9" }
        }))?;
        assert_eq!(release.id(), Some("Releases-9"));
        assert_eq!(release.link("Self")?, "/api/releases/Releases-9");
        Ok(())
    }
}
