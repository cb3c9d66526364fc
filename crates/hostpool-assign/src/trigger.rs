//! Deployment trigger.
//!
//! Every assignment that reaches `Active` is handed to a
//! [`DeploymentTrigger`], which starts the team's resource on the chosen
//! server. The trigger runs after the commit: a failing trigger is logged
//! and the assignment stays `Active`, so the deployment can be retried out
//! of band without touching capacity accounting.

use serde::{Deserialize, Serialize};
use tracing::info;

use hostpool_state::{Assignment, ResourceSpec, ServerId, TeamId};

/// What the deployment side needs to know about a new assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployRequest {
    pub server_id: ServerId,
    pub team_id: TeamId,
    pub resource: ResourceSpec,
}

impl From<&Assignment> for DeployRequest {
    fn from(a: &Assignment) -> Self {
        Self {
            server_id: a.server_id.clone(),
            team_id: a.team_id.clone(),
            resource: a.resource.clone(),
        }
    }
}

/// Starts deployments for newly active assignments.
pub trait DeploymentTrigger: Send + Sync {
    fn deploy(&self, request: &DeployRequest) -> anyhow::Result<()>;
}

/// Trigger that only records the request in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTrigger;

impl DeploymentTrigger for LogTrigger {
    fn deploy(&self, request: &DeployRequest) -> anyhow::Result<()> {
        info!(
            server = %request.server_id,
            team = %request.team_id,
            kind = ?request.resource.kind,
            resource = %request.resource.name,
            "deployment triggered"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostpool_state::*;

    #[test]
    fn request_from_assignment() {
        let assignment = Assignment {
            id: "asg-0000000001".to_string(),
            team_id: "team-a".to_string(),
            tier: Tier::Enterprise,
            server_id: "ent-1".to_string(),
            resource: ResourceSpec {
                kind: ResourceKind::Database,
                name: "orders".to_string(),
            },
            rule_version: 2,
            status: AssignmentStatus::Active,
            created_at: 10,
            released_at: None,
        };

        let request = DeployRequest::from(&assignment);
        assert_eq!(request.server_id, "ent-1");
        assert_eq!(request.team_id, "team-a");
        assert_eq!(request.resource.kind, ResourceKind::Database);
        assert!(LogTrigger.deploy(&request).is_ok());
    }
}
