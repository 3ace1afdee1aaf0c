//! collab_roles

use crate::coordination::error::CoordinationError;
use crate::coordination::rules::RoleRules;
use crate::coordination::state::{RolesState, TopicState};

use super::{Decision, Probe};

fn current(state: &TopicState) -> Result<&RolesState, CoordinationError> {
    match state {
        TopicState::Roles(roles) => Ok(roles),
        other => Err(CoordinationError::InvalidState(format!("expected roles state, got {:?}", other))),
    }
}

/// One write per held, unfinished role
pub async fn message(probe: &Probe<'_>, state: &TopicState) -> Decision {
    let roles = current(state)?;
    let open: Vec<&str> = roles
        .held_by(probe.agent_id)
        .filter(|r| !r.done)
        .map(|r| r.role.as_str())
        .collect();
    let Some(first) = open.first() else {
        return Err(CoordinationError::RoleNotHeld("any".into()));
    };

    for role in &open {
        let suffix = format!("role_{}", role);
        if !probe.message_exists(&suffix).await? {
            return Ok(crate::oss::WriteGrant::Key(probe.message_key(&suffix)));
        }
    }
    Err(CoordinationError::AlreadyWritten(probe.message_key(&format!("role_{}", first))))
}

pub async fn role_claim(probe: &Probe<'_>, rules: &RoleRules, state: &TopicState, role: &str) -> Decision {
    let roles = current(state)?;
    if !rules.roles.iter().any(|r| r == role) {
        return Err(CoordinationError::UnknownRole(role.to_string()));
    }
    if let Some(assigned) = roles.assignment(role).and_then(|a| a.agent_id.as_deref()) {
        if assigned == probe.agent_id {
            return Err(CoordinationError::AlreadyWritten(probe.request_key("role_claim", role)));
        }
        return Err(CoordinationError::RoleTaken(role.to_string()));
    }
    if !probe.pending_requesters("role_claim", role).await?.is_empty() {
        return Err(CoordinationError::RoleTaken(role.to_string()));
    }
    probe.fresh_request("role_claim", role).await
}

pub async fn role_done(probe: &Probe<'_>, state: &TopicState, role: &str) -> Decision {
    let roles = current(state)?;
    if !roles.held_by(probe.agent_id).any(|r| r.role == role) {
        return Err(CoordinationError::RoleNotHeld(role.to_string()));
    }
    probe.fresh_request("role_done", role).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::modes::testing::Fixture;
    use crate::coordination::state::RoleAssignment;

    fn rules() -> RoleRules {
        RoleRules {
            roles: vec!["writer".into(), "editor".into()],
        }
    }

    fn state(writer: Option<&str>) -> TopicState {
        TopicState::Roles(RolesState {
            roles: vec![RoleAssignment {
                role: "writer".into(),
                agent_id: writer.map(String::from),
                done: false,
            }],
        })
    }

    #[tokio::test]
    async fn test_claim_unassigned_role() {
        let fx = Fixture::new();
        assert!(matches!(
            role_claim(&fx.probe("a1"), &rules(), &state(None), "painter").await,
            Err(CoordinationError::UnknownRole(_))
        ));
        let grant = role_claim(&fx.probe("a1"), &rules(), &state(None), "writer").await.unwrap();
        fx.write(grant.as_str()).await;

        // a pending claim reserves the role
        assert!(matches!(
            role_claim(&fx.probe("a2"), &rules(), &state(None), "writer").await,
            Err(CoordinationError::RoleTaken(_))
        ));
        assert!(matches!(
            role_claim(&fx.probe("a2"), &rules(), &state(Some("a1")), "writer").await,
            Err(CoordinationError::RoleTaken(_))
        ));
        assert!(role_claim(&fx.probe("a2"), &rules(), &state(None), "editor").await.is_ok());
    }

    #[tokio::test]
    async fn test_role_message_and_done() {
        let fx = Fixture::new();
        let s = state(Some("a1"));
        assert!(matches!(
            message(&fx.probe("a2"), &s).await,
            Err(CoordinationError::RoleNotHeld(_))
        ));
        let grant = message(&fx.probe("a1"), &s).await.unwrap();
        assert_eq!(grant.as_str(), "topics/t1/messages/a1/role_writer.json");
        fx.write(grant.as_str()).await;
        assert!(message(&fx.probe("a1"), &s).await.is_err());

        assert!(role_done(&fx.probe("a2"), &s, "writer").await.is_err());
        let done = role_done(&fx.probe("a1"), &s, "writer").await.unwrap();
        fx.write(done.as_str()).await;
        assert!(role_done(&fx.probe("a1"), &s, "writer").await.is_err());
    }
}
