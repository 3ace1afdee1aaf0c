//! Per-mode write authorization
//!
//! Every "once" rule is a deterministic object key: if the key already
//! exists the agent has acted, so a single existence check answers it.

pub mod daily;
pub mod drum;
pub mod duel;
pub mod freeform;
pub mod intro;
pub mod roles;
pub mod slots;
pub mod turn;

use crate::oss::{ObjectKeys, ObjectStore, WriteGrant};

use super::error::CoordinationError;

pub type Decision = Result<WriteGrant, CoordinationError>;

/// Existence and listing checks scoped to one (topic, agent)
pub struct Probe<'a> {
    pub store: &'a dyn ObjectStore,
    pub keys: &'a ObjectKeys,
    pub topic_id: &'a str,
    pub agent_id: &'a str,
}

/// File name of an object key without `.json`
fn stem(key: &str) -> &str {
    let name = key.rsplit('/').next().unwrap_or(key);
    name.strip_suffix(".json").unwrap_or(name)
}

impl<'a> Probe<'a> {
    pub fn message_key(&self, suffix: &str) -> String {
        self.keys.topic_message(self.topic_id, self.agent_id, suffix)
    }

    pub fn request_key(&self, request_type: &str, suffix: &str) -> String {
        self.keys.topic_request(self.topic_id, self.agent_id, request_type, suffix)
    }

    pub fn message_prefix(&self) -> String {
        self.keys.topic_messages_prefix(self.topic_id, self.agent_id)
    }

    async fn fresh(&self, key: String) -> Decision {
        if self.store.exists(&key).await? {
            return Err(CoordinationError::AlreadyWritten(key));
        }
        Ok(WriteGrant::Key(key))
    }

    /// Grant the message key unless it already exists
    pub async fn fresh_message(&self, suffix: &str) -> Decision {
        self.fresh(self.message_key(suffix)).await
    }

    /// Grant the request key unless it already exists
    pub async fn fresh_request(&self, request_type: &str, suffix: &str) -> Decision {
        self.fresh(self.request_key(request_type, suffix)).await
    }

    pub async fn message_exists(&self, suffix: &str) -> Result<bool, CoordinationError> {
        Ok(self.store.exists(&self.message_key(suffix)).await?)
    }

    /// Stems of this agent's message objects
    pub async fn own_message_stems(&self) -> Result<Vec<String>, CoordinationError> {
        let keys = self.store.list(&self.message_prefix()).await?;
        Ok(keys.iter().map(|k| stem(k).to_string()).collect())
    }

    /// Stems of this agent's request objects
    pub async fn own_request_stems(&self) -> Result<Vec<String>, CoordinationError> {
        let prefix = self.keys.topic_requests_prefix(self.topic_id, self.agent_id);
        let keys = self.store.list(&prefix).await?;
        Ok(keys.iter().map(|k| stem(k).to_string()).collect())
    }

    /// Agents (other than the caller) with a pending `req_{type}_{suffix}` object
    pub async fn pending_requesters(&self, request_type: &str, suffix: &str) -> Result<Vec<String>, CoordinationError> {
        let root = format!("{}requests/", self.keys.topic_prefix(self.topic_id));
        let wanted = format!("req_{}_{}", request_type, suffix);
        let keys = self.store.list(&root).await?;

        let mut agents: Vec<String> = keys
            .iter()
            .filter_map(|key| {
                let rest = key.strip_prefix(&root)?;
                let (agent, file) = rest.split_once('/')?;
                (stem(file) == wanted && agent != self.agent_id).then(|| agent.to_string())
            })
            .collect();
        agents.sort();
        agents.dedup();
        Ok(agents)
    }
}
