//! Prefix-based access policies
//!
//! Writes are always narrower than reads: a write grant must sit inside
//! some read prefix and may never equal one.

use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeSet;

use crate::types::{AgoraError, Result};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum WriteGrant {
    /// Exactly one object
    Key(String),
    /// Everything under a prefix (freeform namespaces)
    Prefix(String),
}

impl WriteGrant {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Key(k) | Self::Prefix(k) => k,
        }
    }

    fn resource(&self) -> String {
        match self {
            Self::Key(k) => k.clone(),
            Self::Prefix(p) => format!("{}*", p),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AccessPolicy {
    pub read_prefixes: BTreeSet<String>,
    pub writes: BTreeSet<WriteGrant>,
}

impl AccessPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow_read(&mut self, prefix: impl Into<String>) -> &mut Self {
        self.read_prefixes.insert(prefix.into());
        self
    }

    pub fn allow_write(&mut self, grant: WriteGrant) -> &mut Self {
        self.writes.insert(grant);
        self
    }

    pub fn write_keys(&self) -> Vec<String> {
        self.writes.iter().map(|w| w.as_str().to_string()).collect()
    }

    pub fn has_writes(&self) -> bool {
        !self.writes.is_empty()
    }

    /// Check every write grant is strictly inside a read prefix
    pub fn validate(&self) -> Result<()> {
        for grant in &self.writes {
            let target = grant.as_str();
            let covered = self
                .read_prefixes
                .iter()
                .any(|read| target.starts_with(read.as_str()) && target != read);
            if !covered {
                return Err(AgoraError::Internal(format!(
                    "write grant {} is not narrower than any read prefix",
                    target
                )));
            }
        }
        Ok(())
    }

    /// Render as an object-store RAM policy document for `bucket`
    pub fn render(&self, bucket: &str) -> Result<Value> {
        self.validate()?;

        let prefixes: Vec<String> = self.read_prefixes.iter().map(|p| format!("{}*", p)).collect();
        let reads: Vec<String> = self
            .read_prefixes
            .iter()
            .map(|p| format!("acs:oss:*:*:{}/{}*", bucket, p))
            .collect();

        let mut statements = vec![
            json!({
                "Effect": "Allow",
                "Action": ["oss:ListObjects"],
                "Resource": [format!("acs:oss:*:*:{}", bucket)],
                "Condition": { "StringLike": { "oss:Prefix": prefixes } },
            }),
            json!({
                "Effect": "Allow",
                "Action": ["oss:GetObject", "oss:HeadObject"],
                "Resource": reads,
            }),
        ];

        if self.has_writes() {
            let writes: Vec<String> = self
                .writes
                .iter()
                .map(|w| format!("acs:oss:*:*:{}/{}", bucket, w.resource()))
                .collect();
            statements.push(json!({
                "Effect": "Allow",
                "Action": ["oss:PutObject"],
                "Resource": writes,
            }));
        }

        Ok(json!({ "Version": "1", "Statement": statements }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_must_be_inside_read() {
        let mut policy = AccessPolicy::new();
        policy.allow_read("topics/t1/");
        policy.allow_write(WriteGrant::Key("topics/t1/messages/a/x.json".into()));
        assert!(policy.validate().is_ok());

        policy.allow_write(WriteGrant::Key("topics/t2/messages/a/x.json".into()));
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_write_prefix_cannot_equal_read() {
        let mut policy = AccessPolicy::new();
        policy.allow_read("topics/t1/");
        policy.allow_write(WriteGrant::Prefix("topics/t1/".into()));
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_render_scopes_put_to_exact_key() {
        let mut policy = AccessPolicy::new();
        policy
            .allow_read("discovery/")
            .allow_read("topics/t1/")
            .allow_write(WriteGrant::Key("topics/t1/messages/a/t3_0001.json".into()));
        let doc = policy.render("bucket").unwrap();
        let statements = doc["Statement"].as_array().unwrap();
        assert_eq!(statements.len(), 3);
        assert_eq!(
            statements[2]["Resource"][0],
            "acs:oss:*:*:bucket/topics/t1/messages/a/t3_0001.json"
        );
    }

    #[test]
    fn test_read_only_policy_has_no_put() {
        let mut policy = AccessPolicy::new();
        policy.allow_read("discovery/");
        let doc = policy.render("b").unwrap();
        assert_eq!(doc["Statement"].as_array().unwrap().len(), 2);
    }
}
