//! Object key layout
//!
//! Agents compute the same keys independently, so these formats are a
//! compatibility surface and must not drift.

/// Key builder rooted at the deployment's base prefix
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectKeys {
    base: String,
}

impl ObjectKeys {
    /// `base_prefix` is normalised to either empty or `something/`
    pub fn new(base_prefix: &str) -> Self {
        let trimmed = base_prefix.trim().trim_matches('/');
        let base = if trimmed.is_empty() {
            String::new()
        } else {
            format!("{}/", trimmed)
        };
        Self { base }
    }

    pub fn base_prefix(&self) -> &str {
        &self.base
    }

    fn key(&self, rel: String) -> String {
        format!("{}{}", self.base, rel)
    }

    // Shared prefixes

    pub fn discovery_prefix(&self) -> String {
        self.key("discovery/".to_string())
    }

    pub fn registry_prefix(&self) -> String {
        self.key("registry/".to_string())
    }

    /// Registry entries one agent may publish
    pub fn registry_agent_prefix(&self, agent_id: &str) -> String {
        self.key(format!("registry/agents/{}/", agent_id))
    }

    /// Agent's private area
    pub fn agent_prefix(&self, agent_id: &str) -> String {
        self.key(format!("agents/{}/", agent_id))
    }

    // Circles

    pub fn circle_prefix(&self, circle_id: &str) -> String {
        self.key(format!("circles/{}/", circle_id))
    }

    pub fn circle_manifest(&self, circle_id: &str) -> String {
        self.key(format!("circles/{}/manifest.json", circle_id))
    }

    pub fn circle_member(&self, circle_id: &str, agent_id: &str) -> String {
        self.key(format!("circles/{}/members/{}.json", circle_id, agent_id))
    }

    pub fn circle_join_requests_prefix(&self, circle_id: &str) -> String {
        self.key(format!("circles/{}/join_requests/", circle_id))
    }

    pub fn circle_join_request(&self, circle_id: &str, agent_id: &str) -> String {
        self.key(format!("circles/{}/join_requests/{}.json", circle_id, agent_id))
    }

    // Tasks

    pub fn task_prefix(&self, task_id: &str) -> String {
        self.key(format!("tasks/{}/", task_id))
    }

    pub fn task_manifest(&self, task_id: &str) -> String {
        self.key(format!("tasks/{}/manifest.json", task_id))
    }

    pub fn task_submissions_prefix(&self, task_id: &str, agent_id: &str) -> String {
        self.key(format!("tasks/{}/submissions/{}/", task_id, agent_id))
    }

    // Topics

    pub fn topic_prefix(&self, topic_id: &str) -> String {
        self.key(format!("topics/{}/", topic_id))
    }

    pub fn topic_manifest(&self, topic_id: &str) -> String {
        self.key(format!("topics/{}/manifest.json", topic_id))
    }

    pub fn topic_state(&self, topic_id: &str) -> String {
        self.key(format!("topics/{}/state.json", topic_id))
    }

    pub fn topic_messages_prefix(&self, topic_id: &str, agent_id: &str) -> String {
        self.key(format!("topics/{}/messages/{}/", topic_id, agent_id))
    }

    pub fn topic_message(&self, topic_id: &str, agent_id: &str, suffix: &str) -> String {
        self.key(format!("topics/{}/messages/{}/{}.json", topic_id, agent_id, suffix))
    }

    pub fn topic_requests_prefix(&self, topic_id: &str, agent_id: &str) -> String {
        self.key(format!("topics/{}/requests/{}/", topic_id, agent_id))
    }

    pub fn topic_request(&self, topic_id: &str, agent_id: &str, request_type: &str, suffix: &str) -> String {
        self.key(format!(
            "topics/{}/requests/{}/req_{}_{}.json",
            topic_id, agent_id, request_type, suffix
        ))
    }
}

/// Reject ids that could escape their key segment
pub fn is_safe_segment(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && id != "."
        && id != ".."
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':' | '@'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_exact_layout() {
        let keys = ObjectKeys::new("");
        assert_eq!(keys.circle_manifest("c1"), "circles/c1/manifest.json");
        assert_eq!(keys.circle_member("c1", "a1"), "circles/c1/members/a1.json");
        assert_eq!(keys.task_manifest("t1"), "tasks/t1/manifest.json");
        assert_eq!(keys.topic_manifest("p1"), "topics/p1/manifest.json");
        assert_eq!(keys.topic_state("p1"), "topics/p1/state.json");
        assert_eq!(
            keys.topic_message("p1", "a1", "intro_card_v1"),
            "topics/p1/messages/a1/intro_card_v1.json"
        );
        assert_eq!(
            keys.topic_request("p1", "a1", "queue_join", "t7"),
            "topics/p1/requests/a1/req_queue_join_t7.json"
        );
    }

    #[test]
    fn test_base_prefix_normalised() {
        for base in ["agora", "/agora/", "agora/"] {
            let keys = ObjectKeys::new(base);
            assert_eq!(keys.base_prefix(), "agora/");
            assert_eq!(keys.discovery_prefix(), "agora/discovery/");
        }
        assert_eq!(ObjectKeys::new("  ").agent_prefix("a"), "agents/a/");
    }

    #[test]
    fn test_segment_safety() {
        assert!(is_safe_segment("agent-1_x.y"));
        assert!(!is_safe_segment(""));
        assert!(!is_safe_segment(".."));
        assert!(!is_safe_segment("a/b"));
        assert!(!is_safe_segment("a*"));
    }
}
