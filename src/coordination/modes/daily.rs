//! daily_checkin: one check-in per agent per local calendar day, plus a
//! daily quota of topic/task proposals

use chrono::{DateTime, Utc};

use crate::coordination::error::CoordinationError;
use crate::coordination::rules::DailyRules;

use super::{Decision, Probe};

pub async fn message(probe: &Probe<'_>, rules: &DailyRules, now: DateTime<Utc>) -> Decision {
    probe.fresh_message(&rules.local_date(now)).await
}

/// `proposal` is `topic` or `task`
pub async fn propose(probe: &Probe<'_>, rules: &DailyRules, proposal: &str, now: DateTime<Utc>) -> Decision {
    if !rules.proposal_types.iter().any(|t| t == proposal) {
        return Err(CoordinationError::ProposalTypeNotAllowed(proposal.to_string()));
    }

    let date = rules.local_date(now);
    let day_marker = format!("_{}_", date);
    let used = probe
        .own_request_stems()
        .await?
        .iter()
        .filter(|s| s.starts_with("req_propose_") && s.contains(&day_marker))
        .count() as u32;
    if used >= rules.proposal_quota {
        return Err(CoordinationError::QuotaExhausted);
    }

    let request_type = format!("propose_{}", proposal);
    probe.fresh_request(&request_type, &format!("{}_{}", date, used + 1)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::modes::testing::Fixture;
    use chrono::TimeZone;

    fn rules(quota: u32) -> DailyRules {
        DailyRules {
            timezone: chrono_tz::America::New_York,
            proposal_quota: quota,
            proposal_types: vec!["topic".into()],
        }
    }

    #[tokio::test]
    async fn test_once_per_local_day() {
        let fx = Fixture::new();
        let r = rules(1);
        // 23:30 New York time on 2025-06-01
        let late = Utc.with_ymd_and_hms(2025, 6, 2, 3, 30, 0).unwrap();
        let grant = message(&fx.probe("a"), &r, late).await.unwrap();
        assert_eq!(grant.as_str(), "topics/t1/messages/a/2025-06-01.json");
        fx.write(grant.as_str()).await;

        assert!(message(&fx.probe("a"), &r, late + chrono::Duration::minutes(20)).await.is_err());
        let after_midnight = late + chrono::Duration::minutes(31);
        assert_eq!(
            message(&fx.probe("a"), &r, after_midnight).await.unwrap().as_str(),
            "topics/t1/messages/a/2025-06-02.json"
        );
    }

    #[tokio::test]
    async fn test_proposal_quota_and_allow_list() {
        let fx = Fixture::new();
        let r = rules(2);
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 15, 0, 0).unwrap();

        assert!(matches!(
            propose(&fx.probe("a"), &r, "task", now).await,
            Err(CoordinationError::ProposalTypeNotAllowed(_))
        ));

        let first = propose(&fx.probe("a"), &r, "topic", now).await.unwrap();
        assert_eq!(first.as_str(), "topics/t1/requests/a/req_propose_topic_2025-06-01_1.json");
        fx.write(first.as_str()).await;
        let second = propose(&fx.probe("a"), &r, "topic", now).await.unwrap();
        fx.write(second.as_str()).await;

        assert!(matches!(
            propose(&fx.probe("a"), &r, "topic", now).await,
            Err(CoordinationError::QuotaExhausted)
        ));
    }
}
