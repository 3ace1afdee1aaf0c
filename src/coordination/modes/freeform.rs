//! freeform and threaded: unrestricted writes under the agent's own prefix

use crate::oss::WriteGrant;

use super::Probe;

pub fn message(probe: &Probe<'_>) -> WriteGrant {
    WriteGrant::Prefix(probe.message_prefix())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::modes::testing::Fixture;

    #[test]
    fn test_prefix_grant() {
        let fx = Fixture::new();
        assert_eq!(
            message(&fx.probe("a1")),
            WriteGrant::Prefix("topics/t1/messages/a1/".into())
        );
    }
}
