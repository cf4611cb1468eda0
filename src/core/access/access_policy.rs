// Who counts as an administrator for a group.
//
// A user is an administrator if they are on the configured privileged list
// or the platform reports them as an administrator of that group.

use crate::core::transport::MessagingTransport;
use std::collections::BTreeSet;
use std::sync::Arc;

pub struct AccessPolicy {
    privileged: BTreeSet<u64>,
    transport: Arc<dyn MessagingTransport>,
}

impl AccessPolicy {
    pub fn new(
        privileged: impl IntoIterator<Item = u64>,
        transport: Arc<dyn MessagingTransport>,
    ) -> Self {
        Self {
            privileged: privileged.into_iter().collect(),
            transport,
        }
    }

    pub fn is_privileged(&self, user_id: u64) -> bool {
        self.privileged.contains(&user_id)
    }

    pub fn privileged_users(&self) -> impl Iterator<Item = u64> + '_ {
        self.privileged.iter().copied()
    }

    /// Privileged users pass without a platform lookup. A failed lookup
    /// denies access.
    pub async fn is_admin(&self, group_id: u64, user_id: u64) -> bool {
        if self.is_privileged(user_id) {
            return true;
        }

        match self.transport.is_administrator(group_id, user_id).await {
            Ok(is_admin) => is_admin,
            Err(err) => {
                tracing::warn!(
                    group_id,
                    user_id,
                    error = %err,
                    "Administrator lookup failed; treating user as non-admin"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::MockTransport;

    #[tokio::test]
    async fn test_privileged_user_is_admin_everywhere() {
        let transport = Arc::new(MockTransport::default());
        let policy = AccessPolicy::new([7], transport.clone());

        assert!(policy.is_admin(1, 7).await);
        assert!(policy.is_admin(2, 7).await);
        assert!(!policy.is_admin(1, 8).await);
    }

    #[tokio::test]
    async fn test_platform_admin_is_admin_of_that_group_only() {
        let transport = Arc::new(MockTransport::default());
        transport.grant_admin(1, 8);
        let policy = AccessPolicy::new([], transport.clone());

        assert!(policy.is_admin(1, 8).await);
        assert!(!policy.is_admin(2, 8).await);
    }

    #[tokio::test]
    async fn test_lookup_failure_denies() {
        let transport = Arc::new(MockTransport::default());
        transport.fail_admin_lookups();
        let policy = AccessPolicy::new([], transport.clone());

        assert!(!policy.is_admin(1, 8).await);
    }
}
