//! The set of identities currently holding a live Directory session (spec
//! §3 "Active user set"). Backed by `whirlwind::ShardSet`, a lock-free
//! concurrent set built for exactly this kind of high-churn
//! insert/contains/remove traffic from many connection-handler tasks.

use whirlwind::ShardSet;

#[derive(Default)]
pub struct ActiveUsers {
    identities: ShardSet<String>,
}

impl ActiveUsers {
    pub fn new() -> Self {
        Self { identities: ShardSet::new() }
    }

    /// Adds `identity` to the active set. Duplicate logins deduplicate
    /// silently, matching spec §3.
    pub async fn login(&self, identity: &str) {
        let _ = self.identities.insert(identity.to_string()).await;
    }

    pub async fn logout(&self, identity: &str) {
        let _ = self.identities.remove(identity).await;
    }

    pub async fn is_active(&self, identity: &str) -> bool {
        self.identities.contains(identity).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn login_logout_round_trips() {
        let users = ActiveUsers::new();
        users.login("alice").await;
        assert!(users.is_active("alice").await);
        users.logout("alice").await;
        assert!(!users.is_active("alice").await);
    }

    #[tokio::test]
    async fn duplicate_login_deduplicates() {
        let users = ActiveUsers::new();
        users.login("alice").await;
        users.login("alice").await;
        assert!(users.is_active("alice").await);
        users.logout("alice").await;
        assert!(!users.is_active("alice").await);
    }
}
