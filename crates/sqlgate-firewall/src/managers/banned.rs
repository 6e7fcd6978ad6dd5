//! Denies callers recorded by the `ban_user` trigger.

use crate::ban::BanTable;
use crate::error::FirewallError;
use crate::manager::FirewallManager;
use async_trait::async_trait;
use sqlgate_core::SqlEvent;
use sqlgate_db::DatabaseSession;
use sqlgate_sql::StatementShape;

pub struct DenyBannedUser {
    table: BanTable,
}

impl DenyBannedUser {
    pub(crate) fn new(table: BanTable) -> Self {
        Self { table }
    }
}

#[async_trait]
impl FirewallManager for DenyBannedUser {
    fn name(&self) -> &str {
        "deny_banned_user"
    }

    async fn allow_sql_run_after_analysis(
        &self,
        event: &SqlEvent,
        _shape: &StatementShape,
        session: &mut dyn DatabaseSession,
    ) -> Result<bool, FirewallError> {
        self.table.ensure(session).await?;
        let banned = session
            .execute(&self.table.lookup(event.username()))
            .await?
            .row_count()
            > 0;
        if banned {
            tracing::debug!(username = event.username(), "Caller is banned");
        }
        Ok(!banned)
    }
}
