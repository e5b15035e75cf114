/*!
 * Transaction helpers
 *
 * Thin wrappers over sea-orm's explicit begin/commit that keep the
 * `dealership.db.transaction.*` counters in one place.
 */

use crate::errors::ServiceError;
use metrics::counter;
use sea_orm::{DatabaseTransaction, TransactionTrait};
use tracing::{debug, warn};

/// Opens a transaction on any connection or pool.
pub async fn begin<C>(db: &C) -> Result<DatabaseTransaction, ServiceError>
where
    C: TransactionTrait,
{
    let txn = db.begin().await.map_err(|e| {
        counter!("dealership.db.transaction.begin_failed", 1);
        ServiceError::db_error(e)
    })?;
    counter!("dealership.db.transaction.started", 1);
    debug!("Transaction started");
    Ok(txn)
}

/// Commits; on failure the transaction is already gone and the error is returned as storage error.
pub async fn commit(txn: DatabaseTransaction) -> Result<(), ServiceError> {
    match txn.commit().await {
        Ok(()) => {
            counter!("dealership.db.transaction.committed", 1);
            Ok(())
        }
        Err(e) => {
            counter!("dealership.db.transaction.rolled_back", 1);
            warn!(error = %e, "Transaction commit failed");
            Err(ServiceError::db_error(e))
        }
    }
}

/// Explicit rollback; a failure here is logged only, the caller already has the original error.
pub async fn rollback(txn: DatabaseTransaction) {
    counter!("dealership.db.transaction.rolled_back", 1);
    if let Err(e) = txn.rollback().await {
        warn!(error = %e, "Transaction rollback failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::customer;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use sea_orm::{ActiveModelTrait, EntityTrait, PaginatorTrait, Set};
    use uuid::Uuid;

    async fn pool() -> sea_orm::DatabaseConnection {
        let mut cfg = crate::db::DbConfig {
            url: "sqlite::memory:".into(),
            ..Default::default()
        };
        cfg.max_connections = 1;
        let pool = crate::db::establish_connection_with_config(&cfg)
            .await
            .unwrap();
        crate::db::run_migrations(&pool).await.unwrap();
        pool
    }

    fn customer() -> customer::ActiveModel {
        customer::ActiveModel {
            id: Set(Uuid::new_v4()),
            full_name: Set("Test Buyer".into()),
            discount_percent: Set(dec!(5)),
            created_at: Set(Utc::now()),
        }
    }

    #[tokio::test]
    async fn commit_persists_writes() {
        let db = pool().await;
        let txn = begin(&db).await.unwrap();
        customer().insert(&txn).await.unwrap();
        commit(txn).await.unwrap();

        assert_eq!(customer::Entity::find().count(&db).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn rollback_discards_writes() {
        let db = pool().await;
        let txn = begin(&db).await.unwrap();
        customer().insert(&txn).await.unwrap();
        rollback(txn).await;

        assert_eq!(customer::Entity::find().count(&db).await.unwrap(), 0);
    }
}
