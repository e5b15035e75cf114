mod common;

use common::TestContext;
use dealership_sales::entities::{AuditOperation, SubjectKind};
use dealership_sales::services::sales::SaleChanges;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn unit_history_is_newest_first() {
    let ctx = TestContext::new().await;
    let actor = ctx.actor();
    let unit = ctx.seed_unit(dec!(12000)).await;
    let customer = ctx.seed_customer(Decimal::ZERO).await;

    ctx.inventory().reserve_unit(unit.id, &actor).await.unwrap();
    ctx.inventory()
        .update_price(unit.id, dec!(11000), &actor)
        .await
        .unwrap();
    let sale = ctx.sell(unit.id, customer).await;
    ctx.sales().cancel_sale(sale.id, &actor).await.unwrap();

    let history = ctx.audit().get_history(unit.id).await.unwrap();
    let operations: Vec<_> = history.iter().map(|entry| entry.operation).collect();
    assert_eq!(
        operations,
        vec![
            AuditOperation::Transition,
            AuditOperation::Transition,
            AuditOperation::PriceChange,
            AuditOperation::Reserve,
            AuditOperation::Intake,
        ]
    );
    assert!(history
        .iter()
        .all(|entry| entry.subject_kind == SubjectKind::Unit && entry.subject_id == unit.id));
    assert!(history.windows(2).all(|pair| pair[0].id > pair[1].id));

    let price_change = &history[2];
    assert_eq!(price_change.actor, actor);
    assert!(price_change
        .old_value
        .as_ref()
        .and_then(|v| v.get("base_price"))
        .is_some());

    let sold = &history[1];
    assert_eq!(
        sold.new_value.as_ref().and_then(|v| v.get("status")),
        Some(&json!("sold"))
    );
    assert_eq!(
        sold.old_value.as_ref().and_then(|v| v.get("status")),
        Some(&json!("reserved"))
    );
}

#[tokio::test]
async fn sale_history_records_create_update_cancel() {
    let ctx = TestContext::new().await;
    let actor = ctx.actor();
    let unit = ctx.seed_unit(dec!(12000)).await;
    let customer = ctx.seed_customer(dec!(10)).await;
    let sale = ctx.sell(unit.id, customer).await;

    ctx.sales()
        .update_sale(
            sale.id,
            SaleChanges {
                notes: Some("delivery in spring".to_string()),
                ..Default::default()
            },
            &actor,
        )
        .await
        .unwrap();
    ctx.sales().cancel_sale(sale.id, &actor).await.unwrap();

    let history = ctx.sales().get_history(sale.id).await.unwrap();
    let operations: Vec<_> = history.iter().map(|entry| entry.operation).collect();
    assert_eq!(
        operations,
        vec![
            AuditOperation::Cancel,
            AuditOperation::Update,
            AuditOperation::Create,
        ]
    );
    assert!(history
        .iter()
        .all(|entry| entry.subject_kind == SubjectKind::Sale));

    let created = history[2].new_value.as_ref().expect("create carries the sale");
    assert_eq!(created.get("unit_id"), Some(&json!(unit.id)));
    assert!(history[2].old_value.is_none());
}

#[tokio::test]
async fn unknown_subject_has_empty_history() {
    let ctx = TestContext::new().await;
    let history = ctx.audit().get_history(Uuid::new_v4()).await.unwrap();
    assert!(history.is_empty());
}
