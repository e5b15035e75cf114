mod common;

use assert_matches::assert_matches;
use common::TestContext;
use dealership_sales::entities::{AuditOperation, PaymentType, SaleStatus, UnitStatus};
use dealership_sales::errors::ServiceError;
use dealership_sales::services::sales::{SaleChanges, SaleFilter};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

#[tokio::test]
async fn sale_applies_buyer_and_additional_discount() {
    let ctx = TestContext::new().await;
    let unit = ctx.seed_unit(dec!(100000)).await;
    let customer = ctx.seed_customer(dec!(5)).await;

    let mut new_sale = ctx.new_sale(unit.id, customer);
    new_sale.additional_discount_percent = dec!(3);
    let sale_id = ctx.sales().create_sale(new_sale).await.unwrap();

    let sale = ctx.sales().get_sale(sale_id).await.unwrap();
    assert_eq!(sale.base_price, dec!(100000));
    assert_eq!(sale.discount_percent, dec!(8));
    assert_eq!(sale.discount_amount, dec!(8000));
    assert_eq!(sale.final_price, dec!(92000));
    assert_eq!(sale.final_price + sale.discount_amount, sale.base_price);
    assert_eq!(sale.status, SaleStatus::Completed);
    assert_eq!(sale.payment_type, PaymentType::Cash);
    assert_eq!(sale.employee_id, ctx.employee_id);
    assert_eq!(sale.customer_id, Some(customer));
    assert_eq!(sale.corporate_client_id, None);

    let unit = ctx.inventory().get_unit(unit.id).await.unwrap();
    assert_eq!(unit.status, UnitStatus::Sold);
}

#[tokio::test]
async fn corporate_client_discount_is_resolved() {
    let ctx = TestContext::new().await;
    let unit = ctx.seed_unit(dec!(50000)).await;
    let client = ctx.seed_corporate_client(dec!(10)).await;

    let mut new_sale = ctx.new_sale(unit.id, Uuid::nil());
    new_sale.customer_id = None;
    new_sale.corporate_client_id = Some(client);
    new_sale.payment_type = PaymentType::Leasing;

    let sale_id = ctx.sales().create_sale(new_sale).await.unwrap();
    let sale = ctx.sales().get_sale(sale_id).await.unwrap();

    assert_eq!(sale.final_price, dec!(45000));
    assert_eq!(sale.corporate_client_id, Some(client));
    assert_eq!(sale.payment_type, PaymentType::Leasing);
}

#[tokio::test]
async fn combined_discount_above_hundred_is_capped_at_zero_price() {
    let ctx = TestContext::new().await;
    let unit = ctx.seed_unit(dec!(20000)).await;
    let customer = ctx.seed_customer(dec!(60)).await;

    let mut new_sale = ctx.new_sale(unit.id, customer);
    new_sale.additional_discount_percent = dec!(50);
    let sale_id = ctx.sales().create_sale(new_sale).await.unwrap();

    let sale = ctx.sales().get_sale(sale_id).await.unwrap();
    assert_eq!(sale.final_price, Decimal::ZERO);
    assert_eq!(sale.discount_amount, dec!(20000));
}

#[tokio::test]
async fn reserved_unit_can_be_sold() {
    let ctx = TestContext::new().await;
    let unit = ctx.seed_unit(dec!(30000)).await;
    let customer = ctx.seed_customer(Decimal::ZERO).await;

    ctx.inventory().reserve_unit(unit.id, &ctx.actor()).await.unwrap();
    let sale = ctx.sell(unit.id, customer).await;

    assert_eq!(sale.final_price, dec!(30000));
    let unit = ctx.inventory().get_unit(unit.id).await.unwrap();
    assert_eq!(unit.status, UnitStatus::Sold);
}

#[tokio::test]
async fn unsellable_units_are_rejected_without_side_effects() {
    let ctx = TestContext::new().await;
    let customer = ctx.seed_customer(Decimal::ZERO).await;

    let retired = ctx.seed_unit(dec!(10000)).await;
    ctx.inventory().retire_unit(retired.id, &ctx.actor()).await.unwrap();
    let err = ctx
        .sales()
        .create_sale(ctx.new_sale(retired.id, customer))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Conflict(_));

    let sold = ctx.seed_unit(dec!(10000)).await;
    ctx.sell(sold.id, customer).await;
    let err = ctx
        .sales()
        .create_sale(ctx.new_sale(sold.id, customer))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Conflict(_));

    let err = ctx
        .sales()
        .create_sale(ctx.new_sale(Uuid::new_v4(), customer))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));

    let completed = ctx
        .sales()
        .list_sales(
            SaleFilter {
                unit_id: Some(sold.id),
                status: Some(SaleStatus::Completed),
            },
            None,
            None,
        )
        .await
        .unwrap();
    assert_eq!(completed.len(), 1);
}

#[tokio::test]
async fn invalid_requests_leave_unit_available() {
    let ctx = TestContext::new().await;
    let unit = ctx.seed_unit(dec!(10000)).await;
    let customer = ctx.seed_customer(Decimal::ZERO).await;
    let client = ctx.seed_corporate_client(Decimal::ZERO).await;

    let mut no_buyer = ctx.new_sale(unit.id, customer);
    no_buyer.customer_id = None;
    assert_matches!(
        ctx.sales().create_sale(no_buyer).await,
        Err(ServiceError::ValidationError(_))
    );

    let mut both_buyers = ctx.new_sale(unit.id, customer);
    both_buyers.corporate_client_id = Some(client);
    assert_matches!(
        ctx.sales().create_sale(both_buyers).await,
        Err(ServiceError::ValidationError(_))
    );

    let mut no_employee = ctx.new_sale(unit.id, customer);
    no_employee.employee_id = Uuid::nil();
    assert_matches!(
        ctx.sales().create_sale(no_employee).await,
        Err(ServiceError::ValidationError(_))
    );

    let mut negative = ctx.new_sale(unit.id, customer);
    negative.additional_discount_percent = dec!(-1);
    assert_matches!(
        ctx.sales().create_sale(negative).await,
        Err(ServiceError::ValidationError(_))
    );

    assert_matches!(
        ctx.sales()
            .create_sale(ctx.new_sale(unit.id, Uuid::new_v4()))
            .await,
        Err(ServiceError::NotFound(_))
    );

    let unit = ctx.inventory().get_unit(unit.id).await.unwrap();
    assert_eq!(unit.status, UnitStatus::Available);
    let history = ctx.audit().get_history(unit.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].operation, AuditOperation::Intake);
}

#[tokio::test]
async fn additional_discount_respects_configured_ceiling() {
    let ctx = TestContext::with_config(|cfg| {
        cfg.max_additional_discount_percent = dec!(10);
    })
    .await;
    let unit = ctx.seed_unit(dec!(10000)).await;
    let customer = ctx.seed_customer(Decimal::ZERO).await;

    let mut generous = ctx.new_sale(unit.id, customer);
    generous.additional_discount_percent = dec!(15);
    assert_matches!(
        ctx.sales().create_sale(generous).await,
        Err(ServiceError::ValidationError(_))
    );

    let mut allowed = ctx.new_sale(unit.id, customer);
    allowed.additional_discount_percent = dec!(10);
    let sale_id = ctx.sales().create_sale(allowed).await.unwrap();
    let sale = ctx.sales().get_sale(sale_id).await.unwrap();
    assert_eq!(sale.final_price, dec!(9000));
}

#[tokio::test]
async fn cancel_releases_unit_and_allows_resale() {
    let ctx = TestContext::new().await;
    let unit = ctx.seed_unit(dec!(75000)).await;
    let customer = ctx.seed_customer(Decimal::ZERO).await;

    let first = ctx.sell(unit.id, customer).await;
    ctx.sales().cancel_sale(first.id, &ctx.actor()).await.unwrap();

    let cancelled = ctx.sales().get_sale(first.id).await.unwrap();
    assert_eq!(cancelled.status, SaleStatus::Cancelled);
    assert_eq!(cancelled.final_price, first.final_price);
    assert_eq!(
        ctx.inventory().get_unit(unit.id).await.unwrap().status,
        UnitStatus::Available
    );

    assert_matches!(
        ctx.sales().cancel_sale(first.id, &ctx.actor()).await,
        Err(ServiceError::Conflict(_))
    );

    let second = ctx.sell(unit.id, customer).await;
    assert_ne!(second.id, first.id);
    assert_eq!(
        ctx.inventory().get_unit(unit.id).await.unwrap().status,
        UnitStatus::Sold
    );

    let all = ctx
        .sales()
        .list_sales(
            SaleFilter {
                unit_id: Some(unit.id),
                status: None,
            },
            None,
            None,
        )
        .await
        .unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all.iter().filter(|s| s.is_active()).count(), 1);
}

#[tokio::test]
async fn delete_sale_behaves_like_cancel() {
    let ctx = TestContext::new().await;
    let unit = ctx.seed_unit(dec!(40000)).await;
    let customer = ctx.seed_customer(Decimal::ZERO).await;
    let sale = ctx.sell(unit.id, customer).await;

    ctx.sales().delete_sale(sale.id, &ctx.actor()).await.unwrap();

    let kept = ctx.sales().get_sale(sale.id).await.unwrap();
    assert_eq!(kept.status, SaleStatus::Cancelled);
    assert_eq!(
        ctx.inventory().get_unit(unit.id).await.unwrap().status,
        UnitStatus::Available
    );

    assert_matches!(
        ctx.sales().cancel_sale(Uuid::new_v4(), &ctx.actor()).await,
        Err(ServiceError::NotFound(_))
    );
}

#[tokio::test]
async fn cancel_records_discrepancy_when_unit_moved_on() {
    let ctx = TestContext::new().await;
    let unit = ctx.seed_unit(dec!(40000)).await;
    let customer = ctx.seed_customer(Decimal::ZERO).await;
    let sale = ctx.sell(unit.id, customer).await;

    // out-of-band release, as a buggy integration might do
    assert!(ctx
        .inventory()
        .try_transition(unit.id, &[UnitStatus::Sold], UnitStatus::Available)
        .await
        .unwrap());
    ctx.inventory().reserve_unit(unit.id, &ctx.actor()).await.unwrap();

    ctx.sales().cancel_sale(sale.id, &ctx.actor()).await.unwrap();

    assert_eq!(
        ctx.sales().get_sale(sale.id).await.unwrap().status,
        SaleStatus::Cancelled
    );
    assert_eq!(
        ctx.inventory().get_unit(unit.id).await.unwrap().status,
        UnitStatus::Reserved
    );

    let history = ctx.audit().get_history(unit.id).await.unwrap();
    assert_eq!(history[0].operation, AuditOperation::Discrepancy);
}

#[tokio::test]
async fn update_sale_changes_only_non_price_fields() {
    let ctx = TestContext::new().await;
    let unit = ctx.seed_unit(dec!(60000)).await;
    let customer = ctx.seed_customer(dec!(5)).await;
    let sale = ctx.sell(unit.id, customer).await;

    let updated = ctx
        .sales()
        .update_sale(
            sale.id,
            SaleChanges {
                payment_type: Some(PaymentType::Credit),
                contract_number: Some("CN-2026-0042".to_string()),
                notes: None,
            },
            &ctx.actor(),
        )
        .await
        .unwrap();

    assert_eq!(updated.payment_type, PaymentType::Credit);
    assert_eq!(updated.contract_number.as_deref(), Some("CN-2026-0042"));
    assert_eq!(updated.final_price, sale.final_price);
    assert_eq!(updated.discount_amount, sale.discount_amount);

    assert_matches!(
        ctx.sales()
            .update_sale(sale.id, SaleChanges::default(), &ctx.actor())
            .await,
        Err(ServiceError::ValidationError(_))
    );

    ctx.sales().cancel_sale(sale.id, &ctx.actor()).await.unwrap();
    assert_matches!(
        ctx.sales()
            .update_sale(
                sale.id,
                SaleChanges {
                    notes: Some("too late".to_string()),
                    ..Default::default()
                },
                &ctx.actor(),
            )
            .await,
        Err(ServiceError::Conflict(_))
    );
}

#[tokio::test]
async fn list_sales_is_newest_first_and_bounded() {
    let ctx = TestContext::new().await;
    let customer = ctx.seed_customer(Decimal::ZERO).await;

    let mut ids = Vec::new();
    for _ in 0..3 {
        let unit = ctx.seed_unit(dec!(1000)).await;
        ids.push(ctx.sell(unit.id, customer).await.id);
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    let listed = ctx
        .sales()
        .list_sales(SaleFilter::default(), None, None)
        .await
        .unwrap();
    assert_eq!(listed.len(), 3);
    assert_eq!(listed[0].id, ids[2]);
    assert_eq!(listed[2].id, ids[0]);

    let limited = ctx
        .sales()
        .list_sales(SaleFilter::default(), Some(1), Some(1))
        .await
        .unwrap();
    assert_eq!(limited.len(), 1);
    assert_eq!(limited[0].id, ids[1]);
}

#[tokio::test]
async fn unit_lifecycle_outside_sales() {
    let ctx = TestContext::new().await;
    let actor = ctx.actor();
    let unit = ctx.seed_unit(dec!(15000)).await;

    let reserved = ctx.inventory().reserve_unit(unit.id, &actor).await.unwrap();
    assert_eq!(reserved.status, UnitStatus::Reserved);
    assert_matches!(
        ctx.inventory().reserve_unit(unit.id, &actor).await,
        Err(ServiceError::Conflict(_))
    );

    let repriced = ctx
        .inventory()
        .update_price(unit.id, dec!(14000), &actor)
        .await
        .unwrap();
    assert_eq!(repriced.base_price, dec!(14000));

    let released = ctx.inventory().release_unit(unit.id, &actor).await.unwrap();
    assert_eq!(released.status, UnitStatus::Available);

    let retired = ctx.inventory().retire_unit(unit.id, &actor).await.unwrap();
    assert_eq!(retired.status, UnitStatus::Retired);
    assert_matches!(
        ctx.inventory().release_unit(unit.id, &actor).await,
        Err(ServiceError::Conflict(_))
    );
    assert_matches!(
        ctx.inventory().update_price(unit.id, dec!(1), &actor).await,
        Err(ServiceError::Conflict(_))
    );

    assert_matches!(
        ctx.inventory().update_price(unit.id, dec!(-5), &actor).await,
        Err(ServiceError::ValidationError(_))
    );
}

#[tokio::test]
async fn sold_price_is_frozen_and_unit_cannot_be_deleted() {
    let ctx = TestContext::new().await;
    let actor = ctx.actor();
    let unit = ctx.seed_unit(dec!(15000)).await;
    let customer = ctx.seed_customer(Decimal::ZERO).await;
    let sale = ctx.sell(unit.id, customer).await;

    assert_matches!(
        ctx.inventory().update_price(unit.id, dec!(1000), &actor).await,
        Err(ServiceError::Conflict(_))
    );
    assert_matches!(
        ctx.inventory().delete_unit(unit.id, &actor).await,
        Err(ServiceError::Conflict(_))
    );

    ctx.sales().cancel_sale(sale.id, &actor).await.unwrap();
    ctx.inventory().delete_unit(unit.id, &actor).await.unwrap();
    assert_matches!(
        ctx.inventory().get_unit(unit.id).await,
        Err(ServiceError::NotFound(_))
    );

    // history outlives the row
    let history = ctx.audit().get_history(unit.id).await.unwrap();
    assert_eq!(history[0].operation, AuditOperation::Delete);
}

#[tokio::test]
async fn negative_intake_price_is_rejected() {
    let ctx = TestContext::new().await;
    let err = ctx
        .inventory()
        .create_unit(
            dealership_sales::services::inventory::NewUnit {
                base_price: dec!(-1),
                warehouse_id: None,
                serial_number: None,
            },
            &ctx.actor(),
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}
