use zvr_order_engine::{
    db_types::{Actor, MovementType, OrderStatusType, Rupiah, StockKey},
    test_utils::catalog::{checkout, product_stock, seed_product, seed_variant},
    EngineError,
    ErrorKind,
};

use crate::support::{admin, TestSystem};

mod support;

#[tokio::test]
async fn checkout_reserves_stock() {
    let sys = TestSystem::new().await;
    let shirt = sys.seed_shirt().await;
    let order = sys.place_order(shirt).await;

    assert_eq!(order.status, OrderStatusType::Pending);
    assert_eq!(order.subtotal, Rupiah::from(100_000));
    assert_eq!(order.total_amount, Rupiah::from(115_000));
    assert!(order.stock_reserved);
    assert!(order.order_code.as_str().starts_with("ZVR-20240603-"));
    assert_eq!(product_stock(&sys.db, shirt).await, 8);

    let movements = sys.orders.stock_movements_for_order(&order.order_code).await.unwrap();
    assert_eq!(movements.len(), 1);
    assert_eq!(movements[0].movement_type, MovementType::Reserve);
    assert_eq!(movements[0].quantity, 2);
    assert_eq!(movements[0].balance_after, 8);

    let history = sys.orders.history(&order.order_code).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].from_status, None);
    assert_eq!(history[0].to_status, "PENDING");
    assert_eq!(history[0].actor, "customer:1");
    sys.tear_down().await;
}

#[tokio::test]
async fn variant_price_is_snapshotted() {
    let sys = TestSystem::new().await;
    let dress = seed_product(&sys.db, "Batik dress", 200_000, 0).await;
    let large = seed_variant(&sys.db, dress, "L", Some(220_000), 3).await;
    let detail = sys.orders.create_order(checkout(&[(dress, Some(large), 1)], 20_000), &Actor::System).await.unwrap();
    assert_eq!(detail.items.len(), 1);
    assert_eq!(detail.items[0].price_per_unit, Rupiah::from(220_000));
    assert_eq!(detail.items[0].product_name, "Batik dress - L");
    assert_eq!(detail.order.total_amount, Rupiah::from(240_000));
    let report = sys.orders.verify_stock_ledger(StockKey::new(dress, Some(large))).await.unwrap();
    assert_eq!(report.current_stock, 2);
    assert!(report.is_consistent());
    sys.tear_down().await;
}

#[tokio::test]
async fn insufficient_stock_writes_nothing() {
    let sys = TestSystem::new().await;
    let shirt = sys.seed_shirt().await;
    let scarf = seed_product(&sys.db, "Silk scarf", 75_000, 1).await;
    let err = sys
        .orders
        .create_order(checkout(&[(shirt, None, 2), (scarf, None, 2)], 15_000), &Actor::System)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InsufficientStock { requested: 2, available: 1, .. }), "{err}");
    assert_eq!(err.kind(), ErrorKind::StateConflict);
    assert_eq!(product_stock(&sys.db, shirt).await, 10);
    assert_eq!(product_stock(&sys.db, scarf).await, 1);
    let report = sys.orders.verify_stock_ledger(StockKey::new(shirt, None)).await.unwrap();
    assert_eq!(report.reserved, 0);
    sys.tear_down().await;
}

#[tokio::test]
async fn empty_checkout_is_rejected() {
    let sys = TestSystem::new().await;
    let err = sys.orders.create_order(checkout(&[], 15_000), &Actor::System).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    sys.tear_down().await;
}

#[tokio::test]
async fn full_lifecycle() {
    let sys = TestSystem::new().await;
    let shirt = sys.seed_shirt().await;
    let order = sys.place_order(shirt).await;
    let code = &order.order_code;
    let admin = admin();

    sys.orders.mark_paid(code, &admin, "bank transfer confirmed").await.unwrap();
    sys.orders.mark_packing(code, &admin).await.unwrap();
    let deadline = std::time::Duration::from_secs(1);
    let shipped = sys.orders.ship_order(code, None, &admin, &sys.shipping, deadline).await.unwrap();
    assert_eq!(shipped.order.status, OrderStatusType::Shipped);
    assert_eq!(shipped.order.resi.as_deref(), Some("STUB0001"));
    assert!(shipped.order.shipped_at.is_some());
    let waybills = sys.shipping.waybill_requests();
    assert_eq!(waybills.len(), 1);
    assert_eq!(waybills[0].item_count, 2);
    assert_eq!(waybills[0].courier, "jne");

    sys.orders.mark_delivered(code, &admin).await.unwrap();
    let done = sys.orders.mark_completed(code, &admin).await.unwrap();
    assert!(done.order.delivered_at.is_some());
    assert!(done.order.completed_at.is_some());
    assert!(done.released.is_empty());

    let history = sys.orders.history(code).await.unwrap();
    let path = history.iter().map(|h| h.to_status.as_str()).collect::<Vec<_>>();
    assert_eq!(path, ["PENDING", "PAID", "PACKING", "SHIPPED", "DELIVERED", "COMPLETED"]);
    assert_eq!(history[1].reason.as_deref(), Some("bank transfer confirmed"));
    assert_eq!(history[1].actor, "admin:ops@zvr.id");
    // Stock stays deducted once paid
    assert_eq!(product_stock(&sys.db, shirt).await, 8);
    sys.tear_down().await;
}

#[tokio::test]
async fn transitions_outside_the_table_are_refused() {
    let sys = TestSystem::new().await;
    let shirt = sys.seed_shirt().await;
    let order = sys.place_order(shirt).await;
    let err = sys.orders.mark_delivered(&order.order_code, &admin()).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidTransition(_)));
    assert_eq!(err.kind(), ErrorKind::StateConflict);
    let err = sys.orders.mark_shipped_with_resi(&order.order_code, "JNE1", &admin()).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidTransition(_)));
    let order = sys.order(&order.order_code).await;
    assert_eq!(order.status, OrderStatusType::Pending);
    assert_eq!(order.resi, None);
    sys.tear_down().await;
}

#[tokio::test]
async fn resi_rules() {
    let sys = TestSystem::new().await;
    let shirt = sys.seed_shirt().await;
    let admin = admin();
    let first = sys.paid_order(shirt).await;
    let second = sys.paid_order(shirt).await;

    let err = sys.orders.set_resi(&first.order_code, "  ", &admin).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    sys.orders.set_resi(&first.order_code, "JNE0001", &admin).await.unwrap();
    // Can still be corrected while packing
    sys.orders.mark_packing(&first.order_code, &admin).await.unwrap();
    let updated = sys.orders.set_resi(&first.order_code, "JNE0002", &admin).await.unwrap();
    assert_eq!(updated.resi.as_deref(), Some("JNE0002"));

    let err = sys.orders.set_resi(&second.order_code, "JNE0002", &admin).await.unwrap_err();
    assert!(matches!(err, EngineError::DuplicateResi(_)));

    sys.orders.ship_order(&first.order_code, Some("JNE0002"), &admin, &sys.shipping, Default::default()).await.unwrap();
    assert!(sys.shipping.waybill_requests().is_empty());
    let err = sys.orders.set_resi(&first.order_code, "JNE0003", &admin).await.unwrap_err();
    assert!(matches!(err, EngineError::ResiLocked(OrderStatusType::Shipped)));
    sys.tear_down().await;
}

#[tokio::test]
async fn cancelling_restores_stock_once() {
    let sys = TestSystem::new().await;
    let shirt = sys.seed_shirt().await;
    let order = sys.place_order(shirt).await;
    let code = &order.order_code;

    let result = sys.orders.cancel(code, &Actor::Customer(1), Some("changed my mind")).await.unwrap();
    assert_eq!(result.order.status, OrderStatusType::Cancelled);
    assert!(!result.order.stock_reserved);
    assert!(result.order.cancelled_at.is_some());
    assert_eq!(result.released.len(), 1);
    assert_eq!(product_stock(&sys.db, shirt).await, 10);

    let err = sys.orders.cancel(code, &admin(), None).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidTransition(_)));
    let movements = sys.orders.stock_movements_for_order(code).await.unwrap();
    let released = movements.iter().filter(|m| m.movement_type == MovementType::Release).count();
    assert_eq!(released, 1);
    let net: i64 = movements
        .iter()
        .map(|m| match m.movement_type {
            MovementType::Reserve => m.quantity,
            _ => -m.quantity,
        })
        .sum();
    assert_eq!(net, 0);
    let report = sys.orders.verify_stock_ledger(StockKey::new(shirt, None)).await.unwrap();
    assert!(report.is_consistent());
    assert_eq!(report.expected_stock, 10);
    sys.tear_down().await;
}

#[tokio::test]
async fn paid_orders_can_be_cancelled_before_shipping() {
    let sys = TestSystem::new().await;
    let shirt = sys.seed_shirt().await;
    let order = sys.paid_order(shirt).await;
    sys.orders.mark_packing(&order.order_code, &admin()).await.unwrap();
    let result = sys.orders.cancel(&order.order_code, &admin(), Some("out of stock at warehouse")).await.unwrap();
    assert_eq!(result.from, OrderStatusType::Packing);
    assert_eq!(product_stock(&sys.db, shirt).await, 10);
    sys.tear_down().await;
}

#[tokio::test]
async fn unknown_orders() {
    let sys = TestSystem::new().await;
    let code = zvr_order_engine::db_types::OrderCode::new("ZVR-20240603-DEADBEEF");
    let err = sys.orders.fetch_order(&code).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let err = sys.orders.cancel(&code, &admin(), None).await.unwrap_err();
    assert!(matches!(err, EngineError::OrderNotFound(_)));
    sys.tear_down().await;
}
