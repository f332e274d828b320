//! The stock ledger. Stock levels live on `products` and `product_variants`; every change is mirrored by exactly one
//! row in the append-only `stock_movements` table in the same transaction.
use chrono::{DateTime, Utc};
use log::*;
use sqlx::SqliteConnection;

use crate::{
    db_types::{MovementType, Order, Product, ProductVariant, StockKey, StockMovement},
    errors::EngineError,
    sqlite::db::{order_items, orders},
};

/// The catalog row a reservation was taken from, as it stood after the decrement.
#[derive(Debug, Clone)]
pub struct Reserved {
    pub product: Product,
    pub variant: Option<ProductVariant>,
    pub balance_after: i64,
}

pub async fn fetch_product(id: i64, conn: &mut SqliteConnection) -> Result<Option<Product>, sqlx::Error> {
    let product = sqlx::query_as("SELECT * FROM products WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(product)
}

pub async fn fetch_variant(
    product_id: i64,
    variant_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<ProductVariant>, sqlx::Error> {
    let variant = sqlx::query_as("SELECT * FROM product_variants WHERE id = $1 AND product_id = $2")
        .bind(variant_id)
        .bind(product_id)
        .fetch_optional(conn)
        .await?;
    Ok(variant)
}

/// The current stock of the SKU, or `None` if it does not exist.
pub async fn current_stock(key: StockKey, conn: &mut SqliteConnection) -> Result<Option<(i64, i64)>, sqlx::Error> {
    let row: Option<(i64, i64)> = match key.variant_id {
        Some(v) => {
            sqlx::query_as("SELECT stock, initial_stock FROM product_variants WHERE id = $1 AND product_id = $2")
                .bind(v)
                .bind(key.product_id)
                .fetch_optional(conn)
                .await?
        },
        None => {
            sqlx::query_as("SELECT stock, initial_stock FROM products WHERE id = $1")
                .bind(key.product_id)
                .fetch_optional(conn)
                .await?
        },
    };
    Ok(row)
}

/// Decrements stock for the SKU if at least `quantity` is available. The conditional update is the row lock, the
/// availability check and the decrement in one statement.
pub async fn take_stock(key: StockKey, quantity: i64, conn: &mut SqliteConnection) -> Result<Reserved, EngineError> {
    let reserved = match key.variant_id {
        Some(v) => {
            let variant: Option<ProductVariant> = sqlx::query_as(
                "UPDATE product_variants SET stock = stock - $1 WHERE id = $2 AND product_id = $3 AND stock >= $1 \
                 RETURNING *",
            )
            .bind(quantity)
            .bind(v)
            .bind(key.product_id)
            .fetch_optional(&mut *conn)
            .await?;
            match variant {
                Some(variant) => {
                    let product = fetch_product(key.product_id, conn).await?.ok_or(EngineError::ProductNotFound(key))?;
                    let balance_after = variant.stock;
                    Reserved { product, variant: Some(variant), balance_after }
                },
                None => return Err(shortfall(key, quantity, conn).await),
            }
        },
        None => {
            let product: Option<Product> =
                sqlx::query_as("UPDATE products SET stock = stock - $1 WHERE id = $2 AND stock >= $1 RETURNING *")
                    .bind(quantity)
                    .bind(key.product_id)
                    .fetch_optional(&mut *conn)
                    .await?;
            match product {
                Some(product) => {
                    let balance_after = product.stock;
                    Reserved { product, variant: None, balance_after }
                },
                None => return Err(shortfall(key, quantity, conn).await),
            }
        },
    };
    trace!("🗃️ Took {quantity} of {key}. {} left", reserved.balance_after);
    Ok(reserved)
}

async fn shortfall(key: StockKey, requested: i64, conn: &mut SqliteConnection) -> EngineError {
    match current_stock(key, conn).await {
        Ok(Some((available, _))) => EngineError::InsufficientStock { key, requested, available },
        Ok(None) => EngineError::ProductNotFound(key),
        Err(e) => e.into(),
    }
}

/// Increments stock for the SKU and returns the new balance.
pub async fn put_back_stock(key: StockKey, quantity: i64, conn: &mut SqliteConnection) -> Result<i64, EngineError> {
    let balance: Option<i64> = match key.variant_id {
        Some(v) => {
            sqlx::query_scalar(
                "UPDATE product_variants SET stock = stock + $1 WHERE id = $2 AND product_id = $3 RETURNING stock",
            )
            .bind(quantity)
            .bind(v)
            .bind(key.product_id)
            .fetch_optional(conn)
            .await?
        },
        None => {
            sqlx::query_scalar("UPDATE products SET stock = stock + $1 WHERE id = $2 RETURNING stock")
                .bind(quantity)
                .bind(key.product_id)
                .fetch_optional(conn)
                .await?
        },
    };
    balance.ok_or(EngineError::ProductNotFound(key))
}

#[allow(clippy::too_many_arguments)]
pub async fn record_movement(
    key: StockKey,
    order_id: Option<i64>,
    refund_id: Option<i64>,
    movement_type: MovementType,
    quantity: i64,
    balance_after: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<StockMovement, sqlx::Error> {
    let movement = sqlx::query_as(
        r#"
            INSERT INTO stock_movements (
                product_id,
                variant_id,
                order_id,
                refund_id,
                movement_type,
                quantity,
                balance_after,
                created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
        "#,
    )
    .bind(key.product_id)
    .bind(key.variant_id)
    .bind(order_id)
    .bind(refund_id)
    .bind(movement_type)
    .bind(quantity)
    .bind(balance_after)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(movement)
}

/// Returns `quantity` of the SKU to stock and writes the RELEASE movement.
pub async fn release(
    key: StockKey,
    quantity: i64,
    order_id: i64,
    refund_id: Option<i64>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<StockMovement, EngineError> {
    let balance_after = put_back_stock(key, quantity, conn).await?;
    let movement =
        record_movement(key, Some(order_id), refund_id, MovementType::Release, quantity, balance_after, now, conn)
            .await?;
    Ok(movement)
}

/// Releases everything the order still holds, exactly once. Must be called with the order lock held; the
/// `stock_reserved` flag on the locked row is the guard. Quantities already restored by refund items are skipped.
pub async fn restore_for_order(
    order: &Order,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<StockMovement>, EngineError> {
    if !order.stock_reserved {
        debug!("🗃️ Stock for order {} was already restored. Nothing to do.", order.order_code);
        return Ok(vec![]);
    }
    let items = order_items::fetch_restore_state(order.id, conn).await?;
    let mut movements = Vec::with_capacity(items.len());
    for item in items {
        let outstanding = item.quantity - item.restored;
        if outstanding <= 0 {
            continue;
        }
        let key = StockKey::new(item.product_id, item.variant_id);
        let movement = release(key, outstanding, order.id, None, now, conn).await?;
        movements.push(movement);
    }
    orders::clear_stock_reserved(order.id, now, conn).await?;
    info!("🗃️ Restored {} stock lines for order {}", movements.len(), order.order_code);
    Ok(movements)
}

pub async fn movements_for_order(order_id: i64, conn: &mut SqliteConnection) -> Result<Vec<StockMovement>, sqlx::Error> {
    let movements = sqlx::query_as("SELECT * FROM stock_movements WHERE order_id = $1 ORDER BY id")
        .bind(order_id)
        .fetch_all(conn)
        .await?;
    Ok(movements)
}

/// Sum of movement quantities for the SKU, per movement type.
pub async fn movement_totals(
    key: StockKey,
    conn: &mut SqliteConnection,
) -> Result<Vec<(MovementType, i64)>, sqlx::Error> {
    let totals = sqlx::query_as(
        r#"
            SELECT movement_type, SUM(quantity)
            FROM stock_movements
            WHERE product_id = $1 AND variant_id IS $2
            GROUP BY movement_type
        "#,
    )
    .bind(key.product_id)
    .bind(key.variant_id)
    .fetch_all(conn)
    .await?;
    Ok(totals)
}
