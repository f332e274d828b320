use sqlx::SqliteConnection;

use crate::db_types::{OrderItem, Rupiah};

/// A priced line ready to be written. Prices come from the catalog rows locked during reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedItem {
    pub product_id: i64,
    pub variant_id: Option<i64>,
    pub product_name: String,
    pub product_image: Option<String>,
    pub quantity: i64,
    pub price_per_unit: Rupiah,
    pub subtotal: Rupiah,
}

pub async fn insert_item(
    order_id: i64,
    item: &PricedItem,
    conn: &mut SqliteConnection,
) -> Result<OrderItem, sqlx::Error> {
    let item = sqlx::query_as(
        r#"
            INSERT INTO order_items (
                order_id,
                product_id,
                variant_id,
                product_name,
                product_image,
                quantity,
                price_per_unit,
                subtotal
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
        "#,
    )
    .bind(order_id)
    .bind(item.product_id)
    .bind(item.variant_id)
    .bind(&item.product_name)
    .bind(&item.product_image)
    .bind(item.quantity)
    .bind(item.price_per_unit)
    .bind(item.subtotal)
    .fetch_one(conn)
    .await?;
    Ok(item)
}

pub async fn fetch_items(order_id: i64, conn: &mut SqliteConnection) -> Result<Vec<OrderItem>, sqlx::Error> {
    let items = sqlx::query_as("SELECT * FROM order_items WHERE order_id = $1 ORDER BY id")
        .bind(order_id)
        .fetch_all(conn)
        .await?;
    Ok(items)
}

/// Each order item together with the quantity already put back on the shelf by refund items.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ItemRestoreState {
    pub id: i64,
    pub product_id: i64,
    pub variant_id: Option<i64>,
    pub quantity: i64,
    pub restored: i64,
}

pub async fn fetch_restore_state(
    order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<ItemRestoreState>, sqlx::Error> {
    let items = sqlx::query_as(
        r#"
            SELECT
                oi.id,
                oi.product_id,
                oi.variant_id,
                oi.quantity,
                COALESCE(
                    (SELECT SUM(ri.quantity) FROM refund_items ri WHERE ri.order_item_id = oi.id AND ri.stock_restored = 1),
                    0
                ) AS restored
            FROM order_items oi
            WHERE oi.order_id = $1
            ORDER BY oi.id
        "#,
    )
    .bind(order_id)
    .fetch_all(conn)
    .await?;
    Ok(items)
}
