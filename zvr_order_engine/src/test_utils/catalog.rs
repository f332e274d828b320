use crate::{
    db_types::{CustomerInfo, NewOrder, NewOrderItem, Rupiah},
    SqliteDatabase,
};

pub async fn seed_product(db: &SqliteDatabase, name: &str, price: i64, stock: i64) -> i64 {
    let (id,): (i64,) = sqlx::query_as(
        "INSERT INTO products (name, price, stock, initial_stock) VALUES ($1, $2, $3, $3) RETURNING id",
    )
    .bind(name)
    .bind(price)
    .bind(stock)
    .fetch_one(db.pool())
    .await
    .expect("Error seeding product");
    id
}

pub async fn seed_variant(db: &SqliteDatabase, product_id: i64, name: &str, price: Option<i64>, stock: i64) -> i64 {
    let (id,): (i64,) = sqlx::query_as(
        "INSERT INTO product_variants (product_id, name, price, stock, initial_stock) VALUES ($1, $2, $3, $4, $4) \
         RETURNING id",
    )
    .bind(product_id)
    .bind(name)
    .bind(price)
    .bind(stock)
    .fetch_one(db.pool())
    .await
    .expect("Error seeding variant");
    id
}

pub async fn product_stock(db: &SqliteDatabase, product_id: i64) -> i64 {
    let (stock,): (i64,) = sqlx::query_as("SELECT stock FROM products WHERE id = $1")
        .bind(product_id)
        .fetch_one(db.pool())
        .await
        .expect("Error reading stock");
    stock
}

pub fn customer() -> CustomerInfo {
    CustomerInfo { name: "Sari Wulandari".into(), email: "sari@example.com".into(), phone: "081234567890".into() }
}

/// A checkout with the sample customer, couriered by JNE REG.
pub fn checkout(items: &[(i64, Option<i64>, i64)], shipping_cost: i64) -> NewOrder {
    NewOrder {
        user_id: None,
        customer: customer(),
        shipping_address: "Jl. Braga No. 12, Bandung 40111".into(),
        courier: Some("jne".into()),
        courier_service: Some("reg".into()),
        items: items
            .iter()
            .map(|&(product_id, variant_id, quantity)| NewOrderItem { product_id, variant_id, quantity })
            .collect(),
        shipping_cost: Rupiah::from(shipping_cost),
        tax_rate_bps: 0,
        discount: Rupiah::from(0),
    }
}
