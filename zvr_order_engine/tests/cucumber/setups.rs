use cucumber::given;
use zvr_order_engine::test_utils::catalog::seed_product;

use crate::{cucumber::StoreWorld, support::TestSystem};

#[given("a fresh store")]
async fn fresh_store(world: &mut StoreWorld) {
    world.system = Some(TestSystem::new().await);
}

#[given(expr = "a product {string} priced at {int} with {int} in stock")]
async fn a_product(world: &mut StoreWorld, name: String, price: i64, stock: i64) {
    let id = seed_product(&world.sys().db, &name, price, stock).await;
    world.products.insert(name, id);
}
