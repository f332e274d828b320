mod helpers;
mod mocks;
mod orders;
mod payments_and_refunds;

use actix_web::{http::StatusCode, web::ServiceConfig};

use crate::routes::health;

#[actix_web::test]
async fn health_check() {
    let _ = env_logger::try_init().ok();
    let (status, body) = helpers::get_request(&[], "/health", |cfg: &mut ServiceConfig| {
        cfg.service(health);
    })
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "👍️\n");
}
