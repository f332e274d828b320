//! HTTP clients for the services the store depends on:
//!
//! * [`MidtransApi`], the payment gateway's Core API (charges, status polls, refunds, webhook signatures).
//! * [`ShippingApi`], the courier aggregator used for waybills, tracking and rate quotes.
//! * [`MailerApi`], the transactional mail provider. Templates are rendered on the provider's side.
//!
//! The clients know nothing about orders or payments as the store models them. Binding them to the engine's
//! collaborator traits is the server's job.
mod config;
mod error;
mod helpers;
mod mailer_api;
mod midtrans_api;
mod midtrans_objects;
mod rest;
mod shipping_api;
mod shipping_objects;

pub use config::{MailerConfig, MidtransConfig, ShippingConfig};
pub use error::GatewayApiError;
pub use helpers::{midtrans_signature, parse_midtrans_time};
pub use mailer_api::{MailMessage, MailerApi};
pub use midtrans_api::MidtransApi;
pub use midtrans_objects::{
    CustomerDetails,
    ItemDetails,
    MidtransAction,
    MidtransCharge,
    MidtransChargeResponse,
    MidtransMethod,
    MidtransRefund,
    MidtransRefundResponse,
    MidtransStatusResponse,
    VaNumber,
};
pub use rest::RestClient;
pub use shipping_api::ShippingApi;
pub use shipping_objects::{
    CourierRate,
    RateQuery,
    TrackingEntry,
    WaybillCourier,
    WaybillItem,
    WaybillOrder,
    WaybillReceipt,
};
