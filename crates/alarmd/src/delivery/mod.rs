//! Push delivery of pending report tasks to the subscriber.

mod payload;
mod sink;
mod worker;

pub use payload::{AlarmStatus, EventRecord};
pub use sink::{
    AUTH_TOKEN_HEADER, ClientIdentity, EventSink, HttpsSink, HttpsSinkFactory, SinkFactory,
    build_tls_config,
};
pub use worker::{DeliveryReport, DeliveryWorker, is_delivery_success};
