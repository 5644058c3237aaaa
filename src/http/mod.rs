//! REST surface: Confluent v2 produce and consumer-instance paths.

pub mod error;
pub mod media;
pub mod routes;

use crate::consume::ConsumeAction;
use crate::produce::ProduceAction;
use axum::routing::{delete, get, post};
use axum::Router;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub produce: Arc<ProduceAction>,
    pub consume: Arc<ConsumeAction>,
}

const INSTANCE: &str = "/consumers/:group/instances/:instance";

pub fn router(state: AppState) -> Router {
    Router::new()
        // Producer
        .route("/topics/:topic", post(routes::produce_to_topic))
        .route(
            "/topics/:topic/partitions/:partition",
            post(routes::produce_to_partition),
        )
        // Consumer instances
        .route("/consumers/:group", post(routes::create_consumer))
        .route(INSTANCE, delete(routes::delete_consumer))
        .route(
            &format!("{INSTANCE}/subscription"),
            post(routes::subscribe)
                .get(routes::subscription)
                .delete(routes::unsubscribe),
        )
        .route(
            &format!("{INSTANCE}/assignments"),
            post(routes::assign).get(routes::assignment),
        )
        .route(
            &format!("{INSTANCE}/offsets"),
            post(routes::commit_offsets).get(routes::committed_offsets),
        )
        .route(
            &format!("{INSTANCE}/committed-offsets"),
            post(routes::committed_offsets),
        )
        .route(&format!("{INSTANCE}/positions"), post(routes::seek))
        .route(
            &format!("{INSTANCE}/positions/beginning"),
            post(routes::seek_to_beginning),
        )
        .route(
            &format!("{INSTANCE}/positions/end"),
            post(routes::seek_to_end),
        )
        .route(&format!("{INSTANCE}/records"), get(routes::read_records))
        .with_state(state)
}
