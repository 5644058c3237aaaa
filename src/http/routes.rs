//! Request handlers.

use crate::dto::{
    CreateConsumerRequest, CreateConsumerResponse, OffsetsBody, PartitionsBody, ProduceRequest,
    ProduceResponse, SubscriptionRequest, SubscriptionResponse,
};
use crate::http::error::{ApiResult, KafkaJson};
use crate::http::media::{embedded_format, media_type, KAFKA_V2_JSON};
use crate::http::AppState;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use kafka_rest_types::Error;
use serde::{Deserialize, Serialize};
use tracing::debug;

fn kafka_json<T: Serialize>(body: T) -> Response {
    ([(header::CONTENT_TYPE, KAFKA_V2_JSON)], Json(body)).into_response()
}

pub async fn produce_to_topic(
    State(state): State<AppState>,
    Path(topic): Path<String>,
    headers: HeaderMap,
    KafkaJson(request): KafkaJson<ProduceRequest>,
) -> ApiResult<Response> {
    produce(&state, &headers, &topic, None, request).await
}

pub async fn produce_to_partition(
    State(state): State<AppState>,
    Path((topic, partition)): Path<(String, i32)>,
    headers: HeaderMap,
    KafkaJson(request): KafkaJson<ProduceRequest>,
) -> ApiResult<Response> {
    produce(&state, &headers, &topic, Some(partition), request).await
}

async fn produce(
    state: &AppState,
    headers: &HeaderMap,
    topic: &str,
    partition: Option<i32>,
    request: ProduceRequest,
) -> ApiResult<Response> {
    // BINARY unless the content type names a format
    let format = embedded_format(headers.get(header::CONTENT_TYPE))?.unwrap_or_default();
    debug!("Produce {} records to {topic} as {format}", request.records.len());
    let response: ProduceResponse = state
        .produce
        .produce(format, topic, partition, request)
        .await?;
    Ok(kafka_json(response))
}

pub async fn create_consumer(
    State(state): State<AppState>,
    Path(group): Path<String>,
    headers: HeaderMap,
    KafkaJson(request): KafkaJson<CreateConsumerRequest>,
) -> ApiResult<Response> {
    let config = request.into_instance_config()?;
    let instance_id = state.consume.create_consumer(&group, config).await?;
    let host = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("localhost");
    let base_uri = format!("http://{host}/consumers/{group}/instances/{instance_id}");
    Ok(kafka_json(CreateConsumerResponse {
        instance_id,
        base_uri,
    }))
}

pub async fn delete_consumer(
    State(state): State<AppState>,
    Path((group, instance)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    state.consume.delete_consumer(&group, &instance).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn subscribe(
    State(state): State<AppState>,
    Path((group, instance)): Path<(String, String)>,
    KafkaJson(request): KafkaJson<SubscriptionRequest>,
) -> ApiResult<StatusCode> {
    state.consume.subscribe(&group, &instance, request).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn subscription(
    State(state): State<AppState>,
    Path((group, instance)): Path<(String, String)>,
) -> ApiResult<Response> {
    let topics = state.consume.subscription(&group, &instance).await?;
    Ok(kafka_json(SubscriptionResponse { topics }))
}

pub async fn unsubscribe(
    State(state): State<AppState>,
    Path((group, instance)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    state.consume.unsubscribe(&group, &instance).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// An empty body, or an empty offset list, commits everything consumed so far.
pub async fn commit_offsets(
    State(state): State<AppState>,
    Path((group, instance)): Path<(String, String)>,
    body: Bytes,
) -> ApiResult<StatusCode> {
    let offsets = if body.is_empty() {
        None
    } else {
        let request: OffsetsBody = serde_json::from_slice(&body)
            .map_err(|e| Error::InvalidDataFormat(e.to_string()))?;
        Some(request.offsets).filter(|offsets| !offsets.is_empty())
    };
    state
        .consume
        .commit_offsets(&group, &instance, offsets)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn committed_offsets(
    State(state): State<AppState>,
    Path((group, instance)): Path<(String, String)>,
    KafkaJson(request): KafkaJson<PartitionsBody>,
) -> ApiResult<Response> {
    let offsets = state
        .consume
        .committed(&group, &instance, &request.partitions)
        .await?;
    Ok(kafka_json(OffsetsBody { offsets }))
}

pub async fn assign(
    State(state): State<AppState>,
    Path((group, instance)): Path<(String, String)>,
    KafkaJson(request): KafkaJson<PartitionsBody>,
) -> ApiResult<StatusCode> {
    state
        .consume
        .assign(&group, &instance, &request.partitions)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn assignment(
    State(state): State<AppState>,
    Path((group, instance)): Path<(String, String)>,
) -> ApiResult<Response> {
    let partitions = state.consume.assignment(&group, &instance).await?;
    Ok(kafka_json(PartitionsBody { partitions }))
}

pub async fn seek(
    State(state): State<AppState>,
    Path((group, instance)): Path<(String, String)>,
    KafkaJson(request): KafkaJson<OffsetsBody>,
) -> ApiResult<StatusCode> {
    state.consume.seek(&group, &instance, &request.offsets).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn seek_to_beginning(
    State(state): State<AppState>,
    Path((group, instance)): Path<(String, String)>,
    KafkaJson(request): KafkaJson<PartitionsBody>,
) -> ApiResult<StatusCode> {
    state
        .consume
        .seek_to_beginning(&group, &instance, &request.partitions)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn seek_to_end(
    State(state): State<AppState>,
    Path((group, instance)): Path<(String, String)>,
    KafkaJson(request): KafkaJson<PartitionsBody>,
) -> ApiResult<StatusCode> {
    state
        .consume
        .seek_to_end(&group, &instance, &request.partitions)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Default, Deserialize)]
pub struct ReadParams {
    /// Milliseconds; capped by the consumer's request timeout
    pub timeout: Option<i64>,
    pub max_bytes: Option<i64>,
}

pub async fn read_records(
    State(state): State<AppState>,
    Path((group, instance)): Path<(String, String)>,
    Query(params): Query<ReadParams>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let requested = embedded_format(headers.get(header::ACCEPT))?;
    let records = state
        .consume
        .read_records(&group, &instance, requested, params.timeout, params.max_bytes)
        .await?;
    let content_type = requested.map_or_else(|| KAFKA_V2_JSON.to_string(), media_type);
    Ok(([(header::CONTENT_TYPE, content_type)], Json(records)).into_response())
}
