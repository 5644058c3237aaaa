//! Kafka REST media types.

use axum::http::HeaderValue;
use kafka_rest_types::{EmbeddedFormat, Error, Result};

/// Media type of bodies that carry no embedded records.
pub const KAFKA_V2_JSON: &str = "application/vnd.kafka.v2+json";

const VND_PREFIX: &str = "application/vnd.kafka.";
const V2_SUFFIX: &str = ".v2+json";

/// `application/vnd.kafka.<format>.v2+json`
pub fn media_type(format: EmbeddedFormat) -> String {
    format!("{VND_PREFIX}{}{V2_SUFFIX}", format.media_type_segment())
}

/// The embedded format named by a `Content-Type` or `Accept` header.
///
/// Returns `None` for a missing header or for media types that name no
/// format (`application/json`, `application/vnd.kafka.v2+json`, `*/*`).
/// In a list, the first entry naming a format wins.
pub fn embedded_format(header: Option<&HeaderValue>) -> Result<Option<EmbeddedFormat>> {
    let Some(header) = header else {
        return Ok(None);
    };
    let header = header
        .to_str()
        .map_err(|_| Error::InvalidFormatType("non-ASCII media type".to_string()))?;

    for entry in header.split(',') {
        let media = entry
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        let Some(segment) = media
            .strip_prefix(VND_PREFIX)
            .and_then(|rest| rest.strip_suffix(V2_SUFFIX))
        else {
            continue;
        };
        let format = EmbeddedFormat::ALL
            .into_iter()
            .find(|f| f.media_type_segment() == segment)
            .ok_or_else(|| Error::InvalidFormatType(media.clone()))?;
        return Ok(Some(format));
    }
    Ok(None)
}
