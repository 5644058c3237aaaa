//! HTTP access to a Confluent-compatible schema registry.

use crate::types::{RegistryErrorBody, SchemaRequest, SchemaResponse};
use kafka_rest_types::{Error, Result, SchemaType};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use std::time::Duration;
use tracing::{debug, error};

const CONTENT_TYPE: &str = "application/vnd.schemaregistry.v1+json";

#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Base URL, e.g. `http://schema-registry:8081`
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub request_timeout: Duration,
}

impl RegistryConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: None,
            password: None,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Uncached registry calls. Non-200 answers are mapped with [`map_registry_error`].
#[derive(Debug, Clone)]
pub struct SchemaRegistryClient {
    http: Client,
    base_url: Url,
    username: Option<String>,
    password: Option<String>,
}

impl SchemaRegistryClient {
    pub fn new(config: &RegistryConfig) -> Result<Self> {
        let base_url = Url::parse(&config.url).map_err(|e| {
            Error::RegistryInternal(format!("Invalid schema registry url '{}': {e}", config.url))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(Error::RegistryInternal(format!(
                "Invalid schema registry url '{}'",
                config.url
            )));
        }
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::RegistryInternal(e.to_string()))?;

        Ok(Self {
            http,
            base_url,
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::RegistryInternal(format!("Invalid base url {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.username {
            Some(username) => request.basic_auth(username, self.password.as_ref()),
            None => request,
        }
    }

    async fn get(&self, segments: &[&str]) -> Result<SchemaResponse> {
        let url = self.url(segments)?;
        debug!(">> GET {url}");
        let response = self.authorize(self.http.get(url.clone())).send().await;
        read_response(url, response).await
    }

    async fn post(&self, segments: &[&str], body: &SchemaRequest<'_>) -> Result<SchemaResponse> {
        let url = self.url(segments)?;
        debug!(">> POST {url} schemaType={}", body.schema_type);
        let request = self
            .http
            .post(url.clone())
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE)
            .json(body);
        let response = self.authorize(request).send().await;
        read_response(url, response).await
    }

    /// `GET /schemas/ids/{id}`; returns the raw schema text.
    pub async fn get_raw_schema_by_id(&self, schema_id: i32) -> Result<String> {
        let id = schema_id.to_string();
        let response = self.get(&["schemas", "ids", &id]).await?;
        response.schema.ok_or_else(|| {
            Error::RegistryInternal(format!("Registry returned no schema for id {schema_id}"))
        })
    }

    /// `POST /subjects/{subject}`: find an already registered schema.
    pub async fn lookup_schema(
        &self,
        subject: &str,
        schema_type: SchemaType,
        raw_schema: &str,
    ) -> Result<SchemaResponse> {
        let body = SchemaRequest {
            schema: raw_schema,
            schema_type,
        };
        self.post(&["subjects", subject], &body).await
    }

    /// `POST /subjects/{subject}/versions`; the response carries the (possibly
    /// existing) schema id and, on some registries, its version.
    pub async fn register_schema(
        &self,
        subject: &str,
        schema_type: SchemaType,
        raw_schema: &str,
    ) -> Result<SchemaResponse> {
        let body = SchemaRequest {
            schema: raw_schema,
            schema_type,
        };
        let response = self.post(&["subjects", subject, "versions"], &body).await?;
        if response.id.is_none() {
            return Err(Error::RegistryInternal(format!(
                "Registry returned no id registering {subject}"
            )));
        }
        Ok(response)
    }

    /// `GET /subjects/{subject}/versions/latest`
    pub async fn latest_schema(&self, subject: &str) -> Result<SchemaResponse> {
        self.get(&["subjects", subject, "versions", "latest"]).await
    }
}

async fn read_response(
    url: Url,
    response: reqwest::Result<Response>,
) -> Result<SchemaResponse> {
    let response = response.map_err(|e| {
        error!("Schema registry request to {url} failed: {e}");
        Error::RegistryInternal(e.to_string())
    })?;
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| Error::RegistryInternal(e.to_string()))?;
    debug!("<< {url} status={status}");

    if status != StatusCode::OK {
        return Err(map_registry_error(status.as_u16(), &body));
    }
    serde_json::from_str(&body).map_err(|e| {
        Error::RegistryInternal(format!("Unparsable registry response from {url}: {e}"))
    })
}

/// Translate a non-200 registry answer into the gateway error taxonomy.
pub fn map_registry_error(status: u16, body: &str) -> Error {
    let Ok(parsed) = serde_json::from_str::<RegistryErrorBody>(body) else {
        return Error::RegistryInternal(format!("status={status}, body={body}"));
    };
    let message = parsed.message;

    match (status, parsed.error_code) {
        (404, 40401) => Error::SubjectNotFound(message),
        (404, 40402) => Error::SchemaVersionNotFound(message),
        (404, 40403) => Error::SchemaNotFound(message),
        (404, _) => Error::SubjectNotFound(message),
        (409, _) => Error::InvalidSchema(message),
        (422, 42201) => Error::InvalidSchema(message),
        (422, 42202) => Error::InvalidSchemaVersion(message),
        (422, 42203) => Error::InvalidCompatibility(message),
        (422, 42205) => Error::ModeConflict(message),
        (422, _) => Error::UnprocessableSchema(message),
        (500, 50001) => Error::RegistryBackend(message),
        (500, 50002) => Error::RegistryTimedOut(message),
        (500, 50003) => Error::RegistryForwarding(message),
        _ => Error::RegistryInternal(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(code: i32) -> String {
        format!(r#"{{"error_code": {code}, "message": "boom"}}"#)
    }

    #[test]
    fn test_not_found_mapping() {
        assert_eq!(
            map_registry_error(404, &body(40401)),
            Error::SubjectNotFound("boom".to_string())
        );
        assert_eq!(
            map_registry_error(404, &body(40402)),
            Error::SchemaVersionNotFound("boom".to_string())
        );
        assert_eq!(
            map_registry_error(404, &body(40403)),
            Error::SchemaNotFound("boom".to_string())
        );
        assert_eq!(
            map_registry_error(404, &body(40499)),
            Error::SubjectNotFound("boom".to_string())
        );
        assert!(map_registry_error(404, &body(40403)).is_not_found());
    }

    #[test]
    fn test_conflict_and_unprocessable_mapping() {
        assert_eq!(map_registry_error(409, &body(409)).code(), 4001);
        assert_eq!(map_registry_error(422, &body(42201)).code(), 4001);
        assert_eq!(map_registry_error(422, &body(42202)).code(), 4002);
        assert_eq!(map_registry_error(422, &body(42203)).code(), 4003);
        assert_eq!(map_registry_error(422, &body(42205)).code(), 4004);
        assert_eq!(map_registry_error(422, &body(42299)).code(), 4005);
    }

    #[test]
    fn test_server_error_mapping() {
        assert_eq!(map_registry_error(500, &body(50001)).code(), 4006);
        assert_eq!(map_registry_error(500, &body(50002)).code(), 4008);
        assert_eq!(map_registry_error(500, &body(50003)).code(), 4007);
        assert_eq!(map_registry_error(500, &body(50099)).code(), 4009);
        assert_eq!(map_registry_error(503, &body(50301)).code(), 4009);
    }

    #[test]
    fn test_unparsable_body_is_internal() {
        let err = map_registry_error(404, "<html>not found</html>");
        assert_eq!(err.code(), 4009);
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_url_segments_are_escaped() {
        let client = SchemaRegistryClient::new(&RegistryConfig::new("http://registry:8081/")).unwrap();
        let url = client.url(&["subjects", "a/b-value", "versions"]).unwrap();
        assert_eq!(url.as_str(), "http://registry:8081/subjects/a%2Fb-value/versions");
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(SchemaRegistryClient::new(&RegistryConfig::new("not a url")).is_err());
    }
}
