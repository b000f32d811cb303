//! Client for the GoCD pipeline configuration admin API.
//!
//! Existence is signaled by the version token, not by errors: reading a
//! pipeline that does not exist yields a zero-value pipeline with an
//! absent etag. Updates are conditioned on the etag obtained by the
//! preceding read (optimistic concurrency); the server rejects the
//! write when the resource changed in between.

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{HeaderMap, ACCEPT, ETAG, IF_MATCH};
use reqwest::StatusCode;

use crate::connection::ServerConnection;
use crate::error::{Error, Result};
use crate::pipeline::{Pipeline, PipelineConfig};

const GOCD_MEDIA_TYPE: &str = "application/vnd.go.cd.v1+json";

/// Opaque version token of a remote pipeline resource.
///
/// Returned as the `ETag` response header on reads, required back in
/// `If-Match` on updates. An empty token means the resource does not
/// exist.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Etag(String);

impl Etag {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn absent() -> Self {
        Self(String::new())
    }

    pub fn is_absent(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The remote operations the sync engine needs. The concrete client
/// implements this over HTTP; tests substitute an in-memory double.
pub trait ConfigApi {
    /// Reads the named pipeline together with its version token. A
    /// missing pipeline is not an error.
    fn fetch(&self, name: &str) -> Result<(Pipeline, Etag)>;

    /// Creates a pipeline inside its group. Fails with
    /// `pipeline.already_exists` when the name collides.
    fn create(&self, config: &PipelineConfig) -> Result<Pipeline>;

    /// Replaces the remote pipeline, conditioned on `etag` still being
    /// current. Fails with `remote.stale_etag` when it is not.
    fn update(&self, pipeline: &Pipeline, etag: &Etag) -> Result<Pipeline>;
}

pub struct GocdClient {
    client: Client,
    base_url: String,
    user: Option<String>,
    password: Option<String>,
}

impl GocdClient {
    pub fn new(connection: &ServerConnection) -> Result<Self> {
        let client = Client::builder()
            .timeout(connection.timeout)
            .build()
            .map_err(|e| Error::internal_unexpected(format!("create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: connection.base_url(),
            user: connection.user.clone(),
            password: connection.password.clone(),
        })
    }

    fn pipelines_url(&self) -> String {
        format!("{}/go/api/admin/pipelines", self.base_url)
    }

    fn pipeline_url(&self, name: &str) -> String {
        format!("{}/go/api/admin/pipelines/{}", self.base_url, name)
    }

    fn prepare(&self, builder: RequestBuilder) -> RequestBuilder {
        let builder = builder.header(ACCEPT, GOCD_MEDIA_TYPE);
        match &self.user {
            Some(user) => builder.basic_auth(user, self.password.as_deref()),
            None => builder,
        }
    }
}

impl ConfigApi for GocdClient {
    fn fetch(&self, name: &str) -> Result<(Pipeline, Etag)> {
        let request = self.prepare(self.client.get(self.pipeline_url(name)));
        let response = request
            .send()
            .map_err(|e| transport_error(e, "fetch pipeline"))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok((Pipeline::default(), Etag::absent()));
        }

        let etag = etag_from_headers(response.headers());
        let (status, body) = read_body(response, "fetch pipeline")?;
        if !status.is_success() {
            return Err(Error::remote_unexpected_status(status.as_u16(), body));
        }

        Ok((parse_pipeline(&body)?, etag))
    }

    fn create(&self, config: &PipelineConfig) -> Result<Pipeline> {
        let request = self.prepare(self.client.post(self.pipelines_url()).json(config));
        let response = request
            .send()
            .map_err(|e| transport_error(e, "create pipeline"))?;

        let (status, body) = read_body(response, "create pipeline")?;
        if !status.is_success() {
            return Err(create_error(status, &body, &config.pipeline.name));
        }

        parse_pipeline(&body)
    }

    fn update(&self, pipeline: &Pipeline, etag: &Etag) -> Result<Pipeline> {
        let request = self
            .prepare(self.client.put(self.pipeline_url(&pipeline.name)).json(pipeline))
            .header(IF_MATCH, etag.as_str());
        let response = request
            .send()
            .map_err(|e| transport_error(e, "update pipeline"))?;

        let (status, body) = read_body(response, "update pipeline")?;
        if !status.is_success() {
            return Err(update_error(status, &body, &pipeline.name));
        }

        parse_pipeline(&body)
    }
}

fn transport_error(err: reqwest::Error, context: &str) -> Error {
    Error::remote_request_failed(err.to_string(), Some(context.to_string()))
}

fn read_body(response: Response, context: &str) -> Result<(StatusCode, String)> {
    let status = response.status();
    let body = response.text().map_err(|e| transport_error(e, context))?;
    Ok((status, body))
}

fn parse_pipeline(body: &str) -> Result<Pipeline> {
    serde_json::from_str(body).map_err(|e| Error::remote_invalid_response(e.to_string()))
}

fn etag_from_headers(headers: &HeaderMap) -> Etag {
    headers
        .get(ETAG)
        .and_then(|value| value.to_str().ok())
        .map(Etag::new)
        .unwrap_or_else(Etag::absent)
}

// The server answers a name collision with 409, or 422 when it folds
// the collision into generic validation output.
fn create_error(status: StatusCode, body: &str, name: &str) -> Error {
    let collided = status == StatusCode::CONFLICT
        || (status == StatusCode::UNPROCESSABLE_ENTITY && body.contains("already exists"));

    if collided {
        Error::pipeline_already_exists(name)
    } else {
        Error::remote_unexpected_status(status.as_u16(), body)
    }
}

fn update_error(status: StatusCode, body: &str, name: &str) -> Error {
    if status == StatusCode::PRECONDITION_FAILED {
        Error::remote_stale_etag(name)
    } else {
        Error::remote_unexpected_status(status.as_u16(), body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn client() -> GocdClient {
        GocdClient::new(&ServerConnection::new("gocd.internal")).unwrap()
    }

    #[test]
    fn builds_admin_api_urls() {
        let client = client();
        assert_eq!(
            client.pipelines_url(),
            "http://gocd.internal:8153/go/api/admin/pipelines"
        );
        assert_eq!(
            client.pipeline_url("build"),
            "http://gocd.internal:8153/go/api/admin/pipelines/build"
        );
    }

    #[test]
    fn absent_etag_signals_missing_resource() {
        assert!(Etag::absent().is_absent());
        assert!(!Etag::new("\"some-digest\"").is_absent());
    }

    #[test]
    fn reads_etag_header_when_present() {
        let mut headers = HeaderMap::new();
        headers.insert(ETAG, HeaderValue::from_static("\"abc123\""));
        assert_eq!(etag_from_headers(&headers), Etag::new("\"abc123\""));

        assert!(etag_from_headers(&HeaderMap::new()).is_absent());
    }

    #[test]
    fn create_maps_name_collisions_to_conflict() {
        let err = create_error(StatusCode::CONFLICT, "", "build");
        assert_eq!(err.code.as_str(), "pipeline.already_exists");

        let err = create_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"message": "Failed to add pipeline. The pipeline 'build' already exists."}"#,
            "build",
        );
        assert_eq!(err.code.as_str(), "pipeline.already_exists");

        let err = create_error(StatusCode::UNPROCESSABLE_ENTITY, "bad group", "build");
        assert_eq!(err.code.as_str(), "remote.unexpected_status");
        assert_eq!(err.details["status"], 422);
    }

    #[test]
    fn update_maps_precondition_failures_to_stale_etag() {
        let err = update_error(StatusCode::PRECONDITION_FAILED, "", "build");
        assert_eq!(err.code.as_str(), "remote.stale_etag");

        let err = update_error(StatusCode::INTERNAL_SERVER_ERROR, "boom", "build");
        assert_eq!(err.code.as_str(), "remote.unexpected_status");
    }

    #[test]
    fn rejects_non_pipeline_bodies() {
        let err = parse_pipeline("<html>login</html>").unwrap_err();
        assert_eq!(err.code.as_str(), "remote.invalid_response");
    }
}
