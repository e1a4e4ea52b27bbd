use std::env;
use std::fmt;
use std::pin::Pin;
use std::time::{Duration, Instant};

use futures::Stream;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, RequestBuilder, Response, header};
use serde::Deserialize;
use url::Url;

use crate::error::{Error, Result};
use crate::observability::{CLIENT_REQUEST_DURATION, CLIENT_REQUEST_ERRORS, CLIENT_REQUESTS};
use crate::sse::process_sse;
use crate::types::{GenerateContentRequest, GenerateContentResponse, Model, ModelInfo};

const DEFAULT_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta/";

/// Environment variable consulted when no API key is passed explicitly.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// A boxed stream of response chunks.
pub type ResponseStream = Pin<Box<dyn Stream<Item = Result<GenerateContentResponse>> + Send>>;

/// The remote model API as seen by a chat binding.
///
/// [`Gemini`] is the production implementation. Tests substitute scripted
/// providers to exercise the session without a network.
#[async_trait::async_trait]
pub trait ModelProvider: Send + Sync {
    /// Look up a model, failing with a provider configuration error if it
    /// does not exist or cannot generate content.
    async fn describe_model(&self, model: &Model) -> Result<ModelInfo>;

    /// Start a streaming generation.
    ///
    /// Errors returned here happen before any chunk is produced.
    async fn stream_generate_content(
        &self,
        model: &Model,
        request: GenerateContentRequest,
    ) -> Result<ResponseStream>;
}

/// Client for the Gemini API.
#[derive(Clone)]
pub struct Gemini {
    api_key: String,
    client: ReqwestClient,
    base_url: Url,
    timeout: Option<Duration>,
}

impl Gemini {
    /// Create a new Gemini client.
    ///
    /// The API key can be provided directly or read from the `GEMINI_API_KEY`
    /// environment variable. A missing or blank key is a credential error.
    pub fn new(api_key: Option<String>) -> Result<Self> {
        Self::with_options(api_key, None, None)
    }

    /// Create a new client with custom settings.
    ///
    /// No request timeout is applied unless one is given; a streamed answer
    /// is then bounded only by the transport.
    pub fn with_options(
        api_key: Option<String>,
        base_url: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let api_key = resolve_api_key(api_key)?;
        let base_url = Url::parse(base_url.as_deref().unwrap_or(DEFAULT_API_URL))?;

        let mut builder = ReqwestClient::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| {
            Error::http_client(
                format!("Failed to build HTTP client: {}", e),
                Some(Box::new(e)),
            )
        })?;

        Ok(Self {
            api_key,
            client,
            base_url,
            timeout,
        })
    }

    /// Create and return default headers for API requests.
    fn default_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        let mut key = HeaderValue::from_str(&self.api_key)
            .map_err(|_| Error::credential("API key contains characters not allowed in a header"))?;
        key.set_sensitive(true);
        headers.insert("x-goog-api-key", key);
        Ok(headers)
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    /// Send a prepared request, mapping transport failures and error statuses.
    async fn execute(&self, request: RequestBuilder, model: &Model) -> Result<Response> {
        CLIENT_REQUESTS.click();
        let start = Instant::now();
        let result = request.send().await;
        CLIENT_REQUEST_DURATION.add(start.elapsed().as_secs_f64());

        let response = result.map_err(|e| {
            CLIENT_REQUEST_ERRORS.click();
            if e.is_timeout() {
                Error::timeout(
                    format!("Request timed out: {}", e),
                    self.timeout.map(|t| t.as_secs_f64()),
                )
            } else if e.is_connect() {
                Error::connection(format!("Connection error: {}", e), Some(Box::new(e)))
            } else {
                Error::http_client(format!("Request failed: {}", e), Some(Box::new(e)))
            }
        })?;

        if !response.status().is_success() {
            CLIENT_REQUEST_ERRORS.click();
            return Err(Self::process_error_response(response, model).await);
        }
        Ok(response)
    }

    /// Process API response errors and convert to our Error type
    async fn process_error_response(response: Response, model: &Model) -> Error {
        let status_code = response.status().as_u16();

        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|val| val.to_str().ok())
            .and_then(|val| val.parse::<u64>().ok());

        let error_body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return Error::http_client(
                    format!("Failed to read error response: {}", e),
                    Some(Box::new(e)),
                );
            }
        };

        let parsed = ApiErrorBody::parse(&error_body);
        tracing::debug!(status_code, body = %error_body, "Gemini API returned an error");
        classify_error(status_code, parsed, error_body, retry_after, model)
    }

    /// Fetch the metadata of a model.
    pub async fn get_model(&self, model: &Model) -> Result<ModelInfo> {
        let url = self.endpoint(&format!("models/{}", model.as_str()))?;
        let request = self.client.get(url).headers(self.default_headers()?);
        let response = self.execute(request, model).await?;
        response.json::<ModelInfo>().await.map_err(|e| {
            Error::serialization(
                format!("Failed to parse model metadata: {}", e),
                Some(Box::new(e)),
            )
        })
    }

    /// Generate an answer as a stream of response chunks.
    ///
    /// Returns once the response headers arrive; chunks are then read lazily.
    pub async fn stream_generate_content(
        &self,
        model: &Model,
        request: &GenerateContentRequest,
    ) -> Result<impl Stream<Item = Result<GenerateContentResponse>> + Send + use<>> {
        let mut url = self.endpoint(&format!("models/{}:streamGenerateContent", model.as_str()))?;
        url.query_pairs_mut().append_pair("alt", "sse");

        let mut headers = self.default_headers()?;
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("text/event-stream"),
        );

        tracing::debug!(
            model = %model,
            contents = request.contents.len(),
            "starting streaming request to Gemini API"
        );
        let builder = self.client.post(url).headers(headers).json(request);
        let response = self.execute(builder, model).await?;

        Ok(process_sse(response.bytes_stream()))
    }
}

impl fmt::Debug for Gemini {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gemini")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url.as_str())
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[async_trait::async_trait]
impl ModelProvider for Gemini {
    async fn describe_model(&self, model: &Model) -> Result<ModelInfo> {
        let info = self.get_model(model).await?;
        if !info.supports_generate_content() {
            return Err(Error::provider_config(
                "model does not support content generation",
                Some(model.to_string()),
            ));
        }
        Ok(info)
    }

    async fn stream_generate_content(
        &self,
        model: &Model,
        request: GenerateContentRequest,
    ) -> Result<ResponseStream> {
        let stream = Gemini::stream_generate_content(self, model, &request).await?;
        Ok(Box::pin(stream))
    }
}

/// Resolve the API key from the argument or the environment.
fn resolve_api_key(api_key: Option<String>) -> Result<String> {
    let api_key = match api_key {
        Some(key) => key,
        None => env::var(API_KEY_ENV).map_err(|_| {
            Error::credential(format!(
                "API key not provided and {API_KEY_ENV} environment variable not set"
            ))
        })?,
    };
    let api_key = api_key.trim();
    if api_key.is_empty() {
        return Err(Error::credential("API key is empty"));
    }
    Ok(api_key.to_string())
}

/// The error envelope the Gemini API returns with non-2xx statuses.
#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    details: Vec<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    reason: Option<String>,
}

impl ApiErrorBody {
    fn parse(body: &str) -> Option<Self> {
        #[derive(Deserialize)]
        struct Envelope {
            error: ApiErrorBody,
        }
        serde_json::from_str::<Envelope>(body)
            .ok()
            .map(|envelope| envelope.error)
    }

    fn has_reason(&self, reason: &str) -> bool {
        self.details
            .iter()
            .any(|detail| detail.reason.as_deref() == Some(reason))
    }
}

/// Map an HTTP status and error body to an appropriate error type.
fn classify_error(
    status_code: u16,
    parsed: Option<ApiErrorBody>,
    raw_body: String,
    retry_after: Option<u64>,
    model: &Model,
) -> Error {
    let parsed = parsed.unwrap_or_default();
    let invalid_key = parsed.has_reason("API_KEY_INVALID");
    let message = parsed.message.clone().unwrap_or(raw_body);

    match status_code {
        400 if invalid_key || message.contains("API key not valid") => {
            Error::authentication(message)
        }
        400 => Error::bad_request(message),
        401 => Error::authentication(message),
        403 => Error::permission(message),
        404 => Error::provider_config(message, Some(model.to_string())),
        408 => Error::timeout(message, None),
        429 => Error::rate_limit(message, retry_after),
        500 => Error::internal_server(message),
        502..=504 => Error::service_unavailable(message, retry_after),
        _ => Error::api(status_code, parsed.status, message),
    }
}
