use std::path::Path;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;

use super::error::GradioError;
use super::types::{
    find_file_ref, parse_event_stream, AppConfig, CallRequest, CallResponse, FileData, FileRef,
    ParamValue, Params, SpaceHost,
};

const HUB_URL: &str = "https://huggingface.co";

/// Anything that can execute a named Gradio endpoint.
///
/// The batch processor is generic over this so it can be driven by a
/// scripted client in tests.
pub trait RemoteApi {
    async fn predict(&self, endpoint: &str, params: &Params) -> Result<Value, GradioError>;

    /// Save the first file referenced in `result` to `dest`, returning the byte count.
    async fn download(&self, result: &Value, dest: &Path) -> Result<u64, GradioError>;
}

/// Builds fresh client handles. Used at startup and again after an upstream fault.
pub trait Connector {
    type Client: RemoteApi;

    async fn connect(&self) -> Result<Self::Client, GradioError>;
}

/// Connection settings for one Space.
#[derive(Debug, Clone)]
pub struct GradioConnector {
    space: String,
    token: Option<String>,
    hub_url: String,
    /// Overall limit per HTTP request; `None` lets a call run until the app answers.
    request_timeout: Option<Duration>,
}

impl GradioConnector {
    pub fn new(space: String, token: Option<String>) -> Self {
        Self {
            space,
            token,
            hub_url: HUB_URL.to_string(),
            request_timeout: None,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Point Space id resolution at a custom hub.
    #[cfg(test)]
    pub fn with_hub_url(mut self, hub_url: String) -> Self {
        self.hub_url = hub_url;
        self
    }
}

impl Connector for GradioConnector {
    type Client = GradioClient;

    async fn connect(&self) -> Result<GradioClient, GradioError> {
        GradioClient::connect(&self.space, self.token.clone(), &self.hub_url, self.request_timeout)
            .await
    }
}

/// HTTP client bound to one running Gradio app.
pub struct GradioClient {
    http: Client,
    token: Option<String>,
    /// Root of the app's API, including any `api_prefix`.
    base_url: String,
}

impl GradioClient {
    /// Resolve `space` (an `owner/name` id or a direct URL) and read the app config.
    pub async fn connect(
        space: &str,
        token: Option<String>,
        hub_url: &str,
        request_timeout: Option<Duration>,
    ) -> Result<Self, GradioError> {
        let mut builder = Client::builder().connect_timeout(Duration::from_secs(10));
        if let Some(timeout) = request_timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build()?;

        let host = if space.starts_with("http://") || space.starts_with("https://") {
            space.trim_end_matches('/').to_string()
        } else {
            let url = format!("{}/api/spaces/{space}/host", hub_url.trim_end_matches('/'));
            let response = authorize(http.get(url), token.as_deref()).send().await?;
            let host: SpaceHost = parse_json(response).await?;
            host.host.trim_end_matches('/').to_string()
        };

        let response = authorize(http.get(format!("{host}/config")), token.as_deref())
            .send()
            .await?;
        let config: AppConfig = parse_json(response).await?;
        let prefix = config.api_prefix.unwrap_or_default();
        let base_url = format!("{host}{}", prefix.trim_end_matches('/'));

        tracing::debug!(
            space,
            base_url = %base_url,
            gradio_version = config.version.as_deref().unwrap_or("unknown"),
            "Connected to Gradio app"
        );

        Ok(Self {
            http,
            token,
            base_url,
        })
    }

    #[cfg(test)]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Upload a local file, returning the server-side path.
    pub async fn upload(&self, path: &Path) -> Result<String, GradioError> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let form = Form::new().part("files", Part::bytes(bytes).file_name(file_name));

        let response = self
            .authorized(self.http.post(format!("{}/upload", self.base_url)))
            .multipart(form)
            .send()
            .await?;
        let paths: Vec<String> = parse_json(response).await?;
        paths
            .into_iter()
            .next()
            .ok_or_else(|| GradioError::Protocol("upload returned no file paths".to_string()))
    }

    async fn encode_params(&self, params: &Params) -> Result<Vec<Value>, GradioError> {
        let mut data = Vec::with_capacity(params.len());
        for (name, value) in params.iter() {
            match value {
                ParamValue::Json(v) => data.push(v.clone()),
                ParamValue::File(path) => {
                    let server_path = self.upload(path).await?;
                    tracing::debug!(param = name, local = %path.display(), server_path = %server_path, "Uploaded file");
                    let file = FileData::uploaded(server_path, path);
                    data.push(serde_json::to_value(file).map_err(|e| {
                        GradioError::Protocol(format!("failed to encode file parameter: {e}"))
                    })?);
                }
            }
        }
        Ok(data)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        authorize(builder, self.token.as_deref())
    }
}

impl RemoteApi for GradioClient {
    async fn predict(&self, endpoint: &str, params: &Params) -> Result<Value, GradioError> {
        let name = endpoint.trim_start_matches('/');
        let data = self.encode_params(params).await?;

        let response = self
            .authorized(self.http.post(format!("{}/call/{name}", self.base_url)))
            .json(&CallRequest { data })
            .send()
            .await?;
        let call: CallResponse = parse_json(response).await?;

        let response = self
            .authorized(
                self.http
                    .get(format!("{}/call/{name}/{}", self.base_url, call.event_id)),
            )
            .send()
            .await?;
        let body = ensure_success(response).await?.text().await?;
        parse_event_stream(&body)
    }

    async fn download(&self, result: &Value, dest: &Path) -> Result<u64, GradioError> {
        let url = match find_file_ref(result) {
            Some(FileRef::Url(url)) => url,
            Some(FileRef::ServerPath(path)) => format!("{}/file={path}", self.base_url),
            None => {
                return Err(GradioError::Protocol(
                    "result does not reference any file".to_string(),
                ));
            }
        };

        let response = self.authorized(self.http.get(&url)).send().await?;
        let bytes = ensure_success(response).await?.bytes().await?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(dest, &bytes).await?;
        Ok(bytes.len() as u64)
    }
}

fn authorize(builder: RequestBuilder, token: Option<&str>) -> RequestBuilder {
    match token {
        Some(token) if !token.is_empty() => builder.bearer_auth(token),
        _ => builder,
    }
}

async fn ensure_success(response: Response) -> Result<Response, GradioError> {
    let status = response.status();
    if !status.is_success() {
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown error".to_string());
        return Err(GradioError::Api {
            status: status.as_u16(),
            message,
        });
    }
    Ok(response)
}

async fn parse_json<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, GradioError> {
    let response = ensure_success(response).await?;
    Ok(response.json::<T>().await?)
}
