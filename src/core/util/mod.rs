use anyhow::Context;
use anyhow::Result;
use async_trait::async_trait;
use http::{header::ACCEPT, Request, Response};

/// Generic HTTP client.
///
/// A trait is used here so that deployments can bring their own transport, retry policy and
/// network restrictions for request object retrieval.
#[async_trait]
pub trait AsyncHttpClient {
    async fn execute(&self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>>;
}

/// A GET request accepting request objects.
pub(crate) fn request_object_request(uri: &str) -> Result<Request<Vec<u8>>> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header(ACCEPT, "application/oauth-authz-req+jwt, application/jwt")
        .body(vec![])
        .context("failed to build request object request")
}

#[derive(Debug, Clone)]
pub struct ReqwestClient(reqwest::Client);

impl AsRef<reqwest::Client> for ReqwestClient {
    fn as_ref(&self) -> &reqwest::Client {
        &self.0
    }
}

impl ReqwestClient {
    pub fn new() -> Result<Self> {
        reqwest::Client::builder()
            .use_rustls_tls()
            .build()
            .context("unable to build http_client")
            .map(Self)
    }

    /// A client giving up on requests that take longer than `timeout`, so that a slow
    /// `request_uri` host cannot hold an authorization request open.
    pub fn with_timeout(timeout: std::time::Duration) -> Result<Self> {
        reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(timeout)
            .build()
            .context("unable to build http_client")
            .map(Self)
    }
}

#[async_trait]
impl AsyncHttpClient for ReqwestClient {
    async fn execute(&self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>> {
        let response = self
            .0
            .execute(request.try_into().context("unable to convert request")?)
            .await
            .context("http request failed")?;

        let mut builder = Response::builder()
            .status(response.status())
            .version(response.version());

        builder
            .headers_mut()
            .context("unable to set headers")?
            .extend(response.headers().clone());

        builder
            .body(
                response
                    .bytes()
                    .await
                    .context("failed to extract response body")?
                    .to_vec(),
            )
            .context("unable to construct response")
    }
}
