//! HTTPS client for the file host.
//!
//! One hostname (and its subdomains) resolves to a fixed address instead of going
//! through DNS, which some networks block for the file host. Everything else uses the
//! system resolver. Certificate checks are relaxed on this client only.

use hyper::client::connect::dns::Name;
use reqwest::dns::{Addrs, Resolve, Resolving};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, COOKIE, LOCATION, ORIGIN, REFERER, SET_COOKIE};
use reqwest::redirect::Policy;
use reqwest::{Client, RequestBuilder, StatusCode};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use super::multipart::MultipartForm;
use crate::config::UploadConfig;
use crate::{Result, Yt2SampError};

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
const MAX_REDIRECTS: usize = 10;

type ResolveError = Box<dyn std::error::Error + Send + Sync>;

/// Resolves `host` and `*.host` to a fixed address, delegates everything else
#[derive(Debug, Clone)]
pub struct PinnedResolver {
    host: String,
    addr: IpAddr,
}

impl PinnedResolver {
    pub fn new(host: &str, addr: IpAddr) -> Self {
        Self {
            host: host.trim_end_matches('.').to_ascii_lowercase(),
            addr,
        }
    }

    pub fn is_pinned(&self, name: &str) -> bool {
        let name = name.trim_end_matches('.').to_ascii_lowercase();
        name == self.host
            || name
                .strip_suffix(self.host.as_str())
                .is_some_and(|prefix| prefix.ends_with('.'))
    }
}

impl Resolve for PinnedResolver {
    fn resolve(&self, name: Name) -> Resolving {
        if self.is_pinned(name.as_str()) {
            // Port is replaced by the connector with the one from the URL
            let addr = SocketAddr::new(self.addr, 0);
            tracing::trace!(host = name.as_str(), %addr, "Using pinned address");
            return Box::pin(async move { Ok::<Addrs, ResolveError>(Box::new(std::iter::once(addr))) });
        }

        let host = name.as_str().to_string();
        Box::pin(async move {
            let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host.as_str(), 0)).await?.collect();
            Ok::<Addrs, ResolveError>(Box::new(addrs.into_iter()))
        })
    }
}

/// What the upload protocol needs from a response
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub location: Option<String>,
    /// Raw `Set-Cookie` header values
    pub cookies: Vec<String>,
    pub body: String,
}

impl HttpResponse {
    /// `Location` of a 3xx response
    pub fn redirect_target(&self) -> Option<&str> {
        if self.status.is_redirection() {
            self.location.as_deref()
        } else {
            None
        }
    }
}

/// Client bound to the file host's base URL, with redirects handled by the caller
pub struct ResolvedHttpClient {
    client: Client,
    base: Url,
}

impl ResolvedHttpClient {
    pub fn new(settings: &UploadConfig) -> Result<Self> {
        let base = Url::parse(&settings.base_url)
            .map_err(|_| Yt2SampError::InvalidBaseUrl(settings.base_url.clone()))?;

        let resolver = PinnedResolver::new(&settings.pinned_host, IpAddr::V4(settings.pinned_ip));

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_HTML));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));

        let client = Client::builder()
            .dns_resolver(Arc::new(resolver))
            .danger_accept_invalid_certs(settings.accept_invalid_certs)
            .redirect(Policy::none())
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Yt2SampError::transport("client setup", e))?;

        Ok(Self { client, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Resolve a possibly relative `Location` against the base URL
    pub fn absolute_url(&self, location: &str) -> String {
        self.base
            .join(location)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| location.to_string())
    }

    pub async fn get(&self, url: &str, cookie: Option<&str>, timeout: Duration, phase: &'static str) -> Result<HttpResponse> {
        tracing::debug!(url, phase, "GET");
        let request = with_cookie(self.client.get(url), cookie).timeout(timeout);
        send(request, phase).await
    }

    pub async fn post_multipart(
        &self,
        url: &str,
        form: MultipartForm,
        cookie: Option<&str>,
        timeout: Duration,
    ) -> Result<HttpResponse> {
        let (content_type, body) = form.finish();
        let origin = self.base.origin().ascii_serialization();

        tracing::debug!(url, bytes = body.len(), "POST multipart");

        let request = self
            .client
            .post(url)
            .header(CONTENT_TYPE, content_type)
            .header(REFERER, self.base.as_str())
            .header(ORIGIN, origin)
            .body(body)
            .timeout(timeout);

        send(with_cookie(request, cookie), "upload").await
    }

    /// GET `location` and keep following 3xx responses until a page comes back.
    ///
    /// Returns the final URL and response.
    pub async fn follow_redirects(&self, location: &str, cookie: Option<&str>, timeout: Duration) -> Result<(String, HttpResponse)> {
        let mut url = self.absolute_url(location);

        for _ in 0..MAX_REDIRECTS {
            tracing::info!(url = %url, "Following redirect");
            let response = self.get(&url, cookie, timeout, "result page").await?;

            match response.redirect_target() {
                Some(next) => url = self.absolute_url(next),
                None => return Ok((url, response)),
            }
        }

        Err(Yt2SampError::TooManyRedirects)
    }
}

fn with_cookie(request: RequestBuilder, cookie: Option<&str>) -> RequestBuilder {
    match cookie.filter(|c| !c.is_empty()) {
        Some(cookie) => request.header(COOKIE, cookie),
        None => request,
    }
}

async fn send(request: RequestBuilder, phase: &'static str) -> Result<HttpResponse> {
    let response = request
        .send()
        .await
        .map_err(|e| Yt2SampError::transport(phase, e))?;

    let status = response.status();
    let location = response
        .headers()
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let cookies = response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(str::to_string)
        .collect();

    let body = response
        .text()
        .await
        .map_err(|e| Yt2SampError::transport(phase, e))?;

    tracing::debug!(phase, status = status.as_u16(), "Response received");

    Ok(HttpResponse {
        status,
        location,
        cookies,
        body,
    })
}
