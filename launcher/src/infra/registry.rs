//! OCI distribution API client: implements `OciRegistry` with `reqwest`.
//!
//! Anonymous and basic-auth bearer token challenges are answered once per
//! repository scope and the token is reused for later requests.

use std::collections::HashMap;

use anyhow::{Context, Result};
use reqwest::header::{ACCEPT, CONTENT_TYPE, LOCATION, WWW_AUTHENTICATE};
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::application::ports::OciRegistry;
use crate::domain::OciError;
use crate::domain::oci::{BearerChallenge, Descriptor, OciReference, parse_bearer_challenge};

const MANIFEST_ACCEPT: &str = "application/vnd.oci.image.index.v1+json, \
     application/vnd.oci.image.manifest.v1+json, \
     application/vnd.docker.distribution.manifest.list.v2+json, \
     application/vnd.docker.distribution.manifest.v2+json";

/// Username and password for registries that need them.
#[derive(Clone)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: String,
    #[serde(default)]
    access_token: String,
}

/// Registry client speaking HTTPS, or plain HTTP when `insecure`.
#[derive(Debug)]
pub struct HttpRegistry {
    client: reqwest::Client,
    insecure: bool,
    auth: Option<BasicAuth>,
    tokens: Mutex<HashMap<String, String>>,
}

impl HttpRegistry {
    #[must_use]
    pub fn new(client: reqwest::Client, insecure: bool) -> Self {
        Self {
            client,
            insecure,
            auth: None,
            tokens: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn with_basic_auth(mut self, auth: BasicAuth) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Send a request, answering one auth challenge if the registry asks.
    async fn send(
        &self,
        repo: &OciReference,
        push: bool,
        method: &Method,
        url: &str,
        build: impl Fn(RequestBuilder) -> RequestBuilder,
    ) -> Result<Response> {
        let scope_key = format!("{}/{}:{push}", repo.registry, repo.repository);
        let cached = self.tokens.lock().await.get(&scope_key).cloned();
        let first = self.authorize(self.client.request(method.clone(), url), cached.as_deref());
        let resp = build(first)
            .send()
            .await
            .with_context(|| format!("{method} {url} failed"))?;
        if resp.status() != StatusCode::UNAUTHORIZED {
            return Ok(resp);
        }

        let challenge = resp
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let retry = if let Some(bearer) = parse_bearer_challenge(&challenge) {
            let token = self.fetch_token(repo, push, &bearer).await?;
            self.tokens.lock().await.insert(scope_key, token.clone());
            self.client.request(method.clone(), url).bearer_auth(token)
        } else if let Some(auth) = &self.auth {
            self.client
                .request(method.clone(), url)
                .basic_auth(&auth.username, Some(&auth.password))
        } else {
            return Err(OciError::Auth(format!("{url} requires credentials")).into());
        };
        build(retry)
            .send()
            .await
            .with_context(|| format!("{method} {url} failed"))
    }

    fn authorize(&self, req: RequestBuilder, token: Option<&str>) -> RequestBuilder {
        match (token, &self.auth) {
            (Some(token), _) => req.bearer_auth(token),
            (None, Some(auth)) => req.basic_auth(&auth.username, Some(&auth.password)),
            (None, None) => req,
        }
    }

    async fn fetch_token(
        &self,
        repo: &OciReference,
        push: bool,
        challenge: &BearerChallenge,
    ) -> Result<String> {
        let actions = if push { "pull,push" } else { "pull" };
        let scope = if challenge.scope.is_empty() || push {
            format!("repository:{}:{actions}", repo.repository)
        } else {
            challenge.scope.clone()
        };
        let mut req = self
            .client
            .get(&challenge.realm)
            .query(&[("service", challenge.service.as_str()), ("scope", scope.as_str())]);
        if let Some(auth) = &self.auth {
            req = req.basic_auth(&auth.username, Some(&auth.password));
        }
        let resp = req
            .send()
            .await
            .with_context(|| format!("requesting token from {}", challenge.realm))?;
        if !resp.status().is_success() {
            return Err(OciError::Auth(format!(
                "token endpoint {} returned {}",
                challenge.realm,
                resp.status()
            ))
            .into());
        }
        let body: TokenResponse = resp.json().await.context("decoding token response")?;
        let token = if body.token.is_empty() {
            body.access_token
        } else {
            body.token
        };
        if token.is_empty() {
            return Err(OciError::Auth("token endpoint returned no token".into()).into());
        }
        Ok(token)
    }

    fn base(&self, repo: &OciReference) -> String {
        repo.api_base(self.insecure)
    }
}

fn expect_status(
    resp: &Response,
    method: &'static str,
    url: &str,
    ok: impl Fn(StatusCode) -> bool,
) -> Result<()> {
    if ok(resp.status()) {
        return Ok(());
    }
    Err(OciError::Registry {
        method,
        url: url.to_string(),
        status: resp.status().as_u16(),
    }
    .into())
}

impl OciRegistry for HttpRegistry {
    async fn fetch_manifest(&self, repo: &OciReference, reference: &str) -> Result<(String, Vec<u8>)> {
        let url = format!("{}/manifests/{reference}", self.base(repo));
        let resp = self
            .send(repo, false, &Method::GET, &url, |r| r.header(ACCEPT, MANIFEST_ACCEPT))
            .await?;
        expect_status(&resp, "GET", &url, |s| s.is_success())?;
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = resp.bytes().await.context("reading manifest body")?;
        Ok((content_type, body.to_vec()))
    }

    async fn fetch_blob(&self, repo: &OciReference, digest: &str) -> Result<Vec<u8>> {
        let url = format!("{}/blobs/{digest}", self.base(repo));
        let resp = self.send(repo, false, &Method::GET, &url, |r| r).await?;
        expect_status(&resp, "GET", &url, |s| s.is_success())?;
        Ok(resp.bytes().await.context("reading blob body")?.to_vec())
    }

    async fn push_blob(&self, repo: &OciReference, descriptor: &Descriptor, data: &[u8]) -> Result<()> {
        let base = self.base(repo);
        let digest = descriptor.digest().to_string();
        let head_url = format!("{base}/blobs/{digest}");
        let head = self.send(repo, true, &Method::HEAD, &head_url, |r| r).await?;
        if head.status().is_success() {
            tracing::debug!(%digest, "blob already present");
            return Ok(());
        }

        let start_url = format!("{base}/blobs/uploads/");
        let started = self.send(repo, true, &Method::POST, &start_url, |r| r).await?;
        expect_status(&started, "POST", &start_url, |s| s == StatusCode::ACCEPTED)?;
        let location = started
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .with_context(|| format!("upload to {start_url} returned no location"))?;
        let mut upload = Url::parse(&start_url)
            .and_then(|u| u.join(location))
            .with_context(|| format!("invalid upload location {location}"))?;
        upload
            .query_pairs_mut()
            .append_pair("digest", &digest);

        let upload = upload.to_string();
        let body = data.to_vec();
        let done = self
            .send(repo, true, &Method::PUT, &upload, |r| {
                r.header(CONTENT_TYPE, "application/octet-stream")
                    .body(body.clone())
            })
            .await?;
        expect_status(&done, "PUT", &upload, |s| s == StatusCode::CREATED)
    }

    async fn push_manifest(
        &self,
        repo: &OciReference,
        reference: &str,
        media_type: &str,
        data: &[u8],
    ) -> Result<()> {
        let url = format!("{}/manifests/{reference}", self.base(repo));
        let body = data.to_vec();
        let media_type = media_type.to_string();
        let resp = self
            .send(repo, true, &Method::PUT, &url, |r| {
                r.header(CONTENT_TYPE, media_type.as_str()).body(body.clone())
            })
            .await?;
        expect_status(&resp, "PUT", &url, |s| s == StatusCode::CREATED)
    }
}
