//! HTTP registry client
//!
//! REST layout, all paths relative to the session's registry URL:
//!
//! - `POST /api/fragments/{owner}/{name}/exists` batch existence check
//! - `PUT|GET /api/fragments/{owner}/{name}/{hash}` fragment bytes
//! - `PUT|GET /api/package/{owner}/{name}/{hash}` manifest bytes
//! - `GET /api/log/{owner}/{name}` build history
//! - `GET /api/version/{owner}/{name}/`, `PUT .../{version}` versions
//! - `GET /api/tag/{owner}/{name}/`, `PUT|DELETE .../{tag}` tags
//! - `GET /api/access/{owner}/{name}/`, `PUT|DELETE .../{user}` access
//! - `GET /api/package/{owner}/` package names under an owner

use super::{BuildRecord, RegistryClient, TagEntry, VersionEntry};
use crate::error::RegistryError;
use crate::session::Session;
use crate::types::{hash_to_hex, parse_hash, Hash, PackageRef};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct ExistsRequest {
    hashes: Vec<String>,
}

#[derive(Deserialize)]
struct ExistsResponse {
    exists: Vec<bool>,
}

#[derive(Serialize)]
struct HashBody {
    hash: String,
}

#[derive(Deserialize)]
struct MismatchBody {
    actual: String,
}

#[derive(Deserialize)]
struct LogResponse {
    logs: Vec<BuildRecord>,
}

#[derive(Deserialize)]
struct VersionsResponse {
    versions: Vec<VersionEntry>,
}

#[derive(Deserialize)]
struct TagsResponse {
    tags: Vec<TagEntry>,
}

#[derive(Deserialize)]
struct AccessResponse {
    users: Vec<String>,
}

#[derive(Deserialize)]
struct PackagesResponse {
    packages: Vec<String>,
}

pub struct HttpRegistryClient {
    client: Client,
    timeout_secs: u64,
}

impl HttpRegistryClient {
    pub fn new(timeout_secs: u64) -> Result<Self, RegistryError> {
        let client = Client::builder()
            .connect_timeout(HTTP_CONNECT_TIMEOUT)
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| RegistryError::Transport(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            timeout_secs,
        })
    }

    /// Registry endpoint with every segment percent-encoded
    fn endpoint(session: &Session, segments: &[&str]) -> Result<Url, RegistryError> {
        let mut url = Url::parse(&session.registry_url).map_err(|e| {
            RegistryError::Protocol(format!(
                "Invalid registry URL {:?}: {}",
                session.registry_url, e
            ))
        })?;
        url.path_segments_mut()
            .map_err(|_| {
                RegistryError::Protocol(format!(
                    "Registry URL {:?} cannot hold a path",
                    session.registry_url
                ))
            })?
            .pop_if_empty()
            .push("api")
            .extend(segments);
        Ok(url)
    }

    fn url(
        session: &Session,
        section: &str,
        package: &PackageRef,
        rest: &str,
    ) -> Result<Url, RegistryError> {
        Self::endpoint(session, &[section, &package.owner, &package.name, rest])
    }

    fn authorize(builder: RequestBuilder, session: &Session) -> RequestBuilder {
        match &session.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(
        &self,
        builder: RequestBuilder,
        session: &Session,
    ) -> Result<Response, RegistryError> {
        let response = Self::authorize(builder, session)
            .send()
            .await
            .map_err(|e| self.map_http_error(e))?;
        if response.status().is_success() {
            return Ok(response);
        }
        Err(map_status(response).await)
    }

    async fn json<T: for<'de> Deserialize<'de>>(
        &self,
        response: Response,
    ) -> Result<T, RegistryError> {
        response
            .json()
            .await
            .map_err(|e| RegistryError::Protocol(format!("Failed to parse response: {}", e)))
    }

    async fn bytes(&self, response: Response) -> Result<Vec<u8>, RegistryError> {
        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| self.map_http_error(e))
    }

    fn map_http_error(&self, error: reqwest::Error) -> RegistryError {
        if error.is_timeout() {
            RegistryError::Timeout(self.timeout_secs)
        } else if error.is_connect() || error.is_request() || error.is_body() {
            RegistryError::Transport(error.to_string())
        } else {
            RegistryError::Protocol(format!("HTTP error: {}", error))
        }
    }
}

async fn map_status(response: Response) -> RegistryError {
    let status = response.status();
    let text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RegistryError::Unauthorized(text),
        StatusCode::NOT_FOUND => RegistryError::NotFound(text),
        StatusCode::CONFLICT => RegistryError::Conflict(text),
        s if s.is_server_error() => {
            RegistryError::Transport(format!("Request failed with status {}: {}", s, text))
        }
        s => RegistryError::Protocol(format!("Request failed with status {}: {}", s, text)),
    }
}

#[async_trait]
impl RegistryClient for HttpRegistryClient {
    async fn fragments_exist(
        &self,
        session: &Session,
        package: &PackageRef,
        hashes: &[Hash],
    ) -> Result<Vec<bool>, RegistryError> {
        let body = ExistsRequest {
            hashes: hashes.iter().map(hash_to_hex).collect(),
        };
        let url = Self::url(session, "fragments", package, "exists")?;
        debug!(url = %url, count = hashes.len(), "Checking fragment existence");
        let response = self.send(self.client.post(url).json(&body), session).await?;
        let parsed: ExistsResponse = self.json(response).await?;
        if parsed.exists.len() != hashes.len() {
            return Err(RegistryError::Protocol(format!(
                "existence check returned {} answers for {} hashes",
                parsed.exists.len(),
                hashes.len()
            )));
        }
        Ok(parsed.exists)
    }

    async fn upload_fragment(
        &self,
        session: &Session,
        package: &PackageRef,
        hash: &Hash,
        bytes: Vec<u8>,
    ) -> Result<(), RegistryError> {
        let url = Self::url(session, "fragments", package, &hash_to_hex(hash))?;
        let builder = self
            .client
            .put(url)
            .header("Content-Type", "application/octet-stream")
            .body(bytes);
        let response = Self::authorize(builder, session)
            .send()
            .await
            .map_err(|e| self.map_http_error(e))?;
        if response.status() == StatusCode::UNPROCESSABLE_ENTITY {
            let body: MismatchBody = self.json(response).await?;
            let actual = parse_hash(&body.actual)
                .map_err(|e| RegistryError::Protocol(e.to_string()))?;
            return Err(RegistryError::HashMismatch {
                expected: *hash,
                actual,
            });
        }
        if !response.status().is_success() {
            return Err(map_status(response).await);
        }
        Ok(())
    }

    async fn download_fragment(
        &self,
        session: &Session,
        package: &PackageRef,
        hash: &Hash,
    ) -> Result<Vec<u8>, RegistryError> {
        let url = Self::url(session, "fragments", package, &hash_to_hex(hash))?;
        let response = self.send(self.client.get(url), session).await?;
        self.bytes(response).await
    }

    async fn upload_manifest(
        &self,
        session: &Session,
        package: &PackageRef,
        root: &Hash,
        bytes: Vec<u8>,
    ) -> Result<(), RegistryError> {
        let url = Self::url(session, "package", package, &hash_to_hex(root))?;
        let builder = self
            .client
            .put(url)
            .header("Content-Type", "application/json")
            .body(bytes);
        self.send(builder, session).await?;
        Ok(())
    }

    async fn download_manifest(
        &self,
        session: &Session,
        package: &PackageRef,
        root: &Hash,
    ) -> Result<Vec<u8>, RegistryError> {
        let url = Self::url(session, "package", package, &hash_to_hex(root))?;
        let response = self.send(self.client.get(url), session).await?;
        self.bytes(response).await
    }

    async fn builds(
        &self,
        session: &Session,
        package: &PackageRef,
    ) -> Result<Vec<BuildRecord>, RegistryError> {
        let url = Self::endpoint(session, &["log", &package.owner, &package.name])?;
        let response = self.send(self.client.get(url), session).await?;
        let parsed: LogResponse = self.json(response).await?;
        Ok(parsed.logs)
    }

    async fn versions(
        &self,
        session: &Session,
        package: &PackageRef,
    ) -> Result<Vec<VersionEntry>, RegistryError> {
        let url = Self::url(session, "version", package, "")?;
        let response = self.send(self.client.get(url), session).await?;
        let parsed: VersionsResponse = self.json(response).await?;
        Ok(parsed.versions)
    }

    async fn add_version(
        &self,
        session: &Session,
        package: &PackageRef,
        version: &str,
        hash: &Hash,
    ) -> Result<(), RegistryError> {
        let url = Self::url(session, "version", package, version)?;
        let body = HashBody {
            hash: hash_to_hex(hash),
        };
        self.send(self.client.put(url).json(&body), session).await?;
        Ok(())
    }

    async fn tags(
        &self,
        session: &Session,
        package: &PackageRef,
    ) -> Result<Vec<TagEntry>, RegistryError> {
        let url = Self::url(session, "tag", package, "")?;
        let response = self.send(self.client.get(url), session).await?;
        let parsed: TagsResponse = self.json(response).await?;
        Ok(parsed.tags)
    }

    async fn add_tag(
        &self,
        session: &Session,
        package: &PackageRef,
        tag: &str,
        hash: &Hash,
    ) -> Result<(), RegistryError> {
        let url = Self::url(session, "tag", package, tag)?;
        let body = HashBody {
            hash: hash_to_hex(hash),
        };
        self.send(self.client.put(url).json(&body), session).await?;
        Ok(())
    }

    async fn remove_tag(
        &self,
        session: &Session,
        package: &PackageRef,
        tag: &str,
    ) -> Result<(), RegistryError> {
        let url = Self::url(session, "tag", package, tag)?;
        self.send(self.client.delete(url), session).await?;
        Ok(())
    }

    async fn access_list(
        &self,
        session: &Session,
        package: &PackageRef,
    ) -> Result<Vec<String>, RegistryError> {
        let url = Self::url(session, "access", package, "")?;
        let response = self.send(self.client.get(url), session).await?;
        let parsed: AccessResponse = self.json(response).await?;
        Ok(parsed.users)
    }

    async fn access_add(
        &self,
        session: &Session,
        package: &PackageRef,
        user: &str,
    ) -> Result<(), RegistryError> {
        let url = Self::url(session, "access", package, user)?;
        self.send(self.client.put(url), session).await?;
        Ok(())
    }

    async fn access_remove(
        &self,
        session: &Session,
        package: &PackageRef,
        user: &str,
    ) -> Result<(), RegistryError> {
        let url = Self::url(session, "access", package, user)?;
        self.send(self.client.delete(url), session).await?;
        Ok(())
    }

    async fn list_packages(
        &self,
        session: &Session,
        owner: &str,
    ) -> Result<Vec<PackageRef>, RegistryError> {
        let url = Self::endpoint(session, &["package", owner, ""])?;
        let response = self.send(self.client.get(url), session).await?;
        let parsed: PackagesResponse = self.json(response).await?;
        let mut packages = parsed
            .packages
            .into_iter()
            .map(|name| {
                PackageRef::new(owner, name).map_err(|e| RegistryError::Protocol(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        packages.sort();
        Ok(packages)
    }
}
