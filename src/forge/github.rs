use std::collections::HashSet;
use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::header::LINK;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, info};

use crate::core::identity::Identity;
use crate::core::repo::{RemoteRepo, RepoName, Visibility};
use crate::forge::traits::Catalog;
use crate::forge::CatalogError;

const PER_PAGE: usize = 100;

#[derive(Debug, Clone)]
pub struct GitHubClient {
    pub host: String,
    token: Option<String>,
    detect_submodules: bool,
    client: Client,
}

impl GitHubClient {
    pub fn new(host: impl Into<String>, token: Option<String>) -> Self {
        let host = normalize_host(&host.into());
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("githaul")
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            host,
            token: token.filter(|token| !token.trim().is_empty()),
            detect_submodules: true,
            client,
        }
    }

    /// Look for `.gitmodules` in every listed repository. Costs one request
    /// per repository.
    pub fn with_submodule_detection(mut self, enabled: bool) -> Self {
        self.detect_submodules = enabled;
        self
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/{}", self.host, path.trim_start_matches('/'))
    }

    fn get(&self, url: &str, query: &[(&str, String)]) -> reqwest::Result<Response> {
        let mut request = self
            .client
            .get(url)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28");
        if let Some(token) = self.token.as_ref() {
            request = request.header("Authorization", format!("Bearer {token}"));
        }
        if !query.is_empty() {
            request = request.query(query);
        }
        request.send()
    }

    fn fetch_all(&self, identity: &Identity) -> Result<Vec<RemoteRepo>, CatalogError> {
        let owner = identity.owner();
        let (path, kind) = match identity.org() {
            Some(org) => (format!("/orgs/{}/repos", encode_path(org)), "all"),
            None => (format!("/users/{}/repos", encode_path(identity.user())), "owner"),
        };

        let mut next = Some(self.api_url(&path));
        let mut page_number = 0usize;
        let mut seen = HashSet::new();
        let mut repos = Vec::new();

        while let Some(url) = next.take() {
            page_number += 1;
            // Later pages come from the Link header with their query intact.
            let query = if page_number == 1 {
                vec![
                    ("per_page", PER_PAGE.to_string()),
                    ("type", kind.to_string()),
                    ("sort", "full_name".to_string()),
                ]
            } else {
                Vec::new()
            };
            debug!(%url, page = page_number, "listing repositories");

            let page_failure = |detail: String| {
                if page_number > 1 {
                    CatalogError::CatalogIncomplete {
                        owner: owner.to_string(),
                        detail: format!("page {page_number} could not be read: {detail}"),
                    }
                } else {
                    CatalogError::CatalogUnavailable {
                        owner: owner.to_string(),
                        detail,
                    }
                }
            };

            let response = self
                .get(&url, &query)
                .map_err(|err| page_failure(format!("request to {url} failed: {err}")))?;
            let status = response.status();
            let link = header_string(&response, LINK.as_str());
            let remaining = header_string(&response, "x-ratelimit-remaining");
            let body = response
                .text()
                .map_err(|err| page_failure(format!("failed reading response body: {err}")))?;

            if !status.is_success() {
                return Err(page_failure(describe_http_failure(
                    status,
                    remaining.as_deref(),
                    &url,
                    &body,
                )));
            }

            let value: Value = serde_json::from_str(&body).map_err(|err| {
                CatalogError::CatalogIncomplete {
                    owner: owner.to_string(),
                    detail: format!("page {page_number} is not valid JSON: {err}"),
                }
            })?;
            let next_link = link.as_deref().and_then(parse_next_link);
            repos.extend(parse_page(
                identity,
                &value,
                page_number,
                next_link.is_some(),
                &mut seen,
            )?);
            next = next_link;
        }

        Ok(repos)
    }

    fn fill_submodule_flags(
        &self,
        owner: &str,
        repos: &mut [RemoteRepo],
    ) -> Result<(), CatalogError> {
        for repo in repos.iter_mut() {
            if repo.default_branch.is_empty() {
                continue;
            }
            let url = self.api_url(&format!(
                "/repos/{}/{}/contents/.gitmodules",
                encode_path(owner),
                encode_path(repo.name.as_str())
            ));
            let response = self.get(&url, &[]).map_err(|err| {
                CatalogError::CatalogUnavailable {
                    owner: owner.to_string(),
                    detail: format!("request to {url} failed: {err}"),
                }
            })?;
            let status = response.status();
            if status.is_success() {
                repo.has_submodules = true;
                continue;
            }
            if status == StatusCode::NOT_FOUND {
                repo.has_submodules = false;
                continue;
            }

            let remaining = header_string(&response, "x-ratelimit-remaining");
            let body = response.text().unwrap_or_default();
            return Err(CatalogError::CatalogUnavailable {
                owner: owner.to_string(),
                detail: describe_http_failure(status, remaining.as_deref(), &url, &body),
            });
        }
        Ok(())
    }
}

impl Catalog for GitHubClient {
    fn list_repos(&self, identity: &Identity) -> Result<Vec<RemoteRepo>, CatalogError> {
        let owner = identity.owner();
        let mut repos = self.fetch_all(identity)?;
        if repos.is_empty() {
            return Err(CatalogError::CatalogEmpty {
                owner: owner.to_string(),
            });
        }

        if self.detect_submodules {
            self.fill_submodule_flags(owner, &mut repos)?;
        }

        repos.sort_by_key(|repo| repo.name.as_str().to_lowercase());
        info!(owner, count = repos.len(), "catalog listed");
        Ok(repos)
    }
}

fn parse_page(
    identity: &Identity,
    value: &Value,
    page_number: usize,
    has_next: bool,
    seen: &mut HashSet<String>,
) -> Result<Vec<RemoteRepo>, CatalogError> {
    let owner = identity.owner();
    let incomplete = |detail: String| CatalogError::CatalogIncomplete {
        owner: owner.to_string(),
        detail,
    };

    let entries = value
        .as_array()
        .ok_or_else(|| incomplete(format!("page {page_number} is not a JSON array")))?;
    if has_next && entries.len() < PER_PAGE {
        return Err(incomplete(format!(
            "page {page_number} returned {} of {PER_PAGE} entries but advertises another page",
            entries.len()
        )));
    }

    let mut repos = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        let name = entry
            .get("name")
            .and_then(|value| value.as_str())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| {
                incomplete(format!("entry {index} on page {page_number} has no name"))
            })?;
        if !seen.insert(name.to_string()) {
            return Err(incomplete(format!(
                "repository '{name}' listed twice (page {page_number})"
            )));
        }

        repos.push(RemoteRepo {
            name: RepoName::new(name),
            default_branch: entry
                .get("default_branch")
                .and_then(|value| value.as_str())
                .unwrap_or_default()
                .to_string(),
            has_submodules: false,
            clone_url: identity.remote_url(name),
            visibility: parse_visibility(entry),
        });
    }

    Ok(repos)
}

fn parse_visibility(entry: &Value) -> Visibility {
    match entry.get("visibility").and_then(|value| value.as_str()) {
        Some("public") => Visibility::Public,
        Some("internal") => Visibility::Internal,
        Some("private") => Visibility::Private,
        _ => {
            if entry
                .get("private")
                .and_then(|value| value.as_bool())
                .unwrap_or(false)
            {
                Visibility::Private
            } else {
                Visibility::Public
            }
        }
    }
}

/// Extract the `rel="next"` target from an RFC 8288 `Link` header.
fn parse_next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|part| {
        let mut pieces = part.split(';');
        let target = pieces.next()?.trim();
        let target = target.strip_prefix('<')?.strip_suffix('>')?;
        let is_next = pieces.any(|param| {
            let param = param.trim();
            param
                .strip_prefix("rel=")
                .map(|rel| rel.trim_matches('"').split_whitespace().any(|rel| rel == "next"))
                .unwrap_or(false)
        });
        is_next.then(|| target.to_string())
    })
}

fn describe_http_failure(
    status: StatusCode,
    rate_remaining: Option<&str>,
    url: &str,
    body: &str,
) -> String {
    let reason = match status {
        StatusCode::UNAUTHORIZED => "authentication rejected".to_string(),
        StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS if rate_remaining == Some("0") => {
            "API rate limit exhausted; provide a token to raise the limit".to_string()
        }
        StatusCode::NOT_FOUND => "owner not found or not visible to this token".to_string(),
        _ => "request rejected".to_string(),
    };
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("message")
                .and_then(|message| message.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string());
    if message.is_empty() {
        format!("github API returned {status} for {url}: {reason}")
    } else {
        format!("github API returned {status} for {url}: {reason} ({message})")
    }
}

fn header_string(response: &Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

fn normalize_host(host: &str) -> String {
    let trimmed = host.trim().trim_end_matches('/');

    if trimmed.is_empty() {
        return "https://api.github.com".to_string();
    }

    if trimmed == "github.com" || trimmed == "api.github.com" {
        return "https://api.github.com".to_string();
    }

    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        if trimmed.ends_with("/api/v3") || trimmed.ends_with("/api") {
            return trimmed.to_string();
        }
        if trimmed.starts_with("https://api.") || trimmed.starts_with("http://api.") {
            return trimmed.to_string();
        }
        return format!("{trimmed}/api/v3");
    }

    if trimmed.starts_with("api.") {
        return format!("https://{trimmed}");
    }

    format!("https://{trimmed}/api/v3")
}

fn encode_path(value: &str) -> String {
    let mut encoded = String::new();
    for byte in value.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~') {
            encoded.push(byte as char);
        } else {
            encoded.push('%');
            encoded.push_str(&format!("{:02X}", byte));
        }
    }
    encoded
}
