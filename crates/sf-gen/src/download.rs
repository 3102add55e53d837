//! Source image downloader with a manually followed, allow-listed
//! redirect chain.

use reqwest::{Client, StatusCode, redirect::Policy};
use tracing::{debug, instrument, warn};
use url::Url;

use crate::errors::{GenerateError, Result};

pub struct Downloader {
    http: Client,
    allowed_redirect_hosts: Vec<String>,
    max_redirects: usize,
    max_bytes: usize,
}

fn host_allowed(url: &Url, allowed: &[String]) -> bool {
    let Some(host) = url.host_str() else {
        return false;
    };
    allowed
        .iter()
        .any(|a| host == a || host.ends_with(&format!(".{a}")))
}

impl Downloader {
    pub fn new(
        allowed_redirect_hosts: Vec<String>,
        max_redirects: usize,
        max_bytes: usize,
        connect_timeout: std::time::Duration,
        request_timeout: std::time::Duration,
        user_agent: &str,
    ) -> Result<Self> {
        // redirects are followed by hand so each hop can be checked
        let http = Client::builder()
            .redirect(Policy::none())
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self {
            http,
            allowed_redirect_hosts,
            max_redirects,
            max_bytes,
        })
    }

    fn parse(&self, url: &str) -> Result<Url> {
        let parsed = Url::parse(url).map_err(|e| GenerateError::InvalidUrl {
            reason: e.to_string(),
        })?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(GenerateError::InvalidUrl {
                reason: format!("unsupported scheme: {}", parsed.scheme()),
            });
        }
        Ok(parsed)
    }

    /// Download the source image, following at most `max_redirects`
    /// hops, each of which must point at an allow-listed host.
    #[instrument(skip(self))]
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let mut current = self.parse(url)?;

        for _hop in 0..=self.max_redirects {
            let response = self.http.get(current.clone()).send().await?;
            let status = response.status();

            if status.is_redirection() {
                let location = response
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or(GenerateError::InvalidUrl {
                        reason: "redirect without location".into(),
                    })?;
                let next = current
                    .join(location)
                    .map_err(|e| GenerateError::InvalidUrl {
                        reason: e.to_string(),
                    })?;

                if !host_allowed(&next, &self.allowed_redirect_hosts) {
                    warn!(target = %next, "redirect target not allow-listed");
                    return Err(GenerateError::InvalidUrl {
                        reason: format!("redirect to disallowed host: {next}"),
                    });
                }
                debug!(target = %next, "following redirect");
                current = next;
                continue;
            }

            if !status.is_success() {
                return Err(GenerateError::DownloadFailed { status });
            }

            let bytes = response.bytes().await?;
            if bytes.len() > self.max_bytes {
                return Err(GenerateError::DownloadFailed {
                    status: StatusCode::PAYLOAD_TOO_LARGE,
                });
            }
            return Ok(bytes.to_vec());
        }

        Err(GenerateError::InvalidUrl {
            reason: "too many redirects".into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn downloader(allowed: Vec<String>) -> Downloader {
        Downloader::new(
            allowed,
            3,
            1024 * 1024,
            Duration::from_secs(5),
            Duration::from_secs(5),
            "test",
        )
        .unwrap()
    }

    #[tokio::test]
    async fn rejects_non_http_schemes() {
        let d = downloader(vec![]);
        let err = d.fetch("ftp://example.com/skin.png").await.unwrap_err();
        assert!(matches!(err, GenerateError::InvalidUrl { .. }));
    }

    #[tokio::test]
    async fn downloads_direct_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/skin.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8; 256]))
            .mount(&server)
            .await;

        let d = downloader(vec![]);
        let bytes = d.fetch(&format!("{}/skin.png", server.uri())).await.unwrap();
        assert_eq!(bytes.len(), 256);
    }

    #[tokio::test]
    async fn refuses_redirect_to_unlisted_host() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/short"))
            .respond_with(
                ResponseTemplate::new(302).insert_header("Location", "http://evil.example/skin"),
            )
            .mount(&server)
            .await;

        let d = downloader(vec!["imgur.com".into()]);
        let err = d.fetch(&format!("{}/short", server.uri())).await.unwrap_err();
        assert!(matches!(err, GenerateError::InvalidUrl { .. }));
    }

    #[tokio::test]
    async fn follows_allow_listed_redirect() {
        let server = MockServer::start().await;
        // wiremock serves on 127.0.0.1, so allow-list that host
        Mock::given(method("GET"))
            .and(path("/short"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", "/real.png"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/real.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![2u8; 128]))
            .mount(&server)
            .await;

        let d = downloader(vec!["127.0.0.1".into()]);
        let bytes = d.fetch(&format!("{}/short", server.uri())).await.unwrap();
        assert_eq!(bytes.len(), 128);
    }

    #[tokio::test]
    async fn surfaces_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let d = downloader(vec![]);
        let err = d.fetch(&format!("{}/gone.png", server.uri())).await.unwrap_err();
        assert!(matches!(
            err,
            GenerateError::DownloadFailed {
                status: StatusCode::NOT_FOUND
            }
        ));
    }
}
