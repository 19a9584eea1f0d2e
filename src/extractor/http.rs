//! HTTP extractor implementation
//!
//! Fetches pages with a shared `reqwest` client and hands the body to the
//! HTML parser. Redirects are followed by the client (max 10 hops) only while
//! they stay on the requested origin; links are resolved against the final URL.

use crate::config::UserAgentConfig;
use crate::extractor::html::parse_page;
use crate::extractor::{ContentExtractor, ExtractError, ExtractedPage, PageRequest};
use async_trait::async_trait;
use reqwest::{redirect::Policy, Client};
use std::sync::OnceLock;
use std::time::Duration;
use url::Url;

const MAX_REDIRECTS: usize = 10;

/// Redirect policy that never leaves the origin of the first request
///
/// A hop to another origin is not followed; the 3xx response is returned to
/// the caller instead.
fn same_origin_redirects() -> Policy {
    Policy::custom(|attempt| {
        let leaves_origin = attempt
            .previous()
            .first()
            .map_or(false, |first| first.origin() != attempt.url().origin());

        if leaves_origin {
            attempt.stop()
        } else if attempt.previous().len() > MAX_REDIRECTS {
            attempt.error("too many redirects")
        } else {
            attempt.follow()
        }
    })
}

/// Target of a redirect response, resolved against the responding URL
fn redirect_target(response: &reqwest::Response) -> String {
    response
        .headers()
        .get(reqwest::header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|location| response.url().join(location).ok())
        .map(|target: Url| target.to_string())
        .unwrap_or_else(|| "an unknown location".to_string())
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The user agent configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(config: &UserAgentConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .connect_timeout(Duration::from_secs(10))
        .redirect(same_origin_redirects())
        .gzip(true)
        .brotli(true)
        .build()
}

/// Default extractor: plain HTTP fetch plus static HTML parsing
///
/// No JavaScript is executed; pages are extracted from the served markup.
pub struct HttpExtractor {
    user_agent: UserAgentConfig,
    client: OnceLock<Client>,
}

impl HttpExtractor {
    pub fn new(user_agent: UserAgentConfig) -> Self {
        Self {
            user_agent,
            client: OnceLock::new(),
        }
    }

    fn client(&self) -> Result<&Client, ExtractError> {
        self.client
            .get()
            .ok_or_else(|| ExtractError::Unavailable("HTTP client not launched".to_string()))
    }
}

fn classify(error: reqwest::Error) -> ExtractError {
    if error.is_timeout() {
        ExtractError::NavigationTimeout
    } else if error.is_redirect() {
        ExtractError::Navigation(format!("redirect error: {}", error))
    } else if error.is_connect() {
        ExtractError::Navigation(format!("connection failed: {}", error))
    } else {
        ExtractError::Navigation(error.to_string())
    }
}

fn is_html(content_type: &str) -> bool {
    let content_type = content_type.to_ascii_lowercase();
    content_type.contains("text/html") || content_type.contains("application/xhtml+xml")
}

#[async_trait]
impl ContentExtractor for HttpExtractor {
    async fn launch(&self) -> Result<(), ExtractError> {
        if self.client.get().is_some() {
            return Ok(());
        }

        let client = build_http_client(&self.user_agent)
            .map_err(|e| ExtractError::Unavailable(format!("failed to build HTTP client: {}", e)))?;
        // A concurrent launch may have won; either client is equivalent
        let _ = self.client.set(client);

        tracing::debug!("HTTP extractor ready ({})", self.user_agent.header_value());
        Ok(())
    }

    async fn extract(&self, request: PageRequest) -> Result<ExtractedPage, ExtractError> {
        let client = self.client()?;

        let response = client
            .get(request.url.clone())
            .timeout(request.navigation_timeout)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if status.is_redirection() {
            return Err(ExtractError::OffOriginRedirect(redirect_target(&response)));
        }
        if !status.is_success() {
            return Err(ExtractError::HttpStatus(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if !is_html(&content_type) {
            return Err(ExtractError::ContentMismatch(if content_type.is_empty() {
                "no content type".to_string()
            } else {
                content_type
            }));
        }

        let final_url = response.url().clone();
        let body = response.text().await.map_err(classify)?;

        let parsed = parse_page(&body, &final_url);
        tracing::trace!(
            "Parsed {}: {} sections, {} links",
            final_url,
            parsed.sections.len(),
            parsed.links.len()
        );

        Ok(ExtractedPage {
            final_url: Some(final_url),
            sections: parsed.sections,
            links: parsed.links,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn extractor() -> HttpExtractor {
        HttpExtractor::new(UserAgentConfig {
            crawler_name: "TestCrawler".to_string(),
            crawler_version: "1.0".to_string(),
        })
    }

    fn request(server: &MockServer, page: &str) -> PageRequest {
        PageRequest {
            url: Url::parse(&format!("{}{}", server.uri(), page)).unwrap(),
            navigation_timeout: Duration::from_secs(5),
        }
    }

    fn html(body: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/html; charset=utf-8")
    }

    #[test]
    fn test_build_http_client() {
        let config = UserAgentConfig::default();
        assert!(build_http_client(&config).is_ok());
    }

    #[test]
    fn test_is_html() {
        assert!(is_html("text/html"));
        assert!(is_html("Text/HTML; charset=utf-8"));
        assert!(is_html("application/xhtml+xml"));
        assert!(!is_html("application/pdf"));
        assert!(!is_html(""));
    }

    #[tokio::test]
    async fn test_extract_before_launch_is_unavailable() {
        let server = MockServer::start().await;
        let result = extractor().extract(request(&server, "/")).await;
        assert!(matches!(result, Err(ExtractError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_extract_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/docs"))
            .and(header("user-agent", "TestCrawler/1.0"))
            .respond_with(html(
                r#"<html><body><h1>Docs</h1><p>Read me</p><a href="/docs/next">next</a></body></html>"#,
            ))
            .mount(&server)
            .await;

        let extractor = extractor();
        extractor.launch().await.unwrap();
        let page = extractor.extract(request(&server, "/docs")).await.unwrap();

        assert_eq!(page.sections.len(), 1);
        assert_eq!(page.sections[0].title, "Docs");
        assert_eq!(page.links, vec![format!("{}/docs/next", server.uri())]);
    }

    #[tokio::test]
    async fn test_links_resolved_against_redirect_target() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/old"))
            .respond_with(
                ResponseTemplate::new(301).insert_header("location", "/new/index.html"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/new/index.html"))
            .respond_with(html(r#"<html><body><a href="child">c</a></body></html>"#))
            .mount(&server)
            .await;

        let extractor = extractor();
        extractor.launch().await.unwrap();
        let page = extractor.extract(request(&server, "/old")).await.unwrap();

        assert_eq!(
            page.final_url.map(|u| u.path().to_string()),
            Some("/new/index.html".to_string())
        );
        assert_eq!(page.links, vec![format!("{}/new/child", server.uri())]);
    }

    #[tokio::test]
    async fn test_redirect_to_other_origin_not_followed() {
        let server = MockServer::start().await;
        let elsewhere = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("location", format!("{}/secret", elsewhere.uri()).as_str()),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(html("<html><body><p>foreign content</p></body></html>"))
            .expect(0)
            .mount(&elsewhere)
            .await;

        let extractor = extractor();
        extractor.launch().await.unwrap();
        let result = extractor.extract(request(&server, "/")).await;

        match result {
            Err(ExtractError::OffOriginRedirect(target)) => {
                assert_eq!(target, format!("{}/secret", elsewhere.uri()));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        elsewhere.verify().await;
    }

    #[tokio::test]
    async fn test_redirect_loop_is_navigation_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/loop"))
            .respond_with(ResponseTemplate::new(302).insert_header("location", "/loop"))
            .mount(&server)
            .await;

        let extractor = extractor();
        extractor.launch().await.unwrap();
        let result = extractor.extract(request(&server, "/loop")).await;
        assert!(matches!(result, Err(ExtractError::Navigation(_))));
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let extractor = extractor();
        extractor.launch().await.unwrap();
        let result = extractor.extract(request(&server, "/missing")).await;
        assert!(matches!(result, Err(ExtractError::HttpStatus(404))));
    }

    #[tokio::test]
    async fn test_non_html_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(b"%PDF".to_vec(), "application/pdf"),
            )
            .mount(&server)
            .await;

        let extractor = extractor();
        extractor.launch().await.unwrap();
        let result = extractor.extract(request(&server, "/file.pdf")).await;
        assert!(matches!(result, Err(ExtractError::ContentMismatch(_))));
    }

    #[tokio::test]
    async fn test_navigation_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(html("<html></html>").set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let extractor = extractor();
        extractor.launch().await.unwrap();
        let mut req = request(&server, "/slow");
        req.navigation_timeout = Duration::from_millis(50);

        let result = extractor.extract(req).await;
        assert!(matches!(result, Err(ExtractError::NavigationTimeout)));
    }
}
