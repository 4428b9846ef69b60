//! Article location and pre-existence checks against the wiki REST API.

use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use thiserror::Error;
use url::Url;

/// Characters left intact when embedding an article title in a URL or a
/// `Content-Disposition` filename; every other byte becomes `%HH`.
const TITLE_KEEP: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

pub fn encode_title(title: &str) -> String {
    utf8_percent_encode(title, TITLE_KEEP).to_string()
}

#[derive(Debug, Error)]
pub enum ArticleError {
    #[error("article not found")]
    NotFound,
    #[error("article endpoint returned status {0}")]
    UpstreamStatus(u16),
    #[error("article probe failed: {0}")]
    Transport(String),
    #[error("invalid article url: {0}")]
    InvalidUrl(String),
}

/// Renders the configured URI templates for a `(domain, title)` pair.
///
/// Templates carry `{domain}` and `{title}` placeholders; the title is
/// percent-encoded before substitution.
#[derive(Debug, Clone)]
pub struct ArticleLocator {
    article_template: String,
    probe_template: String,
}

impl ArticleLocator {
    pub fn new(article_template: impl Into<String>, probe_template: impl Into<String>) -> Self {
        Self {
            article_template: article_template.into(),
            probe_template: probe_template.into(),
        }
    }

    /// URL of the rendered article HTML.
    pub fn article_url(&self, domain: &str, title: &str) -> Result<Url, ArticleError> {
        expand(&self.article_template, domain, title)
    }

    /// URL of the title metadata endpoint used by the pre-existence probe.
    pub fn probe_url(&self, domain: &str, title: &str) -> Result<Url, ArticleError> {
        expand(&self.probe_template, domain, title)
    }
}

fn expand(template: &str, domain: &str, title: &str) -> Result<Url, ArticleError> {
    let rendered = template
        .replace("{domain}", domain)
        .replace("{title}", &encode_title(title));
    Url::parse(&rendered).map_err(|err| ArticleError::InvalidUrl(err.to_string()))
}

/// Pre-existence check, run before a job consumes a queue slot.
#[async_trait]
pub trait ArticleProbe: Send + Sync {
    async fn ensure_exists(&self, domain: &str, title: &str) -> Result<(), ArticleError>;
}

/// Probe backed by the wiki REST title endpoint.
pub struct RestProbe {
    client: reqwest::Client,
    locator: ArticleLocator,
}

impl RestProbe {
    pub fn new(client: reqwest::Client, locator: ArticleLocator) -> Self {
        Self { client, locator }
    }
}

#[async_trait]
impl ArticleProbe for RestProbe {
    async fn ensure_exists(&self, domain: &str, title: &str) -> Result<(), ArticleError> {
        let url = self.locator.probe_url(domain, title)?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| ArticleError::Transport(err.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ArticleError::NotFound);
        }
        if !status.is_success() {
            return Err(ArticleError::UpstreamStatus(status.as_u16()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_encoding_keeps_the_documented_set() {
        assert_eq!(encode_title("Alan_Turing"), "Alan_Turing");
        assert_eq!(encode_title("C++ (language)"), "C%2B%2B%20(language)");
        assert_eq!(encode_title("don't!~*"), "don't!~*");
        assert_eq!(encode_title("a/b?c=d"), "a%2Fb%3Fc%3Dd");
    }

    #[test]
    fn title_encoding_escapes_multibyte_input() {
        assert_eq!(encode_title("東京"), "%E6%9D%B1%E4%BA%AC");
    }

    #[test]
    fn locator_expands_both_templates() {
        let locator = ArticleLocator::new(
            "https://{domain}/api/rest_v1/page/html/{title}",
            "https://{domain}/api/rest_v1/page/title/{title}",
        );
        let article = locator
            .article_url("en.wikipedia.org", "Alan Turing")
            .expect("valid article url");
        assert_eq!(
            article.as_str(),
            "https://en.wikipedia.org/api/rest_v1/page/html/Alan%20Turing"
        );
        let probe = locator
            .probe_url("en.wikipedia.org", "Alan Turing")
            .expect("valid probe url");
        assert_eq!(
            probe.as_str(),
            "https://en.wikipedia.org/api/rest_v1/page/title/Alan%20Turing"
        );
    }
}
