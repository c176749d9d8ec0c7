//! arXiv Atom API client.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Url;
use serde::Deserialize;
use tracing::{debug, info, warn};

use coffee_core::config::ArxivConfig;
use coffee_core::error::{AppError, ErrorKind};
use coffee_core::result::AppResult;
use coffee_entity::listing::{ArticleKind, NewListing};

use super::ListingSource;

#[derive(Debug, Deserialize)]
struct Feed {
    #[serde(rename = "entry", default)]
    entries: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    id: String,
    title: String,
    #[serde(default)]
    summary: Option<String>,
    published: String,
    #[serde(rename = "author", default)]
    authors: Vec<Author>,
    #[serde(rename = "link", default)]
    links: Vec<Link>,
    #[serde(rename = "comment", alias = "arxiv:comment", default)]
    comment: Option<String>,
    #[serde(
        rename = "primary_category",
        alias = "arxiv:primary_category",
        default
    )]
    primary_category: Option<Category>,
}

#[derive(Debug, Deserialize)]
struct Author {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Link {
    #[serde(rename = "@href")]
    href: String,
    #[serde(rename = "@rel", default)]
    rel: Option<String>,
    #[serde(rename = "@title", default)]
    title: Option<String>,
    #[serde(rename = "@type", default)]
    mime: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Category {
    #[serde(rename = "@term")]
    term: String,
}

/// Parse an arXiv Atom feed into listings.
///
/// The listing date is the entry's publication date. `day_serial` numbers
/// entries within each date in feed order, starting at 1. Entries missing
/// an id or a parseable publication time are skipped.
pub fn parse_feed(
    xml: &str,
    home_categories: &[String],
    fetched_at: DateTime<Utc>,
) -> AppResult<Vec<NewListing>> {
    let feed: Feed = quick_xml::de::from_str(xml).map_err(|e| {
        AppError::with_source(
            ErrorKind::ExternalService,
            format!("Malformed arXiv feed: {e}"),
            e,
        )
    })?;

    let mut serials: HashMap<NaiveDate, i64> = HashMap::new();
    let mut listings = Vec::with_capacity(feed.entries.len());

    for entry in feed.entries {
        let Some(arxiv_id) = short_id(&entry.id) else {
            warn!(id = %entry.id, "Skipping entry with unrecognised id");
            continue;
        };
        let published = match DateTime::parse_from_rfc3339(entry.published.trim()) {
            Ok(published) => published.with_timezone(&Utc),
            Err(e) => {
                warn!(id = %arxiv_id, error = %e, "Skipping entry with bad publication time");
                continue;
            }
        };
        let utcdate = published.date_naive();
        let serial = serials.entry(utcdate).or_insert(0);
        *serial += 1;

        let kind = entry
            .primary_category
            .as_ref()
            .map(|c| ArticleKind::classify(&c.term, home_categories))
            .unwrap_or(ArticleKind::Crosslist);

        let mut link = None;
        let mut pdf = None;
        for l in entry.links {
            let is_pdf = l.title.as_deref() == Some("pdf")
                || l.mime.as_deref() == Some("application/pdf");
            if is_pdf {
                pdf.get_or_insert(l.href);
            } else if l.rel.as_deref().is_none_or(|rel| rel == "alternate") {
                link.get_or_insert(l.href);
            }
        }

        listings.push(NewListing {
            utctime: fetched_at,
            utcdate,
            day_serial: *serial,
            title: collapse_whitespace(&entry.title),
            kind,
            arxiv_id,
            authors: entry
                .authors
                .into_iter()
                .map(|a| collapse_whitespace(&a.name))
                .filter(|name| !name.is_empty())
                .collect(),
            comments: entry.comment.map(|c| collapse_whitespace(&c)),
            abstract_text: entry.summary.map(|s| collapse_whitespace(&s)),
            link,
            pdf,
            local_authors: false,
        });
    }

    Ok(listings)
}

/// `http://arxiv.org/abs/2406.01234v2` becomes `2406.01234`.
fn short_id(id: &str) -> Option<String> {
    let (_, tail) = id.trim().rsplit_once("/abs/")?;
    let base = match tail.rfind('v') {
        Some(pos)
            if pos + 1 < tail.len() && tail[pos + 1..].chars().all(|c| c.is_ascii_digit()) =>
        {
            &tail[..pos]
        }
        _ => tail,
    };
    (!base.is_empty()).then(|| base.to_string())
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Listing source backed by the arXiv query API.
#[derive(Debug, Clone)]
pub struct ArxivClient {
    http: reqwest::Client,
    api_url: String,
    categories: Vec<String>,
    max_results: u32,
}

impl ArxivClient {
    /// Build a client from config.
    pub fn new(config: &ArxivConfig) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .user_agent(concat!("astro-coffee/", env!("CARGO_PKG_VERSION")))
            // Requests come from different worker runtimes; do not pool
            // connections across them.
            .pool_max_idle_per_host(0)
            .build()
            .map_err(|e| {
                AppError::with_source(
                    ErrorKind::Configuration,
                    format!("Failed to build HTTP client: {e}"),
                    e,
                )
            })?;

        Ok(Self {
            http,
            api_url: config.api_url.clone(),
            categories: config.categories.clone(),
            max_results: config.max_results,
        })
    }

    fn query_url(&self) -> AppResult<Url> {
        let search = self
            .categories
            .iter()
            .map(|c| format!("cat:{c}"))
            .collect::<Vec<_>>()
            .join(" OR ");
        let max_results = self.max_results.to_string();

        Url::parse_with_params(
            &self.api_url,
            [
                ("search_query", search.as_str()),
                ("sortBy", "submittedDate"),
                ("sortOrder", "descending"),
                ("start", "0"),
                ("max_results", max_results.as_str()),
            ],
        )
        .map_err(|e| {
            AppError::with_source(
                ErrorKind::Configuration,
                format!("Invalid arXiv API URL '{}': {e}", self.api_url),
                e,
            )
        })
    }
}

fn upstream_error(context: &str, e: reqwest::Error) -> AppError {
    AppError::with_source(ErrorKind::ExternalService, format!("{context}: {e}"), e)
}

#[async_trait]
impl ListingSource for ArxivClient {
    fn name(&self) -> &str {
        "arxiv"
    }

    async fn fetch_since(&self, watermark: Option<NaiveDate>) -> AppResult<Vec<NewListing>> {
        let url = self.query_url()?;
        debug!(%url, "Querying arXiv");

        let body = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| upstream_error("arXiv request failed", e))?
            .error_for_status()
            .map_err(|e| upstream_error("arXiv returned an error status", e))?
            .text()
            .await
            .map_err(|e| upstream_error("Failed to read arXiv response", e))?;

        let mut listings = parse_feed(&body, &self.categories, Utc::now())?;
        let total = listings.len();
        if let Some(watermark) = watermark {
            listings.retain(|l| l.utcdate >= watermark);
        }

        info!(
            total,
            kept = listings.len(),
            watermark = ?watermark,
            "Fetched arXiv listings"
        );
        Ok(listings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom" xmlns:arxiv="http://arxiv.org/schemas/atom">
  <title type="html">ArXiv Query</title>
  <id>http://arxiv.org/api/abc</id>
  <entry>
    <id>http://arxiv.org/abs/2406.00003v1</id>
    <published>2024-06-04T17:00:00Z</published>
    <title>A Third
      Paper</title>
    <summary>  We find
      things.  </summary>
    <author><name>Waqas Bhatti</name></author>
    <author><name>A. Other</name></author>
    <arxiv:comment>12 pages, 3 figures</arxiv:comment>
    <link href="http://arxiv.org/abs/2406.00003v1" rel="alternate" type="text/html"/>
    <link title="pdf" href="http://arxiv.org/pdf/2406.00003v1" rel="related" type="application/pdf"/>
    <arxiv:primary_category term="astro-ph.GA" scheme="http://arxiv.org/schemas/atom"/>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/2406.00002v2</id>
    <published>2024-06-03T12:00:00Z</published>
    <title>Second Paper</title>
    <summary>Dark matter.</summary>
    <author><name>B. Author</name></author>
    <link href="http://arxiv.org/abs/2406.00002v2" rel="alternate" type="text/html"/>
    <arxiv:primary_category term="hep-ph" scheme="http://arxiv.org/schemas/atom"/>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/2406.00001v1</id>
    <published>2024-06-03T09:00:00Z</published>
    <title>First Paper</title>
    <summary>Stars.</summary>
    <author><name>C. Author</name></author>
    <arxiv:primary_category term="astro-ph.SR" scheme="http://arxiv.org/schemas/atom"/>
  </entry>
</feed>"#;

    fn home() -> Vec<String> {
        vec!["astro-ph".to_string()]
    }

    #[test]
    fn test_parse_feed_fields() {
        let fetched = Utc.with_ymd_and_hms(2024, 6, 5, 0, 0, 0).unwrap();
        let listings = parse_feed(FEED, &home(), fetched).unwrap();
        assert_eq!(listings.len(), 3);

        let first = &listings[0];
        assert_eq!(first.arxiv_id, "2406.00003");
        assert_eq!(first.utcdate, NaiveDate::from_ymd_opt(2024, 6, 4).unwrap());
        assert_eq!(first.day_serial, 1);
        assert_eq!(first.title, "A Third Paper");
        assert_eq!(first.abstract_text.as_deref(), Some("We find things."));
        assert_eq!(first.authors, vec!["Waqas Bhatti", "A. Other"]);
        assert_eq!(first.comments.as_deref(), Some("12 pages, 3 figures"));
        assert_eq!(first.kind, ArticleKind::Astronomy);
        assert_eq!(
            first.link.as_deref(),
            Some("http://arxiv.org/abs/2406.00003v1")
        );
        assert_eq!(
            first.pdf.as_deref(),
            Some("http://arxiv.org/pdf/2406.00003v1")
        );
        assert_eq!(first.utctime, fetched);
        assert!(!first.local_authors);
    }

    #[test]
    fn test_parse_feed_serials_and_kinds() {
        let listings = parse_feed(FEED, &home(), Utc::now()).unwrap();
        let summary: Vec<(&str, i64, ArticleKind)> = listings
            .iter()
            .map(|l| (l.arxiv_id.as_str(), l.day_serial, l.kind))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("2406.00003", 1, ArticleKind::Astronomy),
                ("2406.00002", 1, ArticleKind::Crosslist),
                ("2406.00001", 2, ArticleKind::Astronomy),
            ]
        );
        assert!(listings[2].link.is_none());
        assert!(listings[2].comments.is_none());
    }

    #[test]
    fn test_parse_empty_feed() {
        let xml = r#"<feed xmlns="http://www.w3.org/2005/Atom"><title>Empty</title></feed>"#;
        assert!(parse_feed(xml, &home(), Utc::now()).unwrap().is_empty());
    }

    #[test]
    fn test_parse_malformed_feed() {
        let err = parse_feed("<feed><entry>", &home(), Utc::now()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ExternalService);
    }

    #[test]
    fn test_short_id() {
        assert_eq!(
            short_id("http://arxiv.org/abs/2406.01234v12").as_deref(),
            Some("2406.01234")
        );
        assert_eq!(
            short_id("http://arxiv.org/abs/astro-ph/0601001v1").as_deref(),
            Some("astro-ph/0601001")
        );
        assert_eq!(
            short_id("http://arxiv.org/abs/2406.01234").as_deref(),
            Some("2406.01234")
        );
        assert_eq!(short_id("not-an-id"), None);
    }

    #[test]
    fn test_query_url() {
        let client = ArxivClient::new(&ArxivConfig {
            categories: vec!["astro-ph.GA".to_string(), "astro-ph.CO".to_string()],
            max_results: 50,
            ..ArxivConfig::default()
        })
        .unwrap();
        let url = client.query_url().unwrap();
        let pairs: HashMap<String, String> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs["search_query"], "cat:astro-ph.GA OR cat:astro-ph.CO");
        assert_eq!(pairs["max_results"], "50");
        assert_eq!(pairs["sortOrder"], "descending");
    }
}
