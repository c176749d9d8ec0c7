//! Listing entity model.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::kind::ArticleKind;

/// Natural identity of a listing: one arXiv id on one listing date.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ListingKey {
    /// Listing date (UTC).
    pub utcdate: NaiveDate,
    /// arXiv identifier without version suffix.
    pub arxiv_id: String,
}

/// A stored preprint listing row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Listing {
    /// Row identifier.
    pub id: i64,
    /// When the listing was fetched.
    pub utctime: DateTime<Utc>,
    /// Listing date (UTC).
    pub utcdate: NaiveDate,
    /// 1-based position within the day's listing.
    pub day_serial: i64,
    /// Paper title.
    pub title: String,
    /// `astronomy` or `crosslist`.
    pub article_type: String,
    /// arXiv identifier without version suffix.
    pub arxiv_id: String,
    /// Comma-separated author names.
    pub authors: String,
    /// Author comments (page counts, journal refs).
    pub comments: Option<String>,
    /// Abstract text.
    #[sqlx(rename = "abstract")]
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    /// Abstract page URL.
    pub link: Option<String>,
    /// PDF URL.
    pub pdf: Option<String>,
    /// Net vote count.
    pub nvotes: i64,
    /// Comma-separated voter names.
    pub voters: String,
    /// Comma-separated presenter names.
    pub presenters: String,
    /// Comma-separated names of users who reserved the paper.
    pub reservers: String,
    /// Whether at least one author is a local author.
    pub local_authors: bool,
}

impl Listing {
    /// Parse the stored article type.
    pub fn kind(&self) -> Result<ArticleKind, coffee_core::AppError> {
        self.article_type.parse()
    }

    /// Split the stored author column into names.
    pub fn author_list(&self) -> Vec<&str> {
        split_names(&self.authors)
    }

    /// Natural key of this row.
    pub fn key(&self) -> ListingKey {
        ListingKey {
            utcdate: self.utcdate,
            arxiv_id: self.arxiv_id.clone(),
        }
    }
}

/// A listing fetched from upstream, not yet stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewListing {
    /// When the listing was fetched.
    pub utctime: DateTime<Utc>,
    /// Listing date (UTC).
    pub utcdate: NaiveDate,
    /// 1-based position within the day's listing.
    pub day_serial: i64,
    /// Paper title.
    pub title: String,
    /// Home listing or cross-list.
    pub kind: ArticleKind,
    /// arXiv identifier without version suffix.
    pub arxiv_id: String,
    /// Author names in listing order.
    pub authors: Vec<String>,
    /// Author comments.
    pub comments: Option<String>,
    /// Abstract text.
    pub abstract_text: Option<String>,
    /// Abstract page URL.
    pub link: Option<String>,
    /// PDF URL.
    pub pdf: Option<String>,
    /// Whether at least one author is a local author.
    pub local_authors: bool,
}

impl NewListing {
    /// Natural key of this entry.
    pub fn key(&self) -> ListingKey {
        ListingKey {
            utcdate: self.utcdate,
            arxiv_id: self.arxiv_id.clone(),
        }
    }
}

/// One day's papers split the way the voting page shows them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListingGroups {
    /// Papers with a local author, most votes first.
    pub local: Vec<Listing>,
    /// Papers with at least one vote, most votes first.
    pub voted: Vec<Listing>,
    /// Everything in neither group, in listing order.
    pub other: Vec<Listing>,
}

impl ListingGroups {
    /// Group one day's rows.
    ///
    /// A local paper with votes appears in both `local` and `voted`. Unless
    /// `include_crosslists` is set, cross-listed papers are left out
    /// entirely; when they are kept they sort after the home listing in
    /// `other`.
    pub fn from_day(mut rows: Vec<Listing>, include_crosslists: bool) -> Self {
        if !include_crosslists {
            rows.retain(|row| row.article_type == ArticleKind::Astronomy.as_str());
        }
        rows.sort_by(|a, b| {
            (a.article_type.as_str(), a.day_serial, a.id)
                .cmp(&(b.article_type.as_str(), b.day_serial, b.id))
        });

        let by_votes = |rows: Vec<Listing>| {
            let mut rows = rows;
            rows.sort_by(|a, b| b.nvotes.cmp(&a.nvotes));
            rows
        };

        let local = by_votes(rows.iter().filter(|r| r.local_authors).cloned().collect());
        let voted = by_votes(rows.iter().filter(|r| r.nvotes > 0).cloned().collect());
        let other = rows
            .into_iter()
            .filter(|r| !r.local_authors && r.nvotes <= 0)
            .collect();

        Self { local, voted, other }
    }

    /// Number of distinct papers across the groups.
    pub fn len(&self) -> usize {
        self.local.len()
            + self.voted.iter().filter(|r| !r.local_authors).count()
            + self.other.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Per-date listing count for the archive index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ArchiveDay {
    /// Listing date (UTC).
    pub utcdate: NaiveDate,
    /// Number of papers listed on that date.
    pub count: i64,
}

fn split_names(joined: &str) -> Vec<&str> {
    joined
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .collect()
}
