//! Listing repository implementation.

use std::collections::{BTreeSet, HashSet};

use chrono::NaiveDate;
use sqlx::{Connection, SqliteConnection};
use tracing::debug;

use coffee_core::error::{AppError, ErrorKind};
use coffee_core::result::AppResult;
use coffee_entity::listing::{
    ArchiveDay, Listing, ListingKey, NameList, NewListing, Roster, RosterChange, Vote,
};

use crate::metadata::SchemaMetadata;

const TABLE: &str = "arxiv";

/// Outcome of a batch insert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertSummary {
    /// Rows written.
    pub inserted: usize,
    /// Entries already present (or duplicated within the batch).
    pub skipped: usize,
    /// Rows written that carry the local-author flag.
    pub inserted_local: usize,
}

/// Repository for preprint listings.
#[derive(Debug)]
pub struct ListingRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> ListingRepository<'c> {
    /// Create a listing repository over a worker's connection.
    pub fn new(conn: &'c mut SqliteConnection, metadata: &SchemaMetadata) -> AppResult<Self> {
        metadata.require_columns(TABLE, &["nvotes", "voters", "presenters", "reservers"])?;
        Ok(Self { conn })
    }

    /// Most recent listing date stored, if any.
    pub async fn latest_date(&mut self) -> AppResult<Option<NaiveDate>> {
        sqlx::query_scalar::<_, NaiveDate>(
            "SELECT utcdate FROM arxiv ORDER BY utcdate DESC LIMIT 1",
        )
        .fetch_optional(&mut *self.conn)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to find latest listing date", e)
        })
    }

    /// Total number of stored listings.
    pub async fn count(&mut self) -> AppResult<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM arxiv")
            .fetch_one(&mut *self.conn)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to count listings", e))
    }

    /// All listings for one date, in listing order.
    pub async fn find_by_date(&mut self, date: NaiveDate) -> AppResult<Vec<Listing>> {
        sqlx::query_as::<_, Listing>(
            "SELECT * FROM arxiv WHERE utcdate = ?1 ORDER BY day_serial ASC, id ASC",
        )
        .bind(date)
        .fetch_all(&mut *self.conn)
        .await
        .map_err(|e| {
            AppError::with_source(
                ErrorKind::Database,
                format!("Failed to find listings for {date}"),
                e,
            )
        })
    }

    /// Per-date counts of home-listing papers, newest first.
    ///
    /// Cross-lists are not counted.
    pub async fn archive_index(&mut self) -> AppResult<Vec<ArchiveDay>> {
        sqlx::query_as::<_, ArchiveDay>(
            "SELECT utcdate, COUNT(*) AS count FROM arxiv WHERE article_type = 'astronomy' \
             GROUP BY utcdate ORDER BY utcdate DESC",
        )
        .fetch_all(&mut *self.conn)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to build archive index", e)
        })
    }

    /// Insert the entries whose `(utcdate, arxiv_id)` is not yet stored.
    ///
    /// Runs in a single transaction. Existing rows are never touched, so
    /// votes and reservations on them survive a re-ingest.
    pub async fn insert_new(&mut self, listings: &[NewListing]) -> AppResult<InsertSummary> {
        if listings.is_empty() {
            return Ok(InsertSummary::default());
        }

        let mut tx = self.conn.begin().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to begin transaction", e)
        })?;

        let dates: BTreeSet<NaiveDate> = listings.iter().map(|l| l.utcdate).collect();
        let mut existing: HashSet<ListingKey> = HashSet::new();
        for date in dates {
            let ids: Vec<String> =
                sqlx::query_scalar("SELECT arxiv_id FROM arxiv WHERE utcdate = ?1")
                    .bind(date)
                    .fetch_all(&mut *tx)
                    .await
                    .map_err(|e| {
                        AppError::with_source(
                            ErrorKind::Database,
                            format!("Failed to read stored ids for {date}"),
                            e,
                        )
                    })?;
            existing.extend(ids.into_iter().map(|arxiv_id| ListingKey {
                utcdate: date,
                arxiv_id,
            }));
        }

        let mut inserted = 0usize;
        let mut inserted_local = 0usize;
        for listing in listings.iter().filter(|l| !existing.contains(&l.key())) {
            let result = sqlx::query(
                "INSERT INTO arxiv (utctime, utcdate, day_serial, title, article_type, arxiv_id, \
                 authors, comments, abstract, link, pdf, local_authors) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12) \
                 ON CONFLICT (utcdate, arxiv_id) DO NOTHING",
            )
            .bind(listing.utctime)
            .bind(listing.utcdate)
            .bind(listing.day_serial)
            .bind(&listing.title)
            .bind(listing.kind.as_str())
            .bind(&listing.arxiv_id)
            .bind(listing.authors.join(", "))
            .bind(&listing.comments)
            .bind(&listing.abstract_text)
            .bind(&listing.link)
            .bind(&listing.pdf)
            .bind(listing.local_authors)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::with_source(
                    ErrorKind::Database,
                    format!("Failed to insert listing {}", listing.arxiv_id),
                    e,
                )
            })?;
            if result.rows_affected() > 0 {
                inserted += 1;
                if listing.local_authors {
                    inserted_local += 1;
                }
            }
        }

        tx.commit().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to commit listings", e)
        })?;

        let summary = InsertSummary {
            inserted,
            skipped: listings.len() - inserted,
            inserted_local,
        };
        debug!(
            inserted = summary.inserted,
            skipped = summary.skipped,
            "Stored new listings"
        );
        Ok(summary)
    }

    /// Record `user`'s vote on every home-listing row of `arxiv_id`.
    ///
    /// A user's up vote counts once and a down vote only retracts an earlier
    /// up vote, so repeating either is a no-op. Returns the paper's vote
    /// count on its latest listing date, or `None` when no home-listing row
    /// has that id.
    pub async fn record_vote(
        &mut self,
        arxiv_id: &str,
        user: &str,
        vote: Vote,
    ) -> AppResult<Option<i64>> {
        let user = user_name(user)?;
        let sql = match vote {
            Vote::Up => {
                "UPDATE arxiv SET nvotes = nvotes + 1, \
                 voters = CASE WHEN voters = '' THEN ?2 ELSE voters || ',' || ?2 END \
                 WHERE arxiv_id = ?1 AND article_type = 'astronomy' \
                 AND instr(',' || voters || ',', ',' || ?2 || ',') = 0"
            }
            Vote::Down => {
                "UPDATE arxiv SET nvotes = nvotes - 1, \
                 voters = trim(replace(',' || voters || ',', ',' || ?2 || ',', ','), ',') \
                 WHERE arxiv_id = ?1 AND article_type = 'astronomy' \
                 AND instr(',' || voters || ',', ',' || ?2 || ',') > 0"
            }
        };

        let changed = sqlx::query(sql)
            .bind(arxiv_id)
            .bind(user)
            .execute(&mut *self.conn)
            .await
            .map_err(|e| {
                AppError::with_source(
                    ErrorKind::Database,
                    format!("Failed to record vote on {arxiv_id}"),
                    e,
                )
            })?
            .rows_affected();
        debug!(arxiv_id, ?vote, changed, "Vote recorded");

        sqlx::query_scalar(
            "SELECT nvotes FROM arxiv WHERE arxiv_id = ?1 AND article_type = 'astronomy' \
             ORDER BY utcdate DESC LIMIT 1",
        )
        .bind(arxiv_id)
        .fetch_optional(&mut *self.conn)
        .await
        .map_err(|e| {
            AppError::with_source(
                ErrorKind::Database,
                format!("Failed to read votes for {arxiv_id}"),
                e,
            )
        })
    }

    /// arXiv ids on `date` that `user` has voted for, in listing order.
    pub async fn user_votes(&mut self, date: NaiveDate, user: &str) -> AppResult<Vec<String>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT arxiv_id, voters FROM arxiv \
             WHERE utcdate = ?1 AND nvotes > 0 AND article_type = 'astronomy' \
             ORDER BY day_serial ASC",
        )
        .bind(date)
        .fetch_all(&mut *self.conn)
        .await
        .map_err(|e| {
            AppError::with_source(
                ErrorKind::Database,
                format!("Failed to read votes for {date}"),
                e,
            )
        })?;

        Ok(rows
            .into_iter()
            .filter(|(_, voters)| NameList::parse(voters).contains(user))
            .map(|(arxiv_id, _)| arxiv_id)
            .collect())
    }

    /// Add `user` to, or remove them from, a paper's presenters or reservers.
    ///
    /// Applies to every row of `arxiv_id`. Returns the roster on the latest
    /// listing date, or `None` when no row has that id.
    pub async fn modify_roster(
        &mut self,
        arxiv_id: &str,
        roster: Roster,
        user: &str,
        change: RosterChange,
    ) -> AppResult<Option<NameList>> {
        let user = user_name(user)?;
        let column = roster.column();
        let sql = match change {
            RosterChange::Add => format!(
                "UPDATE arxiv SET {column} = \
                 CASE WHEN {column} = '' THEN ?2 ELSE {column} || ',' || ?2 END \
                 WHERE arxiv_id = ?1 AND instr(',' || {column} || ',', ',' || ?2 || ',') = 0"
            ),
            RosterChange::Remove => format!(
                "UPDATE arxiv SET {column} = \
                 trim(replace(',' || {column} || ',', ',' || ?2 || ',', ','), ',') \
                 WHERE arxiv_id = ?1 AND instr(',' || {column} || ',', ',' || ?2 || ',') > 0"
            ),
        };

        sqlx::query(&sql)
            .bind(arxiv_id)
            .bind(user)
            .execute(&mut *self.conn)
            .await
            .map_err(|e| {
                AppError::with_source(
                    ErrorKind::Database,
                    format!("Failed to update {roster} of {arxiv_id}"),
                    e,
                )
            })?;

        let stored: Option<String> = sqlx::query_scalar(&format!(
            "SELECT {column} FROM arxiv WHERE arxiv_id = ?1 ORDER BY utcdate DESC LIMIT 1"
        ))
        .bind(arxiv_id)
        .fetch_optional(&mut *self.conn)
        .await
        .map_err(|e| {
            AppError::with_source(
                ErrorKind::Database,
                format!("Failed to read {roster} of {arxiv_id}"),
                e,
            )
        })?;
        Ok(stored.as_deref().map(NameList::parse))
    }
}

/// Names are stored comma-joined, so they cannot be blank or contain commas.
fn user_name(user: &str) -> AppResult<&str> {
    let user = user.trim();
    if user.is_empty() || user.contains(',') {
        return Err(AppError::validation(format!("Invalid user name: '{user}'")));
    }
    Ok(user)
}
