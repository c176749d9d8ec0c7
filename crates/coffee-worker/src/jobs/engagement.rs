//! User writes: votes, presenters and reservations.

use async_trait::async_trait;
use chrono::NaiveDate;

use coffee_core::error::AppError;
use coffee_core::result::AppResult;
use coffee_entity::listing::{NameList, Roster, RosterChange, Vote};

use crate::context::WorkerContext;
use crate::task::WorkerTask;

/// Record one user's vote on a paper. Resolves to the new vote count.
#[derive(Debug, Clone)]
pub struct VoteTask {
    pub arxiv_id: String,
    pub user: String,
    pub vote: Vote,
}

#[async_trait]
impl WorkerTask for VoteTask {
    type Output = i64;

    fn name(&self) -> &'static str {
        "vote"
    }

    async fn run(self, ctx: &mut WorkerContext) -> AppResult<i64> {
        ctx.listings()?
            .record_vote(&self.arxiv_id, &self.user, self.vote)
            .await?
            .ok_or_else(|| {
                AppError::not_found(format!("No votable paper with id '{}'", self.arxiv_id))
            })
    }
}

/// The papers on a date that a user voted for.
#[derive(Debug, Clone)]
pub struct UserVotesTask {
    pub date: NaiveDate,
    pub user: String,
}

#[async_trait]
impl WorkerTask for UserVotesTask {
    type Output = Vec<String>;

    fn name(&self) -> &'static str {
        "user-votes"
    }

    async fn run(self, ctx: &mut WorkerContext) -> AppResult<Vec<String>> {
        ctx.listings()?.user_votes(self.date, &self.user).await
    }
}

/// Add a user to, or remove them from, a paper's presenters or reservers.
/// Resolves to the updated roster.
#[derive(Debug, Clone)]
pub struct RosterTask {
    pub arxiv_id: String,
    pub roster: Roster,
    pub user: String,
    pub change: RosterChange,
}

#[async_trait]
impl WorkerTask for RosterTask {
    type Output = NameList;

    fn name(&self) -> &'static str {
        self.roster.column()
    }

    async fn run(self, ctx: &mut WorkerContext) -> AppResult<NameList> {
        ctx.listings()?
            .modify_roster(&self.arxiv_id, self.roster, &self.user, self.change)
            .await?
            .ok_or_else(|| AppError::not_found(format!("No paper with id '{}'", self.arxiv_id)))
    }
}
