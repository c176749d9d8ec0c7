//! Tasks and scheduled jobs run on the worker pool.

pub mod authors;
pub mod engagement;
pub mod ingest;
pub mod listings;

pub use authors::LocalAuthorsTask;
pub use engagement::{RosterTask, UserVotesTask, VoteTask};
pub use ingest::{IngestJob, IngestReport, IngestTask};
pub use listings::{ArchiveIndexTask, DayListings, ListingsForDateTask};
