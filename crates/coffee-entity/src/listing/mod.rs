//! Preprint listing domain entities.

pub mod engagement;
pub mod kind;
pub mod model;

pub use engagement::{NameList, Roster, RosterChange, Vote};
pub use kind::ArticleKind;
pub use model::{ArchiveDay, Listing, ListingGroups, ListingKey, NewListing};
