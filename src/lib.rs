//! Astro-Coffee server process.

pub mod supervisor;

pub use supervisor::Supervisor;
