pub mod catalog;
pub mod commit;
pub mod config;
pub mod db;
pub mod retry;

pub use catalog::{CatalogClient, Course, PageFetcher, ScrapePipeline};
pub use commit::{CommitQueue, CommitSummary};
pub use config::{ScraperConfig, StorageConfig};
pub use db::{CourseDbManager, CourseStore, MemoryStore};
