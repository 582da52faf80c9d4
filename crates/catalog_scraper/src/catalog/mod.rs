/// Course catalog scraping module
mod assemble;
mod client;
mod discover;
mod error;
pub mod fields;
mod pipeline;
pub mod table;
mod types;

pub use assemble::{assemble_section, CoursePageParser, ParsedPage};
pub use client::{CatalogClient, PageFetcher};
pub use discover::discover_course_links;
pub use error::{ParseError, ScrapeError};
pub use pipeline::{PipelineState, PipelineStats, ScrapePipeline};
pub use types::*;
