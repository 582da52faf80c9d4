//! The scrape pipeline: discover detail pages, then fetch and parse them one
//! at a time.
//!
//! The pipeline does no work until the consumer asks for the next course, so
//! a slow consumer naturally throttles it. Pages are fetched strictly one
//! after another.

use super::assemble::CoursePageParser;
use super::client::PageFetcher;
use super::discover::discover_course_links;
use super::error::ScrapeError;
use super::types::Course;
use crate::config::ScraperConfig;
use chrono::Utc;
use futures::Stream;
use std::collections::VecDeque;
use tracing::{error, info, warn};
use url::Url;

/// Where the pipeline is in its run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineState {
    /// The search page has not been fetched yet
    Discovering,
    /// Detail pages remain to be fetched
    Fetching { remaining: VecDeque<Url> },
    /// Every URL has been consumed
    Done,
}

/// Counters for one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub discovered: usize,
    pub scraped: usize,
    pub transport_failures: usize,
    pub parse_failures: usize,
    /// Sections dropped from otherwise valid courses
    pub dropped_sections: usize,
}

pub struct ScrapePipeline<F> {
    fetcher: F,
    parser: CoursePageParser,
    config: ScraperConfig,
    state: PipelineState,
    stats: PipelineStats,
}

impl<F: PageFetcher> ScrapePipeline<F> {
    /// Creates a pipeline in the `Discovering` state.
    pub fn new(fetcher: F, config: ScraperConfig) -> Result<Self, ScrapeError> {
        Ok(Self {
            fetcher,
            parser: CoursePageParser::new(&config.selectors)?,
            config,
            state: PipelineState::Discovering,
            stats: PipelineStats::default(),
        })
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    /// Produces the next course, or `Ok(None)` once every URL is consumed.
    ///
    /// Only a failure to discover the detail pages is returned as an error. A
    /// page that fails to fetch or parse is logged and skipped.
    pub async fn next_course(&mut self) -> Result<Option<Course>, ScrapeError> {
        loop {
            match &mut self.state {
                PipelineState::Discovering => {
                    let remaining = self.discover().await?;
                    self.state = PipelineState::Fetching { remaining };
                }
                PipelineState::Fetching { remaining } => {
                    let Some(url) = remaining.pop_front() else {
                        info!(stats = ?self.stats, "Catalog run complete");
                        self.state = PipelineState::Done;
                        continue;
                    };
                    let left = remaining.len();

                    if let Some(course) = self.scrape_page(&url, left).await {
                        return Ok(Some(course));
                    }
                }
                PipelineState::Done => return Ok(None),
            }
        }
    }

    /// Turns the pipeline into a stream of courses.
    pub fn into_stream(self) -> impl Stream<Item = Result<Course, ScrapeError>> {
        futures::stream::unfold(Some(self), |pipeline| async move {
            let Some(mut pipeline) = pipeline else {
                return None;
            };
            match pipeline.next_course().await {
                Ok(Some(course)) => Some((Ok(course), Some(pipeline))),
                Ok(None) => None,
                // Discovery failed; end the stream after reporting it
                Err(e) => Some((Err(e), None)),
            }
        })
    }

    async fn discover(&mut self) -> Result<VecDeque<Url>, ScrapeError> {
        let base = Url::parse(&self.config.catalog_url)?;
        let search_url = base.join(&self.config.search_path)?;
        info!(url = %search_url, "Discovering course pages");

        let html = self.fetcher.fetch(&search_url).await?;
        let links = discover_course_links(
            &html,
            &base,
            &self.config.selectors,
            &self.config.columns_param,
        )?;

        self.stats.discovered = links.len();
        info!(count = links.len(), "Discovered course pages");
        Ok(links.into_iter().collect())
    }

    async fn scrape_page(&mut self, url: &Url, left: usize) -> Option<Course> {
        info!(
            url = %url,
            scraped = self.stats.scraped,
            remaining = left,
            "Scraping course page"
        );

        let html = match self.fetcher.fetch(url).await {
            Ok(html) => html,
            Err(e) => {
                self.stats.transport_failures += 1;
                error!(url = %url, error = %e, "Skipping page after fetch failure");
                return None;
            }
        };

        match self.parser.parse_course_html(&html, Utc::now()) {
            Ok(parsed) => {
                for dropped in &parsed.dropped {
                    warn!(
                        url = %url,
                        course = %parsed.course.identity(),
                        error = %dropped,
                        "Dropped section"
                    );
                }
                self.stats.dropped_sections += parsed.dropped.len();
                self.stats.scraped += 1;
                Some(parsed.course)
            }
            Err(source) => {
                self.stats.parse_failures += 1;
                let e = ScrapeError::Parse {
                    url: url.to_string(),
                    source,
                };
                warn!(error = %e, "Skipping unparseable page");
                None
            }
        }
    }
}
