//! Feed parsing, identity extraction and rendered detail-page scraping.

pub mod chromium;
pub mod detail;
pub mod feed;
pub mod identity;
pub mod profile;
pub mod render;

pub use chromium::{find_chromium, ChromiumRenderer};
pub use detail::{extract_detail, extract_fields, DetailScraper, ScrapeError, ScrapedPage};
pub use feed::{parse_feed, FeedParseError};
pub use identity::{basic_from_item, extract_identity, ProcedureIdentity};
pub use profile::{CompiledProfile, ExtractionProfile, FieldRule, ProfileError};
pub use render::{
    FixtureRenderer, PageRenderer, RenderError, RenderPlan, RenderSettings, SettleMode,
    SettleStrategy,
};

pub const CRATE_NAME: &str = "dre-adapters";
