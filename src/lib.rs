pub mod attachment;
pub mod config;
pub mod extract;
pub mod hash_cache;
pub mod index_scraper;
pub mod pipeline;
pub mod record;
pub mod table;

mod extract_error;
mod pdf_layout;
mod ratelimit;
mod requests;
mod scraping_context;
mod text_manipulators;

pub use extract_error::ExtractError;
pub use pipeline::{RunOutcome, run};
pub use record::HospitalizationRecord;
pub use requests::RequestClient;
pub use scraping_context::ScrapingContext;
