use crate::{
    config::{ReportDateExtractor, ScrapingConfig},
    requests::RequestClient,
};

pub struct ScrapingContext {
    pub scraping_config: ScrapingConfig,
    pub report_date_extractor: ReportDateExtractor,
    pub request_client: RequestClient,
}

impl ScrapingContext {
    pub fn new() -> anyhow::Result<Self> {
        let scraping_config = ScrapingConfig::new()?;
        Self::with_config(scraping_config)
    }

    pub fn with_config(scraping_config: ScrapingConfig) -> anyhow::Result<Self> {
        let report_date_extractor = ReportDateExtractor::new()?;
        let request_client = RequestClient::new()?;
        Ok(ScrapingContext {
            scraping_config,
            report_date_extractor,
            request_client,
        })
    }
}
