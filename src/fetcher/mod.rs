pub mod http_fetcher;

use async_trait::async_trait;

use crate::app::Result;

pub use http_fetcher::HttpFetcher;

#[async_trait]
pub trait Fetcher {
    /// Fetch `url` and return the body as text. Non-2xx responses are errors.
    async fn fetch(&self, url: &str) -> Result<String>;
}
