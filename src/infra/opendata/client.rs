use async_trait::async_trait;
use tracing::{info, warn};

use fuel_prices::error::Result;
use fuel_prices::fetch::{HttpClient, fetch_bytes};
use fuel_prices::services::{BulkExportSource, ExportOutcome};

use super::datasets::DatasetCatalog;

/// Downloads monthly exports from the open data portal.
pub struct OpenDataClient<C> {
    client: C,
    datasets: DatasetCatalog,
}

impl<C: HttpClient> OpenDataClient<C> {
    pub fn new(client: C, datasets: DatasetCatalog) -> Self {
        Self { client, datasets }
    }
}

#[async_trait]
impl<C: HttpClient> BulkExportSource for OpenDataClient<C> {
    #[tracing::instrument(skip(self))]
    async fn fetch_bulk_export(&self, year: i32, month: u32) -> Result<ExportOutcome> {
        let Some(dataset) = self.datasets.get(year, month) else {
            return Ok(ExportOutcome::NoDataset);
        };

        info!(url = %dataset.url, "Downloading export");
        let mut body = fetch_bytes(&self.client, &dataset.url).await?;

        // The portal sometimes answers with a landing page instead of the file.
        if looks_like_html(&body) {
            warn!("Got an HTML page instead of CSV, following its download link");
            if let Some(link) = find_csv_link(&String::from_utf8_lossy(&body)) {
                info!(url = %link, "Found CSV link");
                body = fetch_bytes(&self.client, &link).await?;
            }
        }

        Ok(ExportOutcome::Downloaded {
            body,
            profile: dataset.profile.clone(),
        })
    }
}

fn looks_like_html(body: &[u8]) -> bool {
    let head = &body[..body.len().min(512)];
    let head = String::from_utf8_lossy(head).to_ascii_lowercase();
    let head = head.trim_start_matches('\u{feff}').trim_start();
    head.starts_with("<!doctype html") || head.starts_with("<html")
}

/// First `href="…"` target that points at a CSV file.
fn find_csv_link(html: &str) -> Option<String> {
    html.split("href=\"")
        .skip(1)
        .filter_map(|rest| rest.split('"').next())
        .find(|target| target.contains(".csv"))
        .map(|target| target.replace("&amp;", "&"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_detection() {
        assert!(looks_like_html(b"\n  <!DOCTYPE html><html></html>"));
        assert!(looks_like_html(b"<html lang=\"en\">"));
        assert!(!looks_like_html(b"\xef\xbb\xbfSiteId,Site_Name\n1,A\n"));
        assert!(!looks_like_html(b""));
    }

    #[test]
    fn test_find_csv_link() {
        let html = r#"<a href="/about">About</a>
            <a class="btn" href="https://data.qld.gov.au/download/prices.csv?x=1&amp;y=2">Download</a>
            <a href="https://other.example/second.csv">Other</a>"#;
        assert_eq!(
            find_csv_link(html).as_deref(),
            Some("https://data.qld.gov.au/download/prices.csv?x=1&y=2")
        );
        assert_eq!(find_csv_link("<a href=\"/about\">x</a>"), None);
    }

    #[tokio::test]
    async fn test_unknown_period_is_no_dataset() {
        let http = fuel_prices::fetch::BasicClient::new(std::time::Duration::from_secs(1)).unwrap();
        let client = OpenDataClient::new(http, DatasetCatalog::default());
        assert_eq!(
            client.fetch_bulk_export(2019, 1).await.unwrap(),
            ExportOutcome::NoDataset
        );
    }
}
