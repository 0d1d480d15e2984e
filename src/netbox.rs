//! Source-of-truth inventory client. Fetches records, nameservers, and zones
//! through the paginated REST API and denormalizes zone/view details onto
//! each record so the engine works from flat snapshots.

use std::collections::HashMap;
use std::time::Duration;

use log::{debug, warn};
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::error::Error;
use crate::model::{InventoryRecord, Nameserver, Zone};

const PAGE_SIZE: usize = 50;

const RECORDS_PATH: &str = "/api/plugins/netbox-dns/records/";
const NAMESERVERS_PATH: &str = "/api/plugins/netbox-dns/nameservers/";
const ZONES_PATH: &str = "/api/plugins/netbox-dns/zones/";

#[derive(Deserialize)]
struct Page<T> {
    #[allow(dead_code)]
    count: u64,
    results: Vec<T>,
}

pub struct NetboxClient {
    base_url: String,
    token: String,
    client: Client,
}

impl NetboxClient {
    pub fn new(base_url: &str, token: &str) -> Result<Self, Error> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            client,
        })
    }

    async fn get_page<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(String, String)],
        offset: usize,
    ) -> Result<Page<T>, Error> {
        let url = format!("{}{}", self.base_url, path);
        debug!("requesting inventory API {url} (offset {offset})");
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Token {}", self.token))
            .query(params)
            .query(&[
                ("limit", PAGE_SIZE.to_string()),
                ("offset", offset.to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api(format!("{path} returned {status}: {body}")));
        }
        Ok(response.json().await?)
    }

    async fn get_all<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(String, String)],
    ) -> Result<Vec<T>, Error> {
        let mut results = Vec::new();
        let mut offset = 0;
        loop {
            let page: Page<T> = self.get_page(path, params, offset).await?;
            let fetched = page.results.len();
            results.extend(page.results);
            if fetched < PAGE_SIZE {
                break;
            }
            offset += PAGE_SIZE;
        }
        Ok(results)
    }

    /// All inventory records, optionally narrowed server-side by zone and
    /// view. Zone and view names are flattened onto each record.
    pub async fn records(
        &self,
        zone_filter: Option<&str>,
        view_filter: Option<&str>,
    ) -> Result<Vec<InventoryRecord>, Error> {
        let mut params = Vec::new();
        if let Some(zone) = zone_filter {
            params.push(("zone__name".to_string(), zone.to_string()));
        }
        if let Some(view) = view_filter {
            params.push(("zone__view__name".to_string(), view.to_string()));
        }
        let mut records: Vec<InventoryRecord> = self.get_all(RECORDS_PATH, &params).await?;
        for record in &mut records {
            match &record.zone {
                Some(zone) => {
                    record.zone_name = zone.name.clone();
                    record.zone_default_ttl = zone.default_ttl;
                    if let Some(view) = &zone.view {
                        record.view_name = view.name.clone();
                    }
                }
                None => warn!("record {} ({}) has no zone", record.id, record.fqdn),
            }
        }
        Ok(records)
    }

    pub async fn nameservers(&self, name_filter: Option<&str>) -> Result<Vec<Nameserver>, Error> {
        let mut params = Vec::new();
        if let Some(name) = name_filter {
            params.push(("name".to_string(), name.to_string()));
        }
        self.get_all(NAMESERVERS_PATH, &params).await
    }

    pub async fn zones(&self) -> Result<HashMap<String, Zone>, Error> {
        let zones: Vec<Zone> = self.get_all(ZONES_PATH, &[]).await?;
        Ok(zones.into_iter().map(|z| (z.name.clone(), z)).collect())
    }
}
