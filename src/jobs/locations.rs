//! Business Profile location listing.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::endpoint::{Endpoint, EndpointConfig};
use crate::error::{HarvestError, Result};
use crate::harvest::{CollectionTask, CyclePlan};
use crate::normalize::{LocationNormalizer, NormalizeContext};

pub const LOCATIONS_URL: &str =
    "https://mybusinessbusinessinformation.googleapis.com/v1/{account}/locations";

fn default_table() -> String {
    "locations".to_string()
}

fn default_read_mask() -> String {
    "name,title,storeCode,storefrontAddress".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationsJob {
    /// Account resource names, e.g. `accounts/1234567890`.
    pub accounts: Vec<String>,
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default = "default_read_mask")]
    pub read_mask: String,
}

impl LocationsJob {
    pub fn validate(&self) -> Result<()> {
        if self.accounts.is_empty() {
            return Err(HarvestError::Config("locations job needs at least one account".into()));
        }
        Ok(())
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::google(LOCATIONS_URL, "locations")
            .page_size(100)
            .param("readMask", &self.read_mask)
    }

    pub fn plan(&self, job: &str, overrides: Option<&EndpointConfig>) -> Result<Vec<CyclePlan>> {
        let endpoint = self.endpoint().with_overrides(overrides)?;

        let tasks = self
            .accounts
            .iter()
            .map(|account| {
                let context = NormalizeContext::new().with("account", account.as_str());
                Ok(CollectionTask {
                    collection: endpoint.collection(&format!("locations {}", account), &context)?,
                    context,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(vec![CyclePlan::new(
            job,
            self.table.as_str(),
            Arc::new(LocationNormalizer),
            tasks,
        )])
    }
}
