use serde::{Deserialize, Serialize};
use snaplink_shortener::OwnerLinks;

use super::LinkStatsResponse;

#[derive(Debug, Serialize)]
pub struct OwnerLinksResponse {
    pub links: Vec<LinkStatsResponse>,
    pub total_clicks: u64,
}

impl From<OwnerLinks> for OwnerLinksResponse {
    fn from(report: OwnerLinks) -> Self {
        Self {
            links: report.links.into_iter().map(Into::into).collect(),
            total_clicks: report.total_clicks,
        }
    }
}

/// How long links must have gone unused; defaults to one hour.
#[derive(Debug, Deserialize)]
pub struct UnusedLinksQuery {
    #[serde(default)]
    pub days: u32,
    #[serde(default = "default_hours")]
    pub hours: u32,
}

fn default_hours() -> u32 {
    1
}

#[derive(Debug, Serialize)]
pub struct RemovedResponse {
    pub removed: usize,
}
