use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::repo::{Activity, ActivityEntry};
use crate::pagination::{PageRequest, Pagination};

#[derive(Debug, Deserialize)]
pub struct ActivityListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub action: Option<String>,
}

impl ActivityListQuery {
    pub fn page_request(&self) -> PageRequest {
        PageRequest::new(self.page, self.limit)
    }
}

#[derive(Debug, Serialize)]
pub struct ActivityListResponse {
    pub activities: Vec<ActivityEntry>,
    pub pagination: Pagination,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogActivityRequest {
    pub action: Option<String>,
    pub image_id: Option<Uuid>,
    pub additional_data: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct LogActivityResponse {
    pub success: bool,
    pub activity: Activity,
}

#[derive(Debug, Serialize)]
pub struct ProbeResponse {
    pub success: bool,
    pub message: String,
    pub count: i64,
}
