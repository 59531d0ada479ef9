use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Response body for a successful upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    /// Absolute URL the stored file can be fetched from
    #[schema(example = "http://localhost:3000/uploads/1718000000000-482913077.jpg")]
    pub image_url: String,
}
