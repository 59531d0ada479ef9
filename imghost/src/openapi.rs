//! OpenAPI document for the upload API, served as JSON at `/api-docs/openapi.json`.

use utoipa::OpenApi;

use crate::api;

#[derive(OpenApi)]
#[openapi(
    paths(api::handlers::uploads::upload_image),
    components(schemas(api::models::uploads::UploadResponse)),
    tags(
        (name = "uploads", description = "Accept image uploads and hand back their public URL. Stored files are served read-only under the configured mount prefix.")
    ),
    info(
        title = "imghost API",
        description = "Minimal self-hostable image host."
    )
)]
pub struct ApiDoc;
