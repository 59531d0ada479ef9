use axum::extract::State;

use crate::AppState;

/// Plain-text landing response describing how to upload
#[tracing::instrument(skip_all)]
pub async fn landing(State(state): State<AppState>) -> String {
    format!(
        "imghost is running. POST a multipart form with a `{}` file field to /upload; files are served under {}/.",
        state.config.uploads.field_name,
        state.config.storage.mount_path()
    )
}
