use crate::AppState;
use crate::api::models::uploads::UploadResponse;
use crate::config::ResponseFormat;
use crate::errors::{Error, Result};
use crate::storage::{StoredFile, naming::extension_of};
use crate::urls::PublicOrigin;
use axum::{
    Json,
    extract::{Multipart, State},
    http::{HeaderMap, StatusCode, Uri},
    response::{Html, IntoResponse, Response},
};
use mime::Mime;

#[utoipa::path(
    post,
    path = "/upload",
    tag = "uploads",
    summary = "Upload image",
    description = "Store a single file sent under the `image` multipart field and return the URL it is served from.",
    request_body(
        content_type = "multipart/form-data",
        description = "One file under the `image` field"
    ),
    responses(
        (status = 200, description = "File stored", body = UploadResponse),
        (status = 400, description = "No file uploaded, or malformed request"),
        (status = 413, description = "Payload too large"),
        (status = 415, description = "Content type not allowed"),
        (status = 500, description = "File could not be written")
    )
)]
#[tracing::instrument(skip_all)]
pub async fn upload_image(State(state): State<AppState>, uri: Uri, headers: HeaderMap, mut multipart: Multipart) -> Result<Response> {
    let uploads = &state.config.uploads;

    // Resolve the public origin before touching storage so a bad Host header never leaves an
    // orphaned file behind
    let origin = PublicOrigin::resolve(
        &uri,
        &headers,
        uploads.trust_forwarded_headers,
        &state.config.fallback_public_host(),
    )?;

    let mut stored: Option<StoredFile> = None;
    let mut saw_part = false;

    loop {
        let next = match multipart.next_field().await {
            Ok(next) => next,
            // A body with no parts at all fails to parse instead of yielding zero fields
            Err(e) if !saw_part && e.status() == StatusCode::BAD_REQUEST => {
                tracing::debug!(error = %e, "Multipart body carries no parts");
                return Err(Error::NoFileSupplied);
            }
            Err(e) => return Err(e.into()),
        };
        let Some(mut field) = next else {
            break;
        };
        saw_part = true;

        if field.name() != Some(uploads.field_name.as_str()) {
            continue;
        }

        // A part without a filename parameter is a text field, not a file
        let Some(original_name) = field.file_name().map(str::to_string) else {
            tracing::debug!("Ignoring non-file part under the upload field");
            continue;
        };

        if stored.is_some() {
            tracing::debug!(original_name = %original_name, "Ignoring additional file part");
            continue;
        }

        let declared_type = field.content_type().map(str::to_string);
        let first_chunk = field.chunk().await?;

        // Browsers submit an empty, nameless part for a file input nothing was picked for
        if original_name.is_empty() && first_chunk.as_ref().is_none_or(|chunk| chunk.is_empty()) {
            tracing::debug!("Ignoring empty file part");
            continue;
        }

        let content_type = effective_content_type(declared_type.as_deref(), &original_name);
        if !uploads.accepts(&content_type) {
            return Err(Error::UnsupportedMediaType {
                content_type: content_type.essence_str().to_string(),
            });
        }

        // The stored extension decides the type the file is served with later, so it has to pass
        // the allow list as well
        if let Some(served_type) = served_content_type(&original_name)
            && !uploads.accepts(&served_type)
        {
            tracing::info!(
                original_name = %original_name,
                declared_type = %content_type,
                served_type = %served_type,
                "Extension does not match an allowed content type"
            );
            return Err(Error::UnsupportedMediaType {
                content_type: served_type.essence_str().to_string(),
            });
        }

        let mut pending = state.storage.create(&original_name).await?;

        tracing::info!(
            original_name = %original_name,
            generated_name = %pending.generated_name(),
            content_type = %content_type,
            "Starting upload stream"
        );

        // Dropping `pending` on any early return below removes the partial file
        let mut next_chunk = first_chunk;
        while let Some(chunk) = next_chunk {
            if pending.size_bytes() + chunk.len() as u64 > uploads.max_file_size {
                tracing::warn!(
                    generated_name = %pending.generated_name(),
                    max_file_size = uploads.max_file_size,
                    "File size limit exceeded, aborting upload"
                );
                return Err(Error::PayloadTooLarge {
                    limit: uploads.max_file_size,
                });
            }

            pending.write_chunk(&chunk).await?;
            next_chunk = field.chunk().await?;
        }

        stored = Some(pending.commit().await?);
    }

    let stored = stored.ok_or(Error::NoFileSupplied)?;
    let image_url = origin.file_url(&state.config.storage.mount_path(), &stored.generated_name).to_string();

    tracing::info!(
        generated_name = %stored.generated_name,
        size_bytes = stored.size_bytes,
        image_url = %image_url,
        "File uploaded successfully"
    );

    Ok(match uploads.response_format {
        ResponseFormat::Json => Json(UploadResponse { image_url }).into_response(),
        ResponseFormat::Html => Html(html_snippet(&image_url)).into_response(),
    })
}

/// The declared part type, unless it is missing or the generic `application/octet-stream`, in
/// which case the type is guessed from the filename
fn effective_content_type(declared: Option<&str>, original_name: &str) -> Mime {
    declared
        .and_then(|declared| declared.parse::<Mime>().ok())
        .filter(|declared| *declared != mime::APPLICATION_OCTET_STREAM)
        .unwrap_or_else(|| mime_guess::from_path(original_name).first_or_octet_stream())
}

/// Type the static file server will send for the stored name, if its extension is known
fn served_content_type(original_name: &str) -> Option<Mime> {
    let extension = extension_of(original_name).trim_start_matches('.');
    if extension.is_empty() {
        return None;
    }
    mime_guess::from_ext(extension).first()
}

fn html_snippet(image_url: &str) -> String {
    let escaped = escape_html(image_url);
    format!("<p>File uploaded successfully: <a href=\"{escaped}\">{escaped}</a></p>")
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}
