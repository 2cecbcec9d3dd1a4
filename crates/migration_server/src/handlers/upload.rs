use std::path::PathBuf;

use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use futures_util::TryStreamExt;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use migration_context::MigrationStage;

use crate::error::{ApiError, Result};
use crate::state::AppState;

/// Drains every file field in `payload` into `dest_dir`, flattening any
/// folder structure the browser sent (webkitdirectory uploads carry
/// `/`-separated filenames) and returning the stored file names. Grounded
/// on `controllers/context/workspace.rs`'s upload handling in the teacher
/// repo's web_service crate.
async fn store_multipart_files(mut payload: Multipart, dest_dir: &std::path::Path) -> Result<Vec<String>> {
    std::fs::create_dir_all(dest_dir).map_err(|e| ApiError::Internal(e.to_string()))?;

    let mut stored = Vec::new();
    while let Some(mut field) = payload
        .try_next()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    {
        let original_name = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .unwrap_or("upload.bin")
            .to_string();
        let flat_name = original_name.replace(['/', '\\'], "__");
        let dest_path = dest_dir.join(&flat_name);

        let mut file = tokio::fs::File::create(&dest_path)
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?;

        while let Some(chunk) = field
            .try_next()
            .await
            .map_err(|e| ApiError::BadRequest(e.to_string()))?
        {
            file.write_all(&chunk)
                .await
                .map_err(|e| ApiError::Internal(e.to_string()))?;
        }
        file.flush().await.map_err(|e| ApiError::Internal(e.to_string()))?;
        stored.push(flat_name);
    }

    if stored.is_empty() {
        return Err(ApiError::BadRequest("no files in upload".to_string()));
    }
    Ok(stored)
}

pub async fn upload_chat_files(
    path: web::Path<String>,
    state: web::Data<AppState>,
    payload: Multipart,
) -> Result<HttpResponse> {
    let chat_id = path.into_inner();
    let dest_dir = PathBuf::from(&state.config.upload_dir).join(&chat_id);
    let stored = store_multipart_files(payload, &dest_dir).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "files": stored })))
}

pub async fn upload_ddl(
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
    payload: Multipart,
) -> Result<HttpResponse> {
    let run_id = path.into_inner();
    let run = state.get_run(run_id).await.ok_or(ApiError::RunNotFound(run_id))?;

    {
        let guard = run.lock().await;
        if guard.context.current_stage != MigrationStage::HumanReview
            || !guard.context.requires_human_intervention
        {
            return Err(ApiError::BadRequest(
                "run is not awaiting a DDL upload".to_string(),
            ));
        }
    }

    let dest_dir = PathBuf::from(&state.config.upload_dir)
        .join("scai")
        .join(run_id.to_string());
    let stored = store_multipart_files(payload, &dest_dir).await?;

    {
        let mut guard = run.lock().await;
        guard.context.ddl_upload_path = Some(dest_dir.join(&stored[0]));
    }

    Ok(HttpResponse::Ok().json(serde_json::json!({ "files": stored })))
}
