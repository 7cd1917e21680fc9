//! Package push, fetch and remove handlers

use crate::core::repo_db::RepoScope;
use crate::core::service::{PushRequest, RemoveRequest, RepoFile};
use crate::http::errors::{HttpError, HttpResult};
use crate::http::handlers::AppState;
use crate::http::models::headers;
use axum::{
    body::{Body, Bytes},
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::Response,
};
use chrono::Utc;
use tracing::{debug, info};

fn required_header<'a>(map: &'a HeaderMap, name: &str) -> HttpResult<&'a str> {
    map.get(name)
        .ok_or_else(|| HttpError::BadRequest(format!("missing {} header", name)))?
        .to_str()
        .map_err(|_| HttpError::BadRequest(format!("{} header is not valid text", name)))
}

/// `Content-Disposition` value naming `file` as a quoted string
fn attachment(file: &str) -> String {
    let mut quoted = String::with_capacity(file.len());
    for c in file.chars() {
        match c {
            '"' | '\\' => {
                quoted.push('\\');
                quoted.push(c);
            }
            c if c.is_control() => quoted.push('_'),
            c => quoted.push(c),
        }
    }
    format!("attachment; filename=\"{}\"", quoted)
}

/// PUT /api/packages/:owner/arch/push - Upload a signed package
pub async fn push_package(
    State(state): State<AppState>,
    Path(owner): Path<String>,
    map: HeaderMap,
    body: Bytes,
) -> HttpResult<StatusCode> {
    let request = PushRequest {
        owner: &owner,
        email: required_header(&map, headers::EMAIL)?,
        distro: required_header(&map, headers::DISTRO)?,
        filename: required_header(&map, headers::FILENAME)?,
        time: required_header(&map, headers::TIME)?,
        pkgsign: required_header(&map, headers::PKGSIGN)?,
        metasign: required_header(&map, headers::METASIGN)?,
        body: &body,
    };
    debug!(
        "Push of {} by {} ({} bytes)",
        request.filename,
        owner,
        body.len()
    );

    let metadata = state.service.push(request, Utc::now()).await?;
    info!(
        "Accepted {}-{} ({}) from {}",
        metadata.name, metadata.version, metadata.arch, owner
    );
    Ok(StatusCode::OK)
}

/// GET /api/packages/:owner/arch/:distro/:arch/:file - Download a package, signature or database
pub async fn fetch_file(
    State(state): State<AppState>,
    Path((owner, distro, arch, file)): Path<(String, String, String, String)>,
) -> HttpResult<Response> {
    let kind = RepoFile::classify(&file)
        .ok_or_else(|| HttpError::NotFound(format!("{} is not served", file)))?;

    let data = match kind {
        RepoFile::Package | RepoFile::Signature => {
            state.service.fetch_file(&distro, &owner, &file).await?
        }
        RepoFile::Database => {
            let scope = RepoScope::new(distro, owner, arch);
            state.service.fetch_db(&scope).await?
        }
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, kind.content_type())
        .header(
            header::CONTENT_DISPOSITION,
            attachment(&file),
        )
        .body(Body::from(data))
        .map_err(|e| HttpError::InternalServerError(e.to_string()))
}

/// DELETE /api/packages/:owner/arch/delete - Remove a package
///
/// The body is the raw signature over `owner + target + time`.
pub async fn remove_package(
    State(state): State<AppState>,
    Path(owner): Path<String>,
    map: HeaderMap,
    body: Bytes,
) -> HttpResult<StatusCode> {
    let request = RemoveRequest {
        owner: &owner,
        email: required_header(&map, headers::EMAIL)?,
        target: required_header(&map, headers::TARGET)?,
        time: required_header(&map, headers::TIME)?,
        distro: required_header(&map, headers::DISTRO)?,
        arch: required_header(&map, headers::ARCH)?,
        version: required_header(&map, headers::VERSION)?,
        signature: &body,
    };

    state.service.remove(request, Utc::now()).await?;
    Ok(StatusCode::OK)
}
