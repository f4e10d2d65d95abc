use std::io::Cursor;
use std::sync::Arc;

use axum::Router;
use axum::extract::{Path as AxumPath, State};
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use image::{DynamicImage, ImageFormat};
use log::{debug, error, info};

use crate::context::AppContext;
use crate::enums::Orientation;

const VIEWER_PAGE: &str = include_str!("viewer.html");

type SliceParams = (String, String, usize);

/// Routes for the viewer page, case metadata and slice images.
pub fn router(context: Arc<AppContext>) -> Router {
    Router::new()
        .route("/", get(viewer))
        .route("/healthz", get(healthz))
        .route("/api/case", get(case_summary))
        .route("/api/volumes/:name/:orientation/:index", get(volume_slice))
        .route("/api/overlays/:name/:orientation/:index", get(overlay_slice))
        .with_state(context)
}

/// Serve the viewer on `addr` until the process is stopped.
pub async fn serve(context: Arc<AppContext>, addr: &str) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("viewer listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(context)).await
}

async fn viewer() -> Html<&'static str> {
    Html(VIEWER_PAGE)
}

async fn healthz() -> impl IntoResponse {
    "ok"
}

async fn case_summary(State(context): State<Arc<AppContext>>) -> impl IntoResponse {
    axum::Json(context.summary())
}

async fn volume_slice(
    State(context): State<Arc<AppContext>>,
    AxumPath((name, orientation, index)): AxumPath<SliceParams>,
) -> Result<Response, StatusCode> {
    let orientation = parse_orientation(&orientation)?;
    let volume = context.volume(&name).ok_or(StatusCode::NOT_FOUND)?;
    let image = volume
        .slice_image(index, orientation)
        .ok_or(StatusCode::NOT_FOUND)?;
    debug!("volume slice {name} {orientation} {index}");
    png_response(DynamicImage::ImageLuma8(image))
}

async fn overlay_slice(
    State(context): State<Arc<AppContext>>,
    AxumPath((name, orientation, index)): AxumPath<SliceParams>,
) -> Result<Response, StatusCode> {
    let orientation = parse_orientation(&orientation)?;
    let overlays = context.overlays();
    let key = overlays.key(&name).ok_or(StatusCode::NOT_FOUND)?;
    let image = overlays
        .select(key)
        .ok_or(StatusCode::NOT_FOUND)?
        .slice_image(index, orientation)
        .ok_or(StatusCode::NOT_FOUND)?;
    debug!("overlay slice {name} {orientation} {index}");
    png_response(DynamicImage::ImageRgba8(image))
}

fn parse_orientation(value: &str) -> Result<Orientation, StatusCode> {
    value.parse().map_err(|_| StatusCode::BAD_REQUEST)
}

fn png_response(image: DynamicImage) -> Result<Response, StatusCode> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|err| {
            error!("failed to encode slice: {err}");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    Ok((
        [
            (header::CONTENT_TYPE, "image/png"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        bytes,
    )
        .into_response())
}
