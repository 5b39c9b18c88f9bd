use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;

use crate::geo::GeoPoint;
use crate::ingest::types::LocationHints;
use crate::search::{SearchRequest, SearchResponse, SearchService};

pub const CACHE_STATUS_HEADER: &str = "x-cache";

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SearchService>,
}

impl AppState {
    pub fn new(service: SearchService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/search", get(search_get).post(search_post))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// Query-string form of a search. Flags accept `1`, `true` or `yes`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    #[serde(default, alias = "q")]
    query: Option<String>,
    #[serde(default)]
    refresh: Option<String>,
    #[serde(default)]
    force_refresh: Option<String>,
    #[serde(default)]
    lat: Option<f64>,
    #[serde(default)]
    lng: Option<f64>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    session_type: Option<String>,
    #[serde(default)]
    day_of_week: Option<u8>,
}

fn truthy(v: Option<&str>) -> bool {
    matches!(
        v.map(|s| s.trim().to_ascii_lowercase()).as_deref(),
        Some("1" | "true" | "yes")
    )
}

impl SearchParams {
    pub fn into_request(self) -> SearchRequest {
        let force_refresh =
            truthy(self.refresh.as_deref()) || truthy(self.force_refresh.as_deref());
        let user_location = match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => Some(GeoPoint::new(lat, lng)),
            _ => None,
        };
        SearchRequest {
            query: self.query,
            force_refresh,
            user_location,
            location_hints: LocationHints {
                city: self.city,
                state: self.state,
                country: self.country,
            },
            session_type_filter: self.session_type,
            day_of_week_filter: self.day_of_week,
        }
    }
}

async fn search_get(State(state): State<AppState>, Query(params): Query<SearchParams>) -> Response {
    let resp = state.service.search(params.into_request()).await;
    with_cache_headers(&state, resp)
}

async fn search_post(State(state): State<AppState>, Json(req): Json<SearchRequest>) -> Response {
    let resp = state.service.search(req).await;
    with_cache_headers(&state, resp)
}

fn with_cache_headers(state: &AppState, resp: SearchResponse) -> Response {
    let ttl = state.service.cache_ttl().as_secs();
    let mut headers = HeaderMap::new();
    headers.insert(
        CACHE_STATUS_HEADER,
        HeaderValue::from_static(resp.meta.cache_status.as_str()),
    );
    if let Ok(v) = HeaderValue::from_str(&format!(
        "public, max-age={ttl}, stale-while-revalidate={ttl}"
    )) {
        headers.insert(header::CACHE_CONTROL, v);
    }
    (headers, Json(resp)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_map_to_request() {
        let p = SearchParams {
            query: Some("goalie".into()),
            refresh: Some("TRUE".into()),
            lat: Some(44.97),
            lng: Some(-93.26),
            city: Some("Minneapolis".into()),
            day_of_week: Some(3),
            ..Default::default()
        };
        let r = p.into_request();
        assert!(r.force_refresh);
        assert_eq!(r.user_location, Some(GeoPoint::new(44.97, -93.26)));
        assert_eq!(r.location_hints.city.as_deref(), Some("Minneapolis"));
        assert_eq!(r.day_of_week_filter, Some(3));
    }

    #[test]
    fn half_a_coordinate_is_no_location() {
        let p = SearchParams {
            lat: Some(44.97),
            force_refresh: Some("0".into()),
            ..Default::default()
        };
        let r = p.into_request();
        assert!(r.user_location.is_none());
        assert!(!r.force_refresh);
    }
}
