// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
// Mapbox Directions Adapter
//
// Translates the Directions API into RouteEstimate. Callers treat every
// error as "no estimate" and fall back to straight-line distance.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::domain::location::Location;
use crate::domain::node_config::RoutingConfig;
use crate::domain::routing::{RouteDistanceProvider, RouteError, RouteEstimate};

pub struct MapboxRouteClient {
    client: reqwest::Client,
    base_url: String,
    access_token: Option<String>,
}

#[derive(Deserialize)]
struct DirectionsResponse {
    #[serde(default)]
    routes: Vec<DirectionsRoute>,
}

#[derive(Deserialize)]
struct DirectionsRoute {
    /// Metres.
    distance: f64,
    /// Seconds.
    duration: f64,
}

impl MapboxRouteClient {
    pub fn new(
        base_url: impl Into<String>,
        access_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, RouteError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            access_token: access_token.filter(|t| !t.is_empty()),
        })
    }

    pub fn from_config(config: &RoutingConfig) -> Result<Self, RouteError> {
        Self::new(
            config.base_url.clone(),
            config.access_token.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    fn directions_url(&self, from: Location, to: Location, token: &str) -> Result<reqwest::Url, RouteError> {
        let raw = format!(
            "{}/directions/v5/mapbox/driving/{},{};{},{}",
            self.base_url.trim_end_matches('/'),
            from.lng,
            from.lat,
            to.lng,
            to.lat
        );
        reqwest::Url::parse_with_params(&raw, &[("access_token", token), ("overview", "false")])
            .map_err(|e| RouteError::Request(e.to_string()))
    }
}

#[async_trait]
impl RouteDistanceProvider for MapboxRouteClient {
    async fn estimate(&self, from: Location, to: Location) -> Result<RouteEstimate, RouteError> {
        let token = self.access_token.as_deref().ok_or(RouteError::NotConfigured)?;
        let url = self.directions_url(from, to, token)?;

        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(RouteError::Request(format!("HTTP {}", response.status())));
        }

        let body: DirectionsResponse = response.json().await?;
        let route = body.routes.first().ok_or(RouteError::NoRoute)?;
        Ok(RouteEstimate {
            distance_km: route.distance / 1000.0,
            duration_min: route.duration / 60.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    #[tokio::test]
    async fn test_estimate_converts_units() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock(
                "GET",
                "/directions/v5/mapbox/driving/46.6,24.7;46.7,24.8",
            )
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("access_token".into(), "tok".into()),
                Matcher::UrlEncoded("overview".into(), "false".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"routes":[{"distance":12500.0,"duration":900.0}]}"#)
            .create_async()
            .await;

        let client =
            MapboxRouteClient::new(server.url(), Some("tok".into()), Duration::from_secs(2)).unwrap();
        let estimate = client
            .estimate(Location::new(24.7, 46.6), Location::new(24.8, 46.7))
            .await
            .unwrap();

        mock.assert_async().await;
        assert!((estimate.distance_km - 12.5).abs() < 1e-9);
        assert!((estimate.duration_min - 15.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_empty_routes_is_no_route() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", Matcher::Any)
            .with_status(200)
            .with_body(r#"{"routes":[]}"#)
            .create_async()
            .await;

        let client =
            MapboxRouteClient::new(server.url(), Some("tok".into()), Duration::from_secs(2)).unwrap();
        let err = client
            .estimate(Location::new(0.0, 0.0), Location::new(0.1, 0.1))
            .await
            .unwrap_err();
        assert_eq!(err, RouteError::NoRoute);
    }

    #[tokio::test]
    async fn test_upstream_error_status() {
        let mut server = mockito::Server::new_async().await;
        server.mock("GET", Matcher::Any).with_status(401).create_async().await;

        let client =
            MapboxRouteClient::new(server.url(), Some("bad".into()), Duration::from_secs(2)).unwrap();
        let err = client
            .estimate(Location::new(0.0, 0.0), Location::new(0.1, 0.1))
            .await
            .unwrap_err();
        assert!(matches!(err, RouteError::Request(_)));
    }

    #[tokio::test]
    async fn test_missing_token_is_not_configured() {
        let client = MapboxRouteClient::new("http://127.0.0.1:9", None, Duration::from_secs(1)).unwrap();
        let err = client
            .estimate(Location::new(0.0, 0.0), Location::new(0.1, 0.1))
            .await
            .unwrap_err();
        assert_eq!(err, RouteError::NotConfigured);
    }
}
