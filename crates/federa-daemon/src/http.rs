// Copyright (c) 2026 Federa Contributors
// SPDX-License-Identifier: Apache-2.0

//! HTTP transport adapter: one POST route per AM method, JSON bodies.
//!
//! The adapter stays thin. Domain failures are reply payloads with GENI
//! codes, so every handler answers 200 with a populated envelope; the only
//! thing decided here is who the caller is, taken from the identity header
//! set by the authenticating front end.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use federa_core::error::FederaError;

use crate::auth::Caller;
use crate::server::{
    AllocateArgs, AmService, DescribeValue, ListResourcesArgs, ManifestValue,
    PerformOperationalActionArgs, RenewArgs, Reply, SliverInfo, SliverSetArgs, StatusValue,
    VersionValue,
};

/// URN of the authenticated client certificate, forwarded by the TLS front end.
pub const USER_HEADER: &str = "x-federa-user";

const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

pub fn router(service: AmService) -> Router {
    Router::new()
        .route("/am/v3/get_version", post(get_version))
        .route("/am/v3/list_resources", post(list_resources))
        .route("/am/v3/allocate", post(allocate))
        .route("/am/v3/renew", post(renew))
        .route("/am/v3/provision", post(provision))
        .route("/am/v3/status", post(status))
        .route("/am/v3/describe", post(describe))
        .route(
            "/am/v3/perform_operational_action",
            post(perform_operational_action),
        )
        .route("/am/v3/delete", post(delete))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

fn caller(headers: &HeaderMap) -> Result<Caller, FederaError> {
    let value = headers
        .get(USER_HEADER)
        .ok_or_else(|| FederaError::Forbidden("missing caller identity".into()))?;
    let urn = value
        .to_str()
        .map_err(|_| FederaError::Forbidden("invalid caller identity".into()))?;
    Caller::from_urn(urn).map_err(|_| FederaError::Forbidden("invalid caller identity".into()))
}

async fn get_version(State(service): State<AmService>) -> Json<Reply<VersionValue>> {
    Json(service.get_version().await)
}

async fn list_resources(
    State(service): State<AmService>,
    headers: HeaderMap,
    Json(args): Json<ListResourcesArgs>,
) -> Json<Reply<String>> {
    match caller(&headers) {
        Ok(c) => Json(service.list_resources(&c, args).await),
        Err(e) => Json(Reply::failure(&e)),
    }
}

async fn allocate(
    State(service): State<AmService>,
    headers: HeaderMap,
    Json(args): Json<AllocateArgs>,
) -> Json<Reply<ManifestValue>> {
    match caller(&headers) {
        Ok(c) => Json(service.allocate(&c, args).await),
        Err(e) => Json(Reply::failure(&e)),
    }
}

async fn renew(
    State(service): State<AmService>,
    headers: HeaderMap,
    Json(args): Json<RenewArgs>,
) -> Json<Reply<Vec<SliverInfo>>> {
    match caller(&headers) {
        Ok(c) => Json(service.renew(&c, args).await),
        Err(e) => Json(Reply::failure(&e)),
    }
}

async fn provision(
    State(service): State<AmService>,
    headers: HeaderMap,
    Json(args): Json<SliverSetArgs>,
) -> Json<Reply<ManifestValue>> {
    match caller(&headers) {
        Ok(c) => Json(service.provision(&c, args).await),
        Err(e) => Json(Reply::failure(&e)),
    }
}

async fn status(
    State(service): State<AmService>,
    headers: HeaderMap,
    Json(args): Json<SliverSetArgs>,
) -> Json<Reply<StatusValue>> {
    match caller(&headers) {
        Ok(c) => Json(service.status(&c, args).await),
        Err(e) => Json(Reply::failure(&e)),
    }
}

async fn describe(
    State(service): State<AmService>,
    headers: HeaderMap,
    Json(args): Json<SliverSetArgs>,
) -> Json<Reply<DescribeValue>> {
    match caller(&headers) {
        Ok(c) => Json(service.describe(&c, args).await),
        Err(e) => Json(Reply::failure(&e)),
    }
}

async fn perform_operational_action(
    State(service): State<AmService>,
    headers: HeaderMap,
    Json(args): Json<PerformOperationalActionArgs>,
) -> Json<Reply<Vec<SliverInfo>>> {
    match caller(&headers) {
        Ok(c) => Json(service.perform_operational_action(&c, args).await),
        Err(e) => Json(Reply::failure(&e)),
    }
}

async fn delete(
    State(service): State<AmService>,
    headers: HeaderMap,
    Json(args): Json<SliverSetArgs>,
) -> Json<Reply<Vec<SliverInfo>>> {
    match caller(&headers) {
        Ok(c) => Json(service.delete(&c, args).await),
        Err(e) => Json(Reply::failure(&e)),
    }
}
