//! axum adapter: HTTP in, gateway request to the handlers, HTTP out.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use o4n_auth::{
    AUTH_PATH, AuthHandler, GatewayRequest, GatewayResponse, HttpKeyResolver, InvocationContext,
    LOGIN_PATH, LoginHandler,
};

/// Handlers shared by all requests.
pub struct AppState {
    pub login: LoginHandler,
    pub auth: AuthHandler<HttpKeyResolver>,
    next_id: AtomicU64,
}

impl AppState {
    pub fn new(login: LoginHandler, auth: AuthHandler<HttpKeyResolver>) -> Self {
        Self {
            login,
            auth,
            next_id: AtomicU64::new(1),
        }
    }

    fn context(&self, headers: &HeaderMap) -> InvocationContext {
        let request_id = headers
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .map_or_else(
                || format!("req-{}", self.next_id.fetch_add(1, Ordering::Relaxed)),
                ToString::to_string,
            );
        InvocationContext {
            request_id,
            received_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map_or(0, |d| d.as_secs()),
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(LOGIN_PATH, any(login))
        .route(AUTH_PATH, any(auth))
        .with_state(state)
}

async fn login(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> Response {
    let ctx = state.context(&headers);
    let req = to_gateway_request(&method, &uri, &headers, body);
    into_response(state.login.handle(&req, &ctx))
}

async fn auth(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> Response {
    let ctx = state.context(&headers);
    let req = to_gateway_request(&method, &uri, &headers, body);
    into_response(state.auth.handle(&req, &ctx).await)
}

/// Translate an HTTP request into the handlers' request shape.
///
/// The full URL is only known behind a proxy that sets
/// `X-Forwarded-Proto`; otherwise the handlers rebuild it from `Host`.
pub fn to_gateway_request(
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
    body: String,
) -> GatewayRequest {
    let mut flat: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let Ok(value) = value.to_str() else { continue };
        let sep = if *name == header::COOKIE { "; " } else { ", " };
        flat.entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(sep);
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }

    let query = uri
        .query()
        .map(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .into_owned()
                .collect::<BTreeMap<_, _>>()
        })
        .unwrap_or_default();

    let raw_url = match (flat.get("x-forwarded-proto"), flat.get("host")) {
        (Some(proto), Some(host)) => Some(format!(
            "{}://{host}{}",
            proto.split(',').next().unwrap_or("https").trim(),
            uri.path_and_query().map_or("/", |pq| pq.as_str())
        )),
        _ => None,
    };

    GatewayRequest {
        method: method.as_str().to_ascii_uppercase(),
        raw_url,
        headers: flat,
        query,
        body: (!body.is_empty()).then_some(body),
    }
}

/// Translate a handler response into HTTP.
pub fn into_response(resp: GatewayResponse) -> Response {
    let status = StatusCode::from_u16(resp.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut out = (status, Body::from(resp.body)).into_response();

    let headers = out.headers_mut();
    for (name, value) in &resp.headers {
        match (
            header::HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => tracing::warn!(header = %name, "dropping unrepresentable response header"),
        }
    }
    for cookie in &resp.cookies {
        match HeaderValue::from_str(cookie) {
            Ok(value) => {
                headers.append(header::SET_COOKIE, value);
            }
            Err(_) => tracing::warn!("dropping unrepresentable cookie"),
        }
    }

    out
}
