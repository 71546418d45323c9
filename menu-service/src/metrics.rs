use axum::{body::Body, http::Request, middleware::Next, response::Response};
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

pub const SERVICE_NAME: &str = "menu-service";

pub static MENU_REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

static HTTP_ERRORS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let v = IntCounterVec::new(
        Opts::new("http_errors_total", "Count of HTTP error responses emitted (status >= 400)"),
        &["service", "code", "status"],
    )
    .expect("static metric definition");
    MENU_REGISTRY.register(Box::new(v.clone())).ok();
    v
});

/// Count every error response under the wire code carried in `X-Error-Code`.
pub async fn http_error_metrics(req: Request<Body>, next: Next) -> Response {
    let resp = next.run(req).await;
    let status = resp.status();
    if status.as_u16() >= 400 {
        let code = resp
            .headers()
            .get("X-Error-Code")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown");
        HTTP_ERRORS_TOTAL
            .with_label_values(&[SERVICE_NAME, code, status.as_str()])
            .inc();
    }
    resp
}

pub fn error_count(code: &str, status: u16) -> u64 {
    HTTP_ERRORS_TOTAL
        .with_label_values(&[SERVICE_NAME, code, &status.to_string()])
        .get()
}

/// Render the registry in the Prometheus text exposition format.
pub fn render() -> Result<String, prometheus::Error> {
    Lazy::force(&HTTP_ERRORS_TOTAL);
    let mut buf = Vec::new();
    TextEncoder::new().encode(&MENU_REGISTRY.gather(), &mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
