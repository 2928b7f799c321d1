// src/middleware/profiler.rs
//! Request timing middleware.
//!
//! Wraps any `tower::Service` over `http` types, times each call and sends
//! one StatsD timer per request named
//! `response.<service>.<method>.<path>.<status>` (lowercased).
//!
//! ```rust,no_run
//! use axum::{routing::get, Router};
//! use statsd_profiler::middleware::profiler::{ProfilerConfig, ProfilerLayer};
//!
//! let app: Router = Router::new()
//!     .route("/users/{id}", get(|| async { "ok" }))
//!     .layer(ProfilerLayer::new(ProfilerConfig::default().service("api")));
//! ```
//!
//! Method and path are used verbatim, so a path containing `.` produces a
//! name whose segments can't be told apart downstream.

use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use http::{Method, Request, Response, StatusCode};
use tower::{Layer, Service};
use tracing::{error, info, warn};

use crate::client::{noop_client, statsd_client, TimingClient};
use crate::config::is_debug_level;
use crate::skipper::{NeverSkip, Skipper};

pub const DEFAULT_ADDRESS: &str = ":8125";
pub const DEFAULT_SERVICE: &str = "default";

/// Receives each metric name when debug echoing is on.
pub type Echo = Arc<dyn Fn(&str) + Send + Sync>;

fn stdout_echo() -> Echo {
    Arc::new(|name: &str| println!("{}", name))
}

/// Profiler options. Anything left unset falls back to a default when the
/// [`Profiler`] is built.
///
/// `ProfilerConfig::default()` does not look at the environment, so `debug`
/// stays off; use [`ProfilerConfig::from_env`] to honour `LOG_LEVEL`.
#[derive(Clone, Default)]
pub struct ProfilerConfig {
    pub skipper: Option<Arc<dyn Skipper>>,
    pub address: Option<String>,
    pub service: Option<String>,
    /// Echo every metric name before it is sent.
    pub debug: bool,
    /// Where echoed names go. Stdout when unset.
    pub echo: Option<Echo>,
}

impl ProfilerConfig {
    /// Default options with `debug` taken from `LOG_LEVEL`.
    pub fn from_env() -> Self {
        let level = std::env::var("LOG_LEVEL").unwrap_or_default();
        Self::default().debug(is_debug_level(&level))
    }

    pub fn skipper(mut self, skipper: impl Skipper) -> Self {
        self.skipper = Some(Arc::new(skipper));
        self
    }

    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn echo<F>(mut self, echo: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.echo = Some(Arc::new(echo));
        self
    }
}

impl fmt::Debug for ProfilerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProfilerConfig")
            .field("skipper", &self.skipper.as_ref().map(|_| "<skipper>"))
            .field("address", &self.address)
            .field("service", &self.service)
            .field("debug", &self.debug)
            .field("echo", &self.echo.as_ref().map(|_| "<echo>"))
            .finish()
    }
}

fn non_empty_or(value: Option<String>, default: &str) -> String {
    value
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

struct Inner {
    skipper: Arc<dyn Skipper>,
    address: String,
    service: String,
    echo: Option<Echo>,
    client: Box<dyn TimingClient>,
}

/// Resolved profiler state, shared by every request through an `Arc`.
#[derive(Clone)]
pub struct Profiler {
    inner: Arc<Inner>,
}

impl Profiler {
    /// Resolve defaults and connect to the StatsD daemon.
    ///
    /// Never fails: if the client can't be built the error is logged and
    /// timings are silently dropped, so requests keep flowing.
    pub fn new(config: ProfilerConfig) -> Self {
        let address = non_empty_or(config.address.clone(), DEFAULT_ADDRESS);
        let client = statsd_client(&address).unwrap_or_else(|e| {
            error!(%address, error = %e, "Failed to initialize statsd client");
            noop_client()
        });
        Self::with_client(config, client)
    }

    /// Resolve defaults and use `client` instead of opening a socket.
    pub fn with_client(config: ProfilerConfig, client: impl TimingClient) -> Self {
        let skipper = config
            .skipper
            .unwrap_or_else(|| Arc::new(NeverSkip) as Arc<dyn Skipper>);
        let address = non_empty_or(config.address, DEFAULT_ADDRESS);
        let service = non_empty_or(config.service, DEFAULT_SERVICE);
        let echo = if config.debug {
            Some(config.echo.unwrap_or_else(stdout_echo))
        } else {
            None
        };

        info!(%service, %address, debug = config.debug, "Request profiler ready");

        Self {
            inner: Arc::new(Inner {
                skipper,
                address,
                service,
                echo,
                client: Box::new(client),
            }),
        }
    }

    pub fn address(&self) -> &str {
        &self.inner.address
    }

    pub fn service(&self) -> &str {
        &self.inner.service
    }

    pub fn is_debug(&self) -> bool {
        self.inner.echo.is_some()
    }

    pub fn layer(&self) -> ProfilerLayer {
        ProfilerLayer {
            profiler: self.clone(),
        }
    }

    fn skips(&self, head: &http::request::Parts) -> bool {
        self.inner.skipper.skip(head)
    }

    fn record(&self, method: &Method, path: &str, status: StatusCode, elapsed: Duration) {
        let name = metric_name(&self.inner.service, method, path, status);
        if let Some(echo) = &self.inner.echo {
            echo(&name);
        }
        self.inner.client.timing(&name, elapsed);
    }
}

impl fmt::Debug for Profiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Profiler")
            .field("address", &self.inner.address)
            .field("service", &self.inner.service)
            .field("debug", &self.is_debug())
            .finish()
    }
}

/// `response.<service>.<method>.<path>.<status>`, lowercased.
pub fn metric_name(service: &str, method: &Method, path: &str, status: StatusCode) -> String {
    format!(
        "response.{}.{}.{}.{}",
        service,
        method.as_str(),
        path,
        status.as_u16()
    )
    .to_lowercase()
}

/// Profiler with every option at its default, echoing names when
/// `LOG_LEVEL=debug`.
pub fn profiler() -> ProfilerLayer {
    profiler_with_config(ProfilerConfig::from_env())
}

pub fn profiler_with_config(config: ProfilerConfig) -> ProfilerLayer {
    ProfilerLayer::new(config)
}

#[derive(Clone, Debug)]
pub struct ProfilerLayer {
    profiler: Profiler,
}

impl ProfilerLayer {
    pub fn new(config: ProfilerConfig) -> Self {
        Profiler::new(config).layer()
    }

    pub fn profiler(&self) -> &Profiler {
        &self.profiler
    }
}

impl<S> Layer<S> for ProfilerLayer {
    type Service = ProfilerService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ProfilerService {
            inner,
            profiler: self.profiler.clone(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ProfilerService<S> {
    inner: S,
    profiler: Profiler,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for ProfilerService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Future: Send + 'static,
    S::Error: fmt::Display + Send + 'static,
    ResBody: Send + 'static,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let (head, body) = req.into_parts();
        if self.profiler.skips(&head) {
            return Box::pin(self.inner.call(Request::from_parts(head, body)));
        }

        let method = head.method.clone();
        let path = head.uri.path().to_owned();
        let profiler = self.profiler.clone();

        let start = Instant::now();
        let fut = self.inner.call(Request::from_parts(head, body));

        Box::pin(async move {
            let result = fut.await;
            let status = match &result {
                Ok(response) => response.status(),
                Err(e) => {
                    warn!(%method, %path, error = %e, "Request handler failed");
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            };
            profiler.record(&method, &path, status, start.elapsed());
            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use std::sync::Mutex;
    use tower::{service_fn, ServiceExt};

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<(String, Duration)>>>);

    impl Recorder {
        fn names(&self) -> Vec<String> {
            self.0.lock().unwrap().iter().map(|(n, _)| n.clone()).collect()
        }
    }

    impl TimingClient for Recorder {
        fn timing(&self, name: &str, elapsed: Duration) {
            self.0.lock().unwrap().push((name.to_string(), elapsed));
        }
    }

    fn request(method: Method, uri: &str) -> Request<()> {
        Request::builder().method(method).uri(uri).body(()).unwrap()
    }

    async fn ok_with(status: StatusCode) -> Result<Response<()>, Infallible> {
        Ok(Response::builder().status(status).body(()).unwrap())
    }

    #[test]
    fn test_metric_name_format() {
        let name = metric_name("api", &Method::GET, "/users/42", StatusCode::OK);
        assert_eq!(name, "response.api.get./users/42.200");
    }

    #[test]
    fn test_metric_name_is_lowercased() {
        let name = metric_name(
            "Billing-API",
            &Method::PATCH,
            "/Invoices/AB12",
            StatusCode::NOT_FOUND,
        );
        assert_eq!(name, "response.billing-api.patch./invoices/ab12.404");
    }

    #[test]
    fn test_defaults_resolved() {
        let profiler = Profiler::with_client(ProfilerConfig::default(), Recorder::default());
        assert_eq!(profiler.service(), "default");
        assert_eq!(profiler.address(), ":8125");
        assert!(!profiler.is_debug());
        assert!(!profiler.skips(&request(Method::GET, "/").into_parts().0));
    }

    #[test]
    fn test_empty_strings_fall_back_to_defaults() {
        let config = ProfilerConfig::default().service("").address("");
        let profiler = Profiler::with_client(config, Recorder::default());
        assert_eq!(profiler.service(), DEFAULT_SERVICE);
        assert_eq!(profiler.address(), DEFAULT_ADDRESS);
    }

    #[test]
    fn test_unusable_address_fails_open() {
        let layer = ProfilerLayer::new(ProfilerConfig::default().address("no-port-here"));
        assert_eq!(layer.profiler().address(), "no-port-here");

        let svc = layer.layer(service_fn(|_req: Request<()>| ok_with(StatusCode::OK)));
        let res = tokio_test::block_on(svc.oneshot(request(Method::GET, "/"))).unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_records_one_timing_per_request() {
        let recorder = Recorder::default();
        let config = ProfilerConfig::default().service("api");
        let profiler = Profiler::with_client(config, recorder.clone());
        let svc = profiler
            .layer()
            .layer(service_fn(|_req: Request<()>| ok_with(StatusCode::OK)));

        let res = svc.oneshot(request(Method::GET, "/users/42")).await.unwrap();

        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(recorder.names(), vec!["response.api.get./users/42.200"]);
    }

    #[tokio::test]
    async fn test_query_string_not_part_of_name() {
        let recorder = Recorder::default();
        let profiler = Profiler::with_client(ProfilerConfig::default(), recorder.clone());
        let svc = profiler
            .layer()
            .layer(service_fn(|_req: Request<()>| ok_with(StatusCode::CREATED)));

        svc.oneshot(request(Method::POST, "/users?invite=1")).await.unwrap();

        assert_eq!(recorder.names(), vec!["response.default.post./users.201"]);
    }

    #[tokio::test]
    async fn test_skipped_request_is_not_recorded() {
        let recorder = Recorder::default();
        let config = ProfilerConfig::default()
            .skipper(|h: &http::request::Parts| h.uri.path() == "/healthz");
        let profiler = Profiler::with_client(config, recorder.clone());
        let svc = profiler
            .layer()
            .layer(service_fn(|_req: Request<()>| ok_with(StatusCode::NO_CONTENT)));

        let res = svc.oneshot(request(Method::GET, "/healthz")).await.unwrap();

        assert_eq!(res.status(), StatusCode::NO_CONTENT);
        assert!(recorder.names().is_empty());
    }

    #[tokio::test]
    async fn test_handler_error_still_recorded_and_returned() {
        let recorder = Recorder::default();
        let config = ProfilerConfig::default().service("api");
        let profiler = Profiler::with_client(config, recorder.clone());
        let svc = profiler.layer().layer(service_fn(|_req: Request<()>| async {
            Err::<Response<()>, _>(std::io::Error::new(std::io::ErrorKind::Other, "boom"))
        }));

        let err = svc.oneshot(request(Method::DELETE, "/users/7")).await.unwrap_err();

        assert_eq!(err.to_string(), "boom");
        assert_eq!(recorder.names(), vec!["response.api.delete./users/7.500"]);
    }

    #[tokio::test]
    async fn test_elapsed_covers_handler_time() {
        let recorder = Recorder::default();
        let profiler = Profiler::with_client(ProfilerConfig::default(), recorder.clone());
        let svc = profiler.layer().layer(service_fn(|_req: Request<()>| async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            ok_with(StatusCode::OK).await
        }));

        svc.oneshot(request(Method::GET, "/slow")).await.unwrap();

        let recorded = recorder.0.lock().unwrap();
        assert_eq!(recorded.len(), 1);
        assert!(recorded[0].1 >= Duration::from_millis(20));
    }

    /// Shared, ordered log of echo lines and timings.
    #[derive(Clone, Default)]
    struct Journal(Arc<Mutex<Vec<String>>>);

    impl Journal {
        fn entries(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }

        fn echo_into(&self) -> impl Fn(&str) + Send + Sync + 'static {
            let journal = self.clone();
            move |name: &str| journal.0.lock().unwrap().push(format!("echo {}", name))
        }
    }

    impl TimingClient for Journal {
        fn timing(&self, name: &str, _elapsed: Duration) {
            self.0.lock().unwrap().push(format!("timing {}", name));
        }
    }

    #[tokio::test]
    async fn test_debug_echoes_name_once_before_sending() {
        let journal = Journal::default();
        let config = ProfilerConfig::default()
            .service("api")
            .debug(true)
            .echo(journal.echo_into());
        let profiler = Profiler::with_client(config, journal.clone());
        assert!(profiler.is_debug());

        let svc = profiler
            .layer()
            .layer(service_fn(|_req: Request<()>| ok_with(StatusCode::OK)));
        svc.oneshot(request(Method::GET, "/users/42")).await.unwrap();

        assert_eq!(
            journal.entries(),
            vec![
                "echo response.api.get./users/42.200",
                "timing response.api.get./users/42.200",
            ]
        );
    }

    #[tokio::test]
    async fn test_no_echo_without_debug() {
        let journal = Journal::default();
        let config = ProfilerConfig::default().echo(journal.echo_into());
        let profiler = Profiler::with_client(config, journal.clone());
        assert!(!profiler.is_debug());

        let svc = profiler
            .layer()
            .layer(service_fn(|_req: Request<()>| ok_with(StatusCode::OK)));
        svc.oneshot(request(Method::GET, "/")).await.unwrap();

        assert_eq!(journal.entries(), vec!["timing response.default.get./.200"]);
    }

    #[tokio::test]
    async fn test_skipped_request_is_not_echoed() {
        let journal = Journal::default();
        let config = ProfilerConfig::default()
            .debug(true)
            .echo(journal.echo_into())
            .skipper(|_: &http::request::Parts| true);
        let profiler = Profiler::with_client(config, journal.clone());

        let svc = profiler
            .layer()
            .layer(service_fn(|_req: Request<()>| ok_with(StatusCode::OK)));
        svc.oneshot(request(Method::GET, "/healthz")).await.unwrap();

        assert!(journal.entries().is_empty());
    }

    // The only test touching LOG_LEVEL, so no other test races on it.
    #[test]
    fn test_log_level_env_drives_debug() {
        std::env::set_var("LOG_LEVEL", "debug");
        let from_env = ProfilerConfig::from_env();
        let layer = profiler();
        std::env::set_var("LOG_LEVEL", "info");
        let quiet = ProfilerConfig::from_env();
        std::env::remove_var("LOG_LEVEL");

        assert!(from_env.debug);
        assert!(layer.profiler().is_debug());
        assert!(!quiet.debug);
        assert!(!ProfilerConfig::default().debug);
    }
}
