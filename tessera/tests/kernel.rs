//! HTTP kernel behaviour through the public API.

use http::{HeaderName, HeaderValue, Method, StatusCode};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tessera::{
    BoxError, Container, Event, EventDispatcherExt, EventManager, Events, NamedEvent,
    http::{
        Body, HttpError, Kernel, Middleware, Next, Request, Response, RouteTable,
        events::{ExceptionOccurred, KERNEL_EVENT, RequestReceived, RequestTerminated, ResponsePrepared},
        text,
    },
};

struct Fixture {
    kernel: Kernel,
    events: Events,
    _container: Arc<Container>,
}

fn fixture(routes: RouteTable, environment: &str) -> Fixture {
    let events = Events::new(EventManager::new());
    let container = Arc::new(Container::new());
    let kernel = Kernel::new(
        Arc::new(routes),
        events.clone(),
        Arc::downgrade(&container),
        environment,
    );
    Fixture {
        kernel,
        events,
        _container: container,
    }
}

fn routes() -> RouteTable {
    let routes = RouteTable::new();
    routes
        .get("/", |_request: Request| async {
            Ok::<_, BoxError>(text(StatusCode::OK, "home"))
        })
        .get("/broken", |_request: Request| async {
            Err::<Response, BoxError>("database unavailable".into())
        })
        .post("/orders", |_request: Request| async {
            Ok::<_, BoxError>(text(StatusCode::CREATED, "created"))
        });
    routes
}

fn request(method: Method, uri: &str) -> Request {
    http::Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::new())
        .unwrap()
}

fn json(response: &Response) -> Value {
    serde_json::from_slice(response.body()).unwrap()
}

struct Trace {
    label: &'static str,
    log: Arc<Mutex<Vec<String>>>,
}

impl Middleware for Trace {
    async fn handle(&self, request: Request, next: Next) -> Result<Response, BoxError> {
        self.log.lock().unwrap().push(format!("{}:before", self.label));
        let response = next.run(request).await;
        self.log.lock().unwrap().push(format!("{}:after", self.label));
        response
    }
}

struct Block;

impl Middleware for Block {
    async fn handle(&self, request: Request, next: Next) -> Result<Response, BoxError> {
        if request.headers().contains_key("x-banned") {
            return Err(HttpError::forbidden("blocked")
                .with_header(
                    HeaderName::from_static("x-reason"),
                    HeaderValue::from_static("blocked"),
                )
                .into());
        }
        next.run(request).await
    }
}

#[tokio::test]
async fn middleware_runs_as_an_onion() {
    let fixture = fixture(routes(), "production");
    let log = Arc::new(Mutex::new(Vec::new()));
    fixture
        .kernel
        .push_middleware(Trace { label: "outer", log: Arc::clone(&log) })
        .push_middleware(Trace { label: "inner", log: Arc::clone(&log) });

    let response = fixture.kernel.handle(request(Method::GET, "/")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        *log.lock().unwrap(),
        vec!["outer:before", "inner:before", "inner:after", "outer:after"]
    );
}

#[tokio::test]
async fn http_errors_keep_status_and_headers() {
    let fixture = fixture(routes(), "production");
    fixture.kernel.push_middleware(Block);

    let mut blocked = request(Method::POST, "/orders");
    blocked
        .headers_mut()
        .insert("x-banned", HeaderValue::from_static("1"));
    let response = fixture.kernel.handle(blocked).await.unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(response.headers()["x-reason"], "blocked");
    assert_eq!(response.headers()["content-type"], "application/json");
    assert_eq!(json(&response), serde_json::json!({"error": "blocked", "code": 403}));

    let allowed = fixture
        .kernel
        .handle(request(Method::POST, "/orders"))
        .await
        .unwrap();
    assert_eq!(allowed.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn other_errors_become_500_without_diagnostics_in_production() {
    let fixture = fixture(routes(), "production");
    let response = fixture
        .kernel
        .handle(request(Method::GET, "/broken"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json(&response);
    assert_eq!(body["error"], "database unavailable");
    assert_eq!(body["code"], 500);
    assert!(body.get("trace").is_none());
    assert!(body.get("file").is_none());
}

#[tokio::test]
async fn development_adds_diagnostics() {
    let fixture = fixture(routes(), "development");
    assert!(fixture.kernel.diagnostics());

    let response = fixture
        .kernel
        .handle(request(Method::GET, "/broken"))
        .await
        .unwrap();
    let body = json(&response);

    assert_eq!(body["trace"], serde_json::json!(["database unavailable"]));
    assert!(body.get("file").is_some());
    assert!(body.get("line").is_some());
}

#[tokio::test]
async fn unknown_routes_are_an_empty_404() {
    let fixture = fixture(routes(), "development");
    let response = fixture
        .kernel
        .handle(request(Method::DELETE, "/orders"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(response.body().is_empty());
}

#[tokio::test]
async fn lifecycle_events_share_the_kernel_interface() {
    let fixture = fixture(routes(), "production");
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    fixture.events.listen_tag(
        KERNEL_EVENT,
        move |event: &mut dyn Event| {
            log.lock().unwrap().push(event.event_name());
            Ok(())
        },
        0,
    );

    let ok = request(Method::GET, "/");
    let current = tessera::http::CurrentRequest::from_request(&ok);
    let response = fixture.kernel.handle(ok).await.unwrap();
    fixture.kernel.terminate(&current, &response).await.unwrap();
    fixture
        .kernel
        .handle(request(Method::GET, "/broken"))
        .await
        .unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            RequestReceived::NAME,
            ResponsePrepared::NAME,
            RequestTerminated::NAME,
            RequestReceived::NAME,
            ExceptionOccurred::NAME,
        ]
    );
}

#[tokio::test]
async fn listeners_can_rewrite_the_response() {
    let fixture = fixture(routes(), "production");
    fixture.events.listen(
        |prepared: &mut ResponsePrepared| {
            prepared
                .response
                .headers_mut()
                .insert("x-served-by", HeaderValue::from_static("tessera"));
            Ok(())
        },
        0,
    );

    let response = fixture.kernel.handle(request(Method::GET, "/")).await.unwrap();
    assert_eq!(response.headers()["x-served-by"], "tessera");
}

#[tokio::test]
async fn exception_listeners_see_the_error() {
    let fixture = fixture(routes(), "production");
    let messages = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&messages);
    fixture.events.listen(
        move |occurred: &mut ExceptionOccurred| {
            log.lock()
                .unwrap()
                .push(format!("{} {}", occurred.request.path(), occurred.error()));
            Ok(())
        },
        0,
    );

    fixture
        .kernel
        .handle(request(Method::GET, "/broken"))
        .await
        .unwrap();

    assert_eq!(*messages.lock().unwrap(), vec!["/broken database unavailable"]);
}
