use super::errors::Result;
use super::router::{Resolution, Router};
use bytes::Bytes;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode, Uri};
use hyper_util::rt::TokioIo;
use log::{debug, error};
use std::convert::Infallible;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time;
use tower::ServiceExt;
use tower_http::services::ServeDir;

pub type ResponseBody = UnsyncBoxBody<Bytes, std::io::Error>;

const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Accept connections forever, answering each request through `router`.
pub async fn serve(listener: TcpListener, router: Arc<Router>) -> Result<()> {
    loop {
        let (stream, peer) = accept_with_retry(|| listener.accept()).await;
        let router = router.clone();
        let io = TokioIo::new(stream);

        tokio::spawn(async move {
            if let Err(e) = http1::Builder::new()
                .serve_connection(io, service_fn(move |req: Request<Incoming>| handle(req, router.clone())))
                .await
            {
                debug!("error serving connection from {peer}: {e}");
            }
        });
    }
}

/// Keep accepting until a connection arrives. Accept errors (out of file
/// descriptors, aborted handshakes) are logged and retried after a short pause.
async fn accept_with_retry<F, Fut, T>(mut accept: F) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<T>>,
{
    loop {
        match accept().await {
            Ok(conn) => return conn,
            Err(e) => {
                error!("failed to accept connection, {e}");
                time::sleep(ACCEPT_RETRY_DELAY).await;
            }
        }
    }
}

/// Answer a single request.
pub async fn handle<B>(req: Request<B>, router: Arc<Router>) -> std::result::Result<Response<ResponseBody>, Infallible>
where
    B: Send + 'static,
{
    let path = match urlencoding::decode(req.uri().path()) {
        Ok(path) => path.into_owned(),
        Err(_) => {
            debug!("{} {} -> undecodable path", req.method(), req.uri().path());
            return Ok(plain(StatusCode::BAD_REQUEST, "400 bad request\n"));
        }
    };
    let response = match router.resolve(&path) {
        Resolution::Mirror { repository, dir, remainder } => {
            debug!("{} {} -> {} ({})", req.method(), path, repository.name, remainder);
            match format!("/{}", encode_path(remainder)).parse::<Uri>() {
                Ok(uri) => {
                    let mut req = req;
                    *req.uri_mut() = uri;
                    serve_dir(&dir, req).await
                }
                Err(_) => plain(StatusCode::BAD_REQUEST, "400 bad request\n"),
            }
        }
        Resolution::Fallback => {
            debug!("{} {} -> base path", req.method(), path);
            serve_dir(router.base_path(), req).await
        }
        Resolution::NotFound => {
            debug!("{} {} -> not found", req.method(), path);
            plain(StatusCode::NOT_FOUND, "404 page not found\n")
        }
    };
    Ok(response)
}

/// Percent-encode each segment of a decoded path.
fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

async fn serve_dir<B>(dir: &Path, req: Request<B>) -> Response<ResponseBody>
where
    B: Send + 'static,
{
    let service = ServeDir::new(dir).append_index_html_on_directories(false);
    match service.oneshot(req).await {
        Ok(response) => response.map(|body| body.boxed_unsync()),
        Err(never) => match never {},
    }
}

fn plain(status: StatusCode, text: &'static str) -> Response<ResponseBody> {
    let body = Full::new(Bytes::from_static(text.as_bytes()))
        .map_err(|never| match never {})
        .boxed_unsync();
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daemon::registry::Registry;
    use crate::daemon::repo_config::Repository;
    use hyper::Method;
    use std::io::{Error, ErrorKind};
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn fixture(fallback: bool) -> (TempDir, Arc<Router>) {
        let base = TempDir::new().unwrap();
        std::fs::create_dir_all(base.path().join("foo/info")).unwrap();
        std::fs::write(base.path().join("foo/info/refs"), "abc\trefs/heads/main\n").unwrap();
        std::fs::create_dir_all(base.path().join("static")).unwrap();
        std::fs::write(base.path().join("static/index.txt"), "hello").unwrap();

        let mut registry = Registry::default();
        registry
            .insert(Repository {
                name: "foo".to_string(),
                origin: "https://example.com/foo".to_string(),
                interval: Duration::from_secs(60),
                timeout: None,
            })
            .unwrap();
        let router = Router::new(base.path(), Arc::new(registry), fallback);
        (base, Arc::new(router))
    }

    async fn request(router: &Arc<Router>, method: Method, uri: &str) -> (StatusCode, Bytes) {
        let req = Request::builder().method(method).uri(uri).body(()).unwrap();
        let response = handle(req, router.clone()).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, body)
    }

    #[tokio::test]
    async fn serves_files_from_mirror() {
        let (_base, router) = fixture(false);
        let (status, body) = request(&router, Method::GET, "/foo/info/refs").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "abc\trefs/heads/main\n");
    }

    #[tokio::test]
    async fn head_returns_no_body() {
        let (_base, router) = fixture(false);
        let (status, body) = request(&router, Method::HEAD, "/foo/info/refs").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn unmatched_path_without_fallback_is_not_found() {
        let (_base, router) = fixture(false);
        let (status, body) = request(&router, Method::GET, "/static/index.txt").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, "404 page not found\n");
    }

    #[tokio::test]
    async fn unmatched_path_falls_back_to_base() {
        let (_base, router) = fixture(true);
        let (status, body) = request(&router, Method::GET, "/static/index.txt").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "hello");
    }

    #[tokio::test]
    async fn missing_files_and_escapes_are_not_served() {
        let (_base, router) = fixture(true);
        let (status, _) = request(&router, Method::GET, "/foo/objects/info/packs").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = request(&router, Method::GET, "/foo/../static/index.txt").await;
        assert_ne!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn other_methods_are_rejected() {
        let (_base, router) = fixture(false);
        let (status, _) = request(&router, Method::POST, "/foo/info/refs").await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }

    fn router_for(base: &Path, names: &[&str], fallback: bool) -> Arc<Router> {
        let mut registry = Registry::default();
        for name in names {
            registry
                .insert(Repository {
                    name: name.to_string(),
                    origin: format!("https://example.com/{name}"),
                    interval: Duration::from_secs(60),
                    timeout: None,
                })
                .unwrap();
        }
        Arc::new(Router::new(base, Arc::new(registry), fallback))
    }

    #[tokio::test]
    async fn serves_percent_encoded_names() {
        let base = TempDir::new().unwrap();
        std::fs::create_dir_all(base.path().join("with space/info")).unwrap();
        std::fs::write(base.path().join("with space/info/refs"), "refs").unwrap();
        std::fs::create_dir_all(base.path().join("with space/objects/pack")).unwrap();
        std::fs::write(base.path().join("with space/objects/pack/a b.idx"), "idx").unwrap();
        let router = router_for(base.path(), &["with space"], false);

        let (status, body) = request(&router, Method::GET, "/with%20space/info/refs").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "refs");

        let (status, body) = request(&router, Method::GET, "/with%20space/objects/pack/a%20b.idx").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "idx");
    }

    #[tokio::test]
    async fn undecodable_paths_are_bad_requests() {
        let (_base, router) = fixture(true);
        let (status, _) = request(&router, Method::GET, "/foo/%FF%FE").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn partial_segment_matches_fall_through_to_base() {
        let base = TempDir::new().unwrap();
        std::fs::create_dir_all(base.path().join("foo")).unwrap();
        std::fs::create_dir_all(base.path().join("foobar")).unwrap();
        std::fs::write(base.path().join("foobar/HEAD"), "ref: refs/heads/main\n").unwrap();

        let router = router_for(base.path(), &["foo"], true);
        let (status, body) = request(&router, Method::GET, "/foobar/HEAD").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ref: refs/heads/main\n");

        let router = router_for(base.path(), &["foo"], false);
        let (status, _) = request(&router, Method::GET, "/foobar/HEAD").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test(start_paused = true)]
    async fn accept_errors_are_retried() {
        let mut failures = vec![
            Error::from(ErrorKind::ConnectionAborted),
            Error::other("too many open files"),
        ];
        let mut calls = 0;
        let started = time::Instant::now();
        let conn = accept_with_retry(|| {
            calls += 1;
            let next = failures.pop().map_or(Ok(7), Err);
            async move { next }
        })
        .await;
        assert_eq!(conn, 7);
        assert_eq!(calls, 3);
        assert_eq!(started.elapsed(), ACCEPT_RETRY_DELAY * 2);
    }

    #[tokio::test]
    async fn serves_over_tcp() {
        let (_base, router) = fixture(false);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(serve(listener, router));

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /foo/info/refs HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut raw = Vec::new();
        stream.read_to_end(&mut raw).await.unwrap();
        let text = String::from_utf8_lossy(&raw);
        assert!(text.starts_with("HTTP/1.1 200 OK"), "{text}");
        assert!(text.ends_with("abc\trefs/heads/main\n"), "{text}");

        server.abort();
    }
}
