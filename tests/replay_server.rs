//! Replay server behaviour over real sockets.

use axum::http::StatusCode;

mod common;

const ITEMS_PAGE_1: &str = "GET /api/items?page=1&size=10 HTTP/1.1\r\n\
Host: www.abc.com\r\n\
User-Agent: curl/8.0\r\n\
\r\n\
HTTP/1.1 200 OK\r\n\
Content-Type: application/json;charset=utf-8\r\n\
Server: nginx\r\n\
X-Frame-Options: DENY\r\n\
X-Request-Id: 5f1c\r\n\
Set-Cookie: session=abc\r\n\
Content-Length: 14\r\n\
\r\n\
{\"items\":[1]}\n";

const ITEMS_PAGE_2: &str = "GET /api/items?page=2 HTTP/1.1\r\n\
Host: www.abc.com\r\n\
\r\n\
HTTP/1.1 200 OK\r\n\
Content-Type: application/json\r\n\
\r\n\
{\"items\":[2]}";

const SAVE: &str = "POST /rest/?op=save HTTP/1.1\r\n\
Host: www.abc.com\r\n\
Content-Type: application/json\r\n\
\r\n\
{\"id\": 2814, \"tags\": [\"a\", \"b\"]}\r\n\
HTTP/1.1 201 Created\r\n\
Content-Type: application/json\r\n\
\r\n\
{\"status_code\":200}";

fn fixtures() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    common::write_fixture(dir.path(), "1.log", ITEMS_PAGE_1);
    common::write_fixture(dir.path(), "2.log", ITEMS_PAGE_2);
    common::write_fixture(dir.path(), "3.log", SAVE);
    dir
}

#[tokio::test]
async fn test_replays_recorded_response() {
    let dir = fixtures();
    let (addr, shutdown) = common::start_replay_server(dir.path()).await;

    let response = reqwest::get(format!("http://{addr}/api/items?page=1"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers().clone();
    assert_eq!(headers["content-type"], "application/json;charset=utf-8");
    assert_eq!(headers["server"], "nginx");
    assert_eq!(headers["x-frame-options"], "DENY");
    assert!(headers.get("x-request-id").is_none());
    assert!(headers.get("set-cookie").is_none());
    assert_eq!(response.text().await.unwrap(), "{\"items\":[1]}\n");

    shutdown.trigger();
}

#[tokio::test]
async fn test_query_selects_between_recordings() {
    let dir = fixtures();
    let (addr, shutdown) = common::start_replay_server(dir.path()).await;
    let client = reqwest::Client::new();

    let page_2 = client
        .get(format!("http://{addr}/api/items?page=2"))
        .send()
        .await
        .unwrap();
    assert_eq!(page_2.text().await.unwrap(), "{\"items\":[2]}");

    let unmatched = client
        .get(format!("http://{addr}/api/items?page=3"))
        .send()
        .await
        .unwrap();
    assert_eq!(unmatched.status(), StatusCode::NOT_FOUND);
    assert!(unmatched.text().await.unwrap().contains("url query is not matched"));

    shutdown.trigger();
}

#[tokio::test]
async fn test_unknown_path_is_404() {
    let dir = fixtures();
    let (addr, shutdown) = common::start_replay_server(dir.path()).await;

    let response = reqwest::get(format!("http://{addr}/api/unknown")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(response.text().await.unwrap().contains("404 page not found"));

    shutdown.trigger();
}

#[tokio::test]
async fn test_post_body_matching() {
    let dir = fixtures();
    let (addr, shutdown) = common::start_replay_server(dir.path()).await;
    let client = reqwest::Client::new();
    let url = format!("http://{addr}/rest/?op=save");

    let matched = client
        .post(&url)
        .body("{\"tags\":[\"a\",\"b\"],\"id\":2814}")
        .send()
        .await
        .unwrap();
    assert_eq!(matched.status(), StatusCode::CREATED);
    assert_eq!(matched.text().await.unwrap(), "{\"status_code\":200}");

    let reordered = client
        .post(&url)
        .body("{\"tags\":[\"b\",\"a\"],\"id\":2814}")
        .send()
        .await
        .unwrap();
    assert_eq!(reordered.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        reordered.text().await.unwrap(),
        "request body is not the same for POST /rest/"
    );

    shutdown.trigger();
}

#[tokio::test]
async fn test_corrupt_fixture_fails_startup() {
    let dir = fixtures();
    common::write_fixture(dir.path(), "4.log", "GET /broken HTTP/1.1\r\n\r\nconnection refused");

    let mut config = httpdump::DumpConfig::default();
    config.replay.dir = Some(dir.path().to_path_buf());
    let err = httpdump::HttpServer::new(config).err().unwrap();
    assert!(err.to_string().contains("4.log"));
}

#[tokio::test]
async fn test_repeated_requests_get_the_same_answer() {
    let dir = fixtures();
    let (addr, shutdown) = common::start_replay_server(dir.path()).await;
    let client = reqwest::Client::new();

    let mut bodies = Vec::new();
    for _ in 0..5 {
        let response = client
            .get(format!("http://{addr}/api/items"))
            .send()
            .await
            .unwrap();
        bodies.push(response.text().await.unwrap());
    }
    assert!(bodies.iter().all(|b| b == "{\"items\":[1]}\n"));

    shutdown.trigger();
}
