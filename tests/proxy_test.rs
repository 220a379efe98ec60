//! End-to-end forwarding tests through a real listener.

use std::time::Duration;

use axum::http::StatusCode;
use path_gateway::http::Outcome;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;

mod common;

use common::{client, request_line, start_gateway};

const LOG_WAIT: Duration = Duration::from_secs(2);

#[tokio::test]
async fn forwards_with_base_path_and_merged_query() {
    let backend = common::start_echo_backend().await;
    let gateway = start_gateway(
        &[("svc", format!("http://{backend}/base?key=abc"))],
        5,
    )
    .await;

    let res = client()
        .get(gateway.url("/svc/items?page=2"))
        .send()
        .await
        .expect("gateway unreachable");

    assert_eq!(res.status(), 200);
    let head = res.text().await.unwrap();
    assert_eq!(request_line(&head), "GET /base/items?key=abc&page=2 HTTP/1.1");

    gateway.shutdown.trigger();
}

#[tokio::test]
async fn query_merge_covers_every_combination() {
    let backend = common::start_echo_backend().await;
    let gateway = start_gateway(
        &[
            ("plain", format!("http://{backend}")),
            ("keyed", format!("http://{backend}/?k=v")),
        ],
        5,
    )
    .await;

    let cases = [
        ("/plain/x", "GET /x HTTP/1.1"),
        ("/plain/x?y=1", "GET /x?y=1 HTTP/1.1"),
        ("/keyed/x", "GET /x?k=v HTTP/1.1"),
        ("/keyed/x?y=1", "GET /x?k=v&y=1 HTTP/1.1"),
        ("/keyed/x?k=override", "GET /x?k=v&k=override HTTP/1.1"),
    ];

    let client = client();
    for (path, expected) in cases {
        let head = client
            .get(gateway.url(path))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(request_line(&head), expected, "request to {path}");
    }

    gateway.shutdown.trigger();
}

#[tokio::test]
async fn repeated_requests_are_rewritten_identically() {
    let backend = common::start_echo_backend().await;
    let gateway = start_gateway(&[("svc", format!("http://{backend}?key=abc"))], 5).await;

    let client = client();
    let mut lines = Vec::new();
    for _ in 0..2 {
        let head = client
            .get(gateway.url("/svc/a?b=c"))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        lines.push(request_line(&head).to_string());
    }

    assert_eq!(lines[0], "GET /a?key=abc&b=c HTTP/1.1");
    assert_eq!(lines[0], lines[1]);

    gateway.shutdown.trigger();
}

#[tokio::test]
async fn forwards_method_body_and_proxy_headers() {
    let backend = common::start_programmable_backend(|head| async move { (200, head) }).await;
    let gateway = start_gateway(&[("svc", format!("http://{backend}"))], 5).await;

    let res = client()
        .delete(gateway.url("/svc/items/7"))
        .header("X-Request-Id", "abc-123")
        .send()
        .await
        .unwrap();
    let head = res.text().await.unwrap().to_ascii_lowercase();

    assert!(head.starts_with("delete /items/7 http/1.1"), "{head}");
    assert!(head.contains("x-forwarded-for: 127.0.0.1"), "{head}");
    assert!(head.contains("x-request-id: abc-123"), "{head}");
    assert!(head.contains(&format!("host: {}", gateway.addr)), "{head}");

    gateway.shutdown.trigger();
}

#[tokio::test]
async fn similar_prefix_does_not_match() {
    let backend = common::start_echo_backend().await;
    let gateway = start_gateway(&[("api", format!("http://{backend}"))], 5).await;

    let client = client();
    let res = client.get(gateway.url("/apikey/foo")).send().await.unwrap();
    assert_eq!(res.status(), 404);

    let res = client.get(gateway.url("/api/foo")).send().await.unwrap();
    assert_eq!(res.status(), 200);

    gateway.shutdown.trigger();
}

#[tokio::test]
async fn unmatched_path_is_logged_as_not_found() {
    let backend = common::start_echo_backend().await;
    let gateway = start_gateway(&[("svc", format!("http://{backend}"))], 5).await;

    let res = client()
        .get(gateway.url("/nope/x?y=1"))
        .header("X-Request-Id", "req-404")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 404);
    res.bytes().await.unwrap();

    let records = gateway.sink.wait_for(1, LOG_WAIT).await;
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.request, "/nope/x?y=1");
    assert_eq!(record.method.as_str(), "GET");
    assert_eq!(record.status, StatusCode::NOT_FOUND);
    assert_eq!(record.status_text(), "Not Found");
    assert_eq!(record.request_id.as_deref(), Some("req-404"));
    assert_eq!(record.remote.map(|a| a.ip().to_string()).as_deref(), Some("127.0.0.1"));

    gateway.shutdown.trigger();
}

#[tokio::test]
async fn logged_status_matches_sent_status() {
    let backend = common::start_programmable_backend(|head| async move {
        if head.starts_with("GET /fail") {
            (503, "down".to_string())
        } else {
            (200, "up".to_string())
        }
    })
    .await;
    let gateway = start_gateway(&[("svc", format!("http://{backend}"))], 5).await;

    let client = client();
    let mut sent = Vec::new();
    for path in ["/svc/fail", "/svc/ok"] {
        let res = client.get(gateway.url(path)).send().await.unwrap();
        sent.push(res.status().as_u16());
        res.bytes().await.unwrap();
    }
    assert_eq!(sent, vec![503, 200]);

    let records = gateway.sink.wait_for(2, LOG_WAIT).await;
    assert_eq!(records.len(), 2);
    for record in &records {
        let expected = if record.request == "/svc/fail" { 503 } else { 200 };
        assert_eq!(record.status.as_u16(), expected, "{}", record.request);
        assert_eq!(record.outcome, Outcome::Completed);
    }

    gateway.shutdown.trigger();
}

#[tokio::test]
async fn unreachable_backend_is_bad_gateway() {
    let dead = common::unused_addr().await;
    let gateway = start_gateway(&[("svc", format!("http://{dead}"))], 5).await;

    let res = client().get(gateway.url("/svc/x")).send().await.unwrap();
    assert_eq!(res.status(), 502);
    res.bytes().await.unwrap();

    let records = gateway.sink.wait_for(1, LOG_WAIT).await;
    assert_eq!(records[0].status, StatusCode::BAD_GATEWAY);
    assert_eq!(records[0].status_text(), "Bad Gateway");

    gateway.shutdown.trigger();
}

#[tokio::test]
async fn bare_prefix_and_dirty_paths_redirect() {
    let backend = common::start_echo_backend().await;
    let gateway = start_gateway(&[("svc", format!("http://{backend}"))], 5).await;

    let client = client();
    let res = client.get(gateway.url("/svc?page=2")).send().await.unwrap();
    assert_eq!(res.status(), 301);
    assert_eq!(res.headers()["location"], "/svc/?page=2");

    let res = client.get(gateway.url("//svc//b")).send().await.unwrap();
    assert_eq!(res.status(), 301);
    assert_eq!(res.headers()["location"], "/svc/b");

    gateway.shutdown.trigger();
}

#[tokio::test]
async fn cors_headers_are_added() {
    let backend = common::start_echo_backend().await;
    let gateway = start_gateway(&[("svc", format!("http://{backend}"))], 5).await;

    let res = client()
        .get(gateway.url("/svc/x"))
        .header("Origin", "https://app.example")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["access-control-allow-origin"], "*");

    gateway.shutdown.trigger();
}

#[tokio::test]
async fn concurrent_requests_to_different_routes_do_not_interfere() {
    let alpha = common::start_fixed_backend("alpha").await;
    let beta = common::start_fixed_backend("beta").await;
    let gateway = start_gateway(
        &[
            ("alpha", format!("http://{alpha}")),
            ("beta", format!("http://{beta}")),
        ],
        5,
    )
    .await;

    let client = client();
    let mut tasks = Vec::new();
    for i in 0..20 {
        let route = if i % 2 == 0 { "alpha" } else { "beta" };
        let url = gateway.url(&format!("/{route}/item/{i}"));
        let client = client.clone();
        tasks.push(tokio::spawn(async move {
            let body = client.get(url).send().await.unwrap().text().await.unwrap();
            (route, body)
        }));
    }

    for task in tasks {
        let (route, body) = task.await.unwrap();
        assert_eq!(body, route);
    }

    let records = gateway.sink.wait_for(20, LOG_WAIT).await;
    assert_eq!(records.len(), 20);

    gateway.shutdown.trigger();
}

#[tokio::test]
async fn percent_encoded_paths_reach_their_route() {
    let backend = common::start_echo_backend().await;
    let gateway = start_gateway(
        &[
            ("café", format!("http://{backend}")),
            ("svc", format!("http://{backend}/base")),
        ],
        5,
    )
    .await;

    let client = client();
    let cases = [
        ("/caf%C3%A9/items?x=1", "GET /items?x=1 HTTP/1.1"),
        ("/sv%63/a%20b", "GET /base/a%20b HTTP/1.1"),
    ];
    for (path, expected) in cases {
        let res = client.get(gateway.url(path)).send().await.unwrap();
        assert_eq!(res.status(), 200, "{path}");
        let head = res.text().await.unwrap();
        assert_eq!(request_line(&head), expected, "{path}");
    }

    gateway.shutdown.trigger();
}

#[tokio::test]
async fn head_requests_are_logged_as_completed() {
    let backend = common::start_fixed_backend("ignored for HEAD").await;
    let gateway = start_gateway(&[("svc", format!("http://{backend}"))], 5).await;

    let client = client();
    let res = client.head(gateway.url("/nope/x")).send().await.unwrap();
    assert_eq!(res.status(), 404);
    let res = client.head(gateway.url("/svc/x")).send().await.unwrap();
    assert_eq!(res.status(), 200);

    let records = gateway.sink.wait_for(2, LOG_WAIT).await;
    assert_eq!(records.len(), 2);
    for record in &records {
        assert_eq!(record.method.as_str(), "HEAD");
        assert_eq!(record.outcome, Outcome::Completed, "{}", record.request);
    }
    let missing = records.iter().find(|r| r.request == "/nope/x").unwrap();
    assert_eq!(missing.status, StatusCode::NOT_FOUND);

    gateway.shutdown.trigger();
}

#[tokio::test]
async fn backend_failing_mid_body_truncates_the_response() {
    let backend = common::start_raw_backend(|mut socket, _head| async move {
        let _ = socket
            .write_all(b"HTTP/1.1 201 Created\r\nContent-Length: 100\r\n\r\npartial")
            .await;
        let _ = socket.shutdown().await;
    })
    .await;
    let gateway = start_gateway(&[("svc", format!("http://{backend}"))], 5).await;

    let res = client().get(gateway.url("/svc/partial")).send().await.unwrap();
    assert_eq!(res.status(), 201);
    assert!(res.bytes().await.is_err());

    let records = gateway.sink.wait_for(1, LOG_WAIT).await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, StatusCode::CREATED);
    assert_eq!(records[0].outcome, Outcome::Truncated);

    gateway.shutdown.trigger();
}

#[tokio::test]
async fn client_disconnect_releases_backend_and_is_logged() {
    let (closed_tx, mut closed_rx) = mpsc::unbounded_channel();
    let backend = common::start_raw_backend(move |mut socket, _head| {
        let closed_tx = closed_tx.clone();
        async move {
            let head = "HTTP/1.1 200 OK\r\nContent-Length: 1000000\r\n\r\n";
            if socket.write_all(head.as_bytes()).await.is_err() {
                return;
            }
            let mut interval = tokio::time::interval(Duration::from_millis(50));
            let mut buf = [0u8; 64];
            loop {
                tokio::select! {
                    read = socket.read(&mut buf) => {
                        if matches!(read, Ok(0) | Err(_)) {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        if socket.write_all(b"chunk").await.is_err() {
                            break;
                        }
                    }
                }
            }
            let _ = closed_tx.send(());
        }
    })
    .await;
    let gateway = start_gateway(&[("svc", format!("http://{backend}"))], 5).await;

    let mut res = client().get(gateway.url("/svc/stream")).send().await.unwrap();
    assert_eq!(res.status(), 200);
    let first = res.chunk().await.unwrap();
    assert!(first.is_some());
    drop(res);

    tokio::time::timeout(Duration::from_secs(5), closed_rx.recv())
        .await
        .expect("backend connection should be released")
        .unwrap();

    let records = gateway.sink.wait_for(1, LOG_WAIT).await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, StatusCode::OK);
    assert_eq!(records[0].outcome, Outcome::Cancelled);

    gateway.shutdown.trigger();
}
