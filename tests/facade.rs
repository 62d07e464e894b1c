//! Facade integration: laws, helpers, lifecycle.

mod common;

use std::sync::Arc;

use common::ScriptedTransport;
use futures::future::BoxFuture;
use reqpipe::{
    Body, CacheOptions, ErrorOutcome, FnInterceptor, GlobalConfig, Pagination, PartData,
    RequestConfig, RequestCore, RequestError, Response, Transport,
};

#[tokio::test]
async fn merging_an_empty_global_config_is_identity() {
    let transport = ScriptedTransport::new();
    let core = RequestCore::new(transport.clone());

    // No base url, no defaults: the effective request is the submitted one.
    core.request(RequestConfig::get("/plain").with_param("a", 1))
        .await
        .unwrap();
    assert_eq!(transport.starts(), ["/plain"]);
}

#[tokio::test]
async fn base_url_and_headers_merge_under_requests() {
    let transport = ScriptedTransport::new();
    let core = RequestCore::with_config(
        transport.clone(),
        GlobalConfig::builder()
            .base_url("https://api.example.com")
            .header("x-app", "reqpipe")
            .build(),
    );

    core.get("/users").await.unwrap();
    assert_eq!(transport.starts(), ["https://api.example.com/users"]);
}

#[tokio::test]
async fn no_op_interceptors_are_transparent() {
    let transport = ScriptedTransport::new();
    let core = RequestCore::with_config(
        transport.clone(),
        GlobalConfig::builder()
            .interceptor(FnInterceptor::new())
            .interceptor(FnInterceptor::new())
            .build(),
    );

    let direct = RequestCore::new(transport.clone());
    let with_chain = core.get("/t").await.unwrap();
    let without_chain = direct.get("/t").await.unwrap();
    assert_eq!(with_chain.body, without_chain.body);
}

#[tokio::test]
async fn interceptor_recovery_replaces_a_failure() {
    let transport = ScriptedTransport::new();
    transport.fail_network("/down");
    let core = RequestCore::with_config(
        transport.clone(),
        GlobalConfig::builder()
            .interceptor(FnInterceptor::new().on_error(|_, _| {
                ErrorOutcome::Recovered(Response::json(serde_json::json!("fallback")))
            }))
            .build(),
    );

    let response = core.get("/down").await.unwrap();
    assert_eq!(response.body.as_json(), Some(&serde_json::json!("fallback")));
}

#[tokio::test]
async fn global_cache_flag_routes_plain_gets_through_the_cache() {
    let transport = ScriptedTransport::new();
    let core = RequestCore::with_config(
        transport.clone(),
        GlobalConfig::builder().cache_enabled(true).build(),
    );

    core.get("/c").await.unwrap();
    core.get("/c").await.unwrap();
    assert_eq!(transport.calls(), 1);
    assert_eq!(core.cache_stats().hits, 1);

    assert!(core.clear_cache(None));
    core.get("/c").await.unwrap();
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn get_paginated_parses_the_envelope() {
    struct PageTransport;

    impl Transport for PageTransport {
        fn send(
            &self,
            config: RequestConfig,
        ) -> BoxFuture<'static, Result<Response, RequestError>> {
            Box::pin(async move {
                assert_eq!(config.params.get("page"), Some(&serde_json::json!(2)));
                assert_eq!(config.params.get("limit"), Some(&serde_json::json!(5)));
                Ok(Response::json(serde_json::json!({
                    "data": [{"id": 6}, {"id": 7}],
                    "total": 12,
                })))
            })
        }
    }

    #[derive(serde::Deserialize, Debug, PartialEq)]
    struct Item {
        id: u64,
    }

    let core = RequestCore::new(Arc::new(PageTransport));
    let page = core
        .get_paginated::<Item>("/items", Pagination::new().page(2).limit(5))
        .await
        .unwrap();

    assert_eq!(page.data, vec![Item { id: 6 }, Item { id: 7 }]);
    assert_eq!(page.total, 12);
    assert!(page.has_next);
    assert!(page.has_prev);
}

#[tokio::test]
async fn form_upload_and_download_helpers() {
    struct InspectTransport;

    impl Transport for InspectTransport {
        fn send(
            &self,
            config: RequestConfig,
        ) -> BoxFuture<'static, Result<Response, RequestError>> {
            Box::pin(async move {
                match config.url.as_str() {
                    "/form" => {
                        assert_eq!(
                            config.headers.get("content-type"),
                            Some("application/x-www-form-urlencoded")
                        );
                        match &config.data {
                            Some(Body::Text(encoded)) => {
                                assert!(encoded.contains("name=a%20b"));
                            }
                            other => panic!("unexpected body: {other:?}"),
                        }
                        Ok(Response::json(serde_json::json!("ok")))
                    }
                    "/upload" => {
                        match &config.data {
                            Some(Body::Multipart(parts)) => {
                                assert_eq!(parts[0].name, "file");
                                assert_eq!(parts[0].filename.as_deref(), Some("notes.txt"));
                                assert_eq!(parts.len(), 2);
                            }
                            other => panic!("unexpected body: {other:?}"),
                        }
                        Ok(Response::json(serde_json::json!("ok")))
                    }
                    "/files/report.pdf" => Ok(Response::bytes(vec![1, 2, 3])
                        .with_header("content-type", "application/pdf")),
                    other => panic!("unexpected url {other}"),
                }
            })
        }
    }

    let core = RequestCore::new(Arc::new(InspectTransport));

    core.post_form("/form", vec![("name".into(), "a b".into())])
        .await
        .unwrap();

    core.upload_file(
        "/upload",
        reqpipe::FileUpload::new(PartData::Bytes(vec![0u8; 16]))
            .filename("notes.txt")
            .field("kind", "notes"),
    )
    .await
    .unwrap();

    let download = core.download_file("/files/report.pdf", None).await.unwrap();
    assert_eq!(download.filename, "report.pdf");
    assert_eq!(download.content_type.as_deref(), Some("application/pdf"));
    assert_eq!(download.data, vec![1, 2, 3]);
}

#[tokio::test]
async fn switch_transport_keeps_config_and_queues() {
    let first = ScriptedTransport::new();
    let core = RequestCore::with_config(
        first.clone(),
        GlobalConfig::builder().base_url("https://api.example.com").build(),
    );

    // Seed a serial queue.
    core.request(RequestConfig::get("/s").with_serial_key("persisted"))
        .await
        .unwrap();
    assert_eq!(core.serial_stats().total_queues, 1);

    let second = ScriptedTransport::new();
    core.switch_transport(second.clone());

    core.get("/after").await.unwrap();
    assert_eq!(first.calls(), 1);
    assert_eq!(second.calls(), 1);
    // Base url still applies and the queue state survived.
    assert_eq!(second.starts(), ["https://api.example.com/after"]);
    assert_eq!(core.serial_stats().total_queues, 1);
}

#[tokio::test]
async fn destroy_is_idempotent_and_resets_state() {
    let transport = ScriptedTransport::new();
    let core = RequestCore::with_config(
        transport.clone(),
        GlobalConfig::builder().base_url("https://api.example.com").build(),
    );

    core.request_with_cache(RequestConfig::get("/x"), &CacheOptions::default())
        .await
        .unwrap();
    core.request(RequestConfig::get("/y").with_serial_key("k"))
        .await
        .unwrap();
    assert_eq!(core.cache_stats().entries, 1);

    core.destroy();
    core.destroy();

    assert_eq!(core.cache_stats().entries, 0);
    assert_eq!(core.serial_stats().total_queues, 0);
    assert!(core.global_config().base_url.is_none());
}

#[tokio::test]
async fn debug_mode_does_not_alter_outcomes() {
    common::init_tracing();

    let transport = ScriptedTransport::new();
    transport.fail_network("/dbg-broken");
    let core = RequestCore::with_config(
        transport,
        GlobalConfig::builder().debug(true).build(),
    );

    assert!(core.get("/dbg").await.unwrap().is_success());
    assert!(core.get("/dbg-broken").await.unwrap_err().is_network());
}

#[tokio::test]
async fn all_stats_compose_every_subsystem() {
    let transport = ScriptedTransport::new();
    let core = RequestCore::new(transport);

    core.request_with_cache(RequestConfig::get("/a"), &CacheOptions::default())
        .await
        .unwrap();
    core.request_concurrent(
        vec![RequestConfig::get("/b")],
        &reqpipe::ConcurrentOptions::new(),
    )
    .await
    .unwrap();
    core.request_idempotent(
        RequestConfig::get("/c"),
        &reqpipe::IdempotentOptions::default(),
    )
    .await
    .unwrap();
    core.request(RequestConfig::get("/d").with_serial_key("k"))
        .await
        .unwrap();

    let stats = core.all_stats();
    assert_eq!(stats.cache.misses, 1);
    assert_eq!(stats.concurrent.total_tasks, 1);
    assert_eq!(stats.idempotent.total_requests, 1);
    assert_eq!(stats.serial.total_completed_tasks, 1);
}
