//! Coalescing integration: the at-most-one-in-flight guarantee and stats.

mod common;

use std::time::Duration;

use common::ScriptedTransport;
use reqpipe::{GlobalConfig, IdempotentOptions, Method, RequestConfig, RequestCore};

#[tokio::test]
async fn three_simultaneous_gets_share_one_transport_call() {
    let transport = ScriptedTransport::with_delay(Duration::from_millis(100));
    let core = RequestCore::new(transport.clone());

    let mut handles = Vec::new();
    for _ in 0..3 {
        let core = core.clone();
        handles.push(tokio::spawn(async move {
            core.request_idempotent(
                RequestConfig::get("/x").with_param("id", 42),
                &IdempotentOptions::default(),
            )
            .await
        }));
    }

    let mut values = Vec::new();
    for handle in handles {
        values.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(transport.calls(), 1);
    assert_eq!(*values[0], *values[1]);
    assert_eq!(*values[1], *values[2]);

    let stats = core.idempotent_stats();
    assert_eq!(stats.total_requests, 3);
    assert_eq!(stats.duplicates_blocked, 2);
    assert_eq!(stats.actual_network_requests, 1);
}

#[tokio::test]
async fn different_params_do_not_coalesce() {
    let transport = ScriptedTransport::with_delay(Duration::from_millis(40));
    let core = RequestCore::new(transport.clone());

    let mut handles = Vec::new();
    for id in 0..3 {
        let core = core.clone();
        handles.push(tokio::spawn(async move {
            core.request_idempotent(
                RequestConfig::get("/x").with_param("id", id),
                &IdempotentOptions::default(),
            )
            .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    assert_eq!(transport.calls(), 3);
}

#[tokio::test]
async fn global_config_routes_and_restricts_methods() {
    let transport = ScriptedTransport::with_delay(Duration::from_millis(40));
    let core = RequestCore::with_config(
        transport.clone(),
        GlobalConfig::builder()
            .idempotent_enabled(true)
            .idempotent_methods(vec![Method::Get])
            .build(),
    );

    // Two plain GETs through request(): coalesced by the global flag.
    let first = {
        let core = core.clone();
        tokio::spawn(async move { core.get("/y").await })
    };
    tokio::time::sleep(Duration::from_millis(5)).await;
    core.get("/y").await.unwrap();
    first.await.unwrap().unwrap();
    assert_eq!(transport.calls(), 1);

    // PUT is outside the configured set, so it always reaches the transport.
    let put_first = {
        let core = core.clone();
        tokio::spawn(async move {
            core.put("/y", None).await
        })
    };
    tokio::time::sleep(Duration::from_millis(5)).await;
    core.put("/y", None).await.unwrap();
    put_first.await.unwrap().unwrap();
    assert_eq!(transport.calls(), 3);
}

#[tokio::test]
async fn settled_results_expire() {
    let transport = ScriptedTransport::new();
    let core = RequestCore::new(transport.clone());
    let options = IdempotentOptions::new().ttl(Duration::from_millis(30));

    core.request_idempotent(RequestConfig::get("/z"), &options)
        .await
        .unwrap();
    core.request_idempotent(RequestConfig::get("/z"), &options)
        .await
        .unwrap();
    assert_eq!(transport.calls(), 1);

    tokio::time::sleep(Duration::from_millis(50)).await;
    core.request_idempotent(RequestConfig::get("/z"), &options)
        .await
        .unwrap();
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn waiters_share_the_leaders_failure() {
    let transport = ScriptedTransport::with_delay(Duration::from_millis(60));
    transport.fail_network("/broken");
    let core = RequestCore::new(transport.clone());

    let mut handles = Vec::new();
    for _ in 0..3 {
        let core = core.clone();
        handles.push(tokio::spawn(async move {
            core.request_idempotent(RequestConfig::get("/broken"), &IdempotentOptions::default())
                .await
        }));
    }
    for handle in handles {
        let err = handle.await.unwrap().unwrap_err();
        assert!(err.is_network());
    }
    assert_eq!(transport.calls(), 1);
}
