//! Breakers under concurrent use.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use breaker_proxy::config::ProxyConfig;
use breaker_proxy::resilience::{Breaker, BreakerOptions, BreakerStatus, TripPolicy};

mod common;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_failures_are_not_lost() {
    let breaker = Arc::new(Breaker::new(
        "busy.test",
        TripPolicy::Threshold { threshold: 10_000 },
        BreakerOptions::default(),
    ));

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let breaker = breaker.clone();
            tokio::spawn(async move {
                for _ in 0..100 {
                    breaker.record_failure();
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    let snap = breaker.snapshot();
    assert_eq!(snap.failures, 800);
    assert_eq!(snap.status, BreakerStatus::Closed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_outcomes_fill_rate_window() {
    let breaker = Arc::new(Breaker::new(
        "busy.test",
        TripPolicy::Rate {
            rate: 1.0,
            window: 10_000,
        },
        BreakerOptions::default(),
    ));

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let breaker = breaker.clone();
            tokio::spawn(async move {
                for _ in 0..50 {
                    if i % 2 == 0 {
                        breaker.record_failure();
                    } else {
                        breaker.record_success();
                    }
                }
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    let snap = breaker.snapshot();
    assert_eq!(snap.window_len, Some(400));
    assert_eq!(snap.failures, 200);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_half_open_admits_one_trial() {
    let breaker = Arc::new(Breaker::new(
        "flaky.test",
        TripPolicy::Consecutive { threshold: 1 },
        BreakerOptions {
            cooldown: Duration::from_millis(50),
            half_open_max_trials: 1,
        },
    ));
    breaker.record_failure();
    tokio::time::sleep(Duration::from_millis(80)).await;

    let admitted = Arc::new(AtomicU32::new(0));
    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let breaker = breaker.clone();
            let admitted = admitted.clone();
            tokio::spawn(async move {
                if breaker.ready() {
                    admitted.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(admitted.load(Ordering::SeqCst), 1);
    assert_eq!(breaker.status(), BreakerStatus::HalfOpen);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_tunnels_each_record_once() {
    let upstream = common::start_echo_upstream().await;
    let mut config = ProxyConfig::default();
    config.hosts = vec![common::host_config("127.0.0.1", "rate", 0, 5_000)];
    let proxy = common::start_proxy(config).await;
    let target = upstream.to_string();

    let clients: Vec<_> = (0..20)
        .map(|i| {
            let target = target.clone();
            let addr = proxy.addr;
            tokio::spawn(async move {
                let (mut stream, head) = common::connect_via(addr, &target).await;
                assert_eq!(head, "HTTP/1.0 200 OK\r\n\r\n");
                common::assert_echo(&mut stream, format!("client {}", i).as_bytes()).await;
                common::finish(stream).await;
            })
        })
        .collect();
    for client in clients {
        client.await.unwrap();
    }

    let snap = proxy.wait_for("127.0.0.1", |s| s.window_len == Some(20)).await;
    assert_eq!(snap.failures, 0);
    assert_eq!(snap.status, BreakerStatus::Closed);
}
