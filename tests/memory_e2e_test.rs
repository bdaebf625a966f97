//! Broker, workers and clients wired through the in-memory transport

mod support;

use pirate_broker::{Broker, BrokerStats};
use pirate_protocol::{BrokerClient, Envelope, MemoryHub, MemoryRouter, ProtocolError};
use pirate_worker::Connector;
use std::time::Duration;
use support::{
    config, evaluate, onemax_worker, Catalog, ConfigurationResponse, EvaluateResponse, OneMax,
};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

const INTERVAL: Duration = Duration::from_secs(1);

type MemoryBroker = Broker<MemoryRouter, MemoryRouter>;

fn spawn_broker(hub: &MemoryHub, shutdown: CancellationToken) -> JoinHandle<MemoryBroker> {
    let config = config(INTERVAL, vec![]);
    let mut broker = Broker::new(
        &config,
        hub.bind("frontend").unwrap(),
        hub.bind("backend").unwrap(),
    );
    tokio::spawn(async move {
        broker.run(shutdown).await.unwrap();
        broker
    })
}

fn spawn_worker(
    mut worker: Connector<OneMax>,
    shutdown: CancellationToken,
) -> JoinHandle<Connector<OneMax>> {
    tokio::spawn(async move {
        worker.run(shutdown).await.unwrap();
        worker
    })
}

fn client(hub: &MemoryHub) -> BrokerClient {
    BrokerClient::new(hub.connector("frontend"), Duration::from_secs(2), 3)
}

fn fitness(response: Envelope) -> u32 {
    response.unpack::<EvaluateResponse>().unwrap().fitness
}

#[tokio::test(start_paused = true)]
async fn test_run_routed_by_cached_language() {
    let hub = MemoryHub::new();
    let broker_shutdown = CancellationToken::new();
    let broker = spawn_broker(&hub, broker_shutdown.clone());

    // W handles language 0, a second worker only language 1
    let w_shutdown = CancellationToken::new();
    let w = spawn_worker(
        onemax_worker(&config(INTERVAL, vec![0]), hub.connector("backend")),
        w_shutdown.clone(),
    );
    let other_shutdown = CancellationToken::new();
    let other = spawn_worker(
        onemax_worker(&config(INTERVAL, vec![1]), hub.connector("backend")),
        other_shutdown.clone(),
    );
    sleep(Duration::from_millis(50)).await;

    let mut client = client(&hub);
    let first = client.request("r1", 0, &evaluate(&[1, 0, 1, 1])).await.unwrap();
    assert_eq!(fitness(first), 3);

    // No language frame this time; the binding routes it
    let second = client.request("r1", 0, &evaluate(&[1, 1, 1, 1, 1])).await.unwrap();
    assert_eq!(fitness(second), 5);

    // Once W is gone and purged, run r1 has nowhere to go
    w_shutdown.cancel();
    w.await.unwrap();
    sleep(INTERVAL * 5).await;

    let orphaned = client.request("r1", 0, &evaluate(&[1])).await;
    assert!(matches!(orphaned, Err(ProtocolError::Timeout)));

    other_shutdown.cancel();
    other.await.unwrap();
    broker_shutdown.cancel();
    let broker = broker.await.unwrap();
    let stats: BrokerStats = broker.stats();
    assert_eq!(stats.forwarded_replies, 2);
    assert!(stats.dropped_requests >= 1);
    assert_eq!(stats.cached_runs, 1);
}

#[tokio::test(start_paused = true)]
async fn test_run_started_before_any_worker() {
    let hub = MemoryHub::new();
    let shutdown = CancellationToken::new();
    let broker = spawn_broker(&hub, shutdown.clone());
    let mut client = client(&hub);

    // The only capable worker shows up after the first attempt timed out
    let late_worker = async {
        sleep(Duration::from_millis(2500)).await;
        spawn_worker(
            onemax_worker(&config(INTERVAL, vec![0]), hub.connector("backend")),
            shutdown.clone(),
        )
    };
    let first_request = evaluate(&[1, 1, 0]);
    let (first, worker) = tokio::join!(client.request("r1", 0, &first_request), late_worker);
    assert_eq!(fitness(first.unwrap()), 2);
    assert!(client.is_bound("r1"));

    let second = client.request("r1", 0, &evaluate(&[1, 1, 1])).await.unwrap();
    assert_eq!(fitness(second), 3);

    shutdown.cancel();
    assert_eq!(worker.await.unwrap().stats().requests_handled, 2);
    let stats = broker.await.unwrap().stats();
    assert_eq!(stats.forwarded_replies, 2);
    assert_eq!(stats.cached_runs, 1);
    assert!(stats.dropped_requests >= 2);
}

#[tokio::test(start_paused = true)]
async fn test_algorithm_lifecycle() {
    let hub = MemoryHub::new();
    let shutdown = CancellationToken::new();
    let broker = spawn_broker(&hub, shutdown.clone());
    let worker = spawn_worker(
        onemax_worker(&config(INTERVAL, vec![2]), hub.connector("backend")),
        shutdown.clone(),
    );
    sleep(Duration::from_millis(50)).await;

    let mut client = client(&hub);
    let started = client
        .request("run-42", 2, &Envelope::new("StartAlgorithmRequest", b"{}".to_vec()))
        .await
        .unwrap();
    assert_eq!(started.message_name(), "StartAlgorithmResponse");

    let evaluated = client.request("run-42", 2, &evaluate(&[0, 1])).await.unwrap();
    assert_eq!(fitness(evaluated), 1);

    let stopped = client
        .request("run-42", 2, &Envelope::new("StopAlgorithmRequest", Vec::new()))
        .await
        .unwrap();
    assert!(stopped.is_empty());

    shutdown.cancel();
    let worker = worker.await.unwrap();
    assert!(worker.handler().active_runs.is_empty());
    assert_eq!(worker.stats().requests_handled, 3);
    broker.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_configuration_request_reaches_config_worker() {
    let hub = MemoryHub::new();
    let shutdown = CancellationToken::new();
    let broker = spawn_broker(&hub, shutdown.clone());

    let plain = spawn_worker(
        onemax_worker(&config(INTERVAL, vec![0]), hub.connector("backend")),
        shutdown.clone(),
    );
    let catalog = spawn_worker(
        onemax_worker(&config(INTERVAL, vec![0]), hub.connector("backend"))
            .with_configuration_handler(Catalog),
        shutdown.clone(),
    );
    sleep(Duration::from_millis(50)).await;

    let mut client = client(&hub);
    let response = client
        .configuration(&Envelope::new("ConfigurationRequest", Vec::new()))
        .await
        .unwrap();
    assert_eq!(
        response.unpack::<ConfigurationResponse>().unwrap().algorithms,
        vec!["ga", "es"]
    );

    shutdown.cancel();
    assert_eq!(plain.await.unwrap().stats().requests_handled, 0);
    assert_eq!(catalog.await.unwrap().stats().requests_handled, 1);
    broker.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_worker_survives_broker_restart() {
    let hub = MemoryHub::new();
    let first_shutdown = CancellationToken::new();
    let first = spawn_broker(&hub, first_shutdown.clone());

    let worker_shutdown = CancellationToken::new();
    let worker = spawn_worker(
        onemax_worker(&config(INTERVAL, vec![0]), hub.connector("backend")),
        worker_shutdown.clone(),
    );
    sleep(Duration::from_millis(50)).await;

    // Unbind both endpoints by dropping the broker
    first_shutdown.cancel();
    drop(first.await.unwrap());
    sleep(INTERVAL * 2).await;

    let second_shutdown = CancellationToken::new();
    let second = spawn_broker(&hub, second_shutdown.clone());

    // Liveness runs out, the worker backs off and registers again
    sleep(INTERVAL * 12).await;

    let mut client = client(&hub);
    let response = client.request("r2", 0, &evaluate(&[1, 1])).await.unwrap();
    assert_eq!(fitness(response), 2);

    worker_shutdown.cancel();
    let worker = worker.await.unwrap();
    assert!(worker.stats().reconnects >= 1);
    second_shutdown.cancel();
    second.await.unwrap();
}
