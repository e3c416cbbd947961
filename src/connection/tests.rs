use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::timeout;

use super::connection::{Connection, ConnectionState, connect};
use super::options::ConnectOptions;
use crate::config::Settings;
use crate::dispatch::BoxError;
use crate::request::SequentialTokens;
use crate::subject::Message;
use crate::transport::LocalBroker;
use crate::utils::error::{Error, HandlerError, HandlerErrorKind};

const URL: &str = "nats://127.0.0.1:4222";

fn options(broker: &LocalBroker) -> ConnectOptions {
    ConnectOptions::new(Arc::new(broker.clone())).server(URL)
}

async fn connected(broker: &LocalBroker) -> Connection {
    connect(options(broker)).await.unwrap()
}

/// Handler forwarding every payload to `tx`.
fn forward(
    tx: &mpsc::UnboundedSender<String>,
) -> impl Fn(Message) -> futures::future::Ready<Result<(), BoxError>> + Send + Sync + 'static {
    let tx = tx.clone();
    move |msg: Message| {
        let _ = tx.send(msg.payload_str().unwrap_or_default().to_string());
        futures::future::ready(Ok(()))
    }
}

/// Responder answering every request with `answer`.
fn responder(
    nc: &Connection,
    answer: &'static str,
) -> impl Fn(Message) -> futures::future::Ready<Result<(), BoxError>> + Send + Sync + 'static {
    let nc = nc.clone();
    move |msg: Message| futures::future::ready(nc.respond(&msg, answer).map_err(Into::into))
}

async fn recv(rx: &mut mpsc::UnboundedReceiver<String>) -> String {
    timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("timed out waiting for message")
        .expect("channel closed")
}

#[tokio::test]
async fn test_operations_before_connect() {
    let broker = LocalBroker::new(URL);
    let nc = Connection::new(options(&broker));
    let (tx, _rx) = mpsc::unbounded_channel();

    assert_eq!(nc.state(), ConnectionState::Disconnected);
    assert_eq!(nc.publish("channel1", "hi"), Err(Error::NotConnected));
    assert_eq!(
        nc.subscribe("channel1", forward(&tx)).unwrap_err(),
        Error::NotConnected
    );
    assert_eq!(
        nc.request("help", "hi", Duration::from_secs(1))
            .await
            .unwrap_err(),
        Error::NotConnected
    );
    assert_eq!(broker.connections(), 0);
}

#[tokio::test]
async fn test_connect_without_servers() {
    let broker = LocalBroker::new(URL);
    let err = connect(ConnectOptions::new(Arc::new(broker))).await.err();
    assert_eq!(err, Some(Error::NoServers));
}

#[tokio::test]
async fn test_connect_with_unreachable_servers() {
    let broker = LocalBroker::new(URL);
    let nc = Connection::new(
        ConnectOptions::new(Arc::new(broker.clone()))
            .servers(["nats://10.0.0.1:4222", "nats://10.0.0.2:4222"]),
    );

    assert_eq!(nc.connect().await, Err(Error::NoServers));
    assert_eq!(nc.state(), ConnectionState::Disconnected);
    assert_eq!(broker.connections(), 0);
}

#[tokio::test]
async fn test_connect_falls_back_to_next_server() {
    let broker = LocalBroker::new(URL);
    let nc = connect(
        ConnectOptions::new(Arc::new(broker.clone()))
            .server("nats://10.0.0.1:4222")
            .server(URL)
            .name("fallback"),
    )
    .await
    .unwrap();

    assert_eq!(nc.state(), ConnectionState::Connected);
    assert_eq!(nc.name(), Some("fallback"));
    assert_eq!(broker.connections(), 1);

    // connecting again is a no-op
    nc.connect().await.unwrap();
    assert_eq!(broker.connections(), 1);
}

#[tokio::test]
async fn test_publish_subscribe() {
    let broker = LocalBroker::new(URL);
    let nc = connected(&broker).await;
    let (tx1, mut rx1) = mpsc::unbounded_channel();
    let (tx2, mut rx2) = mpsc::unbounded_channel();

    let sub1 = nc.subscribe("channel1", forward(&tx1)).unwrap();
    nc.subscribe("channel2", forward(&tx2)).unwrap();

    nc.publish("channel1", "Hello from channel1").unwrap();
    nc.publish("channel1", "Bye from channel1").unwrap();
    nc.publish("channel2", "Hello from channel2").unwrap();
    nc.publish("channel3", "nobody listens").unwrap();

    assert_eq!(recv(&mut rx1).await, "Hello from channel1");
    assert_eq!(recv(&mut rx1).await, "Bye from channel1");
    assert_eq!(recv(&mut rx2).await, "Hello from channel2");
    assert_eq!(sub1.delivered(), 2);
    assert_eq!(nc.subscription_count(), 2);

    let stats = nc.stats();
    assert_eq!(stats.out_msgs, 4);
    assert_eq!(stats.in_msgs, 4);
    assert_eq!(stats.dropped_msgs, 1);
    assert_eq!(broker.routed(), 4);
}

#[tokio::test]
async fn test_publish_rejects_invalid_subjects() {
    let broker = LocalBroker::new(URL);
    let nc = connected(&broker).await;

    for subject in ["", "a..b", "orders.*", "orders.>", "has space"] {
        assert!(
            matches!(nc.publish(subject, "x"), Err(Error::InvalidSubject { .. })),
            "{subject:?}"
        );
    }
    assert!(matches!(
        nc.publish_with_reply("orders", "reply.*", "x"),
        Err(Error::InvalidSubject { .. })
    ));
    assert_eq!(nc.stats().out_msgs, 0);
}

#[tokio::test]
async fn test_wildcard_subscription_over_connection() {
    let broker = LocalBroker::new(URL);
    let nc = connected(&broker).await;
    let (tx, mut rx) = mpsc::unbounded_channel();

    nc.subscribe("sensors.*.temp", forward(&tx)).unwrap();
    nc.publish("sensors.kitchen.temp", "21").unwrap();
    nc.publish("sensors.kitchen.humidity", "40").unwrap();
    nc.publish("sensors.garage.temp", "12").unwrap();

    assert_eq!(recv(&mut rx).await, "21");
    assert_eq!(recv(&mut rx).await, "12");
}

#[tokio::test]
async fn test_publish_with_reply_and_respond() {
    let broker = LocalBroker::new(URL);
    let nc = connected(&broker).await;
    let (tx, mut rx) = mpsc::unbounded_channel();

    nc.subscribe("help", responder(&nc, "I help you")).unwrap();
    nc.subscribe("my.inbox", forward(&tx)).unwrap();

    nc.publish_with_reply("help", "my.inbox", "Plz help me").unwrap();
    assert_eq!(recv(&mut rx).await, "I help you");
}

#[test]
fn test_respond_without_reply_subject() {
    let broker = LocalBroker::new(URL);
    let nc = Connection::new(options(&broker));
    let msg = Message::new(crate::subject::Subject::concrete("help").unwrap(), "x");

    // checked before the connection state
    assert_eq!(nc.respond(&msg, "y"), Err(Error::NoReplySubject));
}

#[tokio::test]
async fn test_request_reply() {
    let broker = LocalBroker::new(URL);
    let nc = connected(&broker).await;
    nc.queue_subscribe("help", "workers", responder(&nc, "I help you"))
        .unwrap();

    let reply = nc
        .request("help", "Plz help me", Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(reply.payload_str(), Some("I help you"));
    assert!(reply.subject().as_str().starts_with("_INBOX."));

    assert_eq!(nc.pending_requests(), 0);
    assert_eq!(nc.subscription_count(), 1);
}

#[tokio::test]
async fn test_request_without_deadline() {
    let broker = LocalBroker::new(URL);
    let nc = connected(&broker).await;
    nc.subscribe("help", responder(&nc, "ok")).unwrap();

    let reply = nc.request("help", "x", Duration::MAX).await.unwrap();
    assert_eq!(reply.payload_str(), Some("ok"));
    assert_eq!(nc.pending_requests(), 0);
}

#[tokio::test]
async fn test_request_reply_across_connections() {
    let broker = LocalBroker::new(URL);
    let client = connected(&broker).await;
    let server = connected(&broker).await;
    server
        .subscribe("time.now", responder(&server, "noon"))
        .unwrap();

    let reply = client
        .request("time.now", "", Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(reply.payload_str(), Some("noon"));
}

#[tokio::test(start_paused = true)]
async fn test_request_timeout_leaves_nothing_behind() {
    let broker = LocalBroker::new(URL);
    let nc = connect(options(&broker).token_generator(Arc::new(SequentialTokens::new())))
        .await
        .unwrap();

    let err = nc
        .request("help", "anyone?", Duration::from_millis(200))
        .await
        .unwrap_err();
    assert_eq!(err, Error::Timeout);
    assert_eq!(nc.pending_requests(), 0);
    assert_eq!(nc.subscription_count(), 0);

    // a late reply to the expired inbox is dropped quietly
    nc.publish("_INBOX.1", "too late").unwrap();
    assert_eq!(nc.stats().dropped_msgs, 2);
}

#[tokio::test]
async fn test_queue_group_within_connection() {
    let broker = LocalBroker::new(URL);
    let nc = connected(&broker).await;
    let (tx_a, mut rx_a) = mpsc::unbounded_channel();
    let (tx_b, mut rx_b) = mpsc::unbounded_channel();

    let a = nc.queue_subscribe("jobs", "workers", forward(&tx_a)).unwrap();
    let b = nc.queue_subscribe("jobs", "workers", forward(&tx_b)).unwrap();
    for i in 0..4 {
        nc.publish("jobs", i.to_string()).unwrap();
    }

    assert_eq!(recv(&mut rx_a).await, "0");
    assert_eq!(recv(&mut rx_b).await, "1");
    assert_eq!(recv(&mut rx_a).await, "2");
    assert_eq!(recv(&mut rx_b).await, "3");
    assert_eq!(a.delivered() + b.delivered(), 4);
}

#[tokio::test]
async fn test_handler_errors_are_counted_and_reported() {
    let broker = LocalBroker::new(URL);
    let reported: Arc<Mutex<Vec<HandlerError>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&reported);
    let reporter = Arc::new(move |e: &HandlerError| sink.lock().push(e.clone()));
    let nc = connect(options(&broker).error_reporter(reporter))
        .await
        .unwrap();

    let sub = nc
        .subscribe("jobs", |_msg: Message| async {
            Err::<(), BoxError>("boom".into())
        })
        .unwrap();
    nc.publish("jobs", "x").unwrap();

    timeout(Duration::from_secs(1), async {
        while reported.lock().is_empty() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("handler error was not reported");

    assert_eq!(nc.stats().handler_errors, 1);
    let reported = reported.lock().clone();
    assert_eq!(reported.len(), 1);
    assert_eq!(reported[0].subscription, sub.id());
    assert_eq!(reported[0].kind, HandlerErrorKind::Failed("boom".to_string()));
    // the publisher saw none of it
    assert!(sub.is_active());
}

#[tokio::test]
async fn test_drain_runs_queued_messages_then_closes() {
    let broker = LocalBroker::new(URL);
    let nc = connected(&broker).await;
    let (tx, mut rx) = mpsc::unbounded_channel();

    let slow_tx = tx.clone();
    let sub = nc
        .subscribe("work", move |msg: Message| {
            let tx = slow_tx.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                let _ = tx.send(msg.payload_str().unwrap_or_default().to_string());
                Ok::<(), BoxError>(())
            }
        })
        .unwrap();
    for i in 0..3 {
        nc.publish("work", i.to_string()).unwrap();
    }

    nc.drain().await;
    assert_eq!(nc.state(), ConnectionState::Closed);
    assert_eq!(sub.state(), crate::SubscriptionState::Unsubscribed);
    for expected in ["0", "1", "2"] {
        assert_eq!(recv(&mut rx).await, expected);
    }

    assert_eq!(nc.publish("work", "late"), Err(Error::ConnectionClosed));
    assert_eq!(
        nc.subscribe("work", forward(&tx)).unwrap_err(),
        Error::ConnectionClosed
    );
    assert_eq!(nc.connect().await, Err(Error::ConnectionClosed));
    assert_eq!(broker.connections(), 0);

    // a second drain returns at once
    timeout(Duration::from_secs(1), nc.drain())
        .await
        .expect("second drain hung");
}

#[tokio::test]
async fn test_request_in_flight_resolves_during_drain() {
    let broker = LocalBroker::new(URL);
    let client = connected(&broker).await;
    let server = connected(&broker).await;

    let replier = server.clone();
    server
        .subscribe("slow.help", move |msg: Message| {
            let nc = replier.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                nc.respond(&msg, "eventually")?;
                Ok::<(), BoxError>(())
            }
        })
        .unwrap();

    let requester = client.clone();
    let request = tokio::spawn(async move {
        requester
            .request("slow.help", "?", Duration::from_secs(2))
            .await
    });
    timeout(Duration::from_secs(1), async {
        while client.pending_requests() == 0 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("request never became pending");

    client.drain().await;
    let reply = request.await.unwrap().unwrap();
    assert_eq!(reply.payload_str(), Some("eventually"));
    assert_eq!(client.state(), ConnectionState::Closed);

    server.close();
}

#[tokio::test(start_paused = true)]
async fn test_drain_timeout_bounds_shutdown() {
    let broker = LocalBroker::new(URL);
    let nc = connect(options(&broker).drain_timeout(Duration::from_millis(50)))
        .await
        .unwrap();

    nc.subscribe("stuck", |_msg: Message| async {
        futures::future::pending::<()>().await;
        Ok::<(), BoxError>(())
    })
    .unwrap();
    nc.publish("stuck", "forever").unwrap();

    nc.drain().await;
    assert_eq!(nc.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_close_fails_pending_requests() {
    let broker = LocalBroker::new(URL);
    let nc = connected(&broker).await;

    let requester = nc.clone();
    let request = tokio::spawn(async move {
        requester
            .request("nobody.home", "?", Duration::from_secs(30))
            .await
    });
    timeout(Duration::from_secs(1), async {
        while nc.pending_requests() == 0 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("request never became pending");

    nc.close();
    assert_eq!(request.await.unwrap().unwrap_err(), Error::ConnectionClosed);
    assert_eq!(nc.state(), ConnectionState::Closed);
    assert_eq!(nc.subscription_count(), 0);
    assert_eq!(broker.connections(), 0);

    // idempotent, and closed() resolves
    nc.close();
    timeout(Duration::from_secs(1), nc.closed())
        .await
        .expect("closed() did not resolve");
}

#[test]
fn test_options_from_settings() {
    let broker = LocalBroker::new(URL);
    let mut settings = Settings::default();
    settings.connection.servers = vec![URL.to_string(), "nats://10.0.0.1:4222".to_string()];
    settings.connection.name = Some("svc".to_string());
    settings.connection.inbox_prefix = "_R".to_string();
    settings.connection.drain_timeout_secs = 5;

    let options = ConnectOptions::from_settings(&settings, Arc::new(broker));
    assert_eq!(options.server_list(), settings.connection.servers.as_slice());
    assert_eq!(options.name.as_deref(), Some("svc"));
    assert_eq!(options.inbox_prefix, "_R");
    assert_eq!(options.drain_timeout, Duration::from_secs(5));
}

#[tokio::test]
async fn test_new_inbox_uses_configured_prefix() {
    let broker = LocalBroker::new(URL);
    let nc = Connection::new(
        options(&broker)
            .inbox_prefix("_R.svc")
            .token_generator(Arc::new(SequentialTokens::new())),
    );
    assert_eq!(nc.new_inbox().unwrap().as_str(), "_R.svc.1");
}
