//! Two buses talking through adapters whose traffic is relayed by hand

use bus::{Adapter, Bus, BusError, Message, MessageCallback, Reply, Timeout};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Queues outbound messages until the test relays them
#[derive(Default)]
struct RelayAdapter {
    outbox: Mutex<Vec<Message>>,
    listeners: Mutex<Vec<MessageCallback>>,
}

impl RelayAdapter {
    fn deliver(&self, message: Message) {
        let listeners = self.listeners.lock().unwrap().clone();
        for listener in listeners {
            listener(message.clone());
        }
    }

    fn take(&self) -> Vec<Message> {
        std::mem::take(&mut *self.outbox.lock().unwrap())
    }
}

impl Adapter for RelayAdapter {
    fn send(&self, message: Message) {
        self.outbox.lock().unwrap().push(message);
    }

    fn add_listener(&self, callback: MessageCallback) {
        self.listeners.lock().unwrap().push(callback);
    }

    fn destroy(&self) {
        self.listeners.lock().unwrap().clear();
    }
}

fn relay(from: &RelayAdapter, to: &RelayAdapter) -> usize {
    let messages = from.take();
    let count = messages.len();
    for message in messages {
        to.deliver(message);
    }
    count
}

fn pair() -> (Arc<RelayAdapter>, Bus, Arc<RelayAdapter>, Bus) {
    let a = Arc::new(RelayAdapter::default());
    let b = Arc::new(RelayAdapter::default());
    let bus_a = Bus::new(a.clone());
    let bus_b = Bus::new(b.clone());
    (a, bus_a, b, bus_b)
}

#[tokio::test]
async fn test_echo_request_round_trip() {
    let (a, bus_a, b, bus_b) = pair();
    bus_b
        .register_request_handler("echo", |x| Reply::ok(json!(x.as_i64().unwrap_or(0) + 1)))
        .unwrap();

    let response = bus_a.request("echo", Some(json!(5)));

    assert_eq!(relay(&a, &b), 1);
    assert_eq!(relay(&b, &a), 1);
    assert_eq!(response.await.unwrap(), json!(6));
}

#[tokio::test]
async fn test_once_event_across_buses() {
    let (a, bus_a, b, bus_b) = pair();
    let seen = Arc::new(Mutex::new(Vec::<Value>::new()));
    let s = seen.clone();

    bus_b
        .once("ping", move |data| {
            s.lock().unwrap().push(data.clone());
            Ok(())
        })
        .unwrap();

    bus_a.dispatch_event("ping", Some(json!({ "n": 1 }))).unwrap();
    relay(&a, &b);
    bus_a.dispatch_event("ping", Some(json!({ "n": 2 }))).unwrap();
    relay(&a, &b);

    assert_eq!(*seen.lock().unwrap(), vec![json!({ "n": 1 })]);
}

#[tokio::test]
async fn test_missing_handler_across_buses() {
    let (a, bus_a, b, _bus_b) = pair();

    let response = bus_a.request("nope", None);
    relay(&a, &b);
    relay(&b, &a);

    let err = response.await.unwrap_err();
    assert!(matches!(err, BusError::Remote(m) if m == "Has no handler for \"nope\" action!"));
}

#[tokio::test]
async fn test_response_for_foreign_id_is_ignored() {
    let (a, bus_a, b, bus_b) = pair();
    bus_b
        .register_request_handler("echo", Reply::ok)
        .unwrap();

    let response = bus_a.request_with_timeout("echo", Some(json!("x")), Timeout::Never);

    // A stray response nobody asked for
    b.send(Message::success("bus-0-0-action-0-99", json!("stray")));
    relay(&a, &b);
    relay(&b, &a);

    assert_eq!(response.await.unwrap(), json!("x"));
    assert_eq!(bus_a.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_late_response_after_timeout() {
    let (a, bus_a, b, bus_b) = pair();
    bus_b.register_request_handler("slow", Reply::ok).unwrap();

    let response = bus_a.request_with_timeout("slow", None, Timeout::from_millis(50));
    let err = response.await.unwrap_err();
    assert!(matches!(err, BusError::Timeout { timeout_ms: 50, .. }));

    // Response shows up after the deadline and is dropped quietly
    relay(&a, &b);
    assert_eq!(relay(&b, &a), 1);
    assert_eq!(bus_a.pending_count(), 0);
}

#[tokio::test]
async fn test_change_adapter_keeps_subscriptions_and_handlers() {
    let (a, bus_a, b, bus_b) = pair();
    let calls = Arc::new(AtomicUsize::new(0));
    let once_calls = Arc::new(AtomicUsize::new(0));

    let c = calls.clone();
    bus_b
        .on("tick", move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
    let c = once_calls.clone();
    bus_b
        .once("tick", move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
    bus_b
        .register_request_handler("double", |x| Reply::ok(json!(x.as_i64().unwrap_or(0) * 2)))
        .unwrap();

    let c = Arc::new(RelayAdapter::default());
    let bus_c = bus_b.change_adapter(c.clone()).unwrap();

    // Old side is retired
    assert!(matches!(
        bus_b.register_request_handler("x", Reply::ok),
        Err(BusError::Retired(_))
    ));
    bus_a.dispatch_event("tick", None).unwrap();
    relay(&a, &b);
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    // New side behaves exactly like the old one did
    let client = Arc::new(RelayAdapter::default());
    let bus_client = Bus::new(client.clone());

    bus_client.dispatch_event("tick", None).unwrap();
    bus_client.dispatch_event("tick", None).unwrap();
    relay(&client, &c);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(once_calls.load(Ordering::SeqCst), 1);

    let response = bus_client.request("double", Some(json!(21)));
    relay(&client, &c);
    relay(&c, &client);
    assert_eq!(response.await.unwrap(), json!(42));

    bus_c.destroy();
}
