//! Queue handles, URL groups and exactly-once delivery through the public API.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use request_queue::error::QueueError;
use request_queue::kernel::{deliver, InMemoryNamespace, Namespace, ProcessId, QueuedRequest};
use request_queue::queue::{ControllerQueue, QueueMode, ReceiverQueue, RequestQueue, UrlGroup};
use request_queue::resilience::AttachRetry;
use url::Url;

mod common;
use common::namespace;

fn request(url: &str) -> (QueuedRequest, tokio::sync::oneshot::Receiver<request_queue::QueueResponse>) {
    QueuedRequest::new("GET", Url::parse(url).unwrap(), vec![], vec![])
}

#[test]
fn test_create_close_leaves_no_object() {
    let ns = namespace();
    for name in ["a", "svc-v1", "queue with spaces", "ünïcode"] {
        let queue = RequestQueue::create(ns.clone(), &ProcessId::new("p"), name, QueueMode::Controller).unwrap();
        queue.close();
        assert!(ns.lookup_queue(name).is_none(), "{name} survived close");
    }
    assert!(ns.describe().is_empty());
}

#[test]
fn test_receiver_close_keeps_object() {
    let ns = namespace();
    let owner = ControllerQueue::create(ns.clone(), &ProcessId::new("a"), "shared").unwrap();
    for _ in 0..3 {
        ReceiverQueue::attach(ns.clone(), &ProcessId::new("b"), "shared").unwrap().close();
    }
    assert!(ns.lookup_queue("shared").is_some());
    owner.close();
    assert!(ns.lookup_queue("shared").is_none());
}

#[test]
fn test_receiver_keeps_queue_after_controller_closes() {
    let ns = namespace();
    let owner = ControllerQueue::create(ns.clone(), &ProcessId::new("a"), "shared").unwrap();
    let attached = ReceiverQueue::attach(ns.clone(), &ProcessId::new("b"), "shared").unwrap();
    owner.close();

    let info = ns.describe().into_iter().find(|q| q.name == "shared").unwrap();
    assert!(!info.controller_open);
    assert_eq!(info.handles, 1);

    attached.close();
    assert!(ns.lookup_queue("shared").is_none());
}

#[test]
fn test_create_errors() {
    let memory = Arc::new(InMemoryNamespace::new());
    memory.deny_create_for(ProcessId::new("guest"));
    memory.insert_foreign_object("mutex", "event").unwrap();
    let ns: Arc<dyn Namespace> = memory;

    assert_eq!(
        RequestQueue::create(ns.clone(), &ProcessId::new("p"), "q1", QueueMode::Receiver).unwrap_err(),
        QueueError::NotFound("q1".into())
    );
    assert!(matches!(
        RequestQueue::create(ns.clone(), &ProcessId::new("guest"), "q", QueueMode::Controller),
        Err(QueueError::PermissionDenied(_))
    ));
    assert!(matches!(
        RequestQueue::create(ns.clone(), &ProcessId::new("p"), "mutex", QueueMode::Receiver),
        Err(QueueError::IncompatibleMode { .. })
    ));
    assert!(matches!(
        RequestQueue::create(ns.clone(), &ProcessId::new("p"), "", QueueMode::Controller),
        Err(QueueError::InvalidName(_))
    ));

    let _first = ControllerQueue::create(ns.clone(), &ProcessId::new("a"), "taken").unwrap();
    let err = ControllerQueue::create(ns, &ProcessId::new("b"), "taken").unwrap_err();
    assert_eq!(err, QueueError::AlreadyExists("taken".into()));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_create_race_resolves_to_one_controller() {
    let ns = namespace();
    let retry = AttachRetry::default();
    let mut tasks = Vec::new();
    for i in 0..8 {
        let ns = ns.clone();
        let retry = retry.clone();
        tasks.push(tokio::spawn(async move {
            RequestQueue::create_or_attach(ns, &ProcessId::new(format!("p{i}")), "race", &retry).await
        }));
    }

    let mut handles = Vec::new();
    for task in tasks {
        handles.push(task.await.unwrap().unwrap());
    }
    let controllers = handles.iter().filter(|h| h.mode() == QueueMode::Controller).count();
    assert_eq!(controllers, 1);
    assert_eq!(ns.lookup_queue("race").unwrap().handle_count(), 8);
}

#[test]
fn test_prefix_replay_and_conflict() {
    let ns = namespace();
    let queue = ControllerQueue::create(ns.clone(), &ProcessId::new("a"), "q").unwrap();
    let group = UrlGroup::new(ns.clone());
    queue.bind_url_group(&group).unwrap();

    group.add_prefix("http://+:80/a/").unwrap();
    group.add_prefix("http://+:80/a/").unwrap();
    group.add_prefix("https://example.com/b").unwrap();
    group.remove_prefix("http://+:80/a/").unwrap();
    group.remove_prefix("http://+:80/a/").unwrap();
    group.add_prefix("http://*:80/c/").unwrap();

    let registered: HashSet<String> = group.prefixes().iter().map(ToString::to_string).collect();
    let expected: HashSet<String> = ["https://example.com:443/b/", "http://*:80/c/"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    assert_eq!(registered, expected);

    let g1 = UrlGroup::new(ns.clone());
    let g2 = UrlGroup::new(ns);
    g1.add_prefix("http://+:80/").unwrap();
    assert!(matches!(g2.add_prefix("http://+:80/"), Err(QueueError::PrefixConflict(_))));
    assert!(matches!(g2.add_prefix("http://+:80"), Err(QueueError::PrefixConflict(_))));
    g2.add_prefix("http://+:80/nested/").unwrap();
}

#[test]
fn test_invalid_prefixes() {
    let group = UrlGroup::new(namespace());
    for bad in ["", "ftp://x/", "http://", "http://host:0/", "http://host:99999/", "http://h/a/../b/", "http://h/?q"] {
        assert!(
            matches!(group.add_prefix(bad), Err(QueueError::InvalidPrefix { .. })),
            "{bad:?} accepted"
        );
    }
}

#[test]
fn test_longest_prefix_and_host_rank() {
    let ns = namespace();
    let mut queues = Vec::new();
    let mut groups = Vec::new();
    for (name, prefix) in [
        ("wild", "http://+:8080/"),
        ("api", "http://+:8080/api/"),
        ("named", "http://example.com:8080/api/"),
        ("weak", "http://*:8080/api/"),
    ] {
        let queue = ControllerQueue::create(ns.clone(), &ProcessId::new("a"), name).unwrap();
        let group = UrlGroup::new(ns.clone());
        queue.bind_url_group(&group).unwrap();
        group.add_prefix(prefix).unwrap();
        queues.push(queue);
        groups.push(group);
    }

    let owner = |url: &str| ns.resolve(&Url::parse(url).unwrap()).unwrap().name().to_string();
    assert_eq!(owner("http://other.org:8080/"), "wild");
    assert_eq!(owner("http://other.org:8080/api/x"), "api");
    assert_eq!(owner("http://example.com:8080/api/x"), "api");
    assert!(ns.resolve(&Url::parse("http://example.com:9090/").unwrap()).is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_each_request_delivered_once() {
    let ns = namespace();
    let queue = ControllerQueue::create(ns.clone(), &ProcessId::new("a"), "q").unwrap();
    let group = UrlGroup::new(ns.clone());
    queue.bind_url_group(&group).unwrap();
    group.add_prefix("http://+:8080/").unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut workers = Vec::new();
    for _ in 0..6 {
        let mut receiver = queue.receiver();
        let seen = seen.clone();
        workers.push(tokio::spawn(async move {
            while let Ok(request) = receiver.dequeue().await {
                seen.lock().unwrap().push(request.id());
                request.respond(request_queue::QueueResponse::ok(""));
            }
        }));
    }

    let mut replies = Vec::new();
    for i in 0..300 {
        let (req, rx) = request(&format!("http://h:8080/{i}"));
        deliver(ns.as_ref(), req).unwrap();
        replies.push(rx);
    }
    for rx in replies {
        assert_eq!(tokio::time::timeout(Duration::from_secs(5), rx).await.unwrap().unwrap().status, 200);
    }

    queue.close();
    for worker in workers {
        worker.await.unwrap();
    }

    let seen = seen.lock().unwrap();
    let unique: HashSet<_> = seen.iter().collect();
    assert_eq!(seen.len(), 300);
    assert_eq!(unique.len(), 300);
}

#[tokio::test]
async fn test_close_abandons_pending_with_503() {
    let ns = namespace();
    let queue = ControllerQueue::create(ns.clone(), &ProcessId::new("a"), "q").unwrap();
    let group = UrlGroup::new(ns.clone());
    queue.bind_url_group(&group).unwrap();
    group.add_prefix("http://+:8080/").unwrap();

    let mut replies = Vec::new();
    for _ in 0..3 {
        let (req, rx) = request("http://h:8080/");
        deliver(ns.as_ref(), req).unwrap();
        replies.push(rx);
    }
    queue.close();
    for rx in replies {
        assert_eq!(rx.await.unwrap().status, 503);
    }
}
