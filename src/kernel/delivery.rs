//! The accept path: route an inbound request to the queue that should buffer it.

use crate::error::{QueueError, QueueResult};
use crate::kernel::namespace::Namespace;
use crate::kernel::request::{QueueResponse, QueuedRequest};
use crate::observability::metrics;

/// Where a request ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub queue: String,
    pub delegated: bool,
}

/// Routing passes before giving up on a request whose owner keeps being
/// reclaimed underneath it.
const MAX_ROUTE_ATTEMPTS: usize = 3;

/// Route `request` and place it in exactly one queue.
///
/// 1. Longest registered prefix picks the owning queue.
/// 2. One atomic load of the owner's delegation table picks the binding, if any.
/// 3. A target reclaimed between lookup and enqueue falls back to the owner.
/// 4. An owner reclaimed between lookup and enqueue sends the request back to
///    step 1, where a promoted standby registration now answers.
///
/// On failure the request has already been completed (404 or 503) and the error
/// says why.
pub fn deliver(namespace: &dyn Namespace, request: QueuedRequest) -> QueueResult<Delivery> {
    let mut request = request;
    let mut attempt = 0;
    loop {
        attempt += 1;
        let Some(owner) = namespace.resolve(request.url()) else {
            let url = request.url().to_string();
            tracing::debug!(request_id = %request.id(), %url, "No URL group matched");
            request.respond(QueueResponse::not_found());
            return Err(QueueError::NoRoute(url));
        };

        let snapshot = owner.delegations();
        if let Some(binding) = snapshot.resolve(request.url()) {
            match binding.target().enqueue(request) {
                Ok(()) => {
                    metrics::record_delegated(owner.name(), binding.target_name());
                    return Ok(Delivery {
                        queue: binding.target_name().to_string(),
                        delegated: true,
                    });
                }
                Err(returned) => {
                    tracing::debug!(
                        source = owner.name(),
                        target = binding.target_name(),
                        "Delegation target reclaimed during delivery, using source queue"
                    );
                    request = returned;
                }
            }
        }

        match owner.enqueue(request) {
            Ok(()) => {
                metrics::record_routed(owner.name());
                return Ok(Delivery {
                    queue: owner.name().to_string(),
                    delegated: false,
                });
            }
            Err(returned) if attempt < MAX_ROUTE_ATTEMPTS => {
                tracing::debug!(queue = owner.name(), attempt, "Owning queue reclaimed during delivery, rerouting");
                request = returned;
            }
            Err(returned) => {
                returned.abandon(owner.name());
                metrics::record_abandoned(owner.name(), 1);
                return Err(QueueError::ServiceUnavailable(owner.name().to_string()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delegation::binding::DelegationBinding;
    use crate::kernel::{InMemoryNamespace, ProcessId};
    use crate::queue::QueueMode;
    use crate::routing::UrlPrefix;
    use url::Url;

    fn req(url: &str) -> (QueuedRequest, tokio::sync::oneshot::Receiver<QueueResponse>) {
        QueuedRequest::new("GET", Url::parse(url).unwrap(), vec![], vec![])
    }

    #[tokio::test]
    async fn test_no_route_answers_404() {
        let ns = InMemoryNamespace::new();
        let (r, rx) = req("http://h:8080/");
        assert!(matches!(deliver(&ns, r), Err(QueueError::NoRoute(_))));
        assert_eq!(rx.await.unwrap().status, 404);
    }

    #[test]
    fn test_delegated_and_local_delivery() {
        let ns = InMemoryNamespace::new();
        let v1 = ns.create_queue("v1", &ProcessId::new("a")).unwrap();
        let v2 = ns.create_queue("v2", &ProcessId::new("b")).unwrap();
        let g = ns.create_url_group();
        ns.bind_url_group(g, &v1).unwrap();
        ns.add_prefix(g, &UrlPrefix::parse("http://+:8080/").unwrap()).unwrap();
        v1.install_delegation(DelegationBinding::new(
            "v1",
            v2.clone(),
            UrlPrefix::parse("http://+:8080/api/").unwrap(),
        ));

        let (r, _rx1) = req("http://h:8080/api/users");
        assert_eq!(deliver(&ns, r).unwrap(), Delivery { queue: "v2".into(), delegated: true });
        let (r, _rx2) = req("http://h:8080/index.html");
        assert_eq!(deliver(&ns, r).unwrap(), Delivery { queue: "v1".into(), delegated: false });

        assert_eq!(v1.pending_len(), 1);
        assert_eq!(v2.pending_len(), 1);
    }

    #[tokio::test]
    async fn test_reclaimed_target_falls_back_to_source() {
        let ns = InMemoryNamespace::new();
        let v1 = ns.create_queue("v1", &ProcessId::new("a")).unwrap();
        let v2 = ns.create_queue("v2", &ProcessId::new("b")).unwrap();
        let g = ns.create_url_group();
        ns.bind_url_group(g, &v1).unwrap();
        ns.add_prefix(g, &UrlPrefix::parse("http://+:8080/").unwrap()).unwrap();
        v1.install_delegation(DelegationBinding::new(
            "v1",
            v2.clone(),
            UrlPrefix::parse("http://+:8080/").unwrap(),
        ));
        ns.release_queue(&v2, QueueMode::Controller);

        let (r, _rx) = req("http://h:8080/");
        assert_eq!(deliver(&ns, r).unwrap().queue, "v1");
    }
}
