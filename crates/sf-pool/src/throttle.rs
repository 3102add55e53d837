//! Outbound request throttle.
//!
//! One FIFO queue per upstream class, each drained by its own
//! dispatcher task that releases at most one request per configured
//! interval. Queues are bounded; a full queue rejects the submission
//! instead of growing without limit.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::{Client, Request, Response};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, instrument};

/// Upstream service group a request is dispatched to. Each class has
/// its own queue and spacing, matching how aggressively the upstream
/// rate-limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpstreamClass {
    /// Skin-change endpoint, by far the most protective upstream.
    SkinChange,
    /// Auth and token-exchange endpoints.
    Auth,
    /// Public profile/API endpoints.
    Api,
    /// Session-server texture lookups.
    Session,
}

impl UpstreamClass {
    pub const ALL: [UpstreamClass; 4] = [
        UpstreamClass::SkinChange,
        UpstreamClass::Auth,
        UpstreamClass::Api,
        UpstreamClass::Session,
    ];

    fn default_interval(self) -> Duration {
        match self {
            UpstreamClass::SkinChange => Duration::from_secs(4),
            UpstreamClass::Auth => Duration::from_secs(1),
            UpstreamClass::Api => Duration::from_secs(1),
            UpstreamClass::Session => Duration::from_millis(1200),
        }
    }
}

#[derive(Debug, Error)]
pub enum ThrottleError {
    #[error("request queue for {class:?} is full")]
    QueueFull { class: UpstreamClass },

    #[error("request queue is shut down")]
    Closed,

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

#[derive(Debug, Clone)]
pub struct ThrottleConfig {
    /// Minimum spacing between dispatches, per class.
    pub intervals: HashMap<UpstreamClass, Duration>,
    /// Maximum queued requests per class before submissions are shed.
    pub queue_capacity: usize,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            intervals: UpstreamClass::ALL
                .into_iter()
                .map(|c| (c, c.default_interval()))
                .collect(),
            queue_capacity: 128,
        }
    }
}

impl ThrottleConfig {
    /// Uniform interval across all classes. Test helper.
    pub fn uniform(interval: Duration) -> Self {
        Self {
            intervals: UpstreamClass::ALL.into_iter().map(|c| (c, interval)).collect(),
            queue_capacity: 128,
        }
    }
}

struct QueuedRequest {
    request: Request,
    respond: oneshot::Sender<Result<Response, reqwest::Error>>,
}

/// Serialized dispatch queues protecting upstream services.
pub struct RequestThrottle {
    queues: HashMap<UpstreamClass, mpsc::Sender<QueuedRequest>>,
}

impl RequestThrottle {
    /// Spawn one dispatcher task per upstream class on the current
    /// runtime.
    pub fn new(client: Client, config: ThrottleConfig) -> Self {
        let mut queues = HashMap::new();
        for class in UpstreamClass::ALL {
            let interval = config
                .intervals
                .get(&class)
                .copied()
                .unwrap_or_else(|| class.default_interval());
            let (tx, rx) = mpsc::channel(config.queue_capacity);
            queues.insert(class, tx);
            tokio::spawn(dispatch_loop(class, interval, client.clone(), rx));
        }
        Self { queues }
    }

    /// Enqueue a request for its upstream class and wait for the
    /// response. Fails fast with [`ThrottleError::QueueFull`] when the
    /// class queue is at capacity.
    #[instrument(skip(self, request), fields(url = %request.url()))]
    pub async fn submit(
        &self,
        class: UpstreamClass,
        request: Request,
    ) -> Result<Response, ThrottleError> {
        let queue = self.queues.get(&class).ok_or(ThrottleError::Closed)?;
        let (respond, receiver) = oneshot::channel();

        queue
            .try_send(QueuedRequest { request, respond })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => ThrottleError::QueueFull { class },
                mpsc::error::TrySendError::Closed(_) => ThrottleError::Closed,
            })?;

        let result = receiver.await.map_err(|_| ThrottleError::Closed)?;
        Ok(result?)
    }
}

async fn dispatch_loop(
    class: UpstreamClass,
    interval: Duration,
    client: Client,
    mut rx: mpsc::Receiver<QueuedRequest>,
) {
    debug!(?class, ?interval, "dispatcher started");
    while let Some(queued) = rx.recv().await {
        let result = client.execute(queued.request).await;
        if queued.respond.send(result).is_err() {
            // caller gave up waiting; the spacing still applies
            error!(?class, "caller dropped before response arrived");
        }
        tokio::time::sleep(interval).await;
    }
    debug!(?class, "dispatcher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn dispatches_sequentially_with_minimum_spacing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = Client::new();
        let interval = Duration::from_millis(100);
        let throttle = RequestThrottle::new(client.clone(), ThrottleConfig::uniform(interval));

        let started = Instant::now();
        for _ in 0..3 {
            let request = client.get(server.uri()).build().unwrap();
            let response = throttle
                .submit(UpstreamClass::Api, request)
                .await
                .unwrap();
            assert!(response.status().is_success());
        }
        // three dispatches, two enforced gaps
        assert!(started.elapsed() >= interval * 2);
    }

    #[tokio::test]
    async fn classes_do_not_block_each_other() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = Client::new();
        let throttle = RequestThrottle::new(
            client.clone(),
            ThrottleConfig::uniform(Duration::from_secs(5)),
        );

        // first Api request burns its slot; a Session request must not
        // wait out the Api interval
        let request = client.get(server.uri()).build().unwrap();
        throttle.submit(UpstreamClass::Api, request).await.unwrap();

        let started = Instant::now();
        let request = client.get(server.uri()).build().unwrap();
        throttle
            .submit(UpstreamClass::Session, request)
            .await
            .unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn full_queue_sheds_submissions() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = Client::new();
        let mut config = ThrottleConfig::uniform(Duration::from_millis(500));
        config.queue_capacity = 1;
        let throttle = std::sync::Arc::new(RequestThrottle::new(client.clone(), config));

        // first request completes and leaves the dispatcher sleeping
        // out its interval
        let request = client.get(server.uri()).build().unwrap();
        throttle.submit(UpstreamClass::Api, request).await.unwrap();

        // second request occupies the single queue slot while the
        // dispatcher sleeps
        let queued = {
            let throttle = throttle.clone();
            let request = client.get(server.uri()).build().unwrap();
            tokio::spawn(async move { throttle.submit(UpstreamClass::Api, request).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        // third request finds the queue full and is rejected rather
        // than queued without bound
        let request = client.get(server.uri()).build().unwrap();
        let result = throttle.submit(UpstreamClass::Api, request).await;
        assert!(matches!(
            result,
            Err(ThrottleError::QueueFull {
                class: UpstreamClass::Api
            })
        ));

        // the queued request still goes through once the interval ends
        assert!(queued.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn transport_errors_surface_to_the_caller() {
        let client = Client::new();
        let throttle = RequestThrottle::new(
            client.clone(),
            ThrottleConfig::uniform(Duration::from_millis(1)),
        );

        // unroutable port
        let request = client.get("http://127.0.0.1:1").build().unwrap();
        let result = throttle.submit(UpstreamClass::Auth, request).await;
        assert!(matches!(result, Err(ThrottleError::Transport(_))));
    }
}
