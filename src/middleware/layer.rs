//! Tower layer and service that put a limiter in front of a handler.

use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::{self, BoxFuture};
use http::header::HeaderValue;
use http::{Request, Response};
use tower::{Layer, Service};

use super::extract::{HeaderKeyExtractor, KeyExtractor};
use super::response::{rejection_response, X_RATELIMIT_REMAINING};
use crate::ratelimit::{AdmissionControl, Decision};

/// A layer that enforces admission control using an [`AdmissionControl`].
pub struct RateLimitLayer<A, X = HeaderKeyExtractor> {
    limiter: Arc<A>,
    extractor: X,
}

impl<A> RateLimitLayer<A> {
    /// Create a new layer owning `limiter`.
    pub fn new(limiter: A) -> Self {
        Self::from_shared(Arc::new(limiter))
    }

    /// Create a new layer around a limiter the caller keeps a handle to,
    /// typically to stop it on shutdown.
    pub fn from_shared(limiter: Arc<A>) -> Self {
        Self {
            limiter,
            extractor: HeaderKeyExtractor::default(),
        }
    }
}

impl<A, X> RateLimitLayer<A, X> {
    /// Use `extractor` to resolve request identities and routes.
    pub fn with_extractor<Y>(self, extractor: Y) -> RateLimitLayer<A, Y> {
        RateLimitLayer {
            limiter: self.limiter,
            extractor,
        }
    }

    /// The limiter behind this layer.
    pub fn limiter(&self) -> &Arc<A> {
        &self.limiter
    }
}

impl<A, X: Clone> Clone for RateLimitLayer<A, X> {
    fn clone(&self) -> Self {
        Self {
            limiter: self.limiter.clone(),
            extractor: self.extractor.clone(),
        }
    }
}

impl<S, A, X: Clone> Layer<S> for RateLimitLayer<A, X> {
    type Service = RateLimitService<S, A, X>;

    fn layer(&self, service: S) -> Self::Service {
        RateLimitService {
            inner: service,
            limiter: self.limiter.clone(),
            extractor: self.extractor.clone(),
        }
    }
}

/// Middleware service that admits or rejects each request.
///
/// Admitted requests are forwarded to the inner service; rejected ones get a
/// terminal response built from the [`crate::Rejection`] and never reach it.
pub struct RateLimitService<S, A, X = HeaderKeyExtractor> {
    inner: S,
    limiter: Arc<A>,
    extractor: X,
}

impl<S: Clone, A, X: Clone> Clone for RateLimitService<S, A, X> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            limiter: self.limiter.clone(),
            extractor: self.extractor.clone(),
        }
    }
}

impl<S, A, X, ReqBody, ResBody> Service<Request<ReqBody>> for RateLimitService<S, A, X>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    A: AdmissionControl + 'static,
    X: KeyExtractor,
    ReqBody: Send + 'static,
    ResBody: Default + Send + 'static,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        self.limiter.activate();

        let key = self.extractor.extract(&req);
        match self.limiter.check(&key.identity, &key.route) {
            Decision::Admitted { remaining } => {
                // Call the instance that was driven to readiness.
                let clone = self.inner.clone();
                let mut inner = std::mem::replace(&mut self.inner, clone);

                Box::pin(async move {
                    let mut response = inner.call(req).await?;
                    if let Some(remaining) = remaining {
                        response
                            .headers_mut()
                            .insert(X_RATELIMIT_REMAINING, HeaderValue::from(remaining));
                    }
                    Ok(response)
                })
            }
            Decision::Rejected(rejection) => Box::pin(future::ready(Ok(rejection_response(&rejection)))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::RequestKey;
    use crate::ratelimit::{LeakingBucket, Limit, Rate, TokenBucket};
    use http::StatusCode;
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tower::{service_fn, ServiceExt};

    fn request(user: &str) -> Request<String> {
        Request::builder()
            .uri("/bar")
            .header("x-user-id", user)
            .body(String::new())
            .unwrap()
    }

    #[tokio::test]
    async fn test_rejected_request_never_reaches_inner() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let inner = service_fn(move |_req: Request<String>| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, Infallible>(Response::new(String::from("ok"))) }
        });

        let limiter = Arc::new(LeakingBucket::new(Rate::new(1, Duration::from_secs(60))).unwrap());
        let service = RateLimitLayer::from_shared(limiter.clone()).layer(inner);

        let first = service.clone().oneshot(request("u1")).await.unwrap();
        let second = service.clone().oneshot(request("u1")).await.unwrap();

        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(first.body(), "ok");
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(second.headers()["x-ratelimit-limit"], "1");
        assert_eq!(second.headers()["x-ratelimit-retry-after"], "60");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(limiter.is_active());

        limiter.stop();
    }

    #[derive(Clone)]
    struct FixedKey;

    impl KeyExtractor for FixedKey {
        fn extract<B>(&self, _request: &Request<B>) -> RequestKey {
            RequestKey {
                identity: "fixed".to_string(),
                route: "/fixed".to_string(),
            }
        }
    }

    #[tokio::test]
    async fn test_custom_extractor() {
        let inner = service_fn(|_req: Request<String>| async {
            Ok::<_, Infallible>(Response::new(String::new()))
        });
        let limiter = TokenBucket::builder()
            .set_limit("/fixed", Limit::new(Rate::per_minute(2), Rate::per_minute(2)))
            .register_user("fixed")
            .build()
            .unwrap();
        let service = RateLimitLayer::new(limiter).with_extractor(FixedKey).layer(inner);

        let response = service.oneshot(request("someone-else")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-ratelimit-remaining"], "1");
    }
}
