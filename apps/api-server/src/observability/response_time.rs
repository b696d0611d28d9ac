//! Adds `X-Response-Time` (milliseconds spent in the inner service).

use actix_web::{
    Error,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
    http::header::{HeaderName, HeaderValue},
};
use futures::future::LocalBoxFuture;
use std::future::{Ready, ready};
use std::time::Instant;

pub static RESPONSE_TIME_HEADER: &str = "x-response-time";

pub struct ResponseTimeMiddleware;

impl<S, B> Transform<S, ServiceRequest> for ResponseTimeMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = ResponseTimeService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(ResponseTimeService { service }))
    }
}

pub struct ResponseTimeService<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for ResponseTimeService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let started = Instant::now();
        let fut = self.service.call(req);

        Box::pin(async move {
            let mut res = fut.await?;
            let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

            if let Ok(value) = HeaderValue::from_str(&format!("{:.3}ms", elapsed_ms)) {
                res.headers_mut()
                    .insert(HeaderName::from_static(RESPONSE_TIME_HEADER), value);
            }

            Ok(res)
        })
    }
}
