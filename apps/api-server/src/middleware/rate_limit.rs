//! Rate limiting middleware.
//!
//! Every request passes through [`AdmissionController::admit`] before it
//! reaches a handler. Rejected requests are answered here with 429; admitted
//! ones get `X-RateLimit-*` headers on the way out.

use actix_web::{
    Error, HttpResponse,
    body::EitherBody,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
    http::header::{self, HeaderName, HeaderValue},
};
use futures::future::LocalBoxFuture;
use std::future::{Ready, ready};
use std::rc::Rc;
use std::sync::Arc;

use todo_core::domain::Admission;
use todo_core::services::AdmissionController;
use todo_shared::ErrorResponse;

const LIMIT_HEADER: &str = "x-ratelimit-limit";
const REMAINING_HEADER: &str = "x-ratelimit-remaining";

/// Rate limiting middleware factory.
pub struct RateLimitMiddleware {
    controller: Arc<AdmissionController>,
}

impl RateLimitMiddleware {
    pub fn new(controller: Arc<AdmissionController>) -> Self {
        Self { controller }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimitMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = RateLimitMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimitMiddlewareService {
            service: Rc::new(service),
            controller: self.controller.clone(),
        }))
    }
}

pub struct RateLimitMiddlewareService<S> {
    service: Rc<S>,
    controller: Arc<AdmissionController>,
}

impl<S, B> Service<ServiceRequest> for RateLimitMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let controller = self.controller.clone();

        Box::pin(async move {
            let authorization = req
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);
            // Partition on the socket peer only; forwarding headers are client
            // controlled and are logged, never trusted.
            let peer_addr = req.peer_addr().map(|addr| addr.ip().to_string());
            let forwarded_for = req
                .connection_info()
                .realip_remote_addr()
                .map(str::to_owned);

            let decision = controller
                .admit(authorization.as_deref(), peer_addr.as_deref())
                .await;
            let limit = decision.profile.permit_limit();

            match decision.admission {
                Admission::Rejected { .. } => {
                    let retry_after = decision.admission.retry_after_secs().unwrap_or(1);

                    tracing::warn!(
                        identity = %decision.identity,
                        path = %req.path(),
                        peer_addr = peer_addr.as_deref().unwrap_or("unknown"),
                        forwarded_for = forwarded_for.as_deref().unwrap_or("-"),
                        permit_limit = limit,
                        window_minutes = decision.profile.window_minutes(),
                        retry_after,
                        "Rate limit exceeded"
                    );

                    let error =
                        ErrorResponse::too_many_requests(retry_after).with_instance(req.path());

                    let response = HttpResponse::TooManyRequests()
                        .insert_header((LIMIT_HEADER, limit.to_string()))
                        .insert_header((REMAINING_HEADER, "0"))
                        .insert_header((header::RETRY_AFTER, retry_after.to_string()))
                        .json(error);

                    let (http_req, _payload) = req.into_parts();
                    Ok(ServiceResponse::new(http_req, response).map_into_right_body())
                }
                Admission::Admitted { remaining, .. } => {
                    let mut res = service.call(req).await?;

                    let headers = res.headers_mut();
                    headers.insert(
                        HeaderName::from_static(LIMIT_HEADER),
                        HeaderValue::from(limit),
                    );
                    headers.insert(
                        HeaderName::from_static(REMAINING_HEADER),
                        HeaderValue::from(remaining),
                    );

                    Ok(res.map_into_left_body())
                }
            }
        })
    }
}
