use crate::{
    config::SharedPolicy,
    core::Decision,
    k8s::{self, Kind},
    AdmissionMetrics,
};
use futures::future;
use http_body_util::BodyExt;
use hyper::{http, Request, Response};
use kube::core::{admission::Operation, DynamicObject};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

/// Validates workloads against the resource limit policy in effect.
#[derive(Clone, Debug)]
pub struct Admission {
    policy: SharedPolicy,
    metrics: AdmissionMetrics,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read request body: {0}")]
    Request(#[from] hyper::Error),

    #[error("failed to encode json response: {0}")]
    Json(#[from] serde_json::Error),
}

type Review = kube::core::admission::AdmissionReview<DynamicObject>;
type AdmissionRequest = kube::core::admission::AdmissionRequest<DynamicObject>;
type AdmissionResponse = kube::core::admission::AdmissionResponse;
type AdmissionReview = kube::core::admission::AdmissionReview<DynamicObject>;

type Body = http_body_util::Full<bytes::Bytes>;

// === impl AdmissionService ===

impl tower::Service<Request<hyper::body::Incoming>> for Admission {
    type Response = Response<Body>;
    type Error = Error;
    type Future = future::BoxFuture<'static, Result<Response<Body>, Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::result::Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<hyper::body::Incoming>) -> Self::Future {
        trace!(?req);
        if req.method() != http::Method::POST || req.uri().path() != "/" {
            return Box::pin(future::ok(
                Response::builder()
                    .status(http::StatusCode::NOT_FOUND)
                    .body(Body::default())
                    .expect("not found response must be valid"),
            ));
        }

        let admission = self.clone();
        Box::pin(async move {
            let bytes = req.into_body().collect().await?.to_bytes();
            admission.respond(&bytes)
        })
    }
}

impl Admission {
    pub fn new(policy: SharedPolicy, metrics: AdmissionMetrics) -> Self {
        Self { policy, metrics }
    }

    /// Decides an encoded admission review.
    ///
    /// A review that cannot be decoded is answered with `400 Bad Request`. A
    /// workload that cannot be inspected is answered with `503 Service
    /// Unavailable`, which is neither an allow nor a deny.
    pub fn respond(&self, body: &[u8]) -> Result<Response<Body>, Error> {
        let review: Review = match serde_json::from_slice(body) {
            Ok(review) => review,
            Err(error) => {
                warn!(%error, "Failed to parse request body");
                self.metrics.failed();
                return Ok(text_response(http::StatusCode::BAD_REQUEST, error));
            }
        };
        trace!(?review);

        let req: AdmissionRequest = match review.try_into() {
            Ok(req) => req,
            Err(error) => {
                warn!(%error, "Invalid admission request");
                self.metrics.failed();
                return Ok(text_response(http::StatusCode::BAD_REQUEST, error));
            }
        };
        debug!(?req);

        let rsp = match self.handle_admission(&req) {
            Ok(rsp) => rsp,
            Err(error) => {
                warn!(%error, uid = %req.uid, "Failed to inspect workload");
                self.metrics.failed();
                return Ok(text_response(http::StatusCode::SERVICE_UNAVAILABLE, error));
            }
        };
        debug!(?rsp);
        self.metrics.decided(rsp.allowed);
        json_response(rsp.into_review())
    }

    /// Decides a single admission request.
    ///
    /// Only creates and updates of recognized workloads are inspected; all
    /// other requests are allowed.
    pub fn handle_admission(&self, req: &AdmissionRequest) -> Result<AdmissionResponse, k8s::Error> {
        let rsp = AdmissionResponse::from(req);

        if !matches!(req.operation, Operation::Create | Operation::Update) {
            trace!(operation = ?req.operation, "Skipping");
            return Ok(rsp);
        }

        let Some(kind) = Kind::from_group_kind(&req.kind.group, &req.kind.kind) else {
            trace!(group = %req.kind.group, kind = %req.kind.kind, "Unrecognized resource");
            return Ok(rsp);
        };

        let obj = req.object.as_ref().ok_or(k8s::Error::MissingObject(kind))?;
        let ns = req
            .namespace
            .as_deref()
            .or(obj.metadata.namespace.as_deref())
            .unwrap_or_default();
        let target = kind.target(obj, ns);
        let workload = kind.snapshot(obj)?;

        match self.policy.current().validate(&target, &workload) {
            Decision::Allow => {
                debug!(%kind, %target, "Allowed");
                Ok(rsp)
            }
            Decision::Deny(violation) => {
                info!(
                    %kind,
                    %target,
                    user = req.user_info.username.as_deref().unwrap_or_default(),
                    %violation,
                    "Denied"
                );
                Ok(rsp.deny(violation))
            }
        }
    }
}

fn json_response(rsp: AdmissionReview) -> Result<Response<Body>, Error> {
    let bytes = serde_json::to_vec(&rsp)?;
    Ok(Response::builder()
        .status(http::StatusCode::OK)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Body::from(bytes))
        .expect("admission review response must be valid"))
}

fn text_response(status: http::StatusCode, error: impl std::fmt::Display) -> Response<Body> {
    Response::builder()
        .status(status)
        .header(http::header::CONTENT_TYPE, "text/plain")
        .body(Body::from(error.to_string()))
        .expect("error response must be valid")
}
