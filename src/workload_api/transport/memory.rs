//! Scripted in-process transport.
//!
//! Each call pops the next scripted outcome for its RPC when it is first polled.
//! Streaming calls replay their messages and then either close or stay open
//! forever; once a streaming RPC runs out of scripts, further opens succeed with a
//! stream that never yields, so a watch parks until it is cancelled.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, FutureExt as _};
use futures::stream::{self, StreamExt as _};
use tonic::Status;

use crate::workload_api::pb::{
    JwtBundlesResponse, JwtsvidRequest, JwtsvidResponse, ValidateJwtsvidRequest,
    ValidateJwtsvidResponse, X509svidResponse,
};
use crate::workload_api::transport::{ResponseStream, WorkloadApiTransport};

/// What a scripted stream does after its last message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// The agent closes the stream.
    Close,
    /// The stream stays open without further messages.
    Hang,
}

#[derive(Debug)]
enum StreamScript<T> {
    Reject(Status),
    Open {
        items: Vec<Result<T, Status>>,
        end: StreamEnd,
    },
}

impl<T: Send + 'static> StreamScript<T> {
    fn open(self) -> Result<ResponseStream<T>, Status> {
        match self {
            Self::Reject(status) => Err(status),
            Self::Open { items, end } => {
                let replay = stream::iter(items);
                Ok(match end {
                    StreamEnd::Close => replay.boxed(),
                    StreamEnd::Hang => replay.chain(stream::pending()).boxed(),
                })
            }
        }
    }
}

#[derive(Debug, Default)]
struct State {
    x509: VecDeque<StreamScript<X509svidResponse>>,
    jwt_bundles: VecDeque<StreamScript<JwtBundlesResponse>>,
    jwt_svid: VecDeque<Result<JwtsvidResponse, Status>>,
    validate: VecDeque<Result<ValidateJwtsvidResponse, Status>>,
    x509_opens: usize,
    jwt_bundle_opens: usize,
    jwt_svid_requests: Vec<JwtsvidRequest>,
    validate_requests: Vec<ValidateJwtsvidRequest>,
}

/// [`WorkloadApiTransport`] that replays scripted responses.
#[derive(Debug, Default)]
pub struct InMemoryTransport {
    state: Mutex<State>,
}

impl InMemoryTransport {
    /// Creates a transport with nothing scripted.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Scripts the next `FetchX509SVID` open to succeed and replay `items`.
    pub fn push_x509_stream(
        &self,
        items: impl IntoIterator<Item = Result<X509svidResponse, Status>>,
        end: StreamEnd,
    ) -> &Self {
        self.state().x509.push_back(StreamScript::Open {
            items: items.into_iter().collect(),
            end,
        });
        self
    }

    /// Scripts the next `FetchX509SVID` open to fail with `status`.
    pub fn reject_x509(&self, status: Status) -> &Self {
        self.state().x509.push_back(StreamScript::Reject(status));
        self
    }

    /// Scripts the next `FetchJWTBundles` open to succeed and replay `items`.
    pub fn push_jwt_bundles_stream(
        &self,
        items: impl IntoIterator<Item = Result<JwtBundlesResponse, Status>>,
        end: StreamEnd,
    ) -> &Self {
        self.state().jwt_bundles.push_back(StreamScript::Open {
            items: items.into_iter().collect(),
            end,
        });
        self
    }

    /// Scripts the next `FetchJWTBundles` open to fail with `status`.
    pub fn reject_jwt_bundles(&self, status: Status) -> &Self {
        self.state()
            .jwt_bundles
            .push_back(StreamScript::Reject(status));
        self
    }

    /// Scripts the outcome of the next `FetchJWTSVID` call.
    pub fn push_jwt_svid(&self, outcome: Result<JwtsvidResponse, Status>) -> &Self {
        self.state().jwt_svid.push_back(outcome);
        self
    }

    /// Scripts the outcome of the next `ValidateJWTSVID` call.
    pub fn push_validate(&self, outcome: Result<ValidateJwtsvidResponse, Status>) -> &Self {
        self.state().validate.push_back(outcome);
        self
    }

    /// How many times `FetchX509SVID` was opened.
    pub fn x509_opens(&self) -> usize {
        self.state().x509_opens
    }

    /// How many times `FetchJWTBundles` was opened.
    pub fn jwt_bundle_opens(&self) -> usize {
        self.state().jwt_bundle_opens
    }

    /// Every `FetchJWTSVID` request received so far.
    pub fn jwt_svid_requests(&self) -> Vec<JwtsvidRequest> {
        self.state().jwt_svid_requests.clone()
    }

    /// Every `ValidateJWTSVID` request received so far.
    pub fn validate_requests(&self) -> Vec<ValidateJwtsvidRequest> {
        self.state().validate_requests.clone()
    }
}

fn never_yields<T: Send + 'static>() -> ResponseStream<T> {
    stream::pending().boxed()
}

fn unscripted(rpc: &str) -> Status {
    Status::unavailable(format!("no scripted response for {rpc}"))
}

impl WorkloadApiTransport for InMemoryTransport {
    fn fetch_x509_svid(&self) -> BoxFuture<'_, Result<ResponseStream<X509svidResponse>, Status>> {
        async move {
            let mut state = self.state();
            state.x509_opens += 1;
            state
                .x509
                .pop_front()
                .map_or_else(|| Ok(never_yields()), StreamScript::open)
        }
        .boxed()
    }

    fn fetch_jwt_bundles(
        &self,
    ) -> BoxFuture<'_, Result<ResponseStream<JwtBundlesResponse>, Status>> {
        async move {
            let mut state = self.state();
            state.jwt_bundle_opens += 1;
            state
                .jwt_bundles
                .pop_front()
                .map_or_else(|| Ok(never_yields()), StreamScript::open)
        }
        .boxed()
    }

    fn fetch_jwt_svid(
        &self,
        request: JwtsvidRequest,
    ) -> BoxFuture<'_, Result<JwtsvidResponse, Status>> {
        async move {
            let mut state = self.state();
            state.jwt_svid_requests.push(request);
            state
                .jwt_svid
                .pop_front()
                .unwrap_or_else(|| Err(unscripted("FetchJWTSVID")))
        }
        .boxed()
    }

    fn validate_jwt_svid(
        &self,
        request: ValidateJwtsvidRequest,
    ) -> BoxFuture<'_, Result<ValidateJwtsvidResponse, Status>> {
        async move {
            let mut state = self.state();
            state.validate_requests.push(request);
            state
                .validate
                .pop_front()
                .unwrap_or_else(|| Err(unscripted("ValidateJWTSVID")))
        }
        .boxed()
    }
}
