//! Long-lived watches over the Workload API streams.
//!
//! A watch is driven by a [`WatchSession`] moving through four states:
//!
//! - `Idle`: open the stream.
//! - `Draining`: hand each message to the watcher; a message that fails to
//!   translate is reported and skipped, the stream stays open.
//! - `Retrying`: a transient failure was reported; wait for the next backoff delay,
//!   then go back to `Idle`.
//! - `Terminal`: cancellation or an invalid request was reported; the watch returns
//!   that error.
//!
//! Every failure reaches the watcher's error callback exactly once, before the
//! session decides what to do with it. Cancellation is observed at every await
//! point and always wins over a ready message.

use futures::future::BoxFuture;
use futures::StreamExt as _;
use tokio_util::sync::CancellationToken;
use tonic::Status;

use crate::bundle::jwt::JwtBundleSet;
use crate::prelude::{debug, error, warn};
use crate::workload_api::backoff::{Backoff, BackoffConfig, Sleeper};
use crate::workload_api::error::{ErrorClass, WorkloadApiError};
use crate::workload_api::pb::{JwtBundlesResponse, X509svidResponse};
use crate::workload_api::translate;
use crate::workload_api::transport::{ResponseStream, WorkloadApiTransport};
use crate::workload_api::x509_context::X509Context;

/// Receives X.509 context updates from
/// [`WorkloadApiClient::watch_x509_context`](crate::WorkloadApiClient::watch_x509_context).
///
/// Callbacks run sequentially on the watch task; a slow callback delays the watch.
pub trait X509ContextWatcher {
    /// Called with each new, fully validated context.
    fn on_x509_context_update(&mut self, context: X509Context);

    /// Called once for every failure the watch encounters, including the one that
    /// ends it.
    fn on_x509_context_watch_error(&mut self, error: &WorkloadApiError);
}

/// Receives JWT bundle updates from
/// [`WorkloadApiClient::watch_jwt_bundles`](crate::WorkloadApiClient::watch_jwt_bundles).
///
/// Callbacks run sequentially on the watch task; a slow callback delays the watch.
pub trait JwtBundleWatcher {
    /// Called with each new, fully validated bundle set.
    fn on_jwt_bundles_update(&mut self, bundles: JwtBundleSet);

    /// Called once for every failure the watch encounters, including the one that
    /// ends it.
    fn on_jwt_bundles_watch_error(&mut self, error: &WorkloadApiError);
}

/// One kind of watch: which stream to open and what to do with its messages.
pub(crate) trait Watch {
    /// Message type of the stream.
    type Message: Send + 'static;

    /// Stream name used in logs.
    const STREAM: &'static str;

    fn open(
        transport: &dyn WorkloadApiTransport,
    ) -> BoxFuture<'_, Result<ResponseStream<Self::Message>, Status>>;

    /// Translates `message` and, on success, notifies the watcher.
    fn deliver(&mut self, message: &Self::Message) -> Result<(), WorkloadApiError>;

    /// Notifies the watcher of a failure.
    fn report(&mut self, error: &WorkloadApiError);
}

pub(crate) struct X509ContextWatch<'w, W: ?Sized>(pub(crate) &'w mut W);

impl<W: X509ContextWatcher + ?Sized> Watch for X509ContextWatch<'_, W> {
    type Message = X509svidResponse;

    const STREAM: &'static str = "FetchX509SVID";

    fn open(
        transport: &dyn WorkloadApiTransport,
    ) -> BoxFuture<'_, Result<ResponseStream<Self::Message>, Status>> {
        transport.fetch_x509_svid()
    }

    fn deliver(&mut self, message: &Self::Message) -> Result<(), WorkloadApiError> {
        let context = translate::parse_x509_context(message)?;
        self.0.on_x509_context_update(context);
        Ok(())
    }

    fn report(&mut self, error: &WorkloadApiError) {
        self.0.on_x509_context_watch_error(error);
    }
}

pub(crate) struct JwtBundlesWatch<'w, W: ?Sized>(pub(crate) &'w mut W);

impl<W: JwtBundleWatcher + ?Sized> Watch for JwtBundlesWatch<'_, W> {
    type Message = JwtBundlesResponse;

    const STREAM: &'static str = "FetchJWTBundles";

    fn open(
        transport: &dyn WorkloadApiTransport,
    ) -> BoxFuture<'_, Result<ResponseStream<Self::Message>, Status>> {
        transport.fetch_jwt_bundles()
    }

    fn deliver(&mut self, message: &Self::Message) -> Result<(), WorkloadApiError> {
        let bundles = translate::parse_jwt_bundles(message)?;
        self.0.on_jwt_bundles_update(bundles);
        Ok(())
    }

    fn report(&mut self, error: &WorkloadApiError) {
        self.0.on_jwt_bundles_watch_error(error);
    }
}

enum State<T> {
    Idle,
    Draining(ResponseStream<T>),
    Retrying,
    Terminal(WorkloadApiError),
}

/// Drives one watch from the first open until its terminal error.
pub(crate) struct WatchSession<'a, W> {
    transport: &'a dyn WorkloadApiTransport,
    sleeper: &'a dyn Sleeper,
    backoff: Backoff,
    cancel: CancellationToken,
    watch: W,
}

impl<'a, W: Watch> WatchSession<'a, W> {
    pub(crate) fn new(
        transport: &'a dyn WorkloadApiTransport,
        sleeper: &'a dyn Sleeper,
        backoff: BackoffConfig,
        cancel: CancellationToken,
        watch: W,
    ) -> Self {
        Self {
            transport,
            sleeper,
            backoff: Backoff::new(backoff),
            cancel,
            watch,
        }
    }

    /// Runs until cancellation or a non-retryable failure and returns that error.
    pub(crate) async fn run(mut self) -> WorkloadApiError {
        let mut state = State::Idle;
        loop {
            state = match state {
                State::Idle => self.open().await,
                State::Draining(stream) => self.drain(stream).await,
                State::Retrying => self.retry().await,
                State::Terminal(err) => return err,
            };
        }
    }

    async fn open(&mut self) -> State<W::Message> {
        if self.cancel.is_cancelled() {
            return self.fail(WorkloadApiError::Cancelled);
        }

        let opened = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return self.fail(WorkloadApiError::Cancelled),
            opened = W::open(self.transport) => opened,
        };

        match opened {
            Ok(stream) => {
                debug!("{} stream opened", W::STREAM);
                State::Draining(stream)
            }
            Err(status) => self.fail(status.into()),
        }
    }

    async fn drain(&mut self, mut stream: ResponseStream<W::Message>) -> State<W::Message> {
        loop {
            let next = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return self.fail(WorkloadApiError::Cancelled),
                next = stream.next() => next,
            };

            match next {
                Some(Ok(message)) => match self.watch.deliver(&message) {
                    Ok(()) => self.backoff.reset(),
                    Err(err) => {
                        warn!("Discarding invalid {} message: {err}", W::STREAM);
                        self.watch.report(&err);
                    }
                },
                Some(Err(status)) => return self.fail(status.into()),
                None => {
                    debug!("{} stream closed by the agent", W::STREAM);
                    return self.fail(WorkloadApiError::StreamEnded);
                }
            }
        }
    }

    async fn retry(&mut self) -> State<W::Message> {
        let delay = self.backoff.next();
        debug!("Reopening {} stream in {delay:?}", W::STREAM);

        tokio::select! {
            biased;
            () = self.cancel.cancelled() => self.fail(WorkloadApiError::Cancelled),
            () = self.sleeper.sleep(delay) => State::Idle,
        }
    }

    fn fail(&mut self, err: WorkloadApiError) -> State<W::Message> {
        self.watch.report(&err);

        match err.class() {
            ErrorClass::Cancelled => {
                debug!("{} watch cancelled", W::STREAM);
                State::Terminal(err)
            }
            ErrorClass::InvalidRequest => {
                error!("Canceling {} watch: {err}", W::STREAM);
                State::Terminal(err)
            }
            ErrorClass::Transient => {
                warn!("{} watch failed, retrying: {err}", W::STREAM);
                State::Retrying
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use futures::future::{self, FutureExt as _};
    use futures::stream;

    use crate::workload_api::transport::InMemoryTransport;

    #[derive(Debug, Default)]
    struct RecordingSleeper {
        delays: Mutex<Vec<Duration>>,
    }

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
            self.delays.lock().unwrap().push(duration);
            future::ready(()).boxed()
        }
    }

    // Scripted opens: each entry is either a rejection or the messages of one stream.
    // Messages are plain numbers; odd numbers fail translation.
    type Script = Result<Vec<Result<u32, Status>>, Status>;

    thread_local! {
        static SCRIPTS: std::cell::RefCell<VecDeque<Script>> = Default::default();
    }

    #[derive(Debug, PartialEq)]
    enum Event {
        Update(u32),
        Error(String),
    }

    struct NumberWatch {
        events: Vec<Event>,
        cancel: CancellationToken,
        cancel_after_updates: usize,
    }

    impl Watch for &mut NumberWatch {
        type Message = u32;

        const STREAM: &'static str = "Numbers";

        fn open(
            _transport: &dyn WorkloadApiTransport,
        ) -> BoxFuture<'_, Result<ResponseStream<u32>, Status>> {
            let script = SCRIPTS.with(|s| s.borrow_mut().pop_front());
            let opened = match script {
                Some(Ok(items)) => Ok(stream::iter(items).boxed()),
                Some(Err(status)) => Err(status),
                None => Ok(stream::pending().boxed()),
            };
            future::ready(opened).boxed()
        }

        fn deliver(&mut self, message: &u32) -> Result<(), WorkloadApiError> {
            if message % 2 == 1 {
                return Err(WorkloadApiError::EmptyResponse);
            }
            self.events.push(Event::Update(*message));
            let updates = self
                .events
                .iter()
                .filter(|e| matches!(e, Event::Update(_)))
                .count();
            if updates >= self.cancel_after_updates {
                self.cancel.cancel();
            }
            Ok(())
        }

        fn report(&mut self, error: &WorkloadApiError) {
            let described = match error.status_code() {
                Some(code) => format!("{code:?}"),
                None => error.to_string(),
            };
            self.events.push(Event::Error(described));
        }
    }

    fn config() -> BackoffConfig {
        BackoffConfig {
            min: Duration::from_millis(10),
            max: Duration::from_millis(100),
            jitter: false,
        }
    }

    async fn run(
        scripts: Vec<Script>,
        cancel_after_updates: usize,
    ) -> (Vec<Event>, WorkloadApiError, Vec<Duration>) {
        SCRIPTS.with(|s| *s.borrow_mut() = scripts.into());

        let transport = InMemoryTransport::new();
        let sleeper = Arc::new(RecordingSleeper::default());
        let cancel = CancellationToken::new();
        let mut watch = NumberWatch {
            events: Vec::new(),
            cancel: cancel.clone(),
            cancel_after_updates,
        };

        let session = WatchSession::new(&transport, &*sleeper, config(), cancel, &mut watch);
        let err = tokio::time::timeout(Duration::from_secs(5), session.run())
            .await
            .expect("watch did not terminate");

        let delays = sleeper.delays.lock().unwrap().clone();
        (watch.events, err, delays)
    }

    #[tokio::test(flavor = "current_thread")]
    async fn invalid_message_is_reported_and_stream_continues() {
        let (events, err, delays) = run(vec![Ok(vec![Ok(2), Ok(3), Ok(4)])], 2).await;

        assert_eq!(
            events,
            [
                Event::Update(2),
                Event::Error("empty Workload API response".into()),
                Event::Update(4),
                Event::Error("Workload API operation cancelled".into()),
            ]
        );
        assert!(matches!(err, WorkloadApiError::Cancelled));
        assert!(delays.is_empty());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn transient_failures_back_off_and_reopen() {
        let scripts = vec![
            Err(Status::unavailable("down")),
            Ok(vec![Ok(2), Err(Status::internal("reset"))]),
            Ok(vec![]),
            Ok(vec![Ok(4)]),
        ];
        let (events, err, delays) = run(scripts, 2).await;

        assert!(matches!(err, WorkloadApiError::Cancelled));
        assert_eq!(events.len(), 6);
        assert_eq!(events[0], Event::Error("Unavailable".into()));
        assert_eq!(events[1], Event::Update(2));
        assert_eq!(events[2], Event::Error("Internal".into()));
        assert_eq!(events[3], Event::Error("Workload API stream ended".into()));
        assert_eq!(events[4], Event::Update(4));
        // Backoff grows across failures and restarts after the successful update.
        assert_eq!(
            delays,
            [
                Duration::from_millis(10),
                Duration::from_millis(10),
                Duration::from_millis(20),
            ]
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn invalid_argument_is_terminal() {
        let scripts = vec![Ok(vec![Err(Status::invalid_argument("bad request"))])];
        let (events, err, delays) = run(scripts, usize::MAX).await;

        assert_eq!(events, [Event::Error("InvalidArgument".into())]);
        assert_eq!(err.class(), ErrorClass::InvalidRequest);
        assert!(delays.is_empty());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn remote_cancellation_is_terminal() {
        let scripts = vec![Err(Status::cancelled("agent shutting down"))];
        let (events, err, delays) = run(scripts, usize::MAX).await;

        assert_eq!(events.len(), 1);
        assert_eq!(err.class(), ErrorClass::Cancelled);
        assert!(delays.is_empty());
    }
}
