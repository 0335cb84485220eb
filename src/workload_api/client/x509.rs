use tokio_util::sync::CancellationToken;

use crate::constants::DEFAULT_SVID;
use crate::workload_api::pb::X509svidResponse;
use crate::workload_api::translate;
use crate::workload_api::watch::{WatchSession, X509ContextWatch, X509ContextWatcher};
use crate::workload_api::x509_context::X509Context;
use crate::{WorkloadApiClient, WorkloadApiError, X509BundleSet, X509Svid};

impl WorkloadApiClient {
    /// Fetches the default X.509-SVID of the calling workload.
    ///
    /// # Errors
    ///
    /// Returns a [`WorkloadApiError`] if the gRPC request fails, the stream ends
    /// before the first message, or the received data is invalid.
    pub async fn fetch_x509_svid(&self) -> Result<X509Svid, WorkloadApiError> {
        let response = self.first_x509_message().await?;
        translate::parse_x509_svids(&response, true)?
            .into_iter()
            .nth(DEFAULT_SVID)
            .ok_or(WorkloadApiError::EmptyResponse)
    }

    /// Fetches every X.509-SVID available to the calling workload, default first.
    ///
    /// # Errors
    ///
    /// Returns a [`WorkloadApiError`] if the gRPC request fails, the stream ends
    /// before the first message, or any entry is invalid.
    pub async fn fetch_all_x509_svids(&self) -> Result<Vec<X509Svid>, WorkloadApiError> {
        let response = self.first_x509_message().await?;
        translate::parse_x509_svids(&response, false)
    }

    /// Fetches the current X.509 bundles, own trust domain and federated ones.
    ///
    /// # Errors
    ///
    /// Returns a [`WorkloadApiError`] if the gRPC request fails, the stream ends
    /// before the first message, or a bundle is invalid.
    pub async fn fetch_x509_bundles(&self) -> Result<X509BundleSet, WorkloadApiError> {
        let response = self.first_x509_message().await?;
        translate::parse_x509_bundles(&response)
    }

    /// Fetches the current X.509 context: all SVIDs and bundles of one message.
    ///
    /// # Errors
    ///
    /// Returns a [`WorkloadApiError`] if the gRPC request fails, the stream ends
    /// before the first message, or the received data cannot be parsed.
    pub async fn fetch_x509_context(&self) -> Result<X509Context, WorkloadApiError> {
        let response = self.first_x509_message().await?;
        translate::parse_x509_context(&response)
    }

    /// Watches X.509 context updates until `cancel` fires or the agent rejects the
    /// request as invalid.
    ///
    /// Every validated context is passed to
    /// [`on_x509_context_update`](X509ContextWatcher::on_x509_context_update); every
    /// failure, including the final one, to
    /// [`on_x509_context_watch_error`](X509ContextWatcher::on_x509_context_watch_error).
    /// Transient failures reopen the stream after a backoff delay; a malformed
    /// message is skipped without reconnecting.
    ///
    /// Returns the error that ended the watch, [`WorkloadApiError::Cancelled`] after
    /// cancellation.
    pub async fn watch_x509_context<W>(
        &self,
        watcher: &mut W,
        cancel: CancellationToken,
    ) -> WorkloadApiError
    where
        W: X509ContextWatcher + ?Sized,
    {
        WatchSession::new(
            &*self.transport,
            &*self.sleeper,
            self.backoff,
            cancel,
            X509ContextWatch(watcher),
        )
        .run()
        .await
    }

    async fn first_x509_message(&self) -> Result<X509svidResponse, WorkloadApiError> {
        let stream = self.transport.fetch_x509_svid().await?;
        Self::first_message(stream).await
    }
}
