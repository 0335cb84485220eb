use tokio_util::sync::CancellationToken;

use crate::constants::DEFAULT_SVID;
use crate::workload_api::pb::{JwtsvidRequest, JwtsvidResponse, ValidateJwtsvidRequest};
use crate::workload_api::translate;
use crate::workload_api::watch::{JwtBundleWatcher, JwtBundlesWatch, WatchSession};
use crate::{JwtBundleSet, JwtSvid, SpiffeId, WorkloadApiClient, WorkloadApiError};

impl WorkloadApiClient {
    /// Fetches a JWT-SVID for `audience`, optionally for a specific `spiffe_id`.
    ///
    /// If `spiffe_id` is `None`, the agent returns the default identity. The token is
    /// checked to carry every requested audience and not to be expired; its signature
    /// is not verified.
    ///
    /// # Errors
    ///
    /// Returns a [`WorkloadApiError`] if the request fails or the agent returns an
    /// empty or invalid response.
    pub async fn fetch_jwt_svid<I>(
        &self,
        audience: I,
        spiffe_id: Option<&SpiffeId>,
    ) -> Result<JwtSvid, WorkloadApiError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let (audience, response) = self.fetch_jwt(audience, spiffe_id).await?;
        translate::parse_jwt_svids(&response, &audience, true)?
            .into_iter()
            .nth(DEFAULT_SVID)
            .ok_or(WorkloadApiError::EmptyResponse)
    }

    /// Fetches every JWT-SVID the agent issues for `audience`.
    ///
    /// Each returned [`JwtSvid`] may carry a [`hint`](JwtSvid::hint) to tell them
    /// apart.
    ///
    /// # Errors
    ///
    /// Returns a [`WorkloadApiError`] if the request fails, the response is empty, or
    /// any returned token is invalid.
    pub async fn fetch_all_jwt_svids<I>(
        &self,
        audience: I,
        spiffe_id: Option<&SpiffeId>,
    ) -> Result<Vec<JwtSvid>, WorkloadApiError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let (audience, response) = self.fetch_jwt(audience, spiffe_id).await?;
        translate::parse_jwt_svids(&response, &audience, false)
    }

    /// Fetches the JWT-SVID whose hint equals `hint`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkloadApiError::HintNotFound`] if no returned SVID carries the
    /// hint, or any error of [`WorkloadApiClient::fetch_all_jwt_svids`].
    pub async fn fetch_jwt_svid_by_hint<I>(
        &self,
        audience: I,
        spiffe_id: Option<&SpiffeId>,
        hint: impl AsRef<str>,
    ) -> Result<JwtSvid, WorkloadApiError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let hint = hint.as_ref();
        self.fetch_all_jwt_svids(audience, spiffe_id)
            .await?
            .into_iter()
            .find(|svid| svid.hint() == Some(hint))
            .ok_or_else(|| WorkloadApiError::HintNotFound(hint.to_owned()))
    }

    /// Fetches the raw token of the default JWT-SVID for `audience`.
    ///
    /// # Errors
    ///
    /// Returns a [`WorkloadApiError`] if the request fails or the agent returns an
    /// empty response.
    pub async fn fetch_jwt_token<I>(
        &self,
        audience: I,
        spiffe_id: Option<&SpiffeId>,
    ) -> Result<String, WorkloadApiError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let (_, response) = self.fetch_jwt(audience, spiffe_id).await?;
        response
            .svids
            .into_iter()
            .nth(DEFAULT_SVID)
            .map(|entry| entry.svid)
            .ok_or(WorkloadApiError::EmptyResponse)
    }

    /// Fetches the current JWT bundles.
    ///
    /// # Errors
    ///
    /// Returns a [`WorkloadApiError`] if the gRPC request fails, the stream ends
    /// before the first message, or a bundle is invalid.
    pub async fn fetch_jwt_bundles(&self) -> Result<JwtBundleSet, WorkloadApiError> {
        let stream = self.transport.fetch_jwt_bundles().await?;
        let response = Self::first_message(stream).await?;
        translate::parse_jwt_bundles(&response)
    }

    /// Has the agent validate `token` for `audience`, then parses it.
    ///
    /// The security property comes from the agent's validation; the local parse only
    /// gives structured access to the claims and does not check the signature again.
    ///
    /// # Errors
    ///
    /// Returns a [`WorkloadApiError`] if the agent rejects the token or it cannot be
    /// parsed.
    pub async fn validate_jwt_token(
        &self,
        audience: &str,
        token: &str,
    ) -> Result<JwtSvid, WorkloadApiError> {
        let request = ValidateJwtsvidRequest {
            audience: audience.to_owned(),
            svid: token.to_owned(),
        };
        self.transport.validate_jwt_svid(request).await?;

        Ok(JwtSvid::parse_insecure(token, &[audience])?)
    }

    /// Watches JWT bundle updates until `cancel` fires or the agent rejects the
    /// request as invalid.
    ///
    /// Behaves like [`WorkloadApiClient::watch_x509_context`], reporting to a
    /// [`JwtBundleWatcher`].
    pub async fn watch_jwt_bundles<W>(
        &self,
        watcher: &mut W,
        cancel: CancellationToken,
    ) -> WorkloadApiError
    where
        W: JwtBundleWatcher + ?Sized,
    {
        WatchSession::new(
            &*self.transport,
            &*self.sleeper,
            self.backoff,
            cancel,
            JwtBundlesWatch(watcher),
        )
        .run()
        .await
    }

    async fn fetch_jwt<I>(
        &self,
        audience: I,
        spiffe_id: Option<&SpiffeId>,
    ) -> Result<(Vec<String>, JwtsvidResponse), WorkloadApiError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let audience: Vec<String> = audience
            .into_iter()
            .map(|a| a.as_ref().to_owned())
            .collect();
        let request = JwtsvidRequest {
            audience: audience.clone(),
            spiffe_id: spiffe_id.map(ToString::to_string).unwrap_or_default(),
        };

        let response = self.transport.fetch_jwt_svid(request).await?;
        Ok((audience, response))
    }
}
