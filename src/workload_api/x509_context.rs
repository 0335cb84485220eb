//! The X.509 materials of a workload at one point in time.

use std::sync::Arc;

use crate::constants::DEFAULT_SVID;
use crate::{X509BundleSet, X509Svid};

/// The X.509-SVIDs and trust bundles delivered by one Workload API message.
///
/// Both halves always come from the same message, so a context never pairs SVIDs
/// with bundles from a different rotation.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct X509Context {
    svids: Vec<Arc<X509Svid>>,
    bundle_set: Arc<X509BundleSet>,
}

impl X509Context {
    /// Creates a context from SVIDs and the bundles to validate peers with.
    pub fn new(
        svids: impl IntoIterator<Item = X509Svid>,
        bundle_set: impl Into<Arc<X509BundleSet>>,
    ) -> Self {
        Self {
            svids: svids.into_iter().map(Arc::new).collect(),
            bundle_set: bundle_set.into(),
        }
    }

    /// The first SVID, which is the default identity of the workload.
    pub fn default_svid(&self) -> Option<&Arc<X509Svid>> {
        self.svids.get(DEFAULT_SVID)
    }

    /// Every SVID, default first.
    pub fn svids(&self) -> &[Arc<X509Svid>] {
        &self.svids
    }

    /// The trust bundles, own trust domain and federated ones alike.
    pub fn bundle_set(&self) -> &Arc<X509BundleSet> {
        &self.bundle_set
    }
}
