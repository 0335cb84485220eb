use std::sync::LazyLock;

use tonic::metadata::{Ascii, MetadataKey, MetadataValue};

use crate::constants::{WORKLOAD_API_HEADER_KEY, WORKLOAD_API_HEADER_VALUE};

static HEADER_KEY: LazyLock<MetadataKey<Ascii>> =
    LazyLock::new(|| MetadataKey::from_static(WORKLOAD_API_HEADER_KEY));

static HEADER_VALUE: LazyLock<MetadataValue<Ascii>> =
    LazyLock::new(|| MetadataValue::from_static(WORKLOAD_API_HEADER_VALUE));

/// Adds the `workload.spiffe.io: true` metadata the agent requires on every call.
#[derive(Debug, Clone, Copy, Default)]
pub(super) struct MetadataAdder;

impl tonic::service::Interceptor for MetadataAdder {
    fn call(
        &mut self,
        mut request: tonic::Request<()>,
    ) -> Result<tonic::Request<()>, tonic::Status> {
        request
            .metadata_mut()
            .insert(HEADER_KEY.clone(), HEADER_VALUE.clone());
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonic::service::Interceptor;

    #[test]
    fn adds_workload_header() {
        let request = MetadataAdder.call(tonic::Request::new(())).unwrap();
        let value = request.metadata().get("workload.spiffe.io").unwrap();
        assert_eq!(value.to_str().unwrap(), "true");
    }

    #[test]
    fn overwrites_existing_header() {
        let mut request = tonic::Request::new(());
        request
            .metadata_mut()
            .insert("workload.spiffe.io", MetadataValue::from_static("false"));

        let request = MetadataAdder.call(request).unwrap();
        let values: Vec<_> = request
            .metadata()
            .get_all("workload.spiffe.io")
            .iter()
            .collect();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].to_str().unwrap(), "true");
    }
}
