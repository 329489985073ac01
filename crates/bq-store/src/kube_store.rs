//! Production [`WorkloadStore`] backed by `kube::Api` compare-and-set
//! (spec §4.4 Stage 5), mirroring the teacher's thin `Client` facade over a
//! raw `kube::Api`.

use async_trait::async_trait;
use bq_api::Workload;
use bq_resources::Admission;
use kube::{
    api::{Api, PostParams},
    Client,
};
use snafu::ResultExt;

use crate::{
    error::{CommitError, ConflictSnafu, NotFoundSnafu, TransportSnafu},
    store::WorkloadStore,
};

fn status_code(err: &kube::Error) -> Option<u16> {
    match err {
        kube::Error::Api(body) => Some(body.code),
        _ => None,
    }
}

/// Thin wrapper over one `kube::Client`, matching the teacher's pattern of
/// hiding `kube::Api` construction behind a small typed facade rather than
/// handing callers a raw `Api<Workload>`.
#[derive(Clone)]
pub struct KubeWorkloadStore {
    client: Client,
}

impl KubeWorkloadStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<Workload> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl WorkloadStore for KubeWorkloadStore {
    #[tracing::instrument(skip(self, admission), fields(workload = %format!("{namespace}/{name}")))]
    async fn commit(
        &self,
        namespace: &str,
        name: &str,
        admission: Admission,
    ) -> Result<(), CommitError> {
        let key = format!("{namespace}/{name}");
        let api = self.api(namespace);

        let mut current = match api.get(name).await {
            Ok(workload) => workload,
            Err(err) if status_code(&err) == Some(404) => return NotFoundSnafu { key }.fail(),
            Err(err) => return Err(err).context(TransportSnafu { key }),
        };

        if current.spec.admission.is_some() {
            return ConflictSnafu { key }.fail();
        }

        current.spec.admission = Some(admission);

        match api.replace(name, &PostParams::default(), &current).await {
            Ok(_) => Ok(()),
            Err(err) if status_code(&err) == Some(409) => ConflictSnafu { key }.fail(),
            Err(err) if status_code(&err) == Some(404) => NotFoundSnafu { key }.fail(),
            Err(err) => Err(err).context(TransportSnafu { key }),
        }
    }
}
