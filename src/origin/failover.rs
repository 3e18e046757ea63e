//! Retry/Failover Coordinator (C8).
//!
//! Generalizes the teacher's `enterprise::cluster::failover::FailoverManager`
//! automatic-failover concept — there, promoting a standby node when a leader
//! fails; here, retrying an alternate origin source when the upstream transform
//! reports the chosen source missing — and its breadcrumb-header convention
//! (`X-Failed-Source` / `X-Alternative-Source`) carries over directly.

use std::collections::HashSet;

use crate::error::AppError;
use crate::origin::fetcher::{FetchOutcome, OriginFetcher};
use crate::origin::model::{MatchedOrigin, SourceDescriptor};
use crate::transform::client::{TransformClient, TransformError, TransformErrorKind, TransformRequest};
use crate::transform::TransformResponse;

/// The outcome of running the origin fetch + transform pipeline, with failover
/// bookkeeping attached so the pipeline entry can emit the right headers.
pub struct PipelineOutcome {
    /// The transformed body and content type.
    pub response: TransformResponse,
    /// Which source ultimately served the request.
    pub source: SourceDescriptor,
    /// Set when a retry occurred: `(failed_source, alternative_source)`.
    pub retry: Option<(SourceDescriptor, SourceDescriptor)>,
}

/// Whether an upstream failure indicates the chosen source is missing and a
/// failover attempt is worthwhile.
fn indicates_missing_source(err: &TransformError) -> bool {
    err.kind == TransformErrorKind::OriginUnreachable
}

/// Run the origin fetch + transform pipeline for `origin`, retrying with an
/// alternate source if the upstream reports the initially chosen source missing.
///
/// Invariants preserved across a retry: the derivative and all transform
/// parameters in `options` are unchanged; only `origin_url` and `source` vary.
pub async fn fetch_and_transform(
    fetcher: &dyn OriginFetcher,
    transform_client: &dyn TransformClient,
    origin: &MatchedOrigin,
    mut build_request: impl FnMut(&FetchOutcome) -> TransformRequest,
) -> Result<PipelineOutcome, AppError> {
    let mut excluded = HashSet::new();

    let first_fetch = fetcher.fetch(origin, &excluded).await?;
    let first_source = first_fetch.source;
    let first_request = build_request(&first_fetch);

    match transform_client.transform(&first_request).await {
        Ok(response) => Ok(PipelineOutcome {
            response,
            source: first_source,
            retry: None,
        }),
        Err(err) if indicates_missing_source(&err) => {
            excluded.insert(first_source.priority);
            tracing::info!(
                failed_source = first_source.kind.as_str(),
                "upstream reported source missing, attempting failover"
            );

            let second_fetch = fetcher.fetch(origin, &excluded).await.map_err(|_| {
                AppError::NotFound(format!(
                    "no alternative source available after '{}' failed",
                    first_source.kind.as_str()
                ))
            })?;
            let second_source = second_fetch.source;
            let second_request = build_request(&second_fetch);

            let response = transform_client
                .transform(&second_request)
                .await
                .map_err(AppError::from)?;

            Ok(PipelineOutcome {
                response,
                source: second_source,
                retry: Some((first_source, second_source)),
            })
        }
        Err(err) => Err(AppError::from(err)),
    }
}
