//! Range Handler (C12): RFC 7233 single-range parsing and manifest-aware chunk
//! slicing.
//!
//! Multi-range requests and unsatisfiable offsets both fall back to a full 200
//! response per spec.md §4.12 — an explicit design choice, not an oversight:
//! players sometimes probe with bad ranges and must keep playing.

use bytes::Bytes;

use crate::cache::kv::{KvEngine, Manifest};
use crate::error::AppError;

/// Target size for streamed segments, to tolerate slow clients without
/// materializing the whole range at once.
const STREAM_SEGMENT_SIZE: usize = 1024 * 1024;

/// The outcome of evaluating a `Range` header against a known total size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeOutcome {
    /// No usable single range; serve the full body.
    Full,
    /// A satisfiable single range, as an inclusive `[start, end]` byte interval.
    Range { start: u64, end: u64 },
}

/// Parse a `Range: bytes=...` header value against `total_size`.
pub fn parse_range(header_value: &str, total_size: u64) -> RangeOutcome {
    let Some(spec) = header_value.strip_prefix("bytes=") else {
        return RangeOutcome::Full;
    };

    // A comma indicates a multi-range request; treated as unsatisfiable.
    if spec.contains(',') {
        return RangeOutcome::Full;
    }

    let Some((start_str, end_str)) = spec.split_once('-') else {
        return RangeOutcome::Full;
    };

    if total_size == 0 {
        return RangeOutcome::Full;
    }

    let (start, end) = if start_str.is_empty() {
        // Suffix range: "-N" means the last N bytes.
        let Ok(suffix_len) = end_str.parse::<u64>() else {
            return RangeOutcome::Full;
        };
        if suffix_len == 0 {
            return RangeOutcome::Full;
        }
        let start = total_size.saturating_sub(suffix_len);
        (start, total_size - 1)
    } else {
        let Ok(start) = start_str.parse::<u64>() else {
            return RangeOutcome::Full;
        };
        let end = if end_str.is_empty() {
            total_size - 1
        } else {
            match end_str.parse::<u64>() {
                Ok(end) => end.min(total_size - 1),
                Err(_) => return RangeOutcome::Full,
            }
        };
        (start, end)
    };

    if start >= total_size || start > end {
        return RangeOutcome::Full;
    }

    RangeOutcome::Range { start, end }
}

/// A chunk index and the byte window within that chunk needed to satisfy a range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkWindow {
    pub index: u32,
    pub start_in_chunk: u64,
    pub end_in_chunk: u64,
}

/// Enumerate the chunks intersecting `[start, end]` and the byte window needed
/// from each, using the manifest's per-chunk size prefix sums.
pub fn intersecting_chunks(manifest: &Manifest, start: u64, end: u64) -> Vec<ChunkWindow> {
    let mut windows = Vec::new();
    let mut offset = 0u64;
    for (index, &size) in manifest.actual_chunk_sizes.iter().enumerate() {
        let chunk_start = offset;
        let chunk_end = offset + size - 1;
        if chunk_end >= start && chunk_start <= end {
            let window_start = start.max(chunk_start) - chunk_start;
            let window_end = end.min(chunk_end) - chunk_start;
            windows.push(ChunkWindow {
                index: index as u32,
                start_in_chunk: window_start,
                end_in_chunk: window_end,
            });
        }
        offset += size;
    }
    windows
}

/// Fetch and slice every chunk needed to satisfy `[start, end]`, returning the
/// concatenated bytes split into bounded streaming segments.
pub async fn fetch_range(
    engine: &KvEngine,
    base_key: &str,
    manifest: &Manifest,
    start: u64,
    end: u64,
) -> Result<Vec<Bytes>, AppError> {
    let windows = intersecting_chunks(manifest, start, end);
    let mut assembled = Vec::with_capacity(((end - start + 1) as usize).min(64 * 1024 * 1024));

    for window in windows {
        let chunk = engine.get_chunk(base_key, window.index).await?;
        let slice_start = window.start_in_chunk as usize;
        let slice_end = (window.end_in_chunk as usize) + 1;
        if slice_end > chunk.len() {
            return Err(AppError::Internal(format!(
                "chunk {} shorter than manifest declared",
                window.index
            )));
        }
        assembled.extend_from_slice(&chunk[slice_start..slice_end]);
    }

    let assembled = Bytes::from(assembled);
    Ok(segment(assembled, STREAM_SEGMENT_SIZE))
}

/// Split `body` into bounded segments for streaming, preserving byte order.
pub fn segment(body: Bytes, segment_size: usize) -> Vec<Bytes> {
    if body.is_empty() {
        return vec![body];
    }
    let mut segments = Vec::new();
    let mut offset = 0;
    while offset < body.len() {
        let end = (offset + segment_size).min(body.len());
        segments.push(body.slice(offset..end));
        offset = end;
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_standard_range() {
        assert_eq!(
            parse_range("bytes=10485760-15728639", 33554432),
            RangeOutcome::Range {
                start: 10485760,
                end: 15728639
            }
        );
    }

    #[test]
    fn open_ended_range_extends_to_total_size() {
        assert_eq!(
            parse_range("bytes=100-", 1000),
            RangeOutcome::Range { start: 100, end: 999 }
        );
    }

    #[test]
    fn suffix_range_takes_last_n_bytes() {
        assert_eq!(
            parse_range("bytes=-100", 1000),
            RangeOutcome::Range { start: 900, end: 999 }
        );
    }

    #[test]
    fn multi_range_falls_back_to_full() {
        assert_eq!(parse_range("bytes=0-10,20-30", 1000), RangeOutcome::Full);
    }

    #[test]
    fn start_at_or_past_total_size_falls_back_to_full() {
        assert_eq!(parse_range("bytes=1000-1010", 1000), RangeOutcome::Full);
    }

    #[test]
    fn malformed_header_falls_back_to_full() {
        assert_eq!(parse_range("not-a-range", 1000), RangeOutcome::Full);
    }

    fn manifest(sizes: Vec<u64>) -> Manifest {
        Manifest {
            total_size: sizes.iter().sum(),
            chunk_count: sizes.len() as u32,
            standard_chunk_size: 5 * 1024 * 1024,
            actual_chunk_sizes: sizes,
            original_content_type: "video/mp4".to_string(),
        }
    }

    #[test]
    fn intersecting_chunks_covers_range_spanning_multiple_chunks() {
        let manifest = manifest(vec![5_242_880; 7].into_iter().enumerate().map(|(i, s)| if i == 6 { 2_097_152 } else { s }).collect());
        let windows = intersecting_chunks(&manifest, 10_485_760, 15_728_639);
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].index, 2);
        assert_eq!(windows[0].start_in_chunk, 0);
        assert_eq!(windows[0].end_in_chunk, 5_242_879);
    }

    #[test]
    fn intersecting_chunks_handles_partial_boundary_chunks() {
        let manifest = manifest(vec![100, 100, 100]);
        let windows = intersecting_chunks(&manifest, 50, 150);
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0], ChunkWindow { index: 0, start_in_chunk: 50, end_in_chunk: 99 });
        assert_eq!(windows[1], ChunkWindow { index: 1, start_in_chunk: 0, end_in_chunk: 50 });
    }

    #[test]
    fn segment_splits_into_bounded_pieces() {
        let body = Bytes::from(vec![0u8; 2_500_000]);
        let segments = segment(body.clone(), 1_000_000);
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0].len(), 1_000_000);
        assert_eq!(segments[2].len(), 500_000);
        let reassembled: Vec<u8> = segments.iter().flat_map(|s| s.to_vec()).collect();
        assert_eq!(Bytes::from(reassembled), body);
    }

    proptest::proptest! {
        #[test]
        fn segment_never_drops_or_reorders_bytes(len in 0usize..200_000, segment_size in 1usize..50_000) {
            let body = Bytes::from((0..len).map(|i| (i % 256) as u8).collect::<Vec<u8>>());
            let segments = segment(body.clone(), segment_size);
            let reassembled: Vec<u8> = segments.iter().flat_map(|s| s.to_vec()).collect();
            proptest::prop_assert_eq!(Bytes::from(reassembled), body);
            proptest::prop_assert!(segments.iter().all(|s| s.len() <= segment_size || len == 0));
        }

        #[test]
        fn parse_range_never_yields_a_start_past_total_size(
            start in 0u64..2_000_000,
            len in 1u64..2_000_000,
            total in 1u64..2_000_000,
        ) {
            let header = format!("bytes={}-{}", start, start + len);
            match parse_range(&header, total) {
                RangeOutcome::Full => {}
                RangeOutcome::Range { start, end } => {
                    proptest::prop_assert!(start < total);
                    proptest::prop_assert!(end < total);
                    proptest::prop_assert!(start <= end);
                }
            }
        }
    }
}
