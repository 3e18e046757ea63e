//! Cache-Tag Generator (C5): a pure function producing a deduplicated tag list
//! for a variant, mirroring the teacher's `enterprise::cache::invalidation`
//! tag-string conventions but generating the `vp-*` vocabulary this system uses.

use crate::options::{TransformMode, TransformOptions};

const MAX_TAG_LEN: usize = 128;

fn normalize_segment(segment: &str) -> String {
    segment
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect()
}

/// Last two path segments, joined by `-`, separators normalized.
fn short_path(path: &str) -> String {
    let segments: Vec<&str> = path.trim_matches('/').split('/').filter(|s| !s.is_empty()).collect();
    let tail: Vec<&str> = segments.iter().rev().take(2).rev().copied().collect();
    normalize_segment(&tail.join("-"))
}

fn truncated(tag: String) -> String {
    if tag.len() > MAX_TAG_LEN {
        tag.chars().take(MAX_TAG_LEN).collect()
    } else {
        tag
    }
}

/// Generate the cache-tag list for a variant at `path` with resolved `options`.
pub fn generate(path: &str, options: &TransformOptions) -> Vec<String> {
    let mut tags = Vec::new();
    let short = short_path(path);

    tags.push(format!("vp-p-{}", short));

    if let Some(derivative) = &options.derivative {
        let derivative = normalize_segment(derivative);
        tags.push(format!("vp-p-{}-{}", short, derivative));
        tags.push(format!("vp-d-{}", derivative));
    }

    if let Some(format) = &options.format {
        tags.push(format!("vp-f-{}", normalize_segment(format)));
    }

    if matches!(
        options.mode,
        TransformMode::Frame | TransformMode::Spritesheet | TransformMode::Audio
    ) {
        tags.push(format!("vp-m-{}", options.mode.as_str()));
    }

    if let Some(time) = &options.time {
        tags.push(format!("vp-t-{}", normalize_segment(time)));
    }
    if let Some(cols) = options.cols {
        tags.push(format!("vp-c-{}", cols));
    }
    if let Some(rows) = options.rows {
        tags.push(format!("vp-r-{}", rows));
    }
    if let Some(interval) = &options.interval {
        tags.push(format!("vp-i-{}", normalize_segment(interval)));
    }

    if options.imquery {
        tags.push("vp-imq".to_string());
    }

    let mut seen = std::collections::HashSet::new();
    tags.into_iter()
        .map(truncated)
        .filter(|tag| seen.insert(tag.clone()))
        .collect()
}
