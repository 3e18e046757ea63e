//! Key Utility (C1): pure, deterministic cache key derivation.
//!
//! No `self`, no shared state — every function here is a pure transform of its
//! inputs, matching the teacher's convention for stateless helpers (e.g.
//! `enterprise::cache::codec`'s free functions).

use crate::options::{TransformMode, TransformOptions};

/// Characters allowed verbatim in a cache key; everything else is replaced with `-`.
fn sanitize(input: &str) -> String {
    input
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || "_:/._=*-".contains(c) {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// Strip leading path separators and collapse repeated separators to one.
fn normalize_path(path: &str) -> String {
    let trimmed = path.trim_start_matches('/');
    let mut result = String::with_capacity(trimmed.len());
    let mut last_was_slash = false;
    for c in trimmed.chars() {
        if c == '/' {
            if !last_was_slash {
                result.push(c);
            }
            last_was_slash = true;
        } else {
            result.push(c);
            last_was_slash = false;
        }
    }
    result
}

/// Derive the base cache key for `mode`/`path`/`options`, per spec.md §4.1.
///
/// Rule order: if a derivative is set, the key is
/// `{mode}:{path}:derivative={derivative}` and nothing else is appended.
/// Otherwise the fixed-order parameter suffixes are appended before sanitization.
pub fn base_key(mode: TransformMode, path: &str, options: &TransformOptions) -> String {
    let path = normalize_path(path);

    let raw = if let Some(derivative) = &options.derivative {
        format!("{}:{}:derivative={}", mode.as_str(), path, derivative)
    } else {
        let mut key = format!("{}:{}", mode.as_str(), path);
        if let Some(w) = options.width {
            key.push_str(&format!(":w={}", w));
        }
        if let Some(h) = options.height {
            key.push_str(&format!(":h={}", h));
        }
        if let Some(f) = &options.format {
            key.push_str(&format!(":f={}", f));
        }
        if let Some(q) = &options.quality {
            key.push_str(&format!(":q={}", q));
        }
        if matches!(mode, TransformMode::Video | TransformMode::Audio) {
            if let Some(c) = &options.compression {
                key.push_str(&format!(":c={}", c));
            }
        }
        if matches!(mode, TransformMode::Frame | TransformMode::Spritesheet) {
            if let Some(t) = &options.time {
                key.push_str(&format!(":t={}", t));
            }
            if let Some(d) = &options.duration {
                key.push_str(&format!(":d={}", d));
            }
            if let Some(cols) = options.cols {
                key.push_str(&format!(":cols={}", cols));
            }
            if let Some(rows) = options.rows {
                key.push_str(&format!(":rows={}", rows));
            }
            if let Some(interval) = &options.interval {
                key.push_str(&format!(":interval={}", interval));
            }
        }
        key
    };

    sanitize(&raw)
}

/// Derive the Nth chunk key for a base key: `{base}_chunk_{N}`, unpadded.
pub fn chunk_key(base: &str, n: u32) -> String {
    format!("{}_chunk_{}", base, n)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> TransformOptions {
        TransformOptions::default()
    }

    #[test]
    fn derivative_key_ignores_other_fields() {
        let mut options = opts();
        options.derivative = Some("mobile".to_string());
        options.width = Some(9999);
        let key = base_key(TransformMode::Video, "/videos/sample.mp4", &options);
        assert_eq!(key, "video:videos/sample.mp4:derivative=mobile");
    }

    #[test]
    fn leading_and_repeated_separators_are_normalized() {
        let key = base_key(TransformMode::Video, "///videos//sample.mp4", &opts());
        assert_eq!(key, "video:videos/sample.mp4");
    }

    #[test]
    fn key_is_deterministic_regardless_of_field_population_order() {
        let mut a = opts();
        a.width = Some(640);
        a.height = Some(360);
        a.quality = Some("high".to_string());

        let mut b = opts();
        b.quality = Some("high".to_string());
        b.height = Some(360);
        b.width = Some(640);

        assert_eq!(
            base_key(TransformMode::Video, "videos/x.mp4", &a),
            base_key(TransformMode::Video, "videos/x.mp4", &b)
        );
    }

    #[test]
    fn param_order_is_fixed_w_h_f_q_c() {
        let mut options = opts();
        options.width = Some(640);
        options.height = Some(360);
        options.format = Some("mp4".to_string());
        options.quality = Some("high".to_string());
        options.compression = Some("low".to_string());
        let key = base_key(TransformMode::Video, "videos/x.mp4", &options);
        assert_eq!(key, "video:videos/x.mp4:w=640:h=360:f=mp4:q=high:c=low");
    }

    #[test]
    fn compression_is_omitted_for_frame_mode() {
        let mut options = opts();
        options.compression = Some("low".to_string());
        let key = base_key(TransformMode::Frame, "videos/x.mp4", &options);
        assert!(!key.contains("c="));
    }

    #[test]
    fn sanitizes_disallowed_characters() {
        let key = base_key(TransformMode::Video, "videos/sp ce<>.mp4", &opts());
        assert!(!key.contains(' '));
        assert!(!key.contains('<'));
        assert!(!key.contains('>'));
    }

    #[test]
    fn chunk_key_is_unpadded() {
        assert_eq!(chunk_key("video:videos/x.mp4", 0), "video:videos/x.mp4_chunk_0");
        assert_eq!(chunk_key("video:videos/x.mp4", 12), "video:videos/x.mp4_chunk_12");
    }
}
