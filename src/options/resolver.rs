//! Option Resolver (C10): a pure precedence merge producing the final
//! [`TransformOptions`](super::TransformOptions).
//!
//! Precedence, later wins: mode defaults < derivative defaults < path-pattern
//! transformation overrides < parsed URL query parameters. Invalid query values are
//! never fatal — they're logged and the prior-precedence value survives, mirroring
//! the teacher's `content_type_validation_middleware` policy of rejecting clearly bad
//! input while not punishing the caller for an unrecognized extra parameter.

use std::collections::HashMap;

use crate::config::{DerivativeConfig, VideoDefaults};
use crate::options::{TransformMode, TransformOptions};

const ALLOWED_QUALITIES: &[&str] = &["low", "medium", "high", "auto"];
const ALLOWED_COMPRESSIONS: &[&str] = &["low", "medium", "high", "lossless", "auto"];

/// Raw query parameters as received on the wire, before validation.
///
/// Field names mirror spec.md §6's recognized transform parameters. Construction
/// from an axum query map happens in `api::handlers`; this type exists so the
/// resolver itself has no dependency on axum/HTTP types and stays pure and testable.
#[derive(Debug, Clone, Default)]
pub struct RawQuery {
    pub width: Option<String>,
    pub height: Option<String>,
    pub mode: Option<String>,
    pub quality: Option<String>,
    pub compression: Option<String>,
    pub format: Option<String>,
    pub time: Option<String>,
    pub duration: Option<String>,
    pub cols: Option<String>,
    pub rows: Option<String>,
    pub interval: Option<String>,
    pub derivative: Option<String>,
}

impl RawQuery {
    /// Build from a generic string map, as produced by axum's `Query<HashMap<String, String>>`.
    pub fn from_map(params: &HashMap<String, String>) -> Self {
        Self {
            width: params.get("width").cloned(),
            height: params.get("height").cloned(),
            mode: params.get("mode").cloned(),
            quality: params.get("quality").cloned(),
            compression: params.get("compression").cloned(),
            format: params.get("format").cloned(),
            time: params.get("time").cloned(),
            duration: params.get("duration").cloned(),
            cols: params.get("cols").cloned(),
            rows: params.get("rows").cloned(),
            interval: params.get("interval").cloned(),
            derivative: params.get("derivative").cloned(),
        }
    }
}

/// Path-pattern transformation overrides attached to a matched `Origin`.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct TransformationOverrides {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub quality: Option<String>,
    pub compression: Option<String>,
    pub format: Option<String>,
}

fn parse_u32(value: &str, field: &str) -> Option<u32> {
    match value.parse::<u32>() {
        Ok(v) if v > 0 => Some(v),
        _ => {
            tracing::warn!(field, value, "ignoring invalid positive-integer parameter");
            None
        }
    }
}

fn validate_enum(value: &str, field: &str, allowed: &[&str]) -> Option<String> {
    if allowed.contains(&value) {
        Some(value.to_string())
    } else {
        tracing::warn!(field, value, "ignoring value outside recognized enumeration");
        None
    }
}

/// Resolve the final `TransformOptions` for a request.
///
/// `mode` is the mode already determined for this origin/path (defaulting to
/// `video` unless the query overrides it with a recognized value). `derivative`
/// is the named derivative config, already looked up by the caller if the query
/// or an override named one. `overrides` is the origin's path-pattern override
/// block, if configured.
pub fn resolve(
    mode: TransformMode,
    video_defaults: &VideoDefaults,
    derivative: Option<(&str, &DerivativeConfig)>,
    overrides: Option<&TransformationOverrides>,
    query: &RawQuery,
) -> TransformOptions {
    let mut options = TransformOptions {
        mode,
        quality: video_defaults.quality.clone(),
        compression: video_defaults.compression.clone(),
        format: video_defaults.format.clone(),
        ..TransformOptions::default()
    };

    if let Some((name, cfg)) = derivative {
        options.derivative = Some(name.to_string());
        options.width = cfg.width;
        options.height = cfg.height;
        if cfg.quality.is_some() {
            options.quality = cfg.quality.clone();
        }
        if cfg.compression.is_some() {
            options.compression = cfg.compression.clone();
        }
        if cfg.format.is_some() {
            options.format = cfg.format.clone();
        }
        options.mapped_from = Some(crate::options::MappedFrom::Explicit);
    }

    if let Some(overrides) = overrides {
        if options.derivative.is_none() {
            if overrides.width.is_some() {
                options.width = overrides.width;
            }
            if overrides.height.is_some() {
                options.height = overrides.height;
            }
        }
        if overrides.quality.is_some() {
            options.quality = overrides.quality.clone();
        }
        if overrides.compression.is_some() {
            options.compression = overrides.compression.clone();
        }
        if overrides.format.is_some() {
            options.format = overrides.format.clone();
        }
    }

    // Explicit `derivative=` query parameter takes precedence only when the caller
    // didn't already pass a resolved derivative in; a literal query name with no
    // matching config is simply ignored here (the handler validates existence).
    if options.derivative.is_none() {
        if let Some(name) = &query.derivative {
            options.derivative = Some(name.clone());
            options.mapped_from = Some(crate::options::MappedFrom::Explicit);
        }
    }

    if options.derivative.is_none() {
        if let Some(width) = query.width.as_deref().and_then(|v| parse_u32(v, "width")) {
            options.width = Some(width);
        }
        if let Some(height) = query.height.as_deref().and_then(|v| parse_u32(v, "height")) {
            options.height = Some(height);
        }
    }

    if options.derivative.is_none() {
        if let Some(quality) = query
            .quality
            .as_deref()
            .and_then(|v| validate_enum(v, "quality", ALLOWED_QUALITIES))
        {
            options.quality = Some(quality);
        }
        if let Some(compression) = query
            .compression
            .as_deref()
            .and_then(|v| validate_enum(v, "compression", ALLOWED_COMPRESSIONS))
        {
            options.compression = Some(compression);
        }
        if let Some(format) = query.format.clone() {
            options.format = Some(format);
        }
    }
    if let Some(time) = query.time.clone() {
        options.time = Some(time);
    }
    if let Some(duration) = query.duration.clone() {
        options.duration = Some(duration);
    }
    if let Some(cols) = query.cols.as_deref().and_then(|v| parse_u32(v, "cols")) {
        options.cols = Some(cols);
    }
    if let Some(rows) = query.rows.as_deref().and_then(|v| parse_u32(v, "rows")) {
        options.rows = Some(rows);
    }
    if let Some(interval) = query.interval.clone() {
        options.interval = Some(interval);
    }

    options
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> VideoDefaults {
        VideoDefaults {
            quality: Some("medium".to_string()),
            compression: None,
            format: None,
        }
    }

    #[test]
    fn mode_defaults_survive_with_empty_query() {
        let result = resolve(
            TransformMode::Video,
            &defaults(),
            None,
            None,
            &RawQuery::default(),
        );
        assert_eq!(result.quality.as_deref(), Some("medium"));
        assert!(result.derivative.is_none());
    }

    #[test]
    fn derivative_dimensions_override_raw_width_height() {
        let derivative = DerivativeConfig {
            width: Some(1280),
            height: Some(720),
            quality: Some("high".to_string()),
            compression: None,
            format: None,
            mode: TransformMode::Video,
        };
        let mut query = RawQuery::default();
        query.width = Some("99".to_string());
        let result = resolve(
            TransformMode::Video,
            &defaults(),
            Some(("tablet", &derivative)),
            None,
            &query,
        );
        assert_eq!(result.width, Some(1280));
        assert_eq!(result.height, Some(720));
        assert_eq!(result.derivative.as_deref(), Some("tablet"));
    }

    #[test]
    fn derivative_quality_and_format_survive_raw_query_override() {
        let derivative = DerivativeConfig {
            width: Some(1280),
            height: Some(720),
            quality: Some("high".to_string()),
            compression: Some("standard".to_string()),
            format: Some("mp4".to_string()),
            mode: TransformMode::Video,
        };
        let mut query = RawQuery::default();
        query.quality = Some("low".to_string());
        query.compression = Some("lossless".to_string());
        query.format = Some("webm".to_string());
        let result = resolve(
            TransformMode::Video,
            &defaults(),
            Some(("tablet", &derivative)),
            None,
            &query,
        );
        assert_eq!(result.quality.as_deref(), Some("high"));
        assert_eq!(result.compression.as_deref(), Some("standard"));
        assert_eq!(result.format.as_deref(), Some("mp4"));
    }

    #[test]
    fn query_overrides_defaults_when_no_derivative() {
        let mut query = RawQuery::default();
        query.quality = Some("low".to_string());
        query.width = Some("640".to_string());
        let result = resolve(TransformMode::Video, &defaults(), None, None, &query);
        assert_eq!(result.quality.as_deref(), Some("low"));
        assert_eq!(result.width, Some(640));
    }

    #[test]
    fn invalid_enum_value_falls_back_to_prior_precedence() {
        let mut query = RawQuery::default();
        query.quality = Some("ultra-mega".to_string());
        let result = resolve(TransformMode::Video, &defaults(), None, None, &query);
        assert_eq!(result.quality.as_deref(), Some("medium"));
    }

    #[test]
    fn zero_width_is_rejected() {
        let mut query = RawQuery::default();
        query.width = Some("0".to_string());
        let result = resolve(TransformMode::Video, &defaults(), None, None, &query);
        assert_eq!(result.width, None);
    }

    #[test]
    fn path_override_applies_below_query_precedence() {
        let overrides = TransformationOverrides {
            width: Some(500),
            height: Some(500),
            quality: None,
            compression: None,
            format: None,
        };
        let mut query = RawQuery::default();
        query.width = Some("800".to_string());
        let result = resolve(
            TransformMode::Video,
            &defaults(),
            None,
            Some(&overrides),
            &query,
        );
        assert_eq!(result.width, Some(800));
        assert_eq!(result.height, Some(500));
    }
}
