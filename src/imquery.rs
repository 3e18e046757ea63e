//! IMQuery Resolver (C9): responsive-sizing derivative resolution.
//!
//! Mapping results are memoized in a `DashMap<(u32, u32), Option<String>>` keyed
//! by the normalized `(width, height)` pair, the way the teacher memoizes
//! rate-limiter quota lookups — a process-wide cache guarded by one `DashMap`
//! rather than a per-call computation.

use std::collections::HashMap;

use dashmap::DashMap;

use crate::config::{AppConfig, BreakpointConfig};

/// Recognized IMQuery parameters from the inbound request, already parsed out
/// of the raw query string.
#[derive(Debug, Clone, Default)]
pub struct ImqueryParams {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub view_width: Option<u32>,
    pub view_height: Option<u32>,
    pub density: Option<f64>,
    pub imref: Option<String>,
}

impl ImqueryParams {
    pub fn from_map(params: &HashMap<String, String>) -> Self {
        Self {
            width: params.get("imwidth").and_then(|v| v.parse().ok()),
            height: params.get("imheight").and_then(|v| v.parse().ok()),
            view_width: params.get("im-viewwidth").and_then(|v| v.parse().ok()),
            view_height: params.get("im-viewheight").and_then(|v| v.parse().ok()),
            density: params.get("im-density").and_then(|v| v.parse().ok()),
            imref: params.get("imref").cloned(),
        }
    }

    /// True if any recognized IMQuery parameter was present on the request.
    pub fn is_present(&self) -> bool {
        self.width.is_some()
            || self.height.is_some()
            || self.view_width.is_some()
            || self.view_height.is_some()
            || self.density.is_some()
            || self.imref.is_some()
    }

    /// The effective width/height to resolve against: explicit `imwidth`/`imheight`
    /// take precedence over the viewport hints.
    fn effective_dimensions(&self) -> (Option<u32>, Option<u32>) {
        (
            self.width.or(self.view_width),
            self.height.or(self.view_height),
        )
    }
}

/// A successfully resolved derivative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDerivative {
    pub name: String,
    pub width: u32,
    pub height: u32,
}

/// Round `width` to the nearest 10px, to reduce cache cardinality on the
/// width-only breakpoint path.
fn bucket_width(width: u32) -> u32 {
    ((width + 5) / 10) * 10
}

fn breakpoint_matches(bp: &BreakpointConfig, width: u32) -> bool {
    let min = bp.min.unwrap_or(0);
    let max = bp.max.unwrap_or(u32::MAX);
    width >= min && width <= max
}

fn relative_error(requested: u32, canonical: u32) -> f64 {
    if requested == 0 {
        return f64::MAX;
    }
    (canonical as f64 - requested as f64) / requested as f64
}

fn closest_derivative_by_dimensions<'a>(
    config: &'a AppConfig,
    width: u32,
    height: u32,
) -> Option<(&'a str, u32, u32)> {
    const THRESHOLD: f64 = 0.25;
    let mut best: Option<(&str, f64, u32, u32)> = None;

    for (name, derivative) in &config.derivatives {
        let (Some(dw), Some(dh)) = (derivative.width, derivative.height) else {
            continue;
        };
        let we = relative_error(width, dw);
        let he = relative_error(height, dh);
        let error = (we * we + he * he).sqrt();
        if best.as_ref().map(|(_, best_err, _, _)| error < *best_err).unwrap_or(true) {
            best = Some((name.as_str(), error, dw, dh));
        }
    }

    best.filter(|(_, error, _, _)| *error <= THRESHOLD)
        .map(|(name, _, dw, dh)| (name, dw, dh))
}

/// Memoized IMQuery resolver.
#[derive(Default)]
pub struct ImqueryResolver {
    memo: DashMap<(u32, u32), Option<ResolvedDerivative>>,
}

impl ImqueryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `params` against `config`'s breakpoints/derivatives, per
    /// spec.md §4.9's width-only-vs-both-dimensions rules.
    pub fn resolve(&self, config: &AppConfig, params: &ImqueryParams) -> Option<ResolvedDerivative> {
        let (width, height) = params.effective_dimensions();
        let Some(width) = width else {
            return None;
        };

        let (memo_width, memo_height) = match height {
            Some(h) => (width, h),
            None => (bucket_width(width), 0),
        };

        if let Some(cached) = self.memo.get(&(memo_width, memo_height)) {
            return cached.clone();
        }

        let resolved = match height {
            None => {
                let bucketed = bucket_width(width);
                let mut ranges: Vec<&BreakpointConfig> = config.responsive_breakpoints.values().collect();
                ranges.sort_by_key(|bp| bp.min.unwrap_or(0));
                ranges
                    .into_iter()
                    .find(|bp| breakpoint_matches(bp, bucketed))
                    .and_then(|bp| {
                        config.derivatives.get(&bp.derivative).map(|d| ResolvedDerivative {
                            name: bp.derivative.clone(),
                            width: d.width.unwrap_or(bucketed),
                            height: d.height.unwrap_or(0),
                        })
                    })
            }
            Some(height) => closest_derivative_by_dimensions(config, width, height).map(
                |(name, dw, dh)| ResolvedDerivative {
                    name: name.to_string(),
                    width: dw,
                    height: dh,
                },
            ),
        };

        self.memo.insert((memo_width, memo_height), resolved.clone());
        resolved
    }
}
