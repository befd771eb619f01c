//! Filename templates with strftime-style time conversions.
//!
//! A template such as `logs/app-%Y-%m-%d.log` compiles into a
//! [`CompiledPattern`] which renders a bucket instant into a filename and
//! also yields the discovery glob (`logs/app-*-*-*.log*`) used to find every
//! file the template has ever produced, generational variants included.
//!
//! Rendering is delegated to chrono's strftime; compiling only validates the
//! conversions and records their granularity.

use std::time::Duration;

use chrono::NaiveDateTime;

use crate::{Result, RotateError};

const SECOND: Duration = Duration::from_secs(1);
const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(60 * 60);
const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Granularity of a supported conversion, `None` when unsupported.
fn conversion_resolution(conversion: char) -> Option<Duration> {
    let resolution = match conversion {
        'Y' | 'y' | 'C' => 365 * DAY,
        'm' | 'b' | 'h' | 'B' => 28 * DAY,
        'd' | 'e' | 'j' | 'a' | 'A' | 'u' | 'w' | 'F' | 'D' => DAY,
        'p' => 12 * HOUR,
        'H' | 'I' => HOUR,
        'M' | 'R' => MINUTE,
        'S' | 'T' => SECOND,
        _ => return None,
    };
    Some(resolution)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Token { resolution: Duration },
}

/// A compiled filename template.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    template: String,
    segments: Vec<Segment>,
    discovery_glob: String,
}

impl CompiledPattern {
    /// Compile a template.
    ///
    /// Fails when the template is empty, has no time conversion, uses an
    /// unknown conversion or ends with a lone `%`.
    pub fn compile(template: &str) -> Result<Self> {
        if template.is_empty() {
            return Err(RotateError::pattern(template, "template is empty"));
        }

        let mut segments: Vec<Segment> = Vec::new();
        let mut literal = String::new();
        let mut chars = template.chars();

        while let Some(c) = chars.next() {
            if c != '%' {
                literal.push(c);
                continue;
            }
            match chars.next() {
                None => {
                    return Err(RotateError::pattern(template, "dangling '%' at end"));
                }
                Some('%') => literal.push('%'),
                Some(conv) => {
                    let resolution = conversion_resolution(conv).ok_or_else(|| {
                        RotateError::pattern(template, format!("unknown conversion %{conv}"))
                    })?;
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Token { resolution });
                }
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        if !segments.iter().any(|s| matches!(s, Segment::Token { .. })) {
            return Err(RotateError::pattern(
                template,
                "template contains no time conversion",
            ));
        }

        let discovery_glob = build_discovery_glob(&segments);

        Ok(Self {
            template: template.to_string(),
            segments,
            discovery_glob,
        })
    }

    /// The template this pattern was compiled from.
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Render the wall-clock fields of `at` into a filename.
    pub fn format(&self, at: &NaiveDateTime) -> String {
        at.format(&self.template).to_string()
    }

    /// Glob matching every file this template can produce.
    pub fn discovery_glob(&self) -> &str {
        &self.discovery_glob
    }

    /// Finest time granularity the template distinguishes.
    pub fn resolution(&self) -> Duration {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Token { resolution } => Some(*resolution),
                Segment::Literal(_) => None,
            })
            .min()
            .unwrap_or(365 * DAY)
    }
}

/// Collapse token runs and literal `*` runs into one wildcard each, escape
/// everything else, and leave a trailing wildcard for generational suffixes.
fn build_discovery_glob(segments: &[Segment]) -> String {
    let mut glob = String::new();
    let mut chunk = String::new();
    let mut last_wild = false;

    for segment in segments {
        match segment {
            Segment::Token { .. } => push_wildcard(&mut glob, &mut chunk, &mut last_wild),
            Segment::Literal(text) => {
                for c in text.chars() {
                    if c == '*' {
                        push_wildcard(&mut glob, &mut chunk, &mut last_wild);
                    } else {
                        chunk.push(c);
                    }
                }
            }
        }
    }
    push_wildcard(&mut glob, &mut chunk, &mut last_wild);
    glob
}

fn push_wildcard(glob: &mut String, chunk: &mut String, last_wild: &mut bool) {
    if !chunk.is_empty() {
        glob.push_str(&glob::Pattern::escape(chunk));
        chunk.clear();
        *last_wild = false;
    }
    if !*last_wild {
        glob.push('*');
        *last_wild = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, s)
            .unwrap()
    }

    #[test]
    fn test_format_basic_tokens() {
        let p = CompiledPattern::compile("app-%Y-%m-%d_%H%M%S.log").unwrap();
        assert_eq!(
            p.format(&at(2023, 1, 2, 3, 4, 5)),
            "app-2023-01-02_030405.log"
        );
    }

    #[test]
    fn test_format_pads_small_years() {
        let p = CompiledPattern::compile("apm-test/logs/apm.log.%Y%m%d").unwrap();
        assert_eq!(
            p.format(&at(100, 1, 1, 1, 0, 0)),
            "apm-test/logs/apm.log.01000101"
        );
    }

    #[test]
    fn test_format_composite_and_named_tokens() {
        let p = CompiledPattern::compile(
            "%F %T %a %b %B %A %j %I%p %y %e %% %C %u %w %R %D %h",
        )
        .unwrap();
        assert_eq!(
            p.format(&at(2023, 3, 5, 14, 7, 9)),
            "2023-03-05 14:07:09 Sun Mar March Sunday 064 02PM 23  5 % 20 7 0 14:07 03/05/23 Mar"
        );
    }

    #[test]
    fn test_compile_rejects_bad_templates() {
        for template in ["", "app.log", "100%% done", "app-%Q.log", "app-%Y%"] {
            let err = CompiledPattern::compile(template).unwrap_err();
            assert!(
                matches!(err, RotateError::Pattern { .. }),
                "{template:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn test_discovery_glob_collapses_token_runs() {
        let p = CompiledPattern::compile("app-%Y-%m-%d.log").unwrap();
        assert_eq!(p.discovery_glob(), "app-*-*-*.log*");

        let p = CompiledPattern::compile("apm.log.%Y%m%d").unwrap();
        assert_eq!(p.discovery_glob(), "apm.log.*");

        let p = CompiledPattern::compile("a**b-%H*%M").unwrap();
        assert_eq!(p.discovery_glob(), "a*b-*");
    }

    #[test]
    fn test_discovery_glob_escapes_literals() {
        let p = CompiledPattern::compile("logs/[web]?-%Y.log").unwrap();
        assert_eq!(p.discovery_glob(), "logs/[[]web[]][?]-*.log*");
        assert!(glob::Pattern::new(p.discovery_glob())
            .unwrap()
            .matches("logs/[web]?-2023.log.2"));
    }

    #[test]
    fn test_instants_in_one_hour_share_a_name() {
        let p = CompiledPattern::compile("app-%Y-%m-%d-%H.log").unwrap();
        assert_eq!(
            p.format(&at(2023, 6, 1, 10, 0, 0)),
            p.format(&at(2023, 6, 1, 10, 59, 59))
        );
        assert_ne!(
            p.format(&at(2023, 6, 1, 10, 59, 59)),
            p.format(&at(2023, 6, 1, 11, 0, 0))
        );
    }

    #[test]
    fn test_resolution_is_finest_token() {
        let p = CompiledPattern::compile("%Y-%m-%d").unwrap();
        assert_eq!(p.resolution(), DAY);
        let p = CompiledPattern::compile("%Y/%H-%M").unwrap();
        assert_eq!(p.resolution(), MINUTE);
    }
}
