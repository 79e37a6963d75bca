//! Wildcard topic patterns.
//!
//! A pattern is a topic string containing `*`, which matches any run of zero
//! or more characters. Matching is anchored at both ends: `signal:*` matches
//! `signal:BTCUSDT_1m` but not `xsignal:BTCUSDT_1m`.

use crate::types::WILDCARD;

/// A compiled pattern: the literal pieces between wildcards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Glob {
    segments: Vec<String>,
}

impl Glob {
    pub fn compile(pattern: &str) -> Self {
        Self {
            segments: pattern.split(WILDCARD).map(str::to_string).collect(),
        }
    }

    /// Whether the whole of `topic` matches this pattern.
    pub fn matches(&self, topic: &str) -> bool {
        let n = self.segments.len();
        if n == 1 {
            return topic == self.segments[0];
        }

        let first = &self.segments[0];
        let last = &self.segments[n - 1];
        let Some(mut rest) = topic.strip_prefix(first.as_str()) else {
            return false;
        };
        let Some(middle) = rest.strip_suffix(last.as_str()) else {
            return false;
        };
        rest = middle;

        // Leftmost match of each inner literal is sufficient for `*`-only globs.
        for seg in &self.segments[1..n - 1] {
            match rest.find(seg.as_str()) {
                Some(i) => rest = &rest[i + seg.len()..],
                None => return false,
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_wildcard() {
        let g = Glob::compile("signal:*");
        assert!(g.matches("signal:BTCUSDT_1m"));
        assert!(g.matches("signal:ETHUSDT_1h"));
        assert!(g.matches("signal:"));
        assert!(!g.matches("ohlcv:BTCUSDT_1m"));
        assert!(!g.matches("xsignal:BTCUSDT_1m"));
    }

    #[test]
    fn inner_and_leading_wildcards() {
        let g = Glob::compile("*:BTCUSDT_*");
        assert!(g.matches("ohlcv:BTCUSDT_1m"));
        assert!(g.matches("signal:BTCUSDT_4h"));
        assert!(!g.matches("signal:ETHUSDT_4h"));

        let g = Glob::compile("a*b*c");
        assert!(g.matches("abc"));
        assert!(g.matches("aXbYc"));
        assert!(!g.matches("acb"));
        // prefix and suffix must not overlap
        assert!(!Glob::compile("ab*ba").matches("aba"));
    }

    #[test]
    fn star_matches_everything() {
        let g = Glob::compile("*");
        assert!(g.matches(""));
        assert!(g.matches("anything:at_all"));
    }

    #[test]
    fn literal_only() {
        let g = Glob::compile("ohlcv:BTCUSDT_1m");
        assert!(g.matches("ohlcv:BTCUSDT_1m"));
        assert!(!g.matches("ohlcv:BTCUSDT_1m5"));
    }
}
