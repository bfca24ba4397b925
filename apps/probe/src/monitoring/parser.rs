//! Best-effort extraction of statistics from `ping` output.
//!
//! Two independent strategies run over the same text:
//! - the summary block ("N packets transmitted, M received" plus the
//!   "min/avg/max" line),
//! - the individual reply lines and their inline `time=` values.
//!
//! Their results are reconciled by keeping whichever saw more replies. A
//! strategy that finds nothing yields `None`; parsing never fails.

use once_cell::sync::Lazy;
use regex::Regex;

use super::types::round2;

static RE_TRANSMITTED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+)\s+packets?\s+transmitted,\s*(\d+)\s+(?:packets\s+)?received").unwrap()
});
static RE_RTT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"min/avg/max(?:/(?:mdev|stddev))?\s*=\s*([0-9]*\.?[0-9]+)/([0-9]*\.?[0-9]+)/([0-9]*\.?[0-9]+)")
        .unwrap()
});
static RE_REPLY_TIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"time[=<]\s*([0-9]*\.?[0-9]+)\s*ms").unwrap());

const REPLY_MARKER: &str = "bytes from";

/// Which strategy the final numbers came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsSource {
    Summary,
    Replies,
    Unparsed,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RttSummary {
    pub min_ms: f64,
    pub avg_ms: f64,
    pub max_ms: f64,
}

impl RttSummary {
    fn from_samples(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let min_ms = samples.iter().copied().fold(f64::INFINITY, f64::min);
        let max_ms = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let avg_ms = samples.iter().sum::<f64>() / samples.len() as f64;
        Some(Self { min_ms: round2(min_ms), avg_ms: round2(avg_ms), max_ms: round2(max_ms) })
    }
}

/// What a single strategy managed to read
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedStats {
    pub source: StatsSource,
    pub transmitted: Option<u32>,
    pub received: u32,
    pub rtt: Option<RttSummary>,
}

/// Reconciled statistics for one run
#[derive(Debug, Clone, PartialEq)]
pub struct PingStatistics {
    pub source: StatsSource,
    pub packets_sent: u32,
    pub packets_received: u32,
    pub rtt: Option<RttSummary>,
}

type Strategy = fn(&str) -> Option<ParsedStats>;

/// Strategies in priority order; on equal reply counts the earlier one wins.
const STRATEGIES: [Strategy; 2] = [parse_summary, parse_replies];

/// True when the output contains at least one echo reply line.
pub fn has_reply(output: &str) -> bool {
    output.lines().any(|line| line.contains(REPLY_MARKER))
}

/// Summary block strategy.
pub fn parse_summary(output: &str) -> Option<ParsedStats> {
    let mut transmitted = None;
    let mut received = None;
    let mut rtt = None;

    for line in output.lines() {
        if let Some(caps) = RE_TRANSMITTED.captures(line) {
            transmitted = caps.get(1).and_then(|m| m.as_str().parse::<u32>().ok());
            received = caps.get(2).and_then(|m| m.as_str().parse::<u32>().ok());
        }

        if let Some(caps) = RE_RTT.captures(line) {
            let field = |idx: usize| caps.get(idx).and_then(|m| m.as_str().parse::<f64>().ok());
            if let (Some(min_ms), Some(avg_ms), Some(max_ms)) = (field(1), field(2), field(3)) {
                rtt = Some(RttSummary {
                    min_ms: round2(min_ms),
                    avg_ms: round2(avg_ms),
                    max_ms: round2(max_ms),
                });
            }
        }
    }

    if transmitted.is_none() && received.is_none() && rtt.is_none() {
        return None;
    }

    Some(ParsedStats {
        source: StatsSource::Summary,
        transmitted,
        received: received.unwrap_or(0),
        rtt,
    })
}

/// Reply line strategy: one sample per "bytes from ... time=X ms" line.
pub fn parse_replies(output: &str) -> Option<ParsedStats> {
    let samples: Vec<f64> = output
        .lines()
        .filter(|line| line.contains(REPLY_MARKER))
        .filter_map(|line| RE_REPLY_TIME.captures(line))
        .filter_map(|caps| caps.get(1)?.as_str().parse::<f64>().ok())
        .collect();

    let rtt = RttSummary::from_samples(&samples)?;

    Some(ParsedStats {
        source: StatsSource::Replies,
        transmitted: None,
        received: u32::try_from(samples.len()).unwrap_or(u32::MAX),
        rtt: Some(rtt),
    })
}

/// Merge strategy results, preferring the one with more received packets.
///
/// Gaps in the winner (transmitted count, timings) are filled from the others.
pub fn reconcile(
    candidates: impl IntoIterator<Item = ParsedStats>,
    requested: u32,
) -> PingStatistics {
    let mut best: Option<ParsedStats> = None;

    for mut candidate in candidates {
        best = Some(match best.take() {
            None => candidate,
            Some(mut current) => {
                if candidate.received > current.received {
                    candidate.transmitted = candidate.transmitted.or(current.transmitted);
                    candidate
                } else {
                    current.transmitted = current.transmitted.or(candidate.transmitted);
                    if current.rtt.is_none() && candidate.received == current.received {
                        current.rtt = candidate.rtt;
                    }
                    current
                }
            }
        });
    }

    match best {
        Some(stats) => PingStatistics {
            source: stats.source,
            packets_sent: stats.transmitted.unwrap_or(requested).max(stats.received),
            packets_received: stats.received,
            rtt: stats.rtt,
        },
        None => PingStatistics {
            source: StatsSource::Unparsed,
            packets_sent: requested,
            packets_received: 0,
            rtt: None,
        },
    }
}

/// Run every strategy over `output` and reconcile the results.
pub fn parse_statistics(output: &str, requested: u32) -> PingStatistics {
    reconcile(STRATEGIES.iter().filter_map(|strategy| strategy(output)), requested)
}
