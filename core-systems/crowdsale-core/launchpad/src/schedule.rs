// crowdsale-core/launchpad/src/schedule.rs
//! Tier boundaries as a timeline, and the countdown to the next one.

use serde::Serialize;

use crate::validate::TimeWindow;
use crate::Timestamp;

/// Below this many seconds the countdown also shows seconds.
pub const SHOW_SECONDS_WITHIN: u64 = 5 * 60;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TickKind {
    Start,
    End,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct SaleTick {
    pub time: Timestamp,
    pub kind: TickKind,
    pub tier_index: usize,
}

/// Every tier start and end, sorted by time. A start shared with the
/// previous tier's end sorts after it.
pub fn sale_ticks(windows: &[TimeWindow]) -> Vec<SaleTick> {
    let mut ticks: Vec<SaleTick> = windows
        .iter()
        .enumerate()
        .flat_map(|(tier_index, w)| {
            [
                SaleTick { time: w.start, kind: TickKind::Start, tier_index },
                SaleTick { time: w.end, kind: TickKind::End, tier_index },
            ]
        })
        .collect();
    ticks.sort_by_key(|t| (t.time, t.tier_index, t.kind == TickKind::End));
    ticks
}

/// First tick strictly after `now`.
pub fn next_tick(ticks: &[SaleTick], now: Timestamp) -> Option<SaleTick> {
    ticks.iter().copied().find(|t| t.time > now)
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Countdown {
    pub days: u64,
    pub hours: u64,
    pub minutes: u64,
    pub seconds: u64,
    pub show_seconds: bool,
}

impl Countdown {
    /// Time left until `target`; zero once it has passed.
    pub fn until(now: Timestamp, target: Timestamp) -> Self {
        let left = target.saturating_sub(now);
        Self {
            days: left / 86_400,
            hours: (left % 86_400) / 3_600,
            minutes: (left % 3_600) / 60,
            seconds: left % 60,
            show_seconds: left < SHOW_SECONDS_WITHIN,
        }
    }

    /// Nothing left, however the countdown was built.
    pub fn is_elapsed(&self) -> bool {
        self.days + self.hours + self.minutes + self.seconds == 0
    }
}

impl std::fmt::Display for Countdown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}d {}h {}m", self.days, self.hours, self.minutes)?;
        if self.show_seconds {
            write!(f, " {}s", self.seconds)?;
        }
        Ok(())
    }
}
