//! Terminal log pacing.
//!
//! [`LogBook`] holds the deduplicated, bounded log sequence; [`LogPacer`]
//! reveals it one line per tick so a burst of known lines reads like a
//! running process instead of an instant dump.

use std::collections::{HashSet, VecDeque};
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// Append-only log sequence, deduplicated by exact string and bounded to the
/// most recent `max_lines` entries. Deduplication covers the retained window;
/// a line evicted from it may be accepted again.
#[derive(Debug, Clone)]
pub struct LogBook {
    /// `(sequence number, line)`; sequence numbers count every accepted line.
    lines: VecDeque<(usize, String)>,
    /// Exactly the lines currently in `lines`.
    seen: HashSet<String>,
    total: usize,
    max_lines: usize,
}

impl LogBook {
    pub fn new(max_lines: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            seen: HashSet::new(),
            total: 0,
            max_lines: max_lines.max(1),
        }
    }

    /// Append text, one entry per non-empty line. Lines seen before are
    /// skipped. Returns how many lines were accepted.
    pub fn push(&mut self, text: &str) -> usize {
        let mut accepted = 0;
        for line in text.lines().map(str::trim_end) {
            if line.trim().is_empty() || self.seen.contains(line) {
                continue;
            }
            self.seen.insert(line.to_string());
            self.lines.push_back((self.total, line.to_string()));
            self.total += 1;
            accepted += 1;
            while self.lines.len() > self.max_lines {
                if let Some((_, evicted)) = self.lines.pop_front() {
                    self.seen.remove(&evicted);
                }
            }
        }
        accepted
    }

    /// Number of lines ever accepted.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Retained lines whose sequence number is below `printed`.
    pub fn printed_lines(&self, printed: usize) -> Vec<String> {
        self.lines
            .iter()
            .filter(|(seq, _)| *seq < printed)
            .map(|(_, line)| line.clone())
            .collect()
    }
}

/// Cursor over a [`LogBook`] that advances by at most one line per tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogPacer {
    printed: usize,
}

impl LogPacer {
    pub fn printed(&self) -> usize {
        self.printed
    }

    /// Advance by one line if any are waiting. Returns whether it moved.
    pub fn tick(&mut self, available: usize) -> bool {
        if self.printed < available {
            self.printed += 1;
            true
        } else {
            false
        }
    }

    pub fn caught_up(&self, available: usize) -> bool {
        self.printed >= available
    }

    /// Tick source for a pacer. The first tick fires one period from now and
    /// late ticks are delayed rather than bunched, so lines never jump.
    pub fn interval(period: Duration) -> Interval {
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logbook_dedups_exact_lines_and_splits_multiline_input() {
        let mut book = LogBook::new(10);
        assert_eq!(book.push("boot\nstep 1\n\nstep 1"), 2);
        assert_eq!(book.push("boot"), 0);
        assert_eq!(book.push("Boot"), 1);
        assert_eq!(book.total(), 3);
        assert_eq!(book.printed_lines(3), vec!["boot", "step 1", "Boot"]);
    }

    #[test]
    fn logbook_keeps_most_recent_lines_only() {
        let mut book = LogBook::new(3);
        for i in 0..5 {
            book.push(&format!("line {}", i));
        }
        assert_eq!(book.total(), 5);
        assert_eq!(book.printed_lines(5), vec!["line 2", "line 3", "line 4"]);
        assert_eq!(book.printed_lines(4), vec!["line 2", "line 3"]);
        assert_eq!(book.push("line 4"), 0);
        assert_eq!(book.push("line 0"), 1);
        assert_eq!(book.printed_lines(6), vec!["line 3", "line 4", "line 0"]);
    }

    #[test]
    fn logbook_memory_stays_bounded() {
        let mut book = LogBook::new(200);
        for i in 0..10_000 {
            book.push(&format!("unique line {}", i));
        }
        assert_eq!(book.total(), 10_000);
        assert_eq!(book.lines.len(), 200);
        assert_eq!(book.seen.len(), 200);
        assert!(book.seen.contains("unique line 9999"));
        assert!(!book.seen.contains("unique line 0"));
    }

    #[test]
    fn pacer_moves_one_line_per_tick() {
        let mut pacer = LogPacer::default();
        assert!(pacer.tick(3));
        assert!(pacer.tick(3));
        assert!(pacer.tick(3));
        assert!(!pacer.tick(3));
        assert!(pacer.caught_up(3));
        assert!(!pacer.caught_up(4));
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_lines_is_revealed_at_fixed_cadence() {
        let mut book = LogBook::new(200);
        for i in 0..50 {
            book.push(&format!("line {}", i));
        }
        let mut pacer = LogPacer::default();
        let mut ticks = LogPacer::interval(Duration::from_millis(45));
        let start = Instant::now();

        while !pacer.caught_up(book.total()) {
            ticks.tick().await;
            let before = pacer.printed();
            pacer.tick(book.total());
            assert_eq!(pacer.printed(), before + 1);
        }

        let elapsed = start.elapsed();
        assert_eq!(pacer.printed(), 50);
        assert!(elapsed >= Duration::from_millis(2250));
        assert!(elapsed < Duration::from_millis(2300));
    }

    #[tokio::test(start_paused = true)]
    async fn lines_arriving_mid_catch_up_are_queued() {
        let mut book = LogBook::new(200);
        book.push("a\nb\nc");
        let mut pacer = LogPacer::default();
        let mut ticks = LogPacer::interval(Duration::from_millis(45));

        ticks.tick().await;
        pacer.tick(book.total());
        book.push("d\ne");
        ticks.tick().await;
        pacer.tick(book.total());

        assert_eq!(pacer.printed(), 2);
        assert_eq!(book.printed_lines(pacer.printed()), vec!["a", "b"]);
        while pacer.tick(book.total()) {}
        assert_eq!(pacer.printed(), 5);
    }
}
