// src/schedule/window.rs

use chrono::{DateTime, Utc};

use crate::schedule::cron::{CronExpr, truncate_to_minute};

/// The recurrence of a pipeline: which logical timestamps need a run.
#[derive(Debug, Clone)]
pub struct ScheduleWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    schedule: CronExpr,
    catchup: bool,
}

impl ScheduleWindow {
    pub fn new(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        schedule: CronExpr,
        catchup: bool,
    ) -> Self {
        Self {
            start,
            end,
            schedule,
            catchup,
        }
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn schedule(&self) -> &CronExpr {
        &self.schedule
    }

    pub fn catchup(&self) -> bool {
        self.catchup
    }

    /// Every boundary in `[start, end]`, in chronological order.
    pub fn boundaries(&self) -> Boundaries<'_> {
        self.boundaries_until(self.end)
    }

    /// Logical timestamps that are due at `now`.
    ///
    /// With catchup every boundary from `start` up to `now` is due; without it
    /// only the most recent one.
    pub fn due(&self, now: DateTime<Utc>) -> Vec<DateTime<Utc>> {
        let horizon = now.min(self.end);
        let due = self.boundaries_until(horizon);

        if self.catchup {
            due.collect()
        } else {
            due.last().into_iter().collect()
        }
    }

    /// The next boundary strictly after `t` that still lies inside the window.
    pub fn next_boundary_after(&self, t: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if t < self.start {
            return self.first_boundary();
        }

        self.schedule
            .next_after(t)
            .filter(|next| *next <= self.end)
    }

    fn first_boundary(&self) -> Option<DateTime<Utc>> {
        let first = match truncate_to_minute(self.start) {
            Some(t) if t == self.start && self.schedule.matches(t) => Some(t),
            _ => self.schedule.next_after(self.start),
        };
        first.filter(|t| *t <= self.end)
    }

    fn boundaries_until(&self, horizon: DateTime<Utc>) -> Boundaries<'_> {
        Boundaries {
            window: self,
            next: self.first_boundary(),
            horizon,
        }
    }
}

/// Iterator over schedule boundaries up to a horizon.
#[derive(Debug)]
pub struct Boundaries<'a> {
    window: &'a ScheduleWindow,
    next: Option<DateTime<Utc>>,
    horizon: DateTime<Utc>,
}

impl Iterator for Boundaries<'_> {
    type Item = DateTime<Utc>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.filter(|t| *t <= self.horizon)?;
        self.next = self.window.next_boundary_after(current);
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn hourly(catchup: bool) -> ScheduleWindow {
        ScheduleWindow::new(
            at("2018-05-01T00:00:00Z"),
            at("2018-05-01T10:00:00Z"),
            CronExpr::parse("0 * * * *").unwrap(),
            catchup,
        )
    }

    #[test]
    fn boundaries_are_inclusive_of_both_ends() {
        let all: Vec<_> = hourly(true).boundaries().collect();
        assert_eq!(all.len(), 11);
        assert_eq!(all.first(), Some(&at("2018-05-01T00:00:00Z")));
        assert_eq!(all.last(), Some(&at("2018-05-01T10:00:00Z")));
    }

    #[test]
    fn unaligned_start_begins_at_next_boundary() {
        let window = ScheduleWindow::new(
            at("2018-05-01T00:30:00Z"),
            at("2018-05-01T03:00:00Z"),
            CronExpr::parse("@hourly").unwrap(),
            true,
        );
        let all: Vec<_> = window.boundaries().collect();
        assert_eq!(
            all,
            vec![
                at("2018-05-01T01:00:00Z"),
                at("2018-05-01T02:00:00Z"),
                at("2018-05-01T03:00:00Z"),
            ]
        );
    }

    #[test]
    fn catchup_materializes_every_due_boundary_in_order() {
        let due = hourly(true).due(at("2018-05-01T04:30:00Z"));
        assert_eq!(
            due,
            vec![
                at("2018-05-01T00:00:00Z"),
                at("2018-05-01T01:00:00Z"),
                at("2018-05-01T02:00:00Z"),
                at("2018-05-01T03:00:00Z"),
                at("2018-05-01T04:00:00Z"),
            ]
        );
    }

    #[test]
    fn without_catchup_only_latest_due_boundary() {
        let due = hourly(false).due(at("2018-05-01T04:30:00Z"));
        assert_eq!(due, vec![at("2018-05-01T04:00:00Z")]);
    }

    #[test]
    fn nothing_due_before_window_and_clamped_after_it() {
        assert!(hourly(true).due(at("2018-04-30T23:59:00Z")).is_empty());
        assert_eq!(
            hourly(false).due(at("2019-01-01T00:00:00Z")),
            vec![at("2018-05-01T10:00:00Z")]
        );
    }

    #[test]
    fn next_boundary_stays_inside_window() {
        let window = hourly(false);
        assert_eq!(
            window.next_boundary_after(at("2018-04-01T00:00:00Z")),
            Some(at("2018-05-01T00:00:00Z"))
        );
        assert_eq!(
            window.next_boundary_after(at("2018-05-01T09:10:00Z")),
            Some(at("2018-05-01T10:00:00Z"))
        );
        assert_eq!(window.next_boundary_after(at("2018-05-01T10:00:00Z")), None);
    }
}
