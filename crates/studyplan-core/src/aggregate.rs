use rand::Rng;
use rand::seq::SliceRandom;
use serde::Serialize;

use crate::task::Task;

pub const QUOTES: [&str; 10] = [
    "Success is the sum of small efforts repeated day in and day out.",
    "The expert in anything was once a beginner.",
    "Education is the passport to the future.",
    "Learning is a treasure that will follow its owner everywhere.",
    "The beautiful thing about learning is that no one can take it away from you.",
    "Study while others are sleeping; work while others are loafing.",
    "Your future is created by what you do today, not tomorrow.",
    "Don't watch the clock; do what it does. Keep going.",
    "The only way to do great work is to love what you do.",
    "Believe you can and you're halfway there.",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Stats {
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
    /// Rounded to the nearest whole percent; 0 for an empty list.
    pub percent: u8,
}

impl Stats {
    pub fn motivation<R: Rng + ?Sized>(&self, rng: &mut R) -> Motivation {
        motivation(self.percent, self.total, rng)
    }
}

#[tracing::instrument(skip_all, fields(total = snapshot.len()))]
pub fn aggregate(snapshot: &[Task]) -> Stats {
    let total = snapshot.len();
    let completed = snapshot.iter().filter(|task| task.completed).count();
    let percent = if total == 0 {
        0
    } else {
        (completed as f64 / total as f64 * 100.0).round() as u8
    };

    Stats {
        total,
        completed,
        pending: total - completed,
        percent,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Motivation {
    AllComplete,
    AlmostThere,
    Halfway,
    GoodStart,
    Quote(&'static str),
}

impl Motivation {
    pub fn message(&self) -> &'static str {
        match self {
            Motivation::AllComplete => {
                "🎉 Amazing! You've completed all your tasks! Keep up the great work!"
            }
            Motivation::AlmostThere => "🌟 You're almost there! Just a little more to go!",
            Motivation::Halfway => "💪 Great progress! You're halfway through!",
            Motivation::GoodStart => "🚀 Good start! Keep the momentum going!",
            Motivation::Quote(text) => *text,
        }
    }
}

/// Thresholds are checked from the top down; below 25% a quote is drawn
/// from [`QUOTES`] with `rng`.
pub fn motivation<R: Rng + ?Sized>(percent: u8, total: usize, rng: &mut R) -> Motivation {
    match percent {
        100 if total > 0 => Motivation::AllComplete,
        75.. => Motivation::AlmostThere,
        50.. => Motivation::Halfway,
        25.. => Motivation::GoodStart,
        _ => Motivation::Quote(QUOTES.choose(rng).copied().unwrap_or(QUOTES[0])),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::task::{Priority, TaskId};

    fn task(id: u64, completed: bool) -> Task {
        Task {
            id: TaskId(id),
            title: format!("task {id}"),
            subject: "Physics".to_string(),
            date: NaiveDate::from_ymd_opt(2025, 1, 10).expect("date"),
            time: NaiveTime::from_hms_opt(9, 0, 0).expect("time"),
            priority: Priority::Low,
            description: None,
            completed,
            created_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            reminder_shown: false,
        }
    }

    #[test]
    fn counts_and_percent() {
        let stats = aggregate(&[task(1, false), task(2, true)]);
        assert_eq!(
            stats,
            Stats {
                total: 2,
                completed: 1,
                pending: 1,
                percent: 50
            }
        );

        let thirds = aggregate(&[task(1, true), task(2, true), task(3, false)]);
        assert_eq!(thirds.percent, 67);
        assert_eq!(thirds.completed + thirds.pending, thirds.total);
    }

    #[test]
    fn empty_snapshot_is_zero_percent() {
        let stats = aggregate(&[]);
        assert_eq!(stats, Stats::default());
    }

    #[test]
    fn motivation_thresholds() {
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(motivation(100, 4, &mut rng), Motivation::AllComplete);
        assert_eq!(motivation(75, 4, &mut rng), Motivation::AlmostThere);
        assert_eq!(motivation(99, 4, &mut rng), Motivation::AlmostThere);
        assert_eq!(motivation(50, 4, &mut rng), Motivation::Halfway);
        assert_eq!(motivation(25, 4, &mut rng), Motivation::GoodStart);
        assert!(matches!(motivation(24, 4, &mut rng), Motivation::Quote(_)));
        assert!(matches!(motivation(0, 0, &mut rng), Motivation::Quote(_)));
    }

    #[test]
    fn thresholds_follow_displayed_percent() {
        let mut snapshot: Vec<Task> = (1..=199).map(|id| task(id, true)).collect();
        snapshot.push(task(200, false));
        let stats = aggregate(&snapshot);
        assert_eq!((stats.pending, stats.percent), (1, 100));
        assert_eq!(
            stats.motivation(&mut StdRng::seed_from_u64(3)),
            Motivation::AllComplete
        );
        assert!(Motivation::AllComplete.message().starts_with("🎉 Amazing!"));
        assert!(Motivation::GoodStart.message().starts_with("🚀 "));
    }

    #[test]
    fn quote_draw_is_reproducible_with_seed() {
        let first = motivation(10, 10, &mut StdRng::seed_from_u64(42));
        let second = motivation(10, 10, &mut StdRng::seed_from_u64(42));
        assert_eq!(first, second);
        let Motivation::Quote(text) = first else {
            panic!("expected quote, got {first:?}");
        };
        assert!(QUOTES.contains(&text));
    }
}
