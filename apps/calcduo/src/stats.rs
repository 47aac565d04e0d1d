use std::fmt;

/// Tally of answer verdicts for the current run. Only surfaced verdicts
/// count: an expired problem is replaced without scoring an attempt.
#[derive(Debug, Default, Clone, Copy)]
pub struct SessionStats {
    attempted: u32,
    correct: u32,
    streak: u32,
    best_streak: u32,
}

impl SessionStats {
    pub fn record_correct(&mut self) {
        self.attempted += 1;
        self.correct += 1;
        self.streak += 1;
        self.best_streak = self.best_streak.max(self.streak);
    }

    pub fn record_incorrect(&mut self) {
        self.attempted += 1;
        self.streak = 0;
    }
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} correct, best streak {}",
            self.correct, self.attempted, self.best_streak
        )
    }
}
