use std::time::Duration;

/// Inputs for scoring one correct answer.
#[derive(Debug, Clone, Copy)]
pub struct ScoreContext {
    pub difficulty: u8,
    pub time_limit: Duration,
    pub elapsed: Duration,
}

impl ScoreContext {
    /// Fraction of the round's time still remaining, clamped to `[0, 1]`.
    pub fn remaining_fraction(&self) -> f64 {
        if self.time_limit.is_zero() {
            return 0.0;
        }
        let remaining = self.time_limit.saturating_sub(self.elapsed);
        (remaining.as_secs_f64() / self.time_limit.as_secs_f64()).clamp(0.0, 1.0)
    }
}

/// Pluggable scoring rules. Wrong and missing answers always score zero.
pub trait ScoringPolicy: Send + Sync {
    /// Points for a correct answer before power-ups and streak bonus.
    fn correct_score(&self, context: &ScoreContext) -> u32;

    /// Bonus for a correct answer that extends the streak to `streak`.
    /// Must be non-decreasing in `streak`.
    fn streak_bonus(&self, streak: u32) -> u32;
}

#[derive(Debug, Clone)]
pub struct StandardScoring {
    pub base_points: u32,
    /// Multiplier added per difficulty level above 1.
    pub difficulty_step: f64,
    pub streak_step: u32,
}

impl Default for StandardScoring {
    fn default() -> Self {
        Self {
            base_points: 100,
            difficulty_step: 0.25,
            streak_step: 10,
        }
    }
}

impl StandardScoring {
    pub fn difficulty_multiplier(&self, difficulty: u8) -> f64 {
        1.0 + self.difficulty_step * f64::from(difficulty.max(1) - 1)
    }
}

impl ScoringPolicy for StandardScoring {
    fn correct_score(&self, context: &ScoreContext) -> u32 {
        let speed = 0.5 + 0.5 * context.remaining_fraction();
        let points = f64::from(self.base_points) * self.difficulty_multiplier(context.difficulty) * speed;
        points.round() as u32
    }

    fn streak_bonus(&self, streak: u32) -> u32 {
        self.streak_step * streak.saturating_sub(1)
    }
}
