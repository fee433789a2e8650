use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crate::store::schema::{GAME_OVER_KEY, GameOverRecord, LIVES_KEY, LivesRecord};
use crate::store::{SharedStore, load_json};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifeOutcome {
    /// Unlimited mode: nothing was taken.
    Spared,
    Lost { remaining: u32 },
    /// This loss took the last life and started the cooldown.
    Exhausted,
    /// Already at zero; further penalties are ignored.
    AlreadyExhausted,
}

/// Bounded life counter with a cooldown lockout once it runs out.
///
/// `Active(count > 0) -> Exhausted(count == 0, marker set) -> Active(max)`,
/// the last step taken either when the cooldown elapses or on an unlimited
/// override.
pub struct LivesGate {
    store: SharedStore,
    count: u32,
    max_lives: u32,
    is_unlimited: bool,
    game_over_at: Option<DateTime<Utc>>,
    cooldown: Duration,
}

impl LivesGate {
    pub fn load(store: SharedStore, max_lives: u32, cooldown: Duration) -> Self {
        let max_lives = max_lives.max(1);
        let record: Option<LivesRecord> = load_json(store.as_ref(), LIVES_KEY);
        let marker: GameOverRecord = load_json(store.as_ref(), GAME_OVER_KEY).unwrap_or_default();

        let (mut count, is_unlimited) = match record {
            Some(r) => (r.count.min(max_lives), r.is_unlimited),
            None => (max_lives, false),
        };
        let game_over_at = marker.timestamp.and_then(DateTime::from_timestamp_millis);

        if count == 0 && !is_unlimited && game_over_at.is_none() {
            warn!("lives exhausted without a cooldown marker, restoring");
            count = max_lives;
        }

        Self {
            store,
            count,
            max_lives,
            is_unlimited,
            game_over_at,
            cooldown,
        }
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn max_lives(&self) -> u32 {
        self.max_lives
    }

    pub fn is_unlimited(&self) -> bool {
        self.is_unlimited
    }

    pub fn game_over_at(&self) -> Option<DateTime<Utc>> {
        self.game_over_at
    }

    pub fn is_exhausted(&self) -> bool {
        !self.is_unlimited && self.count == 0
    }

    pub fn lose_life(&mut self, now: DateTime<Utc>) -> Result<LifeOutcome> {
        if self.is_unlimited {
            return Ok(LifeOutcome::Spared);
        }
        if self.count == 0 {
            return Ok(LifeOutcome::AlreadyExhausted);
        }
        self.count -= 1;
        if self.count == 0 {
            self.game_over_at = Some(now);
            self.persist()?;
            info!(cooldown_secs = self.cooldown.num_seconds(), "out of lives");
            return Ok(LifeOutcome::Exhausted);
        }
        self.persist()?;
        Ok(LifeOutcome::Lost {
            remaining: self.count,
        })
    }

    /// Back to full lives; the unlimited flag is left as is.
    pub fn reset_lives(&mut self) -> Result<()> {
        self.count = self.max_lives;
        self.game_over_at = None;
        self.persist()
    }

    /// Full lives and unlimited mode, as granted by an active subscription.
    pub fn restore_lives(&mut self) -> Result<()> {
        self.count = self.max_lives;
        self.is_unlimited = true;
        self.game_over_at = None;
        info!("unlimited lives activated");
        self.persist()
    }

    pub fn deactivate_unlimited(&mut self) -> Result<()> {
        self.is_unlimited = false;
        self.persist()
    }

    /// Time left before lives come back, if currently locked out.
    pub fn cooldown_remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        if !self.is_exhausted() {
            return None;
        }
        let started = self.game_over_at?;
        let left = started + self.cooldown - now;
        if left > Duration::zero() {
            Some(left)
        } else {
            None
        }
    }

    /// Clear an elapsed lockout. Returns true if lives were restored.
    pub fn refresh(&mut self, now: DateTime<Utc>) -> Result<bool> {
        let Some(started) = self.game_over_at else {
            return Ok(false);
        };
        if self.is_unlimited || now - started >= self.cooldown {
            self.count = self.max_lives;
            self.game_over_at = None;
            self.persist()?;
            info!("cooldown over, lives restored");
            return Ok(true);
        }
        Ok(false)
    }

    fn persist(&self) -> Result<()> {
        let record = LivesRecord {
            count: self.count,
            max_lives: self.max_lives,
            is_unlimited: self.is_unlimited,
        };
        let marker = GameOverRecord {
            timestamp: self.game_over_at.map(|t| t.timestamp_millis()),
        };
        self.store.set_many(&[
            (LIVES_KEY, serde_json::to_string(&record)?),
            (GAME_OVER_KEY, serde_json::to_string(&marker)?),
        ])?;
        Ok(())
    }
}
