//! Node positions for animation output.
//!
//! Position never influences delivery. Constant positions are placed
//! once; random walks are advanced on every animation tick with a
//! seeded RNG so two runs with the same seed move identically.

use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::config::{GridConfig, RandomWalkConfig};
use crate::error::{SimError, SimResult};
use crate::time::VirtualTime;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Position { x, y }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.3}, {:.3})", self.x, self.y)
    }
}

/// Axis-aligned bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Rect {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl Rect {
    pub fn new(x_min: f64, x_max: f64, y_min: f64, y_max: f64) -> Self {
        Rect {
            x_min,
            x_max,
            y_min,
            y_max,
        }
    }

    pub fn contains(&self, p: Position) -> bool {
        (self.x_min..=self.x_max).contains(&p.x) && (self.y_min..=self.y_max).contains(&p.y)
    }
}

/// Fold `value` back into `[min, max]`, flipping `velocity` once per
/// wall bounce.
fn reflect(value: &mut f64, velocity: &mut f64, min: f64, max: f64) {
    if max <= min {
        *value = min;
        return;
    }
    while *value < min || *value > max {
        if *value < min {
            *value = 2.0 * min - *value;
        } else {
            *value = 2.0 * max - *value;
        }
        *velocity = -*velocity;
    }
}

// ── RandomWalk ────────────────────────────────────────────────────────

/// Straight-line motion with a speed and heading redrawn every
/// `direction_interval`, bouncing off the bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct RandomWalk {
    position: Position,
    velocity: (f64, f64),
    next_change: VirtualTime,
    config: RandomWalkConfig,
}

impl RandomWalk {
    pub fn new(start: Position, config: RandomWalkConfig) -> Self {
        RandomWalk {
            position: start,
            velocity: (0.0, 0.0),
            next_change: VirtualTime::ZERO,
            config,
        }
    }

    pub fn position(&self) -> Position {
        self.position
    }

    /// Move for `dt` ticks ending at `now`, then redraw the heading if
    /// its interval has elapsed.
    pub fn advance(&mut self, now: VirtualTime, dt: u64, rng: &mut ChaCha8Rng) {
        let secs = dt as f64 / 1e9;
        self.position.x += self.velocity.0 * secs;
        self.position.y += self.velocity.1 * secs;
        let bounds = self.config.bounds;
        reflect(&mut self.position.x, &mut self.velocity.0, bounds.x_min, bounds.x_max);
        reflect(&mut self.position.y, &mut self.velocity.1, bounds.y_min, bounds.y_max);

        if now >= self.next_change {
            let speed = if self.config.speed_max > self.config.speed_min {
                rng.gen_range(self.config.speed_min..self.config.speed_max)
            } else {
                self.config.speed_min
            };
            let heading = rng.gen_range(0.0..std::f64::consts::TAU);
            self.velocity = (speed * heading.cos(), speed * heading.sin());
            self.next_change = now
                .plus(self.config.direction_interval.max(1))
                .unwrap_or(VirtualTime::new(u64::MAX));
        }
    }
}

// ── Mobility ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Mobility {
    Constant(Position),
    RandomWalk(RandomWalk),
}

impl Mobility {
    pub fn position(&self) -> Position {
        match self {
            Mobility::Constant(p) => *p,
            Mobility::RandomWalk(walk) => walk.position(),
        }
    }

    pub fn is_mobile(&self) -> bool {
        matches!(self, Mobility::RandomWalk(_))
    }
}

// ── Grid allocator ────────────────────────────────────────────────────

/// Row-first grid placement: slot `i` sits at column `i % width`,
/// row `i / width`.
#[derive(Debug, Clone)]
pub struct GridPositionAllocator {
    config: GridConfig,
}

impl GridPositionAllocator {
    pub fn new(config: GridConfig) -> SimResult<Self> {
        if config.width == 0 || config.delta_y <= 0.0 || config.delta_x < 0.0 {
            return Err(SimError::InvalidConfig(format!(
                "grid needs a positive width and row spacing, got {:?}",
                config
            )));
        }
        Ok(GridPositionAllocator { config })
    }

    pub fn position(&self, slot: u32) -> Position {
        let col = slot % self.config.width;
        let row = slot / self.config.width;
        Position::new(
            self.config.min_x + self.config.delta_x * col as f64,
            self.config.min_y + self.config.delta_y * row as f64,
        )
    }

    /// How many slots fit before rows leave `bounds`.
    pub fn capacity(&self, bounds: &Rect) -> u32 {
        if self.config.min_y > bounds.y_max {
            return 0;
        }
        let rows = ((bounds.y_max - self.config.min_y) / self.config.delta_y).floor() as u32 + 1;
        rows * self.config.width
    }

    /// Positions for `count` nodes, or a configuration error if they do
    /// not all fit in `bounds`.
    pub fn place(&self, count: u32, bounds: &Rect) -> SimResult<Vec<Position>> {
        let capacity = self.capacity(bounds);
        if count > capacity {
            return Err(SimError::GridCapacity {
                requested: count,
                capacity,
            });
        }
        Ok((0..count).map(|slot| self.position(slot)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_grid_row_first() {
        let grid = GridPositionAllocator::new(GridConfig::default()).unwrap();
        assert_eq!(grid.position(0), Position::new(0.0, 0.0));
        assert_eq!(grid.position(2), Position::new(10.0, 0.0));
        assert_eq!(grid.position(3), Position::new(0.0, 10.0));
        assert_eq!(grid.position(7), Position::new(5.0, 20.0));
    }

    #[test]
    fn test_grid_capacity_matches_bounds() {
        let grid = GridPositionAllocator::new(GridConfig::default()).unwrap();
        let bounds = RandomWalkConfig::default().bounds;
        assert_eq!(grid.capacity(&bounds), 18);
        assert_eq!(grid.place(18, &bounds).unwrap().len(), 18);
        assert_eq!(
            grid.place(19, &bounds).unwrap_err(),
            SimError::GridCapacity {
                requested: 19,
                capacity: 18
            }
        );
    }

    #[test]
    fn test_reflect_stays_in_bounds() {
        let mut x = 55.0;
        let mut v = 3.0;
        reflect(&mut x, &mut v, -50.0, 50.0);
        assert_eq!(x, 45.0);
        assert_eq!(v, -3.0);
    }

    #[test]
    fn test_random_walk_stays_in_bounds() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let cfg = RandomWalkConfig::default();
        let bounds = cfg.bounds;
        let mut walk = RandomWalk::new(Position::new(49.0, -49.0), cfg);
        let dt = VirtualTime::from_millis(100).ticks();
        let mut now = VirtualTime::ZERO;
        walk.advance(now, 0, &mut rng);
        for _ in 0..500 {
            now = now.plus(dt).unwrap();
            walk.advance(now, dt, &mut rng);
            assert!(bounds.contains(walk.position()), "escaped: {}", walk.position());
        }
    }

    #[test]
    fn test_random_walk_deterministic_per_seed() {
        fn walk_path(seed: u64) -> Vec<Position> {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let mut walk = RandomWalk::new(Position::default(), RandomWalkConfig::default());
            let dt = VirtualTime::from_millis(250).ticks();
            (0..20u64)
                .map(|i| {
                    walk.advance(VirtualTime::new(i * dt), if i == 0 { 0 } else { dt }, &mut rng);
                    walk.position()
                })
                .collect()
        }
        assert_eq!(walk_path(42), walk_path(42));
        assert_ne!(walk_path(42), walk_path(43));
    }

    #[test]
    fn test_constant_mobility() {
        let m = Mobility::Constant(Position::new(40.0, 20.0));
        assert_eq!(m.position(), Position::new(40.0, 20.0));
        assert!(!m.is_mobile());
    }
}
