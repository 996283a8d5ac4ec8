//! Truck load derived from a collector's completed jobs.
//!
//! Nothing here is stored. The load is replayed from history on every read,
//! using `last_unload_time` as the watermark: only jobs completed strictly
//! after it count towards what is currently on the truck.

use std::str::FromStr;

use rust_decimal::Decimal;
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadPolicy {
    pub capacity: Decimal,
    /// Earnings per unit of collected waste.
    pub rate: Decimal,
}

impl Default for LoadPolicy {
    fn default() -> Self {
        Self {
            capacity: Decimal::from(500),
            rate: Decimal::new(5, 1),
        }
    }
}

/// Reads the numeric part of a free-text amount such as `"5.5kg"`.
///
/// Everything but digits and dots is dropped and the longest leading decimal
/// is taken. Empty, unparseable and negative amounts count as zero. A `-`
/// anywhere before the first digit makes the amount negative.
pub fn parse_amount(raw: &str) -> Decimal {
    let before_digits = raw.split(|c: char| c.is_ascii_digit()).next().unwrap_or("");
    if before_digits.contains('-') {
        return Decimal::ZERO;
    }

    let mut number = String::new();
    let mut seen_dot = false;

    for c in raw.chars().filter(|c| c.is_ascii_digit() || *c == '.') {
        if c == '.' {
            if seen_dot {
                break;
            }
            seen_dot = true;
        }
        number.push(c);
    }

    let number = number.trim_end_matches('.');
    if number.is_empty() {
        return Decimal::ZERO;
    }

    let parsed = match number.strip_prefix('.') {
        Some(fraction) => Decimal::from_str(&format!("0.{fraction}")),
        None => Decimal::from_str(number),
    };

    parsed.unwrap_or(Decimal::ZERO)
}

/// One completed job as seen by the aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadEntry<'a> {
    pub amount: &'a str,
    pub completed_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TruckLoad {
    /// Weight collected since the last unload, unclamped.
    pub current_load: Decimal,
    /// `current_load` capped at capacity, for gauges.
    pub display_load: Decimal,
    pub lifetime_weight: Decimal,
    pub earnings: Decimal,
    pub capacity: Decimal,
    pub completed_jobs: usize,
    pub completed_today: usize,
    pub last_unload_time: Option<OffsetDateTime>,
}

impl TruckLoad {
    pub fn aggregate<'a>(
        entries: impl IntoIterator<Item = LoadEntry<'a>>,
        last_unload_time: Option<OffsetDateTime>,
        policy: &LoadPolicy,
        now: OffsetDateTime,
    ) -> Self {
        let mut current_load = Decimal::ZERO;
        let mut lifetime_weight = Decimal::ZERO;
        let mut completed_jobs = 0;
        let mut completed_today = 0;

        for entry in entries {
            let weight = parse_amount(entry.amount);

            completed_jobs += 1;
            lifetime_weight += weight;

            if entry.completed_at.date() == now.date() {
                completed_today += 1;
            }

            match last_unload_time {
                Some(unloaded) if entry.completed_at <= unloaded => {}
                _ => current_load += weight,
            }
        }

        Self {
            current_load,
            display_load: current_load.min(policy.capacity),
            lifetime_weight,
            earnings: lifetime_weight * policy.rate,
            capacity: policy.capacity,
            completed_jobs,
            completed_today,
            last_unload_time,
        }
    }

    pub fn is_full(&self) -> bool {
        self.current_load >= self.capacity
    }

    /// Whether a job of `amount` fits on the truck.
    ///
    /// An empty truck takes any single job, even one above capacity.
    pub fn check_capacity(&self, amount: Decimal) -> Result<(), CapacityExceeded> {
        let overflows = !self.is_empty() && self.current_load + amount > self.capacity;

        if self.is_full() || overflows {
            return Err(CapacityExceeded {
                load: self.current_load,
                capacity: self.capacity,
            });
        }

        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.current_load <= Decimal::ZERO
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityExceeded {
    pub load: Decimal,
    pub capacity: Decimal,
}

impl From<CapacityExceeded> for crate::error::Error {
    fn from(value: CapacityExceeded) -> Self {
        Self::CapacityExceeded {
            load: value.load,
            capacity: value.capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use time::{macros::datetime, Duration, OffsetDateTime};

    use super::{parse_amount, LoadEntry, LoadPolicy, TruckLoad};

    const NOW: OffsetDateTime = datetime!(2026-10-17 12:00 UTC);

    fn entry(amount: &str, completed_at: OffsetDateTime) -> LoadEntry<'_> {
        LoadEntry {
            amount,
            completed_at,
        }
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("5.5kg"), Decimal::new(55, 1));
        assert_eq!(parse_amount("abc"), Decimal::ZERO);
        assert_eq!(parse_amount("12"), Decimal::from(12));
        assert_eq!(parse_amount("-5"), Decimal::ZERO);
        assert_eq!(parse_amount(""), Decimal::ZERO);
        assert_eq!(parse_amount("  "), Decimal::ZERO);
    }

    #[test]
    fn test_parse_amount_odd_inputs() {
        assert_eq!(parse_amount("about 7 kg"), Decimal::from(7));
        assert_eq!(parse_amount("1.2.3"), Decimal::new(12, 1));
        assert_eq!(parse_amount(".5"), Decimal::new(5, 1));
        assert_eq!(parse_amount("5."), Decimal::from(5));
        assert_eq!(parse_amount("."), Decimal::ZERO);
        assert_eq!(parse_amount("about -5kg"), Decimal::ZERO);
        assert_eq!(parse_amount(" - 5"), Decimal::ZERO);
        assert_eq!(parse_amount("5-6kg"), Decimal::from(5));
    }

    #[test]
    fn test_without_watermark_everything_is_on_the_truck() {
        let load = TruckLoad::aggregate(
            [
                entry("10kg", NOW - Duration::days(3)),
                entry("2.5", NOW - Duration::hours(1)),
                entry("junk", NOW),
            ],
            None,
            &LoadPolicy::default(),
            NOW,
        );

        assert_eq!(load.current_load, Decimal::new(125, 1));
        assert_eq!(load.lifetime_weight, Decimal::new(125, 1));
        assert_eq!(load.completed_jobs, 3);
        assert_eq!(load.completed_today, 2);
    }

    #[test]
    fn test_watermark_is_strict() {
        let unloaded = NOW - Duration::hours(2);

        let load = TruckLoad::aggregate(
            [
                entry("10", unloaded - Duration::minutes(1)),
                entry("20", unloaded),
                entry("30", unloaded + Duration::milliseconds(1)),
            ],
            Some(unloaded),
            &LoadPolicy::default(),
            NOW,
        );

        assert_eq!(load.current_load, Decimal::from(30));
        assert_eq!(load.lifetime_weight, Decimal::from(60));
    }

    #[test]
    fn test_earnings_and_clamp() {
        let load = TruckLoad::aggregate(
            [entry("400", NOW), entry("300", NOW)],
            None,
            &LoadPolicy::default(),
            NOW,
        );

        assert_eq!(load.current_load, Decimal::from(700));
        assert_eq!(load.display_load, Decimal::from(500));
        assert_eq!(load.earnings, Decimal::from(350));
        assert!(load.is_full());
    }

    #[test]
    fn test_recompute_is_idempotent() {
        let entries = [entry("5.5kg", NOW), entry("4.5kg", NOW - Duration::days(1))];
        let policy = LoadPolicy::default();

        let first = TruckLoad::aggregate(entries, Some(NOW - Duration::hours(1)), &policy, NOW);
        let second = TruckLoad::aggregate(entries, Some(NOW - Duration::hours(1)), &policy, NOW);

        assert_eq!(first, second);
        assert_eq!(first.current_load, Decimal::new(55, 1));
    }

    #[test]
    fn test_unload_resets_current_load() {
        let entries = [entry("40", NOW - Duration::minutes(5)), entry("60", NOW)];
        let policy = LoadPolicy::default();

        let before = TruckLoad::aggregate(entries, None, &policy, NOW);
        assert!(!before.is_empty());

        let after = TruckLoad::aggregate(entries, Some(NOW), &policy, NOW);
        assert_eq!(after.current_load, Decimal::ZERO);
        assert_eq!(after.lifetime_weight, Decimal::from(100));
        assert!(after.is_empty());
    }

    #[test]
    fn test_capacity_gate() {
        let policy = LoadPolicy::default();
        let load = TruckLoad::aggregate([entry("480", NOW)], None, &policy, NOW);

        let blocked = load.check_capacity(Decimal::from(30)).unwrap_err();
        assert_eq!(blocked.load, Decimal::from(480));
        assert_eq!(blocked.capacity, Decimal::from(500));

        load.check_capacity(Decimal::from(20)).unwrap();

        let unloaded = TruckLoad::aggregate([entry("480", NOW)], Some(NOW), &policy, NOW);
        unloaded.check_capacity(Decimal::from(30)).unwrap();
    }

    #[test]
    fn test_empty_truck_takes_oversized_job() {
        let policy = LoadPolicy::default();

        let empty = TruckLoad::aggregate(Vec::<LoadEntry>::new(), None, &policy, NOW);
        empty.check_capacity(Decimal::from(600)).unwrap();

        let unloaded = TruckLoad::aggregate([entry("480", NOW)], Some(NOW), &policy, NOW);
        unloaded.check_capacity(Decimal::from(600)).unwrap();

        let partly = TruckLoad::aggregate([entry("10", NOW)], None, &policy, NOW);
        partly
            .check_capacity(Decimal::from(600))
            .expect_err("a loaded truck cannot take a job past capacity");
    }

    #[test]
    fn test_full_truck_blocks_even_empty_jobs() {
        let load = TruckLoad::aggregate([entry("500", NOW)], None, &LoadPolicy::default(), NOW);

        load.check_capacity(Decimal::ZERO)
            .expect_err("a full truck cannot take another job");
    }
}
