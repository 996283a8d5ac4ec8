use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CollectorStatus {
    Online,
    #[default]
    Offline,
    Leave,
}

impl From<CollectorStatus> for bson::Bson {
    fn from(value: CollectorStatus) -> Self {
        let name = match value {
            CollectorStatus::Online => "online",
            CollectorStatus::Offline => "offline",
            CollectorStatus::Leave => "leave",
        };

        bson::Bson::String(name.to_string())
    }
}

/// Where a collector currently stands for new assignments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Presence {
    pub status: CollectorStatus,
    pub return_date: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentGate {
    Eligible,
    /// On leave; assignable only when the admin explicitly confirms.
    NeedsConfirmation { return_date: Option<OffsetDateTime> },
    Blocked,
}

impl Presence {
    /// A return date only survives while the collector is on leave.
    pub fn new(status: CollectorStatus, return_date: Option<OffsetDateTime>) -> Self {
        Self {
            status,
            return_date: return_date.filter(|_| status == CollectorStatus::Leave),
        }
    }

    pub fn is_eligible_for_assignment(&self) -> bool {
        self.status == CollectorStatus::Online
    }

    pub fn assignment_gate(&self) -> AssignmentGate {
        match self.status {
            CollectorStatus::Online => AssignmentGate::Eligible,
            CollectorStatus::Leave => AssignmentGate::NeedsConfirmation {
                return_date: self.return_date,
            },
            CollectorStatus::Offline => AssignmentGate::Blocked,
        }
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::{AssignmentGate, CollectorStatus, Presence};

    #[test]
    fn test_default_is_offline() {
        let presence = Presence::default();

        assert_eq!(presence.status, CollectorStatus::Offline);
        assert_eq!(presence.return_date, None);
        assert!(!presence.is_eligible_for_assignment());
    }

    #[test]
    fn test_return_date_cleared_unless_on_leave() {
        let date = datetime!(2026-11-01 00:00 UTC);

        assert_eq!(
            Presence::new(CollectorStatus::Leave, Some(date)).return_date,
            Some(date)
        );
        assert_eq!(
            Presence::new(CollectorStatus::Online, Some(date)).return_date,
            None
        );
        assert_eq!(
            Presence::new(CollectorStatus::Offline, Some(date)).return_date,
            None
        );
    }

    #[test]
    fn test_assignment_gate() {
        let date = datetime!(2026-11-01 00:00 UTC);

        assert_eq!(
            Presence::new(CollectorStatus::Online, None).assignment_gate(),
            AssignmentGate::Eligible
        );
        assert_eq!(
            Presence::new(CollectorStatus::Leave, Some(date)).assignment_gate(),
            AssignmentGate::NeedsConfirmation {
                return_date: Some(date)
            }
        );
        assert_eq!(
            Presence::new(CollectorStatus::Offline, None).assignment_gate(),
            AssignmentGate::Blocked
        );
        assert!(Presence::new(CollectorStatus::Online, None).is_eligible_for_assignment());
        assert!(!Presence::new(CollectorStatus::Leave, None).is_eligible_for_assignment());
    }

    #[test]
    fn test_status_wire_format() {
        assert_eq!(
            serde_json::to_string(&CollectorStatus::Leave).unwrap(),
            "\"leave\""
        );
        assert_eq!(
            serde_json::from_str::<CollectorStatus>("\"online\"").unwrap(),
            CollectorStatus::Online
        );
    }
}
