//! Pickup request lifecycle.
//!
//! ```text
//! Pending --assign--> Assigned --complete--> Completed
//!    |                   |
//!    +------reject-------+--reject / report issue--> Rejected
//! ```
//!
//! Rejected and Completed are terminal. Rejected accepts a redundant
//! reject or issue report without error. Only Pending may be cancelled.

use bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RequestStatus {
    #[default]
    Pending,
    Assigned,
    Rejected,
    Completed,
}

impl RequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Assigned => "Assigned",
            Self::Rejected => "Rejected",
            Self::Completed => "Completed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::Completed)
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<RequestStatus> for bson::Bson {
    fn from(value: RequestStatus) -> Self {
        bson::Bson::String(value.as_str().to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Assign(ObjectId),
    Reject,
    ReportIssue(String),
    Complete,
}

impl Transition {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Assign(..) => "assign",
            Self::Reject => "reject",
            Self::ReportIssue(..) => "report an issue on",
            Self::Complete => "complete",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("cannot {action} a request that is {from}")]
    Illegal {
        action: &'static str,
        from: RequestStatus,
    },

    #[error("cannot cancel a request that is {0}, only pending requests can be cancelled")]
    NotCancellable(RequestStatus),
}

/// The mutable slice of a request that the lifecycle owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestState {
    pub status: RequestStatus,
    pub assigned_collector: Option<ObjectId>,
    pub feedback: Option<String>,
}

impl RequestState {
    pub fn pending() -> Self {
        Self {
            status: RequestStatus::Pending,
            assigned_collector: None,
            feedback: None,
        }
    }

    pub fn apply(&self, transition: Transition) -> Result<Self, TransitionError> {
        use RequestStatus::*;

        let illegal = |transition: &Transition| TransitionError::Illegal {
            action: transition.name(),
            from: self.status,
        };

        match (&self.status, transition) {
            (Pending, Transition::Assign(collector)) => Ok(Self {
                status: Assigned,
                assigned_collector: Some(collector),
                feedback: self.feedback.clone(),
            }),
            (Pending | Assigned | Rejected, Transition::Reject) => Ok(Self {
                status: Rejected,
                assigned_collector: None,
                feedback: self.feedback.clone(),
            }),
            // unlike reject, the collector stays attached
            (Assigned | Rejected, Transition::ReportIssue(reason)) => Ok(Self {
                status: Rejected,
                assigned_collector: self.assigned_collector,
                feedback: Some(format!("Collection Failed: {reason}")),
            }),
            (Assigned, Transition::Complete) => Ok(Self {
                status: Completed,
                assigned_collector: self.assigned_collector,
                feedback: self.feedback.clone(),
            }),
            (_, transition) => Err(illegal(&transition)),
        }
    }

    pub fn with_feedback(&self, feedback: String) -> Self {
        Self {
            feedback: Some(feedback),
            ..self.clone()
        }
    }

    pub fn ensure_cancellable(&self) -> Result<(), TransitionError> {
        match self.status {
            RequestStatus::Pending => Ok(()),
            status => Err(TransitionError::NotCancellable(status)),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use bson::oid::ObjectId;

    use super::{RequestState, RequestStatus, Transition, TransitionError};

    fn assigned(collector: ObjectId) -> RequestState {
        RequestState::pending()
            .apply(Transition::Assign(collector))
            .unwrap()
    }

    #[test]
    fn test_assign_from_pending() {
        let collector = ObjectId::new();
        let state = assigned(collector);

        assert_eq!(state.status, RequestStatus::Assigned);
        assert_eq!(state.assigned_collector, Some(collector));
    }

    #[test]
    fn test_cannot_assign_twice() {
        let state = assigned(ObjectId::new());

        let err = state
            .apply(Transition::Assign(ObjectId::new()))
            .unwrap_err();
        assert_matches!(
            err,
            TransitionError::Illegal {
                action: "assign",
                from: RequestStatus::Assigned
            }
        );
    }

    #[test]
    fn test_cannot_assign_terminal() {
        let rejected = RequestState::pending().apply(Transition::Reject).unwrap();
        let completed = assigned(ObjectId::new())
            .apply(Transition::Complete)
            .unwrap();

        for state in [rejected, completed] {
            state
                .apply(Transition::Assign(ObjectId::new()))
                .expect_err("terminal request must not be reassigned");
        }
    }

    #[test]
    fn test_reject_clears_collector() {
        let state = assigned(ObjectId::new()).apply(Transition::Reject).unwrap();

        assert_eq!(state.status, RequestStatus::Rejected);
        assert_eq!(state.assigned_collector, None);
    }

    #[test]
    fn test_reject_is_redundant_on_rejected() {
        let once = RequestState::pending().apply(Transition::Reject).unwrap();
        let twice = once.apply(Transition::Reject).unwrap();

        assert_eq!(once, twice);
    }

    #[test]
    fn test_cannot_reject_completed() {
        let completed = assigned(ObjectId::new())
            .apply(Transition::Complete)
            .unwrap();

        assert_matches!(
            completed.apply(Transition::Reject),
            Err(TransitionError::Illegal {
                from: RequestStatus::Completed,
                ..
            })
        );
    }

    #[test]
    fn test_report_issue_keeps_collector() {
        let collector = ObjectId::new();
        let state = assigned(collector)
            .apply(Transition::ReportIssue("X".to_string()))
            .unwrap();

        assert_eq!(state.status, RequestStatus::Rejected);
        assert_eq!(state.feedback.as_deref(), Some("Collection Failed: X"));
        assert_eq!(state.assigned_collector, Some(collector));
    }

    #[test]
    fn test_report_issue_requires_assignment() {
        assert_matches!(
            RequestState::pending().apply(Transition::ReportIssue("X".to_string())),
            Err(TransitionError::Illegal {
                from: RequestStatus::Pending,
                ..
            })
        );
    }

    #[test]
    fn test_complete_only_from_assigned() {
        for state in [
            RequestState::pending(),
            RequestState::pending().apply(Transition::Reject).unwrap(),
        ] {
            state
                .apply(Transition::Complete)
                .expect_err("only assigned requests can be completed");
        }

        let collector = ObjectId::new();
        let completed = assigned(collector).apply(Transition::Complete).unwrap();
        assert_eq!(completed.status, RequestStatus::Completed);
        assert_eq!(completed.assigned_collector, Some(collector));
        assert!(completed.status.is_terminal());
    }

    #[test]
    fn test_feedback_in_any_state() {
        let completed = assigned(ObjectId::new())
            .apply(Transition::Complete)
            .unwrap();

        let state = completed.with_feedback("great service".to_string());
        assert_eq!(state.status, RequestStatus::Completed);
        assert_eq!(state.feedback.as_deref(), Some("great service"));
    }

    #[test]
    fn test_cancel_only_pending() {
        RequestState::pending().ensure_cancellable().unwrap();

        let state = assigned(ObjectId::new());
        assert_matches!(
            state.ensure_cancellable(),
            Err(TransitionError::NotCancellable(RequestStatus::Assigned))
        );
    }

    #[test]
    fn test_status_wire_format() {
        assert_eq!(
            serde_json::to_string(&RequestStatus::Completed).unwrap(),
            "\"Completed\""
        );
        assert_eq!(
            bson::to_bson(&RequestStatus::Assigned).unwrap(),
            bson::Bson::from(RequestStatus::Assigned)
        );
    }
}
