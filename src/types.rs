use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Grid coordinate. Ordered row-major (`y`, then `x`), which is the
/// tie-break order used everywhere a deterministic cell ordering is needed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cell {
    pub x: i32,
    pub y: i32,
}

impl Cell {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn manhattan(self, other: Cell) -> i32 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }

    /// 4-connected neighbours in fixed order: up, left, right, down.
    pub fn neighbors(self) -> [Cell; 4] {
        [
            Cell::new(self.x, self.y - 1),
            Cell::new(self.x - 1, self.y),
            Cell::new(self.x + 1, self.y),
            Cell::new(self.x, self.y + 1),
        ]
    }
}

impl Ord for Cell {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.y, self.x).cmp(&(other.y, other.x))
    }
}

impl PartialOrd for Cell {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.x, self.y)
    }
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct VictimId(pub u32);

impl fmt::Display for VictimId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "victim_{}", self.0)
    }
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct AgentId(pub u32);

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "agent_{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VictimState {
    Undiscovered,
    Discovered,
    BeingRescued,
    Rescued,
    Lost,
}

impl VictimState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Rescued | Self::Lost)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Moderate,
    Minor,
}

impl Severity {
    pub const ALL: [Severity; 3] = [Self::Critical, Self::Moderate, Self::Minor];

    pub fn key(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Moderate => "moderate",
            Self::Minor => "minor",
        }
    }

    /// Maps a uniform roll in `[0, 1)` onto the weighted severity table.
    pub fn from_roll(roll: f64, weights: &[f64; 3]) -> Self {
        let total: f64 = weights.iter().sum();
        let mut threshold = roll * total;
        for (severity, weight) in Self::ALL.into_iter().zip(weights) {
            if threshold < *weight {
                return severity;
            }
            threshold -= weight;
        }
        Self::Minor
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Idle,
    Moving,
    Searching,
    Rescuing,
    Returning,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    AllResolved,
    StepBudgetExhausted,
}

impl TerminationReason {
    pub fn key(self) -> &'static str {
        match self {
            Self::AllResolved => "all_resolved",
            Self::StepBudgetExhausted => "step_budget_exhausted",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseReason {
    NoPath,
    VictimLost,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SimEvent {
    HazardSpawned {
        cell: Cell,
    },
    HazardCleared {
        cell: Cell,
    },
    VictimSpawned {
        victim: VictimId,
        cell: Cell,
    },
    VictimDiscovered {
        victim: VictimId,
        by: AgentId,
    },
    TaskAssigned {
        agent: AgentId,
        victim: VictimId,
        distance: usize,
    },
    AgentMoved {
        agent: AgentId,
        from: Cell,
        to: Cell,
        hazardous: bool,
    },
    SearchStarted {
        agent: AgentId,
        victim: VictimId,
    },
    PathReplanned {
        agent: AgentId,
    },
    AssignmentReleased {
        agent: AgentId,
        victim: VictimId,
        reason: ReleaseReason,
    },
    RescueStarted {
        agent: AgentId,
        victim: VictimId,
    },
    VictimRescued {
        victim: VictimId,
        agent: AgentId,
        latency: u32,
    },
    VictimLost {
        victim: VictimId,
    },
    ReturnStarted {
        agent: AgentId,
        carrying: u32,
    },
    DroppedOff {
        agent: AgentId,
        count: u32,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AgentView {
    pub id: AgentId,
    pub cell: Cell,
    pub state: AgentState,
    pub target: Option<VictimId>,
    pub carrying: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VictimView {
    pub id: VictimId,
    pub cell: Cell,
    pub state: VictimState,
    pub severity: Severity,
    pub assigned_agent: Option<AgentId>,
}

/// Observable outcome of one engine step, in engine order.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StepReport {
    pub step: u32,
    pub events: Vec<SimEvent>,
    pub agents: Vec<AgentView>,
    pub victims: Vec<VictimView>,
    pub hazard_cells: usize,
    pub finished: Option<TerminationReason>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cells_order_row_major() {
        let mut cells = vec![Cell::new(3, 1), Cell::new(0, 2), Cell::new(1, 1), Cell::new(9, 0)];
        cells.sort();
        assert_eq!(
            cells,
            vec![Cell::new(9, 0), Cell::new(1, 1), Cell::new(3, 1), Cell::new(0, 2)]
        );
    }

    #[test]
    fn terminal_states_are_rescued_and_lost() {
        assert!(VictimState::Rescued.is_terminal());
        assert!(VictimState::Lost.is_terminal());
        assert!(!VictimState::BeingRescued.is_terminal());
        assert!(!VictimState::Undiscovered.is_terminal());
    }

    #[test]
    fn severity_rolls_follow_weights() {
        let weights = [0.25, 0.45, 0.30];
        assert_eq!(Severity::from_roll(0.0, &weights), Severity::Critical);
        assert_eq!(Severity::from_roll(0.24, &weights), Severity::Critical);
        assert_eq!(Severity::from_roll(0.26, &weights), Severity::Moderate);
        assert_eq!(Severity::from_roll(0.69, &weights), Severity::Moderate);
        assert_eq!(Severity::from_roll(0.71, &weights), Severity::Minor);
        assert_eq!(Severity::from_roll(0.999, &weights), Severity::Minor);
    }

    #[test]
    fn victim_views_use_snake_case_fields() {
        let view = VictimView {
            id: VictimId(1),
            cell: Cell::new(2, 3),
            state: VictimState::Discovered,
            severity: Severity::Critical,
            assigned_agent: Some(AgentId(0)),
        };
        let text = serde_json::to_string(&view).expect("view should serialize");
        assert!(text.contains(r#""assigned_agent":0"#));
        assert!(text.contains(r#""severity":"critical""#));
        assert!(!text.contains("assignedAgent"));
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let event = SimEvent::VictimLost {
            victim: VictimId(4),
        };
        let text = serde_json::to_string(&event).expect("event should serialize");
        assert_eq!(text, r#"{"type":"victim_lost","victim":4}"#);
    }
}
