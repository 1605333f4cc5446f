use crate::pathfinding::PlannedPath;
use crate::types::{AgentId, AgentState, AgentView, Cell, VictimId};

/// Closed set of rescuer behaviours. Each variant carries only what that
/// phase needs; the victim is referenced by id, never owned.
#[derive(Clone, Debug, PartialEq)]
pub enum AgentTask {
    Idle,
    Moving { victim: VictimId, path: PlannedPath },
    Searching { victim: VictimId },
    Rescuing { victim: VictimId, progress: u32 },
    Returning { path: PlannedPath },
}

impl AgentTask {
    pub fn state(&self) -> AgentState {
        match self {
            Self::Idle => AgentState::Idle,
            Self::Moving { .. } => AgentState::Moving,
            Self::Searching { .. } => AgentState::Searching,
            Self::Rescuing { .. } => AgentState::Rescuing,
            Self::Returning { .. } => AgentState::Returning,
        }
    }

    pub fn victim(&self) -> Option<VictimId> {
        match self {
            Self::Moving { victim, .. }
            | Self::Searching { victim }
            | Self::Rescuing { victim, .. } => Some(*victim),
            Self::Idle | Self::Returning { .. } => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Agent {
    pub id: AgentId,
    pub cell: Cell,
    pub capacity: u32,
    pub carrying: u32,
    pub task: AgentTask,
    pub hazard_exposures: u32,
}

impl Agent {
    pub fn new(id: AgentId, cell: Cell, capacity: u32) -> Self {
        Self {
            id,
            cell,
            capacity,
            carrying: 0,
            task: AgentTask::Idle,
            hazard_exposures: 0,
        }
    }

    pub fn state(&self) -> AgentState {
        self.task.state()
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.task, AgentTask::Idle)
    }

    pub fn target(&self) -> Option<VictimId> {
        self.task.victim()
    }

    pub fn is_full(&self) -> bool {
        self.carrying >= self.capacity
    }

    /// Idle → Moving. Only the allocator hands out assignments.
    pub fn assign(&mut self, victim: VictimId, path: PlannedPath) {
        self.task = AgentTask::Moving { victim, path };
    }

    /// Drops whatever victim the agent was working on and goes Idle.
    pub fn release(&mut self) -> Option<VictimId> {
        let victim = self.task.victim();
        if victim.is_some() {
            self.task = AgentTask::Idle;
        }
        victim
    }

    /// Records one completed rescue. Returns `true` when capacity is exhausted.
    pub fn load_victim(&mut self) -> bool {
        self.carrying += 1;
        self.is_full()
    }

    /// Returning → Idle at the extraction cell; returns how many were dropped.
    pub fn drop_off(&mut self) -> u32 {
        let count = self.carrying;
        self.carrying = 0;
        self.task = AgentTask::Idle;
        count
    }

    pub fn view(&self) -> AgentView {
        AgentView {
            id: self.id,
            cell: self.cell,
            state: self.state(),
            target: self.target(),
            carrying: self.carrying,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::WorldGrid;

    #[test]
    fn task_tags_follow_variants() {
        let grid = WorldGrid::from_rows(&["E.."]).expect("valid layout");
        let path = PlannedPath::plan(Cell::new(0, 0), Cell::new(2, 0), &grid).expect("route");
        let mut agent = Agent::new(AgentId(0), Cell::new(0, 0), 1);
        assert_eq!(agent.state(), AgentState::Idle);

        agent.assign(VictimId(4), path.clone());
        assert_eq!(agent.state(), AgentState::Moving);
        assert_eq!(agent.target(), Some(VictimId(4)));

        agent.task = AgentTask::Returning { path };
        assert_eq!(agent.state(), AgentState::Returning);
        assert_eq!(agent.target(), None);
        assert_eq!(agent.release(), None);
        assert_eq!(agent.state(), AgentState::Returning);
    }

    #[test]
    fn capacity_counter_and_drop_off() {
        let mut agent = Agent::new(AgentId(1), Cell::new(0, 0), 2);
        assert!(!agent.load_victim());
        assert!(agent.load_victim());
        assert!(agent.is_full());
        assert_eq!(agent.drop_off(), 2);
        assert_eq!(agent.carrying, 0);
        assert!(agent.is_idle());
    }

    #[test]
    fn release_clears_victim_tasks() {
        let mut agent = Agent::new(AgentId(2), Cell::new(0, 0), 1);
        agent.task = AgentTask::Rescuing {
            victim: VictimId(7),
            progress: 1,
        };
        assert_eq!(agent.release(), Some(VictimId(7)));
        assert!(agent.is_idle());
    }
}
