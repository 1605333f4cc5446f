//! Greedy, deterministic matching of idle agents to open victims.

use std::collections::BTreeSet;

use crate::agent::Agent;
use crate::pathfinding::PlannedPath;
use crate::types::{AgentId, VictimId};
use crate::victims::Victim;
use crate::world::WorldGrid;

#[derive(Clone, Debug, PartialEq)]
pub struct Assignment {
    pub agent: AgentId,
    pub victim: VictimId,
    pub path: PlannedPath,
}

/// Agents are served in id order; each takes the unclaimed candidate with the
/// shortest route, ties broken by Manhattan distance then victim id.
/// Candidates with no route are skipped, and an agent left without one stays idle.
pub fn assign(idle_agents: &[&Agent], candidates: &[&Victim], grid: &WorldGrid) -> Vec<Assignment> {
    let mut agents: Vec<&Agent> = idle_agents.to_vec();
    agents.sort_by_key(|agent| agent.id);
    let mut claimed: BTreeSet<VictimId> = BTreeSet::new();
    let mut out = Vec::new();

    for agent in agents {
        let mut ranked: Vec<(i32, VictimId, &Victim)> = candidates
            .iter()
            .filter(|victim| !claimed.contains(&victim.id))
            .map(|victim| (agent.cell.manhattan(victim.target_cell()), victim.id, *victim))
            .collect();
        ranked.sort_by_key(|(distance, id, _)| (*distance, *id));

        let mut best: Option<(usize, VictimId, PlannedPath)> = None;
        for (manhattan, id, victim) in ranked {
            // Manhattan distance is a lower bound on route length.
            if let Some((best_len, _, _)) = &best {
                if manhattan as usize > *best_len {
                    break;
                }
            }
            let Ok(path) = PlannedPath::plan(agent.cell, victim.target_cell(), grid) else {
                continue;
            };
            let improves = best
                .as_ref()
                .map_or(true, |(best_len, _, _)| path.len() < *best_len);
            if improves {
                best = Some((path.len(), id, path));
            }
        }

        if let Some((_, victim, path)) = best {
            claimed.insert(victim);
            out.push(Assignment {
                agent: agent.id,
                victim,
                path,
            });
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Cell, Severity};
    use crate::victims::{VictimProfile, VictimRegistry};

    const STEADY: VictimProfile = VictimProfile::new(Severity::Moderate, 1_000);

    fn agent_at(id: u32, x: i32, y: i32) -> Agent {
        Agent::new(AgentId(id), Cell::new(x, y), 1)
    }

    #[test]
    fn each_victim_goes_to_at_most_one_agent() {
        let grid = WorldGrid::from_rows(&["E.......", "........"]).expect("valid layout");
        let mut registry = VictimRegistry::new();
        registry.spawn(Cell::new(7, 0), Cell::new(7, 0), 0, STEADY);
        let agents = [agent_at(0, 0, 0), agent_at(1, 1, 0), agent_at(2, 2, 0)];
        let idle: Vec<&Agent> = agents.iter().collect();

        let out = assign(&idle, &registry.candidates(), &grid);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].agent, AgentId(0));
    }

    #[test]
    fn agents_pick_by_route_length_not_straight_line() {
        let grid = WorldGrid::from_rows(&[
            "E.#.....", //
            "..#.....",
            "..#.....",
            "........",
        ])
        .expect("valid layout");
        let mut registry = VictimRegistry::new();
        let behind_wall = registry.spawn(Cell::new(3, 0), Cell::new(3, 0), 0, STEADY);
        let open = registry.spawn(Cell::new(0, 3), Cell::new(0, 3), 0, STEADY);
        let agents = [agent_at(0, 1, 0)];
        let idle: Vec<&Agent> = agents.iter().collect();

        let out = assign(&idle, &registry.candidates(), &grid);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].victim, open);
        assert_ne!(out[0].victim, behind_wall);
        assert_eq!(out[0].path.len(), 4);
    }

    #[test]
    fn ties_break_by_victim_id() {
        let grid = WorldGrid::from_rows(&["....E...."]).expect("valid layout");
        let mut registry = VictimRegistry::new();
        let left = registry.spawn(Cell::new(2, 0), Cell::new(2, 0), 0, STEADY);
        registry.spawn(Cell::new(6, 0), Cell::new(6, 0), 0, STEADY);
        let agents = [agent_at(0, 4, 0)];
        let idle: Vec<&Agent> = agents.iter().collect();

        let out = assign(&idle, &registry.candidates(), &grid);
        assert_eq!(out[0].victim, left);
    }

    #[test]
    fn agent_order_is_by_id_not_slice_order() {
        let grid = WorldGrid::from_rows(&["E.........."]).expect("valid layout");
        let mut registry = VictimRegistry::new();
        registry.spawn(Cell::new(5, 0), Cell::new(5, 0), 0, STEADY);
        let far = agent_at(0, 0, 0);
        let near = agent_at(1, 6, 0);
        let idle: Vec<&Agent> = vec![&near, &far];

        let out = assign(&idle, &registry.candidates(), &grid);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].agent, AgentId(0));
    }

    #[test]
    fn unreachable_victims_leave_agent_idle() {
        let grid = WorldGrid::from_rows(&["E.#."]).expect("valid layout");
        let mut registry = VictimRegistry::new();
        registry.spawn(Cell::new(3, 0), Cell::new(3, 0), 0, STEADY);
        let agents = [agent_at(0, 0, 0)];
        let idle: Vec<&Agent> = agents.iter().collect();

        assert!(assign(&idle, &registry.candidates(), &grid).is_empty());
    }

    #[test]
    fn undiscovered_victims_are_targeted_at_reported_cell() {
        let grid = WorldGrid::from_rows(&["E....."]).expect("valid layout");
        let mut registry = VictimRegistry::new();
        registry.spawn(Cell::new(5, 0), Cell::new(3, 0), 0, STEADY);
        let agents = [agent_at(0, 0, 0)];
        let idle: Vec<&Agent> = agents.iter().collect();

        let out = assign(&idle, &registry.candidates(), &grid);
        assert_eq!(out[0].path.destination(), Cell::new(3, 0));
    }
}
