//! Turn-by-turn guidance: instructions along a route, announced once each
//! as the vehicle comes within range.

use fleet_geo::{bearing_deg, compass_direction, haversine_distance};
use fleet_model::Coord;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum InstructionKind {
    Turn,
    Continue,
    Warning,
    Arrive,
}

impl InstructionKind {
    /// Distance in meters at which an instruction of this kind is announced.
    pub fn announce_within_m(self) -> f64 {
        match self {
            InstructionKind::Turn => 200.0,
            InstructionKind::Continue => 500.0,
            InstructionKind::Warning => 300.0,
            InstructionKind::Arrive => 100.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NavigationInstruction {
    pub id: String,
    pub text: String,
    pub position: Coord,
    pub kind: InstructionKind,
}

/// A spoken-style message produced when a vehicle reaches an instruction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Announcement {
    pub vehicle_id: String,
    pub instruction_id: String,
    pub text: String,
    pub distance_m: f64,
}

/// Start, one "continue <direction>" roughly every quarter of the route, arrive.
/// Routes with fewer than two points get no instructions.
pub fn generate_instructions(route: &[Coord], destination: &str) -> Vec<NavigationInstruction> {
    if route.len() < 2 {
        return Vec::new();
    }
    let mut out = vec![NavigationInstruction {
        id: "start".into(),
        text: "Navigation started. Proceed to the highlighted route.".into(),
        position: route[0],
        kind: InstructionKind::Continue,
    }];

    let every = (route.len() / 4).max(1);
    for i in (every..route.len() - 1).step_by(every) {
        let direction = compass_direction(bearing_deg(route[i - 1], route[i]));
        out.push(NavigationInstruction {
            id: format!("waypoint-{i}"),
            text: format!("Continue {direction}"),
            position: route[i],
            kind: InstructionKind::Continue,
        });
    }

    out.push(NavigationInstruction {
        id: "arrive".into(),
        text: format!("Arriving at {destination}"),
        position: route[route.len() - 1],
        kind: InstructionKind::Arrive,
    });
    out
}

/// Turns get a distance prefix once they are more than 50 m away.
fn announcement_text(instruction: &NavigationInstruction, distance_m: f64) -> String {
    if instruction.kind != InstructionKind::Turn || distance_m <= 50.0 {
        return instruction.text.clone();
    }
    let meters = if distance_m > 100.0 {
        (distance_m / 100.0).round() * 100.0
    } else {
        distance_m.round()
    };
    format!("In {meters} meters, {}", instruction.text.to_lowercase())
}

/// Per-vehicle announcement state for one set of instructions.
#[derive(Debug, Clone, Default)]
pub struct InstructionTracker {
    instructions: Vec<NavigationInstruction>,
    announced: HashSet<String>,
}

impl InstructionTracker {
    pub fn new(instructions: Vec<NavigationInstruction>) -> Self {
        Self { instructions, announced: HashSet::new() }
    }

    pub fn instructions(&self) -> &[NavigationInstruction] {
        &self.instructions
    }

    /// Announces, in route order, every instruction now in range that has
    /// not been announced before.
    pub fn check(&mut self, vehicle_id: &str, position: Coord) -> Vec<Announcement> {
        let mut out = Vec::new();
        for ins in &self.instructions {
            if self.announced.contains(&ins.id) {
                continue;
            }
            let distance_m = haversine_distance(position, ins.position);
            if distance_m <= ins.kind.announce_within_m() {
                self.announced.insert(ins.id.clone());
                out.push(Announcement {
                    vehicle_id: vehicle_id.to_string(),
                    instruction_id: ins.id.clone(),
                    text: announcement_text(ins, distance_m),
                    distance_m,
                });
            }
        }
        out
    }
}
