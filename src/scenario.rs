//! Scenario loader (§4.E): turn a declarative battle description into
//! populated entities, nudging any unit spawned inside an obstacle out
//! to its edge. Grounded on the teacher's `Scenario`/`SpawnPoint`
//! deserialization shape in `sim/src/world.rs`, adapted from Godot's
//! `Vector3`-keyed spawn points to the spec's flat `{x, z}` pairs.

use serde::{Deserialize, Serialize};

use crate::components::{Faction, Obstacle, ObstacleShape, Position};
use crate::ecs::{EntityId, Store};
use crate::error::EngineResult;
use crate::templates;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapSize {
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitSpawn {
    #[serde(rename = "type")]
    pub unit_type: String,
    pub position: XzPosition,
    pub faction: Faction,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct XzPosition {
    pub x: f32,
    pub z: f32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObstacleType {
    Tree,
    Rock,
    Wall,
    Fence,
    House,
    Brook,
    River,
    Bridge,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObstacleSpawn {
    #[serde(rename = "type")]
    pub obstacle_type: ObstacleType,
    pub position: XzPosition,
    pub rotation: Option<f32>,
    pub length: Option<f32>,
    pub scale: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub id: String,
    pub name: String,
    pub description: String,
    pub map_size: MapSize,
    pub player_units: Vec<UnitSpawn>,
    pub enemy_units: Vec<UnitSpawn>,
    #[serde(default)]
    pub obstacles: Vec<ObstacleSpawn>,
    #[serde(default)]
    pub objectives: Vec<String>,
}

/// Closed-set mapping from obstacle type to its physical shape and
/// passability, §4.E. `length`/`scale` default to sane values when the
/// scenario omits them.
fn obstacle_shape(spawn: &ObstacleSpawn) -> (ObstacleShape, bool, Option<f32>) {
    let rotation = spawn.rotation.unwrap_or(0.0);
    match spawn.obstacle_type {
        ObstacleType::Tree => (ObstacleShape::Circle { radius: spawn.scale.unwrap_or(1.0) * 0.6 }, false, None),
        ObstacleType::Rock => (ObstacleShape::Circle { radius: spawn.scale.unwrap_or(1.0) * 0.9 }, false, None),
        ObstacleType::Wall | ObstacleType::Fence => {
            let length = spawn.length.unwrap_or(4.0);
            (ObstacleShape::Rect { half_length: length / 2.0, half_width: 0.25, rotation }, false, None)
        }
        ObstacleType::House => (ObstacleShape::Rect { half_length: spawn.length.unwrap_or(6.0) / 2.0, half_width: 3.0, rotation }, false, None),
        ObstacleType::Brook | ObstacleType::River => {
            (ObstacleShape::Rect { half_length: spawn.length.unwrap_or(10.0) / 2.0, half_width: 1.5, rotation }, true, Some(0.5))
        }
        ObstacleType::Bridge => (ObstacleShape::Rect { half_length: spawn.length.unwrap_or(4.0) / 2.0, half_width: 1.0, rotation }, true, Some(1.0)),
    }
}

/// Nudge `pos` outside `shape` if it currently lies inside it: for a
/// circle, push radially outward past `radius + 0.5`; for a rectangle,
/// project onto the nearest local axis and push past the half-extent
/// (+0.5) on that side.
fn nudge_outside(pos: Position, obstacle_pos: Position, shape: ObstacleShape) -> Position {
    match shape {
        ObstacleShape::Circle { radius } => {
            let dx = pos.x - obstacle_pos.x;
            let dy = pos.y - obstacle_pos.y;
            let dist = (dx * dx + dy * dy).sqrt();
            let clearance = radius + 0.5;
            if dist >= clearance {
                return pos;
            }
            if dist < 1e-6 {
                return Position { x: obstacle_pos.x + clearance, y: obstacle_pos.y, ..pos };
            }
            let scale = clearance / dist;
            Position { x: obstacle_pos.x + dx * scale, y: obstacle_pos.y + dy * scale, ..pos }
        }
        ObstacleShape::Rect { half_length, half_width, rotation } => {
            let dx = pos.x - obstacle_pos.x;
            let dy = pos.y - obstacle_pos.y;
            let (sin, cos) = rotation.sin_cos();
            let local_x = dx * cos + dy * sin;
            let local_y = -dx * sin + dy * cos;
            if local_x.abs() >= half_length + 0.5 || local_y.abs() >= half_width + 0.5 {
                return pos;
            }
            let sign = |v: f32| if v < 0.0 { -1.0 } else { 1.0 };
            let overshoot_x = half_length + 0.5 - local_x.abs();
            let overshoot_y = half_width + 0.5 - local_y.abs();
            let (new_local_x, new_local_y) = if overshoot_x <= overshoot_y {
                ((half_length + 0.5) * sign(local_x), local_y)
            } else {
                (local_x, (half_width + 0.5) * sign(local_y))
            };
            let world_x = obstacle_pos.x + new_local_x * cos - new_local_y * sin;
            let world_y = obstacle_pos.y + new_local_x * sin + new_local_y * cos;
            Position { x: world_x, y: world_y, ..pos }
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadedScenario {
    pub player_ids: Vec<EntityId>,
    pub enemy_ids: Vec<EntityId>,
    pub obstacle_ids: Vec<EntityId>,
    pub objectives: Vec<String>,
    pub map_width: f32,
    pub map_height: f32,
}

pub fn load(store: &mut Store, scenario: &Scenario) -> EngineResult<LoadedScenario> {
    let mut obstacle_records: Vec<(Position, ObstacleShape)> = Vec::new();
    let mut obstacle_ids = Vec::new();

    for spawn in &scenario.obstacles {
        let (shape, is_passable, speed_multiplier) = obstacle_shape(spawn);
        let pos = Position::new(spawn.position.x, spawn.position.z);
        let id = store.create();
        store.set_position(id, pos);
        store.set_obstacle(id, Obstacle { shape, is_passable, speed_multiplier });
        obstacle_records.push((pos, shape));
        obstacle_ids.push(id);
    }

    let mut spawn_one = |store: &mut Store, unit: &UnitSpawn, index: usize| -> EngineResult<EntityId> {
        let mut pos = Position::new(unit.position.x, unit.position.z);
        for (obstacle_pos, shape) in &obstacle_records {
            pos = nudge_outside(pos, *obstacle_pos, *shape);
        }
        let label = format!("{:?} {}", unit.faction, index + 1);
        templates::spawn(store, &unit.unit_type, label, pos, unit.faction)
    };

    let mut player_ids = Vec::with_capacity(scenario.player_units.len());
    for (i, unit) in scenario.player_units.iter().enumerate() {
        player_ids.push(spawn_one(store, unit, i)?);
    }
    let mut enemy_ids = Vec::with_capacity(scenario.enemy_units.len());
    for (i, unit) in scenario.enemy_units.iter().enumerate() {
        enemy_ids.push(spawn_one(store, unit, i)?);
    }

    Ok(LoadedScenario {
        player_ids,
        enemy_ids,
        obstacle_ids,
        objectives: scenario.objectives.clone(),
        map_width: scenario.map_size.width,
        map_height: scenario.map_size.height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_scenario() -> Scenario {
        Scenario {
            id: "duel".into(),
            name: "Duel".into(),
            description: "two units".into(),
            map_size: MapSize { width: 40.0, height: 40.0 },
            player_units: vec![UnitSpawn { unit_type: "militia".into(), position: XzPosition { x: -5.0, z: 0.0 }, faction: Faction::Player }],
            enemy_units: vec![UnitSpawn { unit_type: "militia".into(), position: XzPosition { x: 5.0, z: 0.0 }, faction: Faction::Enemy }],
            obstacles: vec![],
            objectives: vec!["eliminate".into()],
        }
    }

    #[test]
    fn loads_units_and_preserves_objectives() {
        let mut store = Store::new();
        let loaded = load(&mut store, &minimal_scenario()).unwrap();
        assert_eq!(loaded.player_ids.len(), 1);
        assert_eq!(loaded.enemy_ids.len(), 1);
        assert_eq!(loaded.objectives, vec!["eliminate".to_string()]);
    }

    #[test]
    fn unit_spawned_inside_rock_is_nudged_clear() {
        let mut scenario = minimal_scenario();
        scenario.obstacles.push(ObstacleSpawn { obstacle_type: ObstacleType::Rock, position: XzPosition { x: -5.0, z: 0.0 }, rotation: None, length: None, scale: Some(1.0) });
        let mut store = Store::new();
        let loaded = load(&mut store, &scenario).unwrap();
        let pos = store.position(loaded.player_ids[0]).unwrap();
        let dist = ((pos.x - (-5.0f32)).powi(2) + (pos.y - 0.0f32).powi(2)).sqrt();
        assert!(dist >= 0.9 - 1e-3);
    }

    #[test]
    fn unknown_unit_type_propagates_error() {
        let mut scenario = minimal_scenario();
        scenario.player_units[0].unit_type = "griffin".into();
        let mut store = Store::new();
        assert!(load(&mut store, &scenario).is_err());
    }
}
