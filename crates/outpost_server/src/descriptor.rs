use std::path::Path;

use anyhow::Context;
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// A static map description, produced by editor tooling and consumed at
/// startup. Field names are camelCase on disk.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MapDescriptor {
    pub map_id: u32,
    pub name: String,
    pub dimensions: Dimensions,
    pub spawn_points: Vec<Point>,
    pub monster_spawns: Vec<MonsterSpawn>,
    pub static_objects: Vec<StaticObject>,
    pub obstacles: Vec<Obstacle>,
}

impl Default for MapDescriptor {
    fn default() -> Self {
        Self {
            map_id: 1,
            name: "default".into(),
            dimensions: Dimensions::default(),
            spawn_points: vec![Point::default()],
            monster_spawns: vec![],
            static_objects: vec![],
            obstacles: vec![],
        }
    }
}

impl MapDescriptor {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read map descriptor {}", path.display()))?;

        serde_json::from_slice(&bytes)
            .with_context(|| format!("failed to parse map descriptor {}", path.display()))
    }

    /// The built-in fallback world: ten monsters arranged along a diagonal.
    pub fn default_map() -> Self {
        Self {
            monster_spawns: (1..=10)
                .map(|i| MonsterSpawn {
                    position: Point {
                        x: i as f32 * 10.0,
                        y: 0.0,
                        z: i as f32 * 10.0,
                    },
                    ..MonsterSpawn::default()
                })
                .collect(),
            ..Self::default()
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Dimensions {
    pub width: f32,
    pub height: f32,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl From<Point> for Vec3 {
    fn from(p: Point) -> Self {
        Vec3::new(p.x, p.y, p.z)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonsterSpawn {
    #[serde(rename = "type")]
    pub kind: String,
    pub position: Point,
    pub count: u32,
    /// Seconds until a killed monster respawns. Parsed but not yet consumed
    /// by the simulation.
    pub respawn_seconds: f32,
    /// Spawn positions scatter up to this far from `position` on x and z.
    pub spawn_radius: f32,
    pub level: Option<i32>,
    pub hp: Option<i32>,
    pub move_speed: Option<f32>,
    pub detect_range: Option<f32>,
    pub attack_range: Option<f32>,
    pub patrol: bool,
    pub patrol_radius: f32,
}

impl Default for MonsterSpawn {
    fn default() -> Self {
        Self {
            kind: "monster".into(),
            position: Point::default(),
            count: 1,
            respawn_seconds: 30.0,
            spawn_radius: 0.0,
            level: None,
            hp: None,
            move_speed: None,
            detect_range: None,
            attack_range: None,
            patrol: true,
            patrol_radius: crate::monster::DEFAULT_PATROL_RADIUS,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StaticObject {
    #[serde(rename = "type")]
    pub kind: String,
    pub position: Point,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Obstacle {
    pub min: Point,
    pub max: Point,
}
