use serde::{Deserialize, Serialize};

use crate::error::WorldError;
use crate::types::{MapId, Position};

/// Classification of one map cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TileKind {
    Normal,
    Obstacle,
    Water,
    SafeZone,
}

impl TileKind {
    /// Whether entities may stand on / move into this tile.
    pub fn allows_movement(self) -> bool {
        matches!(self, TileKind::Normal | TileKind::SafeZone)
    }

    fn from_char(c: char) -> Option<Self> {
        match c {
            '.' => Some(TileKind::Normal),
            '#' => Some(TileKind::Obstacle),
            '~' => Some(TileKind::Water),
            '+' => Some(TileKind::SafeZone),
            _ => None,
        }
    }
}

/// Fixed grid of tiles for one map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapGrid {
    pub id: MapId,
    pub width: u32,
    pub height: u32,
    tiles: Vec<TileKind>,
}

impl MapGrid {
    pub fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && (x as u32) < self.width && y >= 0 && (y as u32) < self.height
    }

    pub fn tile(&self, x: i32, y: i32) -> Option<TileKind> {
        if !self.in_bounds(x, y) {
            return None;
        }
        Some(self.tiles[y as usize * self.width as usize + x as usize])
    }
}

/// Spawn-point declaration parsed from a map file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnDirective {
    pub template_id: u32,
    pub position: Position,
    pub count: u32,
    pub interval_secs: u64,
}

/// Parse map text: a `<width> <height>` header, `height` rows of tile
/// characters (`.` normal, `#` obstacle, `~` water, `+` safe zone), then
/// optional `spawn <template> <x> <y> <count> <interval_secs>` lines.
/// Blank lines and `;` comments are skipped.
pub fn parse_map(id: MapId, text: &str) -> Result<(MapGrid, Vec<SpawnDirective>), WorldError> {
    let mut lines = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with(';'));

    let header = lines
        .next()
        .ok_or_else(|| WorldError::MapParse("empty map data".into()))?;
    let mut parts = header.split_whitespace();
    let width: u32 = parse_field(parts.next(), "width")?;
    let height: u32 = parse_field(parts.next(), "height")?;
    if width == 0 || height == 0 {
        return Err(WorldError::MapParse(format!(
            "degenerate dimensions {}x{}",
            width, height
        )));
    }

    let mut tiles = Vec::with_capacity((width * height) as usize);
    for row in 0..height {
        let line = lines
            .next()
            .ok_or_else(|| WorldError::MapParse(format!("missing row {}", row)))?;
        if line.chars().count() != width as usize {
            return Err(WorldError::MapParse(format!(
                "row {} has {} tiles, expected {}",
                row,
                line.chars().count(),
                width
            )));
        }
        for c in line.chars() {
            let tile = TileKind::from_char(c)
                .ok_or_else(|| WorldError::MapParse(format!("unknown tile '{}'", c)))?;
            tiles.push(tile);
        }
    }

    let grid = MapGrid {
        id,
        width,
        height,
        tiles,
    };

    let mut spawns = Vec::new();
    for line in lines {
        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("spawn") => {
                let directive = SpawnDirective {
                    template_id: parse_field(parts.next(), "spawn template")?,
                    position: Position::new(
                        parse_field(parts.next(), "spawn x")?,
                        parse_field(parts.next(), "spawn y")?,
                    ),
                    count: parse_field(parts.next(), "spawn count")?,
                    interval_secs: parse_field(parts.next(), "spawn interval")?,
                };
                if !grid.in_bounds(directive.position.x, directive.position.y) {
                    return Err(WorldError::MapParse(format!(
                        "spawn point ({}, {}) outside {}x{} grid",
                        directive.position.x, directive.position.y, width, height
                    )));
                }
                spawns.push(directive);
            }
            Some(other) => {
                return Err(WorldError::MapParse(format!(
                    "unexpected directive '{}'",
                    other
                )))
            }
            None => {}
        }
    }

    Ok((grid, spawns))
}

fn parse_field<T: std::str::FromStr>(raw: Option<&str>, what: &str) -> Result<T, WorldError> {
    raw.ok_or_else(|| WorldError::MapParse(format!("missing {}", what)))?
        .parse()
        .map_err(|_| WorldError::MapParse(format!("invalid {}", what)))
}
