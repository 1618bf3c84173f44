use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::common::Cell;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Free,
    Obstacle,
    TaskEndpoint,
    NonTaskEndpoint,
}

impl Category {
    fn from_char(ch: char) -> Option<Self> {
        match ch {
            '.' => Some(Category::Free),
            '@' => Some(Category::Obstacle),
            'E' => Some(Category::TaskEndpoint),
            'P' => Some(Category::NonTaskEndpoint),
            _ => None,
        }
    }
}

/// Static grid. Cells are registered once with `create` and never change.
#[derive(Debug, Clone)]
pub struct Map {
    pub width: i32,
    pub height: i32,
    cells: BTreeMap<Cell, Category>,
}

impl Map {
    pub fn new(width: i32, height: i32) -> Self {
        Map {
            width,
            height,
            cells: BTreeMap::new(),
        }
    }

    /// Every cell of the extents registered as `Free`.
    pub fn open(width: i32, height: i32) -> Self {
        let mut map = Map::new(width, height);
        for x in 0..width {
            for y in 0..height {
                map.cells.insert(Cell::new(x, y), Category::Free);
            }
        }
        map
    }

    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("cannot read map {path}"))?;
        content
            .parse()
            .with_context(|| format!("error parsing map file: {path}"))
    }

    pub fn create(&mut self, cell: Cell, category: Category) -> Result<()> {
        if !self.is_in_bounds(cell) {
            return Err(Error::OutOfBounds {
                cell,
                width: self.width,
                height: self.height,
            });
        }
        if let Some(existing) = self.cells.get(&cell) {
            return Err(Error::DuplicateCell {
                cell,
                existing: *existing,
            });
        }
        self.cells.insert(cell, category);
        Ok(())
    }

    pub fn category_of(&self, cell: Cell) -> Result<Category> {
        self.cells
            .get(&cell)
            .copied()
            .ok_or(Error::UnknownCell { cell })
    }

    pub fn is_in_bounds(&self, cell: Cell) -> bool {
        cell.x >= 0 && cell.y >= 0 && cell.x < self.width && cell.y < self.height
    }

    /// In bounds, registered and not an obstacle.
    pub fn is_traversable(&self, cell: Cell) -> bool {
        self.is_in_bounds(cell)
            && matches!(self.cells.get(&cell), Some(category) if *category != Category::Obstacle)
    }

    pub fn non_task_endpoints(&self) -> impl Iterator<Item = Cell> + '_ {
        self.cells_of(Category::NonTaskEndpoint)
    }

    pub fn task_endpoints(&self) -> impl Iterator<Item = Cell> + '_ {
        self.cells_of(Category::TaskEndpoint)
    }

    fn cells_of(&self, category: Category) -> impl Iterator<Item = Cell> + '_ {
        self.cells
            .iter()
            .filter(move |(_, c)| **c == category)
            .map(|(cell, _)| *cell)
    }
}

impl FromStr for Map {
    type Err = Error;

    /// Optional `type` line, then `height H`, `width W`, `map`, then H rows of
    /// W cells. Row index is y, column index is x.
    fn from_str(content: &str) -> Result<Self> {
        let mut lines = content.lines().filter(|line| !line.trim().is_empty()).peekable();
        if lines.peek().is_some_and(|line| line.starts_with("type")) {
            lines.next();
        }
        let height = parse_header(lines.next(), "height")?;
        let width = parse_header(lines.next(), "width")?;
        if lines.next().map(str::trim) != Some("map") {
            return Err(Error::InvalidScenario("missing `map` line".to_string()));
        }

        let mut map = Map::new(width, height);
        let mut rows = 0;
        for (y, line) in lines.take(height as usize).enumerate() {
            let row: Vec<char> = line.trim_end().chars().collect();
            if row.len() != width as usize {
                return Err(Error::InvalidScenario(format!(
                    "row {y} has {} cells, expected {width}",
                    row.len()
                )));
            }
            for (x, ch) in row.into_iter().enumerate() {
                let category = Category::from_char(ch).ok_or_else(|| {
                    Error::InvalidScenario(format!("unknown cell '{ch}' at ({x}, {y})"))
                })?;
                map.create(Cell::new(x as i32, y as i32), category)?;
            }
            rows += 1;
        }
        if rows != height {
            return Err(Error::InvalidScenario(format!(
                "expected {height} rows, found {rows}"
            )));
        }

        Ok(map)
    }
}

fn parse_header(line: Option<&str>, key: &str) -> Result<i32> {
    let line = line.ok_or_else(|| Error::InvalidScenario(format!("missing `{key}` line")))?;
    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next().and_then(|v| v.parse::<i32>().ok())) {
        (Some(name), Some(value)) if name == key && value >= 0 => Ok(value),
        _ => Err(Error::InvalidScenario(format!(
            "malformed `{key}` line: {line}"
        ))),
    }
}
