use geo::Point;
use serde::Serialize;

/// One row of the school table. `location` is `Point::new(lon, lat)` and is
/// only present when both coordinates are.
#[derive(Debug, Clone, PartialEq)]
pub struct School {
    pub id: String,
    pub name: Option<String>,
    pub location: Option<Point<f64>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub school_id: String,
    pub member_group: String,
}

/// A school that survived the join and has coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedSchool {
    /// First comma-delimited segment of the school id, trimmed.
    pub key: String,
    pub name: String,
    pub location: Point<f64>,
    pub teacher_count: u32,
}

impl MergedSchool {
    pub fn lat(&self) -> f64 {
        self.location.y()
    }

    pub fn lon(&self) -> f64 {
        self.location.x()
    }
}

/// A merged school with its marker styling resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StyledSchool {
    pub school_id: String,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub teacher_count: u32,
    pub tier: &'static str,
    pub color: &'static str,
    pub radius: f64,
}
