//! Region-of-interest shapes and their positional-argument encoding.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ParameterError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Circle {
    pub position: [f64; 2],
    pub radius: f64,
}

/// `{"type": "rectangle", "segments": [[x, y], ...]}` or
/// `{"type": "circle", "segments": {"position": [x, y], "radius": r}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "segments", rename_all = "lowercase")]
pub enum Highlighter {
    Rectangle(Vec<[f64; 2]>),
    Polygon(Vec<[f64; 2]>),
    Circle(Circle),
}

impl Highlighter {
    pub fn from_value(value: &Value) -> Result<Self, ParameterError> {
        Highlighter::deserialize(value)
            .map_err(|e| ParameterError::InvalidHighlighter(e.to_string()))
    }

    /// Space-separated integers as expected by the executables.
    pub fn encode(&self) -> String {
        match self {
            Highlighter::Rectangle(points) | Highlighter::Polygon(points) => points
                .iter()
                .flat_map(|[x, y]| [round_half_up(*x), round_half_up(*y)])
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(" "),
            Highlighter::Circle(circle) => format!(
                "{} {} {}",
                round_half_up(circle.position[0]),
                round_half_up(circle.position[1]),
                round_half_up(circle.radius)
            ),
        }
    }
}

/// Rounds .5 towards positive infinity, as JavaScript's `Math.round` does.
pub fn round_half_up(v: f64) -> i64 {
    (v + 0.5).floor() as i64
}
