//! Whiteboard elements — the unit of content on a shared canvas.
//!
//! DESIGN
//! ======
//! Elements are stored in the shared log as camelCase JSON so browser
//! canvases and this crate read the same bytes. The element type is a closed
//! set; the `path` field exists only for freehand drawings and sticky notes
//! always carry an extent.
//!
//! Updates never mutate a shared element: callers build a new value with the
//! same `id` and replace it in the log.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::clock::now_ms;

#[cfg(test)]
#[path = "element_test.rs"]
mod tests;

pub const DEFAULT_STICKY_WIDTH: f64 = 200.0;
pub const DEFAULT_STICKY_HEIGHT: f64 = 150.0;

/// Length of the random suffix appended to the creation timestamp in ids.
const ID_SUFFIX_LEN: usize = 9;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

// =============================================================================
// TYPES
// =============================================================================

/// Element variant. Immutable after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ElementKind {
    Drawing,
    StickyNote,
    Text,
}

impl ElementKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Drawing => "drawing",
            Self::StickyNote => "sticky-note",
            Self::Text => "text",
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One vertex of a freehand stroke.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A stroke, sticky note, or text block contributed by a participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhiteboardElement {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ElementKind,
    /// Top-left anchor for notes and text; bounding-box origin for drawings.
    pub x: f64,
    pub y: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    /// Sticky note body or text-tool string.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub color: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stroke_width: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<Point>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub participant_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub participant_name: Option<String>,
    /// Milliseconds since Unix epoch. Zero means "not yet stamped".
    #[serde(default)]
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ElementError {
    #[error("element id is empty")]
    EmptyId,
    #[error("drawing {id} has no path")]
    MissingPath { id: String },
    #[error("{kind} {id} carries a path")]
    UnexpectedPath { id: String, kind: ElementKind },
    #[error("sticky note {id} has no extent")]
    MissingExtent { id: String },
}

// =============================================================================
// CONSTRUCTORS
// =============================================================================

/// Generate an element id: creation timestamp plus a random base36 suffix.
#[must_use]
pub fn generate_element_id() -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..ID_SUFFIX_LEN)
        .map(|_| char::from(BASE36[rng.random_range(0..BASE36.len())]))
        .collect();
    format!("{}-{suffix}", now_ms())
}

impl WhiteboardElement {
    fn blank(kind: ElementKind, x: f64, y: f64, color: impl Into<String>) -> Self {
        Self {
            id: generate_element_id(),
            kind,
            x,
            y,
            width: None,
            height: None,
            content: None,
            color: color.into(),
            stroke_width: None,
            path: None,
            participant_id: None,
            participant_name: None,
            timestamp: now_ms(),
        }
    }

    /// Freehand stroke. Position is the top-left of the path's bounding box.
    #[must_use]
    pub fn drawing(path: Vec<Point>, color: impl Into<String>, stroke_width: f64) -> Self {
        let (x, y) = bounding_origin(&path);
        let mut element = Self::blank(ElementKind::Drawing, x, y, color);
        element.stroke_width = Some(stroke_width);
        element.path = Some(path);
        element
    }

    /// Sticky note with the default 200x150 extent.
    #[must_use]
    pub fn sticky_note(x: f64, y: f64, content: impl Into<String>, color: impl Into<String>) -> Self {
        let mut element = Self::blank(ElementKind::StickyNote, x, y, color);
        element.width = Some(DEFAULT_STICKY_WIDTH);
        element.height = Some(DEFAULT_STICKY_HEIGHT);
        element.content = Some(content.into());
        element
    }

    #[must_use]
    pub fn text(x: f64, y: f64, content: impl Into<String>, color: impl Into<String>) -> Self {
        let mut element = Self::blank(ElementKind::Text, x, y, color);
        element.content = Some(content.into());
        element
    }
}

// =============================================================================
// BUILDERS
// =============================================================================

impl WhiteboardElement {
    /// Override the extent. Only meaningful for sticky notes.
    #[must_use]
    pub fn with_size(mut self, width: f64, height: f64) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    /// Copy of this element moved so its anchor sits at `(x, y)`.
    ///
    /// Drawings translate every path vertex by the same offset. The id is
    /// kept so the copy replaces the original in the log.
    #[must_use]
    pub fn moved_to(&self, x: f64, y: f64) -> Self {
        let dx = x - self.x;
        let dy = y - self.y;
        let mut moved = self.clone();
        moved.x = x;
        moved.y = y;
        if let Some(path) = moved.path.as_mut() {
            for point in path {
                point.x += dx;
                point.y += dy;
            }
        }
        moved
    }

    #[must_use]
    pub fn is_attributed(&self) -> bool {
        self.participant_id.is_some()
    }
}

// =============================================================================
// INVARIANTS
// =============================================================================

impl WhiteboardElement {
    /// Check the per-type field invariants.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), ElementError> {
        if self.id.is_empty() {
            return Err(ElementError::EmptyId);
        }
        match (self.kind, self.path.is_some()) {
            (ElementKind::Drawing, false) => return Err(ElementError::MissingPath { id: self.id.clone() }),
            (kind @ (ElementKind::StickyNote | ElementKind::Text), true) => {
                return Err(ElementError::UnexpectedPath { id: self.id.clone(), kind });
            }
            _ => {}
        }
        if self.kind == ElementKind::StickyNote && (self.width.is_none() || self.height.is_none()) {
            return Err(ElementError::MissingExtent { id: self.id.clone() });
        }
        Ok(())
    }

    /// Repair what can be repaired: default sticky-note extents and drop
    /// fields the element type does not use. A drawing without a path stays
    /// invalid since there is nothing to draw.
    #[must_use]
    pub fn normalize(mut self) -> Self {
        match self.kind {
            ElementKind::StickyNote => {
                self.width.get_or_insert(DEFAULT_STICKY_WIDTH);
                self.height.get_or_insert(DEFAULT_STICKY_HEIGHT);
                self.path = None;
                self.stroke_width = None;
            }
            ElementKind::Text => {
                self.width = None;
                self.height = None;
                self.path = None;
                self.stroke_width = None;
            }
            ElementKind::Drawing => {
                self.width = None;
                self.height = None;
                self.content = None;
            }
        }
        self
    }
}

fn bounding_origin(path: &[Point]) -> (f64, f64) {
    if path.is_empty() {
        return (0.0, 0.0);
    }
    path.iter()
        .fold((f64::INFINITY, f64::INFINITY), |(min_x, min_y), p| (min_x.min(p.x), min_y.min(p.y)))
}

// =============================================================================
// MERGE
// =============================================================================

/// Merge `overlay` into `base` by element id.
///
/// Order of `base` is preserved. An overlay element replaces the base element
/// with the same id unless the base copy is strictly newer; overlay elements
/// with unknown ids are appended in overlay order. Duplicate ids within
/// `overlay` collapse to the newest copy.
#[must_use]
pub fn merge_by_id(base: &[WhiteboardElement], overlay: &[WhiteboardElement]) -> Vec<WhiteboardElement> {
    let mut merged: Vec<WhiteboardElement> = base.to_vec();
    for incoming in overlay {
        match merged.iter_mut().find(|existing| existing.id == incoming.id) {
            Some(existing) => {
                if incoming.timestamp >= existing.timestamp {
                    existing.clone_from(incoming);
                }
            }
            None => merged.push(incoming.clone()),
        }
    }
    merged
}
