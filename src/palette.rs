//! Color groups, subtypes, and the mapping tables that tie placeholder
//! colors to their per-group replacements.

use crate::color::{self, parse_color, Color, ColorError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// Semantic role a placeholder color plays within a color group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subtype {
    Transparent,
    Black,
    Other,
}

impl Subtype {
    /// Every subtype, in encoding order.
    pub const ALL: [Subtype; 3] = [Subtype::Transparent, Subtype::Black, Subtype::Other];

    /// Index stored in the red channel of a parametric placeholder.
    pub fn index(self) -> u8 {
        match self {
            Subtype::Transparent => 0,
            Subtype::Black => 1,
            Subtype::Other => 2,
        }
    }

    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            Subtype::Transparent => "transparent",
            Subtype::Black => "black",
            Subtype::Other => "other",
        }
    }

    /// Canonical parametric placeholder for this subtype.
    pub fn placeholder(self) -> Color {
        color::parametric(self.index())
    }
}

impl fmt::Display for Subtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Subtype {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|subtype| subtype.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown subtype '{}'", s))
    }
}

/// Returns true if a parametric placeholder encodes the transparent subtype.
pub fn is_transparent_placeholder(color: Color) -> bool {
    color::is_parametric(color) && Subtype::from_index(color[0]) == Some(Subtype::Transparent)
}

/// Parse a placeholder color: either a literal color or `param:<subtype>`.
pub fn parse_placeholder(s: &str) -> Result<Color, ColorError> {
    match s.trim().strip_prefix("param:") {
        Some(name) => name
            .parse::<Subtype>()
            .map(Subtype::placeholder)
            .map_err(|_| ColorError::UnknownSubtype(name.trim().to_string())),
        None => parse_color(s),
    }
}

/// One interchangeable recolor family.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColorGroup {
    pub name: String,
    pub index: usize,
}

impl ColorGroup {
    pub fn new(name: impl Into<String>, index: usize) -> Self {
        Self { name: name.into(), index }
    }
}

/// The color a placeholder takes under one group, and the role it plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupColor {
    pub subtype: Subtype,
    pub color: Color,
}

/// Maps placeholder colors to their per-group replacements.
///
/// Group lookups are ordered by group index so iteration is deterministic.
#[derive(Debug, Clone, Default)]
pub struct ColorMappingTable {
    entries: HashMap<Color, BTreeMap<usize, GroupColor>>,
}

impl ColorMappingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the color `placeholder` takes under group `group`.
    ///
    /// Parametric placeholders are stored in canonical form.
    pub fn insert(&mut self, placeholder: Color, group: usize, subtype: Subtype, color: Color) {
        let key = if color::is_parametric(placeholder) {
            color::canonical_parametric(placeholder)
        } else {
            placeholder
        };
        self.entries.entry(key).or_default().insert(group, GroupColor { subtype, color });
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(mut self, placeholder: Color, group: usize, subtype: Subtype, color: Color) -> Self {
        self.insert(placeholder, group, subtype, color);
        self
    }

    pub fn get(&self, placeholder: &Color) -> Option<&BTreeMap<usize, GroupColor>> {
        self.entries.get(placeholder)
    }

    pub fn contains(&self, placeholder: &Color) -> bool {
        self.entries.contains_key(placeholder)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Color, &BTreeMap<usize, GroupColor>)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Colors that are already final art and pass through unchanged.
pub type IgnoreSet = HashSet<Color>;

/// Direct subtype to color table used to repalette baked sprites.
///
/// When present on a request it replaces the group-specific colors for every
/// subtype it names; subtypes it leaves out keep their group color.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefaultMapping {
    colors: BTreeMap<Subtype, Color>,
}

impl DefaultMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, subtype: Subtype, color: Color) {
        self.colors.insert(subtype, color);
    }

    pub fn with(mut self, subtype: Subtype, color: Color) -> Self {
        self.set(subtype, color);
        self
    }

    pub fn get(&self, subtype: Subtype) -> Option<Color> {
        self.colors.get(&subtype).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }
}
