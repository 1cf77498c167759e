use crate::rendering::surface::Color;
use crate::Result;
use image::Rgba;
use serde::{Deserialize, Serialize};

/// Defect class a mark can be labelled with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefectClass {
    pub id: u32,
    pub name: String,
    /// `#rrggbb` colour used for the outline
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl DefectClass {
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            color: None,
        }
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    /// Parsed outline colour, if one is set and well formed
    pub fn rgba(&self) -> Option<Color> {
        parse_hex_color(self.color.as_deref()?)
    }
}

fn parse_hex_color(hex: &str) -> Option<Color> {
    let hex = hex.strip_prefix('#').unwrap_or(hex);
    if hex.len() != 6 {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
    Some(Rgba([channel(0)?, channel(2)?, channel(4)?, 255]))
}

/// Resolves class ids to names and colours for labelling
pub trait DefectClassLookup: Send + Sync {
    fn class(&self, id: u32) -> Option<DefectClass>;

    fn classes(&self) -> Vec<DefectClass>;

    fn class_name(&self, id: u32) -> Option<String> {
        self.class(id).map(|c| c.name)
    }
}

/// Fixed class list, usually loaded from a JSON config
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StaticClassTable {
    pub classes: Vec<DefectClass>,
}

impl StaticClassTable {
    pub fn new(classes: Vec<DefectClass>) -> Self {
        Self { classes }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl DefectClassLookup for StaticClassTable {
    fn class(&self, id: u32) -> Option<DefectClass> {
        self.classes.iter().find(|c| c.id == id).cloned()
    }

    fn classes(&self) -> Vec<DefectClass> {
        self.classes.clone()
    }
}
