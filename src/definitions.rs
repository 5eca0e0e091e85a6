//! Sprite sheet definitions
//!
//! A JSON document describing palettes, the sprites to bake against them,
//! and any repalettes to apply afterwards:
//!
//! ```json
//! {
//!   "palettes": {
//!     "tunic": {
//!       "groups": ["green", "red", "blue"],
//!       "mappings": [
//!         { "color": "#F800F8", "groups": {
//!             "green": { "subtype": "other", "color": "#10A840" },
//!             "red":   { "subtype": "other", "color": "#F82828" } } },
//!         { "color": "param:black", "groups": {
//!             "green": { "subtype": "black", "color": "#000000" } } }
//!       ],
//!       "ignore": ["#FFFFFF"]
//!     }
//!   },
//!   "sprites": [
//!     { "name": "link_walk", "image": "Images/link.png", "rect": [0, 0, 16, 16],
//!       "chunk": [8, 8], "palette": "tunic", "groups": ["green", "red"], "lenient": true }
//!   ],
//!   "repalettes": [
//!     { "sprite": "link_walk", "defaults": { "black": "#202020" } }
//!   ]
//! }
//! ```
//!
//! Sprite order is the bake order, so the same document always replays the
//! same slots against a preloaded cache.

use crate::color::ColorError;
use crate::palette::{
    parse_placeholder, ColorGroup, ColorMappingTable, DefaultMapping, IgnoreSet, Subtype,
};
use crate::raster::{Rect, Size};
use crate::request::{SpritePaletteRequest, UnmappedPolicy};
use image::RgbaImage;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error loading or compiling definitions.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DefinitionError {
    #[error("Failed to read definitions: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse definitions: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Failed to load image {}: {source}", path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("{context}: {source}")]
    Color {
        context: String,
        #[source]
        source: ColorError,
    },
    #[error("palette '{palette}' has no group named '{group}'")]
    UnknownGroup { palette: String, group: String },
    #[error("sprite '{sprite}' uses unknown palette '{palette}'")]
    UnknownPalette { sprite: String, palette: String },
    #[error("repalette refers to unknown sprite '{0}'")]
    UnknownSprite(String),
    #[error("sprite '{0}' is defined more than once")]
    DuplicateSprite(String),
    #[error("{0}")]
    Subtype(String),
}

#[derive(Debug, Clone, Deserialize)]
struct DefinitionsFile {
    #[serde(default)]
    palettes: BTreeMap<String, PaletteDef>,
    #[serde(default)]
    sprites: Vec<SpriteDef>,
    #[serde(default)]
    repalettes: Vec<RepaletteDef>,
}

#[derive(Debug, Clone, Deserialize)]
struct PaletteDef {
    groups: Vec<String>,
    #[serde(default)]
    mappings: Vec<MappingDef>,
    #[serde(default)]
    ignore: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct MappingDef {
    color: String,
    groups: BTreeMap<String, GroupColorDef>,
}

#[derive(Debug, Clone, Deserialize)]
struct GroupColorDef {
    subtype: String,
    color: String,
}

#[derive(Debug, Clone, Deserialize)]
struct SpriteDef {
    name: String,
    image: PathBuf,
    rect: [u32; 4],
    #[serde(default)]
    chunk: Option<[u32; 2]>,
    palette: String,
    #[serde(default)]
    groups: Option<Vec<String>>,
    #[serde(default)]
    lenient: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct RepaletteDef {
    sprite: String,
    defaults: BTreeMap<String, String>,
}

/// A compiled palette.
#[derive(Debug, Clone)]
pub struct Palette {
    pub name: String,
    pub groups: Vec<ColorGroup>,
    pub mappings: ColorMappingTable,
    pub ignore: IgnoreSet,
}

impl Palette {
    pub fn group(&self, name: &str) -> Option<&ColorGroup> {
        self.groups.iter().find(|group| group.name == name)
    }
}

/// A sprite to bake.
#[derive(Debug, Clone)]
pub struct SpriteEntry {
    pub name: String,
    pub image: PathBuf,
    pub rect: Rect,
    pub chunk_size: Option<Size>,
    pub palette: String,
    pub groups: Vec<ColorGroup>,
    pub policy: UnmappedPolicy,
}

/// A repalette applied after all sprites are baked.
#[derive(Debug, Clone)]
pub struct RepaletteEntry {
    pub sprite: String,
    pub defaults: DefaultMapping,
}

/// Compiled definitions with their source images loaded.
#[derive(Debug, Clone, Default)]
pub struct SpriteSheet {
    palettes: BTreeMap<String, Palette>,
    sprites: Vec<SpriteEntry>,
    repalettes: Vec<RepaletteEntry>,
    images: HashMap<PathBuf, RgbaImage>,
}

impl SpriteSheet {
    /// Load definitions from a file, resolving images relative to `content_dir`.
    pub fn load(path: &Path, content_dir: &Path) -> Result<Self, DefinitionError> {
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents, content_dir)
    }

    /// Parse definitions from a JSON string, loading the images it names.
    pub fn parse(json: &str, content_dir: &Path) -> Result<Self, DefinitionError> {
        let mut sheet = Self::compile(serde_json::from_str(json)?)?;

        for sprite in &sheet.sprites {
            if sheet.images.contains_key(&sprite.image) {
                continue;
            }
            let path = content_dir.join(&sprite.image);
            let image = image::open(&path)
                .map_err(|source| DefinitionError::Image { path: path.clone(), source })?
                .to_rgba8();
            log::debug!("loaded {} ({}x{})", path.display(), image.width(), image.height());
            sheet.images.insert(sprite.image.clone(), image);
        }

        Ok(sheet)
    }

    fn compile(file: DefinitionsFile) -> Result<Self, DefinitionError> {
        let mut palettes = BTreeMap::new();
        for (name, def) in file.palettes {
            palettes.insert(name.clone(), compile_palette(name, def)?);
        }

        let mut names = HashSet::new();
        let mut sprites = Vec::new();
        for def in file.sprites {
            if !names.insert(def.name.clone()) {
                return Err(DefinitionError::DuplicateSprite(def.name));
            }
            let palette = palettes.get(&def.palette).ok_or_else(|| {
                DefinitionError::UnknownPalette { sprite: def.name.clone(), palette: def.palette.clone() }
            })?;
            let groups = match &def.groups {
                Some(names) => names
                    .iter()
                    .map(|group| lookup_group(palette, group))
                    .collect::<Result<Vec<_>, _>>()?,
                None => palette.groups.clone(),
            };
            let [x, y, width, height] = def.rect;
            sprites.push(SpriteEntry {
                name: def.name,
                image: def.image,
                rect: Rect::new(x, y, width, height),
                chunk_size: def.chunk.map(|[w, h]| Size::new(w, h)),
                palette: def.palette,
                groups,
                policy: if def.lenient {
                    UnmappedPolicy::AllowTranslucent
                } else {
                    UnmappedPolicy::Strict
                },
            });
        }

        let mut repalettes = Vec::new();
        for def in file.repalettes {
            if !names.contains(&def.sprite) {
                return Err(DefinitionError::UnknownSprite(def.sprite));
            }
            let mut defaults = DefaultMapping::new();
            for (subtype, color) in &def.defaults {
                let subtype = subtype.parse::<Subtype>().map_err(DefinitionError::Subtype)?;
                let color = parse_placeholder(color).map_err(|source| DefinitionError::Color {
                    context: format!("repalette of '{}', subtype {}", def.sprite, subtype),
                    source,
                })?;
                defaults.set(subtype, color);
            }
            repalettes.push(RepaletteEntry { sprite: def.sprite, defaults });
        }

        Ok(Self { palettes, sprites, repalettes, images: HashMap::new() })
    }

    pub fn palette(&self, name: &str) -> Option<&Palette> {
        self.palettes.get(name)
    }

    pub fn sprites(&self) -> &[SpriteEntry] {
        &self.sprites
    }

    pub fn sprite(&self, name: &str) -> Option<&SpriteEntry> {
        self.sprites.iter().find(|sprite| sprite.name == name)
    }

    pub fn repalettes(&self) -> &[RepaletteEntry] {
        &self.repalettes
    }

    pub fn image(&self, path: &Path) -> Option<&RgbaImage> {
        self.images.get(path)
    }

    /// Register an already decoded image under a definition path.
    pub fn insert_image(&mut self, path: impl Into<PathBuf>, image: RgbaImage) {
        self.images.insert(path.into(), image);
    }

    /// Build the bake request for a sprite.
    ///
    /// Returns `None` if the sprite's palette or image is not loaded.
    pub fn request(&self, sprite: &SpriteEntry) -> Option<SpritePaletteRequest<'_>> {
        let palette = self.palettes.get(&sprite.palette)?;
        let image = self.images.get(&sprite.image)?;
        let mut request =
            SpritePaletteRequest::new(image, sprite.rect, &palette.mappings, &palette.ignore)
                .with_groups(&sprite.groups)
                .with_policy(sprite.policy);
        if let Some(chunk) = sprite.chunk_size {
            request = request.with_chunk_size(chunk);
        }
        Some(request)
    }
}

fn lookup_group(palette: &Palette, name: &str) -> Result<ColorGroup, DefinitionError> {
    palette.group(name).cloned().ok_or_else(|| DefinitionError::UnknownGroup {
        palette: palette.name.clone(),
        group: name.to_string(),
    })
}

fn compile_palette(name: String, def: PaletteDef) -> Result<Palette, DefinitionError> {
    let groups: Vec<ColorGroup> =
        def.groups.iter().enumerate().map(|(index, group)| ColorGroup::new(group, index)).collect();
    let mut palette =
        Palette { name, groups, mappings: ColorMappingTable::new(), ignore: IgnoreSet::new() };

    for mapping in &def.mappings {
        let placeholder = parse_placeholder(&mapping.color).map_err(|source| {
            DefinitionError::Color { context: format!("palette '{}'", palette.name), source }
        })?;
        for (group_name, target) in &mapping.groups {
            let group = lookup_group(&palette, group_name)?;
            let subtype = target.subtype.parse::<Subtype>().map_err(DefinitionError::Subtype)?;
            let color = parse_placeholder(&target.color).map_err(|source| {
                DefinitionError::Color {
                    context: format!(
                        "palette '{}', mapping {} for group '{}'",
                        palette.name, mapping.color, group_name
                    ),
                    source,
                }
            })?;
            palette.mappings.insert(placeholder, group.index, subtype, color);
        }
    }

    for color in &def.ignore {
        let color = parse_placeholder(color).map_err(|source| DefinitionError::Color {
            context: format!("palette '{}' ignore list", palette.name),
            source,
        })?;
        palette.ignore.insert(color);
    }

    Ok(palette)
}
