//! Content build driver
//!
//! Runs a [`SpriteSheet`] against a [`PalettedSpriteDatabase`]:
//!
//! 1. Try to load the cache. A valid cache puts the database in preload mode,
//!    so every bake below only replays its recorded slot.
//! 2. Bake each sprite in definition order.
//! 3. Apply repalettes in definition order.
//! 4. Save the cache if it was rebuilt.

use crate::cache_file::CacheError;
use crate::database::{BakedSpriteHandle, PalettedSpriteDatabase};
use crate::definitions::{SpriteEntry, SpriteSheet};
use crate::fs::FileSystem;
use crate::request::SpritePaletteRequest;
use crate::resolve::BakeError;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Error during a content build.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BuildError {
    #[error("{sprite}: {source}")]
    Bake {
        sprite: String,
        #[source]
        source: BakeError,
    },
    #[error("{sprite}: image {} is not loaded", image.display())]
    MissingImage { sprite: String, image: PathBuf },
    #[error("failed to save cache: {0}")]
    Save(#[source] CacheError),
}

impl BuildError {
    /// The sprite the error is about, if any.
    pub fn sprite(&self) -> Option<&str> {
        match self {
            BuildError::Bake { sprite, .. } | BuildError::MissingImage { sprite, .. } => {
                Some(sprite)
            }
            BuildError::Save(_) => None,
        }
    }
}

/// Build options.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildOptions {
    /// Ignore any existing cache and bake everything
    pub force: bool,
}

/// Outcome of a build.
#[derive(Debug, Default)]
pub struct BuildReport {
    /// True when the cache was valid and bakes were replayed
    pub preloaded: bool,
    pub baked: usize,
    pub repaletted: usize,
    pub saved: bool,
    pub handles: BTreeMap<String, BakedSpriteHandle>,
    pub duration: Duration,
}

impl BuildReport {
    pub fn summary(&self) -> String {
        let mode = if self.preloaded { "replayed from cache" } else { "baked" };
        let mut line = format!(
            "{} sprites {}, {} repalettes in {:?}",
            self.baked, mode, self.repaletted, self.duration
        );
        if self.saved {
            line.push_str(", cache saved");
        }
        line
    }
}

/// Run a content build.
pub fn run_build<F: FileSystem>(
    db: &mut PalettedSpriteDatabase<F>,
    sheet: &SpriteSheet,
    options: BuildOptions,
) -> Result<BuildReport, BuildError> {
    let start = Instant::now();
    let mut report = BuildReport::default();

    if options.force {
        log::info!("forced rebuild, ignoring cache");
    } else {
        report.preloaded = db.load();
    }

    for sprite in sheet.sprites() {
        let request = sprite_request(sheet, sprite)?;
        let handle = db
            .add_sprite(&request)
            .map_err(|source| BuildError::Bake { sprite: sprite.name.clone(), source })?;
        log::debug!("{} -> {} page {} at {}", sprite.name, handle.bucket, handle.page, handle.rect);
        report.handles.insert(sprite.name.clone(), handle);
        report.baked += 1;
    }

    for repalette in sheet.repalettes() {
        let Some(sprite) = sheet.sprite(&repalette.sprite) else {
            continue;
        };
        let Some(&handle) = report.handles.get(&repalette.sprite) else {
            continue;
        };
        let request = sprite_request(sheet, sprite)?.with_defaults(&repalette.defaults);
        db.repalette_sprite(&handle, &request)
            .map_err(|source| BuildError::Bake { sprite: sprite.name.clone(), source })?;
        report.repaletted += 1;
    }

    if !report.preloaded {
        db.try_save().map_err(BuildError::Save)?;
        report.saved = true;
    }

    report.duration = start.elapsed();
    log::info!("{}", report.summary());
    Ok(report)
}

fn sprite_request<'a>(
    sheet: &'a SpriteSheet,
    sprite: &SpriteEntry,
) -> Result<SpritePaletteRequest<'a>, BuildError> {
    sheet.request(sprite).ok_or_else(|| BuildError::MissingImage {
        sprite: sprite.name.clone(),
        image: sprite.image.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{DatabaseSettings, DatabaseState};
    use crate::raster::Size;
    use image::{Rgba, RgbaImage};
    use std::path::Path;
    use tempfile::TempDir;

    const DEFS: &str = r##"{
        "palettes": {
            "tunic": {
                "groups": ["green", "red"],
                "mappings": [
                    { "color": "#F0F", "groups": {
                        "green": { "subtype": "other", "color": "#0F0" },
                        "red": { "subtype": "other", "color": "#F00" } } }
                ]
            }
        },
        "sprites": [
            { "name": "a", "image": "sheet.png", "rect": [0, 0, 4, 4], "palette": "tunic" },
            { "name": "b", "image": "sheet.png", "rect": [4, 0, 4, 4], "palette": "tunic",
              "groups": ["red"] }
        ],
        "repalettes": [
            { "sprite": "a", "defaults": { "other": "#00F" } }
        ]
    }"##;

    fn sheet() -> SpriteSheet {
        let mut image = RgbaImage::new(8, 4);
        for pixel in image.pixels_mut() {
            *pixel = Rgba([255, 0, 255, 255]);
        }
        let dir = TempDir::new().unwrap();
        image.save(dir.path().join("sheet.png")).unwrap();
        SpriteSheet::parse(DEFS, dir.path()).unwrap()
    }

    fn settings(dir: &Path) -> DatabaseSettings {
        DatabaseSettings {
            cache_file: dir.join("palettes.cache"),
            content_dir: dir.join("content"),
            ..DatabaseSettings::default()
        }
    }

    #[test]
    fn test_build_bakes_and_saves() {
        let temp = TempDir::new().unwrap();
        let mut db = PalettedSpriteDatabase::new(settings(temp.path()));

        let report = run_build(&mut db, &sheet(), BuildOptions::default()).unwrap();
        assert!(!report.preloaded);
        assert_eq!(report.baked, 2);
        assert_eq!(report.repaletted, 1);
        assert!(report.saved);
        assert_eq!(db.state(), DatabaseState::Saved);

        let a = db.handle_image(&report.handles["a"]).unwrap();
        assert_eq!(a.get_pixel(0, 0), &Rgba([0, 0, 255, 255]));
        let b = db.handle_image(&report.handles["b"]).unwrap();
        assert_eq!(b.get_pixel(0, 0), &Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn test_second_build_replays_cache() {
        let temp = TempDir::new().unwrap();
        let sheet = sheet();

        let mut first = PalettedSpriteDatabase::new(settings(temp.path()));
        let baked = run_build(&mut first, &sheet, BuildOptions::default()).unwrap();

        let mut second = PalettedSpriteDatabase::new(settings(temp.path()));
        let replayed = run_build(&mut second, &sheet, BuildOptions::default()).unwrap();
        assert!(replayed.preloaded);
        assert!(!replayed.saved);
        assert_eq!(replayed.handles, baked.handles);
        assert_eq!(
            second.handle_image(&replayed.handles["a"]),
            first.handle_image(&baked.handles["a"])
        );
    }

    #[test]
    fn test_forced_build_ignores_cache() {
        let temp = TempDir::new().unwrap();
        let sheet = sheet();
        run_build(&mut PalettedSpriteDatabase::new(settings(temp.path())), &sheet, BuildOptions::default())
            .unwrap();

        let mut db = PalettedSpriteDatabase::new(settings(temp.path()));
        let report = run_build(&mut db, &sheet, BuildOptions { force: true }).unwrap();
        assert!(!report.preloaded);
        assert!(report.saved);
        assert_eq!(db.bucket(Size::new(4, 4)).unwrap().sprite_count(), 2);
    }

    #[test]
    fn test_bake_error_names_sprite() {
        let temp = TempDir::new().unwrap();
        let mut sheet = sheet();
        let mut image = RgbaImage::new(8, 4);
        image.put_pixel(5, 1, Rgba([1, 2, 3, 255]));
        sheet.insert_image("sheet.png", image);

        let mut db = PalettedSpriteDatabase::new(settings(temp.path()));
        let err = run_build(&mut db, &sheet, BuildOptions::default()).unwrap_err();
        assert_eq!(err.sprite(), Some("b"));
        assert!(err.to_string().starts_with("b: "), "{}", err);
        assert!(err.to_string().contains("#010203FF"), "{}", err);
    }
}
