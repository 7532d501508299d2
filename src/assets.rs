//! Image registry
//!
//! Images are loaded (probed, really - the engine never decodes pixels) once
//! at startup from a directory of PNGs and referenced by `ImageId` afterward.
//! A missing or malformed expected asset is a loud startup error, not a
//! silent debug assertion.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// Stable handle into the [`AssetLibrary`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageId(pub u16);

/// Metadata for one registered image
#[derive(Debug, Clone)]
pub struct ImageInfo {
    /// File stem ("bomb" for bomb.png)
    pub name: String,
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

/// Startup asset failures
#[derive(Debug)]
pub enum AssetError {
    MissingDir(PathBuf),
    /// An asset the game expects by name is not in the library
    Missing(String),
    Unreadable(PathBuf, io::Error),
    /// Not a PNG, or truncated before the header
    Invalid(PathBuf),
}

impl fmt::Display for AssetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetError::MissingDir(p) => write!(f, "asset directory not found: {}", p.display()),
            AssetError::Missing(name) => write!(f, "missing expected asset: {name}"),
            AssetError::Unreadable(p, e) => write!(f, "cannot read {}: {}", p.display(), e),
            AssetError::Invalid(p) => write!(f, "not a valid PNG: {}", p.display()),
        }
    }
}

impl std::error::Error for AssetError {}

/// All images known to the engine, keyed by file stem
#[derive(Debug, Default)]
pub struct AssetLibrary {
    images: Vec<ImageInfo>,
    by_name: HashMap<String, ImageId>,
}

impl AssetLibrary {
    /// An empty library; entities without images fall back to ellipse draws
    pub fn empty() -> Self {
        Self::default()
    }

    /// Scan a directory for PNGs and register each by file stem.
    ///
    /// Only the PNG header is read - width and height come from the IHDR
    /// chunk, pixel data is the host's problem.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self, AssetError> {
        let dir = dir.as_ref();
        let entries =
            fs::read_dir(dir).map_err(|_| AssetError::MissingDir(dir.to_path_buf()))?;

        let mut lib = Self::empty();
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "png"))
            .collect();
        // directory order is filesystem-dependent; sort for a stable registry
        paths.sort();

        for path in paths {
            let (width, height) = probe_png(&path)?;
            lib.register(&path, width, height);
        }

        log::info!("loaded {} images from {}", lib.len(), dir.display());
        Ok(lib)
    }

    fn register(&mut self, path: &Path, width: u32, height: u32) -> ImageId {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let id = ImageId(self.images.len() as u16);
        self.by_name.insert(name.clone(), id);
        self.images.push(ImageInfo {
            name,
            path: path.to_path_buf(),
            width,
            height,
        });
        id
    }

    /// Look up an image by file stem
    pub fn get(&self, name: &str) -> Option<ImageId> {
        self.by_name.get(name).copied()
    }

    /// Like [`get`](Self::get), but a loud error when the asset is expected
    pub fn require(&self, name: &str) -> Result<ImageId, AssetError> {
        self.get(name)
            .ok_or_else(|| AssetError::Missing(name.to_owned()))
    }

    pub fn info(&self, id: ImageId) -> Option<&ImageInfo> {
        self.images.get(id.0 as usize)
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// (id, width, height) triples in registry order
    pub fn iter_sized(&self) -> impl Iterator<Item = (ImageId, f32, f32)> + '_ {
        self.images
            .iter()
            .enumerate()
            .map(|(i, info)| (ImageId(i as u16), info.width as f32, info.height as f32))
    }
}

/// The sprites the simulation spawns with, resolved once at startup.
///
/// `None` entries mean "draw as a colored ellipse at the fallback size" -
/// the engine runs headless without any assets on disk.
#[derive(Debug, Clone, Default)]
pub struct SpriteTable {
    /// Generic hazard icons; spawns pick one at random
    pub icons: Vec<(ImageId, f32, f32)>,
    /// Gravity body images, cycled in order
    pub gravity_bodies: Vec<(ImageId, f32, f32)>,
    pub bullet: Option<(ImageId, f32, f32)>,
    pub chaser: Option<(ImageId, f32, f32)>,
    pub flat_earth: Option<(ImageId, f32, f32)>,
    pub black_hole: Option<(ImageId, f32, f32)>,
    /// Indexed by hostage kind: soldier, spy, captain
    pub hostages: [Option<(ImageId, f32, f32)>; 3],
}

impl SpriteTable {
    /// Resolve the well-known sprite names against a loaded library
    pub fn from_library(lib: &AssetLibrary) -> Self {
        let sized = |name: &str| {
            lib.get(name).and_then(|id| {
                lib.info(id)
                    .map(|i| (id, i.width as f32, i.height as f32))
            })
        };
        Self {
            icons: lib.iter_sized().collect(),
            gravity_bodies: lib.iter_sized().collect(),
            bullet: sized("bang-12"),
            chaser: sized("bomb"),
            flat_earth: sized("vibe-meter-glow"),
            black_hole: sized("death-star-64"),
            hostages: [
                sized("standing-man-32"),
                sized("spy-32"),
                sized("cylon-head-24"),
            ],
        }
    }
}

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1A, b'\n'];

/// Read a PNG's dimensions from the IHDR chunk (first 24 bytes of the file)
fn probe_png(path: &Path) -> Result<(u32, u32), AssetError> {
    let mut file =
        fs::File::open(path).map_err(|e| AssetError::Unreadable(path.to_path_buf(), e))?;
    let mut header = [0u8; 24];
    file.read_exact(&mut header)
        .map_err(|_| AssetError::Invalid(path.to_path_buf()))?;

    if header[..8] != PNG_SIGNATURE || &header[12..16] != b"IHDR" {
        return Err(AssetError::Invalid(path.to_path_buf()));
    }

    let width = u32::from_be_bytes([header[16], header[17], header[18], header[19]]);
    let height = u32::from_be_bytes([header[20], header[21], header[22], header[23]]);
    if width == 0 || height == 0 {
        return Err(AssetError::Invalid(path.to_path_buf()));
    }
    Ok((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_png(dir: &Path, name: &str, w: u32, h: u32) {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&PNG_SIGNATURE);
        bytes.extend_from_slice(&13u32.to_be_bytes()); // IHDR length
        bytes.extend_from_slice(b"IHDR");
        bytes.extend_from_slice(&w.to_be_bytes());
        bytes.extend_from_slice(&h.to_be_bytes());
        bytes.extend_from_slice(&[8, 6, 0, 0, 0]); // depth/type/etc
        let mut f = fs::File::create(dir.join(name)).unwrap();
        f.write_all(&bytes).unwrap();
    }

    #[test]
    fn test_load_dir_probes_dimensions() {
        let dir = std::env::temp_dir().join("space_rescue_asset_test");
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        write_png(&dir, "bomb.png", 24, 32);
        write_png(&dir, "soldier.png", 16, 16);

        let lib = AssetLibrary::load_dir(&dir).unwrap();
        assert_eq!(lib.len(), 2);
        let bomb = lib.get("bomb").unwrap();
        let info = lib.info(bomb).unwrap();
        assert_eq!((info.width, info.height), (24, 32));
        assert!(lib.get("missing").is_none());
    }

    #[test]
    fn test_missing_dir_is_loud() {
        let err = AssetLibrary::load_dir("/definitely/not/here").unwrap_err();
        assert!(matches!(err, AssetError::MissingDir(_)));
    }

    #[test]
    fn test_invalid_png_is_loud() {
        let dir = std::env::temp_dir().join("space_rescue_asset_bad");
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("junk.png"), b"not a png at all").unwrap();

        let err = AssetLibrary::load_dir(&dir).unwrap_err();
        assert!(matches!(err, AssetError::Invalid(_)));
    }
}
