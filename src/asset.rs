// asset.rs — where city panoramas come from, and getting them off the UI thread

use image::io::Reader as ImageReader;
use image::{GenericImage, Rgba, RgbaImage};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread;

pub const PANORAMA_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

/// Anything that can turn a city name into an equirectangular image.
/// `None` means there is nothing usable for that city.
pub trait PanoramaSource: Send + Sync {
    fn fetch(&self, city: &str) -> Option<RgbaImage>;
}

/// Identifies one fetch. Results carrying an outdated generation are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub generation: u64,
    pub city: String,
}

/// "New York" -> "new-york"
pub fn city_slug(city: &str) -> String {
    let mut slug = String::with_capacity(city.len());
    for c in city.trim().chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// Panoramas stored as `<dir>/<city-slug>.<ext>`.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    dir: PathBuf,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The file backing `city`. Stems are compared by slug and extensions
    /// without regard to case, so whatever `list_cities` shows resolves here.
    pub fn path_for(&self, city: &str) -> Option<PathBuf> {
        let slug = city_slug(city);
        if slug.is_empty() {
            return None;
        }
        self.panorama_files()
            .into_iter()
            .filter(|(stem, _, _)| city_slug(stem) == slug)
            .min_by_key(|(_, rank, path)| (*rank, path.clone()))
            .map(|(_, _, path)| path)
    }

    /// City names derived from the image files in the directory, sorted.
    pub fn list_cities(&self) -> Vec<String> {
        let mut cities: Vec<String> = self
            .panorama_files()
            .iter()
            .map(|(stem, _, _)| title_from_slug(&city_slug(stem)))
            .filter(|name| !name.is_empty())
            .collect();
        cities.sort();
        cities.dedup();
        cities
    }

    /// `(stem, extension rank, path)` for every file with a known image extension.
    fn panorama_files(&self) -> Vec<(String, usize, PathBuf)> {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            log::warn!("cannot read panorama directory {}", self.dir.display());
            return Vec::new();
        };

        entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .filter_map(|p| {
                let ext = p.extension()?.to_str()?.to_ascii_lowercase();
                let rank = PANORAMA_EXTENSIONS.iter().position(|known| *known == ext)?;
                let stem = p.file_stem()?.to_str()?.to_string();
                Some((stem, rank, p))
            })
            .collect()
    }
}

fn title_from_slug(slug: &str) -> String {
    slug.split(['-', '_'])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

impl PanoramaSource for DirectorySource {
    fn fetch(&self, city: &str) -> Option<RgbaImage> {
        let Some(path) = self.path_for(city) else {
            log::warn!("no panorama for '{city}' in {}", self.dir.display());
            return None;
        };

        log::info!("decoding panorama {}", path.display());
        match decode_image(&path) {
            Ok(img) => {
                let (w, h) = img.dimensions();
                if w == 0 || h == 0 {
                    log::warn!("panorama {} is empty", path.display());
                    return None;
                }
                log::debug!("panorama {} decoded at {w}x{h}", path.display());
                Some(img)
            }
            Err(e) => {
                log::warn!("failed to decode {}: {e}", path.display());
                None
            }
        }
    }
}

fn decode_image(path: &Path) -> crate::error::ViewerResult<RgbaImage> {
    let reader = BufReader::new(File::open(path)?);
    let mut reader = ImageReader::new(reader).with_guessed_format()?;
    reader.no_limits();
    Ok(reader.decode()?.to_rgba8())
}

pub type FetchResult = (FetchTicket, Option<RgbaImage>);

/// Runs fetches on worker threads; results are collected with `try_recv`
/// from the event loop.
pub struct AssetLoader {
    source: Arc<dyn PanoramaSource>,
    tx: Sender<FetchResult>,
    rx: Receiver<FetchResult>,
}

impl AssetLoader {
    pub fn new(source: Arc<dyn PanoramaSource>) -> Self {
        let (tx, rx) = channel();
        Self { source, tx, rx }
    }

    pub fn request(&self, ticket: FetchTicket) {
        let source = Arc::clone(&self.source);
        let tx = self.tx.clone();
        thread::spawn(move || {
            log::debug!("fetching panorama for '{}' (generation {})", ticket.city, ticket.generation);
            let image = source.fetch(&ticket.city);
            if tx.send((ticket, image)).is_err() {
                log::warn!("viewer went away before the panorama arrived");
            }
        });
    }

    pub fn try_recv(&self) -> Option<FetchResult> {
        self.rx.try_recv().ok()
    }
}

/// Fits a panorama to the GPU and to the 2:1 equirectangular layout.
///
/// Images larger than `max_dimension` on either side are scaled down. Images
/// shorter than half their width are placed at the bottom of a black 2:1 canvas.
pub fn prepare_panorama(img: RgbaImage, max_dimension: u32) -> RgbaImage {
    let (src_w, src_h) = img.dimensions();

    let img = if src_w > max_dimension || src_h > max_dimension {
        let scale = max_dimension as f32 / src_w.max(src_h) as f32;
        let new_w = ((src_w as f32 * scale) as u32).max(1);
        let new_h = ((src_h as f32 * scale) as u32).max(1);
        log::info!(
            "panorama {src_w}x{src_h} exceeds GPU limit {max_dimension}, scaling to {new_w}x{new_h}"
        );
        image::imageops::resize(&img, new_w, new_h, image::imageops::FilterType::Lanczos3)
    } else {
        img
    };

    let (w, h) = img.dimensions();
    let target_h = w / 2;
    if target_h > 0 && h < target_h {
        let mut canvas = RgbaImage::from_pixel(w, target_h, Rgba([0, 0, 0, 255]));
        // Fits by construction: h < target_h and widths match.
        if canvas.copy_from(&img, 0, target_h - h).is_ok() {
            return canvas;
        }
    }
    img
}
