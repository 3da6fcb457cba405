//! Grid compositor for multi-image posts
//!
//! Consecutive images of a post are merged into grid pages of at most
//! `width` images each. Anything that does not decode as an image (videos)
//! breaks the current run and is passed through untouched, keeping its
//! position in the album.
//!
//! ```text
//! [img, img, video, img]  (width = 2)
//!   -> [grid(img, img), video, img]
//! ```

use std::path::{Path, PathBuf};

use image::{DynamicImage, GenericImageView, ImageFormat, ImageReader, RgbaImage, imageops};
use tracing::debug;
use uuid::Uuid;

/// Extension of composed pages (lossless)
pub const EXPORT_EXTENSION: &str = "png";

/// Largest accepted gap between grid cells in pixels
pub const MAX_PADDING: u32 = 1000;

/// Largest composed canvas (in pixels) that will be allocated
pub const MAX_CANVAS_PIXELS: u64 = 1 << 28;

/// Compositor error type
#[derive(Debug, thiserror::Error)]
pub enum CompositeError {
    #[error("Nothing to compose: no input assets")]
    EmptyInput,

    #[error("Grid width must be at least 1")]
    InvalidWidth,

    #[error("Grid padding {0} exceeds the maximum")]
    InvalidPadding(u32),

    #[error("Composed canvas would be too large for {count} cells of {cell_w}x{cell_h}")]
    CanvasTooLarge { count: usize, cell_w: u32, cell_h: u32 },

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

/// Grid shape: images per row and padding between cells in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridLayout {
    width: u32,
    padding: u32,
}

impl GridLayout {
    pub fn new(width: u32, padding: u32) -> Result<Self, CompositeError> {
        if width == 0 {
            return Err(CompositeError::InvalidWidth);
        }
        if padding > MAX_PADDING {
            return Err(CompositeError::InvalidPadding(padding));
        }
        Ok(Self { width, padding })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn padding(&self) -> u32 {
        self.padding
    }
}

impl Default for GridLayout {
    fn default() -> Self {
        Self {
            width: 2,
            padding: 20,
        }
    }
}

/// One output page, in presentation order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Page {
    /// A lone image, passed through unchanged
    Image(PathBuf),
    /// A non-image asset, passed through unchanged
    Video(PathBuf),
    /// A composed grid written to the output directory
    Grid { path: PathBuf, cells: usize },
}

impl Page {
    pub fn path(&self) -> &Path {
        match self {
            Page::Image(path) | Page::Video(path) => path,
            Page::Grid { path, .. } => path,
        }
    }

    pub fn into_path(self) -> PathBuf {
        match self {
            Page::Image(path) | Page::Video(path) => path,
            Page::Grid { path, .. } => path,
        }
    }
}

/// Merges runs of images into grid pages
#[derive(Debug, Clone, Copy, Default)]
pub struct Compositor {
    layout: GridLayout,
}

impl Compositor {
    pub fn new(layout: GridLayout) -> Self {
        Self { layout }
    }

    /// Compose downloaded assets into pages, writing grids into `out_dir`
    pub fn compose(&self, assets: &[PathBuf], out_dir: &Path) -> Result<Vec<Page>, CompositeError> {
        if assets.is_empty() {
            return Err(CompositeError::EmptyInput);
        }

        let mut pages = Vec::with_capacity(assets.len());
        let mut run: Vec<(PathBuf, DynamicImage)> = Vec::new();

        for path in assets {
            match decode(path) {
                Some(image) => run.push((path.clone(), image)),
                None => {
                    self.flush(&mut run, out_dir, &mut pages)?;
                    pages.push(Page::Video(path.clone()));
                }
            }
        }
        self.flush(&mut run, out_dir, &mut pages)?;

        debug!(
            "Composed {} assets into {} pages",
            assets.len(),
            pages.len()
        );
        Ok(pages)
    }

    /// Emit pages for the pending image run and clear it
    fn flush(
        &self,
        run: &mut Vec<(PathBuf, DynamicImage)>,
        out_dir: &Path,
        pages: &mut Vec<Page>,
    ) -> Result<(), CompositeError> {
        for chunk in run.chunks(self.layout.width as usize) {
            if let [(path, _)] = chunk {
                pages.push(Page::Image(path.clone()));
                continue;
            }

            let images: Vec<&DynamicImage> = chunk.iter().map(|(_, image)| image).collect();
            let canvas = combine_grid(&images, self.layout)?;

            let path = out_dir.join(format!("grid-{}.{}", Uuid::new_v4(), EXPORT_EXTENSION));
            canvas.save_with_format(&path, ImageFormat::Png)?;
            pages.push(Page::Grid {
                path,
                cells: chunk.len(),
            });
        }
        run.clear();
        Ok(())
    }
}

/// Decode an asset, `None` when it is not a readable image
fn decode(path: &Path) -> Option<DynamicImage> {
    let decoded = ImageReader::open(path)
        .and_then(|reader| reader.with_guessed_format())
        .map_err(image::ImageError::IoError)
        .and_then(|reader| reader.decode());

    match decoded {
        Ok(image) => Some(image),
        Err(e) => {
            debug!("Treating {:?} as non-image: {}", path, e);
            None
        }
    }
}

/// Lay images out left-to-right, top-to-bottom on a transparent canvas
///
/// The first image fixes the cell size. Differently sized images are scaled
/// down (never up) to fit the cell and centered in it.
pub fn combine_grid(images: &[&DynamicImage], layout: GridLayout) -> Result<RgbaImage, CompositeError> {
    let first = images.first().ok_or(CompositeError::EmptyInput)?;
    let (cell_w, cell_h) = first.dimensions();
    let pad = layout.padding;

    let (canvas_w, canvas_h) = canvas_size((cell_w, cell_h), images.len(), layout)?;
    let mut canvas = RgbaImage::new(canvas_w, canvas_h);

    for (index, image) in images.iter().enumerate() {
        let index = index as u32;
        let mut x = (index % layout.width) * (cell_w + pad);
        let mut y = (index / layout.width) * (cell_h + pad);

        let cell = if image.dimensions() == (cell_w, cell_h) {
            image.to_rgba8()
        } else {
            let (w, h) = fit_within(image.dimensions(), (cell_w, cell_h));
            x += (cell_w - w) / 2;
            y += (cell_h - h) / 2;
            if (w, h) == image.dimensions() {
                image.to_rgba8()
            } else {
                imageops::resize(*image, w, h, imageops::FilterType::CatmullRom)
            }
        };

        imageops::replace(&mut canvas, &cell, i64::from(x), i64::from(y));
    }

    Ok(canvas)
}

/// Canvas size for `count` cells; every cell offset fits below it
fn canvas_size(
    (cell_w, cell_h): (u32, u32),
    count: usize,
    layout: GridLayout,
) -> Result<(u32, u32), CompositeError> {
    let too_large = || CompositeError::CanvasTooLarge {
        count,
        cell_w,
        cell_h,
    };

    let count = u32::try_from(count).map_err(|_| too_large())?;
    let cols = count.min(layout.width);
    let rows = count.div_ceil(layout.width);
    let extent = |cells: u32, cell: u32| {
        cells
            .checked_mul(cell.checked_add(layout.padding)?)?
            .checked_sub(layout.padding)
    };

    let (w, h) = extent(cols, cell_w)
        .zip(extent(rows, cell_h))
        .ok_or_else(too_large)?;
    if u64::from(w) * u64::from(h) > MAX_CANVAS_PIXELS {
        return Err(too_large());
    }
    Ok((w, h))
}

/// Size scaled down to fit inside the bounds, keeping aspect ratio
fn fit_within((w, h): (u32, u32), (max_w, max_h): (u32, u32)) -> (u32, u32) {
    if w <= max_w && h <= max_h {
        return (w, h);
    }

    let (w64, h64, max_w64, max_h64) = (w as u64, h as u64, max_w as u64, max_h as u64);
    if w64 * max_h64 >= h64 * max_w64 {
        let scaled_h = (h64 * max_w64 + w64 / 2) / w64;
        (max_w, scaled_h.clamp(1, max_h64) as u32)
    } else {
        let scaled_w = (w64 * max_h64 + h64 / 2) / h64;
        (scaled_w.clamp(1, max_w64) as u32, max_h)
    }
}
