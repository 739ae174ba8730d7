//! Decoding, EXIF orientation correction and aspect-fit scaling of photos.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use fast_image_resize as fir;
use image::{ImageError, ImageReader, RgbaImage, imageops};
use tracing::debug;

use crate::error::Error;
use crate::processing::layout::fit_within;
use crate::render::compositor::{DisplayFrame, Frame};

/// Counter-clockwise rotation that makes a decoded buffer upright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    None,
    Ccw90,
    Ccw180,
    Ccw270,
}

impl Rotation {
    /// Map an EXIF orientation tag. Mirrored orientations are shown as stored.
    #[must_use]
    pub const fn from_exif(orientation: Option<u32>) -> Self {
        match orientation {
            Some(3) => Self::Ccw180,
            Some(6) => Self::Ccw270,
            Some(8) => Self::Ccw90,
            _ => Self::None,
        }
    }

    #[must_use]
    pub const fn degrees(self) -> u16 {
        match self {
            Self::None => 0,
            Self::Ccw90 => 90,
            Self::Ccw180 => 180,
            Self::Ccw270 => 270,
        }
    }

    fn apply(self, img: RgbaImage) -> RgbaImage {
        // imageops rotates clockwise
        match self {
            Self::None => img,
            Self::Ccw90 => imageops::rotate270(&img),
            Self::Ccw180 => imageops::rotate180(&img),
            Self::Ccw270 => imageops::rotate90(&img),
        }
    }
}

/// A decoded photo whose pixels are already upright.
#[derive(Debug, Clone)]
pub struct OrientedImage {
    pub path: PathBuf,
    pub rotation: Rotation,
    pub pixels: RgbaImage,
}

/// Decode `path` to RGBA8 and apply its EXIF orientation.
///
/// # Errors
/// Returns [`Error::Decode`] if the file cannot be opened or decoded.
pub fn prepare(path: &Path) -> Result<OrientedImage, Error> {
    let decode_err = |source: ImageError| Error::Decode {
        path: path.to_path_buf(),
        source,
    };
    let img = ImageReader::open(path)
        .map_err(|e| decode_err(ImageError::IoError(e)))?
        .with_guessed_format()
        .map_err(|e| decode_err(ImageError::IoError(e)))?
        .decode()
        .map_err(decode_err)?;

    let rotation = Rotation::from_exif(read_orientation(path));
    let pixels = rotation.apply(img.to_rgba8());
    debug!(
        path = %path.display(),
        width = pixels.width(),
        height = pixels.height(),
        rotation = rotation.degrees(),
        "decoded photo"
    );
    Ok(OrientedImage {
        path: path.to_path_buf(),
        rotation,
        pixels,
    })
}

fn read_orientation(path: &Path) -> Option<u32> {
    let file = File::open(path).ok()?;
    let mut buf = BufReader::new(file);
    let exif = exif::Reader::new().read_from_container(&mut buf).ok()?;
    exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?
        .value
        .get_uint(0)
}

/// Scale `image` to fit a `surface_w` x `surface_h` surface and center it.
///
/// # Errors
/// Returns [`Error::Resize`] if the resampler rejects the buffers.
pub fn fit(image: &OrientedImage, surface_w: u32, surface_h: u32) -> Result<DisplayFrame, Error> {
    let geometry = fit_within(
        image.pixels.width(),
        image.pixels.height(),
        surface_w,
        surface_h,
    );
    let resized = resize_rgba(&image.pixels, geometry.width, geometry.height).map_err(|reason| {
        Error::Resize {
            path: image.path.clone(),
            reason,
        }
    })?;
    Ok(DisplayFrame {
        frame: Frame::from_rgba(&resized),
        x: geometry.x,
        y: geometry.y,
    })
}

fn resize_rgba(source: &RgbaImage, target_w: u32, target_h: u32) -> Result<RgbaImage, String> {
    if source.width() == target_w && source.height() == target_h {
        return Ok(source.clone());
    }

    let src_view = fir::images::ImageRef::new(
        source.width(),
        source.height(),
        source.as_raw(),
        fir::PixelType::U8x4,
    )
    .map_err(|err| format!("invalid source buffer: {err}"))?;
    let mut dst_image = fir::images::Image::new(target_w, target_h, fir::PixelType::U8x4);
    let options = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Convolution(fir::FilterType::CatmullRom));
    let mut resizer = fir::Resizer::new();
    resizer
        .resize(&src_view, &mut dst_image, Some(&options))
        .map_err(|err| err.to_string())?;
    RgbaImage::from_raw(target_w, target_h, dst_image.into_vec())
        .ok_or_else(|| "resized buffer has unexpected length".to_string())
}
