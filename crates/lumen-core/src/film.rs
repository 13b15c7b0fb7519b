use crate::comp::Registry;
use crate::error::LmError;
use crate::json::{self, Json};
use crate::math::Vec3;
use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use lumen_model::FilmBuffer;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

pub trait Film: Send + Sync {
    fn construct(&mut self, prop: &Json) -> Result<()>;

    fn size(&self) -> (u32, u32);

    fn aspect_ratio(&self) -> f32 {
        let (w, h) = self.size();
        w as f32 / h as f32
    }

    /// Writes one pixel. `y = 0` is the bottom row. Safe to call from many
    /// threads as long as each pixel has one writer.
    fn set_pixel(&self, x: u32, y: u32, color: Vec3);

    fn clear(&self);

    fn buffer(&self) -> FilmBuffer;

    fn save(&self, path: &Path) -> Result<()>;
}

pub fn register(registry: &mut Registry) {
    registry.register::<dyn Film, _>("film::bitmap", || Box::new(BitmapFilm::default()));
}

/// RGB float film. Channels are stored as `f32` bits in atomics so the
/// renderer can fill disjoint pixels concurrently through `&self`.
#[derive(Default)]
pub struct BitmapFilm {
    w: u32,
    h: u32,
    data: Vec<AtomicU32>,
}

impl Film for BitmapFilm {
    fn construct(&mut self, prop: &Json) -> Result<()> {
        let w: u32 = json::value(prop, "w")?;
        let h: u32 = json::value(prop, "h")?;
        if w == 0 || h == 0 {
            return Err(LmError::InvalidArgument(format!("film size must be positive, got {w}x{h}")).into());
        }
        self.w = w;
        self.h = h;
        self.data = (0..(w as usize * h as usize * 3))
            .map(|_| AtomicU32::new(0))
            .collect();
        Ok(())
    }

    fn size(&self) -> (u32, u32) {
        (self.w, self.h)
    }

    fn set_pixel(&self, x: u32, y: u32, color: Vec3) {
        let i = (y as usize * self.w as usize + x as usize) * 3;
        self.data[i].store(color.x.to_bits(), Ordering::Relaxed);
        self.data[i + 1].store(color.y.to_bits(), Ordering::Relaxed);
        self.data[i + 2].store(color.z.to_bits(), Ordering::Relaxed);
    }

    fn clear(&self) {
        for v in &self.data {
            v.store(0.0f32.to_bits(), Ordering::Relaxed);
        }
    }

    fn buffer(&self) -> FilmBuffer {
        FilmBuffer {
            w: self.w,
            h: self.h,
            data: self
                .data
                .iter()
                .map(|v| f32::from_bits(v.load(Ordering::Relaxed)))
                .collect(),
        }
    }

    fn save(&self, path: &Path) -> Result<()> {
        let buffer = self.buffer();
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());
        match ext.as_deref() {
            Some("pfm") => write_pfm(path, &buffer),
            Some("png") => write_png(path, &to_display_image(&buffer)).map_err(|err| {
                LmError::Io {
                    path: path.display().to_string(),
                    message: err.to_string(),
                }
                .into()
            }),
            _ => Err(LmError::Unsupported(format!("film output format {path:?}")).into()),
        }
    }
}

/// Writes a little-endian PFM. PFM rows run bottom-to-top, like the buffer.
pub fn write_pfm(path: &Path, buffer: &FilmBuffer) -> Result<()> {
    let mut bytes = format!("PF\n{} {}\n-1\n", buffer.w, buffer.h).into_bytes();
    bytes.reserve(buffer.data.len() * 4);
    for v in &buffer.data {
        bytes.extend_from_slice(&v.to_le_bytes());
    }

    let mut file = fs::File::create(path).map_err(|err| LmError::Io {
        path: path.display().to_string(),
        message: err.to_string(),
    })?;
    file.write_all(&bytes)
        .with_context(|| format!("failed to write {path:?}"))?;
    Ok(())
}

pub fn write_png(path: &Path, image: &RgbImage) -> Result<(), image::ImageError> {
    image.save(path)
}

/// Converts a linear film buffer to a viewable 8-bit image: rows flipped to
/// top-down, gamma 1/2.2, clamped to [0, 1].
pub fn to_display_image(buffer: &FilmBuffer) -> RgbImage {
    let mut image = RgbImage::new(buffer.w, buffer.h);
    for y in 0..buffer.h {
        for x in 0..buffer.w {
            let [r, g, b] = buffer.pixel(x, y);
            image.put_pixel(x, buffer.h - 1 - y, to_rgb(Vec3::new(r, g, b)));
        }
    }
    image
}

fn to_rgb(color: Vec3) -> Rgb<u8> {
    let encode = |v: f32| (v.max(0.0).powf(1.0 / 2.2).min(1.0) * 255.0).round() as u8;
    Rgb([encode(color.x), encode(color.y), encode(color.z)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn film(w: u32, h: u32) -> BitmapFilm {
        let mut film = BitmapFilm::default();
        film.construct(&json!({"w": w, "h": h})).unwrap();
        film
    }

    #[test]
    fn buffer_has_three_channels_per_pixel() {
        let film = film(4, 3);
        film.set_pixel(3, 2, Vec3::new(0.25, 0.5, 0.75));
        let buffer = film.buffer();
        assert_eq!(buffer.data.len(), 4 * 3 * 3);
        assert_eq!(buffer.pixel(3, 2), [0.25, 0.5, 0.75]);
        assert_eq!(film.aspect_ratio(), 4.0 / 3.0);

        film.clear();
        assert!(film.buffer().data.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn zero_size_is_rejected() {
        let mut film = BitmapFilm::default();
        assert!(film.construct(&json!({"w": 0, "h": 4})).is_err());
        assert!(film.construct(&json!({"w": 4})).is_err());
    }

    #[test]
    fn display_image_flips_rows_and_applies_gamma() {
        let film = film(1, 2);
        film.set_pixel(0, 0, Vec3::new(1.0, 0.0, 4.0));
        let image = to_display_image(&film.buffer());
        assert_eq!(image.get_pixel(0, 1), &Rgb([255, 0, 255]));
        assert_eq!(image.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(to_rgb(Vec3::splat(0.5)), Rgb([186, 186, 186]));
    }

    #[test]
    fn saves_pfm_and_rejects_unknown_extensions() {
        let dir = std::env::temp_dir().join(format!("lumen-film-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();

        let film = film(2, 1);
        film.set_pixel(1, 0, Vec3::new(1.0, 2.0, 3.0));
        let path = dir.join("out.pfm");
        film.save(&path).unwrap();

        let bytes = fs::read(&path).unwrap();
        let header = b"PF\n2 1\n-1\n";
        assert_eq!(&bytes[..header.len()], header);
        assert_eq!(bytes.len(), header.len() + 6 * 4);
        let last = &bytes[bytes.len() - 4..];
        assert_eq!(f32::from_le_bytes([last[0], last[1], last[2], last[3]]), 3.0);

        assert!(film.save(&dir.join("out.exr")).is_err());
        let _ = fs::remove_dir_all(&dir);
    }
}
