use image::ImageFormat;

use crate::error::StepError;

/// One decoded screenshot at a point in time. Immutable RGBA pixel grid;
/// owned by the call that captured it and discarded after use.
#[derive(Clone)]
pub struct Frame {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

impl Frame {
    pub fn from_png(bytes: &[u8]) -> Result<Self, StepError> {
        let img = image::load_from_memory_with_format(bytes, ImageFormat::Png)
            .map_err(|e| StepError::action(format!("png decode failed: {e}")))?
            .to_rgba8();
        let (width, height) = (img.width(), img.height());
        Ok(Frame {
            width,
            height,
            rgba: img.into_raw(),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// RGB channels at (x, y), or `None` when the coordinate falls outside
    /// the frame. Out-of-bounds samples never count toward a rule's total.
    pub fn pixel(&self, x: i32, y: i32) -> Option<[u8; 3]> {
        if x < 0 || y < 0 || x as u32 >= self.width || y as u32 >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * 4;
        Some([self.rgba[idx], self.rgba[idx + 1], self.rgba[idx + 2]])
    }

    pub fn to_jpeg(&self, quality: u8) -> Result<Vec<u8>, StepError> {
        let mut buf = Vec::new();
        let encoder = jpeg_encoder::Encoder::new(&mut buf, quality);
        encoder
            .encode(
                &self.rgba,
                self.width as u16,
                self.height as u16,
                jpeg_encoder::ColorType::Rgba,
            )
            .map_err(|e| StepError::action(format!("jpeg encode failed: {e}")))?;
        Ok(buf)
    }
}

#[cfg(test)]
impl Frame {
    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let mut rgba = Vec::with_capacity((width * height * 4) as usize);
        for _ in 0..width * height {
            rgba.extend_from_slice(&[rgb[0], rgb[1], rgb[2], 255]);
        }
        Frame {
            width,
            height,
            rgba,
        }
    }

    pub fn paint(&mut self, x0: i32, y0: i32, w: i32, h: i32, rgb: [u8; 3]) {
        for y in y0..y0 + h {
            for x in x0..x0 + w {
                if x < 0 || y < 0 || x as u32 >= self.width || y as u32 >= self.height {
                    continue;
                }
                let idx = (y as usize * self.width as usize + x as usize) * 4;
                self.rgba[idx] = rgb[0];
                self.rgba[idx + 1] = rgb[1];
                self.rgba[idx + 2] = rgb[2];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_out_of_bounds_is_none() {
        let frame = Frame::solid(4, 4, [1, 2, 3]);
        assert_eq!(frame.pixel(0, 0), Some([1, 2, 3]));
        assert_eq!(frame.pixel(3, 3), Some([1, 2, 3]));
        assert_eq!(frame.pixel(-1, 0), None);
        assert_eq!(frame.pixel(0, 4), None);
        assert_eq!(frame.pixel(4, 0), None);
    }

    #[test]
    fn paint_overwrites_region() {
        let mut frame = Frame::solid(8, 8, [0, 0, 0]);
        frame.paint(2, 2, 3, 3, [200, 100, 50]);
        assert_eq!(frame.pixel(2, 2), Some([200, 100, 50]));
        assert_eq!(frame.pixel(4, 4), Some([200, 100, 50]));
        assert_eq!(frame.pixel(5, 5), Some([0, 0, 0]));
    }
}
