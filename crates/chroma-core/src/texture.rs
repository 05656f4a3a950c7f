// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Defines data structures related to GPU texture resources and decoded
//! CPU-side pixel data.

/// An opaque handle to a GPU-resident texture resource.
///
/// Handles are issued by a [`TextureBackend`](crate::TextureBackend) and stay
/// valid until passed to `delete_texture`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub usize);

/// Defines the filtering mode for texture magnification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterMode {
    /// Point sampling. Returns the value of the nearest texel.
    Nearest,
    /// Linear interpolation. Returns a weighted average of the four nearest texels.
    Linear,
}

/// Defines the filtering mode for texture minification, including the mipmap
/// selection strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MinFilterMode {
    /// Nearest texel of the base level, no mipmapping.
    Nearest,
    /// Linear interpolation on the base level, no mipmapping.
    Linear,
    /// Nearest texel of the nearest mipmap level.
    NearestMipmapNearest,
    /// Linear interpolation on the nearest mipmap level.
    LinearMipmapNearest,
    /// Nearest texel, linearly blended between the two nearest mipmap levels.
    NearestMipmapLinear,
    /// Trilinear filtering: linear interpolation on, and between, the two
    /// nearest mipmap levels.
    LinearMipmapLinear,
}

/// The texel format of pixel data handed to the backend for upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 8-bit-per-channel RGBA. Decoders normalize every source image to this.
    Rgba8,
}

impl PixelFormat {
    /// The number of bytes a single texel occupies in this format.
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Rgba8 => 4,
        }
    }
}

/// A CPU-side representation of a decoded image, ready to be uploaded to the
/// GPU.
///
/// Invariant: `pixels.len() == width * height * 4` (tightly packed RGBA8).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    /// The raw pixel data in tightly packed RGBA8 layout.
    pub pixels: Vec<u8>,
    /// The width of the image in pixels.
    pub width: u32,
    /// The height of the image in pixels.
    pub height: u32,
}

impl DecodedImage {
    /// The size in bytes of one row of pixels.
    pub fn row_size(&self) -> usize {
        self.width as usize * PixelFormat::Rgba8.bytes_per_pixel()
    }

    /// Whether the pixel buffer length matches the declared dimensions.
    pub fn is_well_formed(&self) -> bool {
        self.pixels.len() == self.row_size() * self.height as usize
    }

    /// Scales the color channels of every texel by its alpha channel.
    ///
    /// This is the software equivalent of the premultiply-on-upload mode a
    /// GPU backend may offer, useful for backends that lack such a mode.
    pub fn premultiply_alpha(&mut self) {
        let texels: &mut [[u8; 4]] = bytemuck::cast_slice_mut(&mut self.pixels);
        for texel in texels.iter_mut() {
            let alpha = texel[3] as u16;
            texel[0] = ((texel[0] as u16 * alpha) / 255) as u8;
            texel[1] = ((texel[1] as u16 * alpha) / 255) as u8;
            texel[2] = ((texel[2] as u16 * alpha) / 255) as u8;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_size_uses_four_bytes_per_pixel() {
        let image = DecodedImage {
            pixels: vec![0; 3 * 2 * 4],
            width: 3,
            height: 2,
        };
        assert_eq!(image.row_size(), 12);
        assert!(image.is_well_formed());
    }

    #[test]
    fn short_pixel_buffer_is_not_well_formed() {
        let image = DecodedImage {
            pixels: vec![0; 7],
            width: 2,
            height: 1,
        };
        assert!(!image.is_well_formed());
    }

    #[test]
    fn premultiply_scales_color_by_alpha() {
        let mut image = DecodedImage {
            pixels: vec![255, 128, 0, 128, 255, 255, 255, 0],
            width: 2,
            height: 1,
        };
        image.premultiply_alpha();
        // 255 * 128 / 255 = 128, 128 * 128 / 255 = 64 (floor).
        assert_eq!(&image.pixels[0..4], &[128, 64, 0, 128]);
        // Fully transparent texels collapse to black.
        assert_eq!(&image.pixels[4..8], &[0, 0, 0, 0]);
    }

    #[test]
    fn premultiply_is_identity_for_opaque_texels() {
        let mut image = DecodedImage {
            pixels: vec![12, 34, 56, 255],
            width: 1,
            height: 1,
        };
        image.premultiply_alpha();
        assert_eq!(image.pixels, vec![12, 34, 56, 255]);
    }
}
