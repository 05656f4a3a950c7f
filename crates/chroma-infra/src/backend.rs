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

//! A software texture backend for tools and tests.

use chroma_core::{
    BackendError, DecodedImage, FilterMode, MinFilterMode, PixelFormat, TextureBackend, TextureId,
};
use std::collections::HashMap;
use std::sync::Mutex;

/// The stored state of one headless texture.
#[derive(Debug, Default, Clone)]
struct HeadlessTexture {
    min_filter: Option<MinFilterMode>,
    mag_filter: Option<FilterMode>,
    pixels: Vec<u8>,
    width: u32,
    height: u32,
    mip_level_count: u32,
    premultiplied: bool,
}

#[derive(Debug, Default)]
struct HeadlessState {
    next_id: usize,
    textures: HashMap<TextureId, HeadlessTexture>,
    bound: Option<TextureId>,
    premultiply: bool,
}

/// A [`TextureBackend`] without a GPU.
///
/// Textures are plain pixel buffers in host memory. The backend enforces the
/// contract a GL-style implementation would: operations target live handles,
/// a texture must be bound while it is configured or filled, and the
/// premultiply flag behaves like a sticky pixel-store parameter. When that
/// flag is set, uploads premultiply the stored pixels in software.
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    state: Mutex<HeadlessState>,
}

impl HeadlessBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of textures currently alive.
    pub fn live_textures(&self) -> usize {
        self.state.lock().unwrap().textures.len()
    }

    /// The texture bound at the moment, if any.
    pub fn bound_texture(&self) -> Option<TextureId> {
        self.state.lock().unwrap().bound
    }

    /// The uploaded dimensions of a live texture.
    pub fn texture_size(&self, texture: TextureId) -> Option<(u32, u32)> {
        let state = self.state.lock().unwrap();
        state.textures.get(&texture).map(|t| (t.width, t.height))
    }

    /// A copy of the stored pixels of a live texture.
    pub fn texture_pixels(&self, texture: TextureId) -> Option<Vec<u8>> {
        let state = self.state.lock().unwrap();
        state.textures.get(&texture).map(|t| t.pixels.clone())
    }

    /// Whether the stored pixels of a live texture were premultiplied on upload.
    pub fn is_premultiplied(&self, texture: TextureId) -> Option<bool> {
        let state = self.state.lock().unwrap();
        state.textures.get(&texture).map(|t| t.premultiplied)
    }

    /// The number of mipmap levels generated for a live texture.
    pub fn mip_level_count(&self, texture: TextureId) -> Option<u32> {
        let state = self.state.lock().unwrap();
        state.textures.get(&texture).map(|t| t.mip_level_count)
    }
}

/// Checks that `texture` is both live and currently bound.
fn expect_bound(state: &HeadlessState, texture: TextureId) -> Result<(), BackendError> {
    if !state.textures.contains_key(&texture) {
        return Err(BackendError::InvalidHandle(texture));
    }
    if state.bound != Some(texture) {
        return Err(BackendError::Backend(format!(
            "texture {texture:?} is not bound"
        )));
    }
    Ok(())
}

impl TextureBackend for HeadlessBackend {
    fn create_texture(&self) -> Result<TextureId, BackendError> {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = TextureId(state.next_id);
        state.textures.insert(id, HeadlessTexture::default());
        Ok(id)
    }

    fn bind_texture(&self, texture: Option<TextureId>) -> Result<(), BackendError> {
        let mut state = self.state.lock().unwrap();
        if let Some(id) = texture {
            if !state.textures.contains_key(&id) {
                return Err(BackendError::InvalidHandle(id));
            }
        }
        state.bound = texture;
        Ok(())
    }

    fn set_filter_params(
        &self,
        texture: TextureId,
        min_filter: MinFilterMode,
        mag_filter: FilterMode,
    ) -> Result<(), BackendError> {
        let mut state = self.state.lock().unwrap();
        expect_bound(&state, texture)?;
        let entry = state
            .textures
            .get_mut(&texture)
            .ok_or(BackendError::InvalidHandle(texture))?;
        entry.min_filter = Some(min_filter);
        entry.mag_filter = Some(mag_filter);
        Ok(())
    }

    fn set_premultiply_alpha(&self, enabled: bool) -> Result<(), BackendError> {
        self.state.lock().unwrap().premultiply = enabled;
        Ok(())
    }

    fn upload_pixels(
        &self,
        texture: TextureId,
        format: PixelFormat,
        image: &DecodedImage,
    ) -> Result<(), BackendError> {
        if !image.is_well_formed() {
            return Err(BackendError::Backend(format!(
                "pixel buffer length {} does not match {}x{} {format:?}",
                image.pixels.len(),
                image.width,
                image.height
            )));
        }
        let mut state = self.state.lock().unwrap();
        expect_bound(&state, texture)?;
        let premultiply = state.premultiply;
        let entry = state
            .textures
            .get_mut(&texture)
            .ok_or(BackendError::InvalidHandle(texture))?;

        let mut stored = image.clone();
        if premultiply {
            stored.premultiply_alpha();
        }
        entry.pixels = stored.pixels;
        entry.width = stored.width;
        entry.height = stored.height;
        entry.premultiplied = premultiply;
        Ok(())
    }

    fn generate_mipmaps(&self, texture: TextureId) -> Result<(), BackendError> {
        let mut state = self.state.lock().unwrap();
        expect_bound(&state, texture)?;
        let entry = state
            .textures
            .get_mut(&texture)
            .ok_or(BackendError::InvalidHandle(texture))?;
        if entry.width == 0 || entry.height == 0 {
            return Err(BackendError::Backend(format!(
                "cannot generate mipmaps for {texture:?} before an upload"
            )));
        }
        let longest = entry.width.max(entry.height);
        entry.mip_level_count = u32::BITS - longest.leading_zeros();
        Ok(())
    }

    fn delete_texture(&self, texture: TextureId) -> Result<(), BackendError> {
        let mut state = self.state.lock().unwrap();
        if state.textures.remove(&texture).is_none() {
            return Err(BackendError::InvalidHandle(texture));
        }
        if state.bound == Some(texture) {
            state.bound = None;
        }
        Ok(())
    }
}
