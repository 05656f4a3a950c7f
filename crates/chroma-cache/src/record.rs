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

//! The cache key and the per-texture record it maps to.

use chroma_core::{DecodedImage, TextureId};

/// The deduplication key of the cache: one GPU texture may be resident per
/// distinct (path, premultiply) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextureKey {
    /// The source path of the image.
    pub path: String,
    /// Whether the texture was uploaded with alpha premultiplication.
    pub premultiply: bool,
}

impl TextureKey {
    /// Builds a key from its two components.
    pub fn new(path: impl Into<String>, premultiply: bool) -> Self {
        Self {
            path: path.into(),
            premultiply,
        }
    }
}

/// Describes one resident GPU texture.
///
/// A record is created only by a successful first-time decode and upload, and
/// destroyed only by one of the cache's release operations, which also frees
/// the GPU handle. Callers receive records by reference and never own them.
#[derive(Debug)]
pub struct TextureRecord {
    /// The source path the texture was loaded from.
    pub path: String,
    /// Whether the pixels were uploaded with alpha premultiplication.
    pub premultiply: bool,
    /// The GPU handle, owned by this record until released.
    pub handle: TextureId,
    /// The width of the texture in pixels.
    pub width: u32,
    /// The height of the texture in pixels.
    pub height: u32,
    /// The most recent decode of the source image, kept alive so the pixels
    /// remain available without re-reading the source.
    pub image: DecodedImage,
}

impl TextureRecord {
    /// The deduplication key of this record.
    pub fn key(&self) -> TextureKey {
        TextureKey::new(self.path.clone(), self.premultiply)
    }
}
