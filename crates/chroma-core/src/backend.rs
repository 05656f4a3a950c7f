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

//! The contract a GPU backend must fulfil to host cached textures.

use crate::error::BackendError;
use crate::texture::{DecodedImage, FilterMode, MinFilterMode, PixelFormat, TextureId};
use std::fmt::Debug;

/// The GPU collaborator of the texture cache.
///
/// Implementations own the actual graphics-API objects; the cache only ever
/// sees opaque [`TextureId`] handles. Every texture the cache creates goes
/// through the same fixed sequence: `create_texture`, `bind_texture(Some(..))`,
/// `set_filter_params`, optionally `set_premultiply_alpha(true)`,
/// `upload_pixels`, `generate_mipmaps`, `bind_texture(None)`.
///
/// The operations that act on a specific texture take the target handle as an
/// explicit parameter rather than relying on the "currently bound" global
/// state; the bind/unbind calls are still part of the sequence so that
/// GL-style backends can mirror it onto their binding model. The cache issues
/// the whole sequence from a single thread and restores the unbound state
/// before handing control back, so no texture is ever left bound as a side
/// effect of a load.
pub trait TextureBackend: Send + Sync + Debug {
    /// Allocates a new, empty GPU texture and returns its handle.
    /// ## Errors
    /// * `BackendError::AllocationFailed` - If the backend cannot create a texture.
    fn create_texture(&self) -> Result<TextureId, BackendError>;

    /// Binds the given texture, or restores the no-texture-bound state when
    /// passed `None`.
    /// ## Errors
    /// * `BackendError::InvalidHandle` - If the handle does not name a live texture.
    fn bind_texture(&self, texture: Option<TextureId>) -> Result<(), BackendError>;

    /// Sets the minification and magnification filters of a texture.
    /// ## Errors
    /// * `BackendError::InvalidHandle` - If the handle does not name a live texture.
    fn set_filter_params(
        &self,
        texture: TextureId,
        min_filter: MinFilterMode,
        mag_filter: FilterMode,
    ) -> Result<(), BackendError>;

    /// Enables or disables alpha premultiplication for subsequent uploads.
    ///
    /// This mirrors a GL pixel-store parameter: the flag is sticky and applies
    /// to every upload until changed again.
    fn set_premultiply_alpha(&self, enabled: bool) -> Result<(), BackendError>;

    /// Uploads pixel data into the given texture.
    /// ## Errors
    /// * `BackendError::InvalidHandle` - If the handle does not name a live texture.
    /// * `BackendError::Backend` - If the upload is rejected (e.g. malformed pixel data).
    fn upload_pixels(
        &self,
        texture: TextureId,
        format: PixelFormat,
        image: &DecodedImage,
    ) -> Result<(), BackendError>;

    /// Generates the full mipmap chain for a texture using the backend's
    /// default generator.
    /// ## Errors
    /// * `BackendError::InvalidHandle` - If the handle does not name a live texture.
    fn generate_mipmaps(&self, texture: TextureId) -> Result<(), BackendError>;

    /// Releases the GPU resources of a texture. The handle is invalid afterwards.
    /// ## Errors
    /// * `BackendError::InvalidHandle` - If the handle does not name a live texture.
    fn delete_texture(&self, texture: TextureId) -> Result<(), BackendError>;
}
