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

//! # Chroma Core
//!
//! Foundational crate containing traits, core types, and interface contracts
//! for the chroma texture cache.
//!
//! This crate defines the "common language" spoken between the cache and its
//! two external collaborators: the GPU backend (the [`TextureBackend`] trait)
//! and the platform image decoder (the [`ImageDecoder`] trait). It contains
//! no policy of its own; the 'how' lives in `chroma-cache` (caching and
//! lifetime management) and `chroma-infra` (concrete implementations).

#![warn(missing_docs)]

pub mod backend;
pub mod decoder;
pub mod error;
pub mod texture;

pub use backend::TextureBackend;
pub use decoder::{DecodeCompletion, DecodeRequest, DecodeTicket, ImageDecoder};
pub use error::{BackendError, DecodeError, TextureCacheError};
pub use texture::{DecodedImage, FilterMode, MinFilterMode, PixelFormat, TextureId};
