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

//! # Chroma Cache
//!
//! A deduplicating cache for GPU textures loaded from image paths.
//!
//! The cache guarantees that at most one GPU texture is ever resident per
//! (path, premultiply) key, owns every handle it creates, and releases GPU
//! memory only through the explicit `release_*` operations. Loads are
//! asynchronous: decoding happens through an [`ImageDecoder`] collaborator
//! and completion callbacks fire from [`TextureResourceCache::process_completions`],
//! never from inside `load` itself.
//!
//! [`ImageDecoder`]: chroma_core::ImageDecoder

pub mod cache;
pub mod record;

pub use cache::{CacheConfig, TextureResourceCache};
pub use record::{TextureKey, TextureRecord};
