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

//! Defines the hierarchy of error types for the texture cache.

use crate::texture::TextureId;
use std::fmt;

/// An error produced while decoding an image from its source path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The bytes at the path could not be read.
    Io {
        /// The path that failed to load.
        path: String,
        /// The underlying I/O error.
        source_error: String,
    },
    /// The bytes were read but do not form a decodable image.
    Malformed {
        /// The path of the undecodable image.
        path: String,
        /// Detailed error messages from the decoder.
        details: String,
    },
    /// The decoder can no longer accept work.
    Unavailable {
        /// The path of the rejected request.
        path: String,
    },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Io { path, source_error } => {
                write!(f, "Failed to read image at '{path}': {source_error}")
            }
            DecodeError::Malformed { path, details } => {
                write!(f, "Failed to decode image at '{path}': {details}")
            }
            DecodeError::Unavailable { path } => {
                write!(f, "Decoder unavailable, rejected request for '{path}'")
            }
        }
    }
}

impl std::error::Error for DecodeError {}

/// An error reported by the GPU backend while operating on a texture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The backend could not allocate a new texture.
    AllocationFailed(String),
    /// The handle used to reference a texture is not live.
    InvalidHandle(TextureId),
    /// An error originating from the specific graphics backend implementation.
    Backend(String),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::AllocationFailed(msg) => {
                write!(f, "Texture allocation failed: {msg}")
            }
            BackendError::InvalidHandle(id) => {
                write!(f, "Invalid texture handle: {id:?}")
            }
            BackendError::Backend(msg) => {
                write!(f, "Backend-specific texture error: {msg}")
            }
        }
    }
}

impl std::error::Error for BackendError {}

/// A high-level error surfaced by the texture cache to its callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextureCacheError {
    /// Decoding the source image failed.
    Decode(DecodeError),
    /// A GPU backend operation failed.
    Backend(BackendError),
    /// The referenced record is not present in the cache.
    NotFound,
}

impl fmt::Display for TextureCacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextureCacheError::Decode(err) => write!(f, "Image decode failed: {err}"),
            TextureCacheError::Backend(err) => write!(f, "Texture backend error: {err}"),
            TextureCacheError::NotFound => write!(f, "No matching texture record in the cache."),
        }
    }
}

impl std::error::Error for TextureCacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TextureCacheError::Decode(err) => Some(err),
            TextureCacheError::Backend(err) => Some(err),
            TextureCacheError::NotFound => None,
        }
    }
}

impl From<DecodeError> for TextureCacheError {
    fn from(err: DecodeError) -> Self {
        TextureCacheError::Decode(err)
    }
}

impl From<BackendError> for TextureCacheError {
    fn from(err: BackendError) -> Self {
        TextureCacheError::Backend(err)
    }
}
