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

//! The contract of the asynchronous image-decoding collaborator.

use crate::error::DecodeError;
use crate::texture::DecodedImage;
use crossbeam_channel::Sender;
use std::fmt::Debug;

/// Correlates a decode request with the completion it eventually produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DecodeTicket(pub u64);

/// A request to decode the image at `path` into RGBA8 pixel data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeRequest {
    /// The ticket the completion must carry.
    pub ticket: DecodeTicket,
    /// The source path of the image.
    pub path: String,
}

/// The outcome of a decode request, delivered over the completion channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeCompletion {
    /// The ticket of the request this completion answers.
    pub ticket: DecodeTicket,
    /// The source path of the image, echoed back for logging.
    pub path: String,
    /// The decoded image, or the reason decoding failed.
    pub result: Result<DecodedImage, DecodeError>,
}

/// The image-decoding collaborator of the texture cache.
///
/// Decoding is asynchronous: `decode` must return without blocking on the
/// actual decode work, and the implementation must eventually send exactly one
/// [`DecodeCompletion`] per accepted request on the provided channel, whether
/// the decode succeeded or failed. Implementations never touch the GPU; the
/// cache performs all uploads itself when it drains the channel.
pub trait ImageDecoder: Send + Debug {
    /// Submits a decode request.
    ///
    /// ## Errors
    /// * `DecodeError::Unavailable` - If the decoder can no longer accept
    ///   work (e.g. its worker has shut down). No completion will be sent for
    ///   a rejected request.
    fn decode(
        &self,
        request: DecodeRequest,
        completions: &Sender<DecodeCompletion>,
    ) -> Result<(), DecodeError>;
}
