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

//! A filesystem image decoder running on a dedicated worker thread.

use chroma_core::{
    DecodeCompletion, DecodeError, DecodeRequest, DecodedImage, ImageDecoder,
};
use crossbeam_channel::{unbounded, Sender};
use std::thread::JoinHandle;

/// One unit of decode work queued to the worker.
#[derive(Debug)]
struct Job {
    request: DecodeRequest,
    completions: Sender<DecodeCompletion>,
}

/// An [`ImageDecoder`] that reads image files from the filesystem and decodes
/// them on a background thread.
///
/// The decode itself (via the `image` crate) normalizes every source format
/// to tightly packed RGBA8, matching what the cache uploads. One completion
/// is sent per accepted request, success or failure; completions whose
/// receiving cache is gone are dropped silently.
#[derive(Debug)]
pub struct FsImageDecoder {
    work_tx: Option<Sender<Job>>,
    worker: Option<JoinHandle<()>>,
}

impl FsImageDecoder {
    /// Spawns the worker thread and returns the decoder.
    pub fn new() -> Self {
        let (work_tx, work_rx) = unbounded::<Job>();
        let worker = std::thread::spawn(move || {
            for job in work_rx.iter() {
                let result = decode_file(&job.request.path);
                let completion = DecodeCompletion {
                    ticket: job.request.ticket,
                    path: job.request.path,
                    result,
                };
                if job.completions.send(completion).is_err() {
                    log::debug!("dropping decode completion; the cache is gone");
                }
            }
        });
        Self {
            work_tx: Some(work_tx),
            worker: Some(worker),
        }
    }
}

impl Default for FsImageDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageDecoder for FsImageDecoder {
    fn decode(
        &self,
        request: DecodeRequest,
        completions: &Sender<DecodeCompletion>,
    ) -> Result<(), DecodeError> {
        let Some(work_tx) = &self.work_tx else {
            return Err(DecodeError::Unavailable { path: request.path });
        };
        work_tx
            .send(Job {
                request,
                completions: completions.clone(),
            })
            .map_err(|err| DecodeError::Unavailable {
                path: err.into_inner().request.path,
            })
    }
}

impl Drop for FsImageDecoder {
    fn drop(&mut self) {
        // Closing the work channel lets the worker drain its queue and exit.
        self.work_tx = None;
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::warn!("image decode worker panicked");
            }
        }
    }
}

/// Reads and decodes one file into RGBA8 pixel data.
fn decode_file(path: &str) -> Result<DecodedImage, DecodeError> {
    let bytes = std::fs::read(path).map_err(|err| DecodeError::Io {
        path: path.to_string(),
        source_error: err.to_string(),
    })?;

    let img = image::load_from_memory(&bytes).map_err(|err| DecodeError::Malformed {
        path: path.to_string(),
        details: err.to_string(),
    })?;

    // Convert to RGBA8 (keep in sRGB space).
    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    Ok(DecodedImage {
        pixels: rgba.into_raw(),
        width,
        height,
    })
}
