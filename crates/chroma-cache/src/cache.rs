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

//! The deduplicating texture cache and its load/release state machine.

use crate::record::{TextureKey, TextureRecord};
use chroma_core::{
    BackendError, DecodeCompletion, DecodeRequest, DecodeTicket, DecodedImage, FilterMode,
    ImageDecoder, MinFilterMode, PixelFormat, TextureBackend, TextureCacheError, TextureId,
};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::collections::HashMap;
use std::sync::Arc;

/// The fixed minification filter applied to every cached texture.
const MIN_FILTER: MinFilterMode = MinFilterMode::LinearMipmapLinear;
/// The fixed magnification filter applied to every cached texture.
const MAG_FILTER: FilterMode = FilterMode::Linear;

/// A completion callback registered with [`TextureResourceCache::load`].
///
/// Fired exactly once, from `process_completions`, with either a reference to
/// the live record serving the request or the reason the load failed.
pub type LoadCallback =
    Box<dyn FnOnce(Result<&TextureRecord, TextureCacheError>) + Send + 'static>;

/// Tuning knobs of the cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Re-issue a decode of the source image whenever a load hits an existing
    /// record.
    ///
    /// The behavior exists to accommodate image sources that cannot reliably
    /// re-signal readiness on a previously consumed decode object; a hit then
    /// pays decode latency but never upload cost. With the flag off, hits are
    /// served from the resident record on the next `process_completions` call
    /// without touching the decoder.
    pub redecode_on_hit: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redecode_on_hit: true,
        }
    }
}

/// How a pending decode resolves once its completion arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingKind {
    /// The key was resident when the load was issued; the existing record is
    /// reused and only its cached pixels are refreshed.
    Hit,
    /// The key was absent; the decoded pixels are uploaded to a new texture.
    Miss,
}

/// A decode in flight, together with every callback waiting on its key.
struct PendingLoad {
    key: TextureKey,
    kind: PendingKind,
    callbacks: Vec<LoadCallback>,
}

/// A deduplicating cache of GPU textures keyed by (path, premultiply).
///
/// The cache owns every GPU handle it creates. Callers receive non-owning
/// references to [`TextureRecord`]s and must call one of the `release_*`
/// operations (or [`teardown`](Self::teardown)) to reclaim GPU memory; the
/// cache never evicts on its own.
///
/// # Concurrency
///
/// All operations run on one logical thread: `load` and
/// `process_completions` take `&mut self`. Decoders may do their work on
/// background threads, but they only ever touch the completion channel. GPU
/// calls are issued exclusively from `process_completions`, so the
/// bind/configure/upload/unbind sequence is never interleaved with another
/// upload, and the backend is always left with no texture bound.
pub struct TextureResourceCache {
    backend: Arc<dyn TextureBackend>,
    decoder: Box<dyn ImageDecoder>,
    config: CacheConfig,

    records: Vec<TextureRecord>,
    index: HashMap<TextureKey, usize>,

    pending: HashMap<DecodeTicket, PendingLoad>,
    in_flight: HashMap<TextureKey, DecodeTicket>,
    ready_hits: Vec<(TextureKey, LoadCallback)>,

    completions_tx: Sender<DecodeCompletion>,
    completions_rx: Receiver<DecodeCompletion>,
    next_ticket: u64,
}

impl TextureResourceCache {
    /// Creates a cache bound to its two collaborators.
    ///
    /// Injecting the backend at construction replaces the set-backend-then-use
    /// protocol of looser designs: no operation can run against a missing
    /// backend.
    pub fn new(backend: Arc<dyn TextureBackend>, decoder: Box<dyn ImageDecoder>) -> Self {
        Self::with_config(backend, decoder, CacheConfig::default())
    }

    /// Creates a cache with an explicit [`CacheConfig`].
    pub fn with_config(
        backend: Arc<dyn TextureBackend>,
        decoder: Box<dyn ImageDecoder>,
        config: CacheConfig,
    ) -> Self {
        let (completions_tx, completions_rx) = unbounded();
        Self {
            backend,
            decoder,
            config,
            records: Vec::new(),
            index: HashMap::new(),
            pending: HashMap::new(),
            in_flight: HashMap::new(),
            ready_hits: Vec::new(),
            completions_tx,
            completions_rx,
            next_ticket: 0,
        }
    }

    /// Requests the texture for `path`, deduplicated against resident records
    /// and in-flight loads for the same (path, premultiply) key.
    ///
    /// The callback never fires from within this call; it is invoked from a
    /// later [`process_completions`](Self::process_completions), after the
    /// decode (hit) or the decode and GPU upload (miss) have finished.
    ///
    /// ## Errors
    /// * `TextureCacheError::Decode` - If the decoder rejected the request.
    ///   No callback will fire for a rejected load.
    pub fn load<F>(
        &mut self,
        path: &str,
        premultiply: bool,
        on_complete: F,
    ) -> Result<(), TextureCacheError>
    where
        F: FnOnce(Result<&TextureRecord, TextureCacheError>) + Send + 'static,
    {
        let key = TextureKey::new(path, premultiply);

        // A decode for this key is already in flight: attach and wait.
        if let Some(ticket) = self.in_flight.get(&key).copied() {
            log::debug!("texture load coalesced for '{path}' (premultiply={premultiply})");
            if let Some(pending) = self.pending.get_mut(&ticket) {
                pending.callbacks.push(Box::new(on_complete));
            }
            return Ok(());
        }

        let hit = self.index.contains_key(&key);
        if hit && !self.config.redecode_on_hit {
            log::debug!("texture cache hit for '{path}' (premultiply={premultiply})");
            self.ready_hits.push((key, Box::new(on_complete)));
            return Ok(());
        }

        log::debug!(
            "texture cache {} for '{path}' (premultiply={premultiply}), issuing decode",
            if hit { "hit" } else { "miss" }
        );
        let ticket = self.next_ticket();
        self.decoder.decode(
            DecodeRequest {
                ticket,
                path: path.to_string(),
            },
            &self.completions_tx,
        )?;

        let kind = if hit {
            PendingKind::Hit
        } else {
            PendingKind::Miss
        };
        self.in_flight.insert(key.clone(), ticket);
        self.pending.insert(
            ticket,
            PendingLoad {
                key,
                kind,
                callbacks: vec![Box::new(on_complete)],
            },
        );
        Ok(())
    }

    /// Services finished loads: drains queued hit responses and every decode
    /// completion that has arrived, performing GPU uploads for misses and
    /// invoking the registered callbacks.
    ///
    /// All GPU work happens inside this call, on the caller's thread. Returns
    /// the number of callbacks fired.
    pub fn process_completions(&mut self) -> usize {
        let mut fired = 0;

        let ready: Vec<_> = self.ready_hits.drain(..).collect();
        for (key, callback) in ready {
            match self.index.get(&key) {
                Some(&slot) => callback(Ok(&self.records[slot])),
                // Released between load and this call; the record (and its
                // pixels) are gone, so there is nothing to serve.
                None => callback(Err(TextureCacheError::NotFound)),
            }
            fired += 1;
        }

        while let Ok(completion) = self.completions_rx.try_recv() {
            fired += self.finish_load(completion);
        }
        fired
    }

    /// Resolves one decode completion against the pending-load table.
    fn finish_load(&mut self, completion: DecodeCompletion) -> usize {
        let Some(pending) = self.pending.remove(&completion.ticket) else {
            log::warn!(
                "dropping decode completion for unknown ticket {:?} ('{}')",
                completion.ticket,
                completion.path
            );
            return 0;
        };
        self.in_flight.remove(&pending.key);
        let fired = pending.callbacks.len();

        let image = match completion.result {
            Ok(image) => image,
            Err(err) => {
                log::warn!("decode failed for '{}': {err}", completion.path);
                let err = TextureCacheError::from(err);
                for callback in pending.callbacks {
                    callback(Err(err.clone()));
                }
                return fired;
            }
        };

        let resident = self.index.get(&pending.key).copied();
        match (pending.kind, resident) {
            (PendingKind::Hit, Some(slot)) => {
                // Reuse the existing handle and dimensions; only the cached
                // pixels are refreshed from the new decode.
                self.records[slot].image = image;
                let record = &self.records[slot];
                for callback in pending.callbacks {
                    callback(Ok(record));
                }
            }
            _ => {
                // A plain miss, or a hit whose record was released while the
                // decode was in flight: either way the key is absent now, so
                // the decoded pixels go to a fresh texture.
                match self.upload(&pending.key, image) {
                    Ok(slot) => {
                        let record = &self.records[slot];
                        for callback in pending.callbacks {
                            callback(Ok(record));
                        }
                    }
                    Err(err) => {
                        log::warn!("texture upload failed for '{}': {err}", pending.key.path);
                        let err = TextureCacheError::from(err);
                        for callback in pending.callbacks {
                            callback(Err(err.clone()));
                        }
                    }
                }
            }
        }
        fired
    }

    /// Creates, configures, and fills a new GPU texture, then appends the
    /// record for it. Returns the slot of the new record.
    fn upload(&mut self, key: &TextureKey, image: DecodedImage) -> Result<usize, BackendError> {
        let handle = self.backend.create_texture()?;
        if let Err(err) = self.configure_and_fill(handle, key.premultiply, &image) {
            // Don't leak the handle when a later step of the sequence fails.
            let _ = self.backend.bind_texture(None);
            if let Err(delete_err) = self.backend.delete_texture(handle) {
                log::warn!("failed to delete texture {handle:?} after upload error: {delete_err}");
            }
            return Err(err);
        }

        let slot = self.records.len();
        self.records.push(TextureRecord {
            path: key.path.clone(),
            premultiply: key.premultiply,
            handle,
            width: image.width,
            height: image.height,
            image,
        });
        self.index.insert(key.clone(), slot);
        Ok(slot)
    }

    /// The fixed upload sequence: bind, filters, premultiply mode, pixels,
    /// mipmaps, unbind.
    fn configure_and_fill(
        &self,
        handle: TextureId,
        premultiply: bool,
        image: &DecodedImage,
    ) -> Result<(), BackendError> {
        self.backend.bind_texture(Some(handle))?;
        self.backend
            .set_filter_params(handle, MIN_FILTER, MAG_FILTER)?;
        if premultiply {
            self.backend.set_premultiply_alpha(true)?;
        }
        self.backend
            .upload_pixels(handle, PixelFormat::Rgba8, image)?;
        self.backend.generate_mipmaps(handle)?;
        self.backend.bind_texture(None)
    }

    /// Releases every resident texture and clears the collection. Returns the
    /// number of records released.
    pub fn release_all(&mut self) -> usize {
        let count = self.records.len();
        for record in self.records.drain(..) {
            if let Err(err) = self.backend.delete_texture(record.handle) {
                log::warn!(
                    "failed to delete texture {:?} for '{}': {err}",
                    record.handle,
                    record.path
                );
            }
        }
        self.index.clear();
        count
    }

    /// Releases the record owning the given handle.
    ///
    /// At most one record is removed (handles are unique by construction).
    ///
    /// ## Errors
    /// * `TextureCacheError::NotFound` - If no record owns the handle.
    /// * `TextureCacheError::Backend` - If the backend refused to delete the
    ///   texture. The record is removed from the collection regardless.
    pub fn release_by_handle(&mut self, handle: TextureId) -> Result<(), TextureCacheError> {
        match self.records.iter().position(|r| r.handle == handle) {
            Some(slot) => self.remove_record(slot),
            None => Err(TextureCacheError::NotFound),
        }
    }

    /// Releases the first record (in insertion order) loaded from `path`.
    ///
    /// The premultiply component of the key is deliberately ignored: when both
    /// a premultiplied and a straight-alpha record exist for one path, the one
    /// inserted first is released. Call again to release the other.
    ///
    /// ## Errors
    /// * `TextureCacheError::NotFound` - If no record matches the path.
    /// * `TextureCacheError::Backend` - If the backend refused to delete the
    ///   texture. The record is removed from the collection regardless.
    pub fn release_by_path(&mut self, path: &str) -> Result<(), TextureCacheError> {
        match self.records.iter().position(|r| r.path == path) {
            Some(slot) => self.remove_record(slot),
            None => Err(TextureCacheError::NotFound),
        }
    }

    /// Shuts the cache down, releasing every resident texture. Returns the
    /// number of records released.
    ///
    /// Pending loads are discarded; their callbacks never fire.
    pub fn teardown(mut self) -> usize {
        self.release_all()
    }

    /// Removes the record at `slot`, frees its handle, and repairs the index.
    fn remove_record(&mut self, slot: usize) -> Result<(), TextureCacheError> {
        let record = self.records.remove(slot);
        self.index.remove(&record.key());
        for resident_slot in self.index.values_mut() {
            if *resident_slot > slot {
                *resident_slot -= 1;
            }
        }
        self.backend.delete_texture(record.handle)?;
        Ok(())
    }

    fn next_ticket(&mut self) -> DecodeTicket {
        self.next_ticket += 1;
        DecodeTicket(self.next_ticket)
    }

    /// The number of resident records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the cache holds no resident records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Whether a record is resident for the given key.
    pub fn contains(&self, key: &TextureKey) -> bool {
        self.index.contains_key(key)
    }

    /// The resident records, in insertion order.
    pub fn records(&self) -> &[TextureRecord] {
        &self.records
    }

    /// Looks up a resident record by its GPU handle.
    pub fn record_by_handle(&self, handle: TextureId) -> Option<&TextureRecord> {
        self.records.iter().find(|r| r.handle == handle)
    }

    /// The number of loads whose callbacks have not fired yet.
    pub fn pending_loads(&self) -> usize {
        self.ready_hits.len()
            + self
                .pending
                .values()
                .map(|p| p.callbacks.len())
                .sum::<usize>()
    }
}

impl std::fmt::Debug for TextureResourceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextureResourceCache")
            .field("records", &self.records.len())
            .field("pending", &self.pending.len())
            .field("config", &self.config)
            .finish()
    }
}

impl Drop for TextureResourceCache {
    fn drop(&mut self) {
        let pending = self.pending_loads();
        if pending > 0 {
            log::warn!("texture cache dropped with {pending} load(s) still pending");
        }
        if !self.records.is_empty() {
            log::warn!(
                "texture cache dropped with {} resident texture(s); releasing",
                self.records.len()
            );
            self.release_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chroma_core::DecodeError;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum BackendCall {
        Create(TextureId),
        Bind(Option<TextureId>),
        FilterParams(TextureId, MinFilterMode, FilterMode),
        Premultiply(bool),
        Upload(TextureId, u32, u32),
        Mipmaps(TextureId),
        Delete(TextureId),
    }

    /// Records every backend call so tests can assert on exact sequences.
    #[derive(Debug, Default)]
    struct RecordingBackend {
        calls: Mutex<Vec<BackendCall>>,
        next_id: AtomicUsize,
        fail_create: AtomicBool,
        fail_upload: AtomicBool,
    }

    impl RecordingBackend {
        fn calls(&self) -> Vec<BackendCall> {
            self.calls.lock().unwrap().clone()
        }

        fn push(&self, call: BackendCall) {
            self.calls.lock().unwrap().push(call);
        }

        fn count(&self, matcher: impl Fn(&BackendCall) -> bool) -> usize {
            self.calls.lock().unwrap().iter().filter(|c| matcher(c)).count()
        }
    }

    impl TextureBackend for RecordingBackend {
        fn create_texture(&self) -> Result<TextureId, BackendError> {
            if self.fail_create.load(Ordering::SeqCst) {
                return Err(BackendError::AllocationFailed("simulated".to_string()));
            }
            let id = TextureId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
            self.push(BackendCall::Create(id));
            Ok(id)
        }

        fn bind_texture(&self, texture: Option<TextureId>) -> Result<(), BackendError> {
            self.push(BackendCall::Bind(texture));
            Ok(())
        }

        fn set_filter_params(
            &self,
            texture: TextureId,
            min_filter: MinFilterMode,
            mag_filter: FilterMode,
        ) -> Result<(), BackendError> {
            self.push(BackendCall::FilterParams(texture, min_filter, mag_filter));
            Ok(())
        }

        fn set_premultiply_alpha(&self, enabled: bool) -> Result<(), BackendError> {
            self.push(BackendCall::Premultiply(enabled));
            Ok(())
        }

        fn upload_pixels(
            &self,
            texture: TextureId,
            _format: PixelFormat,
            image: &DecodedImage,
        ) -> Result<(), BackendError> {
            if self.fail_upload.load(Ordering::SeqCst) {
                return Err(BackendError::Backend("simulated upload failure".to_string()));
            }
            self.push(BackendCall::Upload(texture, image.width, image.height));
            Ok(())
        }

        fn generate_mipmaps(&self, texture: TextureId) -> Result<(), BackendError> {
            self.push(BackendCall::Mipmaps(texture));
            Ok(())
        }

        fn delete_texture(&self, texture: TextureId) -> Result<(), BackendError> {
            self.push(BackendCall::Delete(texture));
            Ok(())
        }
    }

    /// Completes decodes immediately from a fixture table. The completion
    /// still travels through the channel, so callbacks only ever fire from
    /// `process_completions`.
    #[derive(Debug, Default)]
    struct ScriptedDecoder {
        fixtures: Mutex<HashMap<String, DecodedImage>>,
        decode_count: AtomicUsize,
    }

    impl ScriptedDecoder {
        fn with_fixture(self, path: &str, width: u32, height: u32) -> Self {
            self.fixtures.lock().unwrap().insert(
                path.to_string(),
                DecodedImage {
                    pixels: vec![0xAB; (width * height * 4) as usize],
                    width,
                    height,
                },
            );
            self
        }

        fn decodes(&self) -> usize {
            self.decode_count.load(Ordering::SeqCst)
        }
    }

    impl ImageDecoder for ScriptedDecoder {
        fn decode(
            &self,
            request: DecodeRequest,
            completions: &Sender<DecodeCompletion>,
        ) -> Result<(), DecodeError> {
            self.decode_count.fetch_add(1, Ordering::SeqCst);
            let result = match self.fixtures.lock().unwrap().get(&request.path) {
                Some(image) => Ok(image.clone()),
                None => Err(DecodeError::Io {
                    path: request.path.clone(),
                    source_error: "no such fixture".to_string(),
                }),
            };
            completions
                .send(DecodeCompletion {
                    ticket: request.ticket,
                    path: request.path.clone(),
                    result,
                })
                .map_err(|_| DecodeError::Unavailable { path: request.path })
        }
    }

    /// Boxing adapter so tests can keep a handle on the decoder they hand to
    /// the cache.
    #[derive(Debug)]
    struct SharedDecoder(Arc<ScriptedDecoder>);

    impl ImageDecoder for SharedDecoder {
        fn decode(
            &self,
            request: DecodeRequest,
            completions: &Sender<DecodeCompletion>,
        ) -> Result<(), DecodeError> {
            self.0.decode(request, completions)
        }
    }

    fn harness(
        decoder: ScriptedDecoder,
        config: CacheConfig,
    ) -> (
        Arc<RecordingBackend>,
        Arc<ScriptedDecoder>,
        TextureResourceCache,
    ) {
        let backend = Arc::new(RecordingBackend::default());
        let decoder = Arc::new(decoder);
        let cache = TextureResourceCache::with_config(
            backend.clone(),
            Box::new(SharedDecoder(decoder.clone())),
            config,
        );
        (backend, decoder, cache)
    }

    type SeenLoads = Arc<Mutex<Vec<Result<TextureId, TextureCacheError>>>>;

    fn observe(seen: &SeenLoads) -> impl FnOnce(Result<&TextureRecord, TextureCacheError>) + Send {
        let seen = seen.clone();
        move |result| {
            seen.lock()
                .unwrap()
                .push(result.map(|record| record.handle));
        }
    }

    #[test]
    fn miss_runs_full_upload_sequence_in_order() {
        let (backend, _, mut cache) =
            harness(ScriptedDecoder::default().with_fixture("a.png", 4, 2), CacheConfig::default());
        let seen: SeenLoads = Arc::new(Mutex::new(Vec::new()));

        cache.load("a.png", false, observe(&seen)).unwrap();
        assert!(seen.lock().unwrap().is_empty(), "callback must not fire inside load");
        assert_eq!(cache.pending_loads(), 1);

        assert_eq!(cache.process_completions(), 1);
        let id = TextureId(1);
        assert_eq!(
            backend.calls(),
            vec![
                BackendCall::Create(id),
                BackendCall::Bind(Some(id)),
                BackendCall::FilterParams(id, MinFilterMode::LinearMipmapLinear, FilterMode::Linear),
                BackendCall::Upload(id, 4, 2),
                BackendCall::Mipmaps(id),
                BackendCall::Bind(None),
            ]
        );
        assert_eq!(seen.lock().unwrap().as_slice(), &[Ok(id)]);

        let record = cache.record_by_handle(id).unwrap();
        assert_eq!(record.path, "a.png");
        assert!(!record.premultiply);
        assert_eq!((record.width, record.height), (4, 2));
    }

    #[test]
    fn premultiplied_miss_enables_backend_premultiply_before_upload() {
        let (backend, _, mut cache) =
            harness(ScriptedDecoder::default().with_fixture("a.png", 1, 1), CacheConfig::default());
        cache.load("a.png", true, |_| {}).unwrap();
        cache.process_completions();

        let calls = backend.calls();
        let premultiply_at = calls
            .iter()
            .position(|c| *c == BackendCall::Premultiply(true))
            .expect("premultiply mode must be set");
        let upload_at = calls
            .iter()
            .position(|c| matches!(c, BackendCall::Upload(..)))
            .unwrap();
        assert!(premultiply_at < upload_at);
    }

    #[test]
    fn repeated_loads_reuse_the_single_handle() {
        let (backend, decoder, mut cache) =
            harness(ScriptedDecoder::default().with_fixture("a.png", 2, 2), CacheConfig::default());
        let seen: SeenLoads = Arc::new(Mutex::new(Vec::new()));

        cache.load("a.png", false, observe(&seen)).unwrap();
        cache.process_completions();
        let calls_after_miss = backend.calls().len();

        cache.load("a.png", false, observe(&seen)).unwrap();
        assert_eq!(seen.lock().unwrap().len(), 1, "hit callback must wait for the pump");
        cache.process_completions();

        assert_eq!(seen.lock().unwrap().as_slice(), &[Ok(TextureId(1)), Ok(TextureId(1))]);
        // The hit re-decoded (default policy) but never touched the GPU.
        assert_eq!(decoder.decodes(), 2);
        assert_eq!(backend.calls().len(), calls_after_miss);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn concurrent_loads_for_one_key_coalesce_into_one_texture() {
        let (backend, decoder, mut cache) =
            harness(ScriptedDecoder::default().with_fixture("a.png", 2, 2), CacheConfig::default());
        let seen: SeenLoads = Arc::new(Mutex::new(Vec::new()));

        cache.load("a.png", false, observe(&seen)).unwrap();
        cache.load("a.png", false, observe(&seen)).unwrap();
        assert_eq!(cache.pending_loads(), 2);
        assert_eq!(decoder.decodes(), 1);

        assert_eq!(cache.process_completions(), 2);
        assert_eq!(seen.lock().unwrap().as_slice(), &[Ok(TextureId(1)), Ok(TextureId(1))]);
        assert_eq!(backend.count(|c| matches!(c, BackendCall::Create(_))), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn different_premultiply_modes_are_distinct_records() {
        let (backend, _, mut cache) =
            harness(ScriptedDecoder::default().with_fixture("a.png", 2, 2), CacheConfig::default());
        cache.load("a.png", false, |_| {}).unwrap();
        cache.load("a.png", true, |_| {}).unwrap();
        cache.process_completions();

        assert_eq!(cache.len(), 2);
        assert_eq!(backend.count(|c| matches!(c, BackendCall::Create(_))), 2);
    }

    #[test]
    fn release_all_deletes_each_texture_exactly_once() {
        let (backend, _, mut cache) = harness(
            ScriptedDecoder::default()
                .with_fixture("a.png", 1, 1)
                .with_fixture("b.png", 1, 1),
            CacheConfig::default(),
        );
        cache.load("a.png", false, |_| {}).unwrap();
        cache.load("b.png", false, |_| {}).unwrap();
        cache.process_completions();

        assert_eq!(cache.release_all(), 2);
        assert!(cache.is_empty());
        assert_eq!(backend.count(|c| *c == BackendCall::Delete(TextureId(1))), 1);
        assert_eq!(backend.count(|c| *c == BackendCall::Delete(TextureId(2))), 1);
    }

    #[test]
    fn release_by_handle_removes_exactly_one_record() {
        let (backend, _, mut cache) = harness(
            ScriptedDecoder::default()
                .with_fixture("a.png", 1, 1)
                .with_fixture("b.png", 1, 1),
            CacheConfig::default(),
        );
        cache.load("a.png", false, |_| {}).unwrap();
        cache.load("b.png", false, |_| {}).unwrap();
        cache.process_completions();

        cache.release_by_handle(TextureId(1)).unwrap();
        assert_eq!(cache.len(), 1);
        assert!(cache.record_by_handle(TextureId(1)).is_none());
        assert!(cache.record_by_handle(TextureId(2)).is_some());
        assert_eq!(backend.count(|c| matches!(c, BackendCall::Delete(_))), 1);

        assert_eq!(
            cache.release_by_handle(TextureId(1)),
            Err(TextureCacheError::NotFound)
        );
    }

    #[test]
    fn release_by_path_takes_first_match_ignoring_premultiply() {
        let (_, _, mut cache) =
            harness(ScriptedDecoder::default().with_fixture("a.png", 1, 1), CacheConfig::default());
        cache.load("a.png", false, |_| {}).unwrap();
        cache.load("a.png", true, |_| {}).unwrap();
        cache.process_completions();
        assert_eq!(cache.len(), 2);

        cache.release_by_path("a.png").unwrap();
        assert_eq!(cache.len(), 1);
        // Insertion order: the straight-alpha record went in first.
        assert!(cache.records()[0].premultiply);

        cache.release_by_path("a.png").unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn release_of_missing_path_is_an_error_and_touches_nothing() {
        let (backend, _, mut cache) =
            harness(ScriptedDecoder::default().with_fixture("a.png", 1, 1), CacheConfig::default());
        cache.load("a.png", false, |_| {}).unwrap();
        cache.process_completions();
        let calls_before = backend.calls().len();

        assert_eq!(
            cache.release_by_path("missing.png"),
            Err(TextureCacheError::NotFound)
        );
        assert_eq!(cache.len(), 1);
        assert_eq!(backend.calls().len(), calls_before);
    }

    #[test]
    fn reload_after_release_allocates_a_fresh_handle() {
        let (_, _, mut cache) =
            harness(ScriptedDecoder::default().with_fixture("a.png", 1, 1), CacheConfig::default());
        let seen: SeenLoads = Arc::new(Mutex::new(Vec::new()));

        cache.load("a.png", false, observe(&seen)).unwrap();
        cache.process_completions();
        cache.release_by_path("a.png").unwrap();
        cache.load("a.png", false, observe(&seen)).unwrap();
        cache.process_completions();

        let seen = seen.lock().unwrap();
        let (first, second) = (seen[0].clone().unwrap(), seen[1].clone().unwrap());
        assert_ne!(first, second, "a released handle must never be served again");
    }

    #[test]
    fn decode_failure_reaches_every_coalesced_callback() {
        let (backend, _, mut cache) = harness(ScriptedDecoder::default(), CacheConfig::default());
        let seen: SeenLoads = Arc::new(Mutex::new(Vec::new()));

        cache.load("missing.png", false, observe(&seen)).unwrap();
        cache.load("missing.png", false, observe(&seen)).unwrap();
        assert_eq!(cache.process_completions(), 2);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        for result in seen.iter() {
            assert!(matches!(
                result,
                Err(TextureCacheError::Decode(DecodeError::Io { .. }))
            ));
        }
        assert!(cache.is_empty());
        assert!(backend.calls().is_empty(), "failed decodes must not touch the GPU");
        // The key is no longer considered in flight.
        assert_eq!(cache.pending_loads(), 0);
    }

    #[test]
    fn allocation_failure_is_reported_to_the_caller() {
        let (backend, _, mut cache) =
            harness(ScriptedDecoder::default().with_fixture("a.png", 1, 1), CacheConfig::default());
        backend.fail_create.store(true, Ordering::SeqCst);
        let seen: SeenLoads = Arc::new(Mutex::new(Vec::new()));

        cache.load("a.png", false, observe(&seen)).unwrap();
        cache.process_completions();

        assert!(matches!(
            seen.lock().unwrap()[0],
            Err(TextureCacheError::Backend(BackendError::AllocationFailed(_)))
        ));
        assert!(cache.is_empty());
    }

    #[test]
    fn upload_failure_frees_the_allocated_handle() {
        let (backend, _, mut cache) =
            harness(ScriptedDecoder::default().with_fixture("a.png", 1, 1), CacheConfig::default());
        backend.fail_upload.store(true, Ordering::SeqCst);
        let seen: SeenLoads = Arc::new(Mutex::new(Vec::new()));

        cache.load("a.png", false, observe(&seen)).unwrap();
        cache.process_completions();

        assert!(matches!(
            seen.lock().unwrap()[0],
            Err(TextureCacheError::Backend(BackendError::Backend(_)))
        ));
        assert!(cache.is_empty());
        assert_eq!(backend.count(|c| *c == BackendCall::Delete(TextureId(1))), 1);
    }

    #[test]
    fn hit_without_redecode_skips_the_decoder() {
        let (_, decoder, mut cache) = harness(
            ScriptedDecoder::default().with_fixture("a.png", 1, 1),
            CacheConfig {
                redecode_on_hit: false,
            },
        );
        let seen: SeenLoads = Arc::new(Mutex::new(Vec::new()));

        cache.load("a.png", false, observe(&seen)).unwrap();
        cache.process_completions();
        cache.load("a.png", false, observe(&seen)).unwrap();
        assert_eq!(seen.lock().unwrap().len(), 1, "still asynchronous without redecode");

        assert_eq!(cache.process_completions(), 1);
        assert_eq!(decoder.decodes(), 1);
        assert_eq!(seen.lock().unwrap().as_slice(), &[Ok(TextureId(1)), Ok(TextureId(1))]);
    }

    #[test]
    fn queued_hit_whose_record_was_released_reports_not_found() {
        let (_, _, mut cache) = harness(
            ScriptedDecoder::default().with_fixture("a.png", 1, 1),
            CacheConfig {
                redecode_on_hit: false,
            },
        );
        let seen: SeenLoads = Arc::new(Mutex::new(Vec::new()));

        cache.load("a.png", false, |_| {}).unwrap();
        cache.process_completions();
        cache.load("a.png", false, observe(&seen)).unwrap();
        cache.release_by_path("a.png").unwrap();
        cache.process_completions();

        assert_eq!(
            seen.lock().unwrap().as_slice(),
            &[Err(TextureCacheError::NotFound)]
        );
    }

    #[test]
    fn hit_released_mid_decode_is_promoted_to_a_fresh_upload() {
        let (backend, _, mut cache) =
            harness(ScriptedDecoder::default().with_fixture("a.png", 1, 1), CacheConfig::default());
        let seen: SeenLoads = Arc::new(Mutex::new(Vec::new()));

        cache.load("a.png", false, observe(&seen)).unwrap();
        cache.process_completions();

        // Hit: a redecode goes out. The record vanishes before it lands.
        cache.load("a.png", false, observe(&seen)).unwrap();
        cache.release_by_path("a.png").unwrap();
        cache.process_completions();

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0], Ok(TextureId(1)));
        assert_eq!(seen[1], Ok(TextureId(2)), "promoted hit must yield a live record");
        assert_eq!(cache.len(), 1);
        assert_eq!(backend.count(|c| matches!(c, BackendCall::Create(_))), 2);
    }

    #[test]
    fn hit_redecode_refreshes_cached_pixels() {
        let (_, _, mut cache) =
            harness(ScriptedDecoder::default().with_fixture("a.png", 2, 1), CacheConfig::default());
        cache.load("a.png", false, |_| {}).unwrap();
        cache.process_completions();
        let first_image = cache.records()[0].image.clone();

        cache.load("a.png", false, |_| {}).unwrap();
        cache.process_completions();
        assert_eq!(cache.records()[0].image, first_image);
        assert!(cache.records()[0].image.is_well_formed());
    }

    #[test]
    fn index_stays_consistent_after_removing_a_middle_record() {
        let (backend, _, mut cache) = harness(
            ScriptedDecoder::default()
                .with_fixture("a.png", 1, 1)
                .with_fixture("b.png", 1, 1)
                .with_fixture("c.png", 1, 1),
            CacheConfig::default(),
        );
        cache.load("a.png", false, |_| {}).unwrap();
        cache.load("b.png", false, |_| {}).unwrap();
        cache.load("c.png", false, |_| {}).unwrap();
        cache.process_completions();

        cache.release_by_path("b.png").unwrap();
        let creates_before = backend.count(|c| matches!(c, BackendCall::Create(_)));

        // A hit on the shifted record must still resolve without a new upload.
        cache.load("c.png", false, |_| {}).unwrap();
        cache.process_completions();
        assert_eq!(
            backend.count(|c| matches!(c, BackendCall::Create(_))),
            creates_before
        );
        assert!(cache.contains(&TextureKey::new("c.png", false)));
        assert!(!cache.contains(&TextureKey::new("b.png", false)));
    }

    #[test]
    fn teardown_releases_everything() {
        let (backend, _, mut cache) = harness(
            ScriptedDecoder::default()
                .with_fixture("a.png", 1, 1)
                .with_fixture("b.png", 1, 1),
            CacheConfig::default(),
        );
        cache.load("a.png", false, |_| {}).unwrap();
        cache.load("b.png", false, |_| {}).unwrap();
        cache.process_completions();

        assert_eq!(cache.teardown(), 2);
        assert_eq!(backend.count(|c| matches!(c, BackendCall::Delete(_))), 2);
    }
}
