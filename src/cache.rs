use std::collections::HashMap;
use std::path::Path;

use tracing::info;

use crate::device::Device;
use crate::error::{Result, WorkerError};
use crate::provider::{ProviderFactory, ProviderKind, Synthesizer, Transcriber};

struct Slot<T> {
    device: Device,
    handle: T,
}

pub struct ResourceCache {
    factory: Box<dyn ProviderFactory>,
    synthesizers: HashMap<ProviderKind, Slot<Box<dyn Synthesizer>>>,
    transcriber: Option<Slot<Box<dyn Transcriber>>>,
}

impl std::fmt::Debug for ResourceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceCache")
            .field("loaded", &self.loaded())
            .finish()
    }
}

impl ResourceCache {
    pub fn new(factory: Box<dyn ProviderFactory>) -> Self {
        Self {
            factory,
            synthesizers: HashMap::new(),
            transcriber: None,
        }
    }

    pub fn loaded(&self) -> Vec<(ProviderKind, Device)> {
        let mut loaded: Vec<_> = self
            .synthesizers
            .iter()
            .map(|(kind, slot)| (*kind, slot.device))
            .chain(
                self.transcriber
                    .as_ref()
                    .map(|slot| (ProviderKind::Whisper, slot.device)),
            )
            .collect();
        loaded.sort_by_key(|(kind, _)| *kind);
        loaded
    }

    pub fn is_loaded(&self, kind: ProviderKind, device: Device) -> bool {
        self.loaded().contains(&(kind, device))
    }

    pub async fn synthesizer(
        &mut self,
        kind: ProviderKind,
        device: Device,
        model_dir: &Path,
    ) -> Result<&mut dyn Synthesizer> {
        if !kind.is_synthesizer() {
            return Err(WorkerError::config(format!("{kind} cannot synthesize speech")));
        }

        let hit = self
            .synthesizers
            .get(&kind)
            .is_some_and(|slot| slot.device == device);
        if !hit {
            if let Some(old) = self.synthesizers.remove(&kind) {
                info!("Releasing {} provider on {}", kind, old.device);
                drop(old);
            }
            let handle = self.factory.synthesizer(kind, device, model_dir).await?;
            self.synthesizers.insert(kind, Slot { device, handle });
        }

        let slot = self
            .synthesizers
            .get_mut(&kind)
            .ok_or_else(|| WorkerError::provider_init(kind, "cache slot vanished"))?;
        Ok(slot.handle.as_mut())
    }

    pub async fn transcriber(
        &mut self,
        device: Device,
        model_dir: &Path,
    ) -> Result<&mut dyn Transcriber> {
        let hit = self
            .transcriber
            .as_ref()
            .is_some_and(|slot| slot.device == device);
        if !hit {
            if let Some(old) = self.transcriber.take() {
                info!("Releasing {} provider on {}", ProviderKind::Whisper, old.device);
                drop(old);
            }
            let handle = self.factory.transcriber(device, model_dir).await?;
            self.transcriber = Some(Slot { device, handle });
        }

        let slot = self.transcriber.as_mut().ok_or_else(|| {
            WorkerError::provider_init(ProviderKind::Whisper, "cache slot vanished")
        })?;
        Ok(slot.handle.as_mut())
    }

    /// Brings a provider up without using it.
    pub async fn warm(
        &mut self,
        kind: ProviderKind,
        device: Device,
        model_dir: &Path,
    ) -> Result<()> {
        if kind.is_synthesizer() {
            self.synthesizer(kind, device, model_dir).await?;
        } else {
            self.transcriber(device, model_dir).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::provider::SynthesisJob;
    use crate::subtitle::TranscriptSegment;

    #[derive(Default)]
    struct Counters {
        builds: AtomicUsize,
        drops: AtomicUsize,
        fail_next: AtomicBool,
    }

    struct Handle(Arc<Counters>);

    impl Drop for Handle {
        fn drop(&mut self) {
            self.0.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Synthesizer for Handle {
        async fn synthesize(&mut self, _job: &SynthesisJob<'_>) -> Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl Transcriber for Handle {
        async fn transcribe(
            &mut self,
            _audio: &Path,
            _language: Option<&str>,
        ) -> Result<Vec<TranscriptSegment>> {
            Ok(Vec::new())
        }
    }

    struct CountingFactory(Arc<Counters>);

    impl CountingFactory {
        fn build(&self, kind: ProviderKind) -> Result<Handle> {
            if self.0.fail_next.swap(false, Ordering::SeqCst) {
                return Err(WorkerError::provider_init(kind, "weights missing"));
            }
            self.0.builds.fetch_add(1, Ordering::SeqCst);
            Ok(Handle(self.0.clone()))
        }
    }

    #[async_trait]
    impl ProviderFactory for CountingFactory {
        async fn synthesizer(
            &self,
            kind: ProviderKind,
            _device: Device,
            _model_dir: &Path,
        ) -> Result<Box<dyn Synthesizer>> {
            Ok(Box::new(self.build(kind)?))
        }

        async fn transcriber(
            &self,
            _device: Device,
            _model_dir: &Path,
        ) -> Result<Box<dyn Transcriber>> {
            Ok(Box::new(self.build(ProviderKind::Whisper)?))
        }
    }

    fn cache() -> (ResourceCache, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        let cache = ResourceCache::new(Box::new(CountingFactory(counters.clone())));
        (cache, counters)
    }

    #[tokio::test]
    async fn same_key_is_reused() {
        let (mut cache, counters) = cache();
        let dir = Path::new("/models/xtts_v2");
        cache.synthesizer(ProviderKind::Xtts, Device::Cpu, dir).await.expect("build");
        cache.synthesizer(ProviderKind::Xtts, Device::Cpu, dir).await.expect("hit");
        assert_eq!(counters.builds.load(Ordering::SeqCst), 1);
        assert!(cache.is_loaded(ProviderKind::Xtts, Device::Cpu));
    }

    #[tokio::test]
    async fn device_change_replaces_the_handle_once() {
        let (mut cache, counters) = cache();
        let dir = Path::new("/models/xtts_v2");
        cache.synthesizer(ProviderKind::Xtts, Device::Cpu, dir).await.expect("build");
        cache.synthesizer(ProviderKind::Xtts, Device::Gpu, dir).await.expect("rebuild");
        cache.synthesizer(ProviderKind::Xtts, Device::Gpu, dir).await.expect("hit");

        assert_eq!(counters.builds.load(Ordering::SeqCst), 2);
        assert_eq!(counters.drops.load(Ordering::SeqCst), 1);
        assert_eq!(cache.loaded(), vec![(ProviderKind::Xtts, Device::Gpu)]);
    }

    #[tokio::test]
    async fn kinds_have_independent_slots() {
        let (mut cache, counters) = cache();
        let dir = Path::new("/models");
        cache.synthesizer(ProviderKind::VietTts, Device::Cpu, dir).await.expect("viet");
        cache.synthesizer(ProviderKind::Xtts, Device::Cpu, dir).await.expect("xtts");
        cache.transcriber(Device::Cpu, dir).await.expect("whisper");
        cache.transcriber(Device::Cpu, dir).await.expect("whisper hit");

        assert_eq!(counters.builds.load(Ordering::SeqCst), 3);
        assert_eq!(
            cache.loaded(),
            vec![
                (ProviderKind::VietTts, Device::Cpu),
                (ProviderKind::Xtts, Device::Cpu),
                (ProviderKind::Whisper, Device::Cpu),
            ]
        );
    }

    #[tokio::test]
    async fn failed_build_leaves_the_slot_empty() {
        let (mut cache, counters) = cache();
        let dir = Path::new("/models/xtts_v2");
        cache.synthesizer(ProviderKind::Xtts, Device::Cpu, dir).await.expect("build");

        counters.fail_next.store(true, Ordering::SeqCst);
        let err = cache
            .synthesizer(ProviderKind::Xtts, Device::Gpu, dir)
            .await
            .err()
            .expect("build fails");
        assert!(matches!(err, WorkerError::ProviderInit { .. }));
        assert!(cache.loaded().is_empty());
        assert_eq!(counters.drops.load(Ordering::SeqCst), 1);

        cache.synthesizer(ProviderKind::Xtts, Device::Gpu, dir).await.expect("retry");
        assert_eq!(counters.builds.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn whisper_is_not_a_synthesizer() {
        let (mut cache, _) = cache();
        let err = cache
            .synthesizer(ProviderKind::Whisper, Device::Cpu, Path::new("/models"))
            .await
            .err()
            .expect("rejected");
        assert!(matches!(err, WorkerError::Config(_)));
    }
}
