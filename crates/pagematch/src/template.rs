//! Reference templates and the catalog that publishes them.
//!
//! A [`Template`] is immutable once built: its features are computed from its
//! normalized raster before it becomes visible to any registration call. The
//! [`TemplateStore`] hands out `Arc<Template>` snapshots, so a call that
//! resolved a template keeps using exactly that template even if the catalog
//! is swapped underneath it.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use image::{DynamicImage, GrayImage};
use parking_lot::RwLock;

use crate::error::RegistrationError;
use crate::features::{FeatureSet, OrbExtractor};
use crate::normalize::Normalizer;

/// An immutable reference page with precomputed features.
#[derive(Debug)]
pub struct Template {
    id: u64,
    name: String,
    reference: DynamicImage,
    normalized: GrayImage,
    features: FeatureSet,
}

impl Template {
    /// Normalize `reference` and extract its features.
    pub fn build(
        name: impl Into<String>,
        reference: DynamicImage,
        normalizer: &Normalizer,
        extractor: &OrbExtractor,
    ) -> Self {
        let name = name.into();
        let normalized = normalizer.normalize(&reference);
        let features = extractor.extract(&normalized);
        tracing::info!(
            "built template '{}': {}x{}, {} keypoints",
            name,
            normalized.width(),
            normalized.height(),
            features.len()
        );
        Self {
            id: 0,
            name,
            reference,
            normalized,
            features,
        }
    }

    /// Generation id stamped by the [`TemplateStore`] that published this
    /// template; 0 until published. Unique within one store.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn reference(&self) -> &DynamicImage {
        &self.reference
    }

    pub fn normalized(&self) -> &GrayImage {
        &self.normalized
    }

    pub fn features(&self) -> &FeatureSet {
        &self.features
    }

    pub fn width(&self) -> u32 {
        self.normalized.width()
    }

    pub fn height(&self) -> u32 {
        self.normalized.height()
    }
}

#[derive(Debug)]
struct Catalog {
    active: Arc<Template>,
    entries: BTreeMap<String, Arc<Template>>,
}

/// Thread-safe catalog of named templates with one active entry.
#[derive(Debug)]
pub struct TemplateStore {
    inner: RwLock<Catalog>,
    next_generation: AtomicU64,
}

impl TemplateStore {
    pub fn new(mut initial: Template) -> Self {
        initial.id = 1;
        let active = Arc::new(initial);
        let mut entries = BTreeMap::new();
        entries.insert(active.name().to_string(), Arc::clone(&active));
        Self {
            inner: RwLock::new(Catalog { active, entries }),
            next_generation: AtomicU64::new(2),
        }
    }

    /// Stamp the next generation id; done before the write lock is taken.
    fn publish(&self, mut template: Template) -> Arc<Template> {
        template.id = self.next_generation.fetch_add(1, Ordering::Relaxed);
        Arc::new(template)
    }

    /// Insert or replace `template` and make it the active entry.
    ///
    /// Returns the previously active template.
    pub fn set_catalog(&self, template: Template) -> Arc<Template> {
        let template = self.publish(template);
        let mut guard = self.inner.write();
        guard
            .entries
            .insert(template.name().to_string(), Arc::clone(&template));
        let previous = std::mem::replace(&mut guard.active, template);
        tracing::info!(
            "active template swapped: '{}' (generation {}) -> '{}' (generation {})",
            previous.name(),
            previous.id(),
            guard.active.name(),
            guard.active.id()
        );
        previous
    }

    /// Insert or replace a named entry without changing the active one,
    /// unless the replaced entry is the active one.
    pub fn insert(&self, template: Template) -> Option<Arc<Template>> {
        let template = self.publish(template);
        let mut guard = self.inner.write();
        if guard.active.name() == template.name() {
            guard.active = Arc::clone(&template);
        }
        guard
            .entries
            .insert(template.name().to_string(), template)
    }

    /// Remove a non-active entry. The active template cannot be removed.
    pub fn remove(&self, name: &str) -> Option<Arc<Template>> {
        let mut guard = self.inner.write();
        if guard.active.name() == name {
            tracing::warn!("refusing to remove active template '{}'", name);
            return None;
        }
        guard.entries.remove(name)
    }

    /// Snapshot of the active template.
    pub fn active(&self) -> Arc<Template> {
        Arc::clone(&self.inner.read().active)
    }

    /// Snapshot of the named template, or the active one for `None`.
    pub fn resolve(&self, name: Option<&str>) -> Result<Arc<Template>, RegistrationError> {
        let guard = self.inner.read();
        match name {
            None => Ok(Arc::clone(&guard.active)),
            Some(n) => guard
                .entries
                .get(n)
                .cloned()
                .ok_or_else(|| RegistrationError::UnknownTemplate {
                    name: n.to_string(),
                }),
        }
    }

    /// Catalog entry names in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.inner.read().entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
