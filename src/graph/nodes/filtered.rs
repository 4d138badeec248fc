//! Outputs of nodes that keep a subset of their input points.
//!
//! Such a node only computes an index list during execute. Output fields are
//! gathered from the input on demand, device side, and memoized in a
//! [`FieldCache`] for the rest of the pass. At the end of execute every field
//! requested so far is gathered again, so later queries (possibly from
//! another thread) never need to enqueue device work themselves.

use crate::field::Field;
use crate::graph::cache::{CacheLookup, FieldCache, FieldState};
use crate::graph::error::{GraphError, GraphResult};
use crate::graph::kernels;
use crate::graph::node::PointsInput;
use crate::memory::{Buffer, Stream, TypedBuffer};
use std::sync::{Mutex, MutexGuard, PoisonError};

pub struct FilteredFields {
    owner: &'static str,
    cache: Mutex<FieldCache>,
    indices: Option<TypedBuffer<u32>>,
    stream: Option<Stream>,
}

impl FilteredFields {
    pub fn new(owner: &'static str) -> Self {
        Self {
            owner,
            cache: Mutex::new(FieldCache::new()),
            indices: None,
            stream: None,
        }
    }

    fn lock(&self) -> MutexGuard<'_, FieldCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Forget every cached field; used whenever the node is (re)validated.
    pub fn reset(&mut self) {
        self.lock().clear();
        self.indices = None;
    }

    /// Open a new pass on `stream`; cached fields become stale.
    pub fn begin_pass(&mut self, stream: &Stream) {
        self.lock().trigger();
        self.stream = Some(stream.clone());
    }

    pub fn set_indices(&mut self, indices: TypedBuffer<u32>) {
        self.indices = Some(indices);
    }

    /// Number of kept points; zero before the first execute.
    pub fn width(&self) -> usize {
        self.indices.as_ref().map(TypedBuffer::count).unwrap_or(0)
    }

    pub fn cached_fields(&self) -> Vec<Field> {
        self.lock().keys()
    }

    pub fn is_latest(&self, field: Field) -> bool {
        self.lock().is_latest(field)
    }

    /// `field` of the kept points, gathered at most once per pass.
    pub fn field_data(&self, input: &PointsInput, field: Field) -> GraphResult<Buffer> {
        let mut cache = self.lock();
        let previous = match cache.lookup(field) {
            CacheLookup::Fresh(buffer) => return Ok(buffer),
            CacheLookup::Stale(buffer) => Some(buffer),
            CacheLookup::Absent => None,
        };

        let source = input.field_data(field)?;
        if !source.is_device_accessible() {
            return Err(GraphError::FieldNotDeviceAccessible {
                node: self.owner.to_string(),
                field,
            });
        }
        let (indices, stream) = match (&self.indices, &self.stream) {
            (Some(indices), Some(stream)) => (indices, stream),
            _ => {
                return Err(GraphError::InvalidPipeline(format!(
                    "{} has not been executed",
                    self.owner
                )))
            }
        };

        if indices.is_empty() {
            // Nothing kept: an empty slot is reused instead of launching a gather
            if !previous.as_ref().is_some_and(Buffer::is_empty) {
                cache.insert(field, Buffer::new(source.element_kind(), stream), true);
            }
            cache.set_updated(field);
            return cache.get_value(field).ok_or_else(|| GraphError::FieldMissing {
                node: self.owner.to_string(),
                field,
            });
        }

        let first_request = !cache.contains(field);
        let gathered = kernels::gather(stream, &source, indices)?;
        cache.replace(field, gathered.clone());
        tracing::debug!(
            "{} gathered {} for {} points (epoch {}, first request: {})",
            self.owner,
            field,
            indices.count(),
            cache.epoch(),
            first_request
        );
        Ok(gathered)
    }

    /// Recompute every previously requested field that is stale in the
    /// current pass.
    pub fn materialize_all(&self, input: &PointsInput) -> GraphResult<()> {
        let stale: Vec<Field> = {
            let cache = self.lock();
            cache
                .keys()
                .into_iter()
                .filter(|&field| cache.state(field) == FieldState::Stale)
                .collect()
        };
        for field in stale {
            self.field_data(input, field)?;
        }
        Ok(())
    }
}
