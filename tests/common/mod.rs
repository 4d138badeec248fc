//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod backends;

use sensorgraph::graph::{ExecContext, Node, PointsNode, ValidateContext};
use sensorgraph::{Buffer, Field, GraphResult, Mat3x4f, TypedBuffer};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Assert two floats are approximately equal
pub fn assert_float_eq(a: f32, b: f32, epsilon: f32) {
    assert!(
        (a - b).abs() < epsilon,
        "Expected {} to be approximately equal to {} (epsilon: {})",
        a,
        b,
        epsilon
    );
}

/// Custom source node emitting `value` as the distance of `count` points,
/// counting its executions.
pub struct CountingNode {
    pub value: f32,
    pub count: usize,
    host_only: bool,
    executions: Arc<AtomicUsize>,
    distance: Option<Buffer>,
}

impl CountingNode {
    pub fn new(value: f32, count: usize) -> (Self, Arc<AtomicUsize>) {
        let executions = Arc::new(AtomicUsize::new(0));
        let node = Self {
            value,
            count,
            host_only: false,
            executions: Arc::clone(&executions),
            distance: None,
        };
        (node, executions)
    }

    /// Publish the distances in host-only memory.
    pub fn host_only(mut self) -> Self {
        self.host_only = true;
        self
    }

    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }
}

impl Node for CountingNode {
    fn name(&self) -> &str {
        "Counting"
    }

    fn validate(&mut self, ctx: &ValidateContext<'_>) -> GraphResult<()> {
        if !ctx.inputs.is_empty() {
            return Err(sensorgraph::GraphError::InvalidPipeline(
                "Counting takes no inputs".to_string(),
            ));
        }
        Ok(())
    }

    fn enqueue_exec(&mut self, ctx: &ExecContext) -> GraphResult<()> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        let values = vec![self.value; self.count];
        let distance = if self.host_only {
            let buffer = TypedBuffer::<f32>::host_only();
            buffer.set_data(&values)?;
            buffer
        } else {
            TypedBuffer::from_slice(&values, &ctx.stream)?
        };
        self.distance = Some(distance.into_untyped());
        Ok(())
    }

    fn as_points(&self) -> Option<&dyn PointsNode> {
        Some(self)
    }
}

impl PointsNode for CountingNode {
    fn is_dense(&self) -> bool {
        true
    }

    fn has_field(&self, field: Field) -> bool {
        field == Field::Distance
    }

    fn width(&self) -> GraphResult<usize> {
        Ok(self.count)
    }

    fn look_at_origin_transform(&self) -> Mat3x4f {
        Mat3x4f::identity()
    }

    fn field_data(&self, field: Field) -> GraphResult<Buffer> {
        match (&self.distance, field) {
            (Some(buffer), Field::Distance) => Ok(buffer.clone()),
            _ => Err(sensorgraph::GraphError::FieldMissing {
                node: self.name().to_string(),
                field,
            }),
        }
    }
}
