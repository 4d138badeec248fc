//! Integration tests for graph construction, invalidation and execution

mod common;

use anyhow::Result;
use common::backends::PlaneBackend;
use common::builders::{raytrace_spec, yield_spec, RayFanBuilder};
use common::CountingNode;
use sensorgraph::config::DeviceConfig;
use sensorgraph::field::tags;
use sensorgraph::graph::{SceneBinding, TraversableHandle};
use sensorgraph::{
    Field, Graph, GraphError, Mat3x4f, MemoryError, NodeSpec, NodeState, TypedBuffer, Vec3f,
};
use std::sync::Arc;

#[test]
fn test_custom_node_executes_once_per_run() -> Result<()> {
    let mut graph = Graph::new()?;
    let (counting, executions) = CountingNode::new(1.5, 4);
    let source = graph.add_node(counting);
    let first = graph.create_node(yield_spec(&[Field::Distance]))?;
    let second = graph.create_node(NodeSpec::PointsFormat {
        fields: vec![Field::Distance, Field::Padding32],
    })?;
    graph.add_child(source.id(), first)?;
    graph.add_child(source.id(), second)?;

    // Running one branch runs the whole component, the source only once
    let report = graph.run(first)?;
    assert_eq!(report.executed, 3);
    assert_eq!(executions.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert_eq!(graph.node_state(second)?, NodeState::Executed);

    graph.run(second)?;
    assert_eq!(source.read().executions(), 2);
    assert_eq!(graph.get_result_size(second, Field::DynamicFormat)?, (4, 8));
    Ok(())
}

#[test]
fn test_configure_invalidates_descendants() -> Result<()> {
    let mut graph = Graph::new()?;
    let (counting, _) = CountingNode::new(1.0, 2);
    let source = graph.add_node(counting);
    let sink = graph.create_node(yield_spec(&[Field::Distance]))?;
    graph.add_child(source.id(), sink)?;
    graph.run(sink)?;

    graph.configure(&source, |node| {
        node.value = 3.0;
        Ok(())
    })?;
    assert_eq!(graph.node_state(source.id())?, NodeState::Unconfigured);
    assert_eq!(graph.node_state(sink)?, NodeState::Unconfigured);
    assert_eq!(
        graph.get_result_typed::<tags::Distance>(sink),
        Err(GraphError::ResultsUnavailable(sink))
    );

    graph.run(sink)?;
    assert_eq!(graph.get_result_typed::<tags::Distance>(sink)?, vec![3.0, 3.0]);
    Ok(())
}

#[test]
fn test_reconnect_revalidates_child() -> Result<()> {
    let mut graph = Graph::new()?;
    let (one, _) = CountingNode::new(1.0, 1);
    let (two, _) = CountingNode::new(2.0, 3);
    let a = graph.add_node(one);
    let b = graph.add_node(two);
    let sink = graph.create_node(yield_spec(&[Field::Distance]))?;

    graph.add_child(a.id(), sink)?;
    graph.run(sink)?;
    assert_eq!(graph.get_result_typed::<tags::Distance>(sink)?, vec![1.0]);

    graph.remove_child(a.id(), sink)?;
    graph.add_child(b.id(), sink)?;
    // The sink and the newly attached source validate; nothing else runs
    let report = graph.run(sink)?;
    assert_eq!(report.validated, 2);
    assert_eq!(report.executed, 2);
    assert_eq!(graph.get_result_typed::<tags::Distance>(sink)?, vec![2.0; 3]);
    // The detached source is in another component now
    assert_eq!(a.read().executions(), 1);
    Ok(())
}

#[test]
fn test_device_limit_surfaces_resource_error() -> Result<()> {
    let mut graph = Graph::from_config(&DeviceConfig {
        memory_limit_bytes: Some(64),
        ..DeviceConfig::default()
    })?;
    graph.bind_scene(SceneBinding::new(
        Arc::new(PlaneBackend::new(10.0)),
        TraversableHandle(1),
    ));
    let rays = graph.create_node(RayFanBuilder::new(16).spec())?;
    let trace = graph.create_node(raytrace_spec(100.0))?;
    graph.add_child(rays, trace)?;

    let err = graph.run(trace).unwrap_err();
    assert!(matches!(
        err,
        GraphError::Memory(MemoryError::OutOfDeviceMemory { .. })
    ));
    assert_eq!(graph.node_state(trace)?, NodeState::Unconfigured);
    assert_eq!(
        graph.get_result_size(trace, Field::Xyz),
        Err(GraphError::ResultsUnavailable(trace))
    );
    Ok(())
}

#[test]
fn test_raytrace_without_scene_fails_validation() -> Result<()> {
    let mut graph = Graph::new()?;
    let rays = graph.create_node(RayFanBuilder::new(2).spec())?;
    let trace = graph.create_node(raytrace_spec(100.0))?;
    graph.add_child(rays, trace)?;

    assert!(matches!(graph.run(trace), Err(GraphError::InvalidPipeline(_))));
    assert_eq!(graph.execution_count(rays)?, 0);
    Ok(())
}

#[test]
fn test_host_read_observes_device_write() -> Result<()> {
    let graph = Graph::new()?;
    let stream = graph.stream();
    let buffer = TypedBuffer::from_slice(&[0u32; 8], stream)?;

    let slice = buffer.device_write()?;
    stream.launch("fill", move |scope| {
        slice.write(scope, |values| values.fill(7))?;
        Ok(())
    })?;

    // No explicit synchronize: the host read waits for the kernel
    assert_eq!(buffer.to_vec()?, vec![7; 8]);
    Ok(())
}

#[test]
fn test_kernel_failure_is_sticky_until_synchronize() -> Result<()> {
    let graph = Graph::new()?;
    graph.stream().launch("boom", |_| {
        Err(MemoryError::KernelFailed {
            kernel: "boom".to_string(),
            message: "injected".to_string(),
        })
    })?;

    assert!(matches!(
        graph.synchronize(),
        Err(GraphError::Memory(MemoryError::KernelFailed { .. }))
    ));
    graph.synchronize()?;
    Ok(())
}

#[test]
fn test_kernel_failure_discards_run_results() -> Result<()> {
    let mut graph = Graph::new()?;
    let source = graph.create_node(NodeSpec::PointsFromArray {
        fields: vec![Field::Xyz],
        data: [1.0f32, 2.0, 3.0].iter().flat_map(|v| v.to_ne_bytes()).collect(),
    })?;
    let moved = graph.create_node(NodeSpec::PointsTransform {
        transform: Mat3x4f::translation(10.0, 0.0, 0.0),
    })?;
    graph.add_child(source, moved)?;

    // Everything the run enqueues is skipped behind this failure
    graph.stream().launch("boom", |_| {
        Err(MemoryError::KernelFailed {
            kernel: "boom".to_string(),
            message: "injected".to_string(),
        })
    })?;
    graph.run(moved)?;

    assert!(matches!(
        graph.get_result_typed::<tags::Xyz>(moved),
        Err(GraphError::Memory(MemoryError::KernelFailed { .. }))
    ));
    // The error was reported once; later readers must not see stale data
    assert_eq!(
        graph.get_result_typed::<tags::Xyz>(moved),
        Err(GraphError::ResultsUnavailable(moved))
    );
    assert_eq!(
        graph.get_result_size(moved, Field::Xyz),
        Err(GraphError::ResultsUnavailable(moved))
    );
    assert_eq!(graph.node_state(moved)?, NodeState::Unconfigured);

    let report = graph.run(moved)?;
    assert_eq!(report.validated, 2);
    assert_eq!(
        graph.get_result_typed::<tags::Xyz>(moved)?,
        vec![Vec3f::new(11.0, 2.0, 3.0)]
    );
    assert_eq!(graph.node_state(moved)?, NodeState::Executed);
    Ok(())
}

#[test]
fn test_host_only_field_rejected_by_device_consumer() -> Result<()> {
    let mut graph = Graph::new()?;
    let (counting, _) = CountingNode::new(2.0, 4);
    let source = graph.add_node(counting.host_only());
    let format = graph.create_node(NodeSpec::PointsFormat {
        fields: vec![Field::Distance, Field::Padding32],
    })?;
    graph.add_child(source.id(), format)?;

    let err = graph.run(format).unwrap_err();
    assert_eq!(
        err,
        GraphError::FieldNotDeviceAccessible {
            node: "FormatPoints".to_string(),
            field: Field::Distance,
        }
    );
    assert!(err.to_string().contains(&Field::Distance.to_string()));
    assert_eq!(graph.node_state(format)?, NodeState::Unconfigured);
    // The host-only source itself still executed and can be read
    assert_eq!(graph.get_result_typed::<tags::Distance>(source.id())?, vec![2.0; 4]);
    Ok(())
}

#[test]
fn test_results_queried_from_other_threads() -> Result<()> {
    let mut graph = Graph::new()?;
    let (counting, _) = CountingNode::new(4.0, 16);
    let source = graph.add_node(counting);
    let sink = graph.create_node(yield_spec(&[Field::Distance]))?;
    graph.add_child(source.id(), sink)?;
    graph.run(sink)?;

    let graph = &graph;
    std::thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                s.spawn(move || {
                    let size = graph.get_result_size(sink, Field::Distance).unwrap();
                    let data = graph.get_result_typed::<tags::Distance>(sink).unwrap();
                    (size, data)
                })
            })
            .collect();
        for handle in handles {
            let ((count, point_size), data) = handle.join().unwrap();
            assert_eq!(count, 16);
            assert_eq!(point_size, 4);
            assert_eq!(data, vec![4.0; 16]);
        }
    });
    Ok(())
}
