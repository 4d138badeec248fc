//! Integration tests for recording graph calls and replaying them

mod common;

use anyhow::Result;
use common::backends::SplitPlaneBackend;
use common::builders::{radar_scope, radar_spec, raytrace_spec, yield_spec, RayFanBuilder};
use common::CountingNode;
use sensorgraph::field::tags;
use sensorgraph::graph::{SceneBinding, TraversableHandle};
use sensorgraph::{Field, Graph, NodeId, NodeSpec, RuntimeConfig, Tape, TapeCall, TapePlayer};
use std::sync::Arc;

fn scene() -> SceneBinding {
    SceneBinding::new(
        Arc::new(SplitPlaneBackend {
            near: 4.0,
            far: 12.0,
        }),
        TraversableHandle(3),
    )
}

/// Builds and runs a radar pipeline, returning the sink.
fn build_pipeline(graph: &mut Graph) -> Result<NodeId> {
    let rays = graph.create_node(RayFanBuilder::new(6).spec())?;
    let trace = graph.create_node(raytrace_spec(50.0))?;
    let compact = graph.create_node(NodeSpec::PointsCompact)?;
    let radar = graph.create_node(radar_spec(vec![radar_scope(50.0, 0.5, 0.1)]))?;
    let sink = graph.create_node(yield_spec(&[Field::Distance, Field::Azimuth]))?;

    graph.add_child(rays, trace)?;
    graph.add_child(trace, compact)?;
    graph.add_child(compact, radar)?;
    graph.add_child(radar, sink)?;
    graph.run(sink)?;

    // A parameter change followed by a second run is part of the recording
    graph.set_parameters(radar, radar_spec(vec![radar_scope(8.0, 0.5, 0.1)]))?;
    graph.run(sink)?;
    Ok(sink)
}

#[test]
fn test_replayed_tape_reproduces_results() -> Result<()> {
    let mut original = Graph::new()?;
    original.bind_scene(scene());
    original.start_recording();
    let sink = build_pipeline(&mut original)?;
    let tape = original.stop_recording().expect("recording was started");
    assert!(tape.is_replayable());
    assert_eq!(tape.calls.last(), Some(&TapeCall::Run { node: sink }));

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("radar.tape.json");
    tape.save(&path)?;
    let loaded = Tape::load(&path)?;
    assert_eq!(loaded, tape);

    let mut replayed = Graph::new()?;
    replayed.bind_scene(scene());
    let ids = TapePlayer::replay(&loaded, &mut replayed)?;
    let replayed_sink = ids[&sink.0];

    assert_eq!(
        replayed.get_result_typed::<tags::Distance>(replayed_sink)?,
        original.get_result_typed::<tags::Distance>(sink)?
    );
    assert_eq!(
        replayed.get_result_typed::<tags::Azimuth>(replayed_sink)?,
        original.get_result_typed::<tags::Azimuth>(sink)?
    );
    // Only the near wall is inside the reconfigured scope
    assert_eq!(replayed.get_result_size(replayed_sink, Field::Distance)?.0, 1);
    Ok(())
}

#[test]
fn test_record_on_start_from_config() -> Result<()> {
    let mut config = RuntimeConfig::default();
    config.tape.record_on_start = true;
    let dir = tempfile::tempdir()?;
    config.tape.path = Some(dir.path().join("auto.json"));

    let mut graph = Graph::from_runtime_config(&config)?;
    assert!(graph.is_recording());
    let node = graph.create_node(yield_spec(&[Field::Distance]))?;
    graph.destroy_node(node)?;

    let tape = graph.stop_recording().expect("recording on start");
    assert_eq!(tape.len(), 2);
    let written = tape.save_configured(&config.tape)?;
    assert_eq!(written.as_deref(), config.tape.path.as_deref());
    assert_eq!(Tape::load(dir.path().join("auto.json"))?.calls, tape.calls);
    Ok(())
}

#[test]
fn test_custom_nodes_make_tape_unreplayable() -> Result<()> {
    let mut graph = Graph::new()?;
    graph.start_recording();
    let (counting, _) = CountingNode::new(1.0, 1);
    let custom = graph.add_node(counting);
    let sink = graph.create_node(yield_spec(&[Field::Distance]))?;
    graph.add_child(custom.id(), sink)?;
    graph.run(sink)?;

    let tape = graph.stop_recording().expect("recording was started");
    assert!(!tape.is_replayable());
    assert!(matches!(
        tape.calls[0],
        TapeCall::Unreplayable { ref name, .. } if name == "Counting"
    ));

    let err = TapePlayer::replay(&tape, &mut Graph::new()?).unwrap_err();
    assert!(err.to_string().contains("cannot be replayed"));
    Ok(())
}
