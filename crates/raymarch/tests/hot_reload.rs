mod common;

use std::fs;

use glam::Vec3;
use raymarch::{GpuCommand, RenderError, ShaderStage};

#[test]
fn failed_reload_keeps_the_previous_program() {
    let dir = tempfile::tempdir().unwrap();
    common::write_shaders(dir.path());
    let mut scene = common::scene_in(dir.path());

    let shader = scene.add_shader(common::VERT_NAME, common::FRAG_NAME).unwrap();
    let material = scene.add_material(shader).unwrap();
    scene.material_mut(material).unwrap().set_property("color", Vec3::new(1.0, 0.5, 0.25));
    scene.add_object(scene.quad(), material).unwrap();

    let program = scene.assets().shaders[shader].handle().unwrap();
    let layout_before = scene.backend().program_layout(program).cloned().unwrap();
    let locations_before: Vec<_> = ["color", "radius", "steps", "view_matrix"]
        .iter()
        .map(|name| scene.assets().shaders[shader].uniform_location(scene.backend(), name))
        .collect();
    scene.render_frame().unwrap();
    let block_before = scene.backend().uniform_block(program, 1).unwrap().to_vec();

    fs::write(dir.path().join(common::FRAG_NAME), common::FRAG_BROKEN).unwrap();
    let report = scene.reload_shaders();
    assert_eq!(report.reloaded, 0);
    assert_eq!(report.failed.len(), 1);
    assert!(matches!(
        report.failed[0].1,
        RenderError::ShaderCompileFailed { stage: ShaderStage::Fragment, .. }
    ));

    assert_eq!(scene.assets().shaders[shader].handle(), Some(program));
    assert_eq!(scene.backend().live_programs(), 1);
    assert_eq!(scene.backend().program_layout(program), Some(&layout_before));
    let locations_after: Vec<_> = ["color", "radius", "steps", "view_matrix"]
        .iter()
        .map(|name| scene.assets().shaders[shader].uniform_location(scene.backend(), name))
        .collect();
    assert_eq!(locations_before, locations_after);

    scene.backend_mut().clear_commands();
    let stats = scene.render_frame().unwrap();
    assert_eq!(stats.draws, 1);
    let draws = scene.backend().draw_calls();
    assert_eq!(draws[0].program, program);
    assert_eq!(scene.backend().uniform_block(program, 1).unwrap(), block_before.as_slice());
}

#[test]
fn reloading_twice_is_equivalent_to_the_original() {
    let dir = tempfile::tempdir().unwrap();
    common::write_shaders(dir.path());
    let mut scene = common::scene_in(dir.path());
    let shader = scene.add_shader(common::VERT_NAME, common::FRAG_NAME).unwrap();
    let material = scene.add_material(shader).unwrap();
    scene.add_object(scene.quad(), material).unwrap();

    let original = scene.assets().shaders[shader].handle().unwrap();
    let original_layout = scene.backend().program_layout(original).cloned().unwrap();

    assert!(scene.reload_shaders().is_clean());
    assert!(scene.reload_shaders().is_clean());

    let current = scene.assets().shaders[shader].handle().unwrap();
    assert_ne!(current, original);
    assert_eq!(scene.backend().program_layout(current), Some(&original_layout));
    assert_eq!(scene.backend().live_programs(), 1);
    assert!(scene.backend().commands().contains(&GpuCommand::DestroyProgram(original)));
}

#[test]
fn successful_reload_picks_up_edited_source() {
    let dir = tempfile::tempdir().unwrap();
    common::write_shaders(dir.path());
    let mut scene = common::scene_in(dir.path());
    let shader = scene.add_shader(common::VERT_NAME, common::FRAG_NAME).unwrap();
    let material = scene.add_material(shader).unwrap();
    scene.add_object(scene.quad(), material).unwrap();
    let before = scene.assets().shaders[shader].handle();

    fs::write(dir.path().join(common::FRAG_NAME), common::FRAG_EDITED).unwrap();
    let report = scene.reload_shaders();
    assert_eq!(report.reloaded, 1);
    assert_ne!(scene.assets().shaders[shader].handle(), before);
}

#[test]
fn missing_source_file_reports_compile_failure() {
    let dir = tempfile::tempdir().unwrap();
    common::write_shaders(dir.path());
    let mut scene = common::scene_in(dir.path());
    let shader = scene.add_shader(common::VERT_NAME, common::FRAG_NAME).unwrap();
    let material = scene.add_material(shader).unwrap();
    scene.add_object(scene.quad(), material).unwrap();
    let program = scene.assets().shaders[shader].handle().unwrap();

    fs::remove_file(dir.path().join(common::VERT_NAME)).unwrap();
    let report = scene.reload_shaders();
    match &report.failed[..] {
        [(id, RenderError::ShaderCompileFailed { stage, path, .. })] => {
            assert_eq!(*id, shader);
            assert_eq!(*stage, ShaderStage::Vertex);
            assert!(path.ends_with(common::VERT_NAME));
        }
        other => panic!("unexpected reload result {other:?}"),
    }
    assert_eq!(scene.assets().shaders[shader].handle(), Some(program));

    scene.backend_mut().clear_commands();
    scene.render_frame().unwrap();
    assert_eq!(scene.backend().bound_program(), Some(program));
    assert_eq!(scene.backend().draw_calls().len(), 1);
}

#[test]
fn first_load_failure_stores_nothing() {
    let dir = tempfile::tempdir().unwrap();
    common::write_shaders(dir.path());
    fs::write(dir.path().join(common::FRAG_NAME), common::FRAG_BROKEN).unwrap();
    let mut scene = common::scene_in(dir.path());

    let err = scene.add_shader(common::VERT_NAME, common::FRAG_NAME).unwrap_err();
    assert!(matches!(err, RenderError::ShaderCompileFailed { stage: ShaderStage::Fragment, .. }));
    assert!(scene.assets().shaders.is_empty());
    assert_eq!(scene.backend().live_programs(), 0);
}

#[test]
fn failed_link_keeps_the_previous_program() {
    let dir = tempfile::tempdir().unwrap();
    common::write_shaders(dir.path());
    let mut scene = common::scene_in(dir.path());
    let shader = scene.add_shader(common::VERT_NAME, common::FRAG_NAME).unwrap();
    let material = scene.add_material(shader).unwrap();
    scene.add_object(scene.quad(), material).unwrap();
    let program = scene.assets().shaders[shader].handle().unwrap();
    let attempts = scene.backend().link_attempts();

    fs::write(dir.path().join(common::FRAG_NAME), common::FRAG_UNLINKABLE).unwrap();
    let report = scene.reload_shaders();
    assert_eq!(report.reloaded, 0);
    assert!(matches!(report.failed.as_slice(), [(id, RenderError::ShaderLinkFailed { .. })] if *id == shader));
    assert_eq!(scene.backend().link_attempts(), attempts + 1);
    assert_eq!(scene.assets().shaders[shader].handle(), Some(program));
    assert_eq!(scene.backend().live_programs(), 1);

    scene.backend_mut().clear_commands();
    assert_eq!(scene.render_frame().unwrap().draws, 1);
    assert_eq!(scene.backend().bound_program(), Some(program));
    assert_eq!(scene.backend().draw_calls()[0].program, program);
}
