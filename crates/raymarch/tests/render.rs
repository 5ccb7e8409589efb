mod common;

use glam::{Mat4, Vec3};
use raymarch::raymarcher::{MODEL_MATRIX, VIEW_MATRIX};
use raymarch::{
    Assets, Camera, GpuCommand, Material, RayMarcher, RecordingBackend, RenderError, ShaderProgram, Topology,
    UniformValue,
};

#[test]
fn one_object_issues_exactly_one_draw() {
    let dir = tempfile::tempdir().unwrap();
    common::write_shaders(dir.path());
    let mut scene = common::scene_in(dir.path());
    assert_eq!(scene.assets().geometries[scene.quad()].draw_count(), 4);
    assert_eq!(scene.assets().geometries[scene.cube()].draw_count(), 36);

    let shader = scene.add_shader(common::VERT_NAME, common::FRAG_NAME).unwrap();
    let material = scene.add_material(shader).unwrap();
    scene.add_object(scene.quad(), material).unwrap();

    let stats = scene.render_frame().unwrap();
    assert_eq!(stats.draws, 1);
    assert_eq!(stats.skipped, 0);
    let draws = scene.backend().draw_calls();
    assert_eq!(draws.len(), 1);
    assert_eq!(draws[0].call.topology, Topology::TriangleStrip);
    assert_eq!(draws[0].call.count, 4);
    assert!(!draws[0].call.indexed);
}

#[test]
fn draws_follow_registration_order() {
    let dir = tempfile::tempdir().unwrap();
    common::write_shaders(dir.path());
    let mut scene = common::scene_in(dir.path());
    let shader = scene.add_shader(common::VERT_NAME, common::FRAG_NAME).unwrap();
    let material = scene.add_material(shader).unwrap();
    let cube = scene.add_object(scene.cube(), material).unwrap();
    scene.add_object(scene.quad(), material).unwrap();
    // Registering twice draws twice.
    scene.raymarcher_mut().add_object(cube);

    scene.render_frame().unwrap();
    let counts: Vec<_> = scene.backend().draw_calls().iter().map(|d| d.call.count).collect();
    assert_eq!(counts, vec![36, 4, 36]);
}

#[test]
fn shared_shader_reloads_once() {
    let dir = tempfile::tempdir().unwrap();
    common::write_shaders(dir.path());
    let mut scene = common::scene_in(dir.path());
    let shader = scene.add_shader(common::VERT_NAME, common::FRAG_NAME).unwrap();
    for _ in 0..5 {
        let material = scene.add_material(shader).unwrap();
        scene.add_object(scene.quad(), material).unwrap();
    }
    let before = scene.backend().link_attempts();

    let report = scene.reload_shaders();
    assert_eq!(report.reloaded, 1);
    assert_eq!(scene.backend().link_attempts(), before + 1);
}

#[test]
fn each_distinct_shader_reloads_once() {
    let dir = tempfile::tempdir().unwrap();
    common::write_shaders(dir.path());
    let mut scene = common::scene_in(dir.path());
    let first = scene.add_shader(common::VERT_NAME, common::FRAG_NAME).unwrap();
    let second = scene.add_shader(common::VERT_NAME, common::FRAG_NAME).unwrap();
    for shader in [first, second, first, second] {
        let material = scene.add_material(shader).unwrap();
        scene.add_object(scene.cube(), material).unwrap();
    }
    let before = scene.backend().link_attempts();
    assert_eq!(scene.raymarcher().shaders_in_use(scene.assets()), vec![first, second]);
    assert_eq!(scene.reload_shaders().reloaded, 2);
    assert_eq!(scene.backend().link_attempts(), before + 2);
}

#[test]
fn last_property_value_is_the_one_uploaded() {
    let dir = tempfile::tempdir().unwrap();
    common::write_shaders(dir.path());
    let mut scene = common::scene_in(dir.path());
    let shader = scene.add_shader(common::VERT_NAME, common::FRAG_NAME).unwrap();
    let material = scene.add_material(shader).unwrap();
    scene.add_object(scene.quad(), material).unwrap();

    let props = scene.material_mut(material).unwrap();
    props.set_property("radius", 1.0f32);
    props.set_property("radius", 3.0f32);
    scene.backend_mut().clear_commands();
    scene.render_frame().unwrap();

    let uploads: Vec<_> = scene
        .backend()
        .commands()
        .iter()
        .filter_map(|c| match c {
            GpuCommand::SetUniform { name, value, .. } if name == "radius" => Some(*value),
            _ => None,
        })
        .collect();
    assert_eq!(uploads, vec![UniformValue::Float(3.0)]);
    let program = scene.assets().shaders[shader].handle().unwrap();
    assert_eq!(scene.backend().uniform_value(program, "radius"), Some(UniformValue::Float(3.0)));
}

#[test]
fn two_samplers_get_two_units() {
    let dir = tempfile::tempdir().unwrap();
    common::write_shaders(dir.path());
    let mut scene = common::scene_in(dir.path());
    let shader = scene.add_shader(common::VERT_NAME, common::FRAG_NAME).unwrap();
    let material = scene.add_material(shader).unwrap();
    scene.add_object(scene.quad(), material).unwrap();

    let albedo = scene.load_texture("albedo.png", true);
    let detail = scene.load_texture("detail.png", false);
    let props = scene.material_mut(material).unwrap();
    props.add_texture("albedo", albedo);
    props.add_texture("detail", detail);
    scene.render_frame().unwrap();

    let program = scene.assets().shaders[shader].handle().unwrap();
    let albedo_unit = scene.backend().sampler_unit(program, "albedo").unwrap();
    let detail_unit = scene.backend().sampler_unit(program, "detail").unwrap();
    assert_ne!(albedo_unit, detail_unit);

    let draws = scene.backend().draw_calls();
    let mut textures = draws[0].textures.clone();
    textures.sort();
    assert_eq!(textures, {
        let mut expected = vec![(albedo_unit, albedo), (detail_unit, detail)];
        expected.sort();
        expected
    });
}

#[test]
fn materials_sharing_a_shader_do_not_leak_into_each_other() {
    let dir = tempfile::tempdir().unwrap();
    common::write_shaders(dir.path());
    let mut scene = common::scene_in(dir.path());
    let shader = scene.add_shader(common::VERT_NAME, common::FRAG_NAME).unwrap();
    let textured = scene.add_material(shader).unwrap();
    let plain = scene.add_material(shader).unwrap();
    scene.add_object(scene.quad(), textured).unwrap();
    scene.add_object(scene.quad(), plain).unwrap();

    let albedo = scene.load_texture("albedo.png", true);
    let props = scene.material_mut(textured).unwrap();
    props.add_texture("albedo", albedo);
    props.set_property("radius", 7.0f32);

    scene.render_frame().unwrap();
    let draws = scene.backend().draw_calls();
    assert_eq!(draws.len(), 2);
    assert_eq!(draws[0].textures, vec![(0, albedo)]);
    assert!(draws[1].textures.is_empty());

    let program = scene.assets().shaders[shader].handle().unwrap();
    assert_eq!(scene.backend().uniform_value(program, "radius"), None);
    assert_eq!(scene.backend().sampler_unit(program, "albedo"), None);

    // Drawing in the other order gives the textured object the same state.
    scene.raymarcher_mut().clear_objects();
    let objects: Vec<_> = scene.assets().objects.keys().collect();
    for &object in objects.iter().rev() {
        scene.raymarcher_mut().add_object(object);
    }
    scene.backend_mut().clear_commands();
    scene.render_frame().unwrap();
    let draws = scene.backend().draw_calls();
    assert!(draws[0].textures.is_empty());
    assert_eq!(draws[1].textures, vec![(0, albedo)]);
    assert_eq!(scene.backend().uniform_value(program, "radius"), Some(UniformValue::Float(7.0)));
}

#[test]
fn missing_texture_still_yields_a_bindable_handle() {
    let dir = tempfile::tempdir().unwrap();
    let mut scene = common::scene_in(dir.path());
    let texture = scene.load_texture("nope.png", true);
    assert_eq!(scene.backend().texture_info(texture), Some(None));
}

#[test]
fn builtin_matrices_follow_material_properties() {
    let dir = tempfile::tempdir().unwrap();
    common::write_shaders(dir.path());
    let mut scene = common::scene_in(dir.path());
    let shader = scene.add_shader(common::VERT_NAME, common::FRAG_NAME).unwrap();
    let material = scene.add_material(shader).unwrap();
    let object = scene.add_object(scene.cube(), material).unwrap();
    let model = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
    scene.object_mut(object).unwrap().set_model_matrix(model);
    scene
        .material_mut(material)
        .unwrap()
        .set_property(MODEL_MATRIX, Mat4::IDENTITY);

    scene.render_frame().unwrap();
    let program = scene.assets().shaders[shader].handle().unwrap();
    let view = scene.camera().unwrap().view_matrix();
    assert_eq!(scene.backend().uniform_value(program, MODEL_MATRIX), Some(UniformValue::Mat4(model)));
    assert_eq!(scene.backend().uniform_value(program, VIEW_MATRIX), Some(UniformValue::Mat4(view)));
}

#[test]
fn unlinked_shader_is_skipped_without_failing() {
    let dir = tempfile::tempdir().unwrap();
    common::write_shaders(dir.path());
    let mut scene = common::scene_in(dir.path());
    let good = scene.add_shader(common::VERT_NAME, common::FRAG_NAME).unwrap();
    let unlinked = scene.insert_shader(ShaderProgram::new("a.vert.wgsl", "a.frag.wgsl"));
    let broken = scene.add_material(unlinked).unwrap();
    let working = scene.add_material(good).unwrap();
    scene.add_object(scene.quad(), broken).unwrap();
    scene.add_object(scene.quad(), working).unwrap();

    let stats = scene.render_frame().unwrap();
    assert_eq!(stats.draws, 1);
    assert_eq!(stats.skipped, 1);
}

#[test]
fn removing_a_geometry_frees_its_mesh_and_objects() {
    let dir = tempfile::tempdir().unwrap();
    common::write_shaders(dir.path());
    let mut scene = common::scene_in(dir.path());
    let shader = scene.add_shader(common::VERT_NAME, common::FRAG_NAME).unwrap();
    let material = scene.add_material(shader).unwrap();
    let cube = scene.cube();
    scene.add_object(cube, material).unwrap();
    let kept = scene.add_object(scene.quad(), material).unwrap();
    assert_eq!(scene.backend().live_meshes(), 2);

    assert!(scene.remove_geometry(cube));
    assert!(!scene.remove_geometry(cube));
    assert_eq!(scene.backend().live_meshes(), 1);
    assert_eq!(scene.raymarcher().objects(), &[kept]);

    let stats = scene.render_frame().unwrap();
    assert_eq!(stats, raymarch::RenderStats { draws: 1, skipped: 0 });
}

#[test]
fn removing_a_shader_frees_its_program_and_dependents() {
    let dir = tempfile::tempdir().unwrap();
    common::write_shaders(dir.path());
    let mut scene = common::scene_in(dir.path());
    let doomed = scene.add_shader(common::VERT_NAME, common::FRAG_NAME).unwrap();
    let survivor = scene.add_shader(common::VERT_NAME, common::FRAG_NAME).unwrap();
    let doomed_material = scene.add_material(doomed).unwrap();
    let survivor_material = scene.add_material(survivor).unwrap();
    scene.add_object(scene.quad(), doomed_material).unwrap();
    let kept = scene.add_object(scene.quad(), survivor_material).unwrap();
    assert_eq!(scene.backend().live_programs(), 2);

    assert!(scene.remove_shader(doomed));
    assert_eq!(scene.backend().live_programs(), 1);
    assert!(scene.material(doomed_material).is_none());
    assert!(scene.material(survivor_material).is_some());
    assert_eq!(scene.raymarcher().objects(), &[kept]);
    assert_eq!(scene.render_frame().unwrap().draws, 1);
}

#[test]
fn removing_an_object_takes_it_off_the_draw_list() {
    let dir = tempfile::tempdir().unwrap();
    common::write_shaders(dir.path());
    let mut scene = common::scene_in(dir.path());
    let shader = scene.add_shader(common::VERT_NAME, common::FRAG_NAME).unwrap();
    let material = scene.add_material(shader).unwrap();
    let object = scene.add_object(scene.quad(), material).unwrap();
    scene.raymarcher_mut().add_object(object);

    assert!(scene.remove_object(object));
    assert!(scene.raymarcher().objects().is_empty());
    assert!(scene.remove_material(material));
    assert_eq!(scene.render_frame().unwrap(), raymarch::RenderStats::default());
}

#[test]
fn stale_geometry_is_skipped() {
    let mut assets = Assets::new();
    let mut gpu = RecordingBackend::new();
    let dir = tempfile::tempdir().unwrap();
    common::write_shaders(dir.path());
    let shader = ShaderProgram::load(
        &mut gpu,
        dir.path().join(common::VERT_NAME),
        dir.path().join(common::FRAG_NAME),
    )
    .unwrap();
    let shader = assets.shaders.insert(shader);
    let material = assets.materials.insert(Material::new(shader));
    let geometry = assets.geometries.insert(raymarch::Geometry::cube(&mut gpu).unwrap());
    let object = assets.objects.insert(raymarch::RenderObject::new(geometry, material));
    let camera = assets.cameras.insert(Camera::default());
    let mut raymarcher = RayMarcher::new();
    raymarcher.set_camera(camera);
    raymarcher.add_object(object);

    assets.geometries.remove(geometry).unwrap().release(&mut gpu);
    let stats = raymarcher.render(&assets, &mut gpu).unwrap();
    assert_eq!(stats, raymarch::RenderStats { draws: 0, skipped: 1 });
    assets.release(&mut gpu);
}

#[test]
fn rendering_without_a_camera_is_an_error() {
    let mut assets = Assets::new();
    let mut gpu = RecordingBackend::new();
    let shader = assets.shaders.insert(ShaderProgram::new("a", "b"));
    assets.materials.insert(Material::new(shader));
    let raymarcher = RayMarcher::new();
    assert_eq!(raymarcher.render(&assets, &mut gpu), Err(RenderError::NoCamera));

    let mut raymarcher = RayMarcher::new();
    let camera = assets.cameras.insert(Camera::default());
    raymarcher.set_camera(camera);
    assets.cameras.remove(camera);
    assert_eq!(raymarcher.render(&assets, &mut gpu), Err(RenderError::StaleHandle("camera")));
    assert!(gpu.draw_calls().is_empty());
}

#[test]
fn shipped_demo_pipeline_renders() {
    let mut scene = common::scene_in(&common::shipped_shaders());
    let shader = scene.add_shader("raymarcher.vert.wgsl", "sdf_scene.frag.wgsl").unwrap();
    let material = scene.add_material(shader).unwrap();
    scene.add_object(scene.quad(), material).unwrap();
    let center = scene.camera().unwrap().to_view_space(Vec3::new(-2.0, 0.0, 0.0), 1.0);
    let props = scene.material_mut(material).unwrap();
    props.set_property("sphere_center", center);
    props.set_property("sphere_radius", 1.25f32);

    let stats = scene.render_frame().unwrap();
    assert_eq!(stats.draws, 1);
    let program = scene.assets().shaders[shader].handle().unwrap();
    assert_eq!(scene.backend().uniform_value(program, "sphere_radius"), Some(UniformValue::Float(1.25)));
}
