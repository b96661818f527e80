use super::*;
use glam::DVec4;

const QUAD_SCENE: &str = r#"{
  "frame_start": 1,
  "frame_end": 3,
  "attributes": { "fps": 24 },
  "objects": [
    {
      "name": "Quad",
      "attributes": { "pass_index": 2 },
      "matrix_world": [[1,0,0,10],[0,1,0,0],[0,0,1,0],[0,0,0,1]],
      "mesh": {
        "vertices": [
          { "co": [0.0, 0.0, 0.0] },
          { "co": [1.0, 0.0, 0.0] },
          { "co": [1.0, 1.0, 0.0] },
          { "co": [0.0, 1.0, 0.0] }
        ],
        "loops": [
          { "vertex_index": 0, "normal": [0.0, 0.0, 1.0] },
          { "vertex_index": 1, "normal": [0.0, 0.0, 1.0] },
          { "vertex_index": 2, "normal": [0.0, 0.0, 1.0] },
          { "vertex_index": 3, "normal": [0.0, 0.0, 1.0] }
        ],
        "polygons": [ { "loops": [0, 1, 2, 3], "smooth": true } ],
        "materials": [ { "use_nodes": false, "diffuse_color": [1.0, 0.0, 0.0, 1.0] } ],
        "uv_layers": [
          { "name": "UVMap", "active": true,
            "data": [ { "uv": [0.0, 0.0] }, { "uv": [1.0, 0.0] },
                      { "uv": [1.0, 1.0] }, { "uv": [0.0, 1.0] } ] }
        ]
      },
      "frames": {
        "3": { "attributes": { "pass_index": 5 } }
      }
    },
    { "name": "Hidden", "selected": false, "mesh": {} }
  ]
}"#;

fn quad_scene() -> MemoryScene {
    MemoryScene::from_reader(QUAD_SCENE.as_bytes()).unwrap()
}

#[test]
fn loads_frame_range_and_selection() {
    let scene = quad_scene();
    assert_eq!(scene.frame_range(), HostFrameRange { start: 1, end: 3 });
    assert_eq!(scene.current_frame(), 1);
    assert_eq!(scene.selected_objects(), vec![ObjectId::new("Quad")]);
}

#[test]
fn scene_context_exposes_frame_current() {
    let mut scene = quad_scene();
    assert_eq!(
        scene.scene().attribute("frame_current"),
        Some(AttrValue::from(1i64))
    );
    scene.set_frame(2).unwrap();
    assert_eq!(
        scene.scene().attribute("frame_current"),
        Some(AttrValue::from(2i64))
    );
    assert_eq!(scene.scene().attribute("fps"), Some(AttrValue::from(24i64)));
}

#[test]
fn object_keys_hold_until_the_next_key() {
    let mut scene = quad_scene();
    let id = ObjectId::new("Quad");
    let at = |s: &MemoryScene| s.object(&id).unwrap().attribute("pass_index");

    assert_eq!(at(&scene), Some(AttrValue::from(2i64)));
    scene.set_frame(3).unwrap();
    assert_eq!(at(&scene), Some(AttrValue::from(5i64)));
    scene.set_frame(10).unwrap();
    assert_eq!(at(&scene), Some(AttrValue::from(5i64)));
}

#[test]
fn quad_is_fan_triangulated() {
    let scene = quad_scene();
    let mesh = scene.evaluate(&ObjectId::new("Quad"), false).unwrap();
    assert_eq!(mesh.triangle_count(), 2);

    let tris: Vec<_> = mesh.triangles().collect();
    let corners = |t: &Triangle| t.loops.map(|l| l.vertex);
    assert_eq!(corners(&tris[0]), [0, 1, 2]);
    assert_eq!(corners(&tris[1]), [0, 2, 3]);

    // Restartable.
    assert_eq!(mesh.triangles().count(), 2);

    let face = mesh.face(&tris[1]).unwrap();
    assert_eq!(face.attribute("index"), Some(AttrValue::from(1i64)));
    assert_eq!(face.attribute("polygon_index"), Some(AttrValue::from(0i64)));
    assert_eq!(face.attribute("smooth"), Some(AttrValue::from(true)));
}

#[test]
fn evaluated_contexts_expose_builtins() {
    let scene = quad_scene();
    let mesh = scene.evaluate(&ObjectId::new("Quad"), false).unwrap();
    let tri = mesh.triangles().nth(1).unwrap();
    let l = tri.loops[2];

    assert_eq!(
        mesh.loop_source(l).unwrap().attribute("vertex_index"),
        Some(AttrValue::from(3i64))
    );
    assert_eq!(
        mesh.vertex(l).unwrap().attribute("index"),
        Some(AttrValue::from(3i64))
    );
    assert_eq!(
        mesh.tex_coord(l).unwrap().unwrap().attribute("uv"),
        Some(AttrValue::floats([0.0, 1.0]))
    );
    let mat = mesh.material(&tri).unwrap().unwrap();
    assert!(!mat.uses_node_graph);
    assert_eq!(
        mat.source.attribute("diffuse_color"),
        Some(AttrValue::floats([1.0, 0.0, 0.0, 1.0]))
    );
}

#[test]
fn world_transform_is_applied_on_request() {
    let scene = quad_scene();
    let id = ObjectId::new("Quad");
    let tri = |mesh: &dyn EvaluatedMesh| mesh.triangles().next().unwrap();

    let local = scene.evaluate(&id, false).unwrap();
    let t = tri(local.as_ref());
    assert_eq!(
        local.vertex(t.loops[1]).unwrap().attribute("co"),
        Some(AttrValue::floats([1.0, 0.0, 0.0]))
    );

    let world = scene.evaluate(&id, true).unwrap();
    let t = tri(world.as_ref());
    assert_eq!(
        world.vertex(t.loops[1]).unwrap().attribute("co"),
        Some(AttrValue::floats([11.0, 0.0, 0.0]))
    );
    // Translation leaves normals alone.
    assert_eq!(
        world.loop_source(t.loops[1]).unwrap().attribute("normal"),
        Some(AttrValue::floats([0.0, 0.0, 1.0]))
    );
}

#[test]
fn mirrored_transform_keeps_normals_outward() {
    let m = DMat4::from_scale(DVec3::new(-2.0, 1.0, 1.0));
    let normal_matrix = m.inverse().transpose();
    assert_eq!(transform_normal(&normal_matrix, DVec3::X), -DVec3::X);
    assert_eq!(transform_normal(&normal_matrix, DVec3::Z), DVec3::Z);
}

#[test]
fn matrix_world_reads_rows_in_order() {
    let obj: MemoryObject = serde_json::from_str(
        r#"{
          "name": "Moved",
          "matrix_world": [[1,0,0,10],[0,1,0,20],[0,0,1,30],[0,0,0,1]],
          "mesh": { "vertices": [], "loops": [], "polygons": [] }
        }"#,
    )
    .unwrap();
    let m = obj.matrix_world.unwrap();
    assert_eq!(m.w_axis, DVec4::new(10.0, 20.0, 30.0, 1.0));
    assert_eq!(m.transform_point3(DVec3::ZERO), DVec3::new(10.0, 20.0, 30.0));
}

#[test]
fn schema_lists_declared_and_builtin_attributes() {
    let scene = quad_scene();
    let schema = scene.schema();
    assert!(schema.has_attribute(ContextKind::Scene, "frame_current"));
    assert!(schema.has_attribute(ContextKind::Scene, "fps"));
    assert!(schema.has_attribute(ContextKind::Object, "pass_index"));
    assert!(schema.has_attribute(ContextKind::Face, "smooth"));
    assert!(schema.has_attribute(ContextKind::Material, "diffuse_color"));
    assert!(schema.has_attribute(ContextKind::Loop, "normal"));
    assert!(schema.has_attribute(ContextKind::TexCoord, "uv"));
    assert!(schema.has_attribute(ContextKind::Vertex, "co"));
    assert!(schema.has_attribute(ContextKind::Vertex, "index"));
    assert!(!schema.has_attribute(ContextKind::Vertex, "uv"));
    assert!(!schema.has_attribute(ContextKind::Object, "batch_index"));
}

#[test]
fn mesh_without_materials_or_uvs_reports_none() {
    let mesh = MemoryMesh::from_polygons(&[[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]], &[&[0, 1, 2]]);
    let scene = MemoryScene::with_objects(0, 0, vec![MemoryObject::new("Tri", mesh)]).unwrap();
    let eval = scene.evaluate(&ObjectId::new("Tri"), false).unwrap();
    let tri = eval.triangles().next().unwrap();
    assert!(eval.material(&tri).unwrap().is_none());
    assert!(eval.tex_coord(tri.loops[0]).unwrap().is_none());
}

#[test]
fn bad_topology_is_rejected_at_evaluation() {
    let mut mesh = MemoryMesh::from_polygons(&[[0.0; 3], [1.0, 0.0, 0.0]], &[&[0, 1]]);
    let scene =
        MemoryScene::with_objects(0, 0, vec![MemoryObject::new("Line", mesh.clone())]).unwrap();
    assert!(matches!(
        scene.evaluate(&ObjectId::new("Line"), false),
        Err(VtxError::Topology(_))
    ));

    mesh.loops[0].vertex_index = 9;
    mesh.polygons[0].loops.push(0);
    let scene = MemoryScene::with_objects(0, 0, vec![MemoryObject::new("Bad", mesh)]).unwrap();
    match scene.evaluate(&ObjectId::new("Bad"), false) {
        Err(VtxError::Topology(msg)) => assert!(msg.contains("'Bad'"), "{msg}"),
        Err(other) => panic!("unexpected error {other}"),
        Ok(_) => panic!("expected a topology error"),
    }
}

#[test]
fn duplicate_names_and_inverted_ranges_are_rejected() {
    let mesh = MemoryMesh::default();
    assert!(matches!(
        MemoryScene::with_objects(
            0,
            1,
            vec![
                MemoryObject::new("A", mesh.clone()),
                MemoryObject::new("A", mesh.clone())
            ]
        ),
        Err(VtxError::Validation(_))
    ));
    assert!(matches!(
        MemoryScene::with_objects(5, 1, vec![]),
        Err(VtxError::Validation(_))
    ));
}

#[test]
fn unknown_object_is_a_validation_error() {
    let scene = quad_scene();
    assert!(matches!(
        scene.object(&ObjectId::new("Nope")),
        Err(VtxError::Validation(_))
    ));
}

#[test]
fn malformed_json_is_a_serde_error() {
    assert!(matches!(
        MemoryScene::from_reader("{".as_bytes()),
        Err(VtxError::Serde(_))
    ));
}
