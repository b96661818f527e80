use super::*;
use crate::foundation::core::ContextKind;
use crate::scene::mesh::{EvaluatedMesh, HostFrameRange};
use crate::scene::memory::{MemoryMesh, MemoryObject, MemoryScene};
use crate::scene::source::{AttributeSchema, AttributeSource};
use std::sync::atomic::{AtomicUsize, Ordering};

const TRI: [[f64; 3]; 3] = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];

fn tri_object(name: &str) -> MemoryObject {
    MemoryObject::new(name, MemoryMesh::from_polygons(&TRI, &[&[0, 1, 2]]))
}

fn two_tri_object(name: &str) -> MemoryObject {
    MemoryObject::new(
        name,
        MemoryMesh::from_polygons(&TRI, &[&[0, 1, 2], &[2, 1, 0]]),
    )
}

fn spec(kind: ContextKind, attr: &str, fmt: &str) -> AttributeSpec {
    AttributeSpec::new(kind, attr, fmt).unwrap()
}

/// Delegates to a [`MemoryScene`] and counts mesh evaluations.
struct CountingHost {
    inner: MemoryScene,
    evaluations: AtomicUsize,
}

impl SceneEvaluator for CountingHost {
    fn schema(&self) -> &dyn AttributeSchema {
        self.inner.schema()
    }
    fn frame_range(&self) -> HostFrameRange {
        self.inner.frame_range()
    }
    fn current_frame(&self) -> i64 {
        self.inner.current_frame()
    }
    fn set_frame(&mut self, frame: i64) -> VtxResult<()> {
        self.inner.set_frame(frame)
    }
    fn selected_objects(&self) -> Vec<ObjectId> {
        self.inner.selected_objects()
    }
    fn scene(&self) -> &dyn AttributeSource {
        self.inner.scene()
    }
    fn object(&self, id: &ObjectId) -> VtxResult<&dyn AttributeSource> {
        self.inner.object(id)
    }
    fn evaluate(
        &self,
        id: &ObjectId,
        apply_world_transform: bool,
    ) -> VtxResult<Box<dyn EvaluatedMesh + '_>> {
        self.evaluations.fetch_add(1, Ordering::Relaxed);
        self.inner.evaluate(id, apply_world_transform)
    }
}

#[test]
fn single_triangle_exports_twelve_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("tri.vbx");
    let mut scene = MemoryScene::with_objects(1, 1, vec![tri_object("Tri")]).unwrap();

    let session = ExportSession::new(
        vec![spec(ContextKind::Vertex, "index", "<i")],
        ExportOpts::default(),
    );
    let report = session.export(&mut scene, &out).unwrap();

    assert_eq!(
        std::fs::read(&out).unwrap(),
        [0, 0, 0, 0, 1, 0, 0, 0, 2, 0, 0, 0]
    );
    assert_eq!(report.binary, out);
    assert_eq!(report.manifest, Some(dir.path().join("tri.json")));
    assert_eq!(report.stats.bytes, 12);
    assert_eq!(report.offsets.get(&ObjectId::new("Tri")).unwrap().offset, 0);
}

#[test]
fn objects_follow_selection_order() {
    let mut scene = MemoryScene::with_objects(
        0,
        0,
        vec![tri_object("A"), two_tri_object("B")],
    )
    .unwrap();
    let session = ExportSession::new(
        vec![
            spec(ContextKind::Object, "batch_index", "<I"),
            spec(ContextKind::Vertex, "index", "<I"),
        ],
        ExportOpts::default(),
    )
    .with_objects(vec![ObjectId::new("B"), ObjectId::new("A")]);

    let baked = session.bake(&mut scene).unwrap();
    assert_eq!(baked.states[0].id().as_str(), "B");
    assert_eq!(baked.states[0].vertex_count(), 6);
    assert_eq!(baked.stats.vertices_per_frame, 9);

    // batch_index of B is 0, of A is 1.
    let a = baked.states[1].buffers()[0].as_bytes();
    assert_eq!(&a[..4], &1u32.to_le_bytes());
    let b = baked.states[0].buffers()[0].as_bytes();
    assert_eq!(&b[..4], &0u32.to_le_bytes());

    let mut sink = crate::emit::emitter::StreamSink::new(Vec::new());
    let table = crate::emit::emitter::emit(&baked.states, &mut sink).unwrap();
    assert_eq!(table.get(&ObjectId::new("B")).unwrap().offset, 0);
    assert_eq!(table.get(&ObjectId::new("A")).unwrap().offset, 48);
}

#[test]
fn unknown_attribute_fails_before_any_evaluation() {
    let mut host = CountingHost {
        inner: MemoryScene::with_objects(0, 0, vec![tri_object("Tri")]).unwrap(),
        evaluations: AtomicUsize::new(0),
    };
    let session = ExportSession::new(
        vec![spec(ContextKind::Vertex, "colour", "4B")],
        ExportOpts::default(),
    );
    assert!(matches!(
        session.bake(&mut host),
        Err(VtxError::UnknownAttribute(_))
    ));
    assert_eq!(host.evaluations.load(Ordering::Relaxed), 0);
}

#[test]
fn all_frames_walk_the_scene_range_and_restore_the_frame() {
    let mut scene = MemoryScene::with_objects(3, 5, vec![tri_object("Tri")]).unwrap();
    scene.set_frame(4).unwrap();
    let opts = ExportOpts {
        frames: FrameSelection::All,
        ..ExportOpts::default()
    };
    let session = ExportSession::new(vec![spec(ContextKind::Scene, "frame_current", "B")], opts);

    let baked = session.bake(&mut scene).unwrap();
    assert_eq!(baked.frame_count, 3);
    let bufs = baked.states[0].buffers();
    assert_eq!(bufs[0].as_bytes(), &[3, 3, 3]);
    assert_eq!(bufs[1].as_bytes(), &[4, 4, 4]);
    assert_eq!(bufs[2].as_bytes(), &[5, 5, 5]);
    assert_eq!(scene.current_frame(), 4);
}

#[test]
fn current_frame_exports_one_frame() {
    let mut scene = MemoryScene::with_objects(3, 5, vec![tri_object("Tri")]).unwrap();
    scene.set_frame(5).unwrap();
    let session = ExportSession::new(
        vec![spec(ContextKind::Scene, "frame_current", "B")],
        ExportOpts::default(),
    );
    let baked = session.bake(&mut scene).unwrap();
    assert_eq!(baked.frame_count, 1);
    assert_eq!(baked.states[0].buffers()[0].as_bytes(), &[5, 5, 5]);
}

#[test]
fn parallel_output_matches_sequential() {
    let objects: Vec<_> = (0..6)
        .map(|i| {
            if i % 2 == 0 {
                tri_object(&format!("obj{i}"))
            } else {
                two_tri_object(&format!("obj{i}"))
            }
        })
        .collect();
    let specs = vec![
        spec(ContextKind::Scene, "frame_current", "<h"),
        spec(ContextKind::Object, "batch_index", "<H"),
        spec(ContextKind::Face, "index", "<H"),
        spec(ContextKind::Loop, "index", "<H"),
        spec(ContextKind::Vertex, "co", "<3f"),
    ];
    let base = ExportOpts {
        frames: FrameSelection::All,
        ..ExportOpts::default()
    };

    let mut scene = MemoryScene::with_objects(1, 4, objects.clone()).unwrap();
    let seq = ExportSession::new(specs.clone(), base.clone())
        .bake(&mut scene)
        .unwrap();

    let mut scene = MemoryScene::with_objects(1, 4, objects).unwrap();
    let par_opts = ExportOpts {
        parallel: true,
        threads: Some(3),
        ..base
    };
    let par = ExportSession::new(specs, par_opts).bake(&mut scene).unwrap();

    assert_eq!(seq.states.len(), par.states.len());
    for (a, b) in seq.states.iter().zip(&par.states) {
        assert_eq!(a.id(), b.id());
        assert_eq!(a.buffers(), b.buffers());
    }
    assert_eq!(seq.stats, par.stats);
}

#[test]
fn zero_threads_is_rejected() {
    let mut scene = MemoryScene::with_objects(0, 0, vec![tri_object("Tri")]).unwrap();
    let opts = ExportOpts {
        parallel: true,
        threads: Some(0),
        ..ExportOpts::default()
    };
    let session = ExportSession::new(vec![spec(ContextKind::Vertex, "index", "B")], opts);
    assert!(matches!(
        session.bake(&mut scene),
        Err(VtxError::Validation(_))
    ));
}

#[test]
fn strict_frame_offsets_fail_early() {
    let mut host = CountingHost {
        inner: MemoryScene::with_objects(1, 3, vec![tri_object("Tri")]).unwrap(),
        evaluations: AtomicUsize::new(0),
    };
    let opts = ExportOpts {
        frames: FrameSelection::All,
        ..ExportOpts::default()
    };
    let session = ExportSession::new(
        vec![spec(ContextKind::Scene, "frame_current", "B").with_frame_offset(1)],
        opts,
    );
    assert!(matches!(
        session.bake(&mut host),
        Err(VtxError::IndexOutOfRange(_))
    ));
    assert_eq!(host.evaluations.load(Ordering::Relaxed), 0);
}

#[test]
fn wrapped_frame_offsets_loop_around() {
    let mut scene = MemoryScene::with_objects(1, 3, vec![tri_object("Tri")]).unwrap();
    let opts = ExportOpts {
        frames: FrameSelection::All,
        frame_targeting: FrameTargeting::Wrap,
        ..ExportOpts::default()
    };
    let session = ExportSession::new(
        vec![
            spec(ContextKind::Scene, "frame_current", "B"),
            spec(ContextKind::Scene, "frame_current", "B").with_frame_offset(1),
        ],
        opts,
    );
    let baked = session.bake(&mut scene).unwrap();
    let bufs = baked.states[0].buffers();
    assert_eq!(bufs[0].as_bytes(), &[1, 2, 1, 2, 1, 2]);
    assert_eq!(bufs[1].as_bytes(), &[2, 3, 2, 3, 2, 3]);
    assert_eq!(bufs[2].as_bytes(), &[3, 1, 3, 1, 3, 1]);
}

#[test]
fn empty_selection_is_rejected() {
    let mut obj = tri_object("Tri");
    obj.selected = false;
    let mut scene = MemoryScene::with_objects(0, 0, vec![obj]).unwrap();
    let session = ExportSession::new(
        vec![spec(ContextKind::Vertex, "index", "B")],
        ExportOpts::default(),
    );
    assert!(matches!(
        session.bake(&mut scene),
        Err(VtxError::Validation(_))
    ));
}

#[test]
fn failed_export_leaves_no_files() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("bad.vbx");
    let mut scene = MemoryScene::with_objects(0, 0, vec![tri_object("Tri")]).unwrap();
    // `co` has three components, `2f` expects two.
    let session = ExportSession::new(
        vec![spec(ContextKind::Vertex, "co", "2f")],
        ExportOpts::default(),
    );
    assert!(matches!(
        session.export(&mut scene, &out),
        Err(VtxError::EncodingMismatch(_))
    ));
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn existing_manifest_blocks_export_without_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("tri.vbx");
    let manifest = dir.path().join("tri.json");
    std::fs::write(&manifest, b"keep").unwrap();
    let mut scene = MemoryScene::with_objects(0, 0, vec![tri_object("Tri")]).unwrap();
    let opts = ExportOpts {
        overwrite: false,
        ..ExportOpts::default()
    };
    let mut host = CountingHost {
        inner: scene.clone(),
        evaluations: AtomicUsize::new(0),
    };
    let session = ExportSession::new(vec![spec(ContextKind::Vertex, "index", "B")], opts);

    assert!(matches!(
        session.export(&mut host, &out),
        Err(VtxError::Validation(_))
    ));
    assert_eq!(host.evaluations.load(Ordering::Relaxed), 0);
    assert!(!out.exists());
    assert_eq!(std::fs::read(&manifest).unwrap(), b"keep");

    // Same outcome when the collision is only found at commit time.
    let blocked = dir.path().join("blocked.vbx");
    std::fs::create_dir(dir.path().join("blocked.json")).unwrap();
    let session = ExportSession::new(
        vec![spec(ContextKind::Vertex, "index", "B")],
        ExportOpts::default(),
    );
    assert!(session.export(&mut scene, &blocked).is_err());
    assert!(!blocked.exists());
    assert!(dir.path().join("blocked.json").is_dir());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
}

#[test]
fn json_output_path_cannot_hold_the_binary() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("tri.json");
    let mut scene = MemoryScene::with_objects(0, 0, vec![tri_object("Tri")]).unwrap();
    let session = ExportSession::new(
        vec![spec(ContextKind::Vertex, "index", "B")],
        ExportOpts::default(),
    );
    assert!(matches!(
        session.export(&mut scene, &out),
        Err(VtxError::Validation(_))
    ));
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

    let opts = ExportOpts {
        write_manifest: false,
        ..ExportOpts::default()
    };
    let report = ExportSession::new(vec![spec(ContextKind::Vertex, "index", "B")], opts)
        .export(&mut scene, &out)
        .unwrap();
    assert_eq!(std::fs::read(&report.binary).unwrap(), [0, 1, 2]);
}

#[test]
fn manifest_can_be_disabled() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("tri.vbx");
    let mut scene = MemoryScene::with_objects(0, 0, vec![tri_object("Tri")]).unwrap();
    let opts = ExportOpts {
        write_manifest: false,
        ..ExportOpts::default()
    };
    let report = ExportSession::new(vec![spec(ContextKind::Vertex, "index", "B")], opts)
        .export(&mut scene, &out)
        .unwrap();
    assert!(report.manifest.is_none());
    assert!(!dir.path().join("tri.json").exists());
}

#[test]
fn opts_parse_from_json_with_defaults() {
    let opts = ExportOpts::from_json(r#"{ "frames": "all", "winding_reversed": true }"#).unwrap();
    assert_eq!(opts.frames, FrameSelection::All);
    assert!(opts.winding_reversed);
    assert!(opts.write_manifest);
    assert_eq!(opts.frame_targeting, FrameTargeting::Strict);

    assert!(matches!(
        ExportOpts::from_json(r#"{ "frame": "all" }"#),
        Err(VtxError::Serde(_))
    ));
}
