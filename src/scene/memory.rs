use crate::foundation::core::{ContextKind, ObjectId};
use crate::foundation::error::{VtxError, VtxResult};
use crate::format::value::AttrValue;
use crate::scene::mesh::{
    EvaluatedMesh, HostFrameRange, LoopRef, MaterialSlot, SceneEvaluator, Triangle,
};
use crate::scene::source::{AttributeSchema, AttributeSource, StaticSchema};
use glam::{DMat4, DVec3};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Named attributes of one element.
pub type Attrs = BTreeMap<String, AttrValue>;

/// `matrix_world` as written in scene JSON: four rows of four numbers.
mod row_major {
    use glam::DMat4;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(m: &Option<DMat4>, s: S) -> Result<S::Ok, S::Error> {
        m.map(|m| m.transpose().to_cols_array_2d()).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<DMat4>, D::Error> {
        let rows = Option::<[[f64; 4]; 4]>::deserialize(d)?;
        Ok(rows.map(|r| DMat4::from_cols_array_2d(&r).transpose()))
    }
}

/// A loop: one polygon corner.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MemoryLoop {
    /// Referenced vertex.
    pub vertex_index: usize,
    /// Loop attributes.
    #[serde(flatten)]
    pub attributes: Attrs,
}

/// A polygon with any number (>= 3) of loops.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MemoryPolygon {
    /// Loop indices in winding order.
    pub loops: Vec<usize>,
    /// Material slot.
    #[serde(default)]
    pub material_index: usize,
    /// Face attributes.
    #[serde(flatten)]
    pub attributes: Attrs,
}

/// A material slot.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MemoryMaterial {
    /// Node-graph materials are skipped by the walker.
    #[serde(default)]
    pub use_nodes: bool,
    /// Material attributes.
    #[serde(flatten)]
    pub attributes: Attrs,
}

/// A texture-coordinate layer: one entry per loop.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MemoryUvLayer {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub active: bool,
    pub data: Vec<Attrs>,
}

/// Untriangulated mesh data.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryMesh {
    #[serde(default)]
    pub vertices: Vec<Attrs>,
    #[serde(default)]
    pub loops: Vec<MemoryLoop>,
    #[serde(default)]
    pub polygons: Vec<MemoryPolygon>,
    #[serde(default)]
    pub materials: Vec<MemoryMaterial>,
    #[serde(default)]
    pub uv_layers: Vec<MemoryUvLayer>,
}

impl MemoryMesh {
    /// Build a mesh from vertex positions (`co`) and polygons given as vertex index lists.
    ///
    /// Each polygon corner gets its own loop.
    pub fn from_polygons(positions: &[[f64; 3]], polygons: &[&[usize]]) -> Self {
        let vertices = positions
            .iter()
            .map(|p| Attrs::from([("co".to_owned(), AttrValue::floats(*p))]))
            .collect();
        let mut loops = Vec::new();
        let mut polys = Vec::with_capacity(polygons.len());
        for poly in polygons {
            let start = loops.len();
            loops.extend(poly.iter().map(|&v| MemoryLoop {
                vertex_index: v,
                attributes: Attrs::new(),
            }));
            polys.push(MemoryPolygon {
                loops: (start..loops.len()).collect(),
                material_index: 0,
                attributes: Attrs::new(),
            });
        }
        Self {
            vertices,
            loops,
            polygons: polys,
            materials: Vec::new(),
            uv_layers: Vec::new(),
        }
    }

    fn active_uv_layer(&self) -> Option<&MemoryUvLayer> {
        self.uv_layers
            .iter()
            .find(|l| l.active)
            .or_else(|| self.uv_layers.first())
    }

    fn declare(&self, schema: &mut StaticSchema) {
        let mut add = |kind, attrs: &Attrs| {
            for name in attrs.keys() {
                schema.insert(kind, name.clone());
            }
        };
        self.vertices.iter().for_each(|a| add(ContextKind::Vertex, a));
        self.loops.iter().for_each(|l| add(ContextKind::Loop, &l.attributes));
        self.polygons.iter().for_each(|p| add(ContextKind::Face, &p.attributes));
        self.materials
            .iter()
            .for_each(|m| add(ContextKind::Material, &m.attributes));
        for layer in &self.uv_layers {
            layer.data.iter().for_each(|a| add(ContextKind::TexCoord, a));
        }
    }
}

/// Values keyed at one frame. Fields that are set replace the object's base values from this
/// frame until the next key.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryKey {
    #[serde(default)]
    pub attributes: Attrs,
    #[serde(default)]
    pub mesh: Option<MemoryMesh>,
    #[serde(default, with = "row_major")]
    pub matrix_world: Option<DMat4>,
}

fn default_true() -> bool {
    true
}

/// A mesh object.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryObject {
    /// Unique object name.
    pub name: String,
    #[serde(default = "default_true")]
    pub selected: bool,
    #[serde(default)]
    pub attributes: Attrs,
    #[serde(default, with = "row_major")]
    pub matrix_world: Option<DMat4>,
    pub mesh: MemoryMesh,
    /// Keys by host frame.
    #[serde(default)]
    pub frames: BTreeMap<i64, MemoryKey>,
}

impl MemoryObject {
    /// A selected object with no animation.
    pub fn new(name: impl Into<String>, mesh: MemoryMesh) -> Self {
        Self {
            name: name.into(),
            selected: true,
            attributes: Attrs::new(),
            matrix_world: None,
            mesh,
            frames: BTreeMap::new(),
        }
    }

    fn key_at(&self, frame: i64) -> Option<&MemoryKey> {
        self.frames.range(..=frame).next_back().map(|(_, k)| k)
    }

    fn mesh_at(&self, frame: i64) -> &MemoryMesh {
        self.key_at(frame)
            .and_then(|k| k.mesh.as_ref())
            .unwrap_or(&self.mesh)
    }

    fn matrix_at(&self, frame: i64) -> Option<&DMat4> {
        self.key_at(frame)
            .and_then(|k| k.matrix_world.as_ref())
            .or(self.matrix_world.as_ref())
    }

    fn attributes_at(&self, frame: i64) -> Attrs {
        let mut out = self.attributes.clone();
        if let Some(key) = self.key_at(frame) {
            out.extend(key.attributes.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        out
    }
}

/// JSON document describing a [`MemoryScene`].
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemorySceneFile {
    pub frame_start: i64,
    pub frame_end: i64,
    /// Initial frame (defaults to `frame_start`).
    #[serde(default)]
    pub frame_current: Option<i64>,
    #[serde(default)]
    pub attributes: Attrs,
    pub objects: Vec<MemoryObject>,
}

/// A self-contained scene held in memory, keyed per frame.
///
/// Besides the declared attributes every context exposes a few built-ins:
/// `scene.frame_current`/`frame_start`/`frame_end`, `face.index`/`polygon_index`/`material_index`,
/// `material.use_nodes`, `loop.index`/`vertex_index` and `vertex.index`.
#[derive(Clone, Debug)]
pub struct MemoryScene {
    range: HostFrameRange,
    frame: i64,
    base_attributes: Attrs,
    scene_attributes: Attrs,
    objects: Vec<MemoryObject>,
    by_name: BTreeMap<String, usize>,
    object_attributes: Vec<Attrs>,
    schema: StaticSchema,
}

impl MemoryScene {
    /// Validate a scene document and set it to its initial frame.
    pub fn new(file: MemorySceneFile) -> VtxResult<Self> {
        let range = HostFrameRange::new(file.frame_start, file.frame_end)?;
        let mut by_name = BTreeMap::new();
        for (i, obj) in file.objects.iter().enumerate() {
            if by_name.insert(obj.name.clone(), i).is_some() {
                return Err(VtxError::validation(format!(
                    "duplicate object name '{}'",
                    obj.name
                )));
            }
        }

        let mut scene = Self {
            range,
            frame: file.frame_current.unwrap_or(range.start),
            schema: build_schema(&file.attributes, &file.objects),
            base_attributes: file.attributes,
            scene_attributes: Attrs::new(),
            objects: file.objects,
            by_name,
            object_attributes: Vec::new(),
        };
        scene.refresh();
        Ok(scene)
    }

    /// A scene with the given frame range and objects.
    pub fn with_objects(
        frame_start: i64,
        frame_end: i64,
        objects: Vec<MemoryObject>,
    ) -> VtxResult<Self> {
        Self::new(MemorySceneFile {
            frame_start,
            frame_end,
            frame_current: None,
            attributes: Attrs::new(),
            objects,
        })
    }

    /// Parse a scene from a JSON reader.
    pub fn from_reader<R: std::io::Read>(r: R) -> VtxResult<Self> {
        let file: MemorySceneFile = serde_json::from_reader(r)
            .map_err(|e| VtxError::serde(format!("parse scene JSON: {e}")))?;
        Self::new(file)
    }

    /// Parse a scene from a JSON file on disk.
    pub fn from_path(path: impl AsRef<Path>) -> VtxResult<Self> {
        let path = path.as_ref();
        let f = File::open(path)
            .map_err(|e| VtxError::validation(format!("open scene '{}': {e}", path.display())))?;
        Self::from_reader(BufReader::new(f))
    }

    fn refresh(&mut self) {
        let f = self.frame;
        self.scene_attributes = self.base_attributes.clone();
        self.scene_attributes
            .insert("frame_current".to_owned(), AttrValue::from(f));
        self.scene_attributes
            .insert("frame_start".to_owned(), AttrValue::from(self.range.start));
        self.scene_attributes
            .insert("frame_end".to_owned(), AttrValue::from(self.range.end));
        self.object_attributes = self.objects.iter().map(|o| o.attributes_at(f)).collect();
    }

    fn lookup(&self, id: &ObjectId) -> VtxResult<usize> {
        self.by_name
            .get(id.as_str())
            .copied()
            .ok_or_else(|| VtxError::validation(format!("unknown object '{id}'")))
    }
}

fn build_schema(scene: &Attrs, objects: &[MemoryObject]) -> StaticSchema {
    let mut schema = StaticSchema::new();
    for name in ["frame_current", "frame_start", "frame_end"] {
        schema.insert(ContextKind::Scene, name);
    }
    for name in ["index", "polygon_index", "material_index"] {
        schema.insert(ContextKind::Face, name);
    }
    schema.insert(ContextKind::Material, "use_nodes");
    schema.insert(ContextKind::Loop, "index");
    schema.insert(ContextKind::Loop, "vertex_index");
    schema.insert(ContextKind::Vertex, "index");

    for name in scene.keys() {
        schema.insert(ContextKind::Scene, name.clone());
    }
    for obj in objects {
        let keys = obj.frames.values();
        for name in obj
            .attributes
            .keys()
            .chain(keys.clone().flat_map(|k| k.attributes.keys()))
        {
            schema.insert(ContextKind::Object, name.clone());
        }
        obj.mesh.declare(&mut schema);
        for mesh in keys.filter_map(|k| k.mesh.as_ref()) {
            mesh.declare(&mut schema);
        }
    }
    schema
}

impl SceneEvaluator for MemoryScene {
    fn schema(&self) -> &dyn AttributeSchema {
        &self.schema
    }

    fn frame_range(&self) -> HostFrameRange {
        self.range
    }

    fn current_frame(&self) -> i64 {
        self.frame
    }

    fn set_frame(&mut self, frame: i64) -> VtxResult<()> {
        self.frame = frame;
        self.refresh();
        Ok(())
    }

    fn selected_objects(&self) -> Vec<ObjectId> {
        self.objects
            .iter()
            .filter(|o| o.selected)
            .map(|o| ObjectId::new(o.name.clone()))
            .collect()
    }

    fn scene(&self) -> &dyn AttributeSource {
        &self.scene_attributes
    }

    fn object(&self, id: &ObjectId) -> VtxResult<&dyn AttributeSource> {
        let i = self.lookup(id)?;
        Ok(&self.object_attributes[i])
    }

    fn evaluate(
        &self,
        id: &ObjectId,
        apply_world_transform: bool,
    ) -> VtxResult<Box<dyn EvaluatedMesh + '_>> {
        let obj = &self.objects[self.lookup(id)?];
        let matrix = if apply_world_transform {
            obj.matrix_at(self.frame)
        } else {
            None
        };
        let mesh = TriangulatedMesh::build(obj.mesh_at(self.frame), matrix)
            .map_err(|e| match e {
                VtxError::Topology(msg) => VtxError::topology(format!("object '{id}': {msg}")),
                other => other,
            })?;
        Ok(Box::new(mesh))
    }
}

/// Fan-triangulated, optionally world-transformed copy of a [`MemoryMesh`].
#[derive(Clone, Debug)]
struct TriangulatedMesh {
    vertices: Vec<Attrs>,
    loops: Vec<Attrs>,
    faces: Vec<Attrs>,
    materials: Vec<(Attrs, bool)>,
    tex_coords: Option<Vec<Attrs>>,
    triangles: Vec<Triangle>,
}

impl TriangulatedMesh {
    fn build(mesh: &MemoryMesh, matrix: Option<&DMat4>) -> VtxResult<Self> {
        let mut vertices = mesh.vertices.clone();
        let mut loops = Vec::with_capacity(mesh.loops.len());
        for (i, l) in mesh.loops.iter().enumerate() {
            if l.vertex_index >= vertices.len() {
                return Err(VtxError::topology(format!(
                    "loop {i} references vertex {} of {}",
                    l.vertex_index,
                    vertices.len()
                )));
            }
            let mut attrs = l.attributes.clone();
            attrs.insert("index".to_owned(), index_value(i));
            attrs.insert("vertex_index".to_owned(), index_value(l.vertex_index));
            loops.push(attrs);
        }
        for (i, v) in vertices.iter_mut().enumerate() {
            v.insert("index".to_owned(), index_value(i));
        }

        if let Some(m) = matrix {
            let normal_matrix = m.inverse().transpose();
            for v in &mut vertices {
                transform_entry(v, "co", |p| m.transform_point3(p));
                transform_entry(v, "normal", |n| transform_normal(&normal_matrix, n));
            }
            for l in &mut loops {
                transform_entry(l, "normal", |n| transform_normal(&normal_matrix, n));
            }
        }

        let tex_coords = match mesh.active_uv_layer() {
            Some(layer) if layer.data.len() != loops.len() => {
                return Err(VtxError::topology(format!(
                    "texture-coordinate layer '{}' has {} entries for {} loops",
                    layer.name,
                    layer.data.len(),
                    loops.len()
                )));
            }
            Some(layer) => Some(layer.data.clone()),
            None => None,
        };

        let mut faces = Vec::new();
        let mut triangles = Vec::new();
        for (pi, poly) in mesh.polygons.iter().enumerate() {
            if poly.loops.len() < 3 {
                return Err(VtxError::topology(format!(
                    "polygon {pi} has {} loops, need at least 3",
                    poly.loops.len()
                )));
            }
            let material = if mesh.materials.is_empty() {
                None
            } else if poly.material_index < mesh.materials.len() {
                Some(poly.material_index)
            } else {
                return Err(VtxError::topology(format!(
                    "polygon {pi} uses material slot {} of {}",
                    poly.material_index,
                    mesh.materials.len()
                )));
            };
            let corner = |li: usize| -> VtxResult<LoopRef> {
                let l = mesh.loops.get(li).ok_or_else(|| {
                    VtxError::topology(format!("polygon {pi} references missing loop {li}"))
                })?;
                Ok(LoopRef {
                    index: li,
                    vertex: l.vertex_index,
                })
            };
            let first = corner(poly.loops[0])?;
            for pair in poly.loops[1..].windows(2) {
                let index = triangles.len();
                let mut attrs = poly.attributes.clone();
                attrs.insert("index".to_owned(), index_value(index));
                attrs.insert("polygon_index".to_owned(), index_value(pi));
                attrs.insert("material_index".to_owned(), index_value(poly.material_index));
                faces.push(attrs);
                triangles.push(Triangle {
                    index,
                    material,
                    loops: [first, corner(pair[0])?, corner(pair[1])?],
                });
            }
        }

        let materials = mesh
            .materials
            .iter()
            .map(|m| {
                let mut attrs = m.attributes.clone();
                attrs.insert("use_nodes".to_owned(), AttrValue::from(m.use_nodes));
                (attrs, m.use_nodes)
            })
            .collect();

        Ok(Self {
            vertices,
            loops,
            faces,
            materials,
            tex_coords,
            triangles,
        })
    }
}

fn index_value(i: usize) -> AttrValue {
    AttrValue::from(i64::try_from(i).unwrap_or(i64::MAX))
}

fn missing(what: &str, i: usize, len: usize) -> VtxError {
    VtxError::topology(format!("{what} {i} out of range for {len} entries"))
}

impl EvaluatedMesh for TriangulatedMesh {
    fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    fn triangles(&self) -> Box<dyn Iterator<Item = Triangle> + '_> {
        Box::new(self.triangles.iter().copied())
    }

    fn face(&self, tri: &Triangle) -> VtxResult<&dyn AttributeSource> {
        self.faces
            .get(tri.index)
            .map(|a| a as &dyn AttributeSource)
            .ok_or_else(|| missing("face", tri.index, self.faces.len()))
    }

    fn material(&self, tri: &Triangle) -> VtxResult<Option<MaterialSlot<'_>>> {
        let Some(i) = tri.material else {
            return Ok(None);
        };
        let (attrs, uses_node_graph) = self
            .materials
            .get(i)
            .ok_or_else(|| missing("material", i, self.materials.len()))?;
        Ok(Some(MaterialSlot {
            source: attrs,
            uses_node_graph: *uses_node_graph,
        }))
    }

    fn loop_source(&self, l: LoopRef) -> VtxResult<&dyn AttributeSource> {
        self.loops
            .get(l.index)
            .map(|a| a as &dyn AttributeSource)
            .ok_or_else(|| missing("loop", l.index, self.loops.len()))
    }

    fn tex_coord(&self, l: LoopRef) -> VtxResult<Option<&dyn AttributeSource>> {
        let Some(layer) = &self.tex_coords else {
            return Ok(None);
        };
        layer
            .get(l.index)
            .map(|a| Some(a as &dyn AttributeSource))
            .ok_or_else(|| missing("texture coordinate", l.index, layer.len()))
    }

    fn vertex(&self, l: LoopRef) -> VtxResult<&dyn AttributeSource> {
        self.vertices
            .get(l.vertex)
            .map(|a| a as &dyn AttributeSource)
            .ok_or_else(|| missing("vertex", l.vertex, self.vertices.len()))
    }
}

fn transform_entry(attrs: &mut Attrs, name: &str, f: impl Fn(DVec3) -> DVec3) {
    let Some(value) = attrs.get_mut(name) else {
        return;
    };
    let c = value.components();
    if c.len() != 3 {
        return;
    }
    let out = f(DVec3::new(c[0].as_f64(), c[1].as_f64(), c[2].as_f64()));
    *value = AttrValue::floats(out.to_array());
}

/// `normal_matrix` is the inverse transpose of the object's world matrix.
fn transform_normal(normal_matrix: &DMat4, n: DVec3) -> DVec3 {
    normal_matrix.transform_vector3(n).normalize_or_zero()
}

#[cfg(test)]
#[path = "../../tests/unit/scene/memory.rs"]
mod tests;
