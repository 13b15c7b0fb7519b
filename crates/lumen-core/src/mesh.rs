use crate::assets::AssetContext;
use crate::comp::Registry;
use crate::error::LmError;
use crate::json::{self, Json};
use crate::math::{geometry_normal, mix_barycentric, Vec2, Vec3};
use crate::objloader::{ObjFaceIndex, ObjSurfaceGeometry};
use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vertex {
    pub p: Vec3,
    pub n: Vec3,
    pub t: Vec2,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tri {
    pub p1: Vertex,
    pub p2: Vertex,
    pub p3: Vertex,
}

/// Surface attributes at a barycentric location on a face.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InterpolatedPoint {
    pub p: Vec3,
    /// Shading normal.
    pub n: Vec3,
    /// Geometry normal.
    pub gn: Vec3,
    pub t: Vec2,
}

pub trait Mesh: Send + Sync {
    fn construct(&mut self, prop: &Json, ctx: &AssetContext<'_>) -> Result<()>;

    fn num_triangles(&self) -> usize;

    fn triangle_at(&self, face: usize) -> Tri;

    fn surface_point(&self, face: usize, uv: Vec2) -> InterpolatedPoint;

    fn foreach_triangle(&self, process: &mut dyn FnMut(usize, Tri)) {
        for face in 0..self.num_triangles() {
            process(face, self.triangle_at(face));
        }
    }
}

pub fn register(registry: &mut Registry) {
    registry.register::<dyn Mesh, _>("mesh::raw", || Box::new(IndexedMesh::new(MeshSource::Raw)));
    registry.register::<dyn Mesh, _>("mesh::wavefrontobj", || {
        Box::new(IndexedMesh::new(MeshSource::WavefrontObj))
    });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshSource {
    /// Vertex arrays given inline in the properties.
    Raw,
    /// Every face of an OBJ file, as a single mesh.
    WavefrontObj,
    /// Built in code, e.g. one group of an OBJ model.
    Direct,
}

/// Triangle mesh indexing into a shared vertex pool.
#[derive(Debug, Clone)]
pub struct IndexedMesh {
    source: MeshSource,
    geo: Arc<ObjSurfaceGeometry>,
    faces: Vec<ObjFaceIndex>,
}

#[derive(Deserialize)]
struct RawFaces {
    p: Vec<usize>,
    #[serde(default)]
    n: Option<Vec<usize>>,
    #[serde(default)]
    t: Option<Vec<usize>>,
}

impl IndexedMesh {
    pub fn new(source: MeshSource) -> Self {
        Self {
            source,
            geo: Arc::new(ObjSurfaceGeometry::default()),
            faces: Vec::new(),
        }
    }

    /// Builds a mesh from an existing vertex pool. `faces` holds three
    /// entries per triangle.
    pub fn from_parts(geo: Arc<ObjSurfaceGeometry>, faces: Vec<ObjFaceIndex>) -> Result<Self> {
        validate(&geo, &faces)?;
        Ok(Self {
            source: MeshSource::Direct,
            geo,
            faces,
        })
    }

    fn construct_raw(&mut self, prop: &Json) -> Result<()> {
        let ps: Vec<f32> = json::value(prop, "ps")?;
        let ns: Vec<f32> = json::value_or(prop, "ns", Vec::new())?;
        let ts: Vec<f32> = json::value_or(prop, "ts", Vec::new())?;
        let fs: RawFaces = json::value(prop, "fs")?;

        if ps.len() % 3 != 0 || ns.len() % 3 != 0 || ts.len() % 2 != 0 {
            return Err(invalid("vertex arrays must hold whole vectors"));
        }
        let geo = ObjSurfaceGeometry {
            ps: ps.chunks(3).map(|v| Vec3::new(v[0], v[1], v[2])).collect(),
            ns: ns.chunks(3).map(|v| Vec3::new(v[0], v[1], v[2])).collect(),
            ts: ts.chunks(2).map(|v| Vec2::new(v[0], v[1])).collect(),
        };

        let check_len = |indices: &Option<Vec<usize>>, what: &str| -> Result<()> {
            match indices {
                Some(v) if v.len() != fs.p.len() => Err(invalid(&format!(
                    "fs.{what} has {} entries, fs.p has {}",
                    v.len(),
                    fs.p.len()
                ))),
                _ => Ok(()),
            }
        };
        check_len(&fs.n, "n")?;
        check_len(&fs.t, "t")?;

        let faces = (0..fs.p.len())
            .map(|i| ObjFaceIndex {
                p: fs.p[i],
                n: fs.n.as_ref().map(|n| n[i]),
                t: fs.t.as_ref().map(|t| t[i]),
            })
            .collect();

        self.geo = Arc::new(geo);
        self.faces = faces;
        validate(&self.geo, &self.faces)
    }

    fn construct_obj(&mut self, prop: &Json, ctx: &AssetContext<'_>) -> Result<()> {
        let path: PathBuf = json::value(prop, "path")?;
        let data = ctx.objloader.load(&path)?;
        self.faces = data.meshes.into_iter().flat_map(|m| m.faces).collect();
        self.geo = Arc::new(data.geo);
        log::debug!("Loaded {:?}: {} triangles", path, self.num_triangles());
        validate(&self.geo, &self.faces)
    }

    fn vertex(&self, f: ObjFaceIndex) -> Vertex {
        Vertex {
            p: self.geo.ps[f.p],
            n: f.n.map(|i| self.geo.ns[i]).unwrap_or_default(),
            t: f.t.map(|i| self.geo.ts[i]).unwrap_or_default(),
        }
    }
}

impl Mesh for IndexedMesh {
    fn construct(&mut self, prop: &Json, ctx: &AssetContext<'_>) -> Result<()> {
        match self.source {
            MeshSource::Raw => self.construct_raw(prop),
            MeshSource::WavefrontObj => self.construct_obj(prop, ctx),
            MeshSource::Direct => Err(invalid("mesh built in code takes no properties")),
        }
    }

    fn num_triangles(&self) -> usize {
        self.faces.len() / 3
    }

    fn triangle_at(&self, face: usize) -> Tri {
        Tri {
            p1: self.vertex(self.faces[3 * face]),
            p2: self.vertex(self.faces[3 * face + 1]),
            p3: self.vertex(self.faces[3 * face + 2]),
        }
    }

    fn surface_point(&self, face: usize, uv: Vec2) -> InterpolatedPoint {
        let i1 = self.faces[3 * face];
        let i2 = self.faces[3 * face + 1];
        let i3 = self.faces[3 * face + 2];
        let geo = &self.geo;
        let (p1, p2, p3) = (geo.ps[i1.p], geo.ps[i2.p], geo.ps[i3.p]);
        let gn = geometry_normal(p1, p2, p3);

        let n = match (i1.n, i2.n, i3.n) {
            (Some(a), Some(b), Some(c)) => {
                mix_barycentric(geo.ns[a], geo.ns[b], geo.ns[c], uv).normalized()
            }
            _ => gn,
        };
        let t = match (i1.t, i2.t, i3.t) {
            (Some(a), Some(b), Some(c)) => mix_barycentric(geo.ts[a], geo.ts[b], geo.ts[c], uv),
            _ => Vec2::default(),
        };

        InterpolatedPoint {
            p: mix_barycentric(p1, p2, p3, uv),
            n,
            gn,
            t,
        }
    }
}

fn validate(geo: &ObjSurfaceGeometry, faces: &[ObjFaceIndex]) -> Result<()> {
    if faces.len() % 3 != 0 {
        return Err(invalid("face index count must be a multiple of three"));
    }
    for f in faces {
        let bad = f.p >= geo.ps.len()
            || f.n.is_some_and(|n| n >= geo.ns.len())
            || f.t.is_some_and(|t| t >= geo.ts.len());
        if bad {
            return Err(invalid(&format!("face index {f:?} is out of range")));
        }
    }
    Ok(())
}

fn invalid(message: &str) -> anyhow::Error {
    LmError::InvalidArgument(message.to_string()).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw_quad() -> Json {
        json!({
            "ps": [-1,-1,-1, 1,-1,-1, 1,1,-1, -1,1,-1],
            "ns": [0,0,1],
            "ts": [0,0, 1,0, 1,1, 0,1],
            "fs": {
                "p": [0,1,2, 0,2,3],
                "n": [0,0,0, 0,0,0],
                "t": [0,1,2, 0,2,3]
            }
        })
    }

    fn build(prop: &Json) -> Result<IndexedMesh> {
        let ctx = AssetContext::detached();
        let mut mesh = IndexedMesh::new(MeshSource::Raw);
        mesh.construct(prop, &ctx.as_context())?;
        Ok(mesh)
    }

    #[test]
    fn raw_quad_has_two_triangles() {
        let mesh = build(&raw_quad()).unwrap();
        assert_eq!(mesh.num_triangles(), 2);
        let tri = mesh.triangle_at(1);
        assert_eq!(tri.p3.p, Vec3::new(-1.0, 1.0, -1.0));
        assert_eq!(tri.p3.t, Vec2::new(0.0, 1.0));

        let mut visited = Vec::new();
        mesh.foreach_triangle(&mut |face, _| visited.push(face));
        assert_eq!(visited, [0, 1]);
    }

    #[test]
    fn surface_point_interpolates_attributes() {
        let mesh = build(&raw_quad()).unwrap();
        let sp = mesh.surface_point(0, Vec2::new(0.5, 0.5));
        assert_eq!(sp.p, Vec3::new(1.0, 0.0, -1.0));
        assert_eq!(sp.n, Vec3::new(0.0, 0.0, 1.0));
        assert_eq!(sp.gn, Vec3::new(0.0, 0.0, 1.0));
        assert_eq!(sp.t, Vec2::new(1.0, 0.5));
    }

    #[test]
    fn missing_normals_fall_back_to_geometry_normal() {
        let prop = json!({"ps": [0,0,0, 0,1,0, 0,0,1], "fs": {"p": [0,1,2]}});
        let mesh = build(&prop).unwrap();
        let sp = mesh.surface_point(0, Vec2::new(0.2, 0.2));
        assert_eq!(sp.n, Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(mesh.triangle_at(0).p1.n, Vec3::zero());
    }

    #[test]
    fn rejects_bad_indices() {
        let prop = json!({"ps": [0,0,0, 0,1,0, 0,0,1], "fs": {"p": [0,1,3]}});
        assert!(build(&prop).is_err());

        let prop = json!({"ps": [0,0,0, 0,1,0, 0,0,1], "fs": {"p": [0,1]}});
        assert!(build(&prop).is_err());

        let prop = json!({"ps": [0,0,0, 0,1,0, 0,0,1], "ns": [0,0,1], "fs": {"p": [0,1,2], "n": [0]}});
        assert!(build(&prop).is_err());
    }
}
