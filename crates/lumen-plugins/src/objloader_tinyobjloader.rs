use anyhow::Result;
use lumen_core::comp::{Plugin, Registry};
use lumen_core::error::LmError;
use lumen_core::math::{Vec2, Vec3};
use lumen_core::objloader::{MtlMatParams, ObjData, ObjFaceIndex, ObjLoader, ObjMesh};
use std::path::Path;

pub struct TinyObjLoaderPlugin;

impl Plugin for TinyObjLoaderPlugin {
    fn name(&self) -> &'static str {
        "objloader_tinyobjloader"
    }

    fn register(&self, registry: &mut Registry) {
        registry.register::<dyn ObjLoader, _>("objloader::tinyobjloader", || Box::new(TinyObjLoader));
    }
}

/// OBJ loader backed by `tobj`. Produces the same [`ObjData`] layout as the
/// built-in loader: every model's vertices are appended to one pool.
pub struct TinyObjLoader;

impl ObjLoader for TinyObjLoader {
    fn load(&self, path: &Path) -> Result<ObjData> {
        let (models, materials) = tobj::load_obj(
            path,
            &tobj::LoadOptions {
                triangulate: true,
                ..Default::default()
            },
        )
        .map_err(|err| LmError::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        })?;

        let base_dir = path.parent().unwrap_or_else(|| Path::new(""));
        let mut data = ObjData::default();
        match materials {
            Ok(materials) => {
                data.materials = materials
                    .iter()
                    .map(|m| convert_material(m, base_dir))
                    .collect();
            }
            Err(err) => log::warn!("{path:?}: failed to load materials: {err}"),
        }

        for model in models {
            let mesh = model.mesh;
            let p_off = data.geo.ps.len();
            let n_off = data.geo.ns.len();
            let t_off = data.geo.ts.len();
            data.geo.ps.extend(mesh.positions.chunks(3).map(|v| Vec3::new(v[0], v[1], v[2])));
            data.geo.ns.extend(mesh.normals.chunks(3).map(|v| Vec3::new(v[0], v[1], v[2])));
            data.geo.ts.extend(mesh.texcoords.chunks(2).map(|v| Vec2::new(v[0], v[1])));

            let has_n = mesh.normal_indices.len() == mesh.indices.len();
            let has_t = mesh.texcoord_indices.len() == mesh.indices.len();
            let faces = (0..mesh.indices.len())
                .map(|i| ObjFaceIndex {
                    p: p_off + mesh.indices[i] as usize,
                    n: has_n.then(|| n_off + mesh.normal_indices[i] as usize),
                    t: has_t.then(|| t_off + mesh.texcoord_indices[i] as usize),
                })
                .collect::<Vec<_>>();
            if faces.is_empty() {
                continue;
            }

            let material = match mesh.material_id {
                Some(id) if id < data.materials.len() => id,
                _ => data.default_material(),
            };
            data.meshes.push(ObjMesh {
                name: model.name,
                faces,
                material,
            });
        }

        log::debug!(
            "{path:?}: {} meshes, {} triangles, {} materials",
            data.meshes.len(),
            data.num_triangles(),
            data.materials.len()
        );
        Ok(data)
    }
}

fn convert_material(m: &tobj::Material, base_dir: &Path) -> MtlMatParams {
    let mut params = MtlMatParams::named(&m.name);
    if let Some(kd) = m.diffuse {
        params.kd = kd.into();
    }
    if let Some(ks) = m.specular {
        params.ks = ks.into();
    }
    if let Some(ke) = m.unknown_param.get("Ke").and_then(|v| parse_vec3(v)) {
        params.ke = ke;
    }
    if let Some(illum) = m.illumination_model {
        params.illum = i32::from(illum);
    }
    params.map_kd = m.diffuse_texture.as_ref().map(|file| base_dir.join(file));
    params
}

fn parse_vec3(text: &str) -> Option<Vec3> {
    let v = text
        .split_whitespace()
        .map(|s| s.parse::<f32>().ok())
        .collect::<Option<Vec<_>>>()?;
    match v.as_slice() {
        [x, y, z] => Some(Vec3::new(*x, *y, *z)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_emission_triplets() {
        assert_eq!(parse_vec3("17 12 4"), Some(Vec3::new(17.0, 12.0, 4.0)));
        assert_eq!(parse_vec3("1 2"), None);
        assert_eq!(parse_vec3("a b c"), None);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = TinyObjLoader
            .load(Path::new("does/not/exist.obj"))
            .unwrap_err();
        assert!(matches!(
            lumen_core::error::kind(&err),
            Some(LmError::Io { .. })
        ));
    }
}
