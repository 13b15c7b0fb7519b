//! Wavefront OBJ/MTL loading.
//!
//! Loaders produce an [`ObjData`]: one shared vertex pool plus meshes that
//! index into it, each mesh tied to a material. Faces are triangulated, so a
//! mesh holds three [`ObjFaceIndex`] per triangle.

use crate::comp::Registry;
use crate::error::LmError;
use crate::json::Json;
use crate::math::{Vec2, Vec3};
use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_TYPE: &str = "objloader::simple";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjSurfaceGeometry {
    pub ps: Vec<Vec3>,
    pub ns: Vec<Vec3>,
    pub ts: Vec<Vec2>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjFaceIndex {
    pub p: usize,
    pub t: Option<usize>,
    pub n: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjMesh {
    pub name: String,
    pub faces: Vec<ObjFaceIndex>,
    pub material: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MtlMatParams {
    pub name: String,
    pub kd: Vec3,
    pub ks: Vec3,
    pub ke: Vec3,
    pub illum: i32,
    pub map_kd: Option<PathBuf>,
}

impl MtlMatParams {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kd: Vec3::splat(1.0),
            ks: Vec3::zero(),
            ke: Vec3::zero(),
            illum: 0,
            map_kd: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjData {
    pub geo: ObjSurfaceGeometry,
    pub meshes: Vec<ObjMesh>,
    pub materials: Vec<MtlMatParams>,
}

impl ObjData {
    pub fn num_triangles(&self) -> usize {
        self.meshes.iter().map(|m| m.faces.len() / 3).sum()
    }

    /// Index of the material used for faces with no `usemtl`, appending it
    /// on first use.
    pub fn default_material(&mut self) -> usize {
        if let Some(i) = self.materials.iter().position(|m| m.name == DEFAULT_MATERIAL) {
            return i;
        }
        self.materials.push(MtlMatParams::named(DEFAULT_MATERIAL));
        self.materials.len() - 1
    }
}

const DEFAULT_MATERIAL: &str = "__default";

pub trait ObjLoader: Send + Sync {
    fn construct(&mut self, _prop: &Json) -> Result<()> {
        Ok(())
    }

    fn load(&self, path: &Path) -> Result<ObjData>;
}

pub fn register(registry: &mut Registry) {
    registry.register::<dyn ObjLoader, _>(DEFAULT_TYPE, || Box::new(SimpleObjLoader));
}

pub struct SimpleObjLoader;

impl ObjLoader for SimpleObjLoader {
    fn load(&self, path: &Path) -> Result<ObjData> {
        let text = read_text(path)?;
        parse_obj(&text, path.parent())
    }
}

pub fn read_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|err| {
        LmError::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        }
        .into()
    })
}

/// Parses OBJ text. `base_dir` resolves `mtllib` references; without it
/// material libraries are skipped.
pub fn parse_obj(text: &str, base_dir: Option<&Path>) -> Result<ObjData> {
    let mut data = ObjData::default();
    let mut name = String::new();
    let mut faces: Vec<ObjFaceIndex> = Vec::new();
    let mut material: Option<usize> = None;

    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut tokens = line.split_whitespace();
        let Some(keyword) = tokens.next() else { continue };
        let rest: Vec<&str> = tokens.collect();

        match keyword {
            "v" => data.geo.ps.push(parse_vec3(&rest, line_no)?),
            "vn" => data.geo.ns.push(parse_vec3(&rest, line_no)?),
            "vt" => {
                let v = parse_floats(&rest, 2, line_no)?;
                data.geo.ts.push(Vec2::new(v[0], v[1]));
            }
            "f" => {
                if rest.len() < 3 {
                    return Err(syntax(line_no, "face needs at least three vertices"));
                }
                let polygon = rest
                    .iter()
                    .map(|token| parse_face_index(token, &data.geo, line_no))
                    .collect::<Result<Vec<_>>>()?;
                for k in 1..polygon.len() - 1 {
                    faces.extend_from_slice(&[polygon[0], polygon[k], polygon[k + 1]]);
                }
            }
            "o" | "g" => {
                flush_mesh(&mut data, &mut name, &mut faces, material);
                name = rest.join(" ");
            }
            "usemtl" => {
                flush_mesh(&mut data, &mut name, &mut faces, material);
                let mtl = rest.join(" ");
                material = match data.materials.iter().position(|m| m.name == mtl) {
                    Some(i) => Some(i),
                    None => {
                        log::warn!("OBJ line {}: unknown material [{}]", line_no + 1, mtl);
                        None
                    }
                };
            }
            "mtllib" => {
                let Some(dir) = base_dir else {
                    log::debug!("OBJ line {}: skipping mtllib without base directory", line_no + 1);
                    continue;
                };
                let mtl_path = dir.join(rest.join(" "));
                match read_text(&mtl_path) {
                    Ok(mtl) => data.materials.extend(parse_mtl(&mtl, dir)?),
                    Err(err) => log::warn!("failed to load material library: {err}"),
                }
            }
            _ => {}
        }
    }

    flush_mesh(&mut data, &mut name, &mut faces, material);
    Ok(data)
}

fn flush_mesh(data: &mut ObjData, name: &mut String, faces: &mut Vec<ObjFaceIndex>, material: Option<usize>) {
    if faces.is_empty() {
        return;
    }
    let material = match material {
        Some(i) => i,
        None => data.default_material(),
    };
    data.meshes.push(ObjMesh {
        name: std::mem::take(name),
        faces: std::mem::take(faces),
        material,
    });
}

/// Parses MTL text. Texture paths are resolved against `base_dir`.
pub fn parse_mtl(text: &str, base_dir: &Path) -> Result<Vec<MtlMatParams>> {
    let mut materials: Vec<MtlMatParams> = Vec::new();

    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut tokens = line.split_whitespace();
        let Some(keyword) = tokens.next() else { continue };
        let rest: Vec<&str> = tokens.collect();

        if keyword == "newmtl" {
            materials.push(MtlMatParams::named(&rest.join(" ")));
            continue;
        }

        let Some(current) = materials.last_mut() else {
            return Err(syntax(line_no, "material property before newmtl"));
        };
        match keyword {
            "Kd" => current.kd = parse_vec3(&rest, line_no)?,
            "Ks" => current.ks = parse_vec3(&rest, line_no)?,
            "Ke" => current.ke = parse_vec3(&rest, line_no)?,
            "illum" => {
                current.illum = rest
                    .first()
                    .and_then(|v| v.parse().ok())
                    .ok_or_else(|| syntax(line_no, "invalid illum"))?;
            }
            "map_Kd" => {
                if let Some(file) = rest.last() {
                    current.map_kd = Some(base_dir.join(file));
                }
            }
            _ => {}
        }
    }

    Ok(materials)
}

fn parse_face_index(token: &str, geo: &ObjSurfaceGeometry, line_no: usize) -> Result<ObjFaceIndex> {
    let mut parts = token.split('/');
    let p = parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| syntax(line_no, "missing position index"))?;
    let p = resolve_index(p, geo.ps.len(), line_no)?;
    let t = match parts.next() {
        Some(s) if !s.is_empty() => Some(resolve_index(s, geo.ts.len(), line_no)?),
        _ => None,
    };
    let n = match parts.next() {
        Some(s) if !s.is_empty() => Some(resolve_index(s, geo.ns.len(), line_no)?),
        _ => None,
    };
    Ok(ObjFaceIndex { p, t, n })
}

/// OBJ indices are 1-based; negative values count back from the end.
fn resolve_index(token: &str, len: usize, line_no: usize) -> Result<usize> {
    let i: i64 = token
        .parse()
        .map_err(|_| syntax(line_no, &format!("invalid index [{token}]")))?;
    let resolved = if i > 0 { i - 1 } else { len as i64 + i };
    if i == 0 || resolved < 0 || resolved >= len as i64 {
        return Err(syntax(line_no, &format!("index [{token}] out of range")));
    }
    Ok(resolved as usize)
}

fn parse_floats(tokens: &[&str], count: usize, line_no: usize) -> Result<Vec<f32>> {
    if tokens.len() < count {
        return Err(syntax(line_no, &format!("expected {count} numbers")));
    }
    tokens[..count]
        .iter()
        .map(|t| {
            t.parse::<f32>()
                .map_err(|_| syntax(line_no, &format!("invalid number [{t}]")))
        })
        .collect()
}

fn parse_vec3(tokens: &[&str], line_no: usize) -> Result<Vec3> {
    let v = parse_floats(tokens, 3, line_no)?;
    Ok(Vec3::new(v[0], v[1], v[2]))
}

fn syntax(line_no: usize, message: &str) -> anyhow::Error {
    LmError::InvalidArgument(format!("line {}: {message}", line_no + 1)).into()
}
