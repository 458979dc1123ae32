//! Renderable geometry: the procedural bottle, the loading placeholder, and
//! external Wavefront OBJ models (optionally gzip-compressed).
//!
//! Meshes are plain indexed triangle lists.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::thread;

use flate2::read::GzDecoder;
use glam::Vec3;
use log::{debug, info};

use crate::error::{PourError, PourResult};

pub const GLASS_GREEN: u32 = 0xFF2E8B57;
pub const PLACEHOLDER_GREY: u32 = 0xFF707880;

// ════════════════════════════════════════════════════════════════════════════
// Mesh
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Debug)]
pub struct Mesh {
    pub positions: Vec<Vec3>,
    pub triangles: Vec<[u32; 3]>,
    /// Base ARGB color, shaded per face by the rasteriser.
    pub color:     u32,
}

impl Mesh {
    pub fn bounds(&self) -> BoundingBox {
        BoundingBox::of(&self.positions)
    }

    pub fn vertex_count(&self)   -> usize { self.positions.len() }
    pub fn triangle_count(&self) -> usize { self.triangles.len() }

    /// Free vertex and index storage.
    pub fn release(&mut self) {
        self.positions = Vec::new();
        self.triangles = Vec::new();
    }

    /// Surface of revolution around +Y.
    ///
    /// `profile` lists `(radius, height)` pairs from bottom to top; a radius
    /// of zero closes the surface at that height.
    pub fn lathe(profile: &[(f32, f32)], segments: usize, color: u32) -> Mesh {
        let n = segments.max(3);
        let mut positions = Vec::with_capacity(profile.len() * n);
        for &(r, y) in profile {
            for j in 0..n {
                let theta = j as f32 / n as f32 * std::f32::consts::TAU;
                positions.push(Vec3::new(r * theta.cos(), y, r * theta.sin()));
            }
        }

        let mut triangles = Vec::with_capacity(profile.len().saturating_sub(1) * n * 2);
        for k in 0..profile.len().saturating_sub(1) {
            for j in 0..n {
                let a = (k * n + j) as u32;
                let b = (k * n + (j + 1) % n) as u32;
                let c = ((k + 1) * n + j) as u32;
                let d = ((k + 1) * n + (j + 1) % n) as u32;
                triangles.push([a, c, b]);
                triangles.push([b, c, d]);
            }
        }

        Mesh { positions, triangles, color }
    }

    /// The bottle: flat base, straight body, sloping shoulder, neck and lip.
    pub fn bottle(segments: usize) -> Mesh {
        const PROFILE: &[(f32, f32)] = &[
            (0.00, 0.00),
            (0.46, 0.00),
            (0.50, 0.06),
            (0.50, 1.40),
            (0.47, 1.58),
            (0.34, 1.80),
            (0.20, 1.98),
            (0.16, 2.10),
            (0.16, 2.48),
            (0.19, 2.52),
            (0.19, 2.62),
            (0.00, 2.62),
        ];
        Mesh::lathe(PROFILE, segments, GLASS_GREEN)
    }

    /// Low-poly stand-in shown while an external model loads (or forever, if
    /// it fails to).
    pub fn placeholder() -> Mesh {
        Mesh::lathe(
            &[(0.0, 0.0), (0.4, 0.0), (0.4, 1.6), (0.0, 1.6)],
            8,
            PLACEHOLDER_GREY,
        )
    }
}

// ════════════════════════════════════════════════════════════════════════════
// BoundingBox / Framing
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl BoundingBox {
    /// Bounds of a point set; the empty set yields a zero box at the origin.
    pub fn of(points: &[Vec3]) -> Self {
        if points.is_empty() {
            return BoundingBox { min: Vec3::ZERO, max: Vec3::ZERO };
        }
        let mut min = Vec3::splat(f32::INFINITY);
        let mut max = Vec3::splat(f32::NEG_INFINITY);
        for p in points {
            min = min.min(*p);
            max = max.max(*p);
        }
        BoundingBox { min, max }
    }

    pub fn center(&self)     -> Vec3 { (self.min + self.max) * 0.5 }
    pub fn size(&self)       -> Vec3 { self.max - self.min }
    pub fn max_extent(&self) -> f32  { self.size().max_element() }
}

/// How the camera frames a model: recentre on the bounding box, scale its
/// largest extent to `TARGET_EXTENT`, and back the camera off far enough for
/// the scaled box to fit the vertical field of view.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Framing {
    pub center:   Vec3,
    pub scale:    f32,
    pub distance: f32,
}

impl Framing {
    pub const TARGET_EXTENT: f32 = 2.0;
    const MARGIN: f32 = 1.5;

    pub fn fit(bounds: &BoundingBox, fov_y_deg: f32) -> Self {
        let extent = bounds.max_extent();
        let scale = if extent > f32::EPSILON { Self::TARGET_EXTENT / extent } else { 1.0 };
        let radius = bounds.size().length() * scale * 0.5;
        let half_fov = (fov_y_deg.to_radians() * 0.5).max(0.01);
        Framing {
            center:   bounds.center(),
            scale,
            distance: radius / half_fov.tan() * Self::MARGIN,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// OBJ loading
// ════════════════════════════════════════════════════════════════════════════

/// Parse the `v` and `f` records of a Wavefront OBJ stream.
///
/// Polygons are fan-triangulated; `i`, `i/t`, `i//n` and `i/t/n` index forms
/// and negative (relative) indices are accepted.  Everything else is ignored.
pub fn parse_obj<R: BufRead>(reader: R) -> Result<Mesh, String> {
    let mut positions: Vec<Vec3> = Vec::new();
    let mut triangles: Vec<[u32; 3]> = Vec::new();

    for (lineno, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| e.to_string())?;
        let mut fields = line.split_whitespace();
        match fields.next() {
            Some("v") => {
                let mut xyz = [0.0f32; 3];
                for slot in xyz.iter_mut() {
                    let tok = fields.next()
                        .ok_or_else(|| format!("line {}: vertex needs 3 coordinates", lineno + 1))?;
                    *slot = tok.parse()
                        .map_err(|_| format!("line {}: bad coordinate {:?}", lineno + 1, tok))?;
                }
                positions.push(Vec3::from_array(xyz));
            }
            Some("f") => {
                let mut idx = Vec::with_capacity(4);
                for tok in fields {
                    idx.push(resolve_index(tok, positions.len())
                        .map_err(|e| format!("line {}: {}", lineno + 1, e))?);
                }
                if idx.len() < 3 {
                    return Err(format!("line {}: face needs at least 3 vertices", lineno + 1));
                }
                for i in 1..idx.len() - 1 {
                    triangles.push([idx[0], idx[i], idx[i + 1]]);
                }
            }
            _ => {}
        }
    }

    if triangles.is_empty() {
        return Err("no faces".to_string());
    }
    Ok(Mesh { positions, triangles, color: GLASS_GREEN })
}

/// One face token → zero-based vertex index.
fn resolve_index(tok: &str, vertex_count: usize) -> Result<u32, String> {
    let head = tok.split('/').next().unwrap_or("");
    let raw: i64 = head.parse().map_err(|_| format!("bad face index {:?}", tok))?;
    let n = vertex_count as i64;
    let zero_based = match raw {
        0            => return Err("face index 0".to_string()),
        r if r > 0   => r - 1,
        r            => n + r,
    };
    if zero_based < 0 || zero_based >= n {
        return Err(format!("face index {} out of range ({} vertices)", raw, n));
    }
    Ok(zero_based as u32)
}

/// Load a model file; `.gz` files are decompressed on the fly.
pub fn load_model(path: &Path) -> PourResult<Mesh> {
    let file = File::open(path).map_err(|e| PourError::asset(path, e))?;
    let compressed = path.extension().map_or(false, |e| e.eq_ignore_ascii_case("gz"));
    let reader: Box<dyn Read> = if compressed {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };
    let mesh = parse_obj(BufReader::new(reader)).map_err(|e| PourError::asset(path, e))?;
    info!(
        "Loaded model {} ({} vertices, {} triangles)",
        path.display(), mesh.vertex_count(), mesh.triangle_count()
    );
    Ok(mesh)
}

/// Load a model on a background thread.  The result arrives once on the
/// returned channel.
pub fn spawn_model_load(path: PathBuf) -> Receiver<PourResult<Mesh>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        debug!("loading model {}", path.display());
        let _ = tx.send(load_model(&path));
    });
    rx
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════
