//! Participating-media volumes: a bounded density (`scalar`) and/or albedo
//! (`color`) field over world space.

use crate::assets::AssetContext;
use crate::comp::Registry;
use crate::error::LmError;
use crate::geometry::Aabb;
use crate::json::{self, Json};
use crate::math::{Vec3, EPS};
use anyhow::Result;
use std::sync::Arc;

pub trait Volume: Send + Sync {
    fn construct(&mut self, prop: &Json, ctx: &AssetContext<'_>) -> Result<()>;

    fn bound(&self) -> Aabb;

    /// Upper bound of [`Volume::eval_scalar`], `None` without a density.
    fn max_scalar(&self) -> Option<f32>;

    fn has_scalar(&self) -> bool {
        self.max_scalar().is_some()
    }

    /// Density at `p`. Zero for volumes without one.
    fn eval_scalar(&self, p: Vec3) -> f32;

    fn has_color(&self) -> bool;

    /// Albedo at `p`. Black for volumes without one.
    fn eval_color(&self, p: Vec3) -> Vec3;
}

pub fn register(registry: &mut Registry) {
    registry.register::<dyn Volume, _>("volume::sphere", || Box::new(SphereVolume::default()));
    registry.register::<dyn Volume, _>("volume::gaussian", || Box::new(GaussianVolume::default()));
    registry.register::<dyn Volume, _>("volume::multi", || Box::new(MultiVolume::default()));
}

/// The `color`/`scalar` pair shared by the analytic volumes. At least one
/// of them must be given.
#[derive(Debug, Clone, Copy, Default)]
struct Stored {
    color: Option<Vec3>,
    scalar: Option<f32>,
}

impl Stored {
    fn read(prop: &Json) -> Result<Self> {
        let stored = Self {
            color: json::value_opt(prop, "color")?,
            scalar: json::value_opt(prop, "scalar")?,
        };
        if stored.color.is_none() && stored.scalar.is_none() {
            return Err(LmError::InvalidArgument(
                "either 'color' or 'scalar' property is necessary".to_string(),
            )
            .into());
        }
        Ok(stored)
    }
}

fn log_bound(kind: &str, bound: &Aabb) {
    log::debug!(
        "{kind} bound: min ({}, {}, {}) max ({}, {}, {})",
        bound.min.x,
        bound.min.y,
        bound.min.z,
        bound.max.x,
        bound.max.y,
        bound.max.z
    );
}

/// Constant `scalar`/`color` inside a sphere of `radius` around `pos`.
#[derive(Debug, Clone)]
pub struct SphereVolume {
    stored: Stored,
    pos: Vec3,
    radius: f32,
    bound: Aabb,
}

impl Default for SphereVolume {
    fn default() -> Self {
        Self {
            stored: Stored::default(),
            pos: Vec3::zero(),
            radius: 1.0,
            bound: Aabb::empty(),
        }
    }
}

impl Volume for SphereVolume {
    fn construct(&mut self, prop: &Json, _ctx: &AssetContext<'_>) -> Result<()> {
        self.stored = Stored::read(prop)?;
        self.pos = json::value_or(prop, "pos", Vec3::zero())?;
        self.radius = json::value_or(prop, "radius", 1.0f32)?;
        if self.radius <= 0.0 {
            return Err(LmError::InvalidArgument(format!("sphere radius {} must be positive", self.radius)).into());
        }
        let half = Vec3::splat(3f32.sqrt() * self.radius + EPS);
        self.bound = Aabb {
            min: self.pos - half,
            max: self.pos + half,
        };
        log_bound("volume::sphere", &self.bound);
        Ok(())
    }

    fn bound(&self) -> Aabb {
        self.bound
    }

    fn max_scalar(&self) -> Option<f32> {
        self.stored.scalar
    }

    fn eval_scalar(&self, p: Vec3) -> f32 {
        match self.stored.scalar {
            Some(scalar) if (self.pos - p).length() < self.radius => scalar,
            _ => 0.0,
        }
    }

    fn has_color(&self) -> bool {
        self.stored.color.is_some()
    }

    fn eval_color(&self, _p: Vec3) -> Vec3 {
        self.stored.color.unwrap_or_default()
    }
}

/// Axis-aligned 3D gaussian with peak `scalar` at `pos` and per-axis
/// standard deviation `sigma`.
#[derive(Debug, Clone)]
pub struct GaussianVolume {
    stored: Stored,
    pos: Vec3,
    sigma: Vec3,
    bound: Aabb,
}

impl Default for GaussianVolume {
    fn default() -> Self {
        Self {
            stored: Stored::default(),
            pos: Vec3::zero(),
            sigma: Vec3::splat(1.0),
            bound: Aabb::empty(),
        }
    }
}

impl Volume for GaussianVolume {
    fn construct(&mut self, prop: &Json, _ctx: &AssetContext<'_>) -> Result<()> {
        self.stored = Stored::read(prop)?;
        self.pos = json::value_or(prop, "pos", Vec3::zero())?;
        self.sigma = json::value_or(prop, "sigma", Vec3::splat(1.0))?;
        if self.sigma.x <= 0.0 || self.sigma.y <= 0.0 || self.sigma.z <= 0.0 {
            return Err(LmError::InvalidArgument("gaussian sigma must be positive".to_string()).into());
        }

        // Twice the distance at which the density falls to EPS of its peak.
        let cutoff = |s: f32| 2.0 * s * (-2.0 * EPS.ln()).sqrt();
        let half = Vec3::splat(cutoff(self.sigma.x).max(cutoff(self.sigma.y)).max(cutoff(self.sigma.z)));
        self.bound = Aabb {
            min: self.pos - half,
            max: self.pos + half,
        };
        log_bound("volume::gaussian", &self.bound);
        Ok(())
    }

    fn bound(&self) -> Aabb {
        self.bound
    }

    fn max_scalar(&self) -> Option<f32> {
        self.stored.scalar
    }

    fn eval_scalar(&self, p: Vec3) -> f32 {
        let Some(peak) = self.stored.scalar else {
            return 0.0;
        };
        let d = self.pos - p;
        let s = self.sigma;
        peak * (-0.5 * (d.x * d.x / (s.x * s.x) + d.y * d.y / (s.y * s.y) + d.z * d.z / (s.z * s.z))).exp()
    }

    fn has_color(&self) -> bool {
        self.stored.color.is_some()
    }

    fn eval_color(&self, _p: Vec3) -> Vec3 {
        self.stored.color.unwrap_or_default()
    }
}

/// Superposition of volume pairs: `volumes_den[i]` gives the density and
/// `volumes_alb[i]` the albedo of the i-th member. Densities add up; the
/// albedo is the density-weighted average.
#[derive(Default)]
pub struct MultiVolume {
    members: Vec<(Arc<dyn Volume>, Arc<dyn Volume>)>,
    bound: Aabb,
    max_scalar: f32,
}

impl MultiVolume {
    fn members_at(&self, p: Vec3) -> impl Iterator<Item = &(Arc<dyn Volume>, Arc<dyn Volume>)> {
        self.members.iter().filter(move |(density, _)| density.bound().contains(p))
    }
}

impl Volume for MultiVolume {
    fn construct(&mut self, prop: &Json, ctx: &AssetContext<'_>) -> Result<()> {
        let albedos: Vec<String> = json::value(prop, "volumes_alb")?;
        let densities: Vec<String> = json::value(prop, "volumes_den")?;
        if albedos.is_empty() || albedos.len() != densities.len() {
            return Err(LmError::InvalidArgument(format!(
                "volumes_alb ({}) and volumes_den ({}) must be non-empty and of the same size",
                albedos.len(),
                densities.len()
            ))
            .into());
        }

        let mut members = Vec::with_capacity(albedos.len());
        for (i, (albedo, density)) in albedos.iter().zip(&densities).enumerate() {
            let albedo = ctx.assets.volume(albedo)?;
            let density = ctx.assets.volume(density)?;
            if !albedo.has_color() {
                return Err(LmError::InvalidArgument(format!("volumes_alb[{i}] has no color")).into());
            }
            if !density.has_scalar() {
                return Err(LmError::InvalidArgument(format!("volumes_den[{i}] has no scalar")).into());
            }
            members.push((density, albedo));
        }

        self.bound = members
            .iter()
            .fold(Aabb::empty(), |bound, (density, _)| bound.union(density.bound()));
        self.max_scalar = members
            .iter()
            .filter_map(|(density, _)| density.max_scalar())
            .sum();
        self.members = members;
        log_bound("volume::multi", &self.bound);
        Ok(())
    }

    fn bound(&self) -> Aabb {
        self.bound
    }

    fn max_scalar(&self) -> Option<f32> {
        Some(self.max_scalar)
    }

    fn eval_scalar(&self, p: Vec3) -> f32 {
        self.members_at(p).map(|(density, _)| density.eval_scalar(p)).sum()
    }

    fn has_color(&self) -> bool {
        true
    }

    fn eval_color(&self, p: Vec3) -> Vec3 {
        let mut total = 0.0;
        let mut color = Vec3::zero();
        for (density, albedo) in self.members_at(p) {
            let scalar = density.eval_scalar(p);
            color += albedo.eval_color(p) * scalar;
            total += scalar;
        }
        if total > 0.0 {
            color / total
        } else {
            Vec3::zero()
        }
    }
}
