use lumen_core::accel::{Accel, NaiveAccel};
use lumen_core::bvh::SahBvh;
use lumen_core::geometry::{closest_hit, SceneTriangle};
use lumen_core::math::{Ray, Vec3};

#[test]
fn accelerators_match_bruteforce() {
    let mut rng = TestRng::new(1);
    let mut triangles = Vec::new();

    for face in 0..256 {
        let base = Vec3::new(
            rng.range(-5.0, 5.0),
            rng.range(-5.0, 5.0),
            rng.range(-5.0, 5.0),
        );
        let mut corner = || base + Vec3::new(rng.range(-1.0, 1.0), rng.range(-1.0, 1.0), rng.range(-1.0, 1.0));
        triangles.push(SceneTriangle {
            p1: corner(),
            p2: corner(),
            p3: corner(),
            primitive: face % 3,
            face,
        });
    }

    let mut sah = SahBvh::default();
    sah.build(&triangles).unwrap();
    let mut naive = NaiveAccel::default();
    naive.build(&triangles).unwrap();

    let mut hits = 0;
    for _ in 0..512 {
        let origin = Vec3::new(
            rng.range(-8.0, 8.0),
            rng.range(-8.0, 8.0),
            rng.range(-8.0, 8.0),
        );
        let direction = Vec3::new(
            rng.range(-1.0, 1.0),
            rng.range(-1.0, 1.0),
            rng.range(-1.0, 1.0),
        )
        .normalized();
        let ray = Ray { origin, direction };

        let brute = closest_hit(&triangles, &ray, 0.001, f32::INFINITY);
        for accel in [&sah as &dyn Accel, &naive] {
            let hit = accel.intersect(&ray, 0.001, f32::INFINITY);
            assert_eq!(brute.is_some(), hit.is_some());
            if let (Some(a), Some(b)) = (brute, hit) {
                assert!((a.t - b.t).abs() < 1e-3);
            }
        }
        hits += usize::from(brute.is_some());
    }
    assert!(hits > 0);
}

#[test]
fn sahbvh_respects_ray_segment() {
    let triangles = vec![SceneTriangle {
        p1: Vec3::new(-1.0, -1.0, 0.0),
        p2: Vec3::new(1.0, -1.0, 0.0),
        p3: Vec3::new(0.0, 1.0, 0.0),
        primitive: 0,
        face: 0,
    }];
    let mut sah = SahBvh::default();
    sah.build(&triangles).unwrap();

    let ray = Ray {
        origin: Vec3::new(0.0, 0.0, 3.0),
        direction: Vec3::new(0.0, 0.0, -1.0),
    };
    assert!(sah.intersect(&ray, 0.0, 2.0).is_none());
    assert!(sah.intersect(&ray, 0.0, 4.0).is_some());
}

struct TestRng {
    state: u64,
}

impl TestRng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u32(&mut self) -> u32 {
        self.state = self
            .state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1);
        (self.state >> 32) as u32
    }

    fn next_f32(&mut self) -> f32 {
        self.next_u32() as f32 / u32::MAX as f32
    }

    fn range(&mut self, min: f32, max: f32) -> f32 {
        min + (max - min) * self.next_f32()
    }
}
