use lumen_core::math::{Mat4, Vec3};
use lumen_core::Engine;
use serde_json::json;

fn quad_scene(engine: &mut Engine, w: u32, h: u32) -> String {
    engine
        .init("user::default", &json!({"numThreads": 2}))
        .unwrap();
    let film = engine
        .asset("film_output", "film::bitmap", &json!({"w": w, "h": h}))
        .unwrap();
    engine
        .asset(
            "camera",
            "camera::pinhole",
            &json!({"film": film, "position": [0,0,5], "center": [0,0,0], "vfov": 30}),
        )
        .unwrap();
    engine
        .asset(
            "quad",
            "mesh::raw",
            &json!({
                "ps": [-1,-1,0, 1,-1,0, 1,1,0, -1,1,0],
                "fs": {"p": [0,1,2, 0,2,3]}
            }),
        )
        .unwrap();
    engine
        .asset("red", "material::diffuse", &json!({"Kd": [1, 0.5, 0.25]}))
        .unwrap();
    engine
        .primitive(Mat4::identity(), &json!({"camera": "camera"}))
        .unwrap();
    engine
        .primitive(Mat4::identity(), &json!({"mesh": "quad", "material": "$.assets.red"}))
        .unwrap();
    film
}

#[test]
fn raycast_renders_quad_over_background() {
    let mut engine = Engine::new();
    let film = quad_scene(&mut engine, 16, 12);
    engine.build("accel::sahbvh", &json!({})).unwrap();
    engine
        .render(
            "renderer::raycast",
            &json!({"output": film, "bg_color": [0.1, 0.2, 0.3], "use_constant_color": true}),
        )
        .unwrap();

    let buffer = engine.buffer(&film).unwrap();
    assert_eq!(buffer.data.len(), 16 * 12 * 3);
    assert_eq!(buffer.pixel(8, 6), [1.0, 0.5, 0.25]);
    assert_eq!(buffer.pixel(0, 0), [0.1, 0.2, 0.3]);
}

#[test]
fn shaded_color_falls_off_with_angle() {
    let mut engine = Engine::new();
    let film = quad_scene(&mut engine, 16, 12);
    engine.build("accel::naive", &json!({})).unwrap();
    engine
        .render("renderer::raycast", &json!({"output": film}))
        .unwrap();

    let buffer = engine.buffer(&film).unwrap();
    let [r, _, _] = buffer.pixel(8, 6);
    assert!(r > 0.99 && r <= 1.0);
    let [r_edge, _, _] = buffer.pixel(5, 6);
    assert!(r_edge > 0.0 && r_edge < r);
}

#[test]
fn render_before_build_fails() {
    let mut engine = Engine::new();
    let film = quad_scene(&mut engine, 4, 4);
    assert!(engine
        .render("renderer::raycast", &json!({"output": film}))
        .is_err());
}

#[test]
fn transformed_primitive_moves_in_image() {
    let mut engine = Engine::new();
    let film = quad_scene(&mut engine, 16, 12);
    engine.reset().unwrap();
    let film_again = engine
        .asset("film_output", "film::bitmap", &json!({"w": 16, "h": 12}))
        .unwrap();
    assert_eq!(film, film_again);
    engine
        .asset(
            "camera",
            "camera::pinhole",
            &json!({"aspect": 16.0 / 12.0, "position": [0,0,5], "center": [0,0,0], "vfov": 30}),
        )
        .unwrap();
    engine
        .asset(
            "tri",
            "mesh::raw",
            &json!({"ps": [0,0,0, 0.5,0,0, 0,0.5,0], "fs": {"p": [0,1,2]}}),
        )
        .unwrap();
    engine
        .asset("white", "material::diffuse", &json!({}))
        .unwrap();
    engine
        .primitive(Mat4::identity(), &json!({"camera": "camera"}))
        .unwrap();
    engine
        .primitive(
            Mat4::translate(Vec3::new(-1.0, -1.0, 0.0)),
            &json!({"mesh": "tri", "material": "white"}),
        )
        .unwrap();
    engine.build("accel::sahbvh", &json!({})).unwrap();
    engine
        .render("renderer::raycast", &json!({"output": film, "use_constant_color": true}))
        .unwrap();

    let buffer = engine.buffer(&film).unwrap();
    let lit = |x: u32, y: u32| buffer.pixel(x, y)[0] > 0.0;
    // bottom-left quadrant only
    assert!((0..16).any(|x| (0..6).any(|y| lit(x, y))));
    assert!(!(0..16).any(|x| (6..12).any(|y| lit(x, y))));
}
