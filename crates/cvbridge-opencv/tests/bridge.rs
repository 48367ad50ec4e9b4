//! `CvBridge` driven by the OpenCV backend on rendered images.

use approx::assert_relative_eq;
use cvbridge::{BoardSpec, CvBridge, ImageView, Point2f, Rgba8};
use cvbridge_opencv::{ArucoDictionary, OpenCvBackend, OpenCvConfig};
use nalgebra::{Matrix3, Rotation3, Vector3};
use opencv::core::Mat;
use opencv::objdetect;
use opencv::prelude::*;

const WIDTH: u32 = 640;
const HEIGHT: u32 = 480;
const FOCAL: f64 = 800.0;

fn backend() -> OpenCvBackend {
    OpenCvBackend::new(OpenCvConfig::default()).expect("OpenCV backend")
}

/// White canvas with one marker of the default dictionary at `(left, top)`.
fn marker_image(id: i32, side: i32, left: u32, top: u32) -> Vec<Rgba8> {
    let dictionary = objdetect::get_predefined_dictionary(ArucoDictionary::default().predefined())
        .expect("dictionary");
    let mut marker = Mat::default();
    objdetect::generate_image_marker_def(&dictionary, id, side, &mut marker).expect("marker");

    let mut pixels = vec![Rgba8::gray(255); (WIDTH * HEIGHT) as usize];
    for r in 0..side {
        for c in 0..side {
            let v = *marker.at_2d::<u8>(r, c).expect("marker pixel");
            let (x, y) = (left + c as u32, top + r as u32);
            pixels[(y * WIDTH + x) as usize] = Rgba8::gray(v);
        }
    }
    pixels
}

/// Signed shoelace area in image coordinates (y down): positive for clockwise
/// on screen.
fn signed_area(quad: &[Point2f]) -> f32 {
    (0..quad.len())
        .map(|i| {
            let (a, b) = (quad[i], quad[(i + 1) % quad.len()]);
            a.x * b.y - b.x * a.y
        })
        .sum::<f32>()
        / 2.0
}

/// Chessboard seen by a pinhole camera (`FOCAL`, centred principal point)
/// after rotating the board by `rx`, `ry` radians at `distance` metres.
fn board_view(board: &BoardSpec, rx: f64, ry: f64, distance: f64) -> Vec<Rgba8> {
    let square = f64::from(board.corner_separation);
    let squares_wide = board.corner_count_wide + 1;
    let squares_high = board.corner_count_high + 1;
    let half_w = f64::from(squares_wide) * square / 2.0;
    let half_h = f64::from(squares_high) * square / 2.0;

    let rotation = Rotation3::from_euler_angles(rx, ry, 0.0);
    let r = rotation.matrix();
    let k = Matrix3::new(
        FOCAL,
        0.0,
        f64::from(WIDTH) / 2.0,
        0.0,
        FOCAL,
        f64::from(HEIGHT) / 2.0,
        0.0,
        0.0,
        1.0,
    );
    let plane_to_camera = Matrix3::from_columns(&[
        r.column(0).into_owned(),
        r.column(1).into_owned(),
        Vector3::new(0.0, 0.0, distance),
    ]);
    let image_to_plane = (k * plane_to_camera).try_inverse().expect("homography");

    let mut pixels = vec![Rgba8::gray(255); (WIDTH * HEIGHT) as usize];
    for v in 0..HEIGHT {
        for u in 0..WIDTH {
            let p = image_to_plane * Vector3::new(f64::from(u) + 0.5, f64::from(v) + 0.5, 1.0);
            let (x, y) = (p.x / p.z + half_w, p.y / p.z + half_h);
            if x < 0.0 || y < 0.0 {
                continue;
            }
            let (col, row) = ((x / square) as u32, (y / square) as u32);
            if col < squares_wide && row < squares_high && (col + row) % 2 == 0 {
                pixels[(v * WIDTH + u) as usize] = Rgba8::gray(0);
            }
        }
    }
    pixels
}

#[test]
fn rendered_marker_is_detected_with_one_clockwise_quad() {
    let backend = backend();
    let bridge = CvBridge::new(&backend);
    let pixels = marker_image(23, 200, 220, 140);
    let image = ImageView::new(WIDTH, HEIGHT, &pixels).expect("image");

    let detection = bridge.detect_markers(image).expect("detect");
    assert_eq!(detection.marker_ids, vec![23]);
    assert_eq!(detection.markers.len(), 1);
    let quad = &detection.markers[0];
    assert_eq!(quad.len(), 4);

    // First corner is the marker's top-left; order runs clockwise on screen.
    assert!((quad[0].x - 220.0).abs() < 3.0 && (quad[0].y - 140.0).abs() < 3.0);
    let area = signed_area(quad);
    assert!(area > 0.0, "winding {area}");
    assert_relative_eq!(area, 200.0 * 200.0, max_relative = 0.05);
}

#[test]
fn tilted_board_views_calibrate_to_a_pinhole_model() {
    let backend = backend();
    let bridge = CvBridge::new(&backend);
    let board = BoardSpec {
        corner_length: 0.03,
        corner_separation: 0.03,
        ..BoardSpec::default()
    };
    let poses = [
        (0.0, 0.0),
        (0.3, 0.0),
        (-0.3, 0.0),
        (0.0, 0.35),
        (0.0, -0.35),
        (0.2, 0.25),
    ];
    let renders: Vec<Vec<Rgba8>> = poses
        .iter()
        .map(|&(rx, ry)| board_view(&board, rx, ry, 0.75))
        .collect();
    let views = renders
        .iter()
        .map(|pixels| ImageView::new(WIDTH, HEIGHT, pixels).expect("image"));

    let calibration = bridge
        .calibrate_from_views(views, &board)
        .expect("calibrate")
        .expect("board found in at least one view");

    assert_eq!(calibration.camera_matrix.shape(), (3, 3));
    let dist = calibration.distortion_coefficients.shape();
    assert!(dist.0 == 1 && [4, 5, 8].contains(&dist.1), "distortion shape {dist:?}");

    let fx = calibration.camera_matrix.get(0, 0).expect("fx");
    let fy = calibration.camera_matrix.get(1, 1).expect("fy");
    assert_relative_eq!(fx, FOCAL, max_relative = 0.1);
    assert_relative_eq!(fy, FOCAL, max_relative = 0.1);
    assert_eq!(calibration.camera_matrix.get(2, 2), Some(1.0));

    // The backend now serves the same calibration back.
    let cached = bridge.static_calibration_data().expect("static");
    assert_eq!(cached.camera_matrix, calibration.camera_matrix);
    assert_eq!(cached.distortion_coefficients, calibration.distortion_coefficients);
}
