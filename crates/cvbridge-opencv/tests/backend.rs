use approx::assert_abs_diff_eq;
use cvbridge_core::marshal::matrix::to_native;
use cvbridge_core::{
    BoardSpec, HandlePool, ImageView, MarshalToHost, MatrixValue, NativeApi, Rgba8,
};
use cvbridge_opencv::{OpenCvBackend, OpenCvConfig};

fn backend() -> OpenCvBackend {
    OpenCvBackend::new(OpenCvConfig::default()).expect("OpenCV backend")
}

/// Synthetic chessboard with `inner_w x inner_h` inner corners.
fn chessboard(inner_w: u32, inner_h: u32, square: u32, margin: u32) -> (u32, u32, Vec<Rgba8>) {
    let width = (inner_w + 1) * square + 2 * margin;
    let height = (inner_h + 1) * square + 2 * margin;
    let mut pixels = vec![Rgba8::gray(255); (width * height) as usize];
    for y in margin..height - margin {
        for x in margin..width - margin {
            let (cx, cy) = ((x - margin) / square, (y - margin) / square);
            if (cx + cy) % 2 == 0 {
                pixels[(y * width + x) as usize] = Rgba8::gray(0);
            }
        }
    }
    (width, height, pixels)
}

#[test]
fn blank_image_has_no_markers_and_no_board() {
    let backend = backend();
    let pool = HandlePool::new(&backend);
    let pixels = vec![Rgba8::gray(255); 640 * 480];
    let image = ImageView::new(640, 480, &pixels).expect("image");

    let ids = pool.create_int_vector().expect("ids");
    let corners = pool.create_nested_point_sequence().expect("corners");
    let rejected = pool.create_nested_point_sequence().expect("rejected");
    unsafe {
        backend
            .detect_markers(image, ids.as_raw(), corners.as_raw(), rejected.as_raw())
            .expect("detect");
    }
    assert!(ids.to_host().expect("ids").is_empty());
    assert!(corners.to_host().expect("corners").is_empty());

    let found = pool.create_flag().expect("flag");
    let image_points = pool.create_nested_point_sequence().expect("image points");
    let object_points = pool.create_nested_point3_sequence().expect("object points");
    unsafe {
        backend
            .find_chessboard_corners(
                image,
                &BoardSpec::default(),
                found.as_raw(),
                image_points.as_raw(),
                object_points.as_raw(),
            )
            .expect("find");
    }
    assert!(!found.to_host().expect("flag"));
    assert!(image_points.to_host().expect("points").is_empty());
}

#[test]
fn synthetic_chessboard_is_found_with_all_corners() {
    let backend = backend();
    let pool = HandlePool::new(&backend);
    let board = BoardSpec::default();
    let (w, h, pixels) = chessboard(
        board.corner_count_wide,
        board.corner_count_high,
        40,
        60,
    );
    let image = ImageView::new(w, h, &pixels).expect("image");

    let found = pool.create_flag().expect("flag");
    let image_points = pool.create_nested_point_sequence().expect("image points");
    let object_points = pool.create_nested_point3_sequence().expect("object points");
    unsafe {
        backend
            .find_chessboard_corners(
                image,
                &board,
                found.as_raw(),
                image_points.as_raw(),
                object_points.as_raw(),
            )
            .expect("find");
    }
    assert!(found.to_host().expect("flag"));
    let views = image_points.to_host().expect("image points");
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].len(), board.corner_count());
    assert_eq!(object_points.to_host().expect("object points")[0], board.object_points());
}

#[test]
fn static_calibration_is_empty_before_any_run() {
    let backend = backend();
    let pool = HandlePool::new(&backend);
    let camera = pool.create_matrix().expect("camera");
    let dist = pool.create_matrix().expect("dist");
    unsafe {
        backend
            .static_calibration(camera.as_raw(), dist.as_raw())
            .expect("static");
    }
    assert!(camera.to_host().expect("camera").is_empty());
    assert!(dist.to_host().expect("dist").is_empty());
}

#[test]
fn matrices_round_trip_and_convert_to_euler_degrees() {
    let backend = backend();
    let pool = HandlePool::new(&backend);
    let rvecs = MatrixValue::from_rows(&[[0.0, 0.0, 0.5], [0.25, 0.0, 0.0]]).expect("rvecs");
    let native = to_native(&pool, &rvecs).expect("native");
    assert_eq!(native.to_host().expect("host"), rvecs);

    let euler = pool.create_matrix().expect("euler");
    unsafe {
        backend
            .rotation_vectors_to_euler_angles(native.as_raw(), euler.as_raw())
            .expect("euler");
    }
    let angles = euler.to_host().expect("angles");
    assert_eq!(angles.shape(), (2, 3));
    assert_abs_diff_eq!(angles.get(0, 2).expect("z"), 0.5_f64.to_degrees(), epsilon = 1e-9);
    assert_abs_diff_eq!(angles.get(1, 0).expect("x"), 0.25_f64.to_degrees(), epsilon = 1e-9);

    unsafe {
        assert!(backend
            .rotation_vector_to_euler_angles(native.as_raw(), euler.as_raw())
            .is_err());
    }
}

#[test]
fn board_sizes_beyond_an_int_fail_before_the_search() {
    let backend = backend();
    let pool = HandlePool::new(&backend);
    let pixels = vec![Rgba8::gray(255); 64 * 48];
    let image = ImageView::new(64, 48, &pixels).expect("image");
    let board = BoardSpec {
        corner_count_wide: u32::MAX,
        ..BoardSpec::default()
    };

    let found = pool.create_flag().expect("flag");
    let image_points = pool.create_nested_point_sequence().expect("image points");
    let object_points = pool.create_nested_point3_sequence().expect("object points");
    let err = unsafe {
        backend.find_chessboard_corners(
            image,
            &board,
            found.as_raw(),
            image_points.as_raw(),
            object_points.as_raw(),
        )
    }
    .unwrap_err();
    assert!(err.to_string().contains("corner_count_wide"));
    assert!(!found.to_host().expect("flag"));
}
