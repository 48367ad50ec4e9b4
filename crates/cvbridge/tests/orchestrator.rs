use approx::assert_abs_diff_eq;
use cvbridge::core::test_utils::RecordingBackend;
use cvbridge::core::{HandlePool, MarshalToHost};
use cvbridge::{
    BoardSpec, BridgeError, CvBridge, HandleKind, ImageView, MatrixValue, Point2f, Rgba8,
};

const W: u32 = 640;
const H: u32 = 480;

fn blank() -> Vec<Rgba8> {
    vec![Rgba8::new(40, 120, 200, 255); (W * H) as usize]
}

fn quad(x: f32, y: f32, side: f32) -> Vec<Point2f> {
    vec![
        Point2f::new(x, y),
        Point2f::new(x + side, y),
        Point2f::new(x + side, y + side),
        Point2f::new(x, y + side),
    ]
}

#[test]
fn blank_image_yields_empty_detection_and_releases_everything() {
    let backend = RecordingBackend::new();
    let bridge = CvBridge::new(&backend);
    let pixels = blank();
    let image = ImageView::new(W, H, &pixels).expect("image");

    let result = bridge.detect_markers(image).expect("detect");

    assert!(result.marker_ids.is_empty());
    assert!(result.markers.is_empty());
    assert!(result.rejected_candidates.is_empty());
    assert_eq!(backend.created(), 3);
    assert_eq!(backend.live_count(), 0);
}

#[test]
fn single_marker_is_reported_with_its_corners_in_order() {
    let backend = RecordingBackend::new();
    backend.script_detection(vec![42], vec![quad(100.0, 50.0, 80.0)], Vec::new());
    let bridge = CvBridge::new(&backend);
    let pixels = blank();

    let result = bridge
        .detect_markers(ImageView::new(W, H, &pixels).expect("image"))
        .expect("detect");

    assert_eq!(result.marker_ids, vec![42]);
    assert_eq!(result.markers, vec![quad(100.0, 50.0, 80.0)]);
    assert!(result.rejected_candidates.is_empty());
    let (id, corners) = result.iter().next().expect("one marker");
    assert_eq!(id, 42);
    assert_eq!(corners[2], Point2f::new(180.0, 130.0));
    assert_eq!(backend.live_count(), 0);
}

#[test]
fn rejected_candidates_keep_ragged_lengths() {
    let backend = RecordingBackend::new();
    let rejected = vec![
        vec![Point2f::new(1.0, 1.0); 4],
        vec![Point2f::new(2.0, 2.0); 5],
        Vec::new(),
    ];
    backend.script_detection(Vec::new(), Vec::new(), rejected.clone());
    let bridge = CvBridge::new(&backend);
    let pixels = blank();

    let result = bridge
        .detect_markers(ImageView::new(W, H, &pixels).expect("image"))
        .expect("detect");
    assert_eq!(result.rejected_candidates, rejected);
}

#[test]
fn mismatched_id_and_corner_counts_are_an_error() {
    let backend = RecordingBackend::new();
    backend.script_detection(vec![1, 2], vec![quad(0.0, 0.0, 10.0)], Vec::new());
    let bridge = CvBridge::new(&backend);
    let pixels = blank();

    let err = bridge
        .detect_markers(ImageView::new(W, H, &pixels).expect("image"))
        .unwrap_err();
    assert!(matches!(
        err,
        BridgeError::CountMismatch {
            left: 2,
            right: 1,
            ..
        }
    ));
    assert_eq!(backend.live_count(), 0);
}

#[test]
fn allocation_failure_stops_before_the_native_call() {
    let backend = RecordingBackend::new();
    backend.fail_allocation_of(HandleKind::NestedPointSequence);
    let bridge = CvBridge::new(&backend);
    let pixels = blank();

    let err = bridge
        .detect_markers(ImageView::new(W, H, &pixels).expect("image"))
        .unwrap_err();
    assert!(matches!(
        err,
        BridgeError::Allocation {
            kind: HandleKind::NestedPointSequence
        }
    ));
    assert!(backend.calls().is_empty());
    assert_eq!(backend.created(), 1);
    assert_eq!(backend.live_count(), 0);
}

#[test]
fn native_failure_releases_all_outputs() {
    let backend = RecordingBackend::new();
    backend.fail_operation("detect_markers");
    let bridge = CvBridge::new(&backend);
    let pixels = blank();

    let err = bridge
        .detect_markers(ImageView::new(W, H, &pixels).expect("image"))
        .unwrap_err();
    assert!(matches!(err, BridgeError::Native { op: "detect_markers", .. }));
    assert_eq!(backend.created(), 3);
    assert_eq!(backend.live_count(), 0);
}

#[test]
fn corrupt_native_lengths_fail_without_leaking() {
    let backend = RecordingBackend::new();
    backend.script_detection(vec![3], vec![quad(0.0, 0.0, 5.0)], Vec::new());
    backend.corrupt_lengths(true);
    let bridge = CvBridge::new(&backend);
    let pixels = blank();

    let err = bridge
        .detect_markers(ImageView::new(W, H, &pixels).expect("image"))
        .unwrap_err();
    assert!(matches!(err, BridgeError::ShapeMismatch { .. }));
    assert_eq!(backend.live_count(), 0);
}

#[test]
fn found_flag_follows_the_native_byte() {
    let pixels = blank();
    let board = BoardSpec::default();

    for (byte, expected) in [(0u8, false), (1, true), (0x7f, true), (0xff, true)] {
        let backend = RecordingBackend::new();
        backend.script_chessboard(byte, None);
        let bridge = CvBridge::new(&backend);

        let (found, points) = bridge
            .find_chessboard_corners_owned(ImageView::new(W, H, &pixels).expect("image"), &board)
            .expect("find");
        assert_eq!(found, expected, "byte {byte:#x}");
        assert_eq!(points.view_count().expect("views"), usize::from(expected));

        // Only the two point stores survive the call.
        assert_eq!(backend.live_of(HandleKind::Flag), 0);
        assert_eq!(backend.live_count(), 2);
        drop(points);
        assert_eq!(backend.live_count(), 0);
    }
}

#[test]
fn calibration_consumes_points_and_transfers_matrices() {
    let backend = RecordingBackend::new();
    backend.script_chessboard(1, None);
    backend.script_calibration(
        MatrixValue::from_rows(&[[812.5, 0.0, 319.0], [0.0, 810.0, 241.5], [0.0, 0.0, 1.0]])
            .expect("camera"),
        MatrixValue::from_rows(&[[0.11, -0.24, 0.001, 0.002, 0.05]]).expect("dist"),
    );
    let bridge = CvBridge::new(&backend);
    let pixels = blank();
    let image = ImageView::new(W, H, &pixels).expect("image");
    let board = BoardSpec::default();

    let mut points = bridge.corner_accumulator().expect("points");
    for _ in 0..3 {
        assert!(bridge
            .find_chessboard_corners(image, &board, &mut points)
            .expect("find"));
    }
    assert_eq!(points.view_count().expect("views"), 3);
    let object = points.object_points().expect("object points");
    assert_eq!(object[2].len(), board.corner_count());

    let calibration = bridge.calibrate_camera(image, points).expect("calibrate");
    assert_eq!(calibration.camera_matrix.shape(), (3, 3));
    assert_eq!(calibration.distortion_coefficients.shape(), (1, 5));
    assert_abs_diff_eq!(
        calibration.camera_matrix.get(1, 2).expect("cy"),
        241.5,
        epsilon = 1e-12
    );

    // Point stores are gone; the two result matrices are alive and ours.
    assert_eq!(backend.live_of(HandleKind::NestedPointSequence), 0);
    assert_eq!(backend.live_of(HandleKind::NestedPoint3Sequence), 0);
    assert_eq!(backend.live_of(HandleKind::Matrix), 2);

    let (camera_handle, dist_handle) = calibration.into_handles();
    assert_eq!(camera_handle.to_host().expect("camera").shape(), (3, 3));
    drop(dist_handle);
    assert_eq!(backend.live_count(), 1);
    drop(camera_handle);
    assert_eq!(backend.live_count(), 0);
    assert_eq!(backend.created(), backend.destroyed());
}

#[test]
fn failed_calibration_still_releases_inputs_and_outputs() {
    let backend = RecordingBackend::new();
    let bridge = CvBridge::new(&backend);
    let pixels = blank();
    let image = ImageView::new(W, H, &pixels).expect("image");

    // No views accumulated: the backend refuses to calibrate.
    let points = bridge.corner_accumulator().expect("points");
    let err = bridge.calibrate_camera(image, points).unwrap_err();
    assert!(matches!(err, BridgeError::Native { op: "calibrate_camera", .. }));
    assert_eq!(backend.live_count(), 0);
}

#[test]
fn calibrate_from_views_skips_views_without_a_board() {
    let backend = RecordingBackend::new();
    let bridge = CvBridge::new(&backend);
    let pixels = blank();
    let image = ImageView::new(W, H, &pixels).expect("image");
    let board = BoardSpec::default();

    backend.script_chessboard(0, None);
    let none = bridge
        .calibrate_from_views([image, image], &board)
        .expect("calibrate");
    assert!(none.is_none());
    assert_eq!(backend.live_count(), 0);

    backend.script_chessboard(1, None);
    let some = bridge
        .calibrate_from_views([image, image, image], &board)
        .expect("calibrate")
        .expect("calibration");
    assert_eq!(some.camera_matrix.shape(), (3, 3));
    assert_eq!(some.distortion_coefficients.len(), 5);
    drop(some);
    assert_eq!(backend.live_count(), 0);
}

#[test]
fn static_calibration_returns_previous_state() {
    let backend = RecordingBackend::new();
    let bridge = CvBridge::new(&backend);
    let pixels = blank();
    let image = ImageView::new(W, H, &pixels).expect("image");

    let empty = bridge.static_calibration_data().expect("static");
    assert!(empty.camera_matrix.is_empty());
    assert!(empty.distortion_coefficients.is_empty());
    drop(empty);

    backend.script_chessboard(1, None);
    let (_, points) = bridge
        .find_chessboard_corners_owned(image, &BoardSpec::default())
        .expect("find");
    let calibrated = bridge.calibrate_camera(image, points).expect("calibrate").into_data();

    let cached = bridge.static_calibration_data().expect("static");
    assert_eq!(cached.data(), calibrated);
    drop(cached);
    assert_eq!(backend.live_count(), 0);
}

#[test]
fn euler_angles_release_their_output_handle() {
    let backend = RecordingBackend::new();
    let bridge = CvBridge::new(&backend);
    let pool = HandlePool::new(&backend);

    let rvec = cvbridge::core::marshal::matrix::to_native(
        &pool,
        &MatrixValue::from_rows(&[[0.0], [0.0], [std::f64::consts::FRAC_PI_2]]).expect("rvec"),
    )
    .expect("rvec handle");

    let angles = bridge.rotation_vector_to_euler_angles(&rvec).expect("euler");
    assert_eq!(angles.shape(), (1, 3));
    assert_abs_diff_eq!(angles.get(0, 2).expect("z"), 90.0, epsilon = 1e-9);
    assert_eq!(backend.live_count(), 1);

    drop(rvec);
    assert_eq!(backend.live_count(), 0);
}

#[test]
fn batch_euler_angles_keep_one_row_per_vector() {
    let backend = RecordingBackend::new();
    let bridge = CvBridge::new(&backend);

    let rvecs = MatrixValue::from_rows(&[[0.0, 0.0, 0.0], [0.2, 0.0, 0.0], [0.0, 0.0, -0.5]])
        .expect("rvecs");
    let angles = bridge.euler_angles_of(&rvecs).expect("euler");
    assert_eq!(angles.shape(), (3, 3));
    assert_abs_diff_eq!(angles.get(1, 0).expect("x"), 0.2_f64.to_degrees(), epsilon = 1e-9);
    assert_abs_diff_eq!(angles.get(2, 2).expect("z"), (-0.5_f64).to_degrees(), epsilon = 1e-9);
    assert_eq!(backend.live_count(), 0);
}

#[test]
fn handles_from_another_backend_are_rejected() {
    let ours = RecordingBackend::new();
    let theirs = RecordingBackend::new();
    let bridge = CvBridge::new(&ours);
    let foreign = HandlePool::new(&theirs).create_matrix().expect("matrix");

    let err = bridge.rotation_vector_to_euler_angles(&foreign).unwrap_err();
    assert!(matches!(err, BridgeError::ForeignHandle { kind: HandleKind::Matrix }));
    assert!(ours.calls().is_empty());

    let foreign_points = CvBridge::new(&theirs).corner_accumulator().expect("points");
    let pixels = blank();
    let image = ImageView::new(W, H, &pixels).expect("image");
    let err = bridge.calibrate_camera(image, foreign_points).unwrap_err();
    assert!(matches!(err, BridgeError::ForeignHandle { .. }));
    assert_eq!(theirs.live_count(), 1);
    drop(foreign);
    assert_eq!(theirs.live_count(), 0);
}

#[test]
fn every_created_handle_is_destroyed_exactly_once() {
    let backend = RecordingBackend::new();
    backend.script_chessboard(1, None);
    backend.script_detection(vec![5, 9], vec![quad(0.0, 0.0, 4.0), quad(8.0, 8.0, 4.0)], Vec::new());
    let pixels = blank();
    let image = ImageView::new(W, H, &pixels).expect("image");
    {
        let bridge = CvBridge::new(&backend);
        let board = BoardSpec::default();
        for _ in 0..4 {
            bridge.detect_markers(image).expect("detect");
        }
        let calibration = bridge
            .calibrate_from_views([image, image], &board)
            .expect("calibrate")
            .expect("found");
        bridge
            .rotation_vectors_to_euler_angles(&calibration.distortion_coefficients_handle)
            .unwrap_err();
        bridge.static_calibration_data().expect("static");
    }
    assert!(backend.created() > 0);
    assert_eq!(backend.created(), backend.destroyed());
    assert_eq!(backend.live_count(), 0);
}
