use image::{Rgba, RgbaImage};
use tapfill::ops::region_query::query_fill;
use tapfill::ops::segmentation::segment;
use tapfill::{
    ColoringSession, ColoringSettings, GesturePhase, InputDevice, InputSample, PixelBuffer,
    PixelRect, Point, Raster, SessionLoader, Stroke, StrokeStyle,
};

fn buffer_with_outline(width: u32, height: u32, outline: &[(u32, u32)]) -> PixelBuffer {
    let mut data = vec![0u8; (width * height * 4) as usize];
    for &(x, y) in outline {
        data[((y * width + x) * 4 + 3) as usize] = 255;
    }
    PixelBuffer::new(width, height, width as usize * 4, data).unwrap()
}

/// Four quadrants separated by a one-pixel cross at x = 16 and y = 16.
fn quadrants() -> PixelBuffer {
    let mut outline = Vec::new();
    for i in 0..33 {
        outline.push((16, i));
        outline.push((i, 16));
    }
    buffer_with_outline(33, 33, &outline)
}

fn settings(precomputed: bool) -> ColoringSettings {
    ColoringSettings {
        precomputed,
        touch_hold_off_ms: 0,
        pencil_hold_off_ms: 0,
        ..ColoringSettings::default()
    }
}

fn input(points: &[(f32, f32)], phase: GesturePhase) -> InputSample {
    InputSample::new(
        points.iter().map(|&(x, y)| Point::new(x, y)).collect(),
        InputDevice::Pencil,
        phase,
        0.0,
    )
}

/// One complete gesture, waiting for its fill before ending it.
fn draw(session: &mut ColoringSession, points: &[(f32, f32)], color: [u8; 4]) {
    let style = StrokeStyle::new(Rgba(color), 3.0);
    session.handle_input(&input(&points[..1], GesturePhase::Begin), style);
    session.finish_pending_fills();
    session.handle_input(&input(&points[1..], GesturePhase::Move), style);
    session.handle_input(&input(&[], GesturePhase::End), style);
}

fn replay_fresh(session: &ColoringSession) -> RgbaImage {
    let mut raster = Raster::new(session.raster().width(), session.raster().height());
    session
        .history()
        .replay(&mut raster, session.settings().display_scale);
    raster.image().clone()
}

#[test]
fn single_outline_pixel_scenario() {
    let buffer = buffer_with_outline(10, 10, &[(5, 5)]);
    let (index, _) = segment(&buffer, 4, 4).unwrap();
    for index in [None, Some(&index)] {
        let fill = query_fill(&buffer, index, 0, 0).unwrap();
        assert_eq!(fill.bounds(), PixelRect::new(0, 0, 10, 10));
        assert_eq!(fill.member_count(), 99);
        assert!(!fill.contains(5, 5));
        assert!(query_fill(&buffer, index, 5, 5).is_none());
    }
}

#[test]
fn one_pixel_wall_yields_two_disjoint_masks() {
    let outline: Vec<_> = (0..8).map(|y| (6, y)).collect();
    let buffer = buffer_with_outline(13, 8, &outline);
    let (index, report) = segment(&buffer, 4, 4).unwrap();
    assert_eq!(report.mask_count, 2);
    let a = index.masks()[0].bounds();
    let b = index.masks()[1].bounds();
    assert_eq!(a, PixelRect::new(0, 0, 6, 8));
    assert_eq!(b, PixelRect::new(7, 0, 6, 8));
    assert!(!a.intersects(&b));
}

#[test]
fn close_samples_collapse() {
    let mut stroke = Stroke::new(StrokeStyle::default());
    let kept = [(4.0, 4.0), (4.4, 4.2), (4.8, 4.1)]
        .iter()
        .filter(|&&(x, y)| stroke.add_point(Point::new(x, y)))
        .count();
    assert!(kept < 3);
    assert_eq!(stroke.points().len(), kept);
}

#[test]
fn undo_all_then_redo_all_restores_the_raster() {
    let mut session = ColoringSession::open(quadrants(), settings(true)).unwrap();
    let strokes: [(&[(f32, f32)], [u8; 4]); 4] = [
        (&[(2.0, 2.0), (14.0, 12.0), (30.0, 2.0)], [255, 0, 0, 255]),
        (&[(20.0, 20.0), (31.0, 31.0)], [0, 255, 0, 128]),
        (&[(3.0, 25.0), (12.0, 18.0), (14.0, 30.0)], [0, 0, 255, 255]),
        (&[(8.0, 8.0), (1.0, 14.0)], [255, 255, 0, 90]),
    ];
    for (points, color) in strokes {
        draw(&mut session, points, color);
    }
    let painted = session.raster().image().clone();
    assert_eq!(session.history().undo_count(), 4);

    for _ in 0..4 {
        assert!(session.undo());
    }
    assert!(!session.can_undo());
    assert!(session.raster().image().pixels().all(|p| p[3] == 0));
    for _ in 0..4 {
        assert!(session.redo());
    }
    assert!(!session.can_redo());
    assert_eq!(session.raster().image(), &painted);
}

#[test]
fn color_never_crosses_an_outline() {
    let mut session = ColoringSession::open(quadrants(), settings(false)).unwrap();
    // Starts top-left and sweeps through every quadrant
    draw(
        &mut session,
        &[(4.0, 4.0), (28.0, 4.0), (28.0, 28.0), (4.0, 28.0)],
        [9, 9, 9, 255],
    );
    let image = session.raster().image();
    for (x, y, p) in image.enumerate_pixels() {
        if x >= 16 || y >= 16 {
            assert_eq!(p[3], 0, "paint escaped at {x},{y}");
        }
    }
    assert_eq!(image.get_pixel(10, 4), &Rgba([9, 9, 9, 255]));
}

#[test]
fn on_demand_compaction_keeps_the_picture() {
    let mut session = ColoringSession::open(quadrants(), settings(false)).unwrap();
    let threshold = session.settings().on_demand_compaction.threshold;
    for i in 0..=threshold {
        let y = 1.0 + i as f32 * 1.5;
        let color = [(i * 25) as u8, 100, 200, 160];
        draw(&mut session, &[(1.0, y), (15.0, y + 0.5)], color);
    }
    // Threshold crossed on the last commit; nothing retained in on-demand mode
    assert!(session.history().baseline().is_some());
    assert!(!session.can_undo());
    assert_eq!(&replay_fresh(&session), session.raster().image());
}

#[test]
fn precomputed_compaction_retains_the_newest_strokes() {
    let mut s = settings(true);
    s.precomputed_compaction = tapfill::components::history::CompactionPolicy::new(5, 2);
    let mut session = ColoringSession::open(quadrants(), s).unwrap();
    for i in 0..6 {
        let x = 18.0 + i as f32 * 2.0;
        let color = [200, (i * 40) as u8, 0, 100 + (i * 20) as u8];
        draw(&mut session, &[(x, 18.0), (x, 31.0)], color);
    }
    assert_eq!(session.history().undo_count(), 2);
    assert_eq!(&replay_fresh(&session), session.raster().image());

    // The retained strokes are still individually undoable
    assert!(session.undo());
    assert!(session.undo());
    assert!(!session.undo());
}

#[test]
fn loader_poll_delivers_once() {
    let mut loader = SessionLoader::start(quadrants(), settings(true)).unwrap();
    let session = loop {
        if let Some(result) = loader.poll() {
            break result.unwrap();
        }
        std::thread::yield_now();
    };
    assert!(session.is_precomputed());
    assert_eq!(session.index().unwrap().mask_count(), 4);
    assert!(loader.poll().is_none());
}

#[test]
fn saved_drawing_reopens() {
    let mut session = ColoringSession::open(quadrants(), settings(false)).unwrap();
    draw(&mut session, &[(2.0, 2.0), (12.0, 12.0)], [1, 2, 3, 255]);
    let bytes = session.saved_drawing().unwrap().to_bytes().unwrap();

    let saved = tapfill::io::SavedDrawing::from_bytes(&bytes).unwrap();
    assert!(!saved.precomputed);
    let mut reopened = ColoringSession::open(quadrants(), settings(saved.precomputed)).unwrap();
    reopened.restore_snapshot(saved.snapshot_png).unwrap();
    assert_eq!(reopened.raster().image(), session.raster().image());
}
