use crossbeam_channel::Receiver;
use imgref::ImgRef;
use screengif::store::{CacheArea, FrameStore};
use screengif::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const COLORS: [RGBA8; 5] = [
    RGBA8::new(255, 0, 0, 255),
    RGBA8::new(0, 255, 0, 255),
    RGBA8::new(0, 0, 255, 255),
    RGBA8::new(255, 255, 0, 255),
    RGBA8::new(0, 255, 255, 255),
];

#[test]
fn round_trip_keeps_frames_and_delays() {
    let root = scratch("roundtrip");
    let (store, output) = CacheArea::resolve(Some(&root)).unwrap().open_session(9.9).unwrap();
    let timestamps = [10.0, 10.1, 10.25, 10.3];
    for (t, color) in timestamps.iter().zip(COLORS) {
        add_frame(&store, *t, color);
    }

    let frames = GifEncoder::new(0, DelayTiming::SincePrevious)
        .encode(&store, RecordingSpan { start: 9.9, stop: 10.4 }, &output).unwrap();
    assert_eq!(frames, 4);
    store.reset().unwrap();
    assert!(!store.dir().exists());

    let (repeat, delays) = read_gif(&output, |n, pixels| {
        assert_eq!((pixels.width(), pixels.height()), (8, 6));
        let px = pixels.buf()[pixels.stride() * 3 + 4];
        assert_eq!(px, COLORS[n], "frame {n}");
    });
    assert_eq!(repeat, gif::Repeat::Infinite);
    assert_eq!(delays, [10, 10, 15, 5]);
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn rate_15_until_next_capture() {
    let root = scratch("rate15");
    let (store, output) = CacheArea::resolve(Some(&root)).unwrap().open_session(0.).unwrap();
    let ticks = [0.0, 0.067, 0.133, 0.200, 0.267];
    for (t, color) in ticks.iter().zip(COLORS) {
        add_frame(&store, *t, color);
    }
    assert_eq!(FrameRate::F15.frame_interval(), 4);

    GifEncoder::new(0, DelayTiming::UntilNext)
        .encode(&store, RecordingSpan { start: 0., stop: 0.30 }, &output).unwrap();

    let (repeat, delays) = read_gif(&output, |_, _| {});
    assert_eq!(repeat, gif::Repeat::Infinite);
    assert_eq!(delays.len(), 5);
    for (actual, expected) in delays.iter().zip([6.7, 6.7, 6.7, 6.7, 3.3]) {
        assert!((f64::from(*actual) - expected).abs() <= 1., "{delays:?}");
    }
    assert_eq!(delays.iter().sum::<u16>(), 30);
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn corrupt_frame_is_left_out() {
    let root = scratch("corrupt");
    let (store, output) = CacheArea::resolve(Some(&root)).unwrap().open_session(0.).unwrap();
    for (i, color) in COLORS.into_iter().enumerate() {
        let t = 0.1 * (i + 1) as f64;
        if i == 3 {
            store.append(t, b"not an image").unwrap();
        } else {
            add_frame(&store, t, color);
        }
    }

    let frames = GifEncoder::new(2, DelayTiming::SincePrevious)
        .encode(&store, RecordingSpan { start: 0., stop: 0.6 }, &output).unwrap();
    assert_eq!(frames, 4);

    let mut seen = vec![];
    let (repeat, delays) = read_gif(&output, |_, pixels| seen.push(pixels.buf()[0]));
    assert_eq!(repeat, gif::Repeat::Finite(2));
    assert_eq!(seen, [COLORS[0], COLORS[1], COLORS[2], COLORS[4]]);
    // the left-out frame's time is dropped, not added to the next frame
    assert_eq!(delays, [10, 10, 10, 10]);
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn missing_target_fails_without_storage() {
    let root = scratch("no-target");
    let (session, events) = new(settings(&root, FrameRate::F15));
    let res = session.start(None::<fn() -> Option<ImgVec<RGBA8>>>);
    assert_eq!(res, Err(ErrorKind::EmptyTarget));
    assert_eq!(session.state(), SessionState::Idle);
    match next_event(&events) {
        Event::Failed(err) => assert_eq!(err.kind(), ErrorKind::EmptyTarget),
        other => panic!("{other:?}"),
    }
    assert!(!root.exists());
}

#[test]
fn records_until_stopped() {
    let root = scratch("record");
    let (session, events) = new(settings(&root, FrameRate::F30));
    session.start(Some(solid_target(16, 12))).unwrap();
    assert!(matches!(next_event(&events), Event::Started));
    assert_eq!(session.state(), SessionState::Recording);

    std::thread::sleep(Duration::from_millis(400));
    // second start doesn't disturb the first
    assert_eq!(session.start(Some(solid_target(99, 99))), Err(ErrorKind::AlreadyRecording));
    assert_eq!(session.state(), SessionState::Recording);

    session.stop();
    assert_ne!(session.state(), SessionState::Recording);
    assert!(matches!(next_event(&events), Event::Stopped));
    let (output, frames) = match next_event(&events) {
        Event::Completed { output, frames, cleanup_error } => {
            assert!(cleanup_error.is_none());
            (output, frames)
        },
        other => panic!("{other:?}"),
    };
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(frames, session.frame_count());
    assert!((8..=16).contains(&frames), "{frames} frames in 400ms at 30fps");

    let (_, delays) = read_gif(&output, |_, pixels| {
        assert_eq!((pixels.width(), pixels.height()), (16, 12));
    });
    assert_eq!(delays.len(), frames);
    // delays add up to roughly the time between start and the last capture
    let total: u32 = delays.iter().map(|&d| u32::from(d)).sum();
    assert!((25..=60).contains(&total), "{delays:?}");

    // only the finished GIF is left behind
    let left: Vec<PathBuf> = fs::read_dir(root.join("screengif")).unwrap().map(|e| e.unwrap().path()).collect();
    assert_eq!(left, [output]);

    session.stop();
    assert!(events.try_recv().is_err());
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn lost_target_aborts_recording() {
    let root = scratch("lost");
    let (session, events) = new(settings(&root, FrameRate::F60));
    let mut calls = 0;
    session.start(Some(move || {
        calls += 1;
        if calls < 4 { Some(solid(8, 8)) } else { None }
    })).unwrap();

    assert!(matches!(next_event(&events), Event::Started));
    assert!(matches!(next_event(&events), Event::Stopped));
    match next_event(&events) {
        Event::Failed(err) => assert_eq!(err.kind(), ErrorKind::EmptyFrame),
        other => panic!("{other:?}"),
    }
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(fs::read_dir(root.join("screengif")).unwrap().count(), 0);

    // a new recording can start afterwards
    session.start(Some(solid_target(8, 8))).unwrap();
    session.stop();
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn stopping_before_any_frame_fails() {
    let root = scratch("empty");
    let (session, events) = new(settings(&root, FrameRate::F6));
    session.start(Some(solid_target(8, 8))).unwrap();
    session.stop();
    assert!(matches!(next_event(&events), Event::Started));
    assert!(matches!(next_event(&events), Event::Stopped));
    match next_event(&events) {
        Event::Failed(err) => assert_eq!(err.kind(), ErrorKind::NoFrames),
        other => panic!("{other:?}"),
    }
    assert_eq!(fs::read_dir(root.join("screengif")).unwrap().count(), 0);
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn backgrounding_stops_like_stop() {
    let root = scratch("background");
    let (session, events) = new(settings(&root, FrameRate::F30));
    session.start(Some(solid_target(8, 8))).unwrap();
    std::thread::sleep(Duration::from_millis(200));
    session.on_lifecycle(LifecycleSignal::EnteredBackground);

    assert!(matches!(next_event(&events), Event::Started));
    assert!(matches!(next_event(&events), Event::Stopped));
    assert!(matches!(next_event(&events), Event::Completed { .. }));
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn unsaved_frames_are_reported() {
    let root = scratch("dropped");
    let (session, events) = new(settings(&root, FrameRate::F30));
    session.start(Some(solid_target(8, 8))).unwrap();
    assert!(matches!(next_event(&events), Event::Started));
    std::thread::sleep(Duration::from_millis(100));

    // take the frame directory away for a while, so frames can't be written
    let scope = fs::read_dir(root.join("screengif")).unwrap()
        .map(|e| e.unwrap().path())
        .find(|p| p.is_dir()).unwrap();
    for _ in 0..10 {
        let _ = fs::remove_dir_all(&scope);
        if !scope.exists() {
            break;
        }
    }
    std::thread::sleep(Duration::from_millis(150));
    fs::create_dir(&scope).unwrap();
    std::thread::sleep(Duration::from_millis(200));
    session.stop();

    let mut dropped = 0;
    let frames = loop {
        match next_event(&events) {
            Event::Warning(err) => {
                assert_eq!(err.kind(), ErrorKind::StorageWriteFailed);
                dropped += 1;
            },
            Event::Completed { frames, .. } => break frames,
            Event::Failed(err) => panic!("{err}"),
            _ => {},
        }
    };
    assert!(dropped > 0);
    assert!(frames > 0);
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn sessions_are_independent() {
    let root = scratch("two");
    let (a, a_events) = new(settings(&root, FrameRate::F30));
    let (b, b_events) = new(settings(&root, FrameRate::F15));
    a.start(Some(solid_target(8, 8))).unwrap();
    b.start(Some(solid_target(10, 10))).unwrap();
    std::thread::sleep(Duration::from_millis(300));
    a.stop();
    b.stop();

    let mut outputs = vec![];
    for events in [&a_events, &b_events] {
        loop {
            match next_event(events) {
                Event::Completed { output, .. } => { outputs.push(output); break },
                Event::Failed(err) => panic!("{err}"),
                _ => {},
            }
        }
    }
    assert_ne!(outputs[0], outputs[1]);
    let _ = fs::remove_dir_all(&root);
}

fn scratch(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("screengif-test-{name}-{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    dir
}

fn settings(root: &Path, frame_rate: FrameRate) -> Settings {
    Settings {
        frame_rate,
        cache_dir: Some(root.to_path_buf()),
        fast: true,
        ..Settings::default()
    }
}

fn solid(width: usize, height: usize) -> ImgVec<RGBA8> {
    ImgVec::new(vec![RGBA8::new(30, 60, 90, 255); width * height], width, height)
}

fn solid_target(width: usize, height: usize) -> impl CaptureTarget + 'static {
    move || Some(solid(width, height))
}

fn add_frame(store: &FrameStore, t: f64, color: RGBA8) {
    let img = ImgVec::new(vec![color; 8 * 6], 8, 6);
    store.append(t, &PngCodec.encode(&img).unwrap()).unwrap();
}

#[track_caller]
fn next_event(events: &Receiver<Event>) -> Event {
    events.recv_timeout(Duration::from_secs(10)).expect("event")
}

fn read_gif(path: &Path, mut cb: impl FnMut(usize, ImgRef<RGBA8>)) -> (gif::Repeat, Vec<u16>) {
    let data = fs::read(path).unwrap();
    let mut gif_opts = gif::DecodeOptions::new();
    gif_opts.set_color_output(gif::ColorOutput::Indexed);
    let mut decoder = gif_opts.read_info(&data[..]).unwrap();
    let mut screen = gif_dispose::Screen::new_decoder(&decoder);

    let mut delays = vec![];
    while let Some(frame) = decoder.read_next_frame().unwrap() {
        screen.blit_frame(frame).unwrap();
        cb(delays.len(), screen.pixels_rgba());
        delays.push(frame.delay);
    }
    (decoder.repeat(), delays)
}
